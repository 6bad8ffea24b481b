use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuralInvariantSummary {
    pub reflexive_edge_missing_count: i64,
    pub parent_required_missing_count: i64,
    pub dangling_parent_pointer_count: i64,
    pub parent_outside_closure_count: i64,
    pub duplicate_node_id_count: i64,
}

impl StructuralInvariantSummary {
    pub fn entries(&self) -> [(&'static str, i64); 5] {
        [
            ("reflexive_edge_missing", self.reflexive_edge_missing_count),
            ("parent_required_missing", self.parent_required_missing_count),
            ("dangling_parent_pointer", self.dangling_parent_pointer_count),
            ("parent_outside_closure", self.parent_outside_closure_count),
            ("duplicate_node_id", self.duplicate_node_id_count),
        ]
    }

    pub fn is_clean(&self) -> bool {
        self.entries().iter().all(|(_, count)| *count == 0)
    }
}

pub fn collect_structural_invariants(connection: &Connection) -> Result<StructuralInvariantSummary> {
    Ok(StructuralInvariantSummary {
        reflexive_edge_missing_count: query_violation_count(
            connection,
            "
            SELECT COUNT(*)
            FROM (
              SELECT ancestor_id AS node_id FROM closure
              UNION
              SELECT child_id FROM closure
            ) ids
            WHERE NOT EXISTS (
              SELECT 1 FROM closure c
              WHERE c.ancestor_id = ids.node_id AND c.child_id = ids.node_id
            )
            ",
        )?,
        parent_required_missing_count: query_violation_count(
            connection,
            "
            SELECT COUNT(*)
            FROM nodes n
            WHERE n.scraped_code_id IS NOT NULL
              AND n.parent_id IS NULL
              AND EXISTS (
                SELECT 1 FROM closure c
                WHERE c.child_id = n.scraped_code_id
                  AND c.ancestor_id <> c.child_id
              )
            ",
        )?,
        dangling_parent_pointer_count: query_violation_count(
            connection,
            "
            SELECT COUNT(*)
            FROM nodes child
            LEFT JOIN nodes parent ON parent.scraped_code_id = child.parent_id
            WHERE child.parent_id IS NOT NULL
              AND parent.row_number IS NULL
            ",
        )?,
        parent_outside_closure_count: query_violation_count(
            connection,
            "
            SELECT COUNT(*)
            FROM nodes n
            WHERE n.parent_id IS NOT NULL
              AND NOT EXISTS (
                SELECT 1 FROM closure c
                WHERE c.ancestor_id = n.parent_id
                  AND c.child_id = n.scraped_code_id
              )
            ",
        )?,
        duplicate_node_id_count: query_violation_count(
            connection,
            "
            SELECT COUNT(*)
            FROM (
              SELECT scraped_code_id
              FROM nodes
              WHERE scraped_code_id IS NOT NULL
              GROUP BY scraped_code_id
              HAVING COUNT(*) > 1
            )
            ",
        )?,
    })
}

fn query_violation_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
