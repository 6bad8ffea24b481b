use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::model::{
    AncestorEdge, COMBINED_CODE_COLUMN, IMMEDIATE_PARENT_COLUMN, NodeId, SCRAPED_ID_COLUMN,
    SCRAPED_SHORT_NAME_COLUMN, normalize_node_id,
};
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMatch {
    pub row_number: i64,
    pub node_id: Option<NodeId>,
    pub code: Option<String>,
    pub short_name: Option<String>,
}

/// Closure edges and merged node rows, held in an in-memory database for the
/// lifetime of one verification run.
pub struct LineageStore {
    connection: Connection,
}

impl LineageStore {
    pub fn load(edges: &[AncestorEdge], nodes: &Table) -> Result<Self> {
        let code_column = nodes
            .require_column(COMBINED_CODE_COLUMN)
            .context("merged table cannot resolve code literals")?;
        let id_column = nodes
            .require_column(SCRAPED_ID_COLUMN)
            .context("merged table has no scraped node ids")?;
        let name_column = nodes
            .require_column(SCRAPED_SHORT_NAME_COLUMN)
            .context("merged table cannot resolve labels")?;
        let parent_column = nodes
            .require_column(IMMEDIATE_PARENT_COLUMN)
            .context("merged table has no parent pointers")?;

        let mut connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        ensure_schema(&connection)?;

        let tx = connection.transaction()?;
        {
            let mut insert_edge = tx.prepare(
                "INSERT OR IGNORE INTO closure (ancestor_id, child_id) VALUES (?1, ?2)",
            )?;
            for edge in edges {
                insert_edge.execute(params![
                    normalize_node_id(edge.ancestor.as_str()),
                    normalize_node_id(edge.descendant.as_str())
                ])?;
            }

            let mut insert_node = tx.prepare(
                "
                INSERT INTO nodes (row_number, combined_code, scraped_code_id, short_name, parent_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )?;
            for (index, row) in nodes.rows().iter().enumerate() {
                insert_node.execute(params![
                    (index + 1) as i64,
                    nodes.cell(row, code_column),
                    nodes.cell(row, id_column).map(normalize_node_id),
                    nodes.cell(row, name_column),
                    nodes.cell(row, parent_column).map(normalize_node_id),
                ])?;
            }
        }
        tx.commit().context("failed to load verification tables")?;

        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn rows_with_code(&self, code: &str) -> Result<Vec<NodeMatch>> {
        self.matching_rows(
            "
            SELECT row_number, scraped_code_id, combined_code, short_name
            FROM nodes
            WHERE combined_code = ?1
            ORDER BY row_number
            ",
            code,
        )
    }

    pub fn rows_with_short_name(&self, label: &str) -> Result<Vec<NodeMatch>> {
        self.matching_rows(
            "
            SELECT row_number, scraped_code_id, combined_code, short_name
            FROM nodes
            WHERE short_name = ?1
            ORDER BY row_number
            ",
            label,
        )
    }

    fn matching_rows(&self, sql: &str, value: &str) -> Result<Vec<NodeMatch>> {
        let mut statement = self.connection.prepare(sql)?;
        let mut rows = statement.query(params![value])?;
        let mut matches = Vec::new();

        while let Some(row) = rows.next()? {
            matches.push(NodeMatch {
                row_number: row.get(0)?,
                node_id: row.get::<_, Option<String>>(1)?.map(NodeId),
                code: row.get(2)?,
                short_name: row.get(3)?,
            });
        }

        Ok(matches)
    }

    /// True iff the closure table holds the edge (ancestor, descendant).
    pub fn closure_contains(&self, ancestor: &NodeId, descendant: &NodeId) -> Result<bool> {
        let found = self.connection.query_row(
            "
            SELECT EXISTS(
              SELECT 1 FROM closure WHERE ancestor_id = ?1 AND child_id = ?2
            )
            ",
            params![ancestor.as_str(), descendant.as_str()],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(found)
    }

    /// True iff following parent pointers from `descendant` reaches
    /// `ancestor` within `max_hops` steps.
    pub fn parent_chain_reaches(
        &self,
        descendant: &NodeId,
        ancestor: &NodeId,
        max_hops: usize,
    ) -> Result<bool> {
        let found = self.connection.query_row(
            "
            WITH RECURSIVE chain(node_id, hops) AS (
              SELECT ?1, 0

              UNION ALL

              SELECT n.parent_id, c.hops + 1
              FROM chain c
              JOIN nodes n ON n.scraped_code_id = c.node_id
              WHERE n.parent_id IS NOT NULL
                AND c.hops < ?3
            )
            SELECT EXISTS(
              SELECT 1 FROM chain WHERE node_id = ?2 AND hops > 0
            )
            ",
            params![descendant.as_str(), ancestor.as_str(), max_hops as i64],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(found)
    }
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE closure (
              ancestor_id TEXT NOT NULL,
              child_id TEXT NOT NULL,
              PRIMARY KEY (ancestor_id, child_id)
            );

            CREATE TABLE nodes (
              row_number INTEGER PRIMARY KEY,
              combined_code TEXT,
              scraped_code_id TEXT,
              short_name TEXT,
              parent_id TEXT
            );

            CREATE INDEX idx_closure_child ON closure(child_id);
            CREATE INDEX idx_nodes_code ON nodes(combined_code);
            CREATE INDEX idx_nodes_scraped_id ON nodes(scraped_code_id);
            CREATE INDEX idx_nodes_short_name ON nodes(short_name);
            ",
        )
        .context("failed to create verification schema")
}
