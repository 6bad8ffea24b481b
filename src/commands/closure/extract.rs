use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::{AncestorEdge, NodeId};

use super::tree::TreeNodeRecord;

/// Tree ids that carry website commentary rather than taxonomy nodes.
pub const IGNORED_NODE_IDS: [&str; 3] = ["5", "2712", "2714"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeStructureError {
    MultipleParents {
        node_id: NodeId,
        parents: Vec<NodeId>,
    },
    Cycle {
        node_ids: Vec<NodeId>,
    },
}

impl fmt::Display for TreeStructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleParents { node_id, parents } => {
                write!(f, "node {node_id} is declared under several parents: ")?;
                write_ids(f, parents)
            }
            Self::Cycle { node_ids } => {
                write!(f, "parent pointers form a cycle through: ")?;
                write_ids(f, node_ids)
            }
        }
    }
}

impl std::error::Error for TreeStructureError {}

fn write_ids(f: &mut fmt::Formatter<'_>, ids: &[NodeId]) -> fmt::Result {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{id}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureOutcome {
    pub edges: Vec<AncestorEdge>,
    pub node_count: usize,
    pub ignored_count: usize,
    /// Nodes whose declared parent was ignored or absent, promoted to top level.
    pub detached: Vec<NodeId>,
}

pub fn default_ignored_ids() -> BTreeSet<NodeId> {
    IGNORED_NODE_IDS.iter().map(|id| NodeId::new(*id)).collect()
}

pub fn build_closure(
    records: &[TreeNodeRecord],
    ignored: &BTreeSet<NodeId>,
) -> Result<ClosureOutcome, TreeStructureError> {
    let nodes = records
        .iter()
        .map(|record| &record.id)
        .filter(|id| !ignored.contains(*id))
        .cloned()
        .collect::<BTreeSet<NodeId>>();
    let ignored_count = records
        .iter()
        .map(|record| &record.id)
        .filter(|id| ignored.contains(*id))
        .collect::<BTreeSet<&NodeId>>()
        .len();

    let mut parents_of: BTreeMap<&NodeId, BTreeSet<&NodeId>> = BTreeMap::new();
    let mut detached = BTreeSet::new();
    for record in records {
        if !nodes.contains(&record.id) {
            continue;
        }
        let entry = parents_of.entry(&record.id).or_default();
        match &record.parent {
            Some(parent) if nodes.contains(parent) => {
                entry.insert(parent);
            }
            Some(_) => {
                detached.insert(record.id.clone());
            }
            None => {}
        }
    }

    let mut children_of: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
    let mut roots = Vec::new();
    for (node, parents) in &parents_of {
        if parents.len() > 1 {
            return Err(TreeStructureError::MultipleParents {
                node_id: (*node).clone(),
                parents: parents.iter().map(|parent| (*parent).clone()).collect(),
            });
        }
        match parents.iter().next() {
            Some(parent) => children_of.entry(*parent).or_default().push(*node),
            None => roots.push(*node),
        }
    }
    detached.retain(|id| parents_of.get(id).is_some_and(|parents| parents.is_empty()));

    // Depth-first over the adjacency map; `path` holds the ancestors of the
    // node being visited, root first.
    let mut edges = Vec::new();
    let mut visited = BTreeSet::new();
    let mut path: Vec<&NodeId> = Vec::new();
    let mut work: Vec<(&NodeId, usize)> = roots.iter().rev().map(|root| (*root, 0)).collect();

    while let Some((node, depth)) = work.pop() {
        path.truncate(depth);
        path.push(node);
        visited.insert(node);

        for ancestor in &path {
            edges.push(AncestorEdge::new((*ancestor).clone(), node.clone()));
        }

        if let Some(children) = children_of.get(node) {
            for child in children.iter().rev() {
                work.push((*child, depth + 1));
            }
        }
    }

    if visited.len() < nodes.len() {
        let node_ids = nodes
            .iter()
            .filter(|id| !visited.contains(id))
            .cloned()
            .collect();
        return Err(TreeStructureError::Cycle { node_ids });
    }

    edges.sort();
    edges.dedup();

    Ok(ClosureOutcome {
        edges,
        node_count: nodes.len(),
        ignored_count,
        detached: detached.into_iter().collect(),
    })
}
