use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AncestorEdge, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLookup {
    Parent(NodeId),
    Root,
    Ambiguous(Vec<NodeId>),
    Unknown,
}

/// Strict-ancestor sets keyed by descendant.
#[derive(Debug, Clone, Default)]
pub struct ClosureIndex {
    strict_ancestors: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl ClosureIndex {
    pub fn from_edges(edges: &[AncestorEdge]) -> Self {
        let mut strict_ancestors: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for raw in edges {
            let edge = AncestorEdge::new(
                NodeId::parse(raw.ancestor.as_str()),
                NodeId::parse(raw.descendant.as_str()),
            );
            strict_ancestors.entry(edge.ancestor.clone()).or_default();
            let ancestors = strict_ancestors.entry(edge.descendant.clone()).or_default();
            if !edge.is_reflexive() {
                ancestors.insert(edge.ancestor);
            }
        }

        Self { strict_ancestors }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.strict_ancestors.keys()
    }

    pub fn len(&self) -> usize {
        self.strict_ancestors.len()
    }

    /// The nearest ancestor is the one with no other ancestor of `node`
    /// strictly below it. More than one such candidate means the closure is
    /// not a tree; the candidates are returned rather than picking one.
    pub fn immediate_parent(&self, node: &NodeId) -> ParentLookup {
        let Some(ancestors) = self.strict_ancestors.get(node) else {
            return ParentLookup::Unknown;
        };
        if ancestors.is_empty() {
            return ParentLookup::Root;
        }

        let mut nearest = ancestors
            .iter()
            .filter(|candidate| {
                !ancestors.iter().any(|other| {
                    other != *candidate
                        && self
                            .strict_ancestors
                            .get(other)
                            .is_some_and(|above| above.contains(*candidate))
                })
            })
            .cloned()
            .collect::<Vec<NodeId>>();

        match nearest.len() {
            1 => ParentLookup::Parent(nearest.remove(0)),
            // Every ancestor sits below another one: the ancestors form a cycle.
            0 => ParentLookup::Ambiguous(ancestors.iter().cloned().collect()),
            _ => ParentLookup::Ambiguous(nearest),
        }
    }
}
