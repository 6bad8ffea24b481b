use anyhow::{Context, Result, bail};
use regex::Regex;
use serde_json::Value;

use crate::model::NodeId;

/// One parent declaration read from the tree source. A node nested under a
/// parent and also carrying a different `pId` yields two declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNodeRecord {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub name: String,
}

pub fn parse_tree_source(raw: &str) -> Result<Vec<TreeNodeRecord>> {
    let trimmed = raw.trim_start();
    let json = if trimmed.starts_with('[') || trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        extract_treenodes_json(raw)?
    };

    let value: Value = serde_json::from_str(&json).context("failed to parse treenodes json")?;
    flatten_tree_value(&value)
}

/// Pulls the `var treenodes = [...];` assignment out of the saved taxonomy page.
pub fn extract_treenodes_json(html: &str) -> Result<String> {
    let pattern = Regex::new(r"(?s)var\s+treenodes\s*=\s*(\[.*?\]);")
        .context("failed to compile treenodes regex")?;

    let captures = pattern
        .captures(html)
        .context("could not find a treenodes assignment in the page")?;

    Ok(captures
        .get(1)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default())
}

pub fn flatten_tree_value(value: &Value) -> Result<Vec<TreeNodeRecord>> {
    let top_level: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("treenodes") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(_) => bail!("'treenodes' must be an array"),
            None => vec![value],
        },
        _ => bail!("tree source must be a json array or object"),
    };

    let mut records = Vec::new();
    let mut work: Vec<(&Value, Option<NodeId>)> =
        top_level.into_iter().rev().map(|node| (node, None)).collect();

    while let Some((node, inherited_parent)) = work.pop() {
        let Value::Object(map) = node else {
            bail!("tree node must be a json object, found: {node}");
        };

        let id = map
            .get("id")
            .and_then(json_id)
            .with_context(|| format!("tree node without a usable id: {node}"))?;
        let declared_parent = map.get("pId").and_then(json_id).filter(|id| !is_root_marker(id));
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        match (&inherited_parent, declared_parent) {
            (Some(inherited), Some(declared)) if *inherited != declared => {
                records.push(TreeNodeRecord {
                    id: id.clone(),
                    parent: Some(inherited.clone()),
                    name: name.clone(),
                });
                records.push(TreeNodeRecord {
                    id: id.clone(),
                    parent: Some(declared),
                    name,
                });
            }
            (Some(inherited), _) => records.push(TreeNodeRecord {
                id: id.clone(),
                parent: Some(inherited.clone()),
                name,
            }),
            (None, declared) => records.push(TreeNodeRecord {
                id: id.clone(),
                parent: declared,
                name,
            }),
        }

        if let Some(children) = map.get("children") {
            let Value::Array(children) = children else {
                bail!("'children' of node {id} must be an array");
            };
            for child in children.iter().rev() {
                work.push((child, Some(id.clone())));
            }
        }
    }

    Ok(records)
}

fn json_id(value: &Value) -> Option<NodeId> {
    match value {
        Value::Number(number) => Some(NodeId::parse(&number.to_string())),
        Value::String(text) if !text.trim().is_empty() => Some(NodeId::parse(text)),
        _ => None,
    }
}

fn is_root_marker(id: &NodeId) -> bool {
    id.as_str() == "0"
}
