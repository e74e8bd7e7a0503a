//! Hierarchy normalization
//!
//! Converts a nested counts object into a [`Node`] tree with a synthetic
//! root. Branch values are objects; leaf values are records of numeric
//! group counts. Which records count as leaves is decided by an injected
//! [`LeafClassifier`].

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FlowError, FlowResult};

/// Default name of the field that marks a record as a leaf
pub const DEFAULT_LEAF_MARKER: &str = "failed";

/// Default name of the synthetic root node
pub const DEFAULT_ROOT_NAME: &str = "root";

/// Largest count magnitude accepted on a leaf (2^53, the last integer an
/// `f64` holds exactly)
pub const MAX_COUNT: f64 = 9_007_199_254_740_992.0;

/// A named count on a leaf (e.g. `failed: 3`)
///
/// `value` is always a whole number; its magnitude is the particle count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: String,
    pub value: f64,
}

/// A node of the normalized tree
///
/// Leaves carry `groups` and no `children`; internal nodes carry
/// `children` and no `groups`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && !self.groups.is_empty()
    }

    /// Leaves below this node, depth-first in sibling order
    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Node>) {
        if self.is_leaf() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }
}

/// Decides whether a record is a leaf
pub trait LeafClassifier {
    fn is_leaf(&self, fields: &Map<String, Value>) -> bool;
}

/// Classifies a record as a leaf when it has a given field
#[derive(Debug, Clone)]
pub struct MarkerField(pub String);

impl MarkerField {
    pub fn new(field: impl Into<String>) -> Self {
        Self(field.into())
    }
}

impl Default for MarkerField {
    fn default() -> Self {
        Self::new(DEFAULT_LEAF_MARKER)
    }
}

impl LeafClassifier for MarkerField {
    fn is_leaf(&self, fields: &Map<String, Value>) -> bool {
        fields.contains_key(&self.0)
    }
}

impl<F> LeafClassifier for F
where
    F: Fn(&Map<String, Value>) -> bool,
{
    fn is_leaf(&self, fields: &Map<String, Value>) -> bool {
        self(fields)
    }
}

/// Builds a [`Node`] tree from nested counts
pub struct HierarchyBuilder<C> {
    classifier: C,
    root_name: String,
}

impl Default for HierarchyBuilder<MarkerField> {
    fn default() -> Self {
        Self::new(MarkerField::default())
    }
}

impl<C: LeafClassifier> HierarchyBuilder<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            root_name: DEFAULT_ROOT_NAME.to_string(),
        }
    }

    /// Use a different name for the synthetic root
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Normalize `input` into a tree rooted at a synthetic root node.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidHierarchy`] if a record mixes leaf and
    /// branch markers, a branch or leaf is empty, a count is fractional or
    /// out of range, a value is not an object, or two nodes share a name.
    pub fn build(&self, input: &Value) -> FlowResult<Node> {
        let fields = input.as_object().ok_or_else(|| {
            FlowError::InvalidHierarchy("top-level input must be an object".to_string())
        })?;

        let mut seen = HashSet::new();
        seen.insert(self.root_name.clone());

        let mut children = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            children.push(self.build_node(name, value, &mut seen)?);
        }

        Ok(Node {
            name: self.root_name.clone(),
            groups: Vec::new(),
            children,
        })
    }

    fn build_node(&self, name: &str, value: &Value, seen: &mut HashSet<String>) -> FlowResult<Node> {
        if !seen.insert(name.to_string()) {
            return Err(FlowError::InvalidHierarchy(format!(
                "duplicate node name '{name}'"
            )));
        }

        let fields = value.as_object().ok_or_else(|| {
            FlowError::InvalidHierarchy(format!("node '{name}' must be an object"))
        })?;

        if self.classifier.is_leaf(fields) {
            if fields.is_empty() {
                return Err(FlowError::InvalidHierarchy(format!(
                    "leaf '{name}' has no groups"
                )));
            }
            let groups = fields
                .iter()
                .map(|(key, v)| match v.as_f64() {
                    Some(count) if count.fract() == 0.0 && count.abs() <= MAX_COUNT => {
                        Ok(Group {
                            key: key.clone(),
                            value: count,
                        })
                    }
                    Some(count) => Err(FlowError::InvalidHierarchy(format!(
                        "leaf '{name}' has count {count} at field '{key}'; \
                         counts must be whole numbers of at most {MAX_COUNT}"
                    ))),
                    None => Err(FlowError::InvalidHierarchy(format!(
                        "leaf '{name}' mixes leaf and branch markers at field '{key}'"
                    ))),
                })
                .collect::<FlowResult<Vec<_>>>()?;

            return Ok(Node {
                name: name.to_string(),
                groups,
                children: Vec::new(),
            });
        }

        if fields.is_empty() {
            return Err(FlowError::InvalidHierarchy(format!(
                "branch '{name}' has no children"
            )));
        }

        let mut children = Vec::with_capacity(fields.len());
        for (child_name, child) in fields {
            if !child.is_object() {
                return Err(FlowError::InvalidHierarchy(format!(
                    "branch '{name}' mixes leaf and branch markers at field '{child_name}'"
                )));
            }
            children.push(self.build_node(child_name, child, seen)?);
        }

        Ok(Node {
            name: name.to_string(),
            groups: Vec::new(),
            children,
        })
    }
}
