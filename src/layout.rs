//! Cluster layout
//!
//! Places leaves at evenly spaced band centers and every internal node at
//! the mean band position of its children. The depth axis is split evenly
//! between tree levels across the available width.
//!
//! Coordinates follow the usual dendrogram convention: `x` is the band
//! axis and `y` the depth axis. [`PositionedNode::point`] swaps them into
//! screen space, where the flow runs left to right.

use serde::Serialize;

use crate::error::{FlowError, FlowResult};
use crate::hierarchy::{Group, Node};

/// A point in screen space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Linear interpolation toward `other` by `t` in `[0, 1]`
    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Layout parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Band-axis space reserved per leaf route
    pub band_height: f64,
    /// Multiplier (>= 1) separating neighboring bands
    pub padding: f64,
    /// Total width available along the depth axis
    pub width: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    /// Put every leaf at the far edge instead of at its own depth
    pub align_leaves: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            band_height: 10.0,
            padding: 1.5,
            width: 960.0,
            margin_left: 20.0,
            margin_right: 140.0,
            align_leaves: false,
        }
    }
}

impl LayoutConfig {
    fn band_slot(&self) -> f64 {
        self.band_height * self.padding
    }

    fn depth_extent(&self) -> f64 {
        (self.width - self.margin_left - self.margin_right).max(0.0)
    }
}

/// A tree node with layout coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedNode {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    /// Distance from the root in edges
    pub depth: usize,
    /// Band-axis position
    pub x: f64,
    /// Depth-axis position
    pub y: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PositionedNode>,
}

impl PositionedNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Screen position (depth to the right, bands downward)
    pub fn point(&self) -> Point {
        Point::new(self.y, self.x)
    }
}

/// Where a node label should be drawn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub leaf: bool,
}

/// Result of laying out a hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub root: PositionedNode,
    pub leaf_count: usize,
    /// Band-axis extent: `leaf_count * band_height * padding`
    pub band_extent: f64,
    /// Depth-axis extent: width minus margins
    pub depth_extent: f64,
}

impl Layout {
    /// Lay out `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::EmptyHierarchy`] if the tree has no leaves.
    pub fn compute(tree: &Node, config: &LayoutConfig) -> FlowResult<Self> {
        let leaf_count = tree.leaves().len();
        if leaf_count == 0 {
            return Err(FlowError::EmptyHierarchy);
        }

        let max_depth = max_depth(tree);
        let mut next_leaf = 0usize;
        let root = place(tree, 0, max_depth, config, &mut next_leaf);

        tracing::debug!(leaf_count, max_depth, "computed cluster layout");

        Ok(Self {
            root,
            leaf_count,
            band_extent: leaf_count as f64 * config.band_slot(),
            depth_extent: config.depth_extent(),
        })
    }

    /// Ancestor screen points for each leaf, root first, in leaf order
    pub fn routes(&self) -> Vec<(String, Vec<Point>)> {
        let mut out = Vec::with_capacity(self.leaf_count);
        let mut trail = Vec::new();
        collect_routes(&self.root, &mut trail, &mut out);
        out
    }

    /// Label position for every node, depth-first
    pub fn labels(&self) -> Vec<Label> {
        let mut out = Vec::new();
        collect_labels(&self.root, &mut out);
        out
    }
}

fn max_depth(node: &Node) -> usize {
    node.children
        .iter()
        .map(|c| 1 + max_depth(c))
        .max()
        .unwrap_or(0)
}

fn place(
    node: &Node,
    depth: usize,
    max_depth: usize,
    config: &LayoutConfig,
    next_leaf: &mut usize,
) -> PositionedNode {
    let children: Vec<PositionedNode> = node
        .children
        .iter()
        .map(|c| place(c, depth + 1, max_depth, config, next_leaf))
        .collect();

    let x = if children.is_empty() {
        let slot = *next_leaf;
        *next_leaf += 1;
        (slot as f64 + 0.5) * config.band_slot()
    } else {
        children.iter().map(|c| c.x).sum::<f64>() / children.len() as f64
    };

    let level = if children.is_empty() && config.align_leaves {
        max_depth
    } else {
        depth
    };
    let fraction = if max_depth == 0 {
        0.0
    } else {
        level as f64 / max_depth as f64
    };

    PositionedNode {
        name: node.name.clone(),
        groups: node.groups.clone(),
        depth,
        x,
        y: config.margin_left + fraction * config.depth_extent(),
        children,
    }
}

fn collect_routes(
    node: &PositionedNode,
    trail: &mut Vec<Point>,
    out: &mut Vec<(String, Vec<Point>)>,
) {
    trail.push(node.point());
    if node.is_leaf() {
        out.push((node.name.clone(), trail.clone()));
    }
    for child in &node.children {
        collect_routes(child, trail, out);
    }
    trail.pop();
}

fn collect_labels(node: &PositionedNode, out: &mut Vec<Label>) {
    let p = node.point();
    out.push(Label {
        name: node.name.clone(),
        x: p.x,
        y: p.y,
        leaf: node.is_leaf(),
    });
    for child in &node.children {
        collect_labels(child, out);
    }
}
