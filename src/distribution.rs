//! Weighted target distribution
//!
//! Every non-zero (leaf, group) count becomes a [`Target`] whose weight is
//! its share of the grand total. Sampling is inverse-CDF over cumulative
//! thresholds, located by binary search. Zero counts get no target but keep
//! a [`Slot`] so they can still be reported.

use rand::Rng;
use serde::Serialize;

use crate::error::{FlowError, FlowResult};
use crate::hierarchy::Node;

/// A destination: one group of one leaf
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub leaf_name: String,
    pub group_key: String,
    /// Share of the grand total, in `(0, 1]`
    pub weight: f64,
    /// Absolute count the weight was normalized from
    pub count: u64,
}

impl Target {
    /// `leaf/group` label
    pub fn label(&self) -> String {
        format!("{}/{}", self.leaf_name, self.group_key)
    }
}

/// One (leaf, group) pair of the input, zero counts included
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub leaf_name: String,
    pub group_key: String,
    /// Index into the targets, `None` for a zero count
    pub target: Option<usize>,
}

/// Discrete distribution over targets
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    targets: Vec<Target>,
    slots: Vec<Slot>,
    thresholds: Vec<f64>,
    total: u64,
}

impl Distribution {
    /// Build from the leaves of `tree`, depth-first, groups in input order.
    ///
    /// Counts are taken as absolute values; the hierarchy guarantees they
    /// are whole numbers.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::EmptyDistribution`] if every count is zero.
    pub fn from_tree(tree: &Node) -> FlowResult<Self> {
        let counts: Vec<(String, String, u64)> = tree
            .leaves()
            .into_iter()
            .flat_map(|leaf| {
                leaf.groups
                    .iter()
                    .map(move |g| (leaf.name.clone(), g.key.clone(), g.value.abs() as u64))
            })
            .collect();

        Self::from_counts(counts)
    }

    /// Build from explicit `(leaf, group, count)` triples
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::EmptyDistribution`] if every count is zero and
    /// [`FlowError::InvalidHierarchy`] if the counts overflow a `u64` total.
    pub fn from_counts(
        counts: impl IntoIterator<Item = (String, String, u64)>,
    ) -> FlowResult<Self> {
        let counts: Vec<_> = counts.into_iter().collect();
        let total = counts
            .iter()
            .try_fold(0u64, |sum, (_, _, c)| sum.checked_add(*c))
            .ok_or_else(|| {
                FlowError::InvalidHierarchy("total count overflows a 64-bit counter".to_string())
            })?;
        if total == 0 {
            return Err(FlowError::EmptyDistribution);
        }

        let mut targets = Vec::with_capacity(counts.len());
        let mut slots = Vec::with_capacity(counts.len());
        let mut thresholds = Vec::with_capacity(counts.len());
        let mut running = 0u64;
        for (leaf_name, group_key, count) in counts {
            if count == 0 {
                slots.push(Slot {
                    leaf_name,
                    group_key,
                    target: None,
                });
                continue;
            }
            // Cannot overflow: bounded by `total`
            running += count;
            thresholds.push(running as f64 / total as f64);
            slots.push(Slot {
                leaf_name: leaf_name.clone(),
                group_key: group_key.clone(),
                target: Some(targets.len()),
            });
            targets.push(Target {
                leaf_name,
                group_key,
                weight: count as f64 / total as f64,
                count,
            });
        }
        if let Some(last) = thresholds.last_mut() {
            *last = 1.0;
        }

        Ok(Self {
            targets,
            slots,
            thresholds,
            total,
        })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Every input (leaf, group) pair in target order
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Sum of all target counts
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Index of the target selected by `u` in `[0, 1)`.
    ///
    /// A `u` exactly on a threshold selects the following target.
    pub fn index_for(&self, u: f64) -> usize {
        self.thresholds
            .partition_point(|&t| t <= u)
            .min(self.targets.len() - 1)
    }

    /// Draw a target index
    pub fn sample_index<R: Rng>(&self, rng: &mut R) -> usize {
        self.index_for(rng.random::<f64>())
    }

    /// Draw a target
    pub fn sample<R: Rng>(&self, rng: &mut R) -> &Target {
        &self.targets[self.sample_index(rng)]
    }
}
