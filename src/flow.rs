//! Diagram construction
//!
//! [`FlowDiagram`] runs the whole build pipeline once: hierarchy, layout,
//! routes, distribution. Any structural error aborts construction. The
//! finished diagram is read-only and hands out simulators that borrow it.

use serde::Serialize;
use serde_json::Value;

use crate::config::FlowConfig;
use crate::distribution::Distribution;
use crate::error::{FlowError, FlowResult};
use crate::hierarchy::{HierarchyBuilder, LeafClassifier, MarkerField, Node};
use crate::layout::{Label, Layout};
use crate::route::{RouteCache, RouteDescriptor};
use crate::simulation::{ParticleSimulator, SimulationConfig, SimulationState};

/// Everything a renderer needs to draw the static part of the diagram
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    pub width: f64,
    pub band_extent: f64,
    pub routes: Vec<RouteDescriptor>,
    pub labels: Vec<Label>,
}

/// A built diagram: tree, layout, routes and distribution
#[derive(Debug, Clone)]
pub struct FlowDiagram {
    config: FlowConfig,
    tree: Node,
    layout: Layout,
    routes: RouteCache,
    distribution: Distribution,
    simulation: SimulationConfig,
    target_routes: Vec<usize>,
}

impl FlowDiagram {
    /// Build from nested counts, classifying leaves by
    /// `config.leaf_marker_field`.
    ///
    /// # Errors
    ///
    /// Returns the first structural error: invalid config, invalid or empty
    /// hierarchy, or empty distribution.
    pub fn build(input: &Value, config: FlowConfig) -> FlowResult<Self> {
        let classifier = MarkerField::new(config.leaf_marker_field.clone());
        Self::build_with(input, config, classifier)
    }

    /// Build with a custom leaf classifier
    pub fn build_with<C: LeafClassifier>(
        input: &Value,
        config: FlowConfig,
        classifier: C,
    ) -> FlowResult<Self> {
        config.validate()?;

        let tree = HierarchyBuilder::new(classifier)
            .with_root_name(config.root_name.clone())
            .build(input)?;
        let layout = Layout::compute(&tree, &config.layout())?;
        let routes = RouteCache::build(&layout, &config.route());
        let distribution = Distribution::from_tree(&tree)?;

        let target_routes = distribution
            .targets()
            .iter()
            .map(|t| {
                routes.index_of(&t.leaf_name).ok_or_else(|| {
                    FlowError::InvalidHierarchy(format!("no route for leaf '{}'", t.leaf_name))
                })
            })
            .collect::<FlowResult<Vec<_>>>()?;

        tracing::info!(
            leaves = layout.leaf_count,
            targets = distribution.targets().len(),
            particles = distribution.total(),
            "built flow diagram"
        );

        Ok(Self {
            simulation: config.simulation(),
            config,
            tree,
            layout,
            routes,
            distribution,
            target_routes,
        })
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn tree(&self) -> &Node {
        &self.tree
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn routes(&self) -> &RouteCache {
        &self.routes
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Particles a full run will create
    pub fn total_particles(&self) -> u64 {
        self.distribution.total()
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            width: self.config.width,
            band_extent: self.layout.band_extent,
            routes: self.routes.descriptors(),
            labels: self.layout.labels(),
        }
    }

    /// A fresh simulation state for this diagram
    pub fn new_state(&self) -> SimulationState {
        SimulationState::new(&self.distribution)
    }

    pub fn simulator(&self) -> ParticleSimulator<'_> {
        ParticleSimulator::new(
            &self.routes,
            &self.distribution,
            &self.simulation,
            &self.target_routes,
        )
    }
}
