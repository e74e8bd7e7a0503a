//! flowsplit - Animated particle flow diagrams for hierarchical count data.
//!
//! Turns nested counts (e.g. failed/success per service) into a branching
//! set of curved routes and a particle simulation whose arrivals reproduce
//! the input proportions exactly. Drawing is left to the caller: the crate
//! produces geometry and per-tick frames as plain data.

pub mod config;
pub mod distribution;
pub mod error;
pub mod flow;
pub mod hierarchy;
pub mod io;
pub mod layout;
pub mod route;
pub mod simulation;

pub use config::FlowConfig;
pub use error::{FlowError, FlowResult};
pub use flow::{FlowDiagram, Geometry};
pub use simulation::{Frame, SimulationState};
