//! Flow execution runtime
//!
//! This crate resolves node types to behavior, runs flows node by node in
//! dependency order, and recomputes downstream results incrementally while a
//! graph is being edited.

mod executor;
mod reactive;
mod registry;
mod runtime;

pub use executor::{FlowExecutor, FlowOutput, FlowRun, NodeOutcome, RunRequest};
pub use reactive::{ReactiveEngine, ResultStore};
pub use registry::{CapabilityRegistry, CatalogSource, Export, FunctionKind, NodeModule};
pub use runtime::{FlowRuntime, RuntimeConfig};
