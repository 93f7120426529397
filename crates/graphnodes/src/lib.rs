//! Standard node library
//!
//! Built-in node behaviors, their catalog entries, and the default I/O
//! adapters they talk to.

pub mod adapters;
mod collection;
mod compare;
mod connector;
mod debug;
mod flow;
mod logic;
mod math;
mod time;
mod transform;
mod variable;

pub use collection::{AggregateNode, FilterNode};
pub use compare::Operator;
pub use connector::{ConnectorNode, DestinationNode};
pub use debug::DebugNode;
pub use flow::{InputNode, OutputNode};
pub use logic::ConditionalNode;
pub use math::AddNode;
pub use time::DelayNode;
pub use transform::{JsonParseNode, JsonStringifyNode};
pub use variable::VariableNode;

use adapters::{HttpDataSource, MemoryDestination, StaticDataSource};
use graphcore::{AdapterRegistry, Catalog};
use graphruntime::{CapabilityRegistry, CatalogSource};
use std::sync::Arc;

/// Name of the built-in catalog source
pub const SOURCE_NAME: &str = "builtin";

/// Catalog entries for every built-in node type
pub fn catalog() -> Catalog {
    [
        flow::definitions(),
        math::definitions(),
        collection::definitions(),
        logic::definitions(),
        variable::definitions(),
        connector::definitions(),
        transform::definitions(),
        debug::definitions(),
        time::definitions(),
    ]
    .into_iter()
    .flatten()
    .fold(Catalog::new(), Catalog::with)
}

/// Built-in catalog bundled with the modules its references resolve to
pub fn source() -> CatalogSource {
    CatalogSource::new(SOURCE_NAME, catalog())
        .with_module(flow::module())
        .with_module(math::module())
        .with_module(collection::module())
        .with_module(logic::module())
        .with_module(variable::module())
        .with_module(connector::module())
        .with_module(transform::module())
        .with_module(debug::module())
        .with_module(time::module())
}

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut CapabilityRegistry) {
    registry.register_source(source());
}

/// `static` and `http` data sources plus a `memory` destination.
pub fn default_adapters() -> AdapterRegistry {
    let mut adapters = AdapterRegistry::new();
    adapters.register_data_source("static", Arc::new(StaticDataSource::new()));
    adapters.register_data_source("http", Arc::new(HttpDataSource::new()));
    adapters.register_output_destination("memory", Arc::new(MemoryDestination::new()));
    adapters
}
