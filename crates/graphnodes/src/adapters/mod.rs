//! Built-in transports for connector and destination nodes

mod http;
mod memory;
mod static_source;

pub use http::HttpDataSource;
pub use memory::MemoryDestination;
pub use static_source::StaticDataSource;
