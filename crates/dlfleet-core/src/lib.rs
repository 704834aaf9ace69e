//! Fleet download coordinator: a coordinator that accepts download jobs over
//! HTTP and tracks their progress, and agents that pull jobs from a shared
//! queue and stream progress back over a message bus.

pub mod agent;
pub mod broadcast;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod registry;
pub mod submit;
pub mod wire;
