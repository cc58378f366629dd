pub mod config;

pub use config::{Config, DaemonConfig, EndpointConfig};
