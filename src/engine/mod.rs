// dualstore Engine - Core module structure
pub mod adapter;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod nosql;
pub mod resource;

pub use config::ConnectorConfig;
pub use error::ConnectorError;
pub use resource::{Connector, RequestOptions};
