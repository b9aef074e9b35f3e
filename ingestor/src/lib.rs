// Library exports for the binary and the integration tests

pub mod config;
pub mod extract;
pub mod row_parser;
pub mod schema;
pub mod server;
pub mod store;
pub mod types;
pub mod upload;
pub mod writer;
