pub mod cli;
pub mod github;
pub mod ingest_api;
pub mod load_config;
pub mod store;

pub use cli::{run, Cli, Commands};
