pub mod allocation;
pub mod balance;
pub mod catalog;
pub mod claims;
pub mod cli;
pub mod config;
pub mod consumption;
pub mod engine;
pub mod error;
pub mod logging;
pub mod overrides;
pub mod resolver;
pub mod store;
pub mod types;
