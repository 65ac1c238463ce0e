pub mod config;
pub mod error;
pub mod eta;
pub mod fetch;
pub mod parser;
pub mod publish;
pub mod registry;
pub mod scheduler;
pub mod tracker;
