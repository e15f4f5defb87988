pub mod catalog;
pub mod config;
pub mod errors;
pub mod export;
pub mod ideas;
pub mod logging;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod storage;
