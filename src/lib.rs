//! Face embedding quantization benchmark library

pub mod bench;
pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod utils;

pub use config::Config;
pub use error::BenchError;
