//! Service layer module

pub mod harness;

pub use harness::{BenchHarness, FULL_BACKEND, QUANTIZED_BACKEND};
