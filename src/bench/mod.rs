//! Benchmark methodology
//!
//! - fixture preparation (detect once, align per face)
//! - the backend contract
//! - isolated, sunk, repeated measurement
//! - ranking and reporting

pub mod agreement;
pub mod alloc;
pub mod backend;
pub mod fixture;
pub mod report;
pub mod runner;
pub mod sink;
pub mod stats;

pub use backend::EmbeddingBackend;
pub use fixture::{AlignedFace, Fixtures};
pub use report::Report;
pub use runner::BenchmarkRunner;
pub use sink::Sink;
