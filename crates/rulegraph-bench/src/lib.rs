//! Rulegraph Benchmark Suite
//!
//! Criterion benchmarks for rulegraph components.
//!
//! # Benchmark Categories
//!
//! - **Path resolution**: Immediate, multi-hop and recursive traversals, cold and cached
//! - **Class lists**: Class-list filter parsing
//! - **Content**: Content specification compilation and query rendering

pub mod fixtures;

pub use fixtures::{generate_schema, BenchContext, Scale};
