//! Paginated, sorted, filtered views over growing record sets
//!
//! The engine is source-agnostic: a [`RecordSource`] either answers with a
//! page envelope or with a bare list. Bare lists are wrapped as one full page
//! so every caller sees the same envelope shape.

mod engine;

pub use engine::{
    Filter, FilterOp, Page, PageRequest, QueryEngine, QueryError, RecordSource, SortDir,
    SortSpec, SourceResponse,
};
