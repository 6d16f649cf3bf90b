//! kargo turns a declarative deployment description into the ordered list of
//! external-tool invocations that plan or apply it.
//!
//! The building blocks are the argument expression tree ([`core::args`]), whose
//! tokens may be deferred until the outputs of earlier steps are known, and the
//! schema compiler ([`core::schema`]), which flattens configuration values into
//! such trees using per-target flag rules.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
