//! Pure domain logic for the prism generation worker.
//!
//! No IO lives here: error taxonomy, resource-manifest reconciliation,
//! and the parameter policies applied when binding a generation request
//! into a workflow. Everything is directly unit-testable.

pub mod error;
pub mod manifest;
pub mod request;
