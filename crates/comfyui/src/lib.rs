//! ComfyUI integration for the prism generation worker.
//!
//! Everything that talks to the engine lives here: process supervision
//! and readiness polling, the REST API wrapper, the WebSocket client
//! with typed message parsing, resource-inventory validation, workflow
//! template binding, submit-then-await synchronization, and artifact
//! collection.

pub mod api;
pub mod client;
pub mod collector;
pub mod inventory;
pub mod messages;
pub mod supervisor;
pub mod sync;
pub mod workflow;
