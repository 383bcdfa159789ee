//! `prism-worker` -- serverless image-generation worker.
//!
//! Orchestrates one generation job against a local ComfyUI engine:
//! supervise the engine to readiness, validate required resources, bind
//! the request into the workflow template, submit and await completion
//! over the event stream, then collect and encode the produced images.

pub mod config;
pub mod engine;
pub mod handler;
pub mod runner;
