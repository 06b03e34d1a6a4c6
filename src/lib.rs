//! Landscape Studio: non-blocking image generation jobs and an LLM content
//! curator behind a small axum API, plus the polling client that drives a
//! progress indicator.

pub mod clock;
pub mod config;
pub mod curator;
pub mod error;
pub mod gemini;
pub mod models;
pub mod poller;
pub mod prompt;
pub mod registry;
pub mod resolver;
pub mod routes;
pub mod simulation;
pub mod submitter;
pub mod task_api;
pub mod upstream;

pub use routes::{app, AppState};
