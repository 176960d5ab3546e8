//! Cronhub API server library.
//!
//! Exposes config, state, error handling, routes, the task engine and the
//! worker dispatch connection so the binary and the integration tests share
//! one build of the application.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
