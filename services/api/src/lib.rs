//! Rehearse API Library Crate
//!
//! This library contains all the transport logic for the rehearsal web
//! service: the application state, API handlers, SSE streaming, and
//! routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod stream;
