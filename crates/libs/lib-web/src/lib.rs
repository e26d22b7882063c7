//! # Service Surface
//!
//! The HTTP layer (§4.8): request/response DTOs, the four route handlers,
//! request-stamping/logging middleware, and [`server::start_server`], which
//! wires every `lib-core` collaborator together and serves until shutdown.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{start_server, AppState};
