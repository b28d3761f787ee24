//! Git smart HTTP server.
//!
//! Requests are dispatched by method and path suffix, authenticated through
//! an injected [`auth::Authorizer`], and bridged to the `git` executable
//! running in stateless-RPC mode inside its own process group.

pub mod auth;
pub mod config;
pub mod git;
pub mod health;
pub mod http;
pub mod metrics;
pub mod server;

pub use http::handler::create_router;
pub use server::{GitServer, GitServerBuilder};
