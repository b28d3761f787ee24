//! HTTP layer of the Git smart HTTP server.
//!
//! [`handler`] owns the router and the dispatch pipeline; [`rpc`] and
//! [`repos`] implement the individual services on top of the pkt-line
//! framer and the streaming body plumbing.

pub mod context;
pub mod handler;
pub mod pktline;
pub mod repos;
pub mod rpc;
pub mod services;
pub mod stream;
