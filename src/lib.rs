//! Student result management server.
//!
//! The interesting part lives in [`results`]: a role-gated approval workflow
//! over result records with optimistic concurrency and an append-only audit
//! trail. Everything else is the plumbing needed to serve it over HTTP.

pub mod config;
pub mod results;
pub mod server;
pub mod sqlite_persistence;
pub mod user;
