//! Shared infrastructure for end-to-end tests
//!
//! Each test spawns its own [`TestServer`] backed by temp databases and talks
//! to it over real HTTP through a [`TestClient`].

#![allow(dead_code)]

pub mod client;
pub mod constants;
pub mod fixtures;
pub mod server;

pub use client::TestClient;
pub use constants::*;
pub use server::TestServer;
