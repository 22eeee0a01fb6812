//! router-server
//!
//! Multi-client async TCP server for the channel router.
//!
//! This crate glues together:
//! - `router-core` (channel runtime logic)
//! - `router-protocol` (wire codecs)
//! and exposes a `server::run(Config)` entrypoint.
//!
//! One cooperative worker task runs per channel; connection tasks feed
//! them through bounded inboxes via `dispatch`.

pub mod config;
pub mod types;
pub mod connection;
pub mod registry;
pub mod dispatch;
pub mod handlers;
pub mod worker;
pub mod server;
