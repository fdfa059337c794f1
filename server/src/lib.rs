//! WebSocket broadcast relay.
//!
//! Clients connect to `/{client_id}`; every text frame a client sends is
//! forwarded as `"{client_id}: {text}"` to every other connected client.
//! The crate also carries the file-transfer, broker and partition helpers
//! that sit next to the relay. The binary entry points are in main.rs and
//! bin/relay_client.rs.

pub mod broker;
pub mod client;
pub mod config;
pub mod logging;
pub mod partitions;
pub mod routes;
pub mod server;
pub mod state;
pub mod transfer;
pub mod ws;
