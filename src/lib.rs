//! RLZ Attribution Client Library
//!
//! Keeps per-product attribution state on the local machine (an RLZ value per
//! access point, a log of lifecycle events, a machine-wide deal code) and
//! exchanges it with the financial server through a checksummed text ping.
//!
//! ## Architecture Modules
//! The library is layered; each module only depends on the ones above it:
//!
//! - **`model`**: Products, access points, events, owners and the bounded
//!   output buffer used by the CGI builders.
//! - **`storage`**: The owner-scoped hierarchical key-value `Store` trait with an
//!   in-memory and a JSON-file backend.
//! - **`access`**: The exclusive lock and permission checks every operation
//!   passes through (`AccessGate`), in-process or backed by a lock file.
//! - **`state`**: Typed views over the store: events, RLZs, deal code and
//!   machine id.
//! - **`ping`**: The protocol itself: checksum gate, request builders,
//!   response tokenizer, throttle and HTTP transport.
//! - **`client`**: `RlzClient`, the facade exposing every public operation.
//! - **`config`**: Runtime configuration from defaults, file and environment.

pub mod access;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod ping;
pub mod state;
pub mod storage;

pub use client::{AppliedChanges, PingOutcome, RlzClient};
pub use config::ClientConfig;
pub use error::{Result, RlzError};
pub use model::buffer::CappedString;
pub use model::types::{AccessPoint, Event, OwnerId, Product};
pub use ping::request::PingRequest;
