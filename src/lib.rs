//! BandHub - a shared, owner-aware collection of music bands over TCP
//!
//! This library provides:
//! - A single-threaded readiness-based TCP server
//! - Length-prefixed JSON request/response framing
//! - A command dispatcher with per-record ownership checks
//! - SQLite persistence that the in-memory collection is loaded from

pub mod client;
pub mod codec;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod model;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod store;

pub use client::Client;
pub use dispatcher::Dispatcher;
pub use error::{BandHubError, Result};
pub use model::{Album, Band, BandDraft, Coordinates, MusicGenre};
pub use protocol::{Command, Credentials, Payload, Request, Response, ResponseStatus};
pub use server::{BandServer, ServerConfig};
pub use store::CollectionStore;
