//! The command execution pipeline of a MongoDB driver.
//!
//! This crate turns typed operations (`find`, `insert`, `update`, transactions and the rest) into
//! wire messages, sends them to a server picked from the current topology, and turns the replies
//! back into typed results. Along the way it:
//!
//! * selects a server according to the operation's read preference, with latency windowing and
//!   staleness checks;
//! * attaches sessions, cluster times, transaction fields and concerns to every command;
//! * retries reads and writes once on retryable failures, or for as long as the client-side
//!   timeout allows;
//! * splits large writes into several commands that fit the server's size limits;
//! * emits command monitoring events and `tracing` logs.
//!
//! Discovery, monitoring, pooling and TLS live outside the crate behind the [`Deployment`] trait;
//! authentication mechanisms live behind [`Authenticator`]. Monitors run their `hello` checks
//! through [`Handshaker::check`].
//!
//! # Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use mongodb_core::{bson::doc, error::Result, options::ClientOptions, Client, Deployment};
//! # async fn run(deployment: Arc<dyn Deployment>) -> Result<()> {
//! let client = Client::new(deployment, ClientOptions::default())?;
//! let coll = client.database("app").collection("users");
//!
//! coll.insert_one(doc! { "name": "ada" }, None).await?;
//! let user = coll.find_one(doc! { "name": "ada" }, None).await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Events are emitted with the [`tracing`](https://crates.io/crates/tracing) crate under the
//! targets `mongodb_core::command`, `mongodb_core::server_selection` and
//! `mongodb_core::connection`, all at `DEBUG` level. Command documents in log messages are
//! truncated to [`ClientOptions::tracing_max_document_length_bytes`](options::ClientOptions)
//! bytes.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
pub mod options;

pub use ::bson;

mod bson_util;
mod client;
mod cmap;
mod coll;
mod collation;
mod compression;
mod concern;
mod cursor;
mod db;
pub mod error;
pub mod event;
mod hello;
mod index;
mod operation;
pub mod results;
mod sdam;
mod selection_criteria;
mod serde_util;
mod trace;

#[cfg(test)]
mod test;

pub use crate::{
    client::{auth::Authenticator, csfle::Crypt, session::ClientSession, Client},
    cmap::{AsyncStream, Connection, ConnectionInfo, Handshaker},
    coll::Collection,
    cursor::Cursor,
    db::Database,
};

pub use {
    client::session::ClusterTime,
    coll::Namespace,
    hello::AwaitableHelloOptions,
    index::{IndexModel, SearchIndexModel},
    sdam::{
        Deployment,
        ServerDescription,
        ServerType,
        TopologyDescription,
        TopologyType,
        TopologyVersion,
    },
};
