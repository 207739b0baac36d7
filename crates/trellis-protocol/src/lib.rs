//! Trellis Protocol - contracts between the translation engine and its callers
//!
//! Provides the two wire surfaces the engine exposes:
//! - `CypherStatement`: a printed Cypher query plus its flat parameter map,
//!   handed verbatim to a Cypher-speaking driver.
//! - `GraphEvent` / `EventPublisher`: structured change events emitted after
//!   successful writes, published through a pluggable transport.

#![warn(clippy::all)]

pub mod event;
pub mod statement;

pub use event::{EventKind, EventProperties, EventPublisher, GraphEvent, InMemoryPublisher, PublishError};
pub use statement::CypherStatement;
