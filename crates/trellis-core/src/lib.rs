//! Trellis Core - GraphQL to Cypher Translation Engine
//!
//! This crate turns coerced GraphQL operations into single Cypher statements
//! with flat parameter maps, implementing:
//! - Schema model (node types, relationships, interfaces/unions, rules)
//! - Cypher IR with a pure printer and collision-free parameter allocation
//! - Where compiler (operator suffixes, quantifiers, aggregation filters)
//! - Projection compiler (map projections, nested CALL subqueries,
//!   connections with opaque cursors, union/interface discriminators)
//! - Sort/pagination with computed-field materialization before LIMIT
//! - Authorization (filter rules exclude rows, validate rules raise
//!   Forbidden inside the statement)
//! - Mutation compilers (create, update, delete, connect, disconnect,
//!   connectOrCreate) with read-back projections
//! - Subscription resolution with in-memory event filtering
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │      Translator (translate::Translator)      │
//! │    (root dispatch, statement assembly)       │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │            Compiler Layer                    │
//! │  (where, projection, sort, auth, mutation)   │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │             Cypher IR                        │
//! │   (clauses, expressions, printer, params)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The execution layer feeds the printed statement to a Cypher-speaking
//! driver; the single returned column, decoded, is the GraphQL response
//! data. Subscriptions bypass Cypher entirely and filter published
//! [`trellis_protocol::GraphEvent`]s in memory.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod cypher;
pub mod error;
pub mod graphql;
pub mod schema;
pub mod subscribe;
pub mod translate;

pub use error::{Error, Result};
pub use translate::{CallbackRegistry, TranslatedOperation, Translator};
