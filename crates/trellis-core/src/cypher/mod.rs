//! Cypher builder - IR, printing, and per-translation allocation.

pub mod ast;
pub mod context;
pub mod print;

pub use ast::{
    BinaryOperator, Clause, Expr, Literal, MapProjectionItem, NodePattern, OrderItem, Pattern,
    PatternDirection, Projection, ProjectionEntry, RelationshipPattern, SetItem, Statement,
};
pub use context::TranslationContext;
pub use print::{escape_identifier, print_expression, print_statement};
