//! Cypher IR - AST definitions for emitted queries
//!
//! This module provides the clause and expression variants the compilers
//! assemble instead of concatenating query text. Every user-controlled value
//! enters the tree as a parameter reference allocated by the translation
//! context; printing (see [`super::print`]) is a pure function of the tree.

/// A complete statement: clauses in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Top-level clauses.
    pub clauses: Vec<Clause>,
}

impl Statement {
    /// Create an empty statement.
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Append a clause.
    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    /// Append many clauses.
    pub fn extend(&mut self, clauses: impl IntoIterator<Item = Clause>) {
        self.clauses.extend(clauses);
    }
}

impl Default for Statement {
    fn default() -> Self {
        Self::new()
    }
}

/// Individual query clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// MATCH / OPTIONAL MATCH with an optional inline WHERE.
    Match {
        /// Pattern to match.
        pattern: Pattern,
        /// OPTIONAL MATCH when true.
        optional: bool,
        /// WHERE predicate.
        where_clause: Option<Expr>,
    },
    /// CREATE clause.
    Create {
        /// Pattern to create.
        pattern: Pattern,
    },
    /// MERGE clause with optional ON CREATE SET items.
    Merge {
        /// Pattern to match-or-create.
        pattern: Pattern,
        /// Applied only when the merge creates.
        on_create: Vec<SetItem>,
    },
    /// SET clause.
    Set(Vec<SetItem>),
    /// DELETE / DETACH DELETE clause.
    Delete {
        /// Use DETACH DELETE.
        detach: bool,
        /// Entities to delete.
        targets: Vec<Expr>,
    },
    /// WITH clause (projection, filtering, ordering, paging).
    With(Projection),
    /// RETURN clause.
    Return(Projection),
    /// UNWIND clause.
    Unwind {
        /// List expression.
        list: Expr,
        /// Bound element variable.
        alias: String,
    },
    /// CALL subquery. `imports` become a leading `WITH` inside the body.
    Call {
        /// Outer variables imported into the subquery scope.
        imports: Vec<String>,
        /// Subquery body.
        body: Vec<Clause>,
    },
    /// UNION of clause sequences, used inside CALL subqueries for
    /// polymorphic branches.
    Union {
        /// UNION ALL when true, plain UNION otherwise.
        all: bool,
        /// One clause sequence per branch.
        branches: Vec<Vec<Clause>>,
    },
    /// FOREACH conditional-write idiom; body clauses print inline.
    Foreach {
        /// Iteration variable.
        variable: String,
        /// List expression (typically a CASE gate).
        list: Expr,
        /// Update clauses to run per element.
        body: Vec<Clause>,
    },
    /// Verbatim clause text. Only ever carries schema-author Cypher from
    /// computed-field rules, never request values.
    Raw(String),
}

/// Projection body shared by WITH and RETURN.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    /// Projected items in order.
    pub items: Vec<ProjectionEntry>,
    /// DISTINCT flag.
    pub distinct: bool,
    /// Post-projection WHERE (WITH only).
    pub where_clause: Option<Expr>,
    /// ORDER BY criteria, applied left-to-right.
    pub order_by: Vec<OrderItem>,
    /// SKIP expression.
    pub skip: Option<Expr>,
    /// LIMIT expression.
    pub limit: Option<Expr>,
}

impl Projection {
    /// Projection of bare variables.
    pub fn variables<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: vars
                .into_iter()
                .map(|v| ProjectionEntry {
                    expr: Expr::Variable(v.into()),
                    alias: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Projection of one aliased expression.
    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            items: vec![ProjectionEntry {
                expr,
                alias: Some(alias.into()),
            }],
            ..Default::default()
        }
    }

    /// Add an item (builder style).
    pub fn item(mut self, expr: Expr, alias: Option<String>) -> Self {
        self.items.push(ProjectionEntry { expr, alias });
        self
    }

    /// Set the WHERE predicate (builder style).
    pub fn filtered(mut self, predicate: Option<Expr>) -> Self {
        self.where_clause = predicate;
        self
    }
}

/// One projected item, optionally aliased.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionEntry {
    /// The projected expression.
    pub expr: Expr,
    /// `AS alias`, when present.
    pub alias: Option<String>,
}

/// One ORDER BY criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    /// Sort key expression.
    pub expr: Expr,
    /// DESC when true.
    pub descending: bool,
}

/// SET item: property assignment or label addition.
#[derive(Debug, Clone, PartialEq)]
pub enum SetItem {
    /// `target.key = value`
    Property {
        /// Bound variable.
        target: String,
        /// Property key.
        key: String,
        /// Assigned expression.
        value: Expr,
    },
    /// `target:Label1:Label2`
    Labels {
        /// Bound variable.
        target: String,
        /// Labels to add.
        labels: Vec<String>,
    },
}

/// A linear pattern: start node plus relationship/node segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// First node.
    pub start: NodePattern,
    /// Subsequent (relationship, node) hops.
    pub segments: Vec<(RelationshipPattern, NodePattern)>,
}

impl Pattern {
    /// Single-node pattern.
    pub fn node(node: NodePattern) -> Self {
        Self {
            start: node,
            segments: Vec::new(),
        }
    }

    /// One-hop pattern.
    pub fn hop(start: NodePattern, rel: RelationshipPattern, end: NodePattern) -> Self {
        Self {
            start,
            segments: vec![(rel, end)],
        }
    }
}

/// A node in a pattern.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    /// Bound variable, if any.
    pub variable: Option<String>,
    /// Labels, primary first.
    pub labels: Vec<String>,
    /// Inline property map.
    pub properties: Vec<(String, Expr)>,
}

impl NodePattern {
    /// Named node with labels.
    pub fn with_labels(variable: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            variable: Some(variable.into()),
            labels,
            properties: Vec::new(),
        }
    }

    /// Anonymous, unlabeled node.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Direction of a relationship in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    /// `-[..]->`
    Outgoing,
    /// `<-[..]-`
    Incoming,
    /// `-[..]-`
    Undirected,
}

/// A relationship in a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern {
    /// Bound variable, if any.
    pub variable: Option<String>,
    /// Relationship type, if constrained.
    pub rel_type: Option<String>,
    /// Direction.
    pub direction: PatternDirection,
    /// Inline property map.
    pub properties: Vec<(String, Expr)>,
}

impl RelationshipPattern {
    /// Typed relationship without a variable.
    pub fn typed(rel_type: impl Into<String>, direction: PatternDirection) -> Self {
        Self {
            variable: None,
            rel_type: Some(rel_type.into()),
            direction,
            properties: Vec::new(),
        }
    }

    /// Bind the relationship to a variable (builder style).
    pub fn bound(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }
}

/// Literal values the engine itself embeds (discriminator tags, guard
/// constants). Request values never become literals; they become params.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// NULL
    Null,
    /// true / false
    Boolean(bool),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal (engine-controlled only).
    String(String),
}

/// Binary comparison and arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// `=`
    Eq,
    /// `<>`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `IN`
    In,
    /// `CONTAINS`
    Contains,
    /// `STARTS WITH`
    StartsWith,
    /// `ENDS WITH`
    EndsWith,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl BinaryOperator {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Gte => ">=",
            BinaryOperator::In => "IN",
            BinaryOperator::Contains => "CONTAINS",
            BinaryOperator::StartsWith => "STARTS WITH",
            BinaryOperator::EndsWith => "ENDS WITH",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
        }
    }
}

/// An entry in a map projection.
#[derive(Debug, Clone, PartialEq)]
pub enum MapProjectionItem {
    /// `.key`
    Property {
        /// Property key.
        key: String,
    },
    /// `alias: expr`
    Computed {
        /// Output key.
        alias: String,
        /// Value expression.
        value: Expr,
    },
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A bound variable.
    Variable(String),
    /// A parameter reference (`$name`).
    Param(String),
    /// Engine-controlled literal.
    Literal(Literal),
    /// `base.key` property access; also covers `$jwt.claim` paths.
    Property {
        /// Base expression.
        base: Box<Expr>,
        /// Property key.
        key: String,
    },
    /// Function call; name is engine-controlled.
    Func {
        /// Function name (`collect`, `point.distance`, ...).
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// Binary operation.
    BinaryOp {
        /// Left operand.
        lhs: Box<Expr>,
        /// Operator.
        op: BinaryOperator,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Conjunction; prints parenthesized.
    And(Vec<Expr>),
    /// Disjunction; prints parenthesized.
    Or(Vec<Expr>),
    /// Negation.
    Not(Box<Expr>),
    /// `expr IS NULL`
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`
    IsNotNull(Box<Expr>),
    /// List literal.
    List(Vec<Expr>),
    /// Map literal.
    Map(Vec<(String, Expr)>),
    /// `variable { .prop, alias: expr }`
    MapProjection {
        /// Projected variable.
        variable: String,
        /// Items.
        items: Vec<MapProjectionItem>,
    },
    /// `[x IN list WHERE pred | map]`
    ListComprehension {
        /// Element variable.
        variable: String,
        /// Source list.
        list: Box<Expr>,
        /// Optional filter.
        predicate: Option<Box<Expr>>,
        /// Optional map expression.
        map: Option<Box<Expr>>,
    },
    /// `[pattern WHERE pred | map]`
    PatternComprehension {
        /// The matched pattern.
        pattern: Pattern,
        /// Optional filter.
        predicate: Option<Box<Expr>>,
        /// Per-match expression.
        map: Box<Expr>,
    },
    /// `list[from..to]` slice; either bound optional.
    Slice {
        /// Sliced list.
        list: Box<Expr>,
        /// Inclusive start.
        from: Option<Box<Expr>>,
        /// Exclusive end.
        to: Option<Box<Expr>>,
    },
    /// `list[index]`
    Index {
        /// Indexed list.
        list: Box<Expr>,
        /// Index expression.
        index: Box<Expr>,
    },
    /// `CASE WHEN cond THEN then ELSE alt END`
    Case {
        /// Condition.
        when: Box<Expr>,
        /// Value when true.
        then: Box<Expr>,
        /// Value otherwise.
        alt: Box<Expr>,
    },
}

impl Expr {
    /// Variable shorthand.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    /// Property access on a variable.
    pub fn prop(variable: impl Into<String>, key: impl Into<String>) -> Self {
        Expr::Property {
            base: Box::new(Expr::Variable(variable.into())),
            key: key.into(),
        }
    }

    /// Function call shorthand.
    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    /// Binary operation shorthand.
    pub fn binary(lhs: Expr, op: BinaryOperator, rhs: Expr) -> Self {
        Expr::BinaryOp {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    /// Conjoin predicates, flattening empties: `None` when both empty.
    pub fn conjoin(parts: Vec<Expr>) -> Option<Expr> {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => Some(flat.into_iter().next().expect("len checked")),
            _ => Some(Expr::And(flat)),
        }
    }

    /// `true` literal.
    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Boolean(value))
    }

    /// Engine-controlled string literal.
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    /// Integer literal.
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }
}
