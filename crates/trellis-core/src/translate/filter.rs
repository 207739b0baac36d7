//! Where/Filter compiler - GraphQL `where` objects to Cypher predicates.
//!
//! Input is the coerced `where` argument (a nested JSON object), the entity
//! it filters, and the Cypher variable currently bound to that entity.
//! Output is an optional boolean expression plus any `CALL` subqueries the
//! predicate needs (aggregation filters bind their aggregate to a variable
//! first). An empty filter compiles to no restriction. Unknown fields and
//! inapplicable operators fail before any Cypher is printed.

use crate::cypher::{
    BinaryOperator, Clause, Expr, NodePattern, Pattern, PatternDirection, Projection,
    RelationshipPattern, TranslationContext,
};
use crate::schema::{
    Direction, NodeType, Property, PropertyKind, RelationshipField, RelationshipPropertiesType,
    SchemaModel,
};
use crate::{Error, Result};

/// The entity a filter applies to: a node type or an edge-properties type.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    /// Filtering a node.
    Node(&'a NodeType),
    /// Filtering relationship properties (edge scalars).
    Edge(&'a RelationshipPropertiesType),
}

impl<'a> EntityRef<'a> {
    /// Schema type name, for error messages.
    pub fn type_name(&self) -> &'a str {
        match self {
            EntityRef::Node(n) => &n.name,
            EntityRef::Edge(e) => &e.name,
        }
    }

    fn property(&self, name: &str) -> Option<&'a Property> {
        match self {
            EntityRef::Node(n) => n.property(name),
            EntityRef::Edge(e) => e.property(name),
        }
    }

    fn relationship(&self, name: &str) -> Option<&'a RelationshipField> {
        match self {
            EntityRef::Node(n) => n.relationship(name),
            EntityRef::Edge(_) => None,
        }
    }
}

/// A compiled filter: subquery clauses to emit first, then the predicate.
#[derive(Debug, Default)]
pub struct CompiledWhere {
    /// `CALL` subqueries binding aggregate variables the predicate uses.
    pub clauses: Vec<Clause>,
    /// The boolean predicate, `None` when the filter is empty.
    pub predicate: Option<Expr>,
}

/// Scalar comparison operators, parsed from field-name suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOperator {
    /// Bare field name: equality.
    Eq,
    /// `_NOT`
    Not,
    /// `_IN`
    In,
    /// `_NOT_IN`
    NotIn,
    /// `_CONTAINS`
    Contains,
    /// `_NOT_CONTAINS`
    NotContains,
    /// `_STARTS_WITH`
    StartsWith,
    /// `_NOT_STARTS_WITH`
    NotStartsWith,
    /// `_ENDS_WITH`
    EndsWith,
    /// `_NOT_ENDS_WITH`
    NotEndsWith,
    /// `_GT`
    Gt,
    /// `_GTE`
    Gte,
    /// `_LT`
    Lt,
    /// `_LTE`
    Lte,
    /// `_INCLUDES` (list membership)
    Includes,
    /// `_NOT_INCLUDES`
    NotIncludes,
    /// `_DISTANCE_LT`
    DistanceLt,
    /// `_DISTANCE_LTE`
    DistanceLte,
    /// `_DISTANCE_GT`
    DistanceGt,
    /// `_DISTANCE_GTE`
    DistanceGte,
    /// `_DISTANCE_EQ`
    DistanceEq,
}

/// Suffix table, longest suffixes first so `_NOT_IN` wins over `_IN`.
const OPERATOR_SUFFIXES: &[(&str, ScalarOperator)] = &[
    ("_NOT_STARTS_WITH", ScalarOperator::NotStartsWith),
    ("_NOT_ENDS_WITH", ScalarOperator::NotEndsWith),
    ("_NOT_CONTAINS", ScalarOperator::NotContains),
    ("_NOT_INCLUDES", ScalarOperator::NotIncludes),
    ("_DISTANCE_LTE", ScalarOperator::DistanceLte),
    ("_DISTANCE_GTE", ScalarOperator::DistanceGte),
    ("_DISTANCE_LT", ScalarOperator::DistanceLt),
    ("_DISTANCE_GT", ScalarOperator::DistanceGt),
    ("_DISTANCE_EQ", ScalarOperator::DistanceEq),
    ("_STARTS_WITH", ScalarOperator::StartsWith),
    ("_ENDS_WITH", ScalarOperator::EndsWith),
    ("_CONTAINS", ScalarOperator::Contains),
    ("_INCLUDES", ScalarOperator::Includes),
    ("_NOT_IN", ScalarOperator::NotIn),
    ("_GTE", ScalarOperator::Gte),
    ("_LTE", ScalarOperator::Lte),
    ("_GT", ScalarOperator::Gt),
    ("_LT", ScalarOperator::Lt),
    ("_IN", ScalarOperator::In),
    ("_NOT", ScalarOperator::Not),
];

/// Relationship quantifier suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// At least one related entity matches (default for bare names).
    Some,
    /// Every related entity matches, and at least one exists.
    All,
    /// No related entity matches.
    None,
    /// Exactly one related entity matches.
    Single,
}

const QUANTIFIER_SUFFIXES: &[(&str, Quantifier)] = &[
    ("_SINGLE", Quantifier::Single),
    ("_SOME", Quantifier::Some),
    ("_NONE", Quantifier::None),
    ("_ALL", Quantifier::All),
];

/// Split an operator suffix off a filter key, if one is present.
pub fn split_operator(key: &str) -> Option<(&str, ScalarOperator)> {
    OPERATOR_SUFFIXES.iter().find_map(|(suffix, op)| {
        key.strip_suffix(suffix)
            .filter(|base| !base.is_empty())
            .map(|base| (base, *op))
    })
}

fn split_quantifier(key: &str) -> Option<(&str, Quantifier)> {
    QUANTIFIER_SUFFIXES.iter().find_map(|(suffix, q)| {
        key.strip_suffix(suffix)
            .filter(|base| !base.is_empty())
            .map(|base| (base, *q))
    })
}

/// Compile a `where` value against `entity`, bound to `variable`.
pub fn compile_where(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    entity: EntityRef<'_>,
    variable: &str,
    where_: &serde_json::Value,
) -> Result<CompiledWhere> {
    let mut clauses = Vec::new();
    let predicate = compile_value(ctx, schema, entity, variable, where_, Some(&mut clauses))?;
    Ok(CompiledWhere { clauses, predicate })
}

/// Compile a filter in a context that cannot host `CALL` subqueries
/// (pattern comprehensions). Aggregation filters are rejected here.
fn compile_nested(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    entity: EntityRef<'_>,
    variable: &str,
    where_: &serde_json::Value,
) -> Result<Option<Expr>> {
    compile_value(ctx, schema, entity, variable, where_, None)
}

fn compile_value(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    entity: EntityRef<'_>,
    variable: &str,
    where_: &serde_json::Value,
    mut clauses: Option<&mut Vec<Clause>>,
) -> Result<Option<Expr>> {
    let object = match where_ {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Object(map) => map,
        other => {
            return Err(Error::translation(format!(
                "expected a filter object for `{}`, got {other}",
                entity.type_name()
            )))
        }
    };
    if object.is_empty() {
        return Ok(None);
    }

    let mut parts = Vec::new();
    for (key, value) in object {
        let part = match key.as_str() {
            "AND" => combine(ctx, schema, entity, variable, value, clauses.as_deref_mut(), false)?,
            "OR" => combine(ctx, schema, entity, variable, value, clauses.as_deref_mut(), true)?,
            "NOT" => compile_value(ctx, schema, entity, variable, value, clauses.as_deref_mut())?
                .map(|inner| Expr::Not(Box::new(inner))),
            _ => Some(compile_field(
                ctx,
                schema,
                entity,
                variable,
                key,
                value,
                clauses.as_deref_mut(),
            )?),
        };
        if let Some(part) = part {
            parts.push(part);
        }
    }
    Ok(Expr::conjoin(parts))
}

fn combine(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    entity: EntityRef<'_>,
    variable: &str,
    value: &serde_json::Value,
    mut clauses: Option<&mut Vec<Clause>>,
    disjunction: bool,
) -> Result<Option<Expr>> {
    let children = match value {
        serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
        serde_json::Value::Object(_) => vec![value],
        other => {
            return Err(Error::translation(format!(
                "AND/OR expects an object or list of objects, got {other}"
            )))
        }
    };
    let mut parts = Vec::new();
    for child in children {
        if let Some(part) =
            compile_value(ctx, schema, entity, variable, child, clauses.as_deref_mut())?
        {
            parts.push(part);
        }
    }
    if parts.is_empty() {
        return Ok(None);
    }
    if disjunction {
        if parts.len() == 1 {
            return Ok(parts.into_iter().next());
        }
        Ok(Some(Expr::Or(parts)))
    } else {
        Ok(Expr::conjoin(parts))
    }
}

fn compile_field(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    entity: EntityRef<'_>,
    variable: &str,
    key: &str,
    value: &serde_json::Value,
    clauses: Option<&mut Vec<Clause>>,
) -> Result<Expr> {
    // Exact property name wins over any suffix interpretation.
    if let Some(prop) = entity.property(key) {
        return scalar_predicate(ctx, variable, prop, ScalarOperator::Eq, value);
    }
    // Bare relationship name keeps the backward-compatible SOME semantics.
    if let Some(rel) = entity.relationship(key) {
        return relationship_predicate(ctx, schema, variable, rel, Quantifier::Some, value);
    }
    if let Some((base, quantifier)) = split_quantifier(key) {
        if let Some(rel) = entity.relationship(base) {
            return relationship_predicate(ctx, schema, variable, rel, quantifier, value);
        }
    }
    if let Some(base) = key.strip_suffix("Aggregate") {
        if let Some(rel) = entity.relationship(base) {
            let clauses = clauses.ok_or_else(|| {
                Error::translation(format!(
                    "aggregation filter `{key}` is not supported inside a quantified relationship filter"
                ))
            })?;
            return aggregate_predicate(ctx, schema, variable, rel, value, clauses);
        }
    }
    if let Some((base, op)) = split_operator(key) {
        if let Some(prop) = entity.property(base) {
            check_operator(prop, op, key)?;
            return scalar_predicate(ctx, variable, prop, op, value);
        }
        if entity.relationship(base).is_some() {
            return Err(Error::invalid_operator(key, base));
        }
    }
    Err(Error::unknown_field(key, entity.type_name()))
}

fn check_operator(prop: &Property, op: ScalarOperator, key: &str) -> Result<()> {
    use ScalarOperator::*;
    let ok = match op {
        Eq | Not | In | NotIn => true,
        Contains | NotContains | StartsWith | NotStartsWith | EndsWith | NotEndsWith => {
            prop.kind.is_stringy() && !prop.list
        }
        Gt | Gte | Lt | Lte => prop.kind.is_orderable() && !prop.list,
        Includes | NotIncludes => prop.list,
        DistanceLt | DistanceLte | DistanceGt | DistanceGte | DistanceEq => {
            prop.kind == PropertyKind::Point && !prop.list
        }
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_operator(key, prop.name.clone()))
    }
}

/// Wrap a parameter in the native constructor its kind requires
/// (`point(...)`, `datetime(...)`, ...).
fn typed_value(kind: PropertyKind, param: Expr) -> Expr {
    match kind {
        PropertyKind::Point => Expr::func("point", vec![param]),
        PropertyKind::DateTime => Expr::func("datetime", vec![param]),
        PropertyKind::Date => Expr::func("date", vec![param]),
        PropertyKind::Duration => Expr::func("duration", vec![param]),
        _ => param,
    }
}

fn needs_constructor(kind: PropertyKind) -> bool {
    matches!(
        kind,
        PropertyKind::Point | PropertyKind::DateTime | PropertyKind::Date | PropertyKind::Duration
    )
}

/// A parameter holding a list, with each element passed through the kind's
/// constructor when one is needed.
fn typed_list(ctx: &mut TranslationContext, kind: PropertyKind, value: &serde_json::Value) -> Expr {
    let param = ctx.param(value.clone());
    if needs_constructor(kind) {
        Expr::ListComprehension {
            variable: "x".to_string(),
            list: Box::new(param),
            predicate: None,
            map: Some(Box::new(typed_value(kind, Expr::var("x")))),
        }
    } else {
        param
    }
}

fn scalar_predicate(
    ctx: &mut TranslationContext,
    variable: &str,
    prop: &Property,
    op: ScalarOperator,
    value: &serde_json::Value,
) -> Result<Expr> {
    use ScalarOperator::*;
    let lhs = Expr::prop(variable, &prop.name);
    let expr = match op {
        Eq if value.is_null() => Expr::IsNull(Box::new(lhs)),
        Not if value.is_null() => Expr::IsNotNull(Box::new(lhs)),
        Eq => {
            let rhs = if prop.list {
                typed_list(ctx, prop.kind, value)
            } else {
                typed_value(prop.kind, ctx.param(value.clone()))
            };
            Expr::binary(lhs, BinaryOperator::Eq, rhs)
        }
        Not => {
            let rhs = if prop.list {
                typed_list(ctx, prop.kind, value)
            } else {
                typed_value(prop.kind, ctx.param(value.clone()))
            };
            Expr::Not(Box::new(Expr::binary(lhs, BinaryOperator::Eq, rhs)))
        }
        In => Expr::binary(lhs, BinaryOperator::In, typed_list(ctx, prop.kind, value)),
        NotIn => Expr::Not(Box::new(Expr::binary(
            lhs,
            BinaryOperator::In,
            typed_list(ctx, prop.kind, value),
        ))),
        Contains => string_op(ctx, lhs, BinaryOperator::Contains, value, false)?,
        NotContains => string_op(ctx, lhs, BinaryOperator::Contains, value, true)?,
        StartsWith => string_op(ctx, lhs, BinaryOperator::StartsWith, value, false)?,
        NotStartsWith => string_op(ctx, lhs, BinaryOperator::StartsWith, value, true)?,
        EndsWith => string_op(ctx, lhs, BinaryOperator::EndsWith, value, false)?,
        NotEndsWith => string_op(ctx, lhs, BinaryOperator::EndsWith, value, true)?,
        Gt => ordered(ctx, lhs, BinaryOperator::Gt, prop, value),
        Gte => ordered(ctx, lhs, BinaryOperator::Gte, prop, value),
        Lt => ordered(ctx, lhs, BinaryOperator::Lt, prop, value),
        Lte => ordered(ctx, lhs, BinaryOperator::Lte, prop, value),
        Includes => Expr::binary(
            typed_value(prop.kind, ctx.param(value.clone())),
            BinaryOperator::In,
            lhs,
        ),
        NotIncludes => Expr::Not(Box::new(Expr::binary(
            typed_value(prop.kind, ctx.param(value.clone())),
            BinaryOperator::In,
            lhs,
        ))),
        DistanceLt => distance(ctx, lhs, BinaryOperator::Lt, value)?,
        DistanceLte => distance(ctx, lhs, BinaryOperator::Lte, value)?,
        DistanceGt => distance(ctx, lhs, BinaryOperator::Gt, value)?,
        DistanceGte => distance(ctx, lhs, BinaryOperator::Gte, value)?,
        DistanceEq => distance(ctx, lhs, BinaryOperator::Eq, value)?,
    };
    Ok(expr)
}

fn string_op(
    ctx: &mut TranslationContext,
    lhs: Expr,
    op: BinaryOperator,
    value: &serde_json::Value,
    negate: bool,
) -> Result<Expr> {
    let expr = Expr::binary(lhs, op, ctx.param(value.clone()));
    Ok(if negate {
        Expr::Not(Box::new(expr))
    } else {
        expr
    })
}

fn ordered(
    ctx: &mut TranslationContext,
    lhs: Expr,
    op: BinaryOperator,
    prop: &Property,
    value: &serde_json::Value,
) -> Expr {
    Expr::binary(lhs, op, typed_value(prop.kind, ctx.param(value.clone())))
}

/// Spatial distance comparison: `point.distance(prop, point($p)) <op> $d`.
fn distance(
    ctx: &mut TranslationContext,
    lhs: Expr,
    op: BinaryOperator,
    value: &serde_json::Value,
) -> Result<Expr> {
    let object = value.as_object().ok_or_else(|| {
        Error::translation("distance filters expect an object with `point` and `distance`")
    })?;
    let point = object
        .get("point")
        .ok_or_else(|| Error::translation("distance filter missing `point`"))?;
    let threshold = object
        .get("distance")
        .ok_or_else(|| Error::translation("distance filter missing `distance`"))?;
    let call = Expr::func(
        "point.distance",
        vec![lhs, Expr::func("point", vec![ctx.param(point.clone())])],
    );
    Ok(Expr::binary(call, op, ctx.param(threshold.clone())))
}

/// Pattern for traversing `rel` from `owner_var` into `target_var`.
pub(crate) fn relationship_pattern(
    owner_var: &str,
    rel: &RelationshipField,
    rel_var: Option<String>,
    target_var: &str,
    target_labels: Vec<String>,
) -> Pattern {
    let direction = match rel.direction {
        Direction::Out => PatternDirection::Outgoing,
        Direction::In => PatternDirection::Incoming,
    };
    let mut rel_pattern = RelationshipPattern::typed(rel.rel_type.clone(), direction);
    rel_pattern.variable = rel_var;
    Pattern::hop(
        NodePattern {
            variable: Some(owner_var.to_string()),
            labels: Vec::new(),
            properties: Vec::new(),
        },
        rel_pattern,
        NodePattern {
            variable: Some(target_var.to_string()),
            labels: target_labels,
            properties: Vec::new(),
        },
    )
}

fn relationship_predicate(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    owner_var: &str,
    rel: &RelationshipField,
    quantifier: Quantifier,
    value: &serde_json::Value,
) -> Result<Expr> {
    let targets = schema.concrete_targets(&rel.target)?;

    if !rel.target.is_polymorphic() {
        let target = targets[0];
        return quantified(ctx, schema, owner_var, rel, target, quantifier, Some(value));
    }

    // Polymorphic targets take a per-concrete-type sub-object. Unspecified
    // members always pass.
    let object = match value {
        serde_json::Value::Object(map) if map.is_empty() => {
            // Existence check across every member.
            let mut parts = Vec::new();
            for target in &targets {
                parts.push(quantified(
                    ctx, schema, owner_var, rel, target, quantifier, None,
                )?);
            }
            return Ok(combine_branches(parts, quantifier));
        }
        serde_json::Value::Object(map) => map,
        other => {
            return Err(Error::translation(format!(
                "filter for polymorphic relationship `{}` expects per-type objects, got {other}",
                rel.name
            )))
        }
    };

    let mut parts = Vec::new();
    for (type_name, sub_where) in object {
        let target = targets
            .iter()
            .find(|t| t.name == *type_name)
            .ok_or_else(|| Error::unknown_field(type_name, rel.target.name()))?;
        parts.push(quantified(
            ctx,
            schema,
            owner_var,
            rel,
            target,
            quantifier,
            Some(sub_where),
        )?);
    }
    Ok(combine_branches(parts, quantifier))
}

/// SOME/SINGLE branches combine with OR (a match in any member type
/// suffices); ALL/NONE combine with AND.
fn combine_branches(mut parts: Vec<Expr>, quantifier: Quantifier) -> Expr {
    if parts.len() == 1 {
        return parts.remove(0);
    }
    match quantifier {
        Quantifier::Some | Quantifier::Single => Expr::Or(parts),
        Quantifier::All | Quantifier::None => Expr::And(parts),
    }
}

fn quantified(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    owner_var: &str,
    rel: &RelationshipField,
    target: &NodeType,
    quantifier: Quantifier,
    node_where: Option<&serde_json::Value>,
) -> Result<Expr> {
    let target_var = ctx.var("this");
    let labels = target.labels().iter().map(|l| l.to_string()).collect();
    let pattern = relationship_pattern(owner_var, rel, None, &target_var, labels);

    let predicate = match node_where {
        Some(value) => compile_nested(ctx, schema, EntityRef::Node(target), &target_var, value)?,
        None => None,
    };

    Ok(match quantifier {
        Quantifier::Some => Expr::binary(
            size_of(pattern, predicate),
            BinaryOperator::Gt,
            Expr::int(0),
        ),
        Quantifier::None => Expr::binary(
            size_of(pattern, predicate),
            BinaryOperator::Eq,
            Expr::int(0),
        ),
        Quantifier::Single => Expr::binary(
            size_of(pattern, predicate),
            BinaryOperator::Eq,
            Expr::int(1),
        ),
        Quantifier::All => match predicate {
            // Every related entity matches, and at least one exists.
            Some(p) => {
                let violating = size_of(pattern.clone(), Some(Expr::Not(Box::new(p))));
                let total = size_of(pattern, None);
                Expr::And(vec![
                    Expr::binary(violating, BinaryOperator::Eq, Expr::int(0)),
                    Expr::binary(total, BinaryOperator::Gt, Expr::int(0)),
                ])
            }
            None => Expr::binary(size_of(pattern, None), BinaryOperator::Gt, Expr::int(0)),
        },
    })
}

fn size_of(pattern: Pattern, predicate: Option<Expr>) -> Expr {
    Expr::func(
        "size",
        vec![Expr::PatternComprehension {
            pattern,
            predicate: predicate.map(Box::new),
            map: Box::new(Expr::int(1)),
        }],
    )
}

/// Aggregation comparison functions per operator suffix.
const AGGREGATE_FUNCTIONS: &[(&str, &str)] = &[
    ("_AVERAGE", "avg"),
    ("_SHORTEST", "min"),
    ("_LONGEST", "max"),
    ("_MIN", "min"),
    ("_MAX", "max"),
    ("_SUM", "sum"),
];

fn aggregate_predicate(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    owner_var: &str,
    rel: &RelationshipField,
    value: &serde_json::Value,
    clauses: &mut Vec<Clause>,
) -> Result<Expr> {
    if rel.target.is_polymorphic() {
        return Err(Error::translation(format!(
            "aggregation filters are not supported on polymorphic relationship `{}`",
            rel.name
        )));
    }
    let target = schema.expect_node(rel.target.name())?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::translation("aggregation filter expects an object"))?;

    let target_var = ctx.var("this");
    let rel_var = ctx.var("rel");
    let labels = target.labels().iter().map(|l| l.to_string()).collect();
    let pattern = relationship_pattern(
        owner_var,
        rel,
        Some(rel_var.clone()),
        &target_var,
        labels,
    );

    let mut comparisons = Vec::new();
    for (key, comparison) in object {
        match key.as_str() {
            "count" => comparisons.push(Expr::binary(
                Expr::func("count", vec![Expr::var(&target_var)]),
                BinaryOperator::Eq,
                ctx.param(comparison.clone()),
            )),
            "node" => aggregate_member(
                ctx,
                EntityRef::Node(target),
                &target_var,
                comparison,
                &mut comparisons,
            )?,
            "edge" => {
                let props_name = rel.properties.as_deref().ok_or_else(|| {
                    Error::translation(format!(
                        "relationship `{}` has no edge properties to aggregate",
                        rel.name
                    ))
                })?;
                let edge_type = schema
                    .relationship_properties(props_name)
                    .ok_or_else(|| Error::schema(format!("unknown properties type `{props_name}`")))?;
                aggregate_member(
                    ctx,
                    EntityRef::Edge(edge_type),
                    &rel_var,
                    comparison,
                    &mut comparisons,
                )?;
            }
            other => {
                if let Some((base, op)) = split_operator(other) {
                    if base == "count" {
                        let count = Expr::func("count", vec![Expr::var(&target_var)]);
                        comparisons.push(count_comparison(ctx, count, op, comparison, other)?);
                        continue;
                    }
                }
                return Err(Error::unknown_field(other, format!("{}Aggregate", rel.name)));
            }
        }
    }

    if comparisons.is_empty() {
        return Err(Error::translation(format!(
            "empty aggregation filter on `{}`",
            rel.name
        )));
    }

    let agg_var = ctx.var("agg");
    let result = Expr::conjoin(comparisons).expect("non-empty comparisons");
    clauses.push(Clause::Call {
        imports: vec![owner_var.to_string()],
        body: vec![
            Clause::Match {
                pattern,
                optional: false,
                where_clause: None,
            },
            Clause::Return(Projection::aliased(result, agg_var.clone())),
        ],
    });
    Ok(Expr::binary(
        Expr::var(agg_var),
        BinaryOperator::Eq,
        Expr::bool(true),
    ))
}

/// Property aggregations within a `node:`/`edge:` block, e.g.
/// `age_AVERAGE_GT: 10` or `name_SHORTEST_LT: 5`.
fn aggregate_member(
    ctx: &mut TranslationContext,
    entity: EntityRef<'_>,
    variable: &str,
    value: &serde_json::Value,
    comparisons: &mut Vec<Expr>,
) -> Result<()> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::translation("aggregation member filter expects an object"))?;
    for (key, comparison) in object {
        // Peel the comparison suffix, then the aggregation function suffix.
        let (base, op) = match split_operator(key) {
            Some(pair) => pair,
            None => (key.as_str(), ScalarOperator::Eq),
        };
        let (prop_name, func) = AGGREGATE_FUNCTIONS
            .iter()
            .find_map(|(suffix, func)| base.strip_suffix(suffix).map(|p| (p, *func)))
            .ok_or_else(|| Error::unknown_field(key, entity.type_name()))?;
        let prop = entity
            .property(prop_name)
            .ok_or_else(|| Error::unknown_field(prop_name, entity.type_name()))?;
        // SHORTEST/LONGEST aggregate string lengths.
        let operand = if base.ends_with("_SHORTEST") || base.ends_with("_LONGEST") {
            Expr::func("size", vec![Expr::prop(variable, &prop.name)])
        } else {
            Expr::prop(variable, &prop.name)
        };
        let agg = Expr::func(func, vec![operand]);
        comparisons.push(count_comparison(ctx, agg, op, comparison, key)?);
    }
    Ok(())
}

fn count_comparison(
    ctx: &mut TranslationContext,
    lhs: Expr,
    op: ScalarOperator,
    value: &serde_json::Value,
    key: &str,
) -> Result<Expr> {
    let binary = match op {
        ScalarOperator::Eq => BinaryOperator::Eq,
        ScalarOperator::Gt => BinaryOperator::Gt,
        ScalarOperator::Gte => BinaryOperator::Gte,
        ScalarOperator::Lt => BinaryOperator::Lt,
        ScalarOperator::Lte => BinaryOperator::Lte,
        _ => return Err(Error::invalid_operator(key, "aggregate")),
    };
    Ok(Expr::binary(lhs, binary, ctx.param(value.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::print_statement;
    use crate::cypher::Statement;
    use crate::schema::{
        NodeType, Property, PropertyKind, RelationshipField, RelationshipTarget, SchemaDefinition,
    };
    use serde_json::json;

    fn schema() -> SchemaModel {
        SchemaModel::from_definition(SchemaDefinition {
            types: vec![
                NodeType::new("Movie")
                    .with_property(Property::new("title", PropertyKind::String))
                    .with_property(Property::new("released", PropertyKind::Int))
                    .with_property(Property::new("tags", PropertyKind::String).as_list())
                    .with_property(Property::new("location", PropertyKind::Point))
                    .with_relationship(RelationshipField {
                        name: "actors".to_string(),
                        rel_type: "ACTED_IN".to_string(),
                        direction: Direction::In,
                        target: RelationshipTarget::Node("Actor".to_string()),
                        properties: None,
                        list: true,
                    }),
                NodeType::new("Actor")
                    .with_property(Property::new("name", PropertyKind::String))
                    .with_property(Property::new("age", PropertyKind::Int)),
            ],
            ..Default::default()
        })
        .unwrap()
    }

    fn compile(where_: serde_json::Value) -> (CompiledWhere, std::collections::HashMap<String, serde_json::Value>) {
        let schema = schema();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let compiled =
            compile_where(&mut ctx, &schema, EntityRef::Node(movie), "this", &where_).unwrap();
        (compiled, ctx.into_params())
    }

    fn predicate_text(where_: serde_json::Value) -> String {
        let (compiled, _) = compile(where_);
        crate::cypher::print::print_expression(compiled.predicate.as_ref().unwrap())
    }

    #[test]
    fn test_equality_binds_param() {
        let (compiled, params) = compile(json!({"title": "Inception"}));
        assert!(compiled.predicate.is_some());
        assert_eq!(params["param0"], json!("Inception"));
    }

    #[test]
    fn test_empty_filter_is_unrestricted() {
        let (compiled, params) = compile(json!({}));
        assert!(compiled.predicate.is_none());
        assert!(params.is_empty());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let schema = schema();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let err = compile_where(
            &mut ctx,
            &schema,
            EntityRef::Node(movie),
            "this",
            &json!({"director": "Nolan"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }

    #[test]
    fn test_string_operator_on_int_rejected() {
        let schema = schema();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let err = compile_where(
            &mut ctx,
            &schema,
            EntityRef::Node(movie),
            "this",
            &json!({"released_CONTAINS": "20"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOperator { .. }));
    }

    #[test]
    fn test_null_compiles_to_is_null() {
        let (compiled, params) = compile(json!({"title": null}));
        assert!(matches!(compiled.predicate, Some(Expr::IsNull(_))));
        assert!(params.is_empty());
    }

    #[test]
    fn test_distance_filter_shape() {
        let text = predicate_text(json!({
            "location_DISTANCE_LT": {"point": {"longitude": 1.0, "latitude": 2.0}, "distance": 10.0}
        }));
        assert_eq!(
            text,
            "point.distance(this.location, point($param0)) < $param1"
        );
    }

    #[test]
    fn test_relationship_some_quantifier() {
        let text = predicate_text(json!({"actors": {"name": "Leo"}}));
        assert_eq!(
            text,
            "size([(this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 | 1]) > 0"
        );
    }

    #[test]
    fn test_relationship_all_requires_existence() {
        let text = predicate_text(json!({"actors_ALL": {"name": "Leo"}}));
        assert!(text.contains("= 0"));
        assert!(text.contains("> 0"));
        assert!(text.contains("NOT (this0.name = $param0)"));
    }

    #[test]
    fn test_aggregate_count_filter_emits_call() {
        let (compiled, params) = compile(json!({"actorsAggregate": {"count_GT": 2}}));
        assert_eq!(compiled.clauses.len(), 1);
        let mut stmt = Statement::new();
        stmt.extend(compiled.clauses);
        let text = print_statement(&stmt);
        assert!(text.contains("CALL {"));
        assert!(text.contains("count(this0) > $param0"));
        assert_eq!(params["param0"], json!(2));
        assert!(matches!(compiled.predicate, Some(Expr::BinaryOp { .. })));
    }

    #[test]
    fn test_operator_precedence_not_in_before_in() {
        assert_eq!(
            split_operator("released_NOT_IN"),
            Some(("released", ScalarOperator::NotIn))
        );
        assert_eq!(
            split_operator("released_IN"),
            Some(("released", ScalarOperator::In))
        );
    }

    #[test]
    fn test_boolean_combinators() {
        let (compiled, _) = compile(json!({
            "OR": [{"title": "A"}, {"title": "B"}],
            "NOT": {"released_GT": 2000}
        }));
        match compiled.predicate.unwrap() {
            Expr::And(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], Expr::Or(_)));
                assert!(matches!(parts[1], Expr::Not(_)));
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn test_list_includes() {
        let text = predicate_text(json!({"tags_INCLUDES": "thriller"}));
        assert_eq!(text, "$param0 IN this.tags");
    }
}
