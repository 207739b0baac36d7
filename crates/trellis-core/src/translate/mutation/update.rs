//! Update compilers - scalar operator suffixes and nested updates.
//!
//! Scalar update keys accept operator suffixes on top of plain assignment:
//! `_INCREMENT`/`_DECREMENT`/`_ADD`/`_SUBTRACT`/`_MULTIPLY`/`_DIVIDE` for
//! numeric properties and `_PUSH`/`_POP` for lists. Suffix resolution
//! requires the base property to exist, so a property literally named
//! `score_INCREMENT` still updates by exact match first.
//!
//! A nested update scans candidates with OPTIONAL MATCH, then narrows to
//! matched rows with a `WITH ... WHERE target IS NOT NULL` before writing;
//! the terminal `RETURN count(*)` re-aggregates zero surviving rows back
//! into one, so a zero-match update is a no-op rather than a failure.

use super::super::auth;
use super::super::filter;
use super::{
    compile_relationship_ops, concrete_mutation_target, count_return, edge_properties_type,
    parse_update_input, simple_filter, update_rule_set_items, NestedUpdateInput, UpdateInput,
};
use crate::cypher::{
    BinaryOperator, Clause, Expr, Projection, SetItem, TranslationContext,
};
use crate::schema::{AuthAction, AuthPhase, NodeType, RelationshipField, SchemaModel};
use crate::translate::CallbackRegistry;
use crate::{Error, Result};
use serde_json::Value;

/// Mutating operators parsed from scalar update key suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOperator {
    Increment,
    Decrement,
    Add,
    Subtract,
    Multiply,
    Divide,
    Push,
    Pop,
}

impl UpdateOperator {
    fn numeric(self) -> bool {
        !matches!(self, UpdateOperator::Push | UpdateOperator::Pop)
    }
}

const UPDATE_SUFFIXES: &[(&str, UpdateOperator)] = &[
    ("_INCREMENT", UpdateOperator::Increment),
    ("_DECREMENT", UpdateOperator::Decrement),
    ("_ADD", UpdateOperator::Add),
    ("_SUBTRACT", UpdateOperator::Subtract),
    ("_MULTIPLY", UpdateOperator::Multiply),
    ("_DIVIDE", UpdateOperator::Divide),
    ("_PUSH", UpdateOperator::Push),
    ("_POP", UpdateOperator::Pop),
];

/// Split an update key into its base property and operator, when the key
/// carries a suffix and the base names a real property.
pub(crate) fn split_update_operator<'a>(
    node: &NodeType,
    key: &'a str,
) -> Option<(&'a str, UpdateOperator)> {
    for (suffix, operator) in UPDATE_SUFFIXES {
        if let Some(base) = key.strip_suffix(suffix) {
            if node.property(base).is_some() {
                return Some((base, *operator));
            }
        }
    }
    None
}

/// SET items for the scalar part of an update input. Exact property names
/// win over suffix interpretation.
pub(crate) fn scalar_update_set_items(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    scalars: &serde_json::Map<String, Value>,
) -> Result<Vec<SetItem>> {
    let mut set_items = Vec::new();
    for (key, value) in scalars {
        if node.property(key).is_some() {
            set_items.push(SetItem::Property {
                target: variable.to_string(),
                key: key.clone(),
                value: ctx.param(value.clone()),
            });
            continue;
        }
        let (base, operator) = split_update_operator(node, key)
            .ok_or_else(|| Error::unknown_field(key, node.name.clone()))?;
        let property = node.property(base).ok_or_else(|| {
            Error::internal(format!("suffix resolved against missing property `{base}`"))
        })?;
        if operator.numeric() {
            if property.list || !property.kind.is_numeric() {
                return Err(Error::invalid_operator(key, node.name.clone()));
            }
        } else if !property.list {
            return Err(Error::invalid_operator(key, node.name.clone()));
        }
        let current = Expr::prop(variable, base);
        let value_expr = match operator {
            UpdateOperator::Increment | UpdateOperator::Add => Expr::binary(
                current,
                BinaryOperator::Add,
                ctx.param(value.clone()),
            ),
            UpdateOperator::Decrement | UpdateOperator::Subtract => Expr::binary(
                current,
                BinaryOperator::Subtract,
                ctx.param(value.clone()),
            ),
            UpdateOperator::Multiply => Expr::binary(
                current,
                BinaryOperator::Multiply,
                ctx.param(value.clone()),
            ),
            UpdateOperator::Divide => Expr::binary(
                current,
                BinaryOperator::Divide,
                ctx.param(value.clone()),
            ),
            UpdateOperator::Push => {
                // Pushing onto an absent list starts one.
                let appended = match value {
                    Value::Array(_) => value.clone(),
                    other => Value::Array(vec![other.clone()]),
                };
                Expr::binary(
                    Expr::func(
                        "coalesce",
                        vec![current, Expr::List(vec![])],
                    ),
                    BinaryOperator::Add,
                    ctx.param(appended),
                )
            }
            UpdateOperator::Pop => {
                let count = value.as_i64().filter(|n| *n >= 0).ok_or_else(|| {
                    Error::translation(format!(
                        "`{key}` expects a non-negative integer, got {value}"
                    ))
                })?;
                Expr::Slice {
                    list: Box::new(current.clone()),
                    from: Some(Box::new(Expr::int(0))),
                    to: Some(Box::new(Expr::binary(
                        Expr::func("size", vec![current]),
                        BinaryOperator::Subtract,
                        ctx.param(serde_json::json!(count)),
                    ))),
                }
            }
        };
        set_items.push(SetItem::Property {
            target: variable.to_string(),
            key: base.to_string(),
            value: value_expr,
        });
    }
    Ok(set_items)
}

/// SET clause plus nested operations for one update input against a bound,
/// non-null node variable. Update timestamps and populate callbacks fire
/// whenever the input touches the node at all.
pub(crate) fn apply_update(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    node: &NodeType,
    variable: &str,
    input: &UpdateInput,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    let mut sets = scalar_update_set_items(ctx, node, variable, &input.scalars)?;
    if !input.scalars.is_empty() || !input.relationships.is_empty() {
        sets.extend(update_rule_set_items(ctx, callbacks, &node.rules, variable)?);
    }
    if !sets.is_empty() {
        clauses.push(Clause::Set(sets));
    }
    for ops in &input.relationships {
        clauses.extend(compile_relationship_ops(
            ctx, schema, callbacks, node, variable, ops,
        )?);
    }
    Ok(clauses)
}

pub(crate) fn compile_nested_update(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    owner_var: &str,
    rel: &RelationshipField,
    item: &NestedUpdateInput,
) -> Result<Clause> {
    let target = concrete_mutation_target(schema, rel)?;
    let edge_type = edge_properties_type(schema, rel);
    let target_var = ctx.var("this");
    let rel_var = ctx.var("rel");

    let predicate = simple_filter(ctx, schema, target, &target_var, &item.where_)?;
    let update_auth = auth::compile_auth(
        ctx,
        target,
        &target_var,
        AuthAction::Update,
        AuthPhase::Before,
    )?;
    let mut match_parts = Vec::new();
    match_parts.extend(update_auth.filter);
    match_parts.extend(predicate);

    let mut body = vec![Clause::Match {
        pattern: filter::relationship_pattern(
            owner_var,
            rel,
            Some(rel_var.clone()),
            &target_var,
            target.labels().iter().map(|l| l.to_string()).collect(),
        ),
        optional: true,
        where_clause: Expr::conjoin(match_parts),
    }];

    // Drop unmatched rows before writing; validation runs on the survivors.
    let mut narrow = vec![Expr::IsNotNull(Box::new(Expr::var(target_var.clone())))];
    narrow.extend(update_auth.validate);
    body.push(Clause::With(
        Projection::variables([target_var.clone(), rel_var.clone()])
            .filtered(Expr::conjoin(narrow)),
    ));

    let input = parse_update_input(schema, target, &item.node)?;
    body.extend(apply_update(ctx, schema, callbacks, target, &target_var, &input)?);

    if !item.edge.is_empty() {
        let edge_type = edge_type.ok_or_else(|| {
            Error::translation("edge properties supplied for a relationship without an edge type")
        })?;
        let mut edge_sets = Vec::new();
        for (key, value) in &item.edge {
            if edge_type.property(key).is_none() {
                return Err(Error::unknown_field(key, edge_type.name.clone()));
            }
            edge_sets.push(SetItem::Property {
                target: rel_var.clone(),
                key: key.clone(),
                value: ctx.param(value.clone()),
            });
        }
        body.push(Clause::Set(edge_sets));
    }

    let after_auth = auth::compile_auth(
        ctx,
        target,
        &target_var,
        AuthAction::Update,
        AuthPhase::After,
    )?;
    if let Some(guard) = after_auth.combined() {
        body.push(Clause::With(
            Projection::variables([target_var.clone()]).filtered(Some(guard)),
        ));
    }

    body.push(count_return(ctx));
    Ok(Clause::Call {
        imports: vec![owner_var.to_string()],
        body,
    })
}
