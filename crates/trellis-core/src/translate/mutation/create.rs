//! Create compilers - top-level creates and nested create-and-connect.
//!
//! A nested create emits the node and its relationship in one CREATE
//! pattern, then applies scalar and autogenerated SET items, recurses into
//! the new node's own nested operations, and finally applies post-write
//! validation so the rules see the node exactly as written.

use super::super::auth;
use super::super::filter;
use super::{
    compile_relationship_ops, concrete_mutation_target, count_return, create_rule_set_items,
    edge_properties_type, edge_set_items, scalar_set_items, CreateNode,
};
use crate::cypher::{Clause, NodePattern, Pattern, Projection, TranslationContext};
use crate::schema::{AuthAction, AuthPhase, NodeType, RelationshipField, SchemaModel};
use crate::translate::CallbackRegistry;
use crate::Result;

/// Compile one top-level create. Returns the clauses plus the variable
/// bound to the created node, which the translator projects back.
/// `carried` lists variables bound by earlier creates in the same
/// statement; the validation `WITH` must keep them in scope.
pub(crate) fn compile_create(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    node: &NodeType,
    input: &CreateNode,
    carried: &[String],
) -> Result<(Vec<Clause>, String)> {
    let variable = ctx.var("this");
    let mut clauses = vec![Clause::Create {
        pattern: Pattern::node(NodePattern::with_labels(
            variable.clone(),
            node.labels().iter().map(|l| l.to_string()).collect(),
        )),
    }];
    clauses.extend(create_body(
        ctx,
        schema,
        callbacks,
        node,
        &variable,
        input,
        None,
        carried,
    )?);
    Ok((clauses, variable))
}

/// Compile a nested create under one relationship: CREATE the node and
/// relationship together, then the shared body.
pub(crate) fn compile_nested_create(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    owner_var: &str,
    rel: &RelationshipField,
    item: &CreateNode,
) -> Result<Clause> {
    let target = concrete_mutation_target(schema, rel)?;
    let target_var = ctx.var("this");
    let rel_var = ctx.var("rel");

    let mut body = vec![Clause::Create {
        pattern: filter::relationship_pattern(
            owner_var,
            rel,
            Some(rel_var.clone()),
            &target_var,
            target.labels().iter().map(|l| l.to_string()).collect(),
        ),
    }];
    body.extend(create_body(
        ctx,
        schema,
        callbacks,
        target,
        &target_var,
        item,
        Some((rel, &rel_var)),
        &[],
    )?);
    body.push(count_return(ctx));
    Ok(Clause::Call {
        imports: vec![owner_var.to_string()],
        body,
    })
}

/// SET items, nested operations, and post-write validation shared by both
/// create shapes.
fn create_body(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    node: &NodeType,
    variable: &str,
    input: &CreateNode,
    through: Option<(&RelationshipField, &str)>,
    carried: &[String],
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();

    let mut sets = scalar_set_items(ctx, node, variable, &input.properties)?;
    sets.extend(create_rule_set_items(
        ctx,
        callbacks,
        &node.rules,
        &input.properties,
        variable,
    )?);
    if let Some((rel, rel_var)) = through {
        sets.extend(edge_set_items(
            ctx,
            callbacks,
            edge_properties_type(schema, rel),
            rel_var,
            input.edge.as_ref(),
        )?);
    }
    if !sets.is_empty() {
        clauses.push(Clause::Set(sets));
    }

    for ops in &input.relationships {
        clauses.extend(compile_relationship_ops(
            ctx, schema, callbacks, node, variable, ops,
        )?);
    }

    // Validation runs after the node and its nested writes exist.
    let create_auth = auth::compile_auth(ctx, node, variable, AuthAction::Create, AuthPhase::After)?;
    if let Some(guard) = create_auth.combined() {
        let mut kept: Vec<String> = carried.to_vec();
        kept.push(variable.to_string());
        clauses.push(Clause::With(Projection::variables(kept).filtered(Some(guard))));
    }
    Ok(clauses)
}
