//! Connect, disconnect, and connect-or-create compilers.
//!
//! Connect candidates are matched with OPTIONAL MATCH and the MERGE runs
//! inside a FOREACH gated on a CASE list, so a zero-match connect writes
//! nothing instead of failing. MERGE on the relationship pattern keeps
//! repeated connects of the same pair from stacking parallel edges.
//! Disconnecting an absent relationship deletes NULL, a no-op.

use super::super::auth;
use super::super::filter;
use super::{
    concrete_mutation_target, count_return, create_rule_set_items, edge_properties_type,
    edge_set_items, simple_filter, ConnectInput, ConnectOrCreateInput, DisconnectInput,
};
use crate::cypher::{
    Clause, Expr, NodePattern, Pattern, Projection, TranslationContext,
};
use crate::schema::{AuthAction, AuthPhase, RelationshipField, SchemaModel};
use crate::translate::CallbackRegistry;
use crate::{Error, Result};

/// One conditional list for FOREACH write gating: empty when either end
/// of the relationship is missing.
fn write_gate(owner_var: &str, target_var: &str) -> Expr {
    Expr::Case {
        when: Box::new(Expr::Or(vec![
            Expr::IsNull(Box::new(Expr::var(owner_var))),
            Expr::IsNull(Box::new(Expr::var(target_var))),
        ])),
        then: Box::new(Expr::List(vec![])),
        alt: Box::new(Expr::List(vec![Expr::int(1)])),
    }
}

pub(crate) fn compile_connect(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    owner_var: &str,
    rel: &RelationshipField,
    item: &ConnectInput,
) -> Result<Clause> {
    let target = concrete_mutation_target(schema, rel)?;
    let edge_type = edge_properties_type(schema, rel);
    let target_var = ctx.var("this");
    let rel_var = ctx.var("rel");

    let predicate = simple_filter(ctx, schema, target, &target_var, &item.where_)?;
    let connect_auth = auth::compile_auth(
        ctx,
        target,
        &target_var,
        AuthAction::CreateRelationship,
        AuthPhase::Before,
    )?;

    let mut parts = Vec::new();
    parts.extend(connect_auth.filter);
    parts.extend(predicate);
    let mut body = vec![Clause::Match {
        pattern: Pattern::node(NodePattern::with_labels(
            target_var.clone(),
            target.labels().iter().map(|l| l.to_string()).collect(),
        )),
        optional: true,
        where_clause: Expr::conjoin(parts),
    }];
    // Validate rules must not fire on a zero-match connect.
    if let Some(validate) = connect_auth.validate {
        body.push(Clause::With(
            Projection::variables([owner_var.to_string(), target_var.clone()]).filtered(Some(
                Expr::Or(vec![Expr::IsNull(Box::new(Expr::var(target_var.clone()))), validate]),
            )),
        ));
    }

    let mut writes = vec![Clause::Merge {
        pattern: filter::relationship_pattern(
            owner_var,
            rel,
            Some(rel_var.clone()),
            &target_var,
            vec![],
        ),
        on_create: vec![],
    }];
    let edge_sets = edge_set_items(ctx, callbacks, edge_type, &rel_var, item.edge.as_ref())?;
    if !edge_sets.is_empty() {
        writes.push(Clause::Set(edge_sets));
    }
    body.push(Clause::Foreach {
        variable: "_".to_string(),
        list: write_gate(owner_var, &target_var),
        body: writes,
    });
    body.push(count_return(ctx));
    Ok(Clause::Call {
        imports: vec![owner_var.to_string()],
        body,
    })
}

pub(crate) fn compile_disconnect(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    owner_var: &str,
    rel: &RelationshipField,
    item: &DisconnectInput,
) -> Result<Clause> {
    let target = concrete_mutation_target(schema, rel)?;
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
    let mut parts = Vec::new();
    parts.extend(update_auth.filter);
    parts.extend(predicate);

    let mut body = vec![Clause::Match {
        pattern: filter::relationship_pattern(
            owner_var,
            rel,
            Some(rel_var.clone()),
            &target_var,
            target.labels().iter().map(|l| l.to_string()).collect(),
        ),
        optional: true,
        where_clause: Expr::conjoin(parts),
    }];
    if let Some(validate) = update_auth.validate {
        body.push(Clause::With(
            Projection::variables([rel_var.clone(), target_var.clone()]).filtered(Some(Expr::Or(
                vec![Expr::IsNull(Box::new(Expr::var(target_var.clone()))), validate],
            ))),
        ));
    }
    body.push(Clause::Delete {
        detach: false,
        targets: vec![Expr::var(rel_var)],
    });
    body.push(count_return(ctx));
    Ok(Clause::Call {
        imports: vec![owner_var.to_string()],
        body,
    })
}

pub(crate) fn compile_connect_or_create(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    owner_var: &str,
    rel: &RelationshipField,
    item: &ConnectOrCreateInput,
) -> Result<Clause> {
    let target = concrete_mutation_target(schema, rel)?;
    let edge_type = edge_properties_type(schema, rel);
    let unique = target.unique_property().ok_or_else(|| {
        Error::translation(format!(
            "connectOrCreate on `{}` requires a unique property",
            target.name
        ))
    })?;
    let key_value = item.where_node.get(unique).ok_or_else(|| {
        Error::translation(format!(
            "connectOrCreate `where.node` must provide the unique property `{unique}`"
        ))
    })?;
    for key in item.where_node.keys() {
        if key != unique {
            return Err(Error::translation(format!(
                "connectOrCreate merges on `{unique}` only, got extra key `{key}`"
            )));
        }
    }
    for key in item.on_create_node.keys() {
        if target.property(key).is_none() {
            return Err(Error::unknown_field(key, target.name.clone()));
        }
    }

    let target_var = ctx.var("this");
    let rel_var = ctx.var("rel");

    // The MERGE keys on the unique property; onCreate values apply
    // atomically only when the merge creates.
    let mut on_create = Vec::new();
    for (key, value) in &item.on_create_node {
        on_create.push(crate::cypher::SetItem::Property {
            target: target_var.clone(),
            key: key.clone(),
            value: ctx.param(value.clone()),
        });
    }
    let mut present = item.on_create_node.clone();
    present.insert(unique.to_string(), key_value.clone());
    on_create.extend(create_rule_set_items(
        ctx,
        callbacks,
        &target.rules,
        &present,
        &target_var,
    )?);

    let mut body = vec![Clause::Merge {
        pattern: Pattern::node(NodePattern {
            variable: Some(target_var.clone()),
            labels: target.labels().iter().map(|l| l.to_string()).collect(),
            properties: vec![(unique.to_string(), ctx.param(key_value.clone()))],
        }),
        on_create,
    }];

    let connect_auth = auth::compile_auth(
        ctx,
        target,
        &target_var,
        AuthAction::CreateRelationship,
        AuthPhase::Before,
    )?;
    if let Some(guard) = connect_auth.combined() {
        body.push(Clause::With(
            Projection::variables([owner_var.to_string(), target_var.clone()])
                .filtered(Some(guard)),
        ));
    }

    let edge_on_create = edge_set_items(
        ctx,
        callbacks,
        edge_type,
        &rel_var,
        item.on_create_edge.as_ref(),
    )?;
    body.push(Clause::Merge {
        pattern: filter::relationship_pattern(
            owner_var,
            rel,
            Some(rel_var),
            &target_var,
            vec![],
        ),
        on_create: edge_on_create,
    });
    body.push(count_return(ctx));
    Ok(Clause::Call {
        imports: vec![owner_var.to_string()],
        body,
    })
}
