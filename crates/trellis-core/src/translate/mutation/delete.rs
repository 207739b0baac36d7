//! Delete compilers - cascading deletes, children before parents.
//!
//! Each level matches its candidates, runs the nested deletes of its
//! children first, then collects the DISTINCT survivors and DETACH DELETEs
//! them inside an inner `CALL`. Collecting first keeps the delete itself
//! off the row stream, so a candidate reached through several parents is
//! deleted once.

use super::super::auth;
use super::super::filter;
use super::{
    concrete_mutation_target, count_return, items, parse_delete_item, simple_filter, DeleteInput,
};
use crate::cypher::{
    Clause, Expr, NodePattern, Pattern, Projection, TranslationContext,
};
use crate::schema::{AuthAction, AuthPhase, NodeType, RelationshipField, SchemaModel};
use crate::{Error, Result};
use serde_json::Value;

/// Collect-then-delete tail shared by both delete shapes.
fn delete_collected(ctx: &mut TranslationContext, target_var: &str) -> Vec<Clause> {
    let targets_var = ctx.var("var");
    let element_var = ctx.var("this");
    vec![
        Clause::With(Projection::aliased(
            Expr::func("collect", vec![Expr::var(target_var)]),
            targets_var.clone(),
        )),
        Clause::Call {
            imports: vec![targets_var.clone()],
            body: vec![
                Clause::Unwind {
                    list: Expr::var(targets_var),
                    alias: element_var.clone(),
                },
                Clause::Delete {
                    detach: true,
                    targets: vec![Expr::var(element_var)],
                },
                count_return(ctx),
            ],
        },
    ]
}

pub(crate) fn compile_nested_delete(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    owner_var: &str,
    rel: &RelationshipField,
    item: &DeleteInput,
) -> Result<Clause> {
    let target = concrete_mutation_target(schema, rel)?;
    let target_var = ctx.var("this");

    let predicate = simple_filter(ctx, schema, target, &target_var, &item.where_)?;
    let delete_auth = auth::compile_auth(
        ctx,
        target,
        &target_var,
        AuthAction::Delete,
        AuthPhase::Before,
    )?;
    let mut parts = Vec::new();
    if let Some(validate) = delete_auth.validate {
        parts.push(validate);
    }
    parts.extend(delete_auth.filter);
    parts.extend(predicate);

    let mut body = vec![
        Clause::Match {
            pattern: filter::relationship_pattern(
                owner_var,
                rel,
                None,
                &target_var,
                target.labels().iter().map(|l| l.to_string()).collect(),
            ),
            optional: false,
            where_clause: Expr::conjoin(parts),
        },
        Clause::With(Projection {
            distinct: true,
            ..Projection::variables([target_var.clone()])
        }),
    ];

    for (field, children) in &item.nested {
        let child_rel = target
            .relationship(field)
            .ok_or_else(|| Error::unknown_field(field, target.name.clone()))?;
        for child in children {
            body.push(compile_nested_delete(ctx, schema, &target_var, child_rel, child)?);
        }
    }

    body.extend(delete_collected(ctx, &target_var));
    body.push(count_return(ctx));
    Ok(Clause::Call {
        imports: vec![owner_var.to_string()],
        body,
    })
}

/// Compile one top-level delete: match, cascade, DETACH DELETE. The
/// statement ends with a terminal count so zero matches still yield a row.
pub(crate) fn compile_delete_root(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    node: &NodeType,
    where_arg: &Value,
    delete_arg: &Value,
) -> Result<Vec<Clause>> {
    let variable = ctx.var("this");
    let compiled = filter::compile_where(
        ctx,
        schema,
        filter::EntityRef::Node(node),
        &variable,
        where_arg,
    )?;
    let delete_auth = auth::compile_auth(
        ctx,
        node,
        &variable,
        AuthAction::Delete,
        AuthPhase::Before,
    )?;
    let mut parts = Vec::new();
    if let Some(validate) = delete_auth.validate {
        parts.push(validate);
    }
    parts.extend(delete_auth.filter);
    parts.extend(compiled.predicate);

    let pattern = Pattern::node(NodePattern::with_labels(
        variable.clone(),
        node.labels().iter().map(|l| l.to_string()).collect(),
    ));
    let mut clauses = Vec::new();
    super::super::projection::push_filtered_match(
        &mut clauses,
        pattern,
        compiled.clauses,
        parts,
        vec![variable.clone()],
    );

    if !delete_arg.is_null() {
        let nested = super::expect_object(delete_arg, "nested delete operations")?;
        for (field, entries) in nested {
            let rel = node
                .relationship(field)
                .ok_or_else(|| Error::unknown_field(field, node.name.clone()))?;
            let child_target = concrete_mutation_target(schema, rel)?;
            for entry in items(entries) {
                let item = parse_delete_item(schema, child_target, entry)?;
                clauses.push(compile_nested_delete(ctx, schema, &variable, rel, &item)?);
            }
        }
    }

    clauses.extend(delete_collected(ctx, &variable));
    clauses.push(count_return(ctx));
    Ok(clauses)
}
