//! Projection compiler - selection sets to Cypher map projections.
//!
//! Each selected field becomes a map-projection item: stored properties
//! project as `.prop`, cypher-computed fields materialize through a nested
//! `CALL` subquery, relationship fields become `CALL` subqueries that match
//! the pattern, apply where/sort/auth recursively, and `collect()` the
//! nested projection. Connection fields wrap the collected edges in the
//! `edges`/`pageInfo`/`totalCount` shape with opaque cursors. Polymorphic
//! targets emit one branch per concrete type inside a `CALL { .. UNION ..
//! }` block, tagged with a `__resolveType` discriminator; inline-fragment
//! fields only project in the branch their condition names.

use super::auth;
use super::filter::{self, EntityRef};
use super::sort::{self, SortKeyKind};
use crate::cypher::{
    BinaryOperator, Clause, Expr, MapProjectionItem, Pattern, Projection, TranslationContext,
};
use crate::graphql::{Field, SelectionSet};
use crate::schema::{
    AuthAction, AuthPhase, NodeType, RelationshipField, RelationshipPropertiesType, SchemaModel,
};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap};

/// A compiled projection: subquery clauses to emit in the current scope,
/// then the map expression that references the variables they bind.
#[derive(Debug)]
pub struct CompiledProjection {
    /// `CALL` subqueries (relationships, computed fields) the expression
    /// depends on.
    pub clauses: Vec<Clause>,
    /// The map projection for the entity.
    pub expr: Expr,
}

/// Compile a selection set against `node`, bound to `variable`.
pub fn compile_projection(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    node: &NodeType,
    variable: &str,
    selection: &SelectionSet,
) -> Result<CompiledProjection> {
    let (clauses, items) = projection_items(ctx, schema, node, variable, selection)?;
    Ok(CompiledProjection {
        clauses,
        expr: Expr::MapProjection {
            variable: variable.to_string(),
            items,
        },
    })
}

pub(crate) fn projection_items(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    node: &NodeType,
    variable: &str,
    selection: &SelectionSet,
) -> Result<(Vec<Clause>, Vec<MapProjectionItem>)> {
    let mut clauses = Vec::new();
    let mut items = Vec::new();
    for field in selection.fields_for_type(&node.name) {
        let key = field.response_key().to_string();
        if field.name == "__typename" || field.name == "__resolveType" {
            items.push(MapProjectionItem::Computed {
                alias: key,
                value: Expr::string(node.name.clone()),
            });
            continue;
        }
        if node.property(&field.name).is_some() {
            if field.alias.is_none() {
                items.push(MapProjectionItem::Property {
                    key: field.name.clone(),
                });
            } else {
                items.push(MapProjectionItem::Computed {
                    alias: key,
                    value: Expr::prop(variable, &field.name),
                });
            }
            continue;
        }
        if let Some((statement, column)) = node.computed(&field.name) {
            let (clause, value_var) = computed_call(ctx, variable, statement, column);
            clauses.push(clause);
            items.push(MapProjectionItem::Computed {
                alias: key,
                value: Expr::var(value_var),
            });
            continue;
        }
        if let Some(rel) = node.relationship(&field.name) {
            let (clause, value_var) = relationship_subquery(ctx, schema, rel, variable, field)?;
            clauses.push(clause);
            items.push(MapProjectionItem::Computed {
                alias: key,
                value: Expr::var(value_var),
            });
            continue;
        }
        if let Some(rel) = node.connection_relationship(&field.name) {
            let (clause, value_var) =
                connection_subquery(ctx, schema, node, rel, variable, field)?;
            clauses.push(clause);
            items.push(MapProjectionItem::Computed {
                alias: key,
                value: Expr::var(value_var),
            });
            continue;
        }
        return Err(Error::unknown_field(&field.name, node.name.clone()));
    }
    Ok((clauses, items))
}

/// Wrap a cypher-computed rule in nested `CALL` subqueries and bind its
/// return column to a fresh variable. The inner subquery rebinds the
/// current node as `this`, which is the name schema-author fragments use.
pub(crate) fn computed_call(
    ctx: &mut TranslationContext,
    variable: &str,
    statement: &str,
    column: &str,
) -> (Clause, String) {
    let value_var = ctx.var("this");
    let clause = Clause::Call {
        imports: vec![variable.to_string()],
        body: vec![
            Clause::Call {
                imports: vec![variable.to_string()],
                body: vec![
                    Clause::Raw(format!("WITH {variable} AS this")),
                    Clause::Raw(statement.to_string()),
                ],
            },
            Clause::Return(Projection::aliased(Expr::var(column), value_var.clone())),
        ],
    };
    (clause, value_var)
}

/// Emit `MATCH pattern` plus the filter predicates. Aggregation filters
/// need their `CALL` clauses between the match and the predicate, which
/// forces the predicate into a `WITH ... WHERE`; otherwise the predicate
/// goes inline on the match.
pub(crate) fn push_filtered_match(
    body: &mut Vec<Clause>,
    pattern: Pattern,
    filter_clauses: Vec<Clause>,
    parts: Vec<Expr>,
    keep: Vec<String>,
) {
    let predicate = Expr::conjoin(parts);
    if filter_clauses.is_empty() {
        body.push(Clause::Match {
            pattern,
            optional: false,
            where_clause: predicate,
        });
        return;
    }
    body.push(Clause::Match {
        pattern,
        optional: false,
        where_clause: None,
    });
    body.extend(filter_clauses);
    if let Some(predicate) = predicate {
        let mut vars: BTreeSet<String> = keep.into_iter().collect();
        collect_variables(&predicate, &mut vars);
        body.push(Clause::With(
            Projection::variables(vars).filtered(Some(predicate)),
        ));
    }
}

/// Free variables of an expression, for rebuilding WITH scopes. Variables
/// bound inside comprehensions stay local; a pattern comprehension's start
/// node is a reference to an outer binding.
fn collect_variables(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Variable(name) => {
            out.insert(name.clone());
        }
        Expr::Param(_) | Expr::Literal(_) => {}
        Expr::Property { base, .. } => collect_variables(base, out),
        Expr::Func { args, .. } => {
            for arg in args {
                collect_variables(arg, out);
            }
        }
        Expr::BinaryOp { lhs, rhs, .. } => {
            collect_variables(lhs, out);
            collect_variables(rhs, out);
        }
        Expr::And(parts) | Expr::Or(parts) | Expr::List(parts) => {
            for part in parts {
                collect_variables(part, out);
            }
        }
        Expr::Not(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
            collect_variables(inner, out);
        }
        Expr::Map(entries) => {
            for (_, value) in entries {
                collect_variables(value, out);
            }
        }
        Expr::MapProjection { variable, items } => {
            out.insert(variable.clone());
            for item in items {
                if let MapProjectionItem::Computed { value, .. } = item {
                    collect_variables(value, out);
                }
            }
        }
        Expr::ListComprehension {
            variable,
            list,
            predicate,
            map,
        } => {
            collect_variables(list, out);
            let mut inner = BTreeSet::new();
            if let Some(predicate) = predicate {
                collect_variables(predicate, &mut inner);
            }
            if let Some(map) = map {
                collect_variables(map, &mut inner);
            }
            inner.remove(variable.as_str());
            out.extend(inner);
        }
        Expr::PatternComprehension {
            pattern,
            predicate,
            map,
        } => {
            if let Some(start) = &pattern.start.variable {
                out.insert(start.clone());
            }
            let mut bound = BTreeSet::new();
            for (rel, node) in &pattern.segments {
                bound.extend(rel.variable.clone());
                bound.extend(node.variable.clone());
            }
            let mut inner = BTreeSet::new();
            if let Some(predicate) = predicate {
                collect_variables(predicate, &mut inner);
            }
            collect_variables(map, &mut inner);
            for name in bound {
                inner.remove(&name);
            }
            out.extend(inner);
        }
        Expr::Slice { list, from, to } => {
            collect_variables(list, out);
            if let Some(from) = from {
                collect_variables(from, out);
            }
            if let Some(to) = to {
                collect_variables(to, out);
            }
        }
        Expr::Index { list, index } => {
            collect_variables(list, out);
            collect_variables(index, out);
        }
        Expr::Case { when, then, alt } => {
            collect_variables(when, out);
            collect_variables(then, out);
            collect_variables(alt, out);
        }
    }
}

fn relationship_subquery(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    rel: &RelationshipField,
    variable: &str,
    field: &Field,
) -> Result<(Clause, String)> {
    let targets = schema.concrete_targets(&rel.target)?;
    if rel.target.is_polymorphic() {
        return polymorphic_subquery(ctx, schema, rel, variable, field, &targets);
    }
    let target = targets[0];
    let target_var = ctx.var("this");
    let result_var = ctx.var("var");
    let pattern = filter::relationship_pattern(
        variable,
        rel,
        None,
        &target_var,
        target.labels().iter().map(|l| l.to_string()).collect(),
    );

    let null = serde_json::Value::Null;
    let where_arg = field.argument("where").unwrap_or(&null);
    let compiled = filter::compile_where(ctx, schema, EntityRef::Node(target), &target_var, where_arg)?;
    let read_auth =
        auth::compile_auth(ctx, target, &target_var, AuthAction::Read, AuthPhase::Before)?
            .combined();

    let mut body = Vec::new();
    let mut parts = Vec::new();
    parts.extend(read_auth);
    parts.extend(compiled.predicate);
    push_filtered_match(
        &mut body,
        pattern,
        compiled.clauses,
        parts,
        vec![target_var.clone()],
    );

    let keys = sort::resolve_sort(target, field.argument("sort").unwrap_or(&null))?;
    let paging = sort::parse_paging(ctx, &field.arguments)?;
    let mut computed_vars = HashMap::new();
    let mut materialized = Vec::new();
    for key in &keys {
        if let SortKeyKind::Computed { statement, column } = &key.kind {
            if !computed_vars.contains_key(&key.field) {
                let (clause, value_var) = computed_call(ctx, &target_var, statement, column);
                body.push(clause);
                computed_vars.insert(key.field.clone(), value_var.clone());
                materialized.push(value_var);
            }
        }
    }
    if !keys.is_empty() || paging.skip.is_some() || paging.limit.is_some() {
        let order_by = sort::order_items(&keys, &target_var, None, &computed_vars)?;
        let mut carried = vec![target_var.clone()];
        carried.extend(materialized);
        body.push(Clause::With(Projection {
            order_by,
            skip: paging.skip,
            limit: paging.limit,
            ..Projection::variables(carried)
        }));
    }

    let nested = compile_projection(ctx, schema, target, &target_var, &field.selection)?;
    body.extend(nested.clauses);
    let collected = Expr::func("collect", vec![nested.expr]);
    let value = if rel.list {
        collected
    } else {
        Expr::func("head", vec![collected])
    };
    body.push(Clause::Return(Projection::aliased(value, result_var.clone())));
    Ok((
        Clause::Call {
            imports: vec![variable.to_string()],
            body,
        },
        result_var,
    ))
}

/// Union/interface relationship: one branch per concrete target inside a
/// `CALL { .. UNION ALL .. }`. Filters are keyed by concrete type name;
/// unspecified members pass unfiltered.
fn polymorphic_subquery(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    rel: &RelationshipField,
    variable: &str,
    field: &Field,
    targets: &[&NodeType],
) -> Result<(Clause, String)> {
    let null = serde_json::Value::Null;
    let where_map = match field.argument("where").unwrap_or(&null) {
        serde_json::Value::Null => None,
        serde_json::Value::Object(map) => Some(map),
        other => {
            return Err(Error::translation(format!(
                "expected a per-type filter object for `{}`, got {other}",
                rel.name
            )))
        }
    };
    if let Some(map) = where_map {
        for key in map.keys() {
            if !targets.iter().any(|t| &t.name == key) {
                return Err(Error::unknown_field(key, rel.target.name().to_string()));
            }
        }
    }

    let branch_var = ctx.var("var");
    let result_var = ctx.var("var");
    let mut branches = Vec::new();
    for target in targets {
        let target_var = ctx.var("this");
        let pattern = filter::relationship_pattern(
            variable,
            rel,
            None,
            &target_var,
            target.labels().iter().map(|l| l.to_string()).collect(),
        );
        let sub_where = where_map
            .and_then(|m| m.get(&target.name))
            .unwrap_or(&null);
        let compiled =
            filter::compile_where(ctx, schema, EntityRef::Node(target), &target_var, sub_where)?;
        let read_auth =
            auth::compile_auth(ctx, target, &target_var, AuthAction::Read, AuthPhase::Before)?
                .combined();

        let mut branch = vec![Clause::With(Projection::variables([variable.to_string()]))];
        let mut parts = Vec::new();
        parts.extend(read_auth);
        parts.extend(compiled.predicate);
        push_filtered_match(
            &mut branch,
            pattern,
            compiled.clauses,
            parts,
            vec![target_var.clone()],
        );

        let (clauses, mut items) =
            projection_items(ctx, schema, target, &target_var, &field.selection)?;
        let tagged = items.iter().any(|item| {
            matches!(item, MapProjectionItem::Computed { alias, .. } if alias == "__resolveType")
        });
        if !tagged {
            items.insert(
                0,
                MapProjectionItem::Computed {
                    alias: "__resolveType".to_string(),
                    value: Expr::string(target.name.clone()),
                },
            );
        }
        branch.extend(clauses);
        branch.push(Clause::Return(Projection::aliased(
            Expr::MapProjection {
                variable: target_var,
                items,
            },
            branch_var.clone(),
        )));
        branches.push(branch);
    }

    let paging = sort::parse_paging(ctx, &field.arguments)?;
    let mut body = vec![Clause::Call {
        imports: vec![],
        body: vec![Clause::Union {
            all: true,
            branches,
        }],
    }];
    if paging.skip.is_some() || paging.limit.is_some() {
        body.push(Clause::With(Projection {
            skip: paging.skip,
            limit: paging.limit,
            ..Projection::variables([branch_var.clone()])
        }));
    }
    let collected = Expr::func("collect", vec![Expr::var(branch_var)]);
    let value = if rel.list {
        collected
    } else {
        Expr::func("head", vec![collected])
    };
    body.push(Clause::Return(Projection::aliased(value, result_var.clone())));
    Ok((
        Clause::Call {
            imports: vec![variable.to_string()],
            body,
        },
        result_var,
    ))
}

fn connection_subquery(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    owner: &NodeType,
    rel: &RelationshipField,
    variable: &str,
    field: &Field,
) -> Result<(Clause, String)> {
    let connection_type = format!("{}{}Connection", owner.name, pascal_case(&rel.name));
    if rel.target.is_polymorphic() {
        return Err(Error::translation(format!(
            "`{}` paginates a union or interface target; select the `{}` field with inline fragments instead",
            field.name, rel.name
        )));
    }
    let target = schema.concrete_targets(&rel.target)?[0];
    let edge_type = rel
        .properties
        .as_deref()
        .and_then(|name| schema.relationship_properties(name));

    let rel_var = ctx.var("rel");
    let target_var = ctx.var("this");
    let result_var = ctx.var("var");
    let pattern = filter::relationship_pattern(
        variable,
        rel,
        Some(rel_var.clone()),
        &target_var,
        target.labels().iter().map(|l| l.to_string()).collect(),
    );

    // Connection filters split into node and edge halves.
    let null = serde_json::Value::Null;
    let (node_where, edge_where) = match field.argument("where").unwrap_or(&null) {
        serde_json::Value::Null => (&null, &null),
        serde_json::Value::Object(map) => {
            for key in map.keys() {
                if key != "node" && key != "edge" {
                    return Err(Error::unknown_field(key, connection_type.clone()));
                }
            }
            (
                map.get("node").unwrap_or(&null),
                map.get("edge").unwrap_or(&null),
            )
        }
        other => {
            return Err(Error::translation(format!(
                "expected a filter object for `{}`, got {other}",
                field.name
            )))
        }
    };
    let compiled =
        filter::compile_where(ctx, schema, EntityRef::Node(target), &target_var, node_where)?;
    let mut parts = Vec::new();
    parts.extend(
        auth::compile_auth(ctx, target, &target_var, AuthAction::Read, AuthPhase::Before)?
            .combined(),
    );
    if !edge_where.is_null() {
        let edge_entity = edge_type.ok_or_else(|| {
            Error::translation(format!(
                "relationship `{}` has no edge properties to filter",
                rel.name
            ))
        })?;
        let edge_compiled =
            filter::compile_where(ctx, schema, EntityRef::Edge(edge_entity), &rel_var, edge_where)?;
        parts.extend(edge_compiled.predicate);
    }
    parts.extend(compiled.predicate);

    let mut body = Vec::new();
    push_filtered_match(
        &mut body,
        pattern,
        compiled.clauses,
        parts,
        vec![rel_var.clone(), target_var.clone()],
    );

    let keys =
        sort::resolve_connection_sort(target, edge_type, field.argument("sort").unwrap_or(&null))?;
    let paging = sort::parse_paging(ctx, &field.arguments)?;
    let skip_expr = paging.skip.clone();
    let limit_expr = paging.limit.clone();
    let mut computed_vars = HashMap::new();
    let mut materialized = Vec::new();
    for key in &keys {
        if let SortKeyKind::Computed { statement, column } = &key.kind {
            if !computed_vars.contains_key(&key.field) {
                let (clause, value_var) = computed_call(ctx, &target_var, statement, column);
                body.push(clause);
                computed_vars.insert(key.field.clone(), value_var.clone());
                materialized.push(value_var);
            }
        }
    }

    // Collect every matched edge first so totalCount reflects the full,
    // unpaginated set.
    let edges_var = ctx.var("edges");
    let total_var = ctx.var("var");
    let mut edge_entries = vec![
        ("node".to_string(), Expr::var(target_var.clone())),
        ("relationship".to_string(), Expr::var(rel_var.clone())),
    ];
    for value_var in &materialized {
        edge_entries.push((value_var.clone(), Expr::var(value_var.clone())));
    }
    body.push(Clause::With(Projection::aliased(
        Expr::func("collect", vec![Expr::Map(edge_entries)]),
        edges_var.clone(),
    )));
    body.push(Clause::With(
        Projection::variables([edges_var.clone()]).item(
            Expr::func("size", vec![Expr::var(edges_var.clone())]),
            Some(total_var.clone()),
        ),
    ));

    let edges_field = field.selection.field("edges");
    let page_info_field = field.selection.field("pageInfo");
    if let Some(edges_field) = edges_field {
        for sub in edges_field.selection.fields() {
            match sub.name.as_str() {
                "cursor" | "node" | "properties" | "__typename" => {}
                other => {
                    return Err(Error::unknown_field(
                        other,
                        format!("{}Edge", connection_type.trim_end_matches("Connection")),
                    ))
                }
            }
        }
    }
    let wants_cursor =
        edges_field.is_some_and(|f| f.selection.field("cursor").is_some());
    let wants_bound_cursors = page_info_field.is_some_and(|f| {
        f.selection.field("startCursor").is_some() || f.selection.field("endCursor").is_some()
    });
    let need_cursor = wants_cursor || wants_bound_cursors;

    // Per-edge subquery: unwind, sort, page, project.
    let edges_out = if edges_field.is_some() || wants_bound_cursors {
        let edge_alias = ctx.var("edge");
        let edges_out = ctx.var("var");
        let mut inner = vec![Clause::Unwind {
            list: Expr::var(edges_var.clone()),
            alias: edge_alias.clone(),
        }];

        let mut rename = Projection::default()
            .item(
                Expr::Property {
                    base: Box::new(Expr::var(edge_alias.clone())),
                    key: "node".to_string(),
                },
                Some(target_var.clone()),
            )
            .item(
                Expr::Property {
                    base: Box::new(Expr::var(edge_alias.clone())),
                    key: "relationship".to_string(),
                },
                Some(rel_var.clone()),
            );
        for value_var in &materialized {
            rename = rename.item(
                Expr::Property {
                    base: Box::new(Expr::var(edge_alias.clone())),
                    key: value_var.clone(),
                },
                Some(value_var.clone()),
            );
        }
        rename.order_by = sort::order_items(&keys, &target_var, Some(&rel_var), &computed_vars)?;
        rename.skip = paging.skip;
        rename.limit = paging.limit;
        inner.push(Clause::With(rename));

        let mut content: Vec<(String, Expr)> = Vec::new();
        if let Some(node_field) = edges_field.and_then(|f| f.selection.field("node")) {
            let nested =
                compile_projection(ctx, schema, target, &target_var, &node_field.selection)?;
            inner.extend(nested.clauses);
            content.push((node_field.response_key().to_string(), nested.expr));
        }
        if let Some(props_field) = edges_field.and_then(|f| f.selection.field("properties")) {
            let edge_entity = edge_type.ok_or_else(|| {
                Error::translation(format!(
                    "relationship `{}` has no edge properties to project",
                    rel.name
                ))
            })?;
            content.push((
                props_field.response_key().to_string(),
                edge_properties_projection(edge_entity, &rel_var, &props_field.selection)?,
            ));
        }

        if need_cursor {
            // Cursors are ordinal positions after sorting, so recollect the
            // page and index it.
            let page_var = ctx.var("var");
            let index_var = ctx.var("i");
            let entry_var = ctx.var("edge");
            inner.push(Clause::With(Projection::aliased(
                Expr::func("collect", vec![Expr::Map(content)]),
                page_var.clone(),
            )));
            inner.push(Clause::Unwind {
                list: Expr::func(
                    "range",
                    vec![
                        Expr::int(0),
                        Expr::binary(
                            Expr::func("size", vec![Expr::var(page_var.clone())]),
                            BinaryOperator::Subtract,
                            Expr::int(1),
                        ),
                    ],
                ),
                alias: index_var.clone(),
            });
            inner.push(Clause::With(
                Projection::aliased(
                    Expr::Index {
                        list: Box::new(Expr::var(page_var)),
                        index: Box::new(Expr::var(index_var.clone())),
                    },
                    entry_var.clone(),
                )
                .item(Expr::var(index_var.clone()), None),
            ));
            let cursor = cursor_expression(&index_var, skip_expr.as_ref());
            let mut final_entries: Vec<(String, Expr)> = Vec::new();
            let mut has_cursor = false;
            if let Some(edges_field) = edges_field {
                for sub in edges_field.selection.fields() {
                    match sub.name.as_str() {
                        "cursor" => {
                            has_cursor = true;
                            final_entries.push((sub.response_key().to_string(), cursor.clone()));
                        }
                        "node" | "properties" => final_entries.push((
                            sub.response_key().to_string(),
                            Expr::Property {
                                base: Box::new(Expr::var(entry_var.clone())),
                                key: sub.response_key().to_string(),
                            },
                        )),
                        _ => {}
                    }
                }
            }
            if !has_cursor {
                final_entries.push(("cursor".to_string(), cursor));
            }
            inner.push(Clause::Return(Projection::aliased(
                Expr::func("collect", vec![Expr::Map(final_entries)]),
                edges_out.clone(),
            )));
        } else {
            inner.push(Clause::Return(Projection::aliased(
                Expr::func("collect", vec![Expr::Map(content)]),
                edges_out.clone(),
            )));
        }
        body.push(Clause::Call {
            imports: vec![edges_var.clone()],
            body: inner,
        });
        Some(edges_out)
    } else {
        None
    };

    let mut entries: Vec<(String, Expr)> = Vec::new();
    for sub in field.selection.fields() {
        let key = sub.response_key().to_string();
        match sub.name.as_str() {
            "edges" => entries.push((
                key,
                Expr::var(edges_out.clone().ok_or_else(|| {
                    Error::internal("edges selected without an edges subquery")
                })?),
            )),
            "totalCount" => entries.push((key, Expr::var(total_var.clone()))),
            "pageInfo" => entries.push((
                key,
                page_info_expression(
                    sub,
                    edges_out.as_deref(),
                    &total_var,
                    paging.offset,
                    limit_expr.as_ref(),
                )?,
            )),
            "__typename" => entries.push((key, Expr::string(connection_type.clone()))),
            other => return Err(Error::unknown_field(other, connection_type.clone())),
        }
    }
    body.push(Clause::Return(Projection::aliased(
        Expr::Map(entries),
        result_var.clone(),
    )));
    Ok((
        Clause::Call {
            imports: vec![variable.to_string()],
            body,
        },
        result_var,
    ))
}

/// `offset:N` cursor for the edge at post-sort position `index`, shifted
/// by the requested skip.
pub(crate) fn cursor_expression(index_var: &str, skip: Option<&Expr>) -> Expr {
    let position = match skip {
        Some(skip) => Expr::binary(
            Expr::var(index_var),
            BinaryOperator::Add,
            skip.clone(),
        ),
        None => Expr::var(index_var),
    };
    Expr::func(
        "apoc.text.base64Encode",
        vec![Expr::binary(
            Expr::string("offset:"),
            BinaryOperator::Add,
            Expr::func("toString", vec![position]),
        )],
    )
}

pub(crate) fn page_info_expression(
    field: &Field,
    edges_out: Option<&str>,
    total_var: &str,
    offset: i64,
    limit: Option<&Expr>,
) -> Result<Expr> {
    let mut entries = Vec::new();
    for sub in field.selection.fields() {
        let key = sub.response_key().to_string();
        let expr = match sub.name.as_str() {
            "hasNextPage" => {
                let consumed = match (edges_out, limit) {
                    (Some(edges_out), _) => Expr::binary(
                        Expr::int(offset),
                        BinaryOperator::Add,
                        Expr::func("size", vec![Expr::var(edges_out)]),
                    ),
                    (None, Some(limit)) => {
                        Expr::binary(Expr::int(offset), BinaryOperator::Add, limit.clone())
                    }
                    // Unpaginated and edges not selected: everything is on
                    // this page.
                    (None, None) => Expr::var(total_var),
                };
                Expr::binary(consumed, BinaryOperator::Lt, Expr::var(total_var))
            }
            "hasPreviousPage" => Expr::bool(offset > 0),
            "startCursor" => Expr::Property {
                base: Box::new(Expr::Index {
                    list: Box::new(Expr::var(required_edges(edges_out)?)),
                    index: Box::new(Expr::int(0)),
                }),
                key: "cursor".to_string(),
            },
            "endCursor" => Expr::Property {
                base: Box::new(Expr::func(
                    "last",
                    vec![Expr::var(required_edges(edges_out)?)],
                )),
                key: "cursor".to_string(),
            },
            "__typename" => Expr::string("PageInfo"),
            other => return Err(Error::unknown_field(other, "PageInfo")),
        };
        entries.push((key, expr));
    }
    Ok(Expr::Map(entries))
}

fn required_edges(edges_out: Option<&str>) -> Result<String> {
    edges_out
        .map(str::to_string)
        .ok_or_else(|| Error::internal("cursor bounds requested without an edges subquery"))
}

fn edge_properties_projection(
    edge: &RelationshipPropertiesType,
    rel_var: &str,
    selection: &SelectionSet,
) -> Result<Expr> {
    let mut items = Vec::new();
    for sub in selection.fields() {
        if sub.name == "__typename" {
            items.push(MapProjectionItem::Computed {
                alias: sub.response_key().to_string(),
                value: Expr::string(edge.name.clone()),
            });
            continue;
        }
        if edge.property(&sub.name).is_none() {
            return Err(Error::unknown_field(&sub.name, edge.name.clone()));
        }
        if sub.alias.is_none() {
            items.push(MapProjectionItem::Property {
                key: sub.name.clone(),
            });
        } else {
            items.push(MapProjectionItem::Computed {
                alias: sub.response_key().to_string(),
                value: Expr::prop(rel_var, &sub.name),
            });
        }
    }
    Ok(Expr::MapProjection {
        variable: rel_var.to_string(),
        items,
    })
}

fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::{print_statement, Statement};
    use crate::graphql::Field as GqlField;
    use crate::schema::{
        Direction, NodeType, Property, PropertyKind, RelationshipField, RelationshipTarget, Rule,
        SchemaDefinition, SchemaModel, UnionType,
    };

    fn movie_schema() -> SchemaModel {
        SchemaModel::from_definition(SchemaDefinition {
            types: vec![
                NodeType::new("Movie")
                    .with_property(Property::new("title", PropertyKind::String))
                    .with_relationship(RelationshipField {
                        name: "actors".to_string(),
                        rel_type: "ACTED_IN".to_string(),
                        direction: Direction::In,
                        target: RelationshipTarget::Node("Actor".to_string()),
                        properties: None,
                        list: true,
                    }),
                NodeType::new("Actor").with_property(Property::new("name", PropertyKind::String)),
            ],
            ..Default::default()
        })
        .unwrap()
    }

    fn print_with_match(node: &NodeType, variable: &str, projection: CompiledProjection) -> String {
        let mut stmt = Statement::new();
        stmt.push(Clause::Match {
            pattern: Pattern::node(crate::cypher::NodePattern::with_labels(
                variable,
                vec![node.primary_label().to_string()],
            )),
            optional: false,
            where_clause: None,
        });
        stmt.extend(projection.clauses);
        stmt.push(Clause::Return(Projection::aliased(projection.expr, variable)));
        print_statement(&stmt)
    }

    #[test]
    fn test_scalar_projection() {
        let schema = movie_schema();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let variable = ctx.var("this");
        let field = GqlField::new("movies").select([GqlField::new("title")]);
        let projection =
            compile_projection(&mut ctx, &schema, movie, &variable, &field.selection).unwrap();
        assert!(projection.clauses.is_empty());
        let text = print_with_match(movie, &variable, projection);
        assert!(text.ends_with("RETURN this0 { .title } AS this0"));
    }

    #[test]
    fn test_connection_collects_edges_and_total_count() {
        let schema = movie_schema();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let variable = ctx.var("this");
        let field = GqlField::new("movies").select([
            GqlField::new("title"),
            GqlField::new("actorsConnection").select([
                GqlField::new("edges")
                    .select([GqlField::new("node").select([GqlField::new("name")])]),
                GqlField::new("totalCount"),
            ]),
        ]);
        let projection =
            compile_projection(&mut ctx, &schema, movie, &variable, &field.selection).unwrap();
        let text = print_with_match(movie, &variable, projection);
        assert!(text.contains("MATCH (this0)<-[rel1:ACTED_IN]-(this2:Actor)"));
        assert!(text.contains("WITH collect({ node: this2, relationship: rel1 }) AS edges4"));
        assert!(text.contains("WITH edges4, size(edges4) AS var5"));
        assert!(text.contains("UNWIND edges4 AS edge6"));
        assert!(text.contains("WITH edge6.node AS this2, edge6.relationship AS rel1"));
        assert!(text.contains("RETURN collect({ node: this2 { .name } }) AS var7"));
        assert!(text.contains("RETURN { edges: var7, totalCount: var5 } AS var3"));
        assert!(text.contains("actorsConnection: var3"));
    }

    #[test]
    fn test_singular_relationship_uses_head() {
        let schema = SchemaModel::from_definition(SchemaDefinition {
            types: vec![
                NodeType::new("Movie").with_relationship(RelationshipField {
                    name: "director".to_string(),
                    rel_type: "DIRECTED".to_string(),
                    direction: Direction::In,
                    target: RelationshipTarget::Node("Person".to_string()),
                    properties: None,
                    list: false,
                }),
                NodeType::new("Person").with_property(Property::new("name", PropertyKind::String)),
            ],
            ..Default::default()
        })
        .unwrap();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let variable = ctx.var("this");
        let field = GqlField::new("movies")
            .select([GqlField::new("director").select([GqlField::new("name")])]);
        let projection =
            compile_projection(&mut ctx, &schema, movie, &variable, &field.selection).unwrap();
        let text = print_with_match(movie, &variable, projection);
        assert!(text.contains("RETURN head(collect(this1 { .name })) AS var2"));
    }

    #[test]
    fn test_union_branches_tag_resolve_type() {
        let schema = SchemaModel::from_definition(SchemaDefinition {
            types: vec![
                NodeType::new("Account").with_relationship(RelationshipField {
                    name: "productions".to_string(),
                    rel_type: "PRODUCED".to_string(),
                    direction: Direction::Out,
                    target: RelationshipTarget::Union("Production".to_string()),
                    properties: None,
                    list: true,
                }),
                NodeType::new("Movie").with_property(Property::new("title", PropertyKind::String)),
                NodeType::new("Series")
                    .with_property(Property::new("episodes", PropertyKind::Int)),
            ],
            unions: vec![UnionType {
                name: "Production".to_string(),
                members: vec!["Movie".to_string(), "Series".to_string()],
            }],
            ..Default::default()
        })
        .unwrap();
        let account = schema.node("Account").unwrap();
        let mut ctx = TranslationContext::new();
        let variable = ctx.var("this");
        let field = GqlField::new("accounts").select([GqlField::new("productions")
            .fragment("Movie", vec![GqlField::new("title")])
            .fragment("Series", vec![GqlField::new("episodes")])]);
        let projection =
            compile_projection(&mut ctx, &schema, account, &variable, &field.selection).unwrap();
        let text = print_with_match(account, &variable, projection);
        assert!(text.contains("UNION ALL"));
        assert!(text.contains("__resolveType: 'Movie', .title"));
        assert!(text.contains("__resolveType: 'Series', .episodes"));
        // Fragment fields never leak across branches.
        assert!(!text.contains(".title, .episodes"));
    }

    #[test]
    fn test_computed_field_materializes_through_call() {
        let schema = SchemaModel::from_definition(SchemaDefinition {
            types: vec![NodeType::new("Movie").with_rule(Rule::CypherComputed {
                field: "actorCount".to_string(),
                statement: "RETURN size([(this)<-[:ACTED_IN]-(a) | a]) AS count".to_string(),
                column: "count".to_string(),
            })],
            ..Default::default()
        })
        .unwrap();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let variable = ctx.var("this");
        let field = GqlField::new("movies").select([GqlField::new("actorCount")]);
        let projection =
            compile_projection(&mut ctx, &schema, movie, &variable, &field.selection).unwrap();
        let text = print_with_match(movie, &variable, projection);
        assert!(text.contains("WITH this0 AS this"));
        assert!(text.contains("RETURN count AS this1"));
        assert!(text.contains("actorCount: this1"));
    }

    #[test]
    fn test_unknown_selection_rejected() {
        let schema = movie_schema();
        let movie = schema.node("Movie").unwrap();
        let mut ctx = TranslationContext::new();
        let variable = ctx.var("this");
        let field = GqlField::new("movies").select([GqlField::new("boxOffice")]);
        let err = compile_projection(&mut ctx, &schema, movie, &variable, &field.selection)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }
}
