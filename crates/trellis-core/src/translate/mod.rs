//! Translation - coerced GraphQL operations to executable Cypher.
//!
//! [`Translator::translate`] resolves the root field against the schema's
//! derived bindings, threads a fresh [`TranslationContext`] through the
//! compilers, and prints one complete statement. The returned column name
//! identifies the single column whose decoded value is the response data;
//! write-only statements (deletes, mutations without a read-back selection)
//! carry no column and the caller reports driver counters instead.

pub mod auth;
pub mod filter;
pub mod mutation;
pub mod projection;
pub mod sort;

use crate::cypher::{
    print_statement, Clause, Expr, MapProjectionItem, NodePattern, Pattern, Projection, Statement,
    TranslationContext,
};
use crate::graphql::{Field, Operation, OperationKind};
use crate::schema::{
    camel_case, pluralize, AuthAction, AuthPhase, NodeType, RootKind, SchemaModel,
};
use crate::{Error, Result};
use sort::SortKeyKind;
use std::collections::HashMap;
use tracing::debug;
use trellis_protocol::CypherStatement;

/// Named value producers for `Populate` rules, resolved at translation
/// time. The produced value becomes a parameter, never query text.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Box<dyn Fn() -> serde_json::Value + Send + Sync>>,
}

impl CallbackRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        callback: impl Fn() -> serde_json::Value + Send + Sync + 'static,
    ) {
        self.callbacks.insert(name.into(), Box::new(callback));
    }

    /// Produce a value from the named callback.
    pub fn invoke(&self, name: &str) -> Result<serde_json::Value> {
        self.callbacks
            .get(name)
            .map(|callback| callback())
            .ok_or_else(|| Error::schema(format!("unknown populate callback `{name}`")))
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A translated operation: the statement to execute plus the response
/// column, when the operation reads data back.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedOperation {
    /// Printed statement and parameter map.
    pub statement: CypherStatement,
    /// Column holding the response data, absent for write-only statements.
    pub column: Option<String>,
}

/// Schema-bound translator shared across requests.
#[derive(Debug)]
pub struct Translator {
    schema: SchemaModel,
    callbacks: CallbackRegistry,
}

impl Translator {
    /// Translator without populate callbacks.
    pub fn new(schema: SchemaModel) -> Self {
        Self {
            schema,
            callbacks: CallbackRegistry::new(),
        }
    }

    /// Translator with a callback registry for `Populate` rules.
    pub fn with_callbacks(schema: SchemaModel, callbacks: CallbackRegistry) -> Self {
        Self { schema, callbacks }
    }

    /// The schema this translator serves.
    pub fn schema(&self) -> &SchemaModel {
        &self.schema
    }

    /// Translate one coerced operation. `claims` are the request's decoded
    /// JWT claims, `None` when unauthenticated.
    pub fn translate(
        &self,
        operation: &Operation,
        claims: Option<serde_json::Value>,
    ) -> Result<TranslatedOperation> {
        let field = &operation.field;
        debug!(root = %field.name, kind = ?operation.kind, "translating operation");
        let binding = self
            .schema
            .root(&field.name)
            .ok_or_else(|| Error::unknown_field(&field.name, kind_name(operation.kind)))?;
        let expected = match binding.kind {
            RootKind::Read | RootKind::ReadConnection => OperationKind::Query,
            RootKind::Create | RootKind::Update | RootKind::Delete => OperationKind::Mutation,
            _ => OperationKind::Subscription,
        };
        if operation.kind != expected {
            return Err(Error::translation(format!(
                "`{}` is a {} root, not a {} root",
                field.name,
                kind_name(expected),
                kind_name(operation.kind)
            )));
        }

        let mut ctx = TranslationContext::with_claims(claims);
        let (clauses, column) = match binding.kind {
            RootKind::Read => self.translate_read(&mut ctx, field, &binding.type_name)?,
            RootKind::ReadConnection => {
                self.translate_connection(&mut ctx, field, &binding.type_name)?
            }
            RootKind::Create => self.translate_create(&mut ctx, field, &binding.type_name)?,
            RootKind::Update => self.translate_update(&mut ctx, field, &binding.type_name)?,
            RootKind::Delete => self.translate_delete(&mut ctx, field, &binding.type_name)?,
            RootKind::SubscriptionCreated
            | RootKind::SubscriptionUpdated
            | RootKind::SubscriptionDeleted => {
                return Err(Error::translation(format!(
                    "`{}` is resolved against published events, not translated to Cypher",
                    field.name
                )))
            }
        };

        let statement = Statement { clauses };
        let cypher = print_statement(&statement);
        debug!(%cypher, "translated");
        Ok(TranslatedOperation {
            statement: CypherStatement::new(cypher, ctx.into_params()),
            column,
        })
    }

    fn translate_read(
        &self,
        ctx: &mut TranslationContext,
        field: &Field,
        type_name: &str,
    ) -> Result<(Vec<Clause>, Option<String>)> {
        let concrete = self.schema.concrete_for_root(type_name)?;
        if concrete.len() > 1 {
            return self.translate_polymorphic_read(ctx, field, type_name, &concrete);
        }
        let node = concrete[0];
        let variable = ctx.var("this");
        let null = serde_json::Value::Null;

        let compiled = filter::compile_where(
            ctx,
            &self.schema,
            filter::EntityRef::Node(node),
            &variable,
            field.argument("where").unwrap_or(&null),
        )?;
        let read_auth =
            auth::compile_auth(ctx, node, &variable, AuthAction::Read, AuthPhase::Before)?
                .combined();
        let mut parts = Vec::new();
        parts.extend(read_auth);
        parts.extend(compiled.predicate);

        let mut clauses = Vec::new();
        projection::push_filtered_match(
            &mut clauses,
            Pattern::node(NodePattern::with_labels(
                variable.clone(),
                node.labels().iter().map(|l| l.to_string()).collect(),
            )),
            compiled.clauses,
            parts,
            vec![variable.clone()],
        );

        // Computed sort keys materialize before any ordering or paging.
        let keys = sort::resolve_sort(node, field.argument("sort").unwrap_or(&null))?;
        let paging = sort::parse_paging(ctx, &field.arguments)?;
        let mut computed_vars = HashMap::new();
        let mut materialized = Vec::new();
        for key in &keys {
            if let SortKeyKind::Computed { statement, column } = &key.kind {
                if !computed_vars.contains_key(&key.field) {
                    let (clause, value_var) =
                        projection::computed_call(ctx, &variable, statement, column);
                    clauses.push(clause);
                    computed_vars.insert(key.field.clone(), value_var.clone());
                    materialized.push(value_var);
                }
            }
        }
        if !keys.is_empty() || paging.skip.is_some() || paging.limit.is_some() {
            let order_by = sort::order_items(&keys, &variable, None, &computed_vars)?;
            let mut carried = vec![variable.clone()];
            carried.extend(materialized);
            clauses.push(Clause::With(Projection {
                order_by,
                skip: paging.skip,
                limit: paging.limit,
                ..Projection::variables(carried)
            }));
        }

        let nested =
            projection::compile_projection(ctx, &self.schema, node, &variable, &field.selection)?;
        clauses.extend(nested.clauses);
        clauses.push(Clause::Return(Projection::aliased(
            nested.expr,
            variable.clone(),
        )));
        Ok((clauses, Some(variable)))
    }

    /// Interface/union root read: one branch per concrete type inside a
    /// `CALL { .. UNION ALL .. }`, each row tagged `__resolveType`. Filters
    /// are keyed by concrete type name; unspecified members pass.
    fn translate_polymorphic_read(
        &self,
        ctx: &mut TranslationContext,
        field: &Field,
        type_name: &str,
        targets: &[&NodeType],
    ) -> Result<(Vec<Clause>, Option<String>)> {
        if field
            .argument("sort")
            .is_some_and(|sort| !sort.is_null())
        {
            return Err(Error::translation(format!(
                "sorting `{}` across concrete types is not supported",
                field.name
            )));
        }
        let null = serde_json::Value::Null;
        let where_map = match field.argument("where").unwrap_or(&null) {
            serde_json::Value::Null => None,
            serde_json::Value::Object(map) => Some(map),
            other => {
                return Err(Error::translation(format!(
                    "expected a per-type filter object for `{}`, got {other}",
                    field.name
                )))
            }
        };
        if let Some(map) = where_map {
            for key in map.keys() {
                if !targets.iter().any(|t| &t.name == key) {
                    return Err(Error::unknown_field(key, type_name.to_string()));
                }
            }
        }

        let branch_var = ctx.var("this");
        let mut branches = Vec::new();
        for target in targets {
            let target_var = ctx.var("this");
            let sub_where = where_map
                .and_then(|m| m.get(&target.name))
                .unwrap_or(&null);
            let compiled = filter::compile_where(
                ctx,
                &self.schema,
                filter::EntityRef::Node(target),
                &target_var,
                sub_where,
            )?;
            let read_auth =
                auth::compile_auth(ctx, target, &target_var, AuthAction::Read, AuthPhase::Before)?
                    .combined();
            let mut parts = Vec::new();
            parts.extend(read_auth);
            parts.extend(compiled.predicate);

            let mut branch = Vec::new();
            projection::push_filtered_match(
                &mut branch,
                Pattern::node(NodePattern::with_labels(
                    target_var.clone(),
                    target.labels().iter().map(|l| l.to_string()).collect(),
                )),
                compiled.clauses,
                parts,
                vec![target_var.clone()],
            );

            let (clauses, mut items) = projection::projection_items(
                ctx,
                &self.schema,
                target,
                &target_var,
                &field.selection,
            )?;
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

        let mut clauses = vec![Clause::Call {
            imports: vec![],
            body: vec![Clause::Union {
                all: true,
                branches,
            }],
        }];
        let paging = sort::parse_paging(ctx, &field.arguments)?;
        if paging.skip.is_some() || paging.limit.is_some() {
            clauses.push(Clause::With(Projection {
                skip: paging.skip,
                limit: paging.limit,
                ..Projection::variables([branch_var.clone()])
            }));
        }
        clauses.push(Clause::Return(Projection::variables([branch_var.clone()])));
        Ok((clauses, Some(branch_var)))
    }

    /// Top-level connection read: collect all matched nodes first so
    /// `totalCount` reflects the unpaginated set, then sort/page/project the
    /// edges in an inner subquery.
    fn translate_connection(
        &self,
        ctx: &mut TranslationContext,
        field: &Field,
        type_name: &str,
    ) -> Result<(Vec<Clause>, Option<String>)> {
        let node = self.schema.expect_node(type_name)?;
        let connection_type = format!("{}Connection", pluralize(&node.name));
        let variable = ctx.var("this");
        let result_var = ctx.var("var");
        let null = serde_json::Value::Null;

        let compiled = filter::compile_where(
            ctx,
            &self.schema,
            filter::EntityRef::Node(node),
            &variable,
            field.argument("where").unwrap_or(&null),
        )?;
        let read_auth =
            auth::compile_auth(ctx, node, &variable, AuthAction::Read, AuthPhase::Before)?
                .combined();
        let mut parts = Vec::new();
        parts.extend(read_auth);
        parts.extend(compiled.predicate);

        let mut clauses = Vec::new();
        projection::push_filtered_match(
            &mut clauses,
            Pattern::node(NodePattern::with_labels(
                variable.clone(),
                node.labels().iter().map(|l| l.to_string()).collect(),
            )),
            compiled.clauses,
            parts,
            vec![variable.clone()],
        );

        let keys = sort::resolve_sort(node, field.argument("sort").unwrap_or(&null))?;
        let paging = sort::parse_paging(ctx, &field.arguments)?;
        let skip_expr = paging.skip.clone();
        let limit_expr = paging.limit.clone();
        let mut computed_vars = HashMap::new();
        let mut materialized = Vec::new();
        for key in &keys {
            if let SortKeyKind::Computed { statement, column } = &key.kind {
                if !computed_vars.contains_key(&key.field) {
                    let (clause, value_var) =
                        projection::computed_call(ctx, &variable, statement, column);
                    clauses.push(clause);
                    computed_vars.insert(key.field.clone(), value_var.clone());
                    materialized.push(value_var);
                }
            }
        }

        let edges_var = ctx.var("edges");
        let total_var = ctx.var("var");
        let mut edge_entries = vec![("node".to_string(), Expr::var(variable.clone()))];
        for value_var in &materialized {
            edge_entries.push((value_var.clone(), Expr::var(value_var.clone())));
        }
        clauses.push(Clause::With(Projection::aliased(
            Expr::func("collect", vec![Expr::Map(edge_entries)]),
            edges_var.clone(),
        )));
        clauses.push(Clause::With(
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
                    "cursor" | "node" | "__typename" => {}
                    other => {
                        return Err(Error::unknown_field(
                            other,
                            format!("{}Edge", pluralize(&node.name)),
                        ))
                    }
                }
            }
        }
        let wants_cursor = edges_field.is_some_and(|f| f.selection.field("cursor").is_some());
        let wants_bound_cursors = page_info_field.is_some_and(|f| {
            f.selection.field("startCursor").is_some() || f.selection.field("endCursor").is_some()
        });
        let need_cursor = wants_cursor || wants_bound_cursors;

        let edges_out = if edges_field.is_some() || wants_bound_cursors {
            let edge_alias = ctx.var("edge");
            let edges_out = ctx.var("var");
            let mut inner = vec![Clause::Unwind {
                list: Expr::var(edges_var.clone()),
                alias: edge_alias.clone(),
            }];

            let mut rename = Projection::default().item(
                Expr::Property {
                    base: Box::new(Expr::var(edge_alias.clone())),
                    key: "node".to_string(),
                },
                Some(variable.clone()),
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
            rename.order_by = sort::order_items(&keys, &variable, None, &computed_vars)?;
            rename.skip = paging.skip;
            rename.limit = paging.limit;
            inner.push(Clause::With(rename));

            let mut content: Vec<(String, Expr)> = Vec::new();
            if let Some(node_field) = edges_field.and_then(|f| f.selection.field("node")) {
                let nested = projection::compile_projection(
                    ctx,
                    &self.schema,
                    node,
                    &variable,
                    &node_field.selection,
                )?;
                inner.extend(nested.clauses);
                content.push((node_field.response_key().to_string(), nested.expr));
            }

            if need_cursor {
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
                                crate::cypher::BinaryOperator::Subtract,
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
                let cursor = projection::cursor_expression(&index_var, skip_expr.as_ref());
                let mut final_entries: Vec<(String, Expr)> = Vec::new();
                let mut has_cursor = false;
                if let Some(edges_field) = edges_field {
                    for sub in edges_field.selection.fields() {
                        match sub.name.as_str() {
                            "cursor" => {
                                has_cursor = true;
                                final_entries
                                    .push((sub.response_key().to_string(), cursor.clone()));
                            }
                            "node" => final_entries.push((
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
            clauses.push(Clause::Call {
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
                    projection::page_info_expression(
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
        clauses.push(Clause::Return(Projection::aliased(
            Expr::Map(entries),
            result_var.clone(),
        )));
        Ok((clauses, Some(result_var)))
    }

    fn translate_create(
        &self,
        ctx: &mut TranslationContext,
        field: &Field,
        type_name: &str,
    ) -> Result<(Vec<Clause>, Option<String>)> {
        let node = self.schema.expect_node(type_name)?;
        let null = serde_json::Value::Null;
        let input = field.argument("input").unwrap_or(&null);
        let inputs = match input {
            serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
            serde_json::Value::Null => {
                return Err(Error::translation(format!(
                    "`{}` requires an `input` argument",
                    field.name
                )))
            }
            one => vec![one],
        };

        let mut clauses = Vec::new();
        let mut created_vars: Vec<String> = Vec::new();
        for value in inputs {
            let parsed = mutation::parse_create_input(&self.schema, node, value)?;
            let (create_clauses, variable) = mutation::create::compile_create(
                ctx,
                &self.schema,
                &self.callbacks,
                node,
                &parsed,
                &created_vars,
            )?;
            clauses.extend(create_clauses);
            created_vars.push(variable);
        }

        self.mutation_read_back(ctx, field, node, &created_vars, &mut clauses, false)
    }

    fn translate_update(
        &self,
        ctx: &mut TranslationContext,
        field: &Field,
        type_name: &str,
    ) -> Result<(Vec<Clause>, Option<String>)> {
        let node = self.schema.expect_node(type_name)?;
        let variable = ctx.var("this");
        let null = serde_json::Value::Null;

        let compiled = filter::compile_where(
            ctx,
            &self.schema,
            filter::EntityRef::Node(node),
            &variable,
            field.argument("where").unwrap_or(&null),
        )?;
        let before_auth =
            auth::compile_auth(ctx, node, &variable, AuthAction::Update, AuthPhase::Before)?;
        let mut parts = Vec::new();
        if let Some(validate) = before_auth.validate {
            parts.push(validate);
        }
        parts.extend(before_auth.filter);
        parts.extend(compiled.predicate);

        let mut clauses = Vec::new();
        projection::push_filtered_match(
            &mut clauses,
            Pattern::node(NodePattern::with_labels(
                variable.clone(),
                node.labels().iter().map(|l| l.to_string()).collect(),
            )),
            compiled.clauses,
            parts,
            vec![variable.clone()],
        );

        let input =
            mutation::parse_update_input(&self.schema, node, field.argument("update").unwrap_or(&null))?;
        clauses.extend(mutation::update::apply_update(
            ctx,
            &self.schema,
            &self.callbacks,
            node,
            &variable,
            &input,
        )?);

        let after_auth =
            auth::compile_auth(ctx, node, &variable, AuthAction::Update, AuthPhase::After)?;
        if let Some(guard) = after_auth.combined() {
            clauses.push(Clause::With(
                Projection::variables([variable.clone()]).filtered(Some(guard)),
            ));
        }

        self.mutation_read_back(ctx, field, node, &[variable], &mut clauses, true)
    }

    fn translate_delete(
        &self,
        ctx: &mut TranslationContext,
        field: &Field,
        type_name: &str,
    ) -> Result<(Vec<Clause>, Option<String>)> {
        let node = self.schema.expect_node(type_name)?;
        let null = serde_json::Value::Null;
        let clauses = mutation::delete::compile_delete_root(
            ctx,
            &self.schema,
            node,
            field.argument("where").unwrap_or(&null),
            field.argument("delete").unwrap_or(&null),
        )?;
        Ok((clauses, None))
    }

    /// Project the affected nodes back through the mutation payload's
    /// `<plural>` field. `collect` distinguishes matched-row updates (many
    /// rows, one collected list) from creates (one row, explicit list).
    fn mutation_read_back(
        &self,
        ctx: &mut TranslationContext,
        field: &Field,
        node: &NodeType,
        variables: &[String],
        clauses: &mut Vec<Clause>,
        collect: bool,
    ) -> Result<(Vec<Clause>, Option<String>)> {
        let plural = camel_case(&pluralize(&node.name));
        let data_field = field.selection.field(&plural);
        let Some(data_field) = data_field else {
            clauses.push(mutation::count_return(ctx));
            return Ok((std::mem::take(clauses), None));
        };

        let data_var = ctx.var("data");
        if collect {
            let variable = &variables[0];
            let nested = projection::compile_projection(
                ctx,
                &self.schema,
                node,
                variable,
                &data_field.selection,
            )?;
            clauses.extend(nested.clauses);
            clauses.push(Clause::Return(Projection::aliased(
                Expr::func("collect", vec![nested.expr]),
                data_var.clone(),
            )));
        } else {
            let mut projected = Vec::new();
            for variable in variables {
                let nested = projection::compile_projection(
                    ctx,
                    &self.schema,
                    node,
                    variable,
                    &data_field.selection,
                )?;
                clauses.extend(nested.clauses);
                projected.push(nested.expr);
            }
            clauses.push(Clause::Return(Projection::aliased(
                Expr::List(projected),
                data_var.clone(),
            )));
        }
        Ok((std::mem::take(clauses), Some(data_var)))
    }
}

fn kind_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Query => "Query",
        OperationKind::Mutation => "Mutation",
        OperationKind::Subscription => "Subscription",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        Direction, Property, PropertyKind, RelationshipField, RelationshipTarget,
        SchemaDefinition, UnionType,
    };
    use serde_json::json;

    fn movie_schema() -> SchemaModel {
        SchemaModel::from_definition(SchemaDefinition {
            types: vec![
                NodeType::new("Movie")
                    .with_property(Property::new("title", PropertyKind::String))
                    .with_property(Property::new("released", PropertyKind::Int))
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
            unions: vec![UnionType {
                name: "Production".to_string(),
                members: vec!["Movie".to_string(), "Actor".to_string()],
            }],
            ..Default::default()
        })
        .unwrap()
    }

    fn query(field: Field) -> Operation {
        Operation {
            kind: OperationKind::Query,
            field,
        }
    }

    fn mutation(field: Field) -> Operation {
        Operation {
            kind: OperationKind::Mutation,
            field,
        }
    }

    #[test]
    fn test_read_root_full_statement() {
        let translator = Translator::new(movie_schema());
        let op = query(
            Field::new("movies")
                .arg("where", json!({"title": "Inception"}))
                .select([Field::new("title")]),
        );
        let translated = translator.translate(&op, None).unwrap();
        assert_eq!(
            translated.statement.cypher,
            "MATCH (this0:Movie)\nWHERE this0.title = $param0\nRETURN this0 { .title } AS this0"
        );
        assert_eq!(translated.column.as_deref(), Some("this0"));
        assert!(translated.statement.params_consistent());
        assert_eq!(translated.statement.params["param0"], json!("Inception"));
    }

    #[test]
    fn test_read_sort_and_limit() {
        let translator = Translator::new(movie_schema());
        let op = query(
            Field::new("movies")
                .arg("sort", json!([{"released": "DESC"}]))
                .arg("limit", json!(5))
                .select([Field::new("title")]),
        );
        let translated = translator.translate(&op, None).unwrap();
        assert!(translated
            .statement
            .cypher
            .contains("WITH this0\nORDER BY this0.released DESC\nLIMIT $param0"));
    }

    #[test]
    fn test_connection_root_total_count_before_pagination() {
        let translator = Translator::new(movie_schema());
        let op = query(
            Field::new("moviesConnection").arg("first", json!(2)).select([
                Field::new("totalCount"),
                Field::new("edges").select([Field::new("node").select([Field::new("title")])]),
            ]),
        );
        let translated = translator.translate(&op, None).unwrap();
        let cypher = &translated.statement.cypher;
        let collect_at = cypher.find("WITH collect({ node: this0 }) AS edges2").unwrap();
        let limit_at = cypher.find("LIMIT $param0").unwrap();
        assert!(collect_at < limit_at);
        assert!(cypher.contains("size(edges2) AS var3"));
        assert!(translated.statement.params_consistent());
    }

    #[test]
    fn test_polymorphic_root_branches() {
        let translator = Translator::new(movie_schema());
        let op = query(
            Field::new("productions")
                .select([Field::new("__typename")])
                .fragment("Movie", vec![Field::new("title")])
                .fragment("Actor", vec![Field::new("name")]),
        );
        let translated = translator.translate(&op, None).unwrap();
        let cypher = &translated.statement.cypher;
        assert!(cypher.contains("UNION ALL"));
        assert!(cypher.contains("MATCH (this1:Movie)"));
        assert!(cypher.contains("MATCH (this2:Actor)"));
        assert!(cypher.contains("RETURN this0"));
    }

    #[test]
    fn test_create_with_read_back() {
        let translator = Translator::new(movie_schema());
        let op = mutation(
            Field::new("createMovies")
                .arg("input", json!([{"title": "Dune"}]))
                .select([Field::new("movies").select([Field::new("title")])]),
        );
        let translated = translator.translate(&op, None).unwrap();
        let cypher = &translated.statement.cypher;
        assert!(cypher.contains("CREATE (this0:Movie)"));
        assert!(cypher.contains("SET this0.title = $param0"));
        assert!(cypher.contains("RETURN [this0 { .title }] AS data1"));
        assert_eq!(translated.column.as_deref(), Some("data1"));
    }

    #[test]
    fn test_update_with_operator_suffix() {
        let translator = Translator::new(movie_schema());
        let op = mutation(
            Field::new("updateMovies")
                .arg("where", json!({"title": "Dune"}))
                .arg("update", json!({"released_INCREMENT": 1}))
                .select([Field::new("movies").select([Field::new("released")])]),
        );
        let translated = translator.translate(&op, None).unwrap();
        let cypher = &translated.statement.cypher;
        assert!(cypher.contains("SET this0.released = this0.released + $param1"));
        assert!(cypher.contains("RETURN collect(this0 { .released }) AS data1"));
    }

    #[test]
    fn test_delete_detaches() {
        let translator = Translator::new(movie_schema());
        let op = mutation(
            Field::new("deleteMovies").arg("where", json!({"title": "Dune"})),
        );
        let translated = translator.translate(&op, None).unwrap();
        assert!(translated.statement.cypher.contains("DETACH DELETE"));
        assert!(translated.column.is_none());
    }

    #[test]
    fn test_unknown_root_field() {
        let translator = Translator::new(movie_schema());
        let op = query(Field::new("books"));
        assert!(matches!(
            translator.translate(&op, None).unwrap_err(),
            Error::UnknownField { .. }
        ));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let translator = Translator::new(movie_schema());
        let op = query(Field::new("createMovies").arg("input", json!([{}])));
        assert!(matches!(
            translator.translate(&op, None).unwrap_err(),
            Error::Translation(_)
        ));
    }

    #[test]
    fn test_subscription_root_not_translated() {
        let translator = Translator::new(movie_schema());
        let op = Operation {
            kind: OperationKind::Subscription,
            field: Field::new("movieCreated"),
        };
        assert!(translator.translate(&op, None).is_err());
    }
}
