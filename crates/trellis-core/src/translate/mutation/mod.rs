//! Mutation compilers - nested mutation inputs to ordered write clauses.
//!
//! Inputs parse into a recursive tree first ([`CreateNode`],
//! [`RelationshipOps`] and friends, one struct per operation kind with
//! children grouped per relationship field), then each compiler traverses
//! the tree emitting `CALL` subqueries. The explicit tree keeps variable
//! scoping and the fixed child order auditable: connect, connectOrCreate,
//! disconnect, create, delete, update.
//!
//! Every nested write runs inside a `CALL` importing its parent variable,
//! so zero-match parents simply produce zero write rows. Autogenerated
//! values (id, timestamps, defaults, callback-populated properties) are
//! resolved here and become parameters or engine function calls.

pub mod connect;
pub mod create;
pub mod delete;
pub mod update;

use super::CallbackRegistry;
use crate::cypher::{Clause, Expr, SetItem, TranslationContext};
use crate::schema::{NodeType, RelationshipField, RelationshipPropertiesType, Rule, SchemaModel};
use crate::{Error, Result};
use serde_json::Value;

/// A create input for one node: scalar properties plus nested operations
/// per relationship field. `edge` carries the relationship properties when
/// the node is created through a relationship.
#[derive(Debug, Clone)]
pub struct CreateNode {
    /// Target node type name.
    pub type_name: String,
    /// Scalar property assignments.
    pub properties: serde_json::Map<String, Value>,
    /// Nested operations, one entry per relationship field.
    pub relationships: Vec<RelationshipOps>,
    /// Edge property assignments (nested creates only).
    pub edge: Option<serde_json::Map<String, Value>>,
}

/// Operations grouped under one relationship field, compiled in the fixed
/// order the struct fields declare.
#[derive(Debug, Clone, Default)]
pub struct RelationshipOps {
    /// Relationship field name on the owner.
    pub field: String,
    /// Connect existing nodes.
    pub connect: Vec<ConnectInput>,
    /// Merge-by-unique-key connects.
    pub connect_or_create: Vec<ConnectOrCreateInput>,
    /// Remove relationships.
    pub disconnect: Vec<DisconnectInput>,
    /// Create and connect new nodes.
    pub create: Vec<CreateNode>,
    /// Delete related nodes.
    pub delete: Vec<DeleteInput>,
    /// Update related nodes.
    pub update: Vec<NestedUpdateInput>,
}

impl RelationshipOps {
    fn is_empty(&self) -> bool {
        self.connect.is_empty()
            && self.connect_or_create.is_empty()
            && self.disconnect.is_empty()
            && self.create.is_empty()
            && self.delete.is_empty()
            && self.update.is_empty()
    }
}

/// Connect an existing node matched by a filter.
#[derive(Debug, Clone)]
pub struct ConnectInput {
    /// Node filter for the connect candidates.
    pub where_: Value,
    /// Edge property assignments.
    pub edge: Option<serde_json::Map<String, Value>>,
}

/// Merge a node keyed on its unique property, applying `onCreate` values
/// only when the merge creates.
#[derive(Debug, Clone)]
pub struct ConnectOrCreateInput {
    /// Unique-key values; must contain exactly the target's unique property.
    pub where_node: serde_json::Map<String, Value>,
    /// Node properties applied on create.
    pub on_create_node: serde_json::Map<String, Value>,
    /// Edge properties applied when the relationship is created.
    pub on_create_edge: Option<serde_json::Map<String, Value>>,
}

/// Disconnect relationships matched by a filter; absent matches are a
/// no-op.
#[derive(Debug, Clone)]
pub struct DisconnectInput {
    /// Node filter for the far end; empty disconnects all.
    pub where_: Value,
}

/// Delete related nodes, cascading child-before-parent.
#[derive(Debug, Clone)]
pub struct DeleteInput {
    /// Node filter for the delete candidates.
    pub where_: Value,
    /// Nested deletes per relationship field of the target.
    pub nested: Vec<(String, Vec<DeleteInput>)>,
}

/// Update related nodes: a filter plus recursive node/edge update inputs.
#[derive(Debug, Clone)]
pub struct NestedUpdateInput {
    /// Node filter for the update candidates.
    pub where_: Value,
    /// Recursive update input for the target node.
    pub node: Value,
    /// Edge property updates.
    pub edge: serde_json::Map<String, Value>,
}

/// Normalize "one object or a list of objects" argument shapes.
fn items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(list) => list.iter().collect(),
        other => vec![other],
    }
}

/// Unwrap `{ node: {...} }` filter wrappers; bare filters pass through.
fn node_where(value: &Value) -> Value {
    match value.get("node") {
        Some(inner) => inner.clone(),
        None => value.clone(),
    }
}

fn expect_object<'a>(
    value: &'a Value,
    what: &str,
) -> Result<&'a serde_json::Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::translation(format!("expected an object for {what}, got {value}")))
}

/// Parse one create input object for `node`.
pub fn parse_create_input(
    schema: &SchemaModel,
    node: &NodeType,
    value: &Value,
) -> Result<CreateNode> {
    let object = expect_object(value, &format!("`create{}` input", node.name))?;
    let mut properties = serde_json::Map::new();
    let mut relationships = Vec::new();
    for (key, entry) in object {
        if node.property(key).is_some() {
            properties.insert(key.clone(), entry.clone());
            continue;
        }
        if let Some(rel) = node.relationship(key) {
            let ops = parse_relationship_ops(schema, rel, entry, true)?;
            if !ops.is_empty() {
                relationships.push(ops);
            }
            continue;
        }
        return Err(Error::unknown_field(key, node.name.clone()));
    }
    Ok(CreateNode {
        type_name: node.name.clone(),
        properties,
        relationships,
        edge: None,
    })
}

/// Parsed update input: raw scalar assignments (operator suffixes intact)
/// plus nested relationship operations.
#[derive(Debug, Clone, Default)]
pub struct UpdateInput {
    /// Scalar keys, including `_INCREMENT`-style operator suffixes.
    pub scalars: serde_json::Map<String, Value>,
    /// Nested operations per relationship field.
    pub relationships: Vec<RelationshipOps>,
}

/// Parse one update input object for `node`.
pub fn parse_update_input(
    schema: &SchemaModel,
    node: &NodeType,
    value: &Value,
) -> Result<UpdateInput> {
    let mut input = UpdateInput::default();
    if value.is_null() {
        return Ok(input);
    }
    let object = expect_object(value, &format!("`update{}` input", node.name))?;
    for (key, entry) in object {
        if node.property(key).is_some() || update::split_update_operator(node, key).is_some() {
            input.scalars.insert(key.clone(), entry.clone());
            continue;
        }
        if let Some(rel) = node.relationship(key) {
            for item in items(entry) {
                let ops = parse_relationship_ops(schema, rel, item, false)?;
                if !ops.is_empty() {
                    input.relationships.push(ops);
                }
            }
            continue;
        }
        return Err(Error::unknown_field(key, node.name.clone()));
    }
    Ok(input)
}

fn parse_relationship_ops(
    schema: &SchemaModel,
    rel: &RelationshipField,
    value: &Value,
    in_create: bool,
) -> Result<RelationshipOps> {
    let target = concrete_mutation_target(schema, rel)?;
    let object = expect_object(value, &format!("operations on `{}`", rel.name))?;
    let mut ops = RelationshipOps {
        field: rel.name.clone(),
        ..Default::default()
    };
    for (key, entry) in object {
        match key.as_str() {
            "connect" => {
                for item in items(entry) {
                    ops.connect.push(parse_connect_item(item)?);
                }
            }
            "connectOrCreate" => {
                for item in items(entry) {
                    ops.connect_or_create.push(parse_connect_or_create_item(item)?);
                }
            }
            "create" => {
                for item in items(entry) {
                    ops.create.push(parse_nested_create_item(schema, target, item)?);
                }
            }
            "disconnect" if !in_create => {
                for item in items(entry) {
                    let where_ = item.get("where").map(node_where).unwrap_or(Value::Null);
                    ops.disconnect.push(DisconnectInput { where_ });
                }
            }
            "delete" if !in_create => {
                for item in items(entry) {
                    ops.delete.push(parse_delete_item(schema, target, item)?);
                }
            }
            "update" if !in_create => {
                for item in items(entry) {
                    ops.update.push(parse_nested_update_item(item)?);
                }
            }
            other => {
                return Err(Error::translation(format!(
                    "operation `{other}` is not supported on `{}` here",
                    rel.name
                )))
            }
        }
    }
    Ok(ops)
}

fn parse_connect_item(value: &Value) -> Result<ConnectInput> {
    let object = expect_object(value, "a connect entry")?;
    Ok(ConnectInput {
        where_: object.get("where").map(node_where).unwrap_or(Value::Null),
        edge: object
            .get("edge")
            .map(|edge| expect_object(edge, "connect edge properties").map(|m| m.clone()))
            .transpose()?,
    })
}

fn parse_connect_or_create_item(value: &Value) -> Result<ConnectOrCreateInput> {
    let object = expect_object(value, "a connectOrCreate entry")?;
    let where_node = object
        .get("where")
        .map(node_where)
        .unwrap_or(Value::Null);
    let where_node = expect_object(&where_node, "connectOrCreate `where.node`")?.clone();
    let on_create = object.get("onCreate").cloned().unwrap_or(Value::Null);
    let on_create_node = match on_create.get("node") {
        Some(node) => expect_object(node, "connectOrCreate `onCreate.node`")?.clone(),
        None => serde_json::Map::new(),
    };
    let on_create_edge = on_create
        .get("edge")
        .map(|edge| expect_object(edge, "connectOrCreate `onCreate.edge`").map(|m| m.clone()))
        .transpose()?;
    Ok(ConnectOrCreateInput {
        where_node,
        on_create_node,
        on_create_edge,
    })
}

fn parse_nested_create_item(
    schema: &SchemaModel,
    target: &NodeType,
    value: &Value,
) -> Result<CreateNode> {
    // Entries are `{ node, edge }` when the relationship carries
    // properties, or a bare node input otherwise.
    let (node_value, edge) = match value.get("node") {
        Some(node_value) => (
            node_value,
            value
                .get("edge")
                .map(|edge| expect_object(edge, "create edge properties").map(|m| m.clone()))
                .transpose()?,
        ),
        None => (value, None),
    };
    let mut created = parse_create_input(schema, target, node_value)?;
    created.edge = edge;
    Ok(created)
}

fn parse_delete_item(
    schema: &SchemaModel,
    target: &NodeType,
    value: &Value,
) -> Result<DeleteInput> {
    let object = expect_object(value, "a delete entry")?;
    let where_ = object.get("where").map(node_where).unwrap_or(Value::Null);
    let mut nested = Vec::new();
    if let Some(children) = object.get("delete") {
        let children = expect_object(children, "nested delete operations")?;
        for (field, entries) in children {
            let rel = target
                .relationship(field)
                .ok_or_else(|| Error::unknown_field(field, target.name.clone()))?;
            let child_target = concrete_mutation_target(schema, rel)?;
            let mut child_items = Vec::new();
            for item in items(entries) {
                child_items.push(parse_delete_item(schema, child_target, item)?);
            }
            nested.push((field.clone(), child_items));
        }
    }
    Ok(DeleteInput { where_, nested })
}

fn parse_nested_update_item(value: &Value) -> Result<NestedUpdateInput> {
    let object = expect_object(value, "an update entry")?;
    let where_ = object.get("where").map(node_where).unwrap_or(Value::Null);
    let update = object.get("update").cloned().unwrap_or(Value::Null);
    let (node, edge) = match update.get("node") {
        Some(node) => (
            node.clone(),
            match update.get("edge") {
                Some(edge) => expect_object(edge, "update edge properties")?.clone(),
                None => serde_json::Map::new(),
            },
        ),
        None => (update.clone(), serde_json::Map::new()),
    };
    Ok(NestedUpdateInput { where_, node, edge })
}

/// Resolve the single concrete node type behind a relationship used in a
/// mutation. Nested mutations through unions and interfaces are out of
/// scope; reads stay polymorphic.
pub(crate) fn concrete_mutation_target<'a>(
    schema: &'a SchemaModel,
    rel: &RelationshipField,
) -> Result<&'a NodeType> {
    if rel.target.is_polymorphic() {
        return Err(Error::translation(format!(
            "nested mutations through `{}` require a concrete target type",
            rel.name
        )));
    }
    schema.expect_node(rel.target.name())
}

/// Compile the operations under one relationship field, in the fixed
/// child order.
pub(crate) fn compile_relationship_ops(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    callbacks: &CallbackRegistry,
    owner: &NodeType,
    owner_var: &str,
    ops: &RelationshipOps,
) -> Result<Vec<Clause>> {
    let rel = owner
        .relationship(&ops.field)
        .ok_or_else(|| Error::unknown_field(&ops.field, owner.name.clone()))?;
    let mut clauses = Vec::new();
    for item in &ops.connect {
        clauses.push(connect::compile_connect(
            ctx, schema, callbacks, owner_var, rel, item,
        )?);
    }
    for item in &ops.connect_or_create {
        clauses.push(connect::compile_connect_or_create(
            ctx, schema, callbacks, owner_var, rel, item,
        )?);
    }
    for item in &ops.disconnect {
        clauses.push(connect::compile_disconnect(ctx, schema, owner_var, rel, item)?);
    }
    for item in &ops.create {
        clauses.push(create::compile_nested_create(
            ctx, schema, callbacks, owner_var, rel, item,
        )?);
    }
    for item in &ops.delete {
        clauses.push(delete::compile_nested_delete(ctx, schema, owner_var, rel, item)?);
    }
    for item in &ops.update {
        clauses.push(update::compile_nested_update(
            ctx, schema, callbacks, owner_var, rel, item,
        )?);
    }
    Ok(clauses)
}

/// Compile a node filter for a nested mutation. Aggregation filters need
/// their own `CALL` subqueries, which cannot interleave with an OPTIONAL
/// MATCH candidate scan, so they are rejected here.
pub(crate) fn simple_filter(
    ctx: &mut TranslationContext,
    schema: &SchemaModel,
    target: &NodeType,
    variable: &str,
    where_: &Value,
) -> Result<Option<Expr>> {
    let compiled = super::filter::compile_where(
        ctx,
        schema,
        super::filter::EntityRef::Node(target),
        variable,
        where_,
    )?;
    if !compiled.clauses.is_empty() {
        return Err(Error::translation(
            "aggregation filters cannot be used inside nested mutations",
        ));
    }
    Ok(compiled.predicate)
}

/// Scalar `SET` items for plain property assignments.
pub(crate) fn scalar_set_items(
    ctx: &mut TranslationContext,
    node: &NodeType,
    variable: &str,
    properties: &serde_json::Map<String, Value>,
) -> Result<Vec<SetItem>> {
    let mut set_items = Vec::new();
    for (key, value) in properties {
        if node.property(key).is_none() {
            return Err(Error::unknown_field(key, node.name.clone()));
        }
        set_items.push(SetItem::Property {
            target: variable.to_string(),
            key: key.clone(),
            value: ctx.param(value.clone()),
        });
    }
    Ok(set_items)
}

/// `SET` items from the write rules of a node type for a create:
/// autogenerated ids, create timestamps, defaults for absent properties,
/// and callback-populated values.
pub(crate) fn create_rule_set_items(
    ctx: &mut TranslationContext,
    callbacks: &CallbackRegistry,
    rules: &[Rule],
    present: &serde_json::Map<String, Value>,
    variable: &str,
) -> Result<Vec<SetItem>> {
    let mut set_items = Vec::new();
    for rule in rules {
        match rule {
            Rule::Id { property } => set_items.push(SetItem::Property {
                target: variable.to_string(),
                key: property.clone(),
                value: Expr::func("randomUUID", vec![]),
            }),
            Rule::Timestamp { property, on } if on.on_create() => {
                set_items.push(SetItem::Property {
                    target: variable.to_string(),
                    key: property.clone(),
                    value: Expr::func("datetime", vec![]),
                });
            }
            Rule::Default { property, value } if !present.contains_key(property) => {
                set_items.push(SetItem::Property {
                    target: variable.to_string(),
                    key: property.clone(),
                    value: ctx.param(value.clone()),
                });
            }
            Rule::Populate { property, callback, on } if on.on_create() => {
                let value = callbacks.invoke(callback)?;
                set_items.push(SetItem::Property {
                    target: variable.to_string(),
                    key: property.clone(),
                    value: ctx.param(value),
                });
            }
            _ => {}
        }
    }
    Ok(set_items)
}

/// `SET` items from the write rules of a node type for an update: update
/// timestamps and callback-populated values.
pub(crate) fn update_rule_set_items(
    ctx: &mut TranslationContext,
    callbacks: &CallbackRegistry,
    rules: &[Rule],
    variable: &str,
) -> Result<Vec<SetItem>> {
    let mut set_items = Vec::new();
    for rule in rules {
        match rule {
            Rule::Timestamp { property, on } if on.on_update() => {
                set_items.push(SetItem::Property {
                    target: variable.to_string(),
                    key: property.clone(),
                    value: Expr::func("datetime", vec![]),
                });
            }
            Rule::Populate { property, callback, on } if on.on_update() => {
                let value = callbacks.invoke(callback)?;
                set_items.push(SetItem::Property {
                    target: variable.to_string(),
                    key: property.clone(),
                    value: ctx.param(value),
                });
            }
            _ => {}
        }
    }
    Ok(set_items)
}

/// `SET` items for edge properties, including the edge type's own create
/// rules (timestamps, defaults).
pub(crate) fn edge_set_items(
    ctx: &mut TranslationContext,
    callbacks: &CallbackRegistry,
    edge_type: Option<&RelationshipPropertiesType>,
    rel_var: &str,
    edge: Option<&serde_json::Map<String, Value>>,
) -> Result<Vec<SetItem>> {
    let mut set_items = Vec::new();
    if let Some(edge) = edge {
        let edge_type = edge_type.ok_or_else(|| {
            Error::translation("edge properties supplied for a relationship without an edge type")
        })?;
        for (key, value) in edge {
            if edge_type.property(key).is_none() {
                return Err(Error::unknown_field(key, edge_type.name.clone()));
            }
            set_items.push(SetItem::Property {
                target: rel_var.to_string(),
                key: key.clone(),
                value: ctx.param(value.clone()),
            });
        }
    }
    if let Some(edge_type) = edge_type {
        let present = edge.cloned().unwrap_or_default();
        set_items.extend(create_rule_set_items(
            ctx,
            callbacks,
            &edge_type.rules,
            &present,
            rel_var,
        )?);
    }
    Ok(set_items)
}

/// The edge-properties type a relationship stores, if any.
pub(crate) fn edge_properties_type<'a>(
    schema: &'a SchemaModel,
    rel: &RelationshipField,
) -> Option<&'a RelationshipPropertiesType> {
    rel.properties
        .as_deref()
        .and_then(|name| schema.relationship_properties(name))
}

/// Terminal `RETURN count(*)` every write subquery ends with.
pub(crate) fn count_return(ctx: &mut TranslationContext) -> Clause {
    Clause::Raw(format!("RETURN count(*) AS {}", ctx.var("update")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        Direction, Property, PropertyKind, RelationshipTarget, SchemaDefinition,
    };
    use serde_json::json;

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

    #[test]
    fn test_parse_create_with_nested_ops() {
        let schema = movie_schema();
        let movie = schema.node("Movie").unwrap();
        let input = json!({
            "title": "Inception",
            "actors": {
                "create": [{"node": {"name": "Leo"}}],
                "connect": [{"where": {"node": {"name": "Ken"}}}]
            }
        });
        let created = parse_create_input(&schema, movie, &input).unwrap();
        assert_eq!(created.properties["title"], json!("Inception"));
        assert_eq!(created.relationships.len(), 1);
        let ops = &created.relationships[0];
        assert_eq!(ops.create.len(), 1);
        assert_eq!(ops.create[0].properties["name"], json!("Leo"));
        assert_eq!(ops.connect.len(), 1);
        assert_eq!(ops.connect[0].where_, json!({"name": "Ken"}));
    }

    #[test]
    fn test_create_rejects_update_only_ops() {
        let schema = movie_schema();
        let movie = schema.node("Movie").unwrap();
        let input = json!({
            "actors": {"disconnect": [{"where": {"node": {"name": "Leo"}}}]}
        });
        let err = parse_create_input(&schema, movie, &input).unwrap_err();
        assert!(matches!(err, Error::Translation(_)));
    }

    #[test]
    fn test_parse_update_keeps_operator_suffixes() {
        let schema = SchemaModel::from_definition(SchemaDefinition {
            types: vec![NodeType::new("Counter")
                .with_property(Property::new("value", PropertyKind::Int))],
            ..Default::default()
        })
        .unwrap();
        let counter = schema.node("Counter").unwrap();
        let input = parse_update_input(&schema, counter, &json!({"value_INCREMENT": 2})).unwrap();
        assert!(input.scalars.contains_key("value_INCREMENT"));
    }

    #[test]
    fn test_unknown_mutation_field_rejected() {
        let schema = movie_schema();
        let movie = schema.node("Movie").unwrap();
        let err = parse_create_input(&schema, movie, &json!({"budget": 1})).unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }
}
