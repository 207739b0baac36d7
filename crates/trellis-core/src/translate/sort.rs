//! Sort/Pagination compiler - `sort`, `limit`/`first`, `offset`/`after`.
//!
//! Sort criteria apply left-to-right and may reference stored properties,
//! edge properties (connections), or cypher-computed fields. Computed sort
//! keys must be materialized into a bound variable before ORDER BY/LIMIT,
//! so limiting always happens after correct ordering; the translator uses
//! [`ResolvedSortKey::kind`] to decide. Cursors are opaque base64 of
//! `offset:N`.

use crate::cypher::{Expr, OrderItem, TranslationContext};
use crate::schema::NodeType;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Where a sort key's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKeyKind {
    /// Stored property on the node.
    Property,
    /// Edge property (connection sorts only).
    EdgeProperty,
    /// Cypher-computed field; must be materialized before ordering.
    Computed {
        /// The rule's Cypher fragment.
        statement: String,
        /// Column the fragment returns.
        column: String,
    },
}

/// One resolved sort criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSortKey {
    /// Field name.
    pub field: String,
    /// DESC when true.
    pub descending: bool,
    /// Value source.
    pub kind: SortKeyKind,
}

/// Whether any criterion needs materialization before ordering.
pub fn has_computed(keys: &[ResolvedSortKey]) -> bool {
    keys.iter()
        .any(|k| matches!(k.kind, SortKeyKind::Computed { .. }))
}

/// Parse and resolve a plain `sort` argument: a list of `{field: ASC|DESC}`
/// objects, criteria in document order.
pub fn resolve_sort(node: &NodeType, value: &serde_json::Value) -> Result<Vec<ResolvedSortKey>> {
    let items = match value {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
        serde_json::Value::Object(_) => vec![value],
        other => {
            return Err(Error::translation(format!(
                "sort expects a list of objects, got {other}"
            )))
        }
    };
    let mut keys = Vec::new();
    for item in items {
        let object = item
            .as_object()
            .ok_or_else(|| Error::translation("sort entries must be objects"))?;
        for (field, direction) in object {
            keys.push(ResolvedSortKey {
                field: field.clone(),
                descending: parse_direction(direction)?,
                kind: node_sort_kind(node, field)?,
            });
        }
    }
    Ok(keys)
}

/// Parse a connection `sort` argument: entries are `{node: {...}}` and/or
/// `{edge: {...}}` objects.
pub fn resolve_connection_sort(
    node: &NodeType,
    edge: Option<&crate::schema::RelationshipPropertiesType>,
    value: &serde_json::Value,
) -> Result<Vec<ResolvedSortKey>> {
    let items = match value {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
        serde_json::Value::Object(_) => vec![value],
        other => {
            return Err(Error::translation(format!(
                "sort expects a list of objects, got {other}"
            )))
        }
    };
    let mut keys = Vec::new();
    for item in items {
        let object = item
            .as_object()
            .ok_or_else(|| Error::translation("sort entries must be objects"))?;
        for (scope, fields) in object {
            let fields = fields
                .as_object()
                .ok_or_else(|| Error::translation("sort entries must be objects"))?;
            match scope.as_str() {
                "node" => {
                    for (field, direction) in fields {
                        keys.push(ResolvedSortKey {
                            field: field.clone(),
                            descending: parse_direction(direction)?,
                            kind: node_sort_kind(node, field)?,
                        });
                    }
                }
                "edge" => {
                    let edge = edge.ok_or_else(|| {
                        Error::translation("this connection has no edge properties to sort by")
                    })?;
                    for (field, direction) in fields {
                        if edge.property(field).is_none() {
                            return Err(Error::unknown_field(field, edge.name.clone()));
                        }
                        keys.push(ResolvedSortKey {
                            field: field.clone(),
                            descending: parse_direction(direction)?,
                            kind: SortKeyKind::EdgeProperty,
                        });
                    }
                }
                other => {
                    return Err(Error::translation(format!(
                        "connection sort expects `node` or `edge`, got `{other}`"
                    )))
                }
            }
        }
    }
    Ok(keys)
}

fn node_sort_kind(node: &NodeType, field: &str) -> Result<SortKeyKind> {
    if node.property(field).is_some() {
        return Ok(SortKeyKind::Property);
    }
    if let Some((statement, column)) = node.computed(field) {
        return Ok(SortKeyKind::Computed {
            statement: statement.to_string(),
            column: column.to_string(),
        });
    }
    Err(Error::unknown_field(field, node.name.clone()))
}

fn parse_direction(value: &serde_json::Value) -> Result<bool> {
    match value.as_str() {
        Some("ASC") => Ok(false),
        Some("DESC") => Ok(true),
        _ => Err(Error::translation(format!(
            "sort direction must be ASC or DESC, got {value}"
        ))),
    }
}

/// Build ORDER BY items given the variables each key reads from.
/// `computed_vars` maps computed field names to their materialized
/// variables; the translator populates it before calling.
pub fn order_items(
    keys: &[ResolvedSortKey],
    node_var: &str,
    edge_var: Option<&str>,
    computed_vars: &std::collections::HashMap<String, String>,
) -> Result<Vec<OrderItem>> {
    let mut items = Vec::new();
    for key in keys {
        let expr = match &key.kind {
            SortKeyKind::Property => Expr::prop(node_var, &key.field),
            SortKeyKind::EdgeProperty => {
                let edge_var = edge_var.ok_or_else(|| {
                    Error::internal("edge sort key without a bound relationship variable")
                })?;
                Expr::prop(edge_var, &key.field)
            }
            SortKeyKind::Computed { .. } => {
                let variable = computed_vars.get(&key.field).ok_or_else(|| {
                    Error::internal(format!(
                        "computed sort key `{}` was not materialized",
                        key.field
                    ))
                })?;
                Expr::var(variable.clone())
            }
        };
        items.push(OrderItem {
            expr,
            descending: key.descending,
        });
    }
    Ok(items)
}

/// Paging expressions parsed from arguments.
#[derive(Debug, Default)]
pub struct Paging {
    /// SKIP expression.
    pub skip: Option<Expr>,
    /// LIMIT expression.
    pub limit: Option<Expr>,
    /// The numeric offset (for pageInfo computation).
    pub offset: i64,
}

/// Parse `limit`/`offset` (plain reads) or `first`/`after` (connections).
pub fn parse_paging(
    ctx: &mut TranslationContext,
    arguments: &serde_json::Map<String, serde_json::Value>,
) -> Result<Paging> {
    let mut paging = Paging::default();
    if let Some(limit) = arguments.get("limit").or_else(|| arguments.get("first")) {
        if !limit.is_null() {
            let count = limit
                .as_i64()
                .filter(|n| *n >= 0)
                .ok_or_else(|| Error::translation("limit/first must be a non-negative integer"))?;
            paging.limit = Some(ctx.param(serde_json::json!(count)));
        }
    }
    let offset = match (arguments.get("offset"), arguments.get("after")) {
        (Some(offset), _) if !offset.is_null() => offset
            .as_i64()
            .filter(|n| *n >= 0)
            .ok_or_else(|| Error::translation("offset must be a non-negative integer"))?,
        (_, Some(after)) if !after.is_null() => {
            let cursor = after
                .as_str()
                .ok_or_else(|| Error::translation("after must be a cursor string"))?;
            // The cursor points at the last consumed edge.
            decode_cursor(cursor)? + 1
        }
        _ => 0,
    };
    if offset > 0 {
        paging.skip = Some(ctx.param(serde_json::json!(offset)));
        paging.offset = offset;
    }
    Ok(paging)
}

/// Encode an edge offset as an opaque cursor.
pub fn encode_cursor(offset: i64) -> String {
    BASE64.encode(format!("offset:{offset}"))
}

/// Decode an opaque cursor back to its offset.
pub fn decode_cursor(cursor: &str) -> Result<i64> {
    let bytes = BASE64
        .decode(cursor)
        .map_err(|_| Error::translation("malformed cursor"))?;
    let text =
        String::from_utf8(bytes).map_err(|_| Error::translation("malformed cursor"))?;
    text.strip_prefix("offset:")
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::translation("malformed cursor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeType, Property, PropertyKind, Rule};
    use serde_json::json;

    fn movie() -> NodeType {
        NodeType::new("Movie")
            .with_property(Property::new("title", PropertyKind::String))
            .with_property(Property::new("released", PropertyKind::Int))
            .with_rule(Rule::CypherComputed {
                field: "similarityScore".to_string(),
                statement: "RETURN size([(this)<-[:ACTED_IN]-(a) | a]) AS score".to_string(),
                column: "score".to_string(),
            })
    }

    #[test]
    fn test_cursor_round_trip() {
        let cursor = encode_cursor(41);
        assert_eq!(decode_cursor(&cursor).unwrap(), 41);
        assert!(decode_cursor("not-base64!").is_err());
    }

    #[test]
    fn test_sort_criteria_keep_order() {
        let keys = resolve_sort(
            &movie(),
            &json!([{"released": "DESC"}, {"title": "ASC"}]),
        )
        .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].field, "released");
        assert!(keys[0].descending);
        assert_eq!(keys[1].field, "title");
        assert!(!keys[1].descending);
    }

    #[test]
    fn test_computed_sort_key_detected() {
        let keys = resolve_sort(&movie(), &json!([{"similarityScore": "DESC"}])).unwrap();
        assert!(has_computed(&keys));
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        let err = resolve_sort(&movie(), &json!([{"director": "ASC"}])).unwrap_err();
        assert!(matches!(err, crate::Error::UnknownField { .. }));
    }

    #[test]
    fn test_after_cursor_becomes_skip() {
        let mut ctx = TranslationContext::new();
        let mut args = serde_json::Map::new();
        args.insert("first".to_string(), json!(10));
        args.insert("after".to_string(), json!(encode_cursor(4)));
        let paging = parse_paging(&mut ctx, &args).unwrap();
        assert!(paging.limit.is_some());
        assert_eq!(paging.offset, 5);
        let params = ctx.into_params();
        assert_eq!(params["param0"], json!(10));
        assert_eq!(params["param1"], json!(5));
    }
}
