//! Subscription resolution and in-memory event filtering.
//!
//! Subscriptions are not translated to Cypher: writes publish [`GraphEvent`]s
//! after they commit, and each subscriber's `where` argument becomes an
//! in-memory predicate evaluated against the event's property snapshot.
//! Operator suffixes carry the same semantics as the where compiler, with
//! Cypher null behavior: any comparison against an absent property is false,
//! except the explicit null checks a bare key or `_NOT` with a `null` value
//! expresses.

use crate::graphql::{Operation, OperationKind};
use crate::schema::{NodeType, RootKind, SchemaModel};
use crate::translate::filter::{split_operator, ScalarOperator};
use crate::{Error, Result};
use serde_json::Value;
use trellis_protocol::{EventKind, GraphEvent};

/// A resolved subscription: which events it watches and which it keeps.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Schema type the subscription watches.
    pub type_name: String,
    /// Event kind the root field selects.
    pub event: EventKind,
    filter: EventFilter,
}

impl Subscription {
    /// Whether a published event belongs to this subscription's stream.
    pub fn matches(&self, event: &GraphEvent) -> bool {
        event.typename == self.type_name
            && event.event == self.event
            && self.filter.matches(snapshot(event))
    }
}

/// Resolve a subscription operation against the schema and compile its
/// `where` argument.
pub fn compile_subscription(schema: &SchemaModel, operation: &Operation) -> Result<Subscription> {
    let field = &operation.field;
    let binding = schema
        .root(&field.name)
        .ok_or_else(|| Error::unknown_field(&field.name, "Subscription"))?;
    let event = match binding.kind {
        RootKind::SubscriptionCreated => EventKind::Create,
        RootKind::SubscriptionUpdated => EventKind::Update,
        RootKind::SubscriptionDeleted => EventKind::Delete,
        _ => {
            return Err(Error::translation(format!(
                "`{}` is not a subscription root",
                field.name
            )))
        }
    };
    if operation.kind != OperationKind::Subscription {
        return Err(Error::translation(format!(
            "`{}` must be requested as a subscription",
            field.name
        )));
    }
    let node = schema.expect_node(&binding.type_name)?;
    let null = Value::Null;
    let filter = EventFilter::compile(node, field.argument("where").unwrap_or(&null))?;
    Ok(Subscription {
        type_name: binding.type_name.clone(),
        event,
        filter,
    })
}

/// The property snapshot a filter reads: the post-write state when one
/// exists, the pre-delete state otherwise.
fn snapshot(event: &GraphEvent) -> Option<&serde_json::Map<String, Value>> {
    event
        .properties
        .after
        .as_ref()
        .or(event.properties.before.as_ref())
}

/// A compiled, schema-checked predicate over event property maps.
///
/// Field names and operators are validated at compile time, so a subscriber
/// learns about a bad filter at registration rather than by silently
/// receiving nothing.
#[derive(Debug, Clone)]
pub struct EventFilter {
    predicate: Predicate,
}

#[derive(Debug, Clone)]
enum Predicate {
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Scalar {
        field: String,
        op: ScalarOperator,
        value: Value,
    },
}

impl EventFilter {
    /// Compile a `where` value against `node`'s property set.
    pub fn compile(node: &NodeType, where_: &Value) -> Result<Self> {
        Ok(Self {
            predicate: compile_value(node, where_)?,
        })
    }

    /// Evaluate against an event's property snapshot; an absent snapshot
    /// only satisfies the empty filter.
    pub fn matches(&self, properties: Option<&serde_json::Map<String, Value>>) -> bool {
        match properties {
            Some(map) => eval(&self.predicate, map),
            None => matches!(self.predicate, Predicate::True),
        }
    }

    /// Evaluate against a bare property map. Shared with tests that use
    /// this evaluator as the oracle for the where compiler.
    pub fn matches_properties(&self, properties: &serde_json::Map<String, Value>) -> bool {
        eval(&self.predicate, properties)
    }
}

fn compile_value(node: &NodeType, where_: &Value) -> Result<Predicate> {
    let object = match where_ {
        Value::Null => return Ok(Predicate::True),
        Value::Object(map) => map,
        other => {
            return Err(Error::translation(format!(
                "expected a filter object for `{}` events, got {other}",
                node.name
            )))
        }
    };
    let mut parts = Vec::new();
    for (key, value) in object {
        let part = match key.as_str() {
            "AND" => Predicate::And(compile_children(node, value)?),
            "OR" => Predicate::Or(compile_children(node, value)?),
            "NOT" => Predicate::Not(Box::new(compile_value(node, value)?)),
            _ => compile_field(node, key, value)?,
        };
        parts.push(part);
    }
    Ok(match parts.len() {
        0 => Predicate::True,
        1 => parts.pop().unwrap_or(Predicate::True),
        _ => Predicate::And(parts),
    })
}

fn compile_children(node: &NodeType, value: &Value) -> Result<Vec<Predicate>> {
    let children = match value {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        Value::Object(_) => vec![value],
        other => {
            return Err(Error::translation(format!(
                "boolean combinators expect objects, got {other}"
            )))
        }
    };
    children.iter().map(|c| compile_value(node, c)).collect()
}

fn compile_field(node: &NodeType, key: &str, value: &Value) -> Result<Predicate> {
    let (base, op) = match split_operator(key) {
        Some((base, op)) if node.property(base).is_some() => (base, op),
        _ if node.property(key).is_some() => (key, ScalarOperator::Eq),
        _ => {
            if node.relationship(key).is_some() || node.connection_relationship(key).is_some() {
                return Err(Error::translation(format!(
                    "relationship filters are not supported on `{}` subscriptions",
                    node.name
                )));
            }
            return Err(Error::unknown_field(key, node.name.clone()));
        }
    };
    if matches!(
        op,
        ScalarOperator::DistanceLt
            | ScalarOperator::DistanceLte
            | ScalarOperator::DistanceGt
            | ScalarOperator::DistanceGte
            | ScalarOperator::DistanceEq
    ) {
        return Err(Error::invalid_operator(key, node.name.clone()));
    }
    Ok(Predicate::Scalar {
        field: base.to_string(),
        op,
        value: value.clone(),
    })
}

fn eval(predicate: &Predicate, properties: &serde_json::Map<String, Value>) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::And(parts) => parts.iter().all(|p| eval(p, properties)),
        Predicate::Or(parts) => parts.iter().any(|p| eval(p, properties)),
        Predicate::Not(inner) => !eval(inner, properties),
        Predicate::Scalar { field, op, value } => {
            let actual = properties.get(field).filter(|v| !v.is_null());
            scalar_matches(*op, actual, value)
        }
    }
}

fn scalar_matches(op: ScalarOperator, actual: Option<&Value>, expected: &Value) -> bool {
    use ScalarOperator::*;
    // Null handling mirrors Cypher: comparing an absent property yields
    // null, which excludes the row; only the explicit null checks match.
    if expected.is_null() {
        return match op {
            Eq => actual.is_none(),
            Not => actual.is_some(),
            _ => false,
        };
    }
    let Some(actual) = actual else {
        return false;
    };
    match op {
        Eq => values_equal(actual, expected),
        Not => !values_equal(actual, expected),
        In => expected
            .as_array()
            .is_some_and(|list| list.iter().any(|v| values_equal(actual, v))),
        NotIn => expected
            .as_array()
            .is_some_and(|list| !list.iter().any(|v| values_equal(actual, v))),
        Contains => string_pair(actual, expected).is_some_and(|(a, e)| a.contains(e)),
        NotContains => string_pair(actual, expected).is_some_and(|(a, e)| !a.contains(e)),
        StartsWith => string_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(e)),
        NotStartsWith => string_pair(actual, expected).is_some_and(|(a, e)| !a.starts_with(e)),
        EndsWith => string_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(e)),
        NotEndsWith => string_pair(actual, expected).is_some_and(|(a, e)| !a.ends_with(e)),
        Gt => compare(actual, expected).is_some_and(|o| o.is_gt()),
        Gte => compare(actual, expected).is_some_and(|o| o.is_ge()),
        Lt => compare(actual, expected).is_some_and(|o| o.is_lt()),
        Lte => compare(actual, expected).is_some_and(|o| o.is_le()),
        Includes => actual
            .as_array()
            .is_some_and(|list| list.iter().any(|v| values_equal(v, expected))),
        NotIncludes => actual
            .as_array()
            .is_some_and(|list| !list.iter().any(|v| values_equal(v, expected))),
        DistanceLt | DistanceLte | DistanceGt | DistanceGte | DistanceEq => false,
    }
}

/// Equality with numeric coercion, so `1` and `1.0` compare equal the way
/// the database compares them.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

fn string_pair<'a>(a: &'a Value, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a.as_str()?, b.as_str()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::Field;
    use crate::schema::{Property, PropertyKind, SchemaDefinition};
    use serde_json::json;
    use trellis_protocol::EventProperties;

    fn schema() -> SchemaModel {
        SchemaModel::from_definition(SchemaDefinition {
            types: vec![NodeType::new("Movie")
                .with_property(Property::new("title", PropertyKind::String))
                .with_property(Property::new("released", PropertyKind::Int))
                .with_property(Property::new("tags", PropertyKind::String).as_list())],
            ..Default::default()
        })
        .unwrap()
    }

    fn subscription(root: &str, where_: Value) -> Subscription {
        let mut field = Field::new(root);
        if !where_.is_null() {
            field = field.arg("where", where_);
        }
        compile_subscription(
            &schema(),
            &Operation {
                kind: OperationKind::Subscription,
                field,
            },
        )
        .unwrap()
    }

    fn created(properties: Value) -> GraphEvent {
        GraphEvent {
            event: EventKind::Create,
            typename: "Movie".to_string(),
            properties: EventProperties {
                before: None,
                after: properties.as_object().cloned(),
            },
            id: json!(1),
            timestamp: 0,
        }
    }

    #[test]
    fn test_root_resolution() {
        let sub = subscription("movieCreated", Value::Null);
        assert_eq!(sub.type_name, "Movie");
        assert_eq!(sub.event, EventKind::Create);
        assert!(sub.matches(&created(json!({"title": "Dune"}))));
    }

    #[test]
    fn test_kind_and_typename_must_match() {
        let sub = subscription("movieUpdated", Value::Null);
        assert!(!sub.matches(&created(json!({"title": "Dune"}))));
        let sub = subscription("movieCreated", Value::Null);
        let mut event = created(json!({}));
        event.typename = "Actor".to_string();
        assert!(!sub.matches(&event));
    }

    #[test]
    fn test_operator_suffixes() {
        let sub = subscription(
            "movieCreated",
            json!({"title_STARTS_WITH": "Du", "released_GTE": 2000}),
        );
        assert!(sub.matches(&created(json!({"title": "Dune", "released": 2021}))));
        assert!(!sub.matches(&created(json!({"title": "Dune", "released": 1999}))));
        assert!(!sub.matches(&created(json!({"title": "Alien", "released": 2021}))));
    }

    #[test]
    fn test_absent_property_fails_comparisons() {
        let sub = subscription("movieCreated", json!({"released_GT": 2000}));
        assert!(!sub.matches(&created(json!({"title": "Dune"}))));
        let null_check = subscription("movieCreated", json!({"released": null}));
        assert!(null_check.matches(&created(json!({"title": "Dune"}))));
    }

    #[test]
    fn test_boolean_combinators() {
        let sub = subscription(
            "movieCreated",
            json!({"OR": [{"title": "Dune"}, {"title": "Alien"}], "NOT": {"released": 1979}}),
        );
        assert!(sub.matches(&created(json!({"title": "Alien", "released": 1986}))));
        assert!(!sub.matches(&created(json!({"title": "Alien", "released": 1979}))));
        assert!(!sub.matches(&created(json!({"title": "Blade Runner"}))));
    }

    #[test]
    fn test_list_includes() {
        let sub = subscription("movieCreated", json!({"tags_INCLUDES": "scifi"}));
        assert!(sub.matches(&created(json!({"tags": ["scifi", "epic"]}))));
        assert!(!sub.matches(&created(json!({"tags": ["drama"]}))));
        assert!(!sub.matches(&created(json!({}))));
    }

    #[test]
    fn test_delete_reads_before_snapshot() {
        let sub = subscription("movieDeleted", json!({"title": "Dune"}));
        let event = GraphEvent {
            event: EventKind::Delete,
            typename: "Movie".to_string(),
            properties: EventProperties {
                before: json!({"title": "Dune"}).as_object().cloned(),
                after: None,
            },
            id: json!(1),
            timestamp: 0,
        };
        assert!(sub.matches(&event));
    }

    #[test]
    fn test_bad_filters_rejected_at_compile() {
        let node = NodeType::new("Movie")
            .with_property(Property::new("title", PropertyKind::String));
        assert!(matches!(
            EventFilter::compile(&node, &json!({"director": "Villeneuve"})).unwrap_err(),
            Error::UnknownField { .. }
        ));
        assert!(matches!(
            EventFilter::compile(&node, &json!({"title_DISTANCE_LT": 1})).unwrap_err(),
            Error::InvalidOperator { .. }
        ));
    }

    #[test]
    fn test_numeric_coercion() {
        let sub = subscription("movieCreated", json!({"released": 2021}));
        assert!(sub.matches(&created(json!({"released": 2021.0}))));
    }
}
