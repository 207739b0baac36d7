//! Property test: the where compiler and the in-memory event filter agree.
//!
//! Random predicate trees are compiled twice, once to a Cypher predicate
//! and once to the subscription event filter, then both are evaluated
//! against a fixed dataset through a small interpreter for the compiled
//! expression tree. Rows carry every property, so two-valued and
//! three-valued logic coincide and the comparison is exact.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use trellis_core::cypher::{BinaryOperator, Expr, TranslationContext};
use trellis_core::schema::{NodeType, Property, PropertyKind, SchemaDefinition, SchemaModel};
use trellis_core::subscribe::EventFilter;
use trellis_core::translate::filter::{compile_where, EntityRef};

fn schema() -> SchemaModel {
    SchemaModel::from_definition(SchemaDefinition {
        types: vec![
            NodeType::new("Movie")
                .with_property(Property::new("title", PropertyKind::String))
                .with_property(Property::new("released", PropertyKind::Int))
                .with_property(Property::new("tags", PropertyKind::String).as_list()),
        ],
        ..Default::default()
    })
    .unwrap()
}

/// Fixed dataset; every row carries every property.
fn rows() -> Vec<Map<String, Value>> {
    [
        json!({"title": "Dune", "released": 2021, "tags": ["scifi", "epic"]}),
        json!({"title": "Alien", "released": 1979, "tags": ["scifi", "horror"]}),
        json!({"title": "Arrival", "released": 2016, "tags": ["scifi", "drama"]}),
        json!({"title": "Heat", "released": 1995, "tags": ["crime"]}),
        json!({"title": "Amelie", "released": 2001, "tags": []}),
    ]
    .into_iter()
    .map(|v| v.as_object().cloned().unwrap())
    .collect()
}

#[derive(Debug, Clone)]
enum FilterTree {
    Leaf(&'static str, Value),
    And(Vec<FilterTree>),
    Or(Vec<FilterTree>),
    Not(Box<FilterTree>),
}

impl FilterTree {
    fn to_where(&self) -> Value {
        match self {
            FilterTree::Leaf(key, value) => json!({ *key: value }),
            FilterTree::And(children) => {
                json!({"AND": children.iter().map(|c| c.to_where()).collect::<Vec<_>>()})
            }
            FilterTree::Or(children) => {
                json!({"OR": children.iter().map(|c| c.to_where()).collect::<Vec<_>>()})
            }
            FilterTree::Not(child) => json!({"NOT": child.to_where()}),
        }
    }
}

fn leaf_pool() -> Vec<(&'static str, Value)> {
    vec![
        ("title", json!("Dune")),
        ("title_NOT", json!("Alien")),
        ("title_IN", json!(["Dune", "Arrival"])),
        ("title_NOT_IN", json!(["Alien", "Heat"])),
        ("title_CONTAINS", json!("e")),
        ("title_NOT_CONTAINS", json!("li")),
        ("title_STARTS_WITH", json!("A")),
        ("title_NOT_STARTS_WITH", json!("D")),
        ("title_ENDS_WITH", json!("e")),
        ("title_NOT_ENDS_WITH", json!("n")),
        ("released", json!(2021)),
        ("released_NOT", json!(1979)),
        ("released_GT", json!(2000)),
        ("released_GTE", json!(1995)),
        ("released_LT", json!(2016)),
        ("released_LTE", json!(1979)),
        ("released_IN", json!([1979, 2021])),
        ("released_NOT_IN", json!([1995, 2001])),
        ("tags_INCLUDES", json!("scifi")),
        ("tags_NOT_INCLUDES", json!("drama")),
        ("tags", json!(["scifi", "epic"])),
    ]
}

fn tree_strategy() -> impl Strategy<Value = FilterTree> {
    let leaf = proptest::sample::select(leaf_pool())
        .prop_map(|(key, value)| FilterTree::Leaf(key, value));
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(FilterTree::And),
            prop::collection::vec(inner.clone(), 1..3).prop_map(FilterTree::Or),
            inner.prop_map(|child| FilterTree::Not(Box::new(child))),
        ]
    })
}

/// Interpret a compiled predicate against one row. Supports the expression
/// shapes the scalar where compiler emits; absent operands fail the
/// comparison, matching the event filter's null convention on this
/// null-free dataset.
fn eval(expr: &Expr, row: &Map<String, Value>, params: &HashMap<String, Value>) -> bool {
    match expr {
        Expr::And(parts) => parts.iter().all(|p| eval(p, row, params)),
        Expr::Or(parts) => parts.iter().any(|p| eval(p, row, params)),
        Expr::Not(inner) => !eval(inner, row, params),
        Expr::IsNull(inner) => resolve(inner, row, params).is_none(),
        Expr::IsNotNull(inner) => resolve(inner, row, params).is_some(),
        Expr::BinaryOp { lhs, op, rhs } => {
            let (Some(lhs), Some(rhs)) = (resolve(lhs, row, params), resolve(rhs, row, params))
            else {
                return false;
            };
            match op {
                BinaryOperator::Eq => values_equal(&lhs, &rhs),
                BinaryOperator::Neq => !values_equal(&lhs, &rhs),
                BinaryOperator::Gt => compare(&lhs, &rhs).is_some_and(|o| o.is_gt()),
                BinaryOperator::Gte => compare(&lhs, &rhs).is_some_and(|o| o.is_ge()),
                BinaryOperator::Lt => compare(&lhs, &rhs).is_some_and(|o| o.is_lt()),
                BinaryOperator::Lte => compare(&lhs, &rhs).is_some_and(|o| o.is_le()),
                BinaryOperator::In => rhs
                    .as_array()
                    .is_some_and(|list| list.iter().any(|v| values_equal(&lhs, v))),
                BinaryOperator::Contains => {
                    string_pair(&lhs, &rhs).is_some_and(|(a, b)| a.contains(b))
                }
                BinaryOperator::StartsWith => {
                    string_pair(&lhs, &rhs).is_some_and(|(a, b)| a.starts_with(b))
                }
                BinaryOperator::EndsWith => {
                    string_pair(&lhs, &rhs).is_some_and(|(a, b)| a.ends_with(b))
                }
                other => panic!("unexpected operator in scalar predicate: {other:?}"),
            }
        }
        other => panic!("unexpected expression in scalar predicate: {other:?}"),
    }
}

fn resolve(expr: &Expr, row: &Map<String, Value>, params: &HashMap<String, Value>) -> Option<Value> {
    match expr {
        Expr::Property { base, key } => match base.as_ref() {
            Expr::Variable(name) if name == "this" => {
                row.get(key).filter(|v| !v.is_null()).cloned()
            }
            other => panic!("unexpected property base: {other:?}"),
        },
        Expr::Param(name) => params.get(name).filter(|v| !v.is_null()).cloned(),
        Expr::List(items) => Some(Value::Array(
            items
                .iter()
                .map(|i| resolve(i, row, params).unwrap_or(Value::Null))
                .collect(),
        )),
        other => panic!("unexpected operand: {other:?}"),
    }
}

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

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_compiled_filter_agrees_with_event_filter(tree in tree_strategy()) {
        let schema = schema();
        let node = schema.expect_node("Movie").unwrap();
        let where_ = tree.to_where();

        let reference = EventFilter::compile(node, &where_).unwrap();
        let mut ctx = TranslationContext::new();
        let compiled =
            compile_where(&mut ctx, &schema, EntityRef::Node(node), "this", &where_).unwrap();
        prop_assert!(compiled.clauses.is_empty());
        let params = ctx.into_params();

        for row in rows() {
            let expected = reference.matches_properties(&row);
            let actual = compiled
                .predicate
                .as_ref()
                .map(|p| eval(p, &row, &params))
                .unwrap_or(true);
            prop_assert_eq!(
                actual,
                expected,
                "filter {} disagreed on row {:?}",
                where_,
                row
            );
        }
    }

    #[test]
    fn test_compilation_is_pure(tree in tree_strategy()) {
        let schema = schema();
        let node = schema.expect_node("Movie").unwrap();
        let where_ = tree.to_where();

        let mut first_ctx = TranslationContext::new();
        let first =
            compile_where(&mut first_ctx, &schema, EntityRef::Node(node), "this", &where_)
                .unwrap();
        let mut second_ctx = TranslationContext::new();
        let second =
            compile_where(&mut second_ctx, &schema, EntityRef::Node(node), "this", &where_)
                .unwrap();

        prop_assert_eq!(first.predicate, second.predicate);
        prop_assert_eq!(first_ctx.into_params(), second_ctx.into_params());
    }
}
