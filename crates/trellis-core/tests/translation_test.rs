//! End-to-end translation scenarios
//!
//! Each test translates a full GraphQL operation against a small movie
//! schema and asserts on the printed statement: filter placement,
//! projection shape, clause ordering, and parameter consistency.

use serde_json::json;
use trellis_core::graphql::{Field, Operation, OperationKind};
use trellis_core::schema::{
    AuthAction, AuthKind, AuthPhase, AuthorizationRule, Direction, NodeType, Property,
    PropertyKind, RelationshipField, RelationshipTarget, Rule, SchemaDefinition, SchemaModel,
    UnionType, WriteMoment,
};
use trellis_core::{CallbackRegistry, Translator};

fn schema() -> SchemaModel {
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
                })
                .with_rule(Rule::CypherComputed {
                    field: "actorCount".to_string(),
                    statement: "RETURN size([(this)<-[:ACTED_IN]-(a:Actor) | a]) AS count"
                        .to_string(),
                    column: "count".to_string(),
                }),
            NodeType::new("Actor").with_property(Property::new("name", PropertyKind::String)),
            NodeType::new("Secret")
                .with_property(Property::new("name", PropertyKind::String))
                .with_property(Property::new("ownerId", PropertyKind::String))
                .with_rule(Rule::Authorization(AuthorizationRule {
                    kind: AuthKind::Filter,
                    operations: vec![AuthAction::Read],
                    phase: AuthPhase::Before,
                    require_authentication: true,
                    where_: json!({"node": {"ownerId": "$jwt.sub"}}),
                }))
                .with_rule(Rule::Authorization(AuthorizationRule {
                    kind: AuthKind::Validate,
                    operations: vec![AuthAction::Create],
                    phase: AuthPhase::After,
                    require_authentication: true,
                    where_: json!({"node": {"ownerId": "$jwt.sub"}}),
                })),
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

/// Every variable a `CALL` subquery imports must already be bound in the
/// enclosing text. Walks the printed statement's import lines.
fn assert_imports_bound(cypher: &str) {
    let mut seen = String::new();
    let mut lines = cypher.lines().peekable();
    while let Some(line) = lines.next() {
        if line.trim_end().ends_with("CALL {") {
            if let Some(next) = lines.peek() {
                let trimmed = next.trim_start();
                if let Some(imports) = trimmed.strip_prefix("WITH ") {
                    for var in imports.split(", ") {
                        assert!(
                            seen.contains(var),
                            "CALL imports `{var}` before it is bound:\n{cypher}"
                        );
                    }
                }
            }
        }
        seen.push_str(line);
        seen.push('\n');
    }
}

#[test]
fn test_round_trip_movie_connection_query() {
    let translator = Translator::new(schema());
    let op = query(
        Field::new("movies")
            .arg("where", json!({"title": "Inception"}))
            .select([
                Field::new("title"),
                Field::new("actorsConnection").select([
                    Field::new("totalCount"),
                    Field::new("edges")
                        .select([Field::new("node").select([Field::new("name")])]),
                ]),
            ]),
    );
    let translated = translator.translate(&op, None).unwrap();
    let cypher = &translated.statement.cypher;

    assert!(cypher.contains("MATCH (this0:Movie)"));
    assert!(cypher.contains("WHERE this0.title = $param0"));
    assert_eq!(translated.statement.params["param0"], json!("Inception"));
    assert!(cypher.contains("ACTED_IN"));
    assert!(cypher.contains("totalCount"));
    assert!(cypher.contains("collect("));
    assert!(translated.statement.params_consistent());
    assert_imports_bound(cypher);
}

#[test]
fn test_read_auth_filters_create_auth_validates() {
    let translator = Translator::new(schema());
    let claims = Some(json!({"sub": "u1"}));

    let read = translator
        .translate(
            &query(Field::new("secrets").select([Field::new("name")])),
            claims.clone(),
        )
        .unwrap();
    assert!(!read.statement.cypher.contains("apoc.util.validatePredicate"));
    assert!(read.statement.cypher.contains("$jwt"));
    assert_eq!(read.statement.params["jwt"], json!({"sub": "u1"}));

    let create = translator
        .translate(
            &mutation(
                Field::new("createSecrets")
                    .arg("input", json!([{"name": "plans", "ownerId": "u1"}])),
            ),
            claims,
        )
        .unwrap();
    assert!(create.statement.cypher.contains("apoc.util.validatePredicate"));
    assert!(create.statement.cypher.contains("'Forbidden'"));
    assert!(create.statement.params_consistent());
}

#[test]
fn test_nested_operations_keep_declared_order() {
    let translator = Translator::new(schema());
    let op = mutation(
        Field::new("updateMovies")
            .arg("where", json!({"title": "Heat"}))
            .arg(
                "update",
                json!({"actors": {
                    "connect": [{"where": {"name": "Pacino"}}],
                    "disconnect": [{"where": {"name": "Kilmer"}}]
                }}),
            ),
    );
    let translated = translator.translate(&op, None).unwrap();
    let cypher = &translated.statement.cypher;

    let merge_at = cypher.find("MERGE").expect("connect must MERGE");
    let delete_at = cypher.find("DELETE").expect("disconnect must DELETE");
    assert!(merge_at < delete_at, "connect must precede disconnect:\n{cypher}");
    assert_imports_bound(cypher);
    assert!(translated.statement.params_consistent());
}

#[test]
fn test_union_branches_stay_separate() {
    let translator = Translator::new(schema());
    let op = query(
        Field::new("productions")
            .select([Field::new("__typename")])
            .fragment("Movie", vec![Field::new("title")])
            .fragment("Actor", vec![Field::new("name")]),
    );
    let translated = translator.translate(&op, None).unwrap();
    let cypher = &translated.statement.cypher;

    assert!(cypher.contains("UNION ALL"));
    assert!(cypher.contains("'Movie'"));
    assert!(cypher.contains("'Actor'"));
    let movie_start = cypher.find("MATCH (this1:Movie)").unwrap();
    let union_at = cypher.find("UNION ALL").unwrap();
    let movie_branch = &cypher[movie_start..union_at];
    assert!(movie_branch.contains(".title"));
    assert!(!movie_branch.contains(".name"), "fragment fields must not leak:\n{cypher}");
}

#[test]
fn test_computed_sort_key_materializes_before_limit() {
    let translator = Translator::new(schema());
    let op = query(
        Field::new("movies")
            .arg("sort", json!([{"actorCount": "DESC"}]))
            .arg("limit", json!(3))
            .select([Field::new("title")]),
    );
    let translated = translator.translate(&op, None).unwrap();
    let cypher = &translated.statement.cypher;

    let call_at = cypher.find("CALL {").expect("computed key needs a CALL");
    let order_at = cypher.find("ORDER BY").expect("sort needs ORDER BY");
    let limit_at = cypher.find("LIMIT").expect("limit arg needs LIMIT");
    assert!(call_at < order_at && order_at < limit_at, "{cypher}");
}

#[test]
fn test_translation_is_deterministic() {
    let translator = Translator::new(schema());
    let op = query(
        Field::new("movies")
            .arg("where", json!({"released_GTE": 2000, "title_CONTAINS": "e"}))
            .arg("sort", json!([{"released": "DESC"}]))
            .select([Field::new("title"), Field::new("released")]),
    );
    let first = translator.translate(&op, None).unwrap();
    let second = translator.translate(&op, None).unwrap();
    assert_eq!(first.statement.cypher, second.statement.cypher);
    assert_eq!(first.statement.params, second.statement.params);
    assert_eq!(first.column, second.column);
}

#[test]
fn test_generated_values_on_create() {
    let node = NodeType::new("Article")
        .with_property(Property::new("title", PropertyKind::String))
        .with_property(Property::new("id", PropertyKind::Id))
        .with_property(Property::new("slug", PropertyKind::String))
        .with_rule(Rule::Id {
            property: "id".to_string(),
        })
        .with_rule(Rule::Populate {
            property: "slug".to_string(),
            callback: "slug".to_string(),
            on: WriteMoment::Create,
        });
    let schema = SchemaModel::from_definition(SchemaDefinition {
        types: vec![node],
        ..Default::default()
    })
    .unwrap();
    let mut callbacks = CallbackRegistry::new();
    callbacks.register("slug", || json!("generated-slug"));
    let translator = Translator::with_callbacks(schema, callbacks);

    let op = mutation(Field::new("createArticles").arg("input", json!([{"title": "Hello"}])));
    let translated = translator.translate(&op, None).unwrap();
    assert!(translated.statement.cypher.contains("randomUUID()"));
    assert!(translated
        .statement
        .params
        .values()
        .any(|v| v == &json!("generated-slug")));
    assert!(translated.statement.params_consistent());
}

#[test]
fn test_delete_cascades_children_first() {
    let translator = Translator::new(schema());
    let op = mutation(
        Field::new("deleteMovies")
            .arg("where", json!({"title": "Heat"}))
            .arg("delete", json!({"actors": {"where": {"name": "Kilmer"}}})),
    );
    let translated = translator.translate(&op, None).unwrap();
    let cypher = &translated.statement.cypher;

    let actor_match = cypher.find("ACTED_IN").expect("nested delete must traverse");
    let root_delete = cypher.rfind("DETACH DELETE").unwrap();
    let child_delete = cypher.find("DETACH DELETE").unwrap();
    assert!(child_delete < root_delete, "child deletes must precede the root:\n{cypher}");
    assert!(actor_match < child_delete);
    assert!(cypher.trim_end().ends_with(&format!(
        "RETURN count(*) AS {}",
        last_update_var(cypher)
    )));
    assert_imports_bound(cypher);
}

fn last_update_var(cypher: &str) -> String {
    cypher
        .split_whitespace()
        .filter(|t| t.starts_with("update"))
        .next_back()
        .unwrap()
        .to_string()
}
