//! Declarative rules attached to schema entities at model-construction time.
//!
//! Each directive the type-definition language supports becomes one fixed
//! tagged variant here; compilers consume rules by pattern matching instead
//! of runtime directive lookups.

use serde::{Deserialize, Serialize};

/// Operation kinds an authorization rule can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthAction {
    /// Reading nodes or relationship fields.
    Read,
    /// Creating nodes.
    Create,
    /// Updating node properties.
    Update,
    /// Deleting nodes.
    Delete,
    /// Creating relationships (connect / nested create).
    CreateRelationship,
}

/// How an authorization rule reacts when its predicate is unmet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    /// Silently exclude non-matching rows.
    Filter,
    /// Abort the whole statement with "Forbidden".
    Validate,
}

/// When a validate-style rule is checked relative to the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthPhase {
    /// Checked against pre-write state.
    Before,
    /// Checked against post-write state (can see generated values).
    After,
}

/// One authorization rule.
///
/// `where` is a filter object over `{ "node": {...}, "jwt": {...} }`,
/// combinable with `AND`/`OR`/`NOT`. String values of the form `"$jwt.claim"`
/// compare against the request's decoded claims parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRule {
    /// Filter or validate behavior.
    pub kind: AuthKind,
    /// Operations the rule gates.
    pub operations: Vec<AuthAction>,
    /// Check phase; only meaningful for validate rules.
    #[serde(default = "AuthPhase::before")]
    pub phase: AuthPhase,
    /// Whether an authenticated request is required at all.
    #[serde(default = "default_true")]
    pub require_authentication: bool,
    /// Predicate object; empty means "authentication alone suffices".
    #[serde(default, rename = "where")]
    pub where_: serde_json::Value,
}

impl AuthPhase {
    fn before() -> Self {
        AuthPhase::Before
    }
}

fn default_true() -> bool {
    true
}

/// Mutation moments a populated/timestamp rule fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteMoment {
    /// Only when the entity is created.
    Create,
    /// Only when the entity is updated.
    Update,
    /// Both.
    CreateAndUpdate,
}

impl WriteMoment {
    /// Whether the moment covers creates.
    pub fn on_create(self) -> bool {
        matches!(self, WriteMoment::Create | WriteMoment::CreateAndUpdate)
    }

    /// Whether the moment covers updates.
    pub fn on_update(self) -> bool {
        matches!(self, WriteMoment::Update | WriteMoment::CreateAndUpdate)
    }
}

/// A declarative rule attached to a node type or relationship-properties
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Authorization gate for one or more operations.
    Authorization(AuthorizationRule),

    /// Static default applied on create when the property is absent.
    Default {
        /// Property the default applies to.
        property: String,
        /// Default value.
        value: serde_json::Value,
    },

    /// Property populated by a named callback at translation time.
    Populate {
        /// Property the callback fills.
        property: String,
        /// Callback name, resolved through the registry on the translator.
        callback: String,
        /// When the callback fires.
        on: WriteMoment,
    },

    /// Field computed by an inline Cypher fragment instead of a stored
    /// property. The fragment sees the current entity as `this` and must
    /// return `column`.
    CypherComputed {
        /// GraphQL field name.
        field: String,
        /// Cypher fragment ending in a RETURN of `column`.
        statement: String,
        /// Column name the fragment returns.
        column: String,
    },

    /// Property backed by a uniqueness constraint; connectOrCreate keys
    /// its MERGE on this.
    Unique {
        /// The unique property.
        property: String,
    },

    /// Autogenerated identifier (randomUUID() on create).
    Id {
        /// The identifier property.
        property: String,
    },

    /// Autogenerated timestamp (datetime() at write time).
    Timestamp {
        /// The timestamp property.
        property: String,
        /// Which writes stamp it.
        on: WriteMoment,
    },
}

impl Rule {
    /// The authorization rule, if this is one.
    pub fn as_authorization(&self) -> Option<&AuthorizationRule> {
        match self {
            Rule::Authorization(rule) => Some(rule),
            _ => None,
        }
    }

    /// The computed-field rule matching `field`, if this is one.
    pub fn as_computed(&self, name: &str) -> Option<(&str, &str)> {
        match self {
            Rule::CypherComputed {
                field,
                statement,
                column,
            } if field == name => Some((statement.as_str(), column.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_round_trips_through_json() {
        let rule = Rule::Authorization(AuthorizationRule {
            kind: AuthKind::Filter,
            operations: vec![AuthAction::Read],
            phase: AuthPhase::Before,
            require_authentication: true,
            where_: json!({"node": {"ownerId": "$jwt.sub"}}),
        });
        let text = serde_json::to_string(&rule).unwrap();
        let back: Rule = serde_json::from_str(&text).unwrap();
        match back {
            Rule::Authorization(r) => {
                assert_eq!(r.kind, AuthKind::Filter);
                assert_eq!(r.operations, vec![AuthAction::Read]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_write_moment_coverage() {
        assert!(WriteMoment::CreateAndUpdate.on_create());
        assert!(WriteMoment::CreateAndUpdate.on_update());
        assert!(!WriteMoment::Update.on_create());
    }
}
