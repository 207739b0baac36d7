//! Coerced GraphQL operation model.
//!
//! The execution layer parses and validates documents; the translator only
//! sees the already-coerced shape: one root field with arguments (plain
//! `serde_json` values) and a selection set that may contain inline
//! fragments on concrete types.

use serde::{Deserialize, Serialize};

/// GraphQL operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read operation.
    Query,
    /// Write operation.
    Mutation,
    /// Event stream registration.
    Subscription,
}

/// A parsed, coerced GraphQL operation: one root field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Query, mutation, or subscription.
    pub kind: OperationKind,
    /// The root field.
    pub field: Field,
}

/// A selected field with its arguments and sub-selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Response alias, when different from the name.
    #[serde(default)]
    pub alias: Option<String>,
    /// Coerced argument values.
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
    /// Sub-selection; empty for leaf fields.
    #[serde(default)]
    pub selection: SelectionSet,
}

impl Field {
    /// Create a leaf field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an argument (builder style).
    pub fn arg(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Add sub-selected fields (builder style).
    pub fn select(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.selection
            .items
            .extend(fields.into_iter().map(Selection::Field));
        self
    }

    /// Add an inline fragment (builder style).
    pub fn fragment(mut self, type_condition: impl Into<String>, fields: Vec<Field>) -> Self {
        self.selection.items.push(Selection::InlineFragment {
            type_condition: type_condition.into(),
            selection: SelectionSet {
                items: fields.into_iter().map(Selection::Field).collect(),
            },
        });
        self
    }

    /// The key this field occupies in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// An argument value, if supplied.
    pub fn argument(&self, name: &str) -> Option<&serde_json::Value> {
        self.arguments.get(name)
    }
}

/// An ordered selection set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionSet {
    /// Selections in document order.
    pub items: Vec<Selection>,
}

/// One selection: a field or an inline fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Selection {
    /// A plain field selection.
    Field(Field),
    /// An inline fragment restricted to a concrete type.
    InlineFragment {
        /// Concrete type condition.
        type_condition: String,
        /// Fields selected within the fragment.
        selection: SelectionSet,
    },
}

impl SelectionSet {
    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Directly selected fields (fragments excluded).
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.items.iter().filter_map(|s| match s {
            Selection::Field(f) => Some(f),
            Selection::InlineFragment { .. } => None,
        })
    }

    /// Find a directly selected field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|f| f.name == name)
    }

    /// Fields that apply to a concrete type: direct fields plus the fields
    /// of inline fragments whose condition matches `type_name`. A field
    /// inside a fragment on another type never leaks into this branch.
    pub fn fields_for_type<'a>(&'a self, type_name: &str) -> Vec<&'a Field> {
        let mut out: Vec<&Field> = Vec::new();
        for item in &self.items {
            match item {
                Selection::Field(f) => out.push(f),
                Selection::InlineFragment {
                    type_condition,
                    selection,
                } if type_condition == type_name => {
                    out.extend(selection.fields());
                }
                Selection::InlineFragment { .. } => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_and_response_key() {
        let field = Field::new("movies")
            .arg("where", json!({"title": "Inception"}))
            .select([Field::new("title")]);
        assert_eq!(field.response_key(), "movies");
        assert!(field.argument("where").is_some());
        assert_eq!(field.selection.fields().count(), 1);
    }

    #[test]
    fn test_fields_for_type_respects_fragments() {
        let field = Field::new("search")
            .select([Field::new("__typename")])
            .fragment("Movie", vec![Field::new("title")])
            .fragment("Series", vec![Field::new("episodes")]);
        let movie_fields: Vec<_> = field
            .selection
            .fields_for_type("Movie")
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(movie_fields, vec!["__typename", "title"]);
    }
}
