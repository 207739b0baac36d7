//! Schema model - the read-only typed view of the user's type definitions.
//!
//! Built once at startup from a serde-deserializable [`SchemaDefinition`],
//! validated, and shared across requests. The model knows node labels,
//! relationship fields, property kinds, polymorphic targets, and the
//! declarative [`Rule`]s attached to each entity; it also derives the root
//! field names each type contributes to the GraphQL surface
//! (`movies`, `moviesConnection`, `createMovies`, ...).

pub mod rules;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use rules::{AuthAction, AuthKind, AuthPhase, AuthorizationRule, Rule, WriteMoment};

/// Relationship direction relative to the owning node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Edge points into the owning node.
    In,
    /// Edge points out of the owning node.
    Out,
}

/// Semantic kind of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// UTF-8 string.
    String,
    /// 64-bit integer.
    Int,
    /// Double-precision float.
    Float,
    /// Boolean.
    Boolean,
    /// Opaque identifier.
    Id,
    /// Enum value, stored as a string.
    Enum,
    /// Temporal instant (Cypher `datetime`).
    DateTime,
    /// Calendar date.
    Date,
    /// Duration.
    Duration,
    /// Spatial point.
    Point,
}

impl PropertyKind {
    /// Whether comparison operators like `_GT` apply.
    pub fn is_orderable(self) -> bool {
        !matches!(self, PropertyKind::Boolean | PropertyKind::Point)
    }

    /// Whether string operators (`_CONTAINS`, `_STARTS_WITH`, ...) apply.
    pub fn is_stringy(self) -> bool {
        matches!(
            self,
            PropertyKind::String | PropertyKind::Id | PropertyKind::Enum
        )
    }

    /// Whether numeric update operators (`_INCREMENT`, ...) apply.
    pub fn is_numeric(self) -> bool {
        matches!(self, PropertyKind::Int | PropertyKind::Float)
    }
}

/// A stored property on a node or relationship-properties type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    /// Property name (unique within its type).
    pub name: String,
    /// Semantic kind.
    pub kind: PropertyKind,
    /// Whether the value may be absent.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether the property is a list of its kind.
    #[serde(default)]
    pub list: bool,
}

impl Property {
    /// Shorthand constructor used by model builders and tests.
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            list: false,
        }
    }

    /// Mark the property as a list.
    pub fn as_list(mut self) -> Self {
        self.list = true;
        self
    }
}

fn default_true() -> bool {
    true
}

/// What a relationship field points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum RelationshipTarget {
    /// A single concrete node type.
    Node(String),
    /// A union of concrete node types.
    Union(String),
    /// An interface implemented by concrete node types.
    Interface(String),
}

impl RelationshipTarget {
    /// The referenced type name, whatever its kind.
    pub fn name(&self) -> &str {
        match self {
            RelationshipTarget::Node(n)
            | RelationshipTarget::Union(n)
            | RelationshipTarget::Interface(n) => n,
        }
    }

    /// Whether the target needs per-implementor branches.
    pub fn is_polymorphic(&self) -> bool {
        !matches!(self, RelationshipTarget::Node(_))
    }
}

/// A relationship field on a node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipField {
    /// GraphQL field name, e.g. `actors`.
    pub name: String,
    /// Relationship type string on the edge, e.g. `ACTED_IN`.
    pub rel_type: String,
    /// Direction relative to the owning type.
    pub direction: Direction,
    /// Target node type, union, or interface.
    pub target: RelationshipTarget,
    /// Name of the relationship-properties type stored on the edge, if any.
    #[serde(default)]
    pub properties: Option<String>,
    /// List (to-many) vs singular (to-one).
    #[serde(default = "default_true")]
    pub list: bool,
}

/// A schema entity mapped to a graph node label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeType {
    /// GraphQL type name.
    pub name: String,
    /// Primary label; defaults to the type name when empty.
    #[serde(default)]
    pub label: String,
    /// Additional labels applied on create and matched on read.
    #[serde(default)]
    pub additional_labels: Vec<String>,
    /// Stored properties.
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Relationship fields.
    #[serde(default)]
    pub relationships: Vec<RelationshipField>,
    /// Declarative rules.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Interfaces this type implements.
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl NodeType {
    /// Create an empty node type; label defaults to the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            ..Default::default()
        }
    }

    /// Add a property (builder style).
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Add a relationship field (builder style).
    pub fn with_relationship(mut self, field: RelationshipField) -> Self {
        self.relationships.push(field);
        self
    }

    /// Add a rule (builder style).
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The primary label, falling back to the type name.
    pub fn primary_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    /// All labels, primary first.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels = vec![self.primary_label()];
        labels.extend(self.additional_labels.iter().map(|l| l.as_str()));
        labels
    }

    /// Look up a stored property.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a relationship field.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipField> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Resolve `<field>Connection` selections back to their relationship.
    pub fn connection_relationship(&self, field: &str) -> Option<&RelationshipField> {
        let base = field.strip_suffix("Connection")?;
        self.relationship(base)
    }

    /// The cypher-computed rule backing a field, if any.
    pub fn computed(&self, field: &str) -> Option<(&str, &str)> {
        self.rules.iter().find_map(|r| r.as_computed(field))
    }

    /// Authorization rules applying to `action`.
    pub fn auth_rules(&self, action: AuthAction) -> impl Iterator<Item = &AuthorizationRule> {
        self.rules
            .iter()
            .filter_map(Rule::as_authorization)
            .filter(move |rule| rule.operations.contains(&action))
    }

    /// The first unique property, used as the connectOrCreate merge key.
    pub fn unique_property(&self) -> Option<&str> {
        self.rules.iter().find_map(|r| match r {
            Rule::Unique { property } => Some(property.as_str()),
            _ => None,
        })
    }
}

/// A schema entity mapped to properties stored on a graph edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipPropertiesType {
    /// Type name.
    pub name: String,
    /// Edge properties.
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Declarative rules (timestamps, defaults).
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RelationshipPropertiesType {
    /// Look up an edge property.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// An interface over two or more concrete node types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceType {
    /// Interface name.
    pub name: String,
    /// Properties declared on the interface itself.
    #[serde(default)]
    pub properties: Vec<Property>,
}

/// A union of concrete node types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnionType {
    /// Union name.
    pub name: String,
    /// Member type names, in declaration order.
    pub members: Vec<String>,
}

/// Serde-facing schema definition; validated into a [`SchemaModel`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Node types.
    #[serde(default)]
    pub types: Vec<NodeType>,
    /// Interfaces.
    #[serde(default)]
    pub interfaces: Vec<InterfaceType>,
    /// Unions.
    #[serde(default)]
    pub unions: Vec<UnionType>,
    /// Relationship-properties types.
    #[serde(default)]
    pub relationship_properties: Vec<RelationshipPropertiesType>,
}

/// What a root field does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// Plain list read.
    Read,
    /// Connection-style paginated read.
    ReadConnection,
    /// Create mutation.
    Create,
    /// Update mutation.
    Update,
    /// Delete mutation.
    Delete,
    /// `<type>Created` subscription.
    SubscriptionCreated,
    /// `<type>Updated` subscription.
    SubscriptionUpdated,
    /// `<type>Deleted` subscription.
    SubscriptionDeleted,
}

/// Binding from a root field name to a schema type and operation kind.
#[derive(Debug, Clone)]
pub struct RootBinding {
    /// Target type name (node, interface, or union).
    pub type_name: String,
    /// Operation kind.
    pub kind: RootKind,
}

/// The validated, immutable schema model shared across requests.
#[derive(Debug, Clone, Default)]
pub struct SchemaModel {
    nodes: Vec<NodeType>,
    interfaces: Vec<InterfaceType>,
    unions: Vec<UnionType>,
    relationship_properties: Vec<RelationshipPropertiesType>,
    roots: HashMap<String, RootBinding>,
}

impl SchemaModel {
    /// Validate a definition and derive root bindings.
    pub fn from_definition(def: SchemaDefinition) -> Result<Self> {
        let mut model = SchemaModel {
            nodes: def.types,
            interfaces: def.interfaces,
            unions: def.unions,
            relationship_properties: def.relationship_properties,
            roots: HashMap::new(),
        };
        model.validate()?;
        model.derive_roots();
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            let mut seen = std::collections::HashSet::new();
            for prop in &node.properties {
                if !seen.insert(prop.name.as_str()) {
                    return Err(Error::schema(format!(
                        "duplicate property `{}` on type `{}`",
                        prop.name, node.name
                    )));
                }
            }
            for rel in &node.relationships {
                if rel.rel_type.is_empty() {
                    return Err(Error::schema(format!(
                        "relationship `{}` on `{}` has no relationship type",
                        rel.name, node.name
                    )));
                }
                self.check_target(&rel.target, &node.name, &rel.name)?;
                if let Some(props) = &rel.properties {
                    if self.relationship_properties(props).is_none() {
                        return Err(Error::schema(format!(
                            "relationship `{}` on `{}` references unknown properties type `{}`",
                            rel.name, node.name, props
                        )));
                    }
                }
            }
            for iface in &node.interfaces {
                if self.interface(iface).is_none() {
                    return Err(Error::schema(format!(
                        "type `{}` implements unknown interface `{}`",
                        node.name, iface
                    )));
                }
            }
        }
        for union in &self.unions {
            if union.members.len() < 2 {
                return Err(Error::schema(format!(
                    "union `{}` needs at least two members",
                    union.name
                )));
            }
            for member in &union.members {
                if self.node(member).is_none() {
                    return Err(Error::schema(format!(
                        "union `{}` references unknown member `{}`",
                        union.name, member
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_target(&self, target: &RelationshipTarget, owner: &str, field: &str) -> Result<()> {
        let known = match target {
            RelationshipTarget::Node(n) => self.node(n).is_some(),
            RelationshipTarget::Union(n) => self.union(n).is_some(),
            RelationshipTarget::Interface(n) => self.interface(n).is_some(),
        };
        if known {
            Ok(())
        } else {
            Err(Error::schema(format!(
                "relationship `{field}` on `{owner}` targets unknown type `{}`",
                target.name()
            )))
        }
    }

    fn derive_roots(&mut self) {
        let mut roots = HashMap::new();
        for node in &self.nodes {
            let plural = camel_case(&pluralize(&node.name));
            let pascal_plural = pluralize(&node.name);
            let singular = camel_case(&node.name);
            roots.insert(plural.clone(), binding(&node.name, RootKind::Read));
            roots.insert(
                format!("{plural}Connection"),
                binding(&node.name, RootKind::ReadConnection),
            );
            roots.insert(
                format!("create{pascal_plural}"),
                binding(&node.name, RootKind::Create),
            );
            roots.insert(
                format!("update{pascal_plural}"),
                binding(&node.name, RootKind::Update),
            );
            roots.insert(
                format!("delete{pascal_plural}"),
                binding(&node.name, RootKind::Delete),
            );
            roots.insert(
                format!("{singular}Created"),
                binding(&node.name, RootKind::SubscriptionCreated),
            );
            roots.insert(
                format!("{singular}Updated"),
                binding(&node.name, RootKind::SubscriptionUpdated),
            );
            roots.insert(
                format!("{singular}Deleted"),
                binding(&node.name, RootKind::SubscriptionDeleted),
            );
        }
        for iface in &self.interfaces {
            roots.insert(
                camel_case(&pluralize(&iface.name)),
                binding(&iface.name, RootKind::Read),
            );
        }
        for union in &self.unions {
            roots.insert(
                camel_case(&pluralize(&union.name)),
                binding(&union.name, RootKind::Read),
            );
        }
        self.roots = roots;
    }

    /// Resolve a root field name to its binding.
    pub fn root(&self, field: &str) -> Option<&RootBinding> {
        self.roots.get(field)
    }

    /// Look up a node type.
    pub fn node(&self, name: &str) -> Option<&NodeType> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Look up a node type, erroring with the schema taxonomy when absent.
    pub fn expect_node(&self, name: &str) -> Result<&NodeType> {
        self.node(name)
            .ok_or_else(|| Error::schema(format!("unknown node type `{name}`")))
    }

    /// Look up an interface.
    pub fn interface(&self, name: &str) -> Option<&InterfaceType> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Look up a union.
    pub fn union(&self, name: &str) -> Option<&UnionType> {
        self.unions.iter().find(|u| u.name == name)
    }

    /// Look up a relationship-properties type.
    pub fn relationship_properties(&self, name: &str) -> Option<&RelationshipPropertiesType> {
        self.relationship_properties.iter().find(|r| r.name == name)
    }

    /// Concrete implementors of an interface, in declaration order.
    pub fn implementors(&self, interface: &str) -> Vec<&NodeType> {
        self.nodes
            .iter()
            .filter(|n| n.interfaces.iter().any(|i| i == interface))
            .collect()
    }

    /// Concrete node types a relationship target can resolve to.
    pub fn concrete_targets(&self, target: &RelationshipTarget) -> Result<Vec<&NodeType>> {
        match target {
            RelationshipTarget::Node(name) => Ok(vec![self.expect_node(name)?]),
            RelationshipTarget::Interface(name) => {
                let types = self.implementors(name);
                if types.is_empty() {
                    return Err(Error::schema(format!(
                        "interface `{name}` has no implementors"
                    )));
                }
                Ok(types)
            }
            RelationshipTarget::Union(name) => {
                let union = self
                    .union(name)
                    .ok_or_else(|| Error::schema(format!("unknown union `{name}`")))?;
                union
                    .members
                    .iter()
                    .map(|m| self.expect_node(m))
                    .collect()
            }
        }
    }

    /// Concrete types a polymorphic root read resolves to (the type itself
    /// when it is a plain node type).
    pub fn concrete_for_root(&self, type_name: &str) -> Result<Vec<&NodeType>> {
        if self.node(type_name).is_some() {
            Ok(vec![self.expect_node(type_name)?])
        } else if self.interface(type_name).is_some() {
            Ok(self.implementors(type_name))
        } else if self.union(type_name).is_some() {
            self.concrete_targets(&RelationshipTarget::Union(type_name.to_string()))
        } else {
            Err(Error::schema(format!("unknown type `{type_name}`")))
        }
    }
}

fn binding(type_name: &str, kind: RootKind) -> RootBinding {
    RootBinding {
        type_name: type_name.to_string(),
        kind,
    }
}

/// English-ish pluralization matching the generated GraphQL surface.
pub fn pluralize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix('y') {
        let prev = stem.chars().last();
        if prev.is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')) {
            return format!("{stem}ies");
        }
    }
    if name.ends_with('s')
        || name.ends_with('x')
        || name.ends_with('z')
        || name.ends_with("ch")
        || name.ends_with("sh")
    {
        return format!("{name}es");
    }
    format!("{name}s")
}

/// Lower the first character (PascalCase -> camelCase).
pub fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_root_bindings() {
        let schema = movie_schema();
        assert!(matches!(schema.root("movies").unwrap().kind, RootKind::Read));
        assert!(matches!(
            schema.root("moviesConnection").unwrap().kind,
            RootKind::ReadConnection
        ));
        assert!(matches!(
            schema.root("createMovies").unwrap().kind,
            RootKind::Create
        ));
        assert_eq!(schema.root("updateMovies").unwrap().type_name, "Movie");
        assert!(matches!(
            schema.root("movieCreated").unwrap().kind,
            RootKind::SubscriptionCreated
        ));
        assert!(schema.root("frobnicateMovies").is_none());
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("Movie"), "Movies");
        assert_eq!(pluralize("Company"), "Companies");
        assert_eq!(pluralize("Boss"), "Bosses");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Match"), "Matches");
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let result = SchemaModel::from_definition(SchemaDefinition {
            types: vec![NodeType::new("Movie")
                .with_property(Property::new("title", PropertyKind::String))
                .with_property(Property::new("title", PropertyKind::String))],
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_unknown_relationship_target_rejected() {
        let result = SchemaModel::from_definition(SchemaDefinition {
            types: vec![NodeType::new("Movie").with_relationship(RelationshipField {
                name: "actors".to_string(),
                rel_type: "ACTED_IN".to_string(),
                direction: Direction::In,
                target: RelationshipTarget::Node("Ghost".to_string()),
                properties: None,
                list: true,
            })],
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_connection_relationship_lookup() {
        let schema = movie_schema();
        let movie = schema.node("Movie").unwrap();
        assert!(movie.connection_relationship("actorsConnection").is_some());
        assert!(movie.connection_relationship("actors").is_none());
    }
}
