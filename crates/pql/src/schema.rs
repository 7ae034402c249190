//! Schema registry — entity, field, and edge metadata that the planner,
//! executor, and autocomplete engine resolve names against.
//!
//! A [`Registry`] is built once (from code or a JSON file), validated, and
//! then shared read-only.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Audit timestamps maintained by the data layer.
pub const AUDIT_FIELDS: &[&str] = &["created_at", "updated_at"];

/// Logical type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Int,
    Int64,
    Float,
    Bool,
    Time,
    Enum,
    Uuid,
    Json,
}

impl FieldKind {
    /// Kinds that support `>`, `<`, `>=`, `<=`.
    pub fn is_comparable(self) -> bool {
        matches!(
            self,
            FieldKind::Int | FieldKind::Int64 | FieldKind::Float | FieldKind::Time
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Int64 => "int64",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Time => "time",
            FieldKind::Enum => "enum",
            FieldKind::Uuid => "uuid",
            FieldKind::Json => "json",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single column of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
    /// Sensitive fields never leave the data layer through queries.
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            sensitive: false,
            enum_values: Vec::new(),
        }
    }

    /// An enum field with its declared values.
    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            enum_values: values.iter().map(|v| v.to_string()).collect(),
            ..Self::new(name, FieldKind::Enum)
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Declared spelling of an enum value, matched case-insensitively.
    pub fn enum_value(&self, value: &str) -> Option<&str> {
        self.enum_values
            .iter()
            .find(|v| v.eq_ignore_ascii_case(value))
            .map(String::as_str)
    }
}

/// Relationship cardinality between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    O2O,
    M2O,
    O2M,
    M2M,
}

impl Cardinality {
    /// O2O and M2O edges resolve to at most one row.
    pub fn is_unique(self) -> bool {
        matches!(self, Cardinality::O2O | Cardinality::M2O)
    }
}

/// A named relationship to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeMeta {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
}

impl EdgeMeta {
    pub fn new(name: impl Into<String>, target: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality,
        }
    }

    pub fn unique(&self) -> bool {
        self.cardinality.is_unique()
    }
}

fn default_id_field() -> String {
    "id".to_string()
}

/// Everything the engine knows about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    pub fields: Vec<FieldMeta>,
    #[serde(default)]
    pub edges: Vec<EdgeMeta>,
    #[serde(default)]
    pub immutable: bool,
    /// State machines: field -> from-state -> allowed to-states.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transitions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: default_id_field(),
            fields: Vec::new(),
            edges: Vec::new(),
            immutable: false,
            transitions: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_edge(mut self, edge: EdgeMeta) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn with_transition(mut self, field: &str, from: &str, to: &[&str]) -> Self {
        self.transitions
            .entry(field.to_string())
            .or_default()
            .insert(from.to_string(), to.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Case-insensitive field lookup.
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive edge lookup.
    pub fn edge(&self, name: &str) -> Option<&EdgeMeta> {
        self.edges.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn id_meta(&self) -> Option<&FieldMeta> {
        self.field(&self.id_field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn edge_names(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().map(|e| e.name.as_str())
    }

    /// Identity and audit fields are maintained by the data layer.
    pub fn is_computed(&self, field: &str) -> bool {
        field.eq_ignore_ascii_case(&self.id_field)
            || AUDIT_FIELDS.iter().any(|a| a.eq_ignore_ascii_case(field))
    }

    /// Fields returned when a query has no `select`: every non-sensitive
    /// field, in schema order.
    pub fn default_projection(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.sensitive)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Fields a `create` must assign.
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.optional && !self.is_computed(&f.name))
            .map(|f| f.name.as_str())
            .collect()
    }

    fn validate(&self, registry: &Registry) -> RegistryResult<()> {
        let invalid = |msg: String| Err(RegistryError::Invalid(format!("{}: {msg}", self.name)));

        if self.fields.is_empty() {
            return invalid("entity has no fields".into());
        }
        if self.id_meta().is_none() {
            return invalid(format!("id field '{}' is not declared", self.id_field));
        }

        let mut seen = BTreeSet::new();
        for name in self.field_names().chain(self.edge_names()) {
            if !seen.insert(name.to_ascii_lowercase()) {
                return invalid(format!("'{name}' is declared more than once"));
            }
        }

        for field in &self.fields {
            if field.kind == FieldKind::Enum && field.enum_values.is_empty() {
                return invalid(format!("enum field '{}' declares no values", field.name));
            }
        }

        for edge in &self.edges {
            if registry.entity(&edge.target).is_none() {
                return invalid(format!(
                    "edge '{}' targets unknown entity '{}'",
                    edge.name, edge.target
                ));
            }
        }

        for (field_name, states) in &self.transitions {
            let Some(field) = self.field(field_name) else {
                return invalid(format!("transitions declared for unknown field '{field_name}'"));
            };
            if field.kind != FieldKind::Enum {
                return invalid(format!("transitions on non-enum field '{field_name}'"));
            }
            for state in states.keys().chain(states.values().flatten()) {
                if field.enum_value(state).is_none() {
                    return invalid(format!(
                        "transition state '{state}' is not a value of '{field_name}'"
                    ));
                }
            }
        }

        Ok(())
    }
}

/// On-disk registry layout: `{ "entities": [ ... ] }`.
#[derive(Serialize, Deserialize)]
struct RegistryFile {
    entities: Vec<EntitySchema>,
}

/// Read-only snapshot of every queryable entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegistryFile", into = "RegistryFile")]
pub struct Registry {
    entities: BTreeMap<String, EntitySchema>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Call [`Registry::validate`] once all entities are in.
    pub fn with_entity(mut self, entity: EntitySchema) -> Self {
        self.insert(entity);
        self
    }

    pub fn insert(&mut self, entity: EntitySchema) {
        self.entities.insert(entity.name.clone(), entity);
    }

    /// Case-insensitive entity lookup.
    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name).or_else(|| {
            self.entities
                .values()
                .find(|e| e.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check cross-entity consistency: id fields exist, names are unique,
    /// edges point at known entities, enums declare values.
    pub fn validate(&self) -> RegistryResult<()> {
        let mut seen = BTreeSet::new();
        for entity in self.entities.values() {
            if !seen.insert(entity.name.to_ascii_lowercase()) {
                return Err(RegistryError::Invalid(format!(
                    "entity '{}' is declared more than once",
                    entity.name
                )));
            }
            entity.validate(self)?;
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> RegistryResult<Self> {
        let file: RegistryFile = serde_json::from_str(json)?;
        Self::try_from(file)
    }

    pub fn from_path(path: &Path) -> RegistryResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> RegistryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to_path(&self, path: &Path) -> RegistryResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl TryFrom<RegistryFile> for Registry {
    type Error = RegistryError;

    fn try_from(file: RegistryFile) -> RegistryResult<Self> {
        let mut registry = Registry::new();
        for entity in file.entities {
            if registry.entity(&entity.name).is_some() {
                return Err(RegistryError::Invalid(format!(
                    "entity '{}' is declared more than once",
                    entity.name
                )));
            }
            registry.insert(entity);
        }
        registry.validate()?;
        Ok(registry)
    }
}

impl From<Registry> for RegistryFile {
    fn from(registry: Registry) -> Self {
        RegistryFile {
            entities: registry.entities.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Registry {
        Registry::new()
            .with_entity(
                EntitySchema::new("lease")
                    .with_field(FieldMeta::new("id", FieldKind::Uuid))
                    .with_field(FieldMeta::enumeration("status", &["active", "ended"]))
                    .with_field(FieldMeta::new("notes", FieldKind::String).optional())
                    .with_field(FieldMeta::new("secret", FieldKind::String).sensitive())
                    .with_field(FieldMeta::new("created_at", FieldKind::Time))
                    .with_edge(EdgeMeta::new("tenant", "tenant", Cardinality::M2O))
                    .with_transition("status", "active", &["ended"]),
            )
            .with_entity(
                EntitySchema::new("tenant")
                    .with_field(FieldMeta::new("id", FieldKind::Uuid))
                    .with_field(FieldMeta::new("name", FieldKind::String)),
            )
    }

    #[test]
    fn test_lookups_ignore_case() {
        let reg = tiny();
        assert!(reg.validate().is_ok());
        let lease = reg.entity("LEASE").unwrap();
        assert_eq!(lease.name, "lease");
        assert_eq!(lease.field("Status").unwrap().name, "status");
        assert!(lease.edge("TENANT").unwrap().unique());
        assert_eq!(lease.field("status").unwrap().enum_value("ACTIVE"), Some("active"));
    }

    #[test]
    fn test_projection_and_required_fields() {
        let reg = tiny();
        let lease = reg.entity("lease").unwrap();
        assert_eq!(
            lease.default_projection(),
            vec!["id", "status", "notes", "created_at"]
        );
        assert_eq!(lease.required_fields(), vec!["status", "secret"]);
        assert!(lease.is_computed("id"));
        assert!(lease.is_computed("created_at"));
        assert!(!lease.is_computed("status"));
    }

    #[test]
    fn test_validation_rejects_dangling_edge() {
        let reg = Registry::new().with_entity(
            EntitySchema::new("lease")
                .with_field(FieldMeta::new("id", FieldKind::Uuid))
                .with_edge(EdgeMeta::new("tenant", "tenant", Cardinality::M2O)),
        );
        let err = reg.validate().unwrap_err();
        assert!(err.to_string().contains("unknown entity 'tenant'"));
    }

    #[test]
    fn test_validation_rejects_bad_transitions_and_enums() {
        let reg = Registry::new().with_entity(
            EntitySchema::new("lease")
                .with_field(FieldMeta::new("id", FieldKind::Uuid))
                .with_field(FieldMeta::enumeration("status", &["active"]))
                .with_transition("status", "active", &["archived"]),
        );
        assert!(reg.validate().is_err());

        let reg = Registry::new().with_entity(
            EntitySchema::new("lease")
                .with_field(FieldMeta::new("id", FieldKind::Uuid))
                .with_field(FieldMeta::enumeration("status", &[])),
        );
        assert!(reg.validate().is_err());
    }

    #[test]
    fn test_missing_id_field_is_invalid() {
        let reg = Registry::new()
            .with_entity(EntitySchema::new("note").with_field(FieldMeta::new("body", FieldKind::String)));
        assert!(reg.validate().is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.json");
        let reg = tiny();
        reg.write_to_path(&path).unwrap();

        let loaded = Registry::from_path(&path).unwrap();
        assert_eq!(loaded, reg);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{"entities": [
            {"name": "tenant", "fields": [{"name": "id", "kind": "int64"}]}
        ]}"#;
        let reg = Registry::from_json_str(json).unwrap();
        let tenant = reg.entity("tenant").unwrap();
        assert_eq!(tenant.id_field, "id");
        assert!(!tenant.immutable);
        assert!(tenant.edges.is_empty());
    }

    #[test]
    fn test_json_duplicate_entity_rejected() {
        let json = r#"{"entities": [
            {"name": "tenant", "fields": [{"name": "id", "kind": "int"}]},
            {"name": "Tenant", "fields": [{"name": "id", "kind": "int"}]}
        ]}"#;
        let err = Registry::from_json_str(json).unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));
    }
}
