//! Entity introspection: models, relations and the catalog.
//!
//! A [`Model`] describes what the engine may know about an entity: its
//! table, which fields callers may filter, sort and search on, per-field
//! cast rules, and the relations dotted paths may traverse. A [`Catalog`]
//! is a name-keyed set of models and is usually loaded from JSON.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::CastType;

/// Kind of relation between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The foreign key lives on this model.
    BelongsTo,
    /// The foreign key lives on the related model; at most one row.
    HasOne,
    /// The foreign key lives on the related model.
    HasMany,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::BelongsTo => write!(f, "belongs_to"),
            RelationKind::HasOne => write!(f, "has_one"),
            RelationKind::HasMany => write!(f, "has_many"),
        }
    }
}

/// A declared relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Cardinality and which side holds the reference.
    pub kind: RelationKind,
    /// Name of the related model in the catalog.
    pub target: String,
    /// Column holding the reference.
    pub foreign_key: String,
    /// Column the foreign key points at.
    #[serde(default = "default_key")]
    pub owner_key: String,
}

impl RelationDef {
    /// Creates a `belongs_to` relation with owner key `id`.
    pub fn belongs_to(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::BelongsTo,
            target: target.into(),
            foreign_key: foreign_key.into(),
            owner_key: default_key(),
        }
    }

    /// Creates a `has_many` relation with owner key `id`.
    pub fn has_many(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasMany,
            target: target.into(),
            foreign_key: foreign_key.into(),
            owner_key: default_key(),
        }
    }

    /// Creates a `has_one` relation with owner key `id`.
    pub fn has_one(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasOne,
            ..Self::has_many(target, foreign_key)
        }
    }

    /// Sets the owner key.
    pub fn with_owner_key(mut self, owner_key: impl Into<String>) -> Self {
        self.owner_key = owner_key.into();
        self
    }

    /// The column on the parent side of the join.
    pub fn parent_column(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.foreign_key,
            RelationKind::HasOne | RelationKind::HasMany => &self.owner_key,
        }
    }

    /// The column on the related side of the join.
    pub fn related_column(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.owner_key,
            RelationKind::HasOne | RelationKind::HasMany => &self.foreign_key,
        }
    }
}

fn default_key() -> String {
    "id".to_string()
}

/// An entity the engine can translate requests against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Catalog key.
    pub name: String,
    /// Backing table.
    pub table: String,
    /// Primary key column.
    #[serde(default = "default_key")]
    pub primary_key: String,
    /// Fields callers may filter on. `None` defers to the global whitelist.
    #[serde(default)]
    pub filterable: Option<Vec<String>>,
    /// Fields callers may sort on. `None` defers to configuration.
    #[serde(default)]
    pub sortable: Option<Vec<String>>,
    /// Default fields for free-text search.
    #[serde(default)]
    pub searchable: Vec<String>,
    /// Request parameter carrying the search term, if not `search`.
    #[serde(default)]
    pub search_param: Option<String>,
    /// Cast rules by field.
    #[serde(default)]
    pub casts: HashMap<String, CastType>,
    /// Relations by name.
    #[serde(default)]
    pub relations: HashMap<String, RelationDef>,
}

impl Model {
    /// Creates a new model with no restrictions.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_key(),
            filterable: None,
            sortable: None,
            searchable: Vec::new(),
            search_param: None,
            casts: HashMap::new(),
            relations: HashMap::new(),
        }
    }

    /// Sets the filterable fields.
    pub fn with_filterable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filterable = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the sortable fields.
    pub fn with_sortable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sortable = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the searchable fields.
    pub fn with_searchable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the search request parameter name.
    pub fn with_search_param(mut self, name: impl Into<String>) -> Self {
        self.search_param = Some(name.into());
        self
    }

    /// Adds a cast rule.
    pub fn with_cast(mut self, field: impl Into<String>, cast: CastType) -> Self {
        self.casts.insert(field.into(), cast);
        self
    }

    /// Adds a relation.
    pub fn with_relation(mut self, name: impl Into<String>, relation: RelationDef) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Looks up a declared relation.
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    /// Returns the declared relation names, sorted.
    pub fn relation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.relations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the cast rule for a field, if any.
    pub fn cast_for(&self, field: &str) -> Option<CastType> {
        self.casts.get(field).copied()
    }

    /// The request parameter carrying the search term.
    pub fn search_param_name(&self) -> &str {
        self.search_param.as_deref().unwrap_or("search")
    }
}

/// A set of models keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Models by name.
    #[serde(default)]
    pub models: HashMap<String, Model>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model under its own name.
    pub fn with_model(mut self, model: Model) -> Self {
        self.models.insert(model.name.clone(), model);
        self
    }

    /// Looks up a model.
    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Resolves a relation on `model` to its target model.
    pub fn related<'s, 'm>(
        &'s self,
        model: &'m Model,
        relation: &str,
    ) -> Option<(&'m RelationDef, &'s Model)> {
        let def = model.relation(relation)?;
        let target = self.models.get(&def.target)?;
        Some((def, target))
    }

    /// Parses a catalog from JSON.
    ///
    /// Models may omit `name`; the map key is used.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, serde_json::Value> = match serde_json::from_str::<
            serde_json::Value,
        >(json)?
        {
            serde_json::Value::Object(map) => match map.get("models") {
                Some(serde_json::Value::Object(models)) => models
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                _ => map.into_iter().collect(),
            },
            _ => {
                return Err(ConfigError::InvalidConfigValue {
                    key: "models".to_string(),
                    message: "catalog must be a JSON object".to_string(),
                });
            }
        };

        let mut models = HashMap::with_capacity(raw.len());
        for (name, mut value) in raw {
            if let Some(obj) = value.as_object_mut() {
                obj.entry("name")
                    .or_insert_with(|| serde_json::Value::String(name.clone()));
            }
            let model: Model = serde_json::from_value(value)?;
            models.insert(name, model);
        }

        let catalog = Self { models };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reads a catalog from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Checks identifiers and relation targets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        for (name, model) in &self.models {
            if !is_identifier(&model.table) {
                problems.push(format!("model '{}' has invalid table '{}'", name, model.table));
            }
            if !is_identifier(&model.primary_key) {
                problems.push(format!(
                    "model '{}' has invalid primary key '{}'",
                    name, model.primary_key
                ));
            }
            for (rel_name, rel) in &model.relations {
                if !self.models.contains_key(&rel.target) {
                    problems.push(format!(
                        "relation '{}.{}' targets unknown model '{}'",
                        name, rel_name, rel.target
                    ));
                }
                if !is_identifier(&rel.foreign_key) || !is_identifier(&rel.owner_key) {
                    problems.push(format!("relation '{}.{}' has invalid keys", name, rel_name));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            problems.sort();
            Err(ConfigError::Invalid { problems })
        }
    }
}

fn identifier_regex() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

/// Returns true if `s` is a single safe column identifier.
pub fn is_identifier(s: &str) -> bool {
    identifier_regex().is_match(s)
}

/// Returns true if every dot-separated segment of `path` is an identifier.
pub fn is_field_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}
