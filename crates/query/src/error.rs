//! Error types for the query translation layer.
//!
//! Errors are organized by the surface that raised them: filtering, searching,
//! sorting, and configuration. Every variant carries the offending field,
//! operator or value type so a caller can translate it into a 400-class
//! response without inspecting strings.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// The primary error type for all translation operations.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Filter expression errors
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Search term errors
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Sort directive errors
    #[error(transparent)]
    Sort(#[from] SortError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while evaluating a filter specification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// The filter input is neither a map nor a list of groups.
    #[error("invalid filter input: expected {expected}, found {found}")]
    InvalidInputShape { expected: String, found: String },

    /// More top-level filters than `max_filters` allows.
    #[error("too many filters: {count} given, maximum is {max}")]
    TooManyFilters { count: usize, max: usize },

    /// The operator key is not registered.
    #[error("unsupported operator '{operator}' on field '{field}'")]
    UnsupportedOperator { field: String, operator: String },

    /// The field is not whitelisted, or is not a valid identifier.
    #[error("field '{field}' is not filterable: {reason}")]
    FieldNotFilterable { field: String, reason: String },

    /// The relationship named in a dotted path is not declared on the model.
    #[error("unknown relationship '{relation}' on model '{model}'")]
    UnknownRelationship { model: String, relation: String },

    /// Group or relationship nesting exceeds `max_nesting_level`.
    #[error("nesting depth {depth} at '{path}' exceeds maximum {max}")]
    NestingTooDeep { path: String, depth: usize, max: usize },

    /// The operand does not have the shape the operator requires.
    #[error("operator '{operator}' on field '{field}' expects {expected}, got {found}")]
    OperandArityMismatch {
        field: String,
        operator: String,
        expected: String,
        found: String,
    },

    /// The operand has the right shape but an unusable type or ordering.
    #[error("operator '{operator}' on field '{field}' cannot use {value_type} operand: {message}")]
    OperandTypeMismatch {
        field: String,
        operator: String,
        value_type: String,
        message: String,
    },

    /// The named preset does not exist.
    #[error("unknown filter preset '{name}'")]
    UnknownPreset { name: String },

    /// A custom filter handler refused its operand.
    #[error("custom filter '{handler}' rejected value for field '{field}': {message}")]
    CustomFilterRejected {
        field: String,
        handler: String,
        message: String,
    },
}

/// Errors raised while normalizing or applying a search term.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// A token was empty after trimming quote characters.
    #[error("search term is empty")]
    EmptySearchTerm,

    /// A token is shorter than `min_term_length`.
    #[error("search term '{term}' is shorter than {min_length} characters")]
    SearchTermTooShort { term: String, min_length: usize },

    /// The search mode is neither `and` nor `or`.
    #[error("invalid search mode '{mode}', expected 'and' or 'or'")]
    InvalidSearchMode { mode: String },

    /// A searchable field is not a valid column path.
    #[error("field '{field}' is not searchable: {reason}")]
    FieldNotSearchable { field: String, reason: String },

    /// A dotted searchable field names an undeclared relationship.
    #[error("unknown relationship '{relation}' on model '{model}'")]
    UnknownRelationship { model: String, relation: String },
}

/// Errors raised while parsing or applying sort directives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SortError {
    /// The directive resolved to an empty field name.
    #[error("sort directive '{directive}' has an empty field")]
    EmptySortField { directive: String },

    /// The direction token is neither `asc` nor `desc`.
    #[error("invalid sort direction '{direction}' for field '{field}'")]
    InvalidSortDirection { field: String, direction: String },

    /// The field is not in the sort allow-list.
    #[error("sorting by '{field}' is not allowed")]
    SortFieldNotAllowed { field: String },

    /// A dotted sort field names an undeclared relationship.
    #[error("unknown relationship '{relation}' on model '{model}'")]
    UnknownRelationship { model: String, relation: String },
}

/// Errors raised while loading or updating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No option exists at the dotted key.
    #[error("unknown configuration key '{key}'")]
    UnknownConfigKey { key: String },

    /// The value could not be applied to the option.
    #[error("invalid value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    /// A configured store operator is not in the permitted token set.
    #[error("operator '{operator}' maps to unsupported store operator '{store_operator}'")]
    InvalidStoreOperator {
        operator: String,
        store_operator: String,
    },

    /// The configured timezone is not an IANA name.
    #[error("unknown timezone '{timezone}'")]
    UnknownTimezone { timezone: String },

    /// The configuration failed validation.
    #[error("invalid configuration: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },

    /// The configuration document could not be read.
    #[error("failed to read configuration from '{path}': {message}")]
    Io { path: String, message: String },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Flat classification of every error the engine can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInputShape,
    TooManyFilters,
    UnsupportedOperator,
    FieldNotFilterable,
    UnknownRelationship,
    NestingTooDeep,
    OperandArityMismatch,
    OperandTypeMismatch,
    UnknownPreset,
    CustomFilterRejected,
    EmptySearchTerm,
    SearchTermTooShort,
    InvalidSearchMode,
    FieldNotSearchable,
    EmptySortField,
    InvalidSortDirection,
    SortFieldNotAllowed,
    UnknownConfigKey,
    InvalidConfigValue,
    InvalidStoreOperator,
    UnknownTimezone,
    InvalidConfiguration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInputShape => "invalid-input-shape",
            ErrorKind::TooManyFilters => "too-many-filters",
            ErrorKind::UnsupportedOperator => "unsupported-operator",
            ErrorKind::FieldNotFilterable => "field-not-filterable",
            ErrorKind::UnknownRelationship => "unknown-relationship",
            ErrorKind::NestingTooDeep => "nesting-too-deep",
            ErrorKind::OperandArityMismatch => "operand-arity-mismatch",
            ErrorKind::OperandTypeMismatch => "operand-type-mismatch",
            ErrorKind::UnknownPreset => "unknown-preset",
            ErrorKind::CustomFilterRejected => "custom-filter-rejected",
            ErrorKind::EmptySearchTerm => "empty-search-term",
            ErrorKind::SearchTermTooShort => "search-term-too-short",
            ErrorKind::InvalidSearchMode => "invalid-search-mode",
            ErrorKind::FieldNotSearchable => "field-not-searchable",
            ErrorKind::EmptySortField => "empty-sort-field",
            ErrorKind::InvalidSortDirection => "invalid-sort-direction",
            ErrorKind::SortFieldNotAllowed => "sort-field-not-allowed",
            ErrorKind::UnknownConfigKey => "unknown-config-key",
            ErrorKind::InvalidConfigValue => "invalid-config-value",
            ErrorKind::InvalidStoreOperator => "invalid-store-operator",
            ErrorKind::UnknownTimezone => "unknown-timezone",
            ErrorKind::InvalidConfiguration => "invalid-configuration",
        };
        f.write_str(name)
    }
}

impl FilterError {
    /// Returns the flat error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FilterError::InvalidInputShape { .. } => ErrorKind::InvalidInputShape,
            FilterError::TooManyFilters { .. } => ErrorKind::TooManyFilters,
            FilterError::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            FilterError::FieldNotFilterable { .. } => ErrorKind::FieldNotFilterable,
            FilterError::UnknownRelationship { .. } => ErrorKind::UnknownRelationship,
            FilterError::NestingTooDeep { .. } => ErrorKind::NestingTooDeep,
            FilterError::OperandArityMismatch { .. } => ErrorKind::OperandArityMismatch,
            FilterError::OperandTypeMismatch { .. } => ErrorKind::OperandTypeMismatch,
            FilterError::UnknownPreset { .. } => ErrorKind::UnknownPreset,
            FilterError::CustomFilterRejected { .. } => ErrorKind::CustomFilterRejected,
        }
    }
}

impl SearchError {
    /// Returns the flat error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::EmptySearchTerm => ErrorKind::EmptySearchTerm,
            SearchError::SearchTermTooShort { .. } => ErrorKind::SearchTermTooShort,
            SearchError::InvalidSearchMode { .. } => ErrorKind::InvalidSearchMode,
            SearchError::FieldNotSearchable { .. } => ErrorKind::FieldNotSearchable,
            SearchError::UnknownRelationship { .. } => ErrorKind::UnknownRelationship,
        }
    }
}

impl SortError {
    /// Returns the flat error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SortError::EmptySortField { .. } => ErrorKind::EmptySortField,
            SortError::InvalidSortDirection { .. } => ErrorKind::InvalidSortDirection,
            SortError::SortFieldNotAllowed { .. } => ErrorKind::SortFieldNotAllowed,
            SortError::UnknownRelationship { .. } => ErrorKind::UnknownRelationship,
        }
    }
}

impl ConfigError {
    /// Returns the flat error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::UnknownConfigKey { .. } => ErrorKind::UnknownConfigKey,
            ConfigError::InvalidConfigValue { .. } => ErrorKind::InvalidConfigValue,
            ConfigError::InvalidStoreOperator { .. } => ErrorKind::InvalidStoreOperator,
            ConfigError::UnknownTimezone { .. } => ErrorKind::UnknownTimezone,
            ConfigError::Invalid { .. } | ConfigError::Io { .. } | ConfigError::Parse(_) => {
                ErrorKind::InvalidConfiguration
            }
        }
    }
}

impl QueryError {
    /// Returns the flat error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Filter(e) => e.kind(),
            QueryError::Search(e) => e.kind(),
            QueryError::Sort(e) => e.kind(),
            QueryError::Config(e) => e.kind(),
        }
    }

    /// Returns true if the error was caused by caller input.
    ///
    /// Configuration errors are operator mistakes, not request mistakes.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueryError::Config(_))
    }
}

/// Result alias for filter evaluation.
pub type FilterResult<T> = Result<T, FilterError>;

/// Result alias for operations that may fail on any surface.
pub type QueryResult<T> = Result<T, QueryError>;
