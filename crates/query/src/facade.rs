//! Public entry surface.
//!
//! [`QueryFilter`] composes filtering, searching, sorting and pagination
//! against any [`QueryBuilder`]. Each call reads one configuration snapshot,
//! builds everything it needs, and only then appends to the query. A failing
//! call leaves the query exactly as it was.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::{ConfigStore, EngineConfig, PaginationSettings, SearchSettings, Snapshot};
use crate::error::{ConfigError, FilterError, FilterResult, QueryResult, SearchError, SortError};
use crate::filter::{Clock, CustomFilter, CustomFilterRegistry, FilterEvaluator, SystemClock};
use crate::pagination::Page;
use crate::predicate::{Predicate, QueryBuilder};
use crate::request::RequestParams;
use crate::search::{self, SearchTerms};
use crate::sort::{AllowedSorts, SortEvaluator, SortInput, SortPlan};
use crate::types::{Boolean, FilterSpec, SortDirective};

/// Applies request-supplied filters, search, sorting and paging to queries.
#[derive(Clone)]
pub struct QueryFilter {
    config: Arc<ConfigStore>,
    custom: CustomFilterRegistry,
    clock: Arc<dyn Clock>,
}

impl QueryFilter {
    /// Creates a facade over a new configuration store.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_store(Arc::new(ConfigStore::new(config)?)))
    }

    /// Creates a facade sharing an existing configuration store.
    pub fn with_store(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            custom: CustomFilterRegistry::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for relative-date operators.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The shared configuration store.
    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// The custom filter registry. Handlers registered here are visible to
    /// every clone.
    pub fn custom_filters(&self) -> &CustomFilterRegistry {
        &self.custom
    }

    /// Registers a custom filter handler under `name`.
    pub fn register_custom_filter(&self, name: impl Into<String>, handler: Arc<dyn CustomFilter>) {
        self.custom.register(name, handler);
    }

    // ------------------------------------------------------------------
    // Filtering
    // ------------------------------------------------------------------

    /// Applies a filter expression (a field map, a group, or a list of
    /// groups). `null` and empty input leave the query unchanged.
    pub fn filter<Q: QueryBuilder + ?Sized>(&self, query: &mut Q, input: &Value) -> FilterResult<()> {
        let spec = FilterSpec::from_value(input)?;
        self.filter_spec(query, &spec)
    }

    /// Applies an already parsed filter expression.
    pub fn filter_spec<Q: QueryBuilder + ?Sized>(
        &self,
        query: &mut Q,
        spec: &FilterSpec,
    ) -> FilterResult<()> {
        let snapshot = self.config.snapshot();
        let predicate = self.build_filter(&*query, &snapshot, spec)?;
        push(query, predicate);
        Ok(())
    }

    /// Applies the named filter preset.
    pub fn apply_preset<Q: QueryBuilder + ?Sized>(&self, query: &mut Q, name: &str) -> FilterResult<()> {
        let snapshot = self.config.snapshot();
        let predicate = self.build_preset(&*query, &snapshot, name)?;
        push(query, predicate);
        Ok(())
    }

    fn build_filter<Q: QueryBuilder + ?Sized>(
        &self,
        query: &Q,
        snapshot: &Snapshot,
        spec: &FilterSpec,
    ) -> FilterResult<Option<Predicate>> {
        let predicate = FilterEvaluator::new(query, snapshot, &self.custom, &*self.clock)
            .evaluate(spec)?;
        if let Some(p) = &predicate {
            debug!(
                model = %query.model().name,
                conditions = p.leaf_count(),
                "Built filter predicate"
            );
        }
        Ok(predicate)
    }

    fn build_preset<Q: QueryBuilder + ?Sized>(
        &self,
        query: &Q,
        snapshot: &Snapshot,
        name: &str,
    ) -> FilterResult<Option<Predicate>> {
        let input = snapshot
            .config()
            .presets
            .get(name)
            .ok_or_else(|| FilterError::UnknownPreset {
                name: name.to_string(),
            })?;
        let spec = FilterSpec::from_value(input)?;
        self.build_filter(query, snapshot, &spec)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Applies a free-text search.
    ///
    /// `fields` defaults to the model's searchable fields and `mode` to the
    /// configured mode. Input that normalizes to no terms leaves the query
    /// unchanged.
    pub fn search<Q: QueryBuilder + ?Sized>(
        &self,
        query: &mut Q,
        term: &str,
        fields: Option<&[&str]>,
        mode: Option<&str>,
    ) -> Result<(), SearchError> {
        let snapshot = self.config.snapshot();
        let predicate = build_search(&*query, &snapshot, term, fields, mode)?;
        push(query, predicate);
        Ok(())
    }

    /// Normalizes a raw search string with the active settings.
    pub fn search_terms(&self, raw: &str) -> Result<SearchTerms, SearchError> {
        search::normalize(raw, &self.config.snapshot().config().search)
    }

    // ------------------------------------------------------------------
    // Sorting and paging
    // ------------------------------------------------------------------

    /// Applies sort directives, in order.
    ///
    /// `allowed` restricts the sortable fields for this call; without it the
    /// model's sortable list applies. A model with no sortable list accepts
    /// any valid identifier unless `sort.allow_any_column` is turned off.
    pub fn sort<Q: QueryBuilder + ?Sized>(
        &self,
        query: &mut Q,
        input: impl Into<SortInput>,
        allowed: Option<&AllowedSorts>,
    ) -> Result<Vec<SortDirective>, SortError> {
        let snapshot = self.config.snapshot();
        let plan = SortEvaluator::new(&*query, &snapshot).plan(&input.into(), allowed)?;
        Ok(plan.apply(query))
    }

    /// Appends limit and offset for the requested page.
    pub fn paginate<Q: QueryBuilder + ?Sized>(
        &self,
        query: &mut Q,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Page {
        let snapshot = self.config.snapshot();
        let page = Page::resolve(page, per_page, &snapshot.config().pagination);
        page.apply(query);
        page
    }

    // ------------------------------------------------------------------
    // Request strings
    // ------------------------------------------------------------------

    /// Parses a query string and applies its preset, filters, search, sort
    /// and page, in that order.
    ///
    /// Every part is validated before anything is appended.
    pub fn apply_request<Q: QueryBuilder + ?Sized>(
        &self,
        query: &mut Q,
        query_string: &str,
        allowed_sorts: Option<&AllowedSorts>,
    ) -> QueryResult<RequestParams> {
        let snapshot = self.config.snapshot();
        let params = RequestParams::parse(
            query_string,
            &snapshot,
            query.model().search_param_name(),
        );

        let preset = match &params.preset {
            Some(name) => self.build_preset(&*query, &snapshot, name)?,
            None => None,
        };
        let filters = FilterSpec::from_value(&params.filter_value())?;
        let filters = self.build_filter(&*query, &snapshot, &filters)?;
        let search = match &params.search {
            Some(term) => build_search(&*query, &snapshot, term, None, None)?,
            None => None,
        };
        let sort: SortPlan =
            SortEvaluator::new(&*query, &snapshot).plan(&params.sort_input(&snapshot), allowed_sorts)?;

        push(query, preset);
        push(query, filters);
        push(query, search);
        sort.apply(query);
        if params.page.is_some() || params.per_page.is_some() {
            Page::resolve(params.page, params.per_page, &snapshot.config().pagination)
                .apply(query);
        }
        Ok(params)
    }

    // ------------------------------------------------------------------
    // Configuration accessors
    // ------------------------------------------------------------------

    /// The active operator table, key to store operator.
    pub fn operators(&self) -> BTreeMap<String, String> {
        self.config.snapshot().operators().table()
    }

    /// The global field whitelist.
    pub fn whitelist(&self) -> Vec<String> {
        self.config.snapshot().config().global_whitelist.clone()
    }

    /// Current search settings.
    pub fn search_config(&self) -> SearchSettings {
        self.config.snapshot().config().search.clone()
    }

    /// Named filter presets.
    pub fn presets(&self) -> BTreeMap<String, Value> {
        self.config.snapshot().config().presets.clone()
    }

    /// Current pagination settings.
    pub fn pagination(&self) -> PaginationSettings {
        self.config.snapshot().config().pagination.clone()
    }

    /// Reads an option by dotted key.
    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        self.config.get(key)
    }

    /// Sets an option by dotted key. Later calls see the new value.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.config.set(key, value)
    }
}

impl std::fmt::Debug for QueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryFilter")
            .field("config", &self.config)
            .field("custom", &self.custom)
            .finish_non_exhaustive()
    }
}

fn build_search<Q: QueryBuilder + ?Sized>(
    query: &Q,
    snapshot: &Snapshot,
    term: &str,
    fields: Option<&[&str]>,
    mode: Option<&str>,
) -> Result<Option<Predicate>, SearchError> {
    let settings = &snapshot.config().search;
    let mode = match mode {
        Some(mode) => search::parse_mode(mode)?,
        None => settings.mode,
    };
    let terms = search::normalize(term, settings)?;
    if terms.is_empty() {
        return Ok(None);
    }

    let fields: Vec<String> = match fields {
        Some(fields) => fields.iter().map(|f| f.to_string()).collect(),
        None => query.model().searchable.clone(),
    };
    search::build_predicate(query, &terms, &fields, mode, settings.case_sensitive)
}

fn push<Q: QueryBuilder + ?Sized>(query: &mut Q, predicate: Option<Predicate>) {
    if let Some(predicate) = predicate {
        query.push_predicate(Boolean::And, predicate);
    }
}
