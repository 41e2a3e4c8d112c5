//! Request query-string grammar.
//!
//! ```text
//! status=published            status eq "published"
//! views[gt]=100               views gt "100"
//! id[in]=1,2,3                id in ["1", "2", "3"]
//! views[between]=5,10         views between ["5", "10"]
//! sort=-created_at&sort=title multi-key sort
//! search=rust                 free-text search
//! page=2&per_page=20          pagination
//! preset=published            named filter preset
//! ```
//!
//! Values stay strings; the filter evaluator coerces them through the
//! model's casts. Reserved parameter names are never read as filters.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Snapshot;
use crate::sort::SortInput;
use crate::types::ValueShape;

/// Parameter carrying sort expressions.
pub const SORT_PARAM: &str = "sort";
/// Search parameter used when the model names none.
pub const SEARCH_PARAM: &str = "search";
/// Parameter naming a filter preset.
pub const PRESET_PARAM: &str = "preset";

fn operator_key_regex() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"^([^\[\]]+)\[([^\[\]]+)\]$").expect("valid operator key regex"))
}

/// Filter, search, sort and paging input read from one query string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestParams {
    /// Filter map in the shape `FilterSpec::from_value` accepts.
    pub filters: Map<String, Value>,
    /// Raw sort values, one per `sort=` parameter.
    pub sort: Vec<String>,
    /// Raw search string.
    pub search: Option<String>,
    /// Requested page, ignored when not a number.
    pub page: Option<u64>,
    /// Requested page size.
    pub per_page: Option<u64>,
    /// Preset name.
    pub preset: Option<String>,
}

impl RequestParams {
    /// Parses a URL query string, with or without the leading `?`.
    ///
    /// `search_param` is the model's search parameter name; `search` is
    /// always accepted as well.
    pub fn parse(query_string: &str, snapshot: &Snapshot, search_param: &str) -> Self {
        let pagination = &snapshot.config().pagination;
        let query_string = query_string.strip_prefix('?').unwrap_or(query_string);

        let mut params = RequestParams::default();
        for (key, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }

            if key == SORT_PARAM {
                if !value.trim().is_empty() {
                    params.sort.push(value.into_owned());
                }
            } else if key == search_param || key == SEARCH_PARAM {
                params.search = Some(value.into_owned());
            } else if key == pagination.page_name {
                params.page = parse_number(key, &value);
            } else if key == pagination.per_page_name {
                params.per_page = parse_number(key, &value);
            } else if key == PRESET_PARAM {
                params.preset = Some(value.into_owned());
            } else {
                params.insert_filter(key, &value, snapshot);
            }
        }
        params
    }

    fn insert_filter(&mut self, key: &str, value: &str, snapshot: &Snapshot) {
        let Some(captures) = operator_key_regex().captures(key) else {
            self.filters
                .insert(key.to_string(), Value::String(value.to_string()));
            return;
        };
        let field = captures[1].trim().to_string();
        let operator = captures[2].trim().to_string();

        let shape = snapshot.operators().get(&operator).map(|def| def.shape());
        let operand = match shape {
            Some(ValueShape::Array) | Some(ValueShape::Pair) => Value::Array(
                value
                    .split(',')
                    .map(|part| Value::String(part.trim().to_string()))
                    .collect(),
            ),
            _ => Value::String(value.to_string()),
        };

        let entry = self
            .filters
            .entry(field)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            // `field=x&field[op]=y`: keep the literal as an explicit `eq`.
            let literal = entry.take();
            let mut map = Map::new();
            map.insert("eq".to_string(), literal);
            *entry = Value::Object(map);
        }
        if let Value::Object(map) = entry {
            map.insert(operator, operand);
        }
    }

    /// The filter map as a JSON value.
    pub fn filter_value(&self) -> Value {
        Value::Object(self.filters.clone())
    }

    /// All `sort=` values as one sort input, in parameter order.
    ///
    /// Each value is split on its own, so a direction token never pairs
    /// with a field from a different `sort=` parameter.
    pub fn sort_input(&self, snapshot: &Snapshot) -> SortInput {
        SortInput::Sequence(
            self.sort
                .iter()
                .flat_map(|value| SortInput::Delimited(value.clone()).directives(snapshot))
                .collect(),
        )
    }

    /// Returns true if the request carries nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
            && self.sort.is_empty()
            && self.search.is_none()
            && self.page.is_none()
            && self.per_page.is_none()
            && self.preset.is_none()
    }
}

fn parse_number(key: &str, value: &str) -> Option<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            debug!(param = %key, value = %value, "Ignoring non-numeric paging parameter");
            None
        }
    }
}
