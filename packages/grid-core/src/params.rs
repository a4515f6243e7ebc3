//! Query-string encoding and the content-addressed cache key.
//!
//! The tabular endpoint takes `page`, `pageSize`, `search`, a comma-joined
//! `columns` list, and JSON-encoded `sorts` / `filters` lists. The export
//! endpoint takes the same parameters minus pagination, plus `format`.
//!
//! The cache key is a SHA-256 digest over a canonical JSON rendering of the
//! request-relevant state. Struct fields serialize in declaration order and
//! object keys inside filter values are sorted first, so equal states always
//! hash equally. Sort and filter order is significant.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::export::ExportFormat;
use crate::query::{FilterDescriptor, FilterOperator, SortDescriptor, SortDirection};
use crate::state::QueryState;

/// Ordered `(name, value)` query parameters.
pub type QueryParams = Vec<(String, String)>;

#[derive(Serialize)]
struct SortParam<'a> {
    field: &'a str,
    direction: SortDirection,
}

#[derive(Serialize)]
struct FilterParam<'a> {
    field: &'a str,
    operator: FilterOperator,
    value: &'a Value,
}

fn encode_sorts(sorts: &[SortDescriptor]) -> Result<String, ConfigError> {
    let wire: Vec<SortParam<'_>> = sorts
        .iter()
        .map(|s| SortParam {
            field: &s.field,
            direction: s.direction,
        })
        .collect();
    serde_json::to_string(&wire).map_err(|e| ConfigError::Encode {
        param: "sorts",
        message: e.to_string(),
    })
}

fn encode_filters(filters: &[FilterDescriptor]) -> Result<String, ConfigError> {
    let wire: Vec<FilterParam<'_>> = filters
        .iter()
        .map(|f| FilterParam {
            field: &f.field,
            operator: f.operator,
            value: &f.value,
        })
        .collect();
    serde_json::to_string(&wire).map_err(|e| ConfigError::Encode {
        param: "filters",
        message: e.to_string(),
    })
}

/// Parameters shared by the data and export requests.
fn shared_params(state: &QueryState) -> Result<QueryParams, ConfigError> {
    Ok(vec![
        ("sorts".to_string(), encode_sorts(&state.sorts)?),
        ("filters".to_string(), encode_filters(&state.filters)?),
        ("search".to_string(), state.search.clone()),
        ("columns".to_string(), state.visible_columns.join(",")),
    ])
}

/// Encodes the paginated data request for `state`.
///
/// # Errors
///
/// Returns [`ConfigError::Encode`] if a filter value cannot be serialized.
pub fn encode_query(state: &QueryState) -> Result<QueryParams, ConfigError> {
    let mut params = vec![
        ("page".to_string(), state.page.to_string()),
        ("pageSize".to_string(), state.page_size.to_string()),
    ];
    params.extend(shared_params(state)?);
    Ok(params)
}

/// Encodes the full-result export request for `state`. No pagination.
///
/// # Errors
///
/// Returns [`ConfigError::Encode`] if a filter value cannot be serialized.
pub fn encode_export(state: &QueryState, format: ExportFormat) -> Result<QueryParams, ConfigError> {
    let mut params = vec![("format".to_string(), format.extension().to_string())];
    params.extend(shared_params(state)?);
    Ok(params)
}

#[derive(Serialize)]
struct CanonicalFilter<'a> {
    field: &'a str,
    operator: FilterOperator,
    value: Value,
}

/// Rebuilds `value` with object keys inserted in sorted order, so the
/// rendering does not depend on how the map type orders its entries.
fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonical_value(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheKeyInput<'a> {
    query_key: &'a str,
    page: u32,
    page_size: u32,
    sorts: &'a [SortDescriptor],
    filters: Vec<CanonicalFilter<'a>>,
    search: &'a str,
    columns: &'a [String],
}

/// Content-addressed cache key for the data request of `state`.
///
/// `query_key` namespaces the key so two grids reading the same endpoint
/// never share entries. Selection and filter labels do not affect the key.
///
/// # Errors
///
/// Returns [`ConfigError::Encode`] if a filter value cannot be serialized.
pub fn cache_key(query_key: &str, state: &QueryState) -> Result<String, ConfigError> {
    let input = CacheKeyInput {
        query_key,
        page: state.page,
        page_size: state.page_size,
        sorts: &state.sorts,
        filters: state
            .filters
            .iter()
            .map(|f| CanonicalFilter {
                field: &f.field,
                operator: f.operator,
                value: canonical_value(&f.value),
            })
            .collect(),
        search: &state.search,
        columns: &state.visible_columns,
    };
    let canonical = serde_json::to_vec(&input).map_err(|e| ConfigError::Encode {
        param: "cache key",
        message: e.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
