//! React-Admin list conventions (`ra-data-simple-rest`).
//!
//! Lists take three JSON-encoded query parameters:
//!
//! ```text
//! range=[0,24]              inclusive row indices
//! sort=["name","ASC"]       field and direction
//! filter={"q":"masa","id":[1,2]}
//! ```
//!
//! and answer with the rows plus `Content-Range: <resource> <first>-<last>/<total>`.

use axum::{
    Json,
    http::{HeaderValue, header::HeaderName},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::Page;
use crate::error::AppError;

/// Largest page served, whatever the requested range.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Range used when the client sends none.
const DEFAULT_RANGE: (i64, i64) = (0, 9);

/// Raw list query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub range: Option<String>,
    pub sort: Option<String>,
    pub filter: Option<String>,
}

/// Sortable fields of a resource: API field name and SQL column.
pub struct SortFields {
    pub fields: &'static [(&'static str, &'static str)],
    pub default_field: &'static str,
    pub default_descending: bool,
}

/// Parsed list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: Page,
    pub filter: Map<String, Value>,
}

impl ListQuery {
    /// Parse and validate list parameters against a resource's sort fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for malformed JSON, negative or
    /// inverted ranges and fields outside the whitelist.
    pub fn parse(params: &ListParams, sortable: &SortFields) -> Result<Self, AppError> {
        let (start, end) = match params.range.as_deref() {
            Some(raw) => parse_range(raw)?,
            None => DEFAULT_RANGE,
        };
        // Clamp before adding one: `[0, i64::MAX]` is a valid, huge range
        let limit = end
            .checked_sub(start)
            .ok_or_else(|| AppError::BadRequest("Invalid range parameter".to_string()))?
            .min(MAX_PAGE_SIZE - 1)
            + 1;

        let (sort_column, descending) = match params.sort.as_deref() {
            Some(raw) => parse_sort(raw, sortable)?,
            None => (column_for(sortable, sortable.default_field)?, sortable.default_descending),
        };

        let filter = match params.filter.as_deref() {
            Some(raw) => parse_filter(raw)?,
            None => Map::new(),
        };

        Ok(Self {
            page: Page {
                offset: start,
                limit,
                sort_column,
                descending,
            },
            filter,
        })
    }

    /// `filter.id` as a list of ids (React-Admin `getMany`).
    ///
    /// Accepts a single id or an array; numbers and numeric strings both work.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if an id is not an integer.
    pub fn ids(&self) -> Result<Vec<i32>, AppError> {
        match self.filter.get("id") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(values)) => values.iter().map(|v| as_id("id", v)).collect(),
            Some(value) => Ok(vec![as_id("id", value)?]),
        }
    }

    /// A free-text filter, `None` when absent or blank.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.filter.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// An integer id filter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if the value is not an integer.
    pub fn id(&self, key: &str) -> Result<Option<i32>, AppError> {
        match self.filter.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(value) => as_id(key, value).map(Some),
        }
    }

    /// A boolean filter; accepts `true`/`false` and their string forms.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for any other value.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, AppError> {
        match self.filter.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) if s == "true" => Ok(Some(true)),
            Some(Value::String(s)) if s == "false" => Ok(Some(false)),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(_) => Err(AppError::BadRequest(format!("Filter {key} must be a boolean"))),
        }
    }
}

fn parse_range(raw: &str) -> Result<(i64, i64), AppError> {
    let invalid = || AppError::BadRequest("Invalid range parameter".to_string());
    let [start, end]: [i64; 2] = serde_json::from_str(raw).map_err(|_| invalid())?;
    if start < 0 || end < start {
        return Err(invalid());
    }
    Ok((start, end))
}

fn parse_sort(raw: &str, sortable: &SortFields) -> Result<(&'static str, bool), AppError> {
    let [field, order]: [String; 2] = serde_json::from_str(raw)
        .map_err(|_| AppError::BadRequest("Invalid sort parameter".to_string()))?;

    let descending = match order.to_ascii_uppercase().as_str() {
        "ASC" => false,
        "DESC" => true,
        _ => {
            return Err(AppError::BadRequest(format!(
                "Invalid sort order: {order}"
            )));
        }
    };
    Ok((column_for(sortable, &field)?, descending))
}

fn column_for(sortable: &SortFields, field: &str) -> Result<&'static str, AppError> {
    sortable
        .fields
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, column)| *column)
        .ok_or_else(|| AppError::BadRequest(format!("Cannot sort by {field}")))
}

fn parse_filter(raw: &str) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(AppError::BadRequest(
            "Invalid filter parameter".to_string(),
        )),
    }
}

fn as_id(key: &str, value: &Value) -> Result<i32, AppError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AppError::BadRequest(format!("Filter {key} must be an integer id")))
}

/// `Content-Range` value for a page of `returned` rows starting at `start`.
#[must_use]
pub fn content_range(resource: &str, start: i64, returned: usize, total: i64) -> String {
    if returned == 0 {
        return format!("{resource} 0-0/{total}");
    }
    let returned = i64::try_from(returned).unwrap_or(i64::MAX);
    format!("{resource} {start}-{}/{total}", start.saturating_add(returned - 1))
}

/// A list response with its `Content-Range` header.
pub struct ListResponse<T> {
    pub resource: &'static str,
    pub start: i64,
    pub total: i64,
    pub rows: Vec<T>,
}

impl<T> ListResponse<T> {
    #[must_use]
    pub fn new(resource: &'static str, query: &ListQuery, rows: Vec<T>, total: i64) -> Self {
        Self {
            resource,
            start: query.page.offset,
            total,
            rows,
        }
    }
}

impl<T: Serialize> IntoResponse for ListResponse<T> {
    fn into_response(self) -> Response {
        let range = content_range(self.resource, self.start, self.rows.len(), self.total);
        let mut response = Json(self.rows).into_response();
        if let Ok(value) = HeaderValue::from_str(&range) {
            response
                .headers_mut()
                .insert(HeaderName::from_static("content-range"), value);
        }
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SORT: SortFields = SortFields {
        fields: &[("id", "id"), ("name", "name"), ("created_at", "created_at")],
        default_field: "id",
        default_descending: false,
    };

    fn params(range: Option<&str>, sort: Option<&str>, filter: Option<&str>) -> ListParams {
        ListParams {
            range: range.map(String::from),
            sort: sort.map(String::from),
            filter: filter.map(String::from),
        }
    }

    #[test]
    fn test_defaults() {
        let query = ListQuery::parse(&ListParams::default(), &SORT).unwrap();
        assert_eq!(
            query.page,
            Page {
                offset: 0,
                limit: 10,
                sort_column: "id",
                descending: false
            }
        );
        assert!(query.filter.is_empty());
    }

    #[test]
    fn test_range() {
        let query = ListQuery::parse(&params(Some("[25,49]"), None, None), &SORT).unwrap();
        assert_eq!(query.page.offset, 25);
        assert_eq!(query.page.limit, 25);

        let query = ListQuery::parse(&params(Some("[0,999]"), None, None), &SORT).unwrap();
        assert_eq!(query.page.limit, MAX_PAGE_SIZE);

        for bad in ["[5,2]", "[-1,4]", "[0]", "0-9", "[\"a\",\"b\"]"] {
            assert!(
                ListQuery::parse(&params(Some(bad), None, None), &SORT).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_range_extremes() {
        let whole = format!("[0,{}]", i64::MAX);
        let query = ListQuery::parse(&params(Some(&whole), None, None), &SORT).unwrap();
        assert_eq!(query.page.offset, 0);
        assert_eq!(query.page.limit, MAX_PAGE_SIZE);

        let tail = format!("[{},{}]", i64::MAX - 1, i64::MAX);
        let query = ListQuery::parse(&params(Some(&tail), None, None), &SORT).unwrap();
        assert_eq!(query.page.offset, i64::MAX - 1);
        assert_eq!(query.page.limit, 2);

        let one = format!("[{0},{0}]", i64::MAX);
        let query = ListQuery::parse(&params(Some(&one), None, None), &SORT).unwrap();
        assert_eq!(query.page.limit, 1);

        let past = format!("[0,{}]", u64::MAX);
        let err = ListQuery::parse(&params(Some(&past), None, None), &SORT).unwrap_err();
        assert_eq!(err.to_string(), "Invalid range parameter");
    }

    #[test]
    fn test_sort() {
        let query =
            ListQuery::parse(&params(None, Some(r#"["name","desc"]"#), None), &SORT).unwrap();
        assert_eq!(query.page.sort_column, "name");
        assert!(query.page.descending);

        let err = ListQuery::parse(&params(None, Some(r#"["password_hash","ASC"]"#), None), &SORT)
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot sort by password_hash");

        assert!(ListQuery::parse(&params(None, Some(r#"["name","UP"]"#), None), &SORT).is_err());
        assert!(ListQuery::parse(&params(None, Some("name"), None), &SORT).is_err());
    }

    #[test]
    fn test_default_sort_descending() {
        let sortable = SortFields {
            default_field: "created_at",
            default_descending: true,
            ..SORT
        };
        let query = ListQuery::parse(&ListParams::default(), &sortable).unwrap();
        assert_eq!(query.page.sort_column, "created_at");
        assert!(query.page.descending);
    }

    #[test]
    fn test_filter_values() {
        let query = ListQuery::parse(
            &params(
                None,
                None,
                Some(r#"{"id":[1,"2"],"q":"  masa ","category_id":"3","is_active":"false"}"#),
            ),
            &SORT,
        )
        .unwrap();
        assert_eq!(query.ids().unwrap(), vec![1, 2]);
        assert_eq!(query.text("q").as_deref(), Some("masa"));
        assert_eq!(query.id("category_id").unwrap(), Some(3));
        assert_eq!(query.flag("is_active").unwrap(), Some(false));
        assert_eq!(query.text("missing"), None);
        assert_eq!(query.flag("missing").unwrap(), None);
    }

    #[test]
    fn test_filter_single_id_and_errors() {
        let query = ListQuery::parse(&params(None, None, Some(r#"{"id":7}"#)), &SORT).unwrap();
        assert_eq!(query.ids().unwrap(), vec![7]);

        let query =
            ListQuery::parse(&params(None, None, Some(r#"{"id":["x"],"is_active":1}"#)), &SORT)
                .unwrap();
        assert!(query.ids().is_err());
        assert!(query.flag("is_active").is_err());

        assert!(ListQuery::parse(&params(None, None, Some("[1,2]")), &SORT).is_err());
        assert!(ListQuery::parse(&params(None, None, Some("{oops")), &SORT).is_err());
    }

    #[test]
    fn test_content_range() {
        assert_eq!(content_range("products", 0, 10, 42), "products 0-9/42");
        assert_eq!(content_range("products", 40, 2, 42), "products 40-41/42");
        assert_eq!(content_range("orders", 0, 0, 0), "orders 0-0/0");
        assert_eq!(
            content_range("users", i64::MAX - 1, 5, 3),
            format!("users {}-{}/3", i64::MAX - 1, i64::MAX)
        );
    }

    #[test]
    fn test_list_response_header() {
        let query = ListQuery::parse(&params(Some("[10,19]"), None, None), &SORT).unwrap();
        let response = ListResponse::new("users", &query, vec![1, 2, 3], 13).into_response();
        assert_eq!(response.headers()["content-range"], "users 10-12/13");
    }
}
