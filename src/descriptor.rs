//! Filter descriptors: the parsed filter, sort and pagination parameters of one query.
//!
//! Descriptors are usually parsed from a URL query string:
//!
//! ```text
//! filters[fps][0]=24&filters[fps][1]=60&filters[path]=beach
//!     &caption_filters=accepted,no_movement&text_filter=dog
//!     &sort=aes&order=desc&page=2&page_size=20
//! ```
//!
//! `filters[<column>][0]` and `filters[<column>][1]` are inclusive numeric bounds,
//! `filters[<column>]` is a case-insensitive substring filter.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;

use crate::error::QueryError;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Which part of a `filters[...]` parameter a key addresses.
#[derive(Debug, PartialEq, Eq)]
enum FilterKey<'a> {
    Substring(&'a str),
    Min(&'a str),
    Max(&'a str),
}

fn parse_filter_key(key: &str) -> Option<FilterKey<'_>> {
    let rest = key.strip_prefix("filters[")?;
    let (column, tail) = rest.split_once(']')?;
    if column.is_empty() {
        return None;
    }
    match tail {
        "" => Some(FilterKey::Substring(column)),
        "[0]" => Some(FilterKey::Min(column)),
        "[1]" => Some(FilterKey::Max(column)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn is_descending(self) -> bool {
        self == SortOrder::Desc
    }
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(QueryError::InvalidParameter {
                name: "order".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

/// Inclusive numeric bounds; a missing side is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeBound {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDescriptor {
    pub ranges: BTreeMap<String, RangeBound>,
    pub substrings: BTreeMap<String, String>,
    /// `None` applies no caption filtering; `Some` with no categories matches nothing
    pub caption_filter: Option<Vec<String>>,
    pub text_filter: Option<String>,
    pub sort: Option<String>,
    pub order: SortOrder,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl FilterDescriptor {
    /// First page, no filters, no sort.
    pub fn new(page_size: usize) -> Self {
        Self {
            ranges: BTreeMap::new(),
            substrings: BTreeMap::new(),
            caption_filter: None,
            text_filter: None,
            sort: None,
            order: SortOrder::Asc,
            page: 1,
            page_size,
        }
    }

    pub fn with_range(mut self, column: &str, min: Option<f64>, max: Option<f64>) -> Self {
        self.ranges
            .insert(column.to_string(), RangeBound { min, max });
        self
    }

    pub fn with_substring(mut self, column: &str, needle: &str) -> Self {
        self.substrings
            .insert(column.to_string(), needle.to_string());
        self
    }

    pub fn with_caption_filter<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caption_filter = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_text_filter(mut self, needle: &str) -> Self {
        self.text_filter = Some(needle.to_string());
        self
    }

    pub fn with_sort(mut self, column: &str, order: SortOrder) -> Self {
        self.sort = Some(column.to_string());
        self.order = order;
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Parse a URL query string (with or without the leading `?`).
    pub fn from_query_string(query: &str, default_page_size: usize) -> Result<Self, QueryError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            });
        Self::from_pairs(pairs, default_page_size)
    }

    /// Build a descriptor from already-decoded key/value pairs. Later keys win.
    pub fn from_pairs<I, K, V>(pairs: I, default_page_size: usize) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut desc = Self::new(default_page_size);
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "caption_filters" => {
                    desc.caption_filter = Some(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|c| !c.is_empty())
                            .map(str::to_string)
                            .collect(),
                    );
                }
                "text_filter" => {
                    desc.text_filter = non_empty(value);
                }
                "sort" => desc.sort = non_empty(value),
                "order" => desc.order = value.parse()?,
                "page" => desc.page = parse_count("page", value)?,
                "page_size" => desc.page_size = parse_count("page_size", value)?,
                _ => match parse_filter_key(key) {
                    Some(FilterKey::Min(column)) => {
                        desc.ranges.entry(column.to_string()).or_default().min =
                            parse_bound(column, value)?;
                    }
                    Some(FilterKey::Max(column)) => {
                        desc.ranges.entry(column.to_string()).or_default().max =
                            parse_bound(column, value)?;
                    }
                    Some(FilterKey::Substring(column)) => {
                        if !value.is_empty() {
                            desc.substrings
                                .insert(column.to_string(), value.to_string());
                        }
                    }
                    // Not a query parameter
                    None => {}
                },
            }
        }
        desc.validate()?;
        Ok(desc)
    }

    /// Check pagination parameters. Column names are checked against a table at query time.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.page < 1 {
            return Err(QueryError::InvalidParameter {
                name: "page".to_string(),
                value: self.page.to_string(),
            });
        }
        if self.page_size < 1 {
            return Err(QueryError::InvalidParameter {
                name: "page_size".to_string(),
                value: self.page_size.to_string(),
            });
        }
        Ok(())
    }

    /// Offset of the first row of the requested page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

fn decode(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_decode_str(&s).decode_utf8_lossy().into_owned()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_count(name: &str, value: &str) -> Result<usize, QueryError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        })
}

/// An empty bound leaves that side open.
fn parse_bound(column: &str, value: &str) -> Result<Option<f64>, QueryError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(v) if !v.is_nan() => Ok(Some(v)),
        _ => Err(QueryError::InvalidBound {
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}
