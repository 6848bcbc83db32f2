//! Query engine: filter, sort and paginate a [`Table`] into a [`ResultPage`].
//!
//! Steps run in a fixed order: range filters, substring filters, caption category
//! filter, caption text filter, count, sort, slice. `total` is the count after all
//! filters and before pagination.

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::caption::{CAPTION_CATEGORY_COLUMN, CAPTION_TEXT_COLUMN};
use crate::descriptor::FilterDescriptor;
use crate::error::QueryError;
use crate::table::Table;
use crate::value::{Row, Value};

/// One page of query results in the response shape clients consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub videos: Vec<Row>,
}

/// Observed bounds of a numeric column, used to seed range filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

/// Run `desc` against `table`. The table itself is never modified.
pub fn query(table: &Table, desc: &FilterDescriptor) -> Result<ResultPage, QueryError> {
    desc.validate()?;
    check_columns(table, desc)?;

    let mut lf = table.df().clone().lazy();
    if let Some(predicate) = build_predicate(table, desc) {
        lf = lf.filter(predicate);
    }
    let filtered = lf.collect()?;
    let total = filtered.height();

    let offset = desc.offset();
    let videos = if offset >= total {
        Vec::new()
    } else {
        let sorted = match &desc.sort {
            Some(column) => {
                let descending = desc.order.is_descending();
                let options = SortMultipleOptions {
                    descending: vec![descending],
                    nulls_last: vec![descending],
                    maintain_order: true,
                    ..Default::default()
                };
                filtered
                    .lazy()
                    .sort_by_exprs([col(column.as_str())], options)
                    .collect()?
            }
            None => filtered,
        };
        let page = sorted.slice(offset as i64, desc.page_size);
        frame_rows(&page)?
    };

    debug!(
        total,
        page = desc.page,
        page_size = desc.page_size,
        returned = videos.len(),
        "query evaluated"
    );
    Ok(ResultPage {
        total,
        page: desc.page,
        page_size: desc.page_size,
        videos,
    })
}

/// Min and max of every numeric column that has at least one non-null value.
pub fn column_ranges(table: &Table) -> Result<BTreeMap<String, ColumnRange>, QueryError> {
    let df = table.df();
    let mut ranges = BTreeMap::new();
    for (name, dtype) in table.schema().iter() {
        if !dtype.is_numeric() {
            continue;
        }
        let values = df.column(name.as_str())?.cast(&DataType::Float64)?;
        let values = values.f64()?;
        if let (Some(min), Some(max)) = (values.min(), values.max()) {
            if !min.is_nan() && !max.is_nan() {
                ranges.insert(name.to_string(), ColumnRange { min, max });
            }
        }
    }
    Ok(ranges)
}

/// Every filter and sort column must exist in the table, and range filters need a numeric
/// column.
fn check_columns(table: &Table, desc: &FilterDescriptor) -> Result<(), QueryError> {
    let referenced = desc
        .ranges
        .keys()
        .chain(desc.substrings.keys())
        .chain(desc.sort.iter());
    for column in referenced {
        if !table.has_column(column) {
            return Err(QueryError::UnknownColumn {
                column: column.clone(),
            });
        }
    }
    for column in desc.ranges.keys() {
        let values = table.df().column(column.as_str())?;
        // A column with no values at all is typed as text by the reader; it simply matches nothing
        if !values.dtype().is_numeric() && values.null_count() < values.len() {
            return Err(QueryError::NotNumeric {
                column: column.clone(),
            });
        }
    }
    Ok(())
}

/// Conjunction of all filters in `desc`, or `None` when nothing filters.
fn build_predicate(table: &Table, desc: &FilterDescriptor) -> Option<Expr> {
    let mut final_expr: Option<Expr> = None;
    let mut push = |expr: Expr| {
        final_expr = Some(match final_expr.take() {
            Some(current) => current.and(expr),
            None => expr,
        });
    };

    for (column, bound) in &desc.ranges {
        let value = col(column.as_str()).cast(DataType::Float64);
        let mut expr = value.clone().is_not_null();
        if let Some(min) = bound.min {
            expr = expr.and(value.clone().gt_eq(lit(min)));
        }
        if let Some(max) = bound.max {
            expr = expr.and(value.lt_eq(lit(max)));
        }
        push(expr);
    }

    for (column, needle) in &desc.substrings {
        push(contains_ignore_case(column, needle));
    }

    if let Some(categories) = &desc.caption_filter {
        let mut allowed = categories.iter().filter(|c| !c.is_empty());
        let expr = match allowed.next() {
            None => lit(false),
            Some(first) => allowed.fold(
                col(CAPTION_CATEGORY_COLUMN).eq(lit(first.as_str())),
                |acc, category| acc.or(col(CAPTION_CATEGORY_COLUMN).eq(lit(category.as_str()))),
            ),
        };
        push(expr);
    }

    if let Some(needle) = &desc.text_filter {
        if table.has_column(CAPTION_TEXT_COLUMN) {
            push(contains_ignore_case(CAPTION_TEXT_COLUMN, needle));
        } else {
            // No caption text at all: every value is missing, so nothing matches
            push(lit(false));
        }
    }

    final_expr
}

/// Case-insensitive literal substring match on the string form of `column`. Nulls never match.
fn contains_ignore_case(column: &str, needle: &str) -> Expr {
    let pattern = format!("(?i){}", regex::escape(needle));
    col(column)
        .cast(DataType::String)
        .str()
        .contains(lit(pattern), false)
}

fn frame_rows(df: &DataFrame) -> Result<Vec<Row>, QueryError> {
    let columns = df.get_columns();
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Row::with_capacity(columns.len());
        for column in columns {
            let value = column.get(i)?;
            row.push(column.name().as_str(), Value::from(&value));
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SortOrder;

    fn sample_table() -> Table {
        let df = df!(
            "path" => &["a.mp4", "b.mp4", "c.mp4", "d.mp4"],
            "num_frames" => &[100i64, 200, 300, 400],
            "fps" => &[Some(24.0), Some(30.0), None, Some(60.0)],
            "text" => &[Some("A Dog runs"), Some("No movement"), None, Some("a cat")],
            "aes" => &[Some(4.5), None, Some(5.5), Some(4.5)],
            "caption_category" => &["accepted", "no_movement", "none", "accepted"]
        )
        .unwrap();
        Table::new(df).unwrap()
    }

    fn paths(page: &ResultPage) -> Vec<String> {
        page.videos
            .iter()
            .map(|r| r.get("path").and_then(Value::as_str).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_no_filters_returns_everything() {
        let page = query(&sample_table(), &FilterDescriptor::new(10)).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.videos.len(), 4);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 10);
    }

    #[test]
    fn test_range_filter_on_text_column_fails() {
        let desc = FilterDescriptor::new(10).with_range("text", Some(0.0), Some(100.0));
        match query(&sample_table(), &desc) {
            Err(QueryError::NotNumeric { column }) => assert_eq!(column, "text"),
            other => panic!("expected non-numeric column error, got {:?}", other),
        }

        let blank = df!(
            "path" => &["a.mp4", "b.mp4"],
            "aes" => &[None::<&str>, None]
        )
        .unwrap();
        let desc = FilterDescriptor::new(10).with_range("aes", Some(1.0), None);
        assert_eq!(query(&Table::new(blank).unwrap(), &desc).unwrap().total, 0);
    }

    #[test]
    fn test_range_filter_is_inclusive_and_excludes_nulls() {
        let desc = FilterDescriptor::new(10).with_range("fps", Some(24.0), Some(30.0));
        let page = query(&sample_table(), &desc).unwrap();
        assert_eq!(paths(&page), vec!["a.mp4", "b.mp4"]);

        let desc = FilterDescriptor::new(10).with_range("fps", None, None);
        assert_eq!(query(&sample_table(), &desc).unwrap().total, 3);
    }

    #[test]
    fn test_range_outside_all_values() {
        let desc = FilterDescriptor::new(10).with_range("num_frames", Some(1000.0), None);
        let page = query(&sample_table(), &desc).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.videos.is_empty());
    }

    #[test]
    fn test_substring_filter_ignores_case() {
        let desc = FilterDescriptor::new(10).with_substring("path", "B.MP");
        assert_eq!(paths(&query(&sample_table(), &desc).unwrap()), vec!["b.mp4"]);

        // String coercion of numeric columns
        let desc = FilterDescriptor::new(10).with_substring("num_frames", "00");
        assert_eq!(query(&sample_table(), &desc).unwrap().total, 4);

        // Regex metacharacters are literal
        let desc = FilterDescriptor::new(10).with_substring("path", ".*");
        assert_eq!(query(&sample_table(), &desc).unwrap().total, 0);
    }

    #[test]
    fn test_caption_filter() {
        let desc = FilterDescriptor::new(10).with_caption_filter(["accepted"]);
        assert_eq!(
            paths(&query(&sample_table(), &desc).unwrap()),
            vec!["a.mp4", "d.mp4"]
        );

        let desc = FilterDescriptor::new(10).with_caption_filter(["none", "no_movement"]);
        assert_eq!(query(&sample_table(), &desc).unwrap().total, 2);
    }

    #[test]
    fn test_empty_caption_filter_matches_nothing() {
        let empty: [&str; 0] = [];
        let desc = FilterDescriptor::new(10).with_caption_filter(empty);
        assert_eq!(query(&sample_table(), &desc).unwrap().total, 0);

        let desc = FilterDescriptor::new(10)
            .with_caption_filter([""])
            .with_range("fps", Some(0.0), Some(100.0));
        assert_eq!(query(&sample_table(), &desc).unwrap().total, 0);
    }

    #[test]
    fn test_text_filter() {
        let desc = FilterDescriptor::new(10).with_text_filter("dog");
        assert_eq!(paths(&query(&sample_table(), &desc).unwrap()), vec!["a.mp4"]);
    }

    #[test]
    fn test_text_filter_without_caption_column() {
        let df = df!("path" => &["a.mp4"], "caption_category" => &["none"]).unwrap();
        let table = Table::new(df).unwrap();
        let desc = FilterDescriptor::new(10).with_text_filter("dog");
        assert_eq!(query(&table, &desc).unwrap().total, 0);
    }

    #[test]
    fn test_unknown_columns_are_errors() {
        let desc = FilterDescriptor::new(10).with_range("nope", Some(1.0), None);
        assert!(matches!(
            query(&sample_table(), &desc),
            Err(QueryError::UnknownColumn { column }) if column == "nope"
        ));

        let desc = FilterDescriptor::new(10).with_substring("nope", "x");
        assert!(query(&sample_table(), &desc).is_err());

        let desc = FilterDescriptor::new(10).with_sort("nope", SortOrder::Asc);
        assert!(query(&sample_table(), &desc).is_err());
    }

    #[test]
    fn test_sort_is_stable_and_reversible() {
        let asc = FilterDescriptor::new(10).with_sort("aes", SortOrder::Asc);
        // null first, then the two 4.5s in table order
        assert_eq!(
            paths(&query(&sample_table(), &asc).unwrap()),
            vec!["b.mp4", "a.mp4", "d.mp4", "c.mp4"]
        );

        let desc = FilterDescriptor::new(10).with_sort("aes", SortOrder::Desc);
        assert_eq!(
            paths(&query(&sample_table(), &desc).unwrap()),
            vec!["c.mp4", "a.mp4", "d.mp4", "b.mp4"]
        );
    }

    #[test]
    fn test_pagination_and_out_of_range_page() {
        let desc = FilterDescriptor::new(3).with_page(2, 3);
        let page = query(&sample_table(), &desc).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(paths(&page), vec!["d.mp4"]);

        let desc = FilterDescriptor::new(3).with_page(5, 3);
        let page = query(&sample_table(), &desc).unwrap();
        assert_eq!(page.total, 4);
        assert!(page.videos.is_empty());
    }

    #[test]
    fn test_nulls_are_explicit() {
        let desc = FilterDescriptor::new(10).with_substring("path", "b.mp4");
        let page = query(&sample_table(), &desc).unwrap();
        let row = &page.videos[0];
        assert_eq!(row.get("aes"), Some(&Value::Null));
        assert_eq!(row.len(), 6);
        let json = serde_json::to_value(&page).unwrap();
        assert!(json["videos"][0]["aes"].is_null());
        assert_eq!(json["total"], 1);
    }

    #[test]
    fn test_column_ranges() {
        let ranges = column_ranges(&sample_table()).unwrap();
        assert_eq!(
            ranges.get("num_frames"),
            Some(&ColumnRange {
                min: 100.0,
                max: 400.0
            })
        );
        assert_eq!(ranges["fps"].max, 60.0);
        assert!(!ranges.contains_key("path"));
        assert!(!ranges.contains_key("text"));
    }

    #[test]
    fn test_column_ranges_skip_all_null_columns() {
        let table = Table::empty().unwrap();
        assert!(column_ranges(&table).unwrap().is_empty());
    }
}
