use dsbrowse::{FilterDescriptor, QueryError, Value};
use std::collections::HashSet;

mod common;
use common::{load, paths, run, sequential_clips_dir};

#[test]
fn test_fifty_clip_scenario() {
    let dir = sequential_clips_dir(50);
    let table = load(dir.path());

    let page = run(&table, "page=1&page_size=10");
    assert_eq!(page.total, 50);
    assert_eq!(page.videos.len(), 10);

    let page = run(&table, "page=10&page_size=10");
    assert_eq!(page.total, 50);
    assert_eq!(page.videos.len(), 0);

    let page = run(&table, "page=1&page_size=20");
    assert_eq!(page.videos.len(), 20);

    // Defaults: page 1 of 10
    let page = run(&table, "");
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 10);
    assert_eq!(paths(&page)[0], "clip_000.mp4");
}

#[test]
fn test_page_length_formula_and_partition() {
    let dir = sequential_clips_dir(50);
    let table = load(dir.path());
    let queries = ["", "filters[num_frames][0]=120", "caption_filters=accepted,none"];

    for base in queries {
        for page_size in [1usize, 3, 7, 10, 50, 64] {
            let mut seen = Vec::new();
            let mut total = None;
            let mut page_no = 1;
            loop {
                let page = run(
                    &table,
                    &format!("{}&page={}&page_size={}", base, page_no, page_size),
                );
                let total = *total.get_or_insert(page.total);
                assert_eq!(page.total, total);

                let skipped = (page_no - 1) * page_size;
                let expected = page_size.min(total.saturating_sub(skipped));
                assert_eq!(page.videos.len(), expected, "{} page {}", base, page_no);

                if page.videos.is_empty() {
                    break;
                }
                seen.extend(paths(&page));
                page_no += 1;
            }

            let unique: HashSet<&String> = seen.iter().collect();
            assert_eq!(seen.len(), total.unwrap_or(0));
            assert_eq!(unique.len(), seen.len(), "a row appeared on two pages");
        }
    }
}

#[test]
fn test_range_outside_data_is_empty() {
    let dir = sequential_clips_dir(50);
    let table = load(dir.path());

    let page = run(&table, "filters[num_frames][0]=1000&filters[num_frames][1]=2000");
    assert_eq!(page.total, 0);

    let page = run(&table, "filters[num_frames][0]=110&filters[num_frames][1]=119");
    assert_eq!(page.total, 10);
}

#[test]
fn test_sort_reversal_keeps_ties_in_order() {
    let dir = sequential_clips_dir(20);
    let table = load(dir.path());

    let asc = run(&table, "sort=bucket&order=asc&page_size=20");
    let desc = run(&table, "sort=bucket&order=desc&page_size=20");

    let bucket = |row: &dsbrowse::Row| match row.get("bucket") {
        Some(Value::Int(b)) => *b,
        other => panic!("unexpected bucket {:?}", other),
    };
    let asc_keys: Vec<i64> = asc.videos.iter().map(bucket).collect();
    let desc_keys: Vec<i64> = desc.videos.iter().map(bucket).collect();
    let mut reversed = asc_keys.clone();
    reversed.reverse();
    assert_eq!(desc_keys, reversed);

    // Within a bucket both directions keep the unsorted (path) order
    for b in 0..4 {
        let in_bucket = |page: &dsbrowse::ResultPage| -> Vec<String> {
            page.videos
                .iter()
                .filter(|row| bucket(*row) == b)
                .map(|row| row.get("path").and_then(Value::as_str).unwrap().to_string())
                .collect()
        };
        let asc_paths = in_bucket(&asc);
        let mut sorted = asc_paths.clone();
        sorted.sort();
        assert_eq!(asc_paths, sorted);
        assert_eq!(in_bucket(&desc), asc_paths);
    }
}

#[test]
fn test_empty_caption_filter_always_empty() {
    let dir = sequential_clips_dir(50);
    let table = load(dir.path());

    for query in [
        "caption_filters=",
        "caption_filters=&filters[num_frames][0]=0",
        "caption_filters=&text_filter=dog&sort=num_frames",
    ] {
        assert_eq!(run(&table, query).total, 0, "{}", query);
    }
}

#[test]
fn test_caption_and_text_filters() {
    let dir = sequential_clips_dir(50);
    let table = load(dir.path());

    // Every fifth clip per category
    assert_eq!(run(&table, "caption_filters=single_image").total, 10);
    assert_eq!(run(&table, "caption_filters=no_movement,single_image").total, 20);
    assert_eq!(run(&table, "caption_filters=accepted").total, 20);
    assert_eq!(run(&table, "text_filter=DOG").total, 20);
    assert_eq!(
        run(&table, "caption_filters=accepted&text_filter=field+3").total,
        run(&table, "text_filter=field%203").total
    );
}

#[test]
fn test_unknown_columns_fail() {
    let dir = sequential_clips_dir(5);
    let table = load(dir.path());

    for query in ["filters[fsp][0]=1", "filters[fsp]=x", "sort=fsp"] {
        let desc = FilterDescriptor::from_query_string(query, 10).unwrap();
        match dsbrowse::query::query(&table, &desc) {
            Err(QueryError::UnknownColumn { column }) => assert_eq!(column, "fsp"),
            other => panic!("{}: expected unknown column, got {:?}", query, other),
        }
    }
}

#[test]
fn test_range_on_text_column_is_rejected() {
    let dir = sequential_clips_dir(5);
    let table = load(dir.path());

    let desc =
        FilterDescriptor::from_query_string("filters[text][0]=0&filters[text][1]=100", 10).unwrap();
    let err = dsbrowse::query::query(&table, &desc).unwrap_err();
    assert!(matches!(err, QueryError::NotNumeric { ref column } if column == "text"));
    assert!(dsbrowse::Error::from(err).is_client_error());

    // Substring filters on the same column still work
    assert_eq!(run(&table, "filters[text]=dog").total, 2);
}

#[test]
fn test_missing_values_serialize_as_null() {
    let dir = sequential_clips_dir(3);
    let table = load(dir.path());
    let page = run(&table, "");
    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["total"], 3);
    assert!(json["videos"][0]["aes"].is_null());
    assert_eq!(json["videos"][0]["caption_category"], "not_enough_information");
}
