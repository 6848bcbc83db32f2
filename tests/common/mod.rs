#![allow(dead_code)]

use dsbrowse::{FilterDescriptor, ResultPage, Table, Value};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write `df` as a CSV file named `name` inside `dir`.
pub fn write_csv(dir: &Path, name: &str, df: &mut DataFrame) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
    path
}

/// A directory with one source file of `n` clips whose frame counts run from 101 upwards.
pub fn sequential_clips_dir(n: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut df = df!(
        "path" => (0..n).map(|i| format!("/clips/clip_{:03}.mp4", i)).collect::<Vec<_>>(),
        "num_frames" => (0..n).map(|i| 101 + i as i64).collect::<Vec<_>>(),
        "bucket" => (0..n).map(|i| (i % 4) as i64).collect::<Vec<_>>(),
        "text" => (0..n)
            .map(|i| match i % 5 {
                0 => "Not enough information to describe".to_string(),
                1 => "Single image of a street".to_string(),
                2 => "No movement in the frame".to_string(),
                _ => format!("A dog runs across field {}", i),
            })
            .collect::<Vec<_>>()
    )
    .unwrap();
    write_csv(dir.path(), "meta_info.csv", &mut df);
    dir
}

pub fn load(dir: &Path) -> Table {
    Table::from_dir(dir, &dsbrowse::LoadOptions::default()).unwrap()
}

/// Run a query string against `table`.
pub fn run(table: &Table, query: &str) -> ResultPage {
    let desc = FilterDescriptor::from_query_string(query, 10).unwrap();
    dsbrowse::query::query(table, &desc).unwrap()
}

pub fn paths(page: &ResultPage) -> Vec<String> {
    page.videos
        .iter()
        .map(|row| match row.get("path") {
            Some(Value::Str(p)) => p.clone(),
            other => panic!("row without a string path: {:?}", other),
        })
        .collect()
}
