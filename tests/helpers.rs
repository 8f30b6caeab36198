#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chainplan::{InputValue, Inputs};
use tempfile::TempDir;

pub fn fixture_path(rel: &str) -> PathBuf {
    // Robust: works regardless of where tests are run from.
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(rel)
}

pub fn temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("chainplan-test-")
        .tempdir()
        .expect("create temp dir")
}

pub fn write_file(dir: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(&path, contents).expect("write file");
    path
}

/// Copy a fixture into `dir` so compilation writes its artifact there.
pub fn copy_fixture(dir: &Path, name: &str) -> PathBuf {
    let contents = fs::read_to_string(fixture_path(name)).expect("read fixture");
    write_file(dir, name, &contents)
}

pub fn inputs(pairs: &[(&str, InputValue)]) -> Inputs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Bindings used by the market fixtures.
pub fn market_inputs() -> Inputs {
    inputs(&[
        ("current_date", InputValue::from("2025-11-20")),
        ("current_price_usd", InputValue::from(93000_i64)),
    ])
}

pub fn load_yaml(path: &Path) -> serde_yaml::Value {
    let text = fs::read_to_string(path).expect("read yaml");
    serde_yaml::from_str(&text).expect("parse yaml")
}
