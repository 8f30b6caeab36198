use std::cell::Cell;

use chainplan::chain::SamplingParams;
use chainplan::model::{Model, ReplayModel, StubModel};
use chainplan::repro::{check_reproducibility, DEFAULT_RUNS};
use chainplan::compile;

mod helpers;
use helpers::{copy_fixture, fixture_path, market_inputs, temp_dir};

/// Appends a call counter, so every run differs.
struct DriftingModel {
    calls: Cell<u64>,
}

impl Model for DriftingModel {
    fn invoke(&self, prompt: &str, _params: &SamplingParams) -> anyhow::Result<String> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        Ok(format!("{prompt} #{n}"))
    }
}

#[test]
fn hundred_stub_runs_yield_one_hash() {
    let dir = temp_dir();
    let source = copy_fixture(dir.path(), "static_reasoning_chain.yaml");
    let artifact = compile(&source).expect("compile").artifact_path;

    let report =
        check_reproducibility(&artifact, &market_inputs(), DEFAULT_RUNS, &StubModel).expect("repro");
    assert_eq!(report.runs(), 100);
    assert!(report.is_reproducible(), "unique: {:?}", report.unique());
}

#[test]
fn scoring_chain_is_reproducible_with_replay() {
    let dir = temp_dir();
    let source = copy_fixture(dir.path(), "risk_scoring_chain.yaml");
    let artifact = compile(&source).expect("compile").artifact_path;
    let model = ReplayModel::from_file(&fixture_path("risk_scoring.replay.yaml")).expect("replay");

    let report = check_reproducibility(&artifact, &market_inputs(), 25, &model).expect("repro");
    assert!(report.is_reproducible());
    assert_eq!(
        report.hashes[0],
        chainplan::signing::sha256_hex(br#"{"avg": 0.8, "scores": [0.8]}"#)
    );
}

#[test]
fn nondeterministic_model_is_detected() {
    let dir = temp_dir();
    let source = copy_fixture(dir.path(), "static_reasoning_chain.yaml");
    let artifact = compile(&source).expect("compile").artifact_path;

    let model = DriftingModel { calls: Cell::new(0) };
    let report = check_reproducibility(&artifact, &market_inputs(), 5, &model).expect("repro");
    assert!(!report.is_reproducible());
    assert_eq!(report.unique().len(), 5);
}
