//! Property-based invariants of the aggregation pass.
//!
//! For any result store:
//!
//! 1. perfect contracts <= perfect tests <= compiled records, per prompt and
//!    per model.
//! 2. Compile ratio and average pass ratio stay within [0, 100].
//! 3. ok + ko + generation errors equals the number of stored records.
//! 4. The severity buckets sum to the number of analyzer markers emitted by
//!    compiled records.
//! 5. Model counters equal the sum of their per-prompt counters.
//! 6. Aggregating a store reloaded from disk reproduces the same statistics
//!    and the same bytes.

use proptest::prelude::*;
use serde_json::{Map, json};
use solbench::aggregate::aggregate;
use solbench::severity::{CATALOG, marker_for};
use solbench::store::{ResultStore, RunRecord};
use solbench::tools::{ToolOutcome, Verification};
use tempfile::tempdir;

// ── Strategies ────────────────────────────────────────────────────────────

/// Catalog ids whose marker is not a prefix of another id's marker, so each
/// emitted marker is counted exactly once.
fn unambiguous_checks() -> Vec<&'static str> {
    CATALOG
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| {
            !CATALOG
                .iter()
                .any(|(other, _)| *other != *id && other.starts_with(*id))
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Shape {
    Error,
    Completed {
        compile_code: i32,
        markers: Vec<(usize, usize)>,
        passing: u32,
        failing: u32,
        test_code: i32,
        duration_ns: u64,
    },
}

fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        1 => Just(Shape::Error),
        4 => (
            prop_oneof![3 => Just(0), 1 => Just(1)],
            prop::collection::vec((0usize..1000, 1usize..4), 0..4),
            0u32..20,
            0u32..4,
            prop_oneof![Just(0), Just(1)],
            0u64..5_000_000_000,
        )
            .prop_map(
                |(compile_code, markers, passing, failing, test_code, duration_ns)| {
                    Shape::Completed {
                        compile_code,
                        markers,
                        passing,
                        failing,
                        test_code,
                        duration_ns,
                    }
                }
            ),
    ]
}

/// model -> prompt -> iterations.
fn store_layout() -> impl Strategy<Value = Vec<Vec<Vec<Shape>>>> {
    prop::collection::vec(
        prop::collection::vec(prop::collection::vec(shape(), 1..4), 1..4),
        1..3,
    )
}

fn outcome(return_code: i32, stdout: String, stderr: String) -> ToolOutcome {
    ToolOutcome {
        return_code,
        stdout,
        stderr,
    }
}

/// Builds the record and returns how many analyzer markers it should count.
fn build_record(shape: &Shape, checks: &[&str]) -> (RunRecord, u64) {
    let Shape::Completed {
        compile_code,
        markers,
        passing,
        failing,
        test_code,
        duration_ns,
    } = shape
    else {
        return (RunRecord::generation_error(), 0);
    };

    let mut stderr = String::from("INFO:Detectors:\n");
    let mut emitted = 0_u64;
    for (index, count) in markers {
        let check = checks[index % checks.len()];
        for _ in 0..*count {
            stderr.push_str(&format!("Reference: {}\n", marker_for(check)));
            emitted += 1;
        }
    }
    let testing_stdout = format!("  {passing} passing (1s)\n  {failing} failing\n");

    let mut infos = Map::new();
    infos.insert("total_duration".to_string(), json!(duration_ns));
    let record = RunRecord::completed(
        "```solidity\ncontract A {}\n```".to_string(),
        infos,
        "0".repeat(64),
        Verification {
            compilation: outcome(*compile_code, String::new(), String::new()),
            slither: outcome(0, String::new(), stderr),
            testing: outcome(*test_code, testing_stdout, String::new()),
        },
    );
    let counted = if *compile_code == 0 { emitted } else { 0 };
    (record, counted)
}

fn build_store(layout: &[Vec<Vec<Shape>>]) -> (ResultStore, u64, usize) {
    let checks = unambiguous_checks();
    let mut store = ResultStore::new();
    let mut markers = 0_u64;
    let mut records = 0_usize;
    for (model_index, prompts) in layout.iter().enumerate() {
        let model = format!("model-{model_index}");
        store.ensure_model(&model);
        for (prompt_index, iterations) in prompts.iter().enumerate() {
            let prompt = format!("prompt-{prompt_index}");
            for (iteration, shape) in iterations.iter().enumerate() {
                let (record, counted) = build_record(shape, &checks);
                markers += counted;
                records += 1;
                store.insert(&model, &prompt, iteration as u32, record);
            }
        }
    }
    (store, markers, records)
}

proptest! {
    #[test]
    fn counters_are_nested_and_ratios_bounded(layout in store_layout()) {
        let (store, _, _) = build_store(&layout);
        let statistics = aggregate(&store);

        for (model, stats) in &statistics.models {
            prop_assert!(stats.perfect_contract <= stats.perfect_tests, "{model}");
            prop_assert!(stats.perfect_tests <= stats.compilation.ok, "{model}");
            prop_assert!(stats.zero_vulnerability <= stats.compilation.ok, "{model}");
            prop_assert!((0.0..=100.0).contains(&stats.compilation.ratio), "{model}");
            prop_assert!((0.0..=100.0).contains(&stats.total_ratio), "{model}");

            for (prompt, detail) in &stats.details {
                prop_assert!(detail.perfect_contract <= detail.perfect_tests, "{model}/{prompt}");
                prop_assert!(detail.perfect_tests <= detail.compilation.ok, "{model}/{prompt}");
                prop_assert!((0.0..=100.0).contains(&detail.compilation.ratio));
                prop_assert!((0.0..=100.0).contains(&detail.total_ratio));
            }
        }
    }

    #[test]
    fn every_record_lands_in_exactly_one_bucket(layout in store_layout()) {
        let (store, markers, records) = build_store(&layout);
        let statistics = aggregate(&store);

        let bucketed: u64 = statistics
            .models
            .values()
            .map(|stats| stats.compilation.ok + stats.compilation.ko + stats.generation.errors)
            .sum();
        prop_assert_eq!(bucketed, records as u64);
        prop_assert_eq!(
            statistics.models.values().map(|stats| stats.generation.errors).sum::<u64>(),
            store.error_count() as u64
        );

        let severities: u64 = statistics
            .models
            .values()
            .map(|stats| stats.vulnerability.total())
            .sum();
        prop_assert_eq!(severities, markers);
    }

    #[test]
    fn model_counters_sum_prompt_counters(layout in store_layout()) {
        let (store, _, _) = build_store(&layout);
        let statistics = aggregate(&store);

        for stats in statistics.models.values() {
            let details = stats.details.values();
            prop_assert_eq!(
                stats.compilation.ok,
                details.clone().map(|detail| detail.compilation.ok).sum::<u64>()
            );
            prop_assert_eq!(
                stats.compilation.ko,
                details.clone().map(|detail| detail.compilation.ko).sum::<u64>()
            );
            prop_assert_eq!(
                stats.perfect_contract,
                details.clone().map(|detail| detail.perfect_contract).sum::<u64>()
            );
            prop_assert_eq!(
                stats.vulnerability.total(),
                details.map(|detail| detail.vulnerability.total()).sum::<u64>()
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reloaded_store_aggregates_identically(layout in store_layout()) {
        let (store, _, _) = build_store(&layout);
        let temp = tempdir().expect("tempdir");
        let data = temp.path().join("data.json");
        store.save(&data).expect("save store");

        let first = aggregate(&store);
        let second = aggregate(&ResultStore::load(&data).expect("load store"));
        prop_assert_eq!(&first, &second);

        let first_path = temp.path().join("first.json");
        let second_path = temp.path().join("second.json");
        first.save(&first_path).expect("save first");
        second.save(&second_path).expect("save second");
        prop_assert_eq!(
            std::fs::read(&first_path).expect("read first"),
            std::fs::read(&second_path).expect("read second")
        );
    }
}
