// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

mod common;
use crate::common::{runner, Behaviour, SpyExecutor};

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pipewright::{PipelineSpec, RunStatus, StageGraph, StageSpec, StageStatus};

/// A random acyclic pipeline: stage `i` may only depend on stages before it
fn dag_strategy(max_stages: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_stages).prop_flat_map(|count| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), count).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect()
            },
        )
    })
}

fn pipeline_from(deps: &[BTreeSet<usize>], concurrency: usize) -> PipelineSpec {
    let stages = deps
        .iter()
        .enumerate()
        .map(|(i, before)| {
            StageSpec::command(format!("s{}", i), "true", Vec::<String>::new())
                .after(before.iter().map(|d| format!("s{}", d)))
        })
        .collect();
    PipelineSpec::new("generated", stages).with_concurrency(concurrency)
}

/// Whether stage `i` or anything upstream of it fails
fn blocked(i: usize, deps: &[BTreeSet<usize>], failing: &BTreeSet<usize>) -> bool {
    failing.contains(&i) || deps[i].iter().any(|d| blocked(*d, deps, failing))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn scheduler_honours_dependencies(
        deps in dag_strategy(10),
        failing in proptest::collection::btree_set(0..10usize, 0..3),
        concurrency in 1..4usize,
    ) {
        let failing: BTreeSet<usize> = failing.into_iter().filter(|i| *i < deps.len()).collect();

        let mut spy = SpyExecutor::new().with_delay(Duration::from_millis(1));
        for i in &failing {
            spy = spy.with(&format!("s{}", i), Behaviour::Fail(1));
        }
        let spy = Arc::new(spy);
        let pipeline = pipeline_from(&deps, concurrency);

        let root = tempfile::tempdir().unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let report = rt
            .block_on(runner(root.path(), spy.clone()).execute(&pipeline))
            .unwrap();

        // Every stage ends terminal, exactly once
        prop_assert_eq!(report.stages.len(), deps.len());
        prop_assert!(report.stages.iter().all(|s| s.status.is_terminal()));

        for (i, before) in deps.iter().enumerate() {
            let name = format!("s{}", i);
            let status = report.status_of(&name).unwrap();
            let upstream_failed = before.iter().any(|d| blocked(*d, &deps, &failing));

            if upstream_failed {
                prop_assert_eq!(status, StageStatus::Skipped);
                prop_assert!(!spy.invoked(&name));
            } else if failing.contains(&i) {
                prop_assert_eq!(status, StageStatus::Failed);
            } else {
                prop_assert_eq!(status, StageStatus::Succeeded);
            }

            // A stage only starts once everything it needs has finished
            if let Some(call) = spy.calls_for(&name).first() {
                for d in before {
                    let dep = spy.calls_for(&format!("s{}", d));
                    prop_assert!(!dep.is_empty());
                    prop_assert!(dep[0].finished <= call.started);
                }
            }
        }

        prop_assert!(spy.peak() <= concurrency);

        let expected = if failing.is_empty() { RunStatus::Succeeded } else { RunStatus::Failed };
        prop_assert_eq!(report.status, expected);
    }

    #[test]
    fn topological_order_respects_every_edge(deps in dag_strategy(12)) {
        let pipeline = pipeline_from(&deps, 1);
        let graph = StageGraph::build(&pipeline).unwrap();

        let order = graph.topological_order();
        prop_assert_eq!(order.len(), deps.len());

        let position: Vec<usize> = {
            let mut pos = vec![0; order.len()];
            for (at, idx) in order.iter().enumerate() {
                pos[*idx] = at;
            }
            pos
        };
        for (i, before) in deps.iter().enumerate() {
            for d in before {
                prop_assert!(position[*d] < position[i]);
            }
        }
    }
}
