//! Property-based tests for single activation.
//!
//! Random sequences of activate/deactivate calls, with random save faults,
//! are run against a `MemoryRemote`. After every settled call:
//! 1. Without failures, at most one task is active, and it is the target
//!    exactly when activation was requested.
//! 2. Failed tasks keep their previous flag; updated tasks hold the new one.
//! 3. Every updated task's remote record carries its new local flag.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use taskclock::activation::ActivationCoordinator;
use taskclock::remote::memory::{Fault, MemoryRemote};
use taskclock::store::{StoreConfig, TaskStore};
use taskclock_proto::record::RecordId;
use taskclock_proto::task::TaskRecord;

const TASKS: usize = 5;

/// One step: target index, desired flag, and an optional task whose saves fail.
type Step = (usize, bool, Option<usize>);

fn arb_step() -> impl Strategy<Value = Step> {
    (0..TASKS, any::<bool>(), prop::option::weighted(0.3, 0..TASKS))
}

fn task_id(i: usize) -> RecordId {
    RecordId::new(format!("task-{i}"))
}

fn run_steps(initial_active: &[bool], steps: &[Step]) -> Result<(), TestCaseError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let remote = Arc::new(MemoryRemote::with_records((0..TASKS).map(|i| {
            TaskRecord {
                id: task_id(i),
                name: format!("task {i}"),
                is_activated: initial_active[i],
            }
            .to_record()
        })));
        let mut store = TaskStore::new(Arc::clone(&remote), StoreConfig::default());
        store.load().await.unwrap();
        let coordinator = ActivationCoordinator::new(
            store.into_shared(),
            Arc::clone(&remote),
            Duration::from_secs(5),
        );

        for &(target, desired, fault) in steps {
            remote.clear_faults();
            if let Some(f) = fault {
                remote.inject(&task_id(f), Fault::Save);
            }

            let before: BTreeMap<RecordId, bool> = coordinator
                .store()
                .lock()
                .await
                .list()
                .into_iter()
                .map(|t| (t.id, t.is_activated))
                .collect();

            let report = coordinator
                .set_activation(&task_id(target), desired)
                .await
                .unwrap();

            let after: BTreeMap<RecordId, bool> = coordinator
                .store()
                .lock()
                .await
                .list()
                .into_iter()
                .map(|t| (t.id, t.is_activated))
                .collect();

            for (id, value) in &report.updated {
                prop_assert_eq!(after[id], *value);
            }
            for id in report.failed.keys() {
                prop_assert_eq!(after[id], before[id]);
            }
            for (id, value) in &after {
                if !report.updated.contains_key(id) && !report.failed.contains_key(id) {
                    prop_assert_eq!(*value, before[id]);
                }
            }

            if report.is_complete() {
                let target_id = task_id(target);
                let active: Vec<&RecordId> =
                    after.iter().filter(|(_, v)| **v).map(|(id, _)| id).collect();
                if desired {
                    prop_assert_eq!(active, vec![&target_id]);
                } else {
                    prop_assert!(!active.contains(&&target_id));
                    prop_assert!(active.len() <= before.values().filter(|v| **v).count());
                }

                for (id, value) in &after {
                    let remote_flag = TaskRecord::from_record(&remote.peek(id).unwrap())
                        .unwrap()
                        .is_activated;
                    if report.updated.contains_key(id) {
                        prop_assert_eq!(remote_flag, *value);
                    }
                }
            }
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn single_activation_holds_over_random_sequences(
        initial_active in prop::collection::vec(any::<bool>(), TASKS),
        steps in prop::collection::vec(arb_step(), 1..20),
    ) {
        run_steps(&initial_active, &steps)?;
    }
}
