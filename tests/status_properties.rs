//! Property tests of the status model's counter invariants.

use proptest::prelude::*;

use rust_extractor::error::EngineError;
use rust_extractor::status::{Counter, ProcessCounters, ProcessingStatus, StatusSnapshot};

fn counters(values: [u64; 6]) -> ProcessCounters {
    let mut counters = ProcessCounters::default();
    for (counter, value) in Counter::ALL.iter().zip(values.iter()) {
        counters.set(*counter, *value);
    }
    counters
}

fn worker_snapshot(values: [u64; 6]) -> StatusSnapshot {
    StatusSnapshot::new("worker-00", 4242, "Extracting", "/evidence/file", counters(values))
}

proptest! {
    #[test]
    fn prop_monotonic_updates_report_exact_deltas(
        steps in prop::collection::vec(prop::array::uniform6(0u64..10_000), 1..50)
    ) {
        let mut status = ProcessingStatus::new();
        let mut current = [0u64; 6];

        for increments in steps {
            for (value, increment) in current.iter_mut().zip(increments.iter()) {
                *value += increment;
            }
            prop_assert!(status.update_worker_status(&worker_snapshot(current)).is_ok());

            let worker = status.worker_status("worker-00").expect("worker status");
            for (index, counter) in Counter::ALL.iter().enumerate() {
                prop_assert_eq!(worker.counters().get(*counter), current[index]);
                prop_assert_eq!(worker.delta(*counter), increments[index]);
            }
        }
    }

    #[test]
    fn prop_any_regression_is_rejected(
        base in prop::array::uniform6(1u64..10_000),
        index in 0usize..6,
        decrease in 1u64..10_000,
    ) {
        let mut status = ProcessingStatus::new();
        status.update_worker_status(&worker_snapshot(base)).expect("first update");

        let mut regressed = base;
        regressed[index] = base[index].saturating_sub(decrease);
        // Other counters may still move forward in the same update
        for (other, value) in regressed.iter_mut().enumerate() {
            if other != index {
                *value += 1;
            }
        }

        match status.update_worker_status(&worker_snapshot(regressed)) {
            Err(EngineError::CounterRegression { identifier, counter, previous, current }) => {
                prop_assert_eq!(identifier, "worker-00");
                prop_assert_eq!(counter, Counter::ALL[index]);
                prop_assert_eq!(previous, base[index]);
                prop_assert_eq!(current, regressed[index]);
            }
            other => prop_assert!(false, "expected a counter regression, got {:?}", other),
        }

        // Nothing of the rejected update is stored
        let worker = status.worker_status("worker-00").expect("worker status");
        prop_assert_eq!(*worker.counters(), counters(base));
    }
}
