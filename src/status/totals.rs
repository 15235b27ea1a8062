use serde::Serialize;

use crate::status::process_status::ProcessCounters;
use crate::status::processing_status::ProcessingStatus;

/// Read model over a [`ProcessingStatus`]: run-wide counter totals.
///
/// Computed on demand and never cached, so calling it twice without an
/// intervening update returns the same value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    #[serde(flatten)]
    pub counters: ProcessCounters,
    pub number_of_workers: usize,
    pub changed: bool,
}

impl StatusTotals {
    pub fn compute(status: &ProcessingStatus) -> Self {
        let counters = status
            .processes()
            .fold(ProcessCounters::default(), |total, process| total.combined(process.counters()));

        Self {
            counters,
            number_of_workers: status.workers_status().len(),
            changed: status.has_changed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot;
    use proptest::prelude::*;

    #[test]
    fn test_totals_sum_foreman_and_workers() {
        let mut status = ProcessingStatus::new();
        status.update_foreman_status(&snapshot("foreman", "Running", 1, "", [3, 10, 0, 0, 0, 0])).unwrap();
        status.update_worker_status(&snapshot("worker-00", "Running", 2, "", [4, 0, 0, 12, 0, 1])).unwrap();
        status.update_worker_status(&snapshot("worker-01", "Running", 3, "", [6, 1, 0, 20, 0, 2])).unwrap();

        let totals = status.totals();
        assert_eq!(totals.counters, ProcessCounters::new(13, 11, 0, 32, 0, 3));
        assert_eq!(totals.number_of_workers, 2);
        assert!(totals.changed);
    }

    #[test]
    fn test_empty_status_totals() {
        let totals = ProcessingStatus::new().totals();
        assert!(totals.counters.is_zero());
        assert_eq!(totals.number_of_workers, 0);
        assert!(!totals.changed);
    }

    fn counters_strategy() -> impl Strategy<Value = [u64; 6]> {
        prop::array::uniform6(0u64..1_000)
    }

    proptest! {
        #[test]
        fn prop_totals_equal_sum_and_are_idempotent(
            updates in prop::collection::vec((0usize..4, counters_strategy()), 1..40)
        ) {
            let mut status = ProcessingStatus::new();
            let mut latest: [[u64; 6]; 4] = [[0; 6]; 4];

            for (process, increments) in updates {
                for (value, increment) in latest[process].iter_mut().zip(increments.iter()) {
                    *value += increment;
                }
                let update = snapshot(&format!("p{}", process), "Running", 1, "", latest[process]);
                if process == 0 {
                    status.update_foreman_status(&update).unwrap();
                } else {
                    status.update_worker_status(&update).unwrap();
                }
            }

            let mut expected = [0u64; 6];
            for process in latest.iter() {
                for (total, value) in expected.iter_mut().zip(process.iter()) {
                    *total += value;
                }
            }

            let first = status.totals();
            let second = status.totals();
            prop_assert_eq!(first, second);
            prop_assert_eq!(
                first.counters,
                ProcessCounters::new(expected[0], expected[1], expected[2], expected[3], expected[4], expected[5])
            );
        }
    }
}
