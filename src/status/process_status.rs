use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One of the six monotonic counters every process maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    ConsumedSources,
    ProducedSources,
    ConsumedEvents,
    ProducedEvents,
    ConsumedErrors,
    ProducedErrors,
}

impl Counter {
    pub const ALL: [Counter; 6] = [
        Counter::ConsumedSources,
        Counter::ProducedSources,
        Counter::ConsumedEvents,
        Counter::ProducedEvents,
        Counter::ConsumedErrors,
        Counter::ProducedErrors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Counter::ConsumedSources => "consumed_sources",
            Counter::ProducedSources => "produced_sources",
            Counter::ConsumedEvents => "consumed_events",
            Counter::ProducedEvents => "produced_events",
            Counter::ConsumedErrors => "consumed_errors",
            Counter::ProducedErrors => "produced_errors",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The six counters of a process, by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCounters {
    pub consumed_sources: u64,
    pub produced_sources: u64,
    pub consumed_events: u64,
    pub produced_events: u64,
    pub consumed_errors: u64,
    pub produced_errors: u64,
}

impl ProcessCounters {
    pub fn new(
        consumed_sources: u64,
        produced_sources: u64,
        consumed_events: u64,
        produced_events: u64,
        consumed_errors: u64,
        produced_errors: u64,
    ) -> Self {
        Self {
            consumed_sources,
            produced_sources,
            consumed_events,
            produced_events,
            consumed_errors,
            produced_errors,
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::ConsumedSources => self.consumed_sources,
            Counter::ProducedSources => self.produced_sources,
            Counter::ConsumedEvents => self.consumed_events,
            Counter::ProducedEvents => self.produced_events,
            Counter::ConsumedErrors => self.consumed_errors,
            Counter::ProducedErrors => self.produced_errors,
        }
    }

    fn slot(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::ConsumedSources => &mut self.consumed_sources,
            Counter::ProducedSources => &mut self.produced_sources,
            Counter::ConsumedEvents => &mut self.consumed_events,
            Counter::ProducedEvents => &mut self.produced_events,
            Counter::ConsumedErrors => &mut self.consumed_errors,
            Counter::ProducedErrors => &mut self.produced_errors,
        }
    }

    pub fn set(&mut self, counter: Counter, value: u64) {
        *self.slot(counter) = value;
    }

    /// Field-wise sum, used to aggregate processes and to carry the counters
    /// of a dead worker generation over to its replacement.
    pub fn combined(&self, other: &ProcessCounters) -> ProcessCounters {
        let mut combined = *self;
        for counter in Counter::ALL {
            *combined.slot(counter) = self.get(counter).saturating_add(other.get(counter));
        }
        combined
    }

    pub fn is_zero(&self) -> bool {
        Counter::ALL.iter().all(|counter| self.get(*counter) == 0)
    }
}

/// The immutable status value a process publishes about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub identifier: String,
    pub pid: u32,
    pub status: String,
    pub display_name: String,
    pub counters: ProcessCounters,
}

impl StatusSnapshot {
    pub fn new(
        identifier: &str,
        pid: u32,
        status: &str,
        display_name: &str,
        counters: ProcessCounters,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            pid,
            status: status.to_string(),
            display_name: display_name.to_string(),
            counters,
        }
    }
}

/// Per-update deltas, serialized flat as `<counter>_delta`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDeltas(pub ProcessCounters);

impl Serialize for CounterDeltas {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Counter::ALL.len()))?;
        for counter in Counter::ALL {
            map.serialize_entry(&format!("{}_delta", counter.name()), &self.0.get(counter))?;
        }
        map.end()
    }
}

/// Status of one process (foreman or worker) as seen by the foreman.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStatus {
    pub identifier: String,
    pub pid: u32,
    pub status: String,
    pub display_name: String,
    /// Wall-clock time of the last update that advanced a counter
    pub last_running_time: Option<DateTime<Utc>>,
    /// Resident memory in bytes, as last sampled by the governor
    pub used_memory: Option<u64>,
    #[serde(flatten)]
    counters: ProcessCounters,
    #[serde(flatten)]
    deltas: CounterDeltas,
}

impl ProcessStatus {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            pid: 0,
            status: String::new(),
            display_name: String::new(),
            last_running_time: None,
            used_memory: None,
            counters: ProcessCounters::default(),
            deltas: CounterDeltas::default(),
        }
    }

    pub fn counters(&self) -> &ProcessCounters {
        &self.counters
    }

    pub fn deltas(&self) -> &ProcessCounters {
        &self.deltas.0
    }

    pub fn delta(&self, counter: Counter) -> u64 {
        self.deltas.0.get(counter)
    }

    /// Whether the last update moved any counter
    pub fn has_changed(&self) -> bool {
        !self.deltas.0.is_zero()
    }

    /// Apply a snapshot. A regressing snapshot is rejected as a whole: nothing
    /// of it is stored.
    pub(crate) fn apply(&mut self, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Result<(), EngineError> {
        let mut deltas = ProcessCounters::default();
        for counter in Counter::ALL {
            let previous = self.counters.get(counter);
            let current = snapshot.counters.get(counter);
            if current < previous {
                return Err(EngineError::CounterRegression {
                    identifier: self.identifier.clone(),
                    counter,
                    previous,
                    current,
                });
            }
            deltas.set(counter, current - previous);
        }

        self.pid = snapshot.pid;
        self.status = snapshot.status.clone();
        self.display_name = snapshot.display_name.clone();
        self.counters = snapshot.counters;
        self.deltas = CounterDeltas(deltas);

        if !deltas.is_zero() {
            self.last_running_time = Some(now);
        }
        Ok(())
    }
}
