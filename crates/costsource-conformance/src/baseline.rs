//! Performance baselines: latency and payload ceilings per operation and level.
//!
//! The table is handed to the suite through its configuration and is
//! read-only for the duration of a run.

use costsource_types::Operation;
use serde::{Deserialize, Serialize};

use crate::types::ConformanceLevel;

/// Ceiling for one operation at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub operation: Operation,
    pub level: ConformanceLevel,
    pub max_latency_ms: u64,
    /// Ceiling on mean request + response bytes per call.
    pub max_payload_bytes: u64,
}

impl BaselineEntry {
    pub fn max_latency_us(&self) -> u64 {
        self.max_latency_ms.saturating_mul(1_000)
    }
}

/// Reference thresholds keyed by operation and level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    entries: Vec<BaselineEntry>,
}

const KIB: u64 = 1024;

/// (operation, [basic, standard, advanced] latency ms)
const DEFAULT_LATENCY_MS: [(Operation, [u64; 3]); 7] = [
    (Operation::Name, [500, 100, 50]),
    (Operation::Supports, [500, 100, 50]),
    (Operation::GetActualCost, [5_000, 2_000, 1_000]),
    (Operation::GetProjectedCost, [1_000, 200, 100]),
    (Operation::GetPricingSpec, [1_000, 200, 100]),
    (Operation::EstimateCost, [1_000, 500, 200]),
    (Operation::GetRecommendations, [5_000, 2_000, 1_000]),
];

const DEFAULT_PAYLOAD_BYTES: [u64; 3] = [4 * KIB * KIB, KIB * KIB, 256 * KIB];

impl PerformanceBaseline {
    pub fn new(entries: Vec<BaselineEntry>) -> Self {
        Self { entries }
    }

    /// Look up the ceiling for an operation at a level.
    pub fn get(&self, operation: Operation, level: ConformanceLevel) -> Option<&BaselineEntry> {
        self.entries
            .iter()
            .find(|e| e.operation == operation && e.level == level)
    }

    /// Replace (or add) the latency ceiling for one operation and level.
    pub fn with_latency(
        mut self,
        operation: Operation,
        level: ConformanceLevel,
        max_latency_ms: u64,
    ) -> Self {
        match self
            .entries
            .iter_mut()
            .find(|e| e.operation == operation && e.level == level)
        {
            Some(entry) => entry.max_latency_ms = max_latency_ms,
            None => self.entries.push(BaselineEntry {
                operation,
                level,
                max_latency_ms,
                max_payload_bytes: DEFAULT_PAYLOAD_BYTES[level_index(level)],
            }),
        }
        self
    }

    pub fn entries(&self) -> &[BaselineEntry] {
        &self.entries
    }
}

impl Default for PerformanceBaseline {
    fn default() -> Self {
        let entries = DEFAULT_LATENCY_MS
            .iter()
            .flat_map(|(operation, latencies)| {
                ConformanceLevel::ALL.iter().map(move |level| BaselineEntry {
                    operation: *operation,
                    level: *level,
                    max_latency_ms: latencies[level_index(*level)],
                    max_payload_bytes: DEFAULT_PAYLOAD_BYTES[level_index(*level)],
                })
            })
            .collect();
        Self { entries }
    }
}

fn level_index(level: ConformanceLevel) -> usize {
    match level {
        ConformanceLevel::Basic => 0,
        ConformanceLevel::Standard => 1,
        ConformanceLevel::Advanced => 2,
    }
}
