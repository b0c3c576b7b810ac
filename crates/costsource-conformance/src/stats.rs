//! Latency sample reduction.

use std::time::Duration;

use crate::types::LatencyStats;

/// Nearest-rank percentile of an ascending slice. Zero when empty.
pub fn nearest_rank(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// How many of `planned` samples must exceed a threshold before the
/// nearest-rank percentile `pct` is guaranteed to exceed it.
pub fn exceedances_to_fail(planned: usize, pct: f64) -> usize {
    let rank = ((pct / 100.0) * planned as f64).ceil() as usize;
    planned + 1 - rank.clamp(1, planned.max(1))
}

/// Reduce raw samples to a distribution summary.
pub fn summarize(latencies: &[Duration], payload_bytes: &[u64]) -> Option<LatencyStats> {
    if latencies.is_empty() {
        return None;
    }
    let mut micros: Vec<u64> = latencies
        .iter()
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .collect();
    micros.sort_unstable();

    let n = micros.len() as f64;
    let mean = micros.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = micros
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let coefficient_of_variation = if mean > 0.0 {
        variance.sqrt() / mean
    } else {
        0.0
    };
    let avg_payload_bytes = if payload_bytes.is_empty() {
        0
    } else {
        payload_bytes.iter().sum::<u64>() / payload_bytes.len() as u64
    };

    Some(LatencyStats {
        samples: micros.len(),
        min_us: micros[0],
        avg_us: mean.round() as u64,
        max_us: micros[micros.len() - 1],
        p50_us: nearest_rank(&micros, 50.0),
        p95_us: nearest_rank(&micros, 95.0),
        p99_us: nearest_rank(&micros, 99.0),
        coefficient_of_variation,
        avg_payload_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nearest_rank_small() {
        let sorted = [10, 20, 30, 40, 50];
        assert_eq!(nearest_rank(&sorted, 50.0), 30);
        assert_eq!(nearest_rank(&sorted, 95.0), 50);
        assert_eq!(nearest_rank(&sorted, 0.0), 10);
        assert_eq!(nearest_rank(&[], 95.0), 0);
    }

    #[test]
    fn test_exceedances_to_fail() {
        // p95 of 20 is the 19th value: two slow samples push it over.
        assert_eq!(exceedances_to_fail(20, 95.0), 2);
        // p95 of 10 is the 10th value: one slow sample is enough.
        assert_eq!(exceedances_to_fail(10, 95.0), 1);
        // max always fails on the first slow sample.
        assert_eq!(exceedances_to_fail(20, 100.0), 1);
    }

    #[test]
    fn test_summarize() {
        let latencies: Vec<Duration> = (1..=10).map(|ms| Duration::from_millis(ms)).collect();
        let stats = summarize(&latencies, &[100, 200]).unwrap();
        assert_eq!(stats.samples, 10);
        assert_eq!(stats.min_us, 1_000);
        assert_eq!(stats.max_us, 10_000);
        assert_eq!(stats.avg_us, 5_500);
        assert_eq!(stats.p95_us, 10_000);
        assert_eq!(stats.avg_payload_bytes, 150);
        assert!(stats.coefficient_of_variation > 0.0);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[], &[]).is_none());
    }

    #[test]
    fn test_constant_samples_have_zero_variation() {
        let latencies = vec![Duration::from_micros(250); 8];
        let stats = summarize(&latencies, &[]).unwrap();
        assert_eq!(stats.coefficient_of_variation, 0.0);
        assert_eq!(stats.p50_us, 250);
    }

    proptest! {
        #[test]
        fn prop_percentiles_are_ordered(values in proptest::collection::vec(0u64..1_000_000, 1..200)) {
            let latencies: Vec<Duration> = values.iter().map(|&v| Duration::from_micros(v)).collect();
            let stats = summarize(&latencies, &[]).unwrap();
            prop_assert!(stats.min_us <= stats.p50_us);
            prop_assert!(stats.p50_us <= stats.p95_us);
            prop_assert!(stats.p95_us <= stats.p99_us);
            prop_assert!(stats.p99_us <= stats.max_us);
        }

        #[test]
        fn prop_early_fail_count_is_exact(
            planned in 1usize..100,
            slow in 0usize..100,
        ) {
            let slow = slow.min(planned);
            let mut samples = vec![1u64; planned - slow];
            samples.extend(std::iter::repeat(1_000).take(slow));
            samples.sort_unstable();
            let over = nearest_rank(&samples, 95.0) > 1;
            prop_assert_eq!(over, slow >= exceedances_to_fail(planned, 95.0));
        }
    }
}
