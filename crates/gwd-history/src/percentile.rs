/// Percentile-by-index over a sorted sample set, the same
/// sort-then-index-by-fraction approach as
/// `csa-resource::stats::UsageStats::get_p95_estimate`, generalized to an
/// arbitrary percentile in `[0.0, 1.0]`.
///
/// `sorted` must already be sorted ascending. Returns `0` for an empty set.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(percentile(&[], 0.9), 0);
    }

    #[test]
    fn single_sample_is_itself() {
        assert_eq!(percentile(&[42], 0.5), 42);
        assert_eq!(percentile(&[42], 0.9), 42);
    }

    #[test]
    fn p50_and_p90_on_ten_samples() {
        let sorted: Vec<u64> = (1..=10).collect();
        assert_eq!(percentile(&sorted, 0.5), 5);
        assert_eq!(percentile(&sorted, 0.9), 9);
    }
}
