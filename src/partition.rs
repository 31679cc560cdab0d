//! Capacity split between the local and remote tier

use crate::error::{CacheError, CacheResult};

/// Entry capacity of each tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCapacity {
    pub local: u64,
    pub remote: u64,
}

/// Split `max_size` by a local:remote `ratio`
///
/// `local = floor(max_size * ratio / (1 + ratio))` and
/// `remote = floor(max_size / (1 + ratio))`. The two may sum to one less
/// than `max_size` due to truncation.
pub fn partition(max_size: u64, ratio: f64) -> CacheResult<TierCapacity> {
    if max_size == 0 {
        return Err(CacheError::invalid_config("max_size must be >= 1"));
    }
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(CacheError::invalid_config(format!(
            "two_levels_ratio must be a positive number, got {}",
            ratio
        )));
    }

    let total = max_size as f64;
    let local = (total * ratio / (1.0 + ratio)).floor() as u64;
    let remote = (total / (1.0 + ratio)).floor() as u64;

    Ok(TierCapacity {
        local: local.min(max_size),
        remote: remote.min(max_size - local.min(max_size)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let cap = partition(10, 1.0).unwrap();
        assert_eq!(cap, TierCapacity { local: 5, remote: 5 });
    }

    #[test]
    fn test_default_ratio_truncates() {
        // 1000 * 0.5 / 1.5 = 333.3, 1000 / 1.5 = 666.6
        let cap = partition(1000, 0.5).unwrap();
        assert_eq!(cap, TierCapacity { local: 333, remote: 666 });
    }

    #[test]
    fn test_sum_never_exceeds_max_size() {
        let ratios = [0.001, 0.1, 0.3, 0.5, 0.7, 1.0, 1.5, 3.0, 7.25, 100.0, 1e6];
        for max_size in 1..=257u64 {
            for &ratio in &ratios {
                let cap = partition(max_size, ratio).unwrap();
                assert!(
                    cap.local + cap.remote <= max_size,
                    "max_size={} ratio={} gave {:?}",
                    max_size,
                    ratio,
                    cap
                );
            }
        }
    }

    #[test]
    fn test_truncation_loses_at_most_one_entry() {
        // Binary fractions keep the float math exact at integer boundaries
        let ratios = [0.125, 0.25, 0.5, 1.0, 1.5, 3.0, 7.25, 100.0];
        for max_size in 1..=257u64 {
            for &ratio in &ratios {
                let cap = partition(max_size, ratio).unwrap();
                assert!(cap.local + cap.remote + 1 >= max_size);
            }
        }
    }

    #[test]
    fn test_tiny_ratio_leaves_no_local_capacity() {
        let cap = partition(1000, 1e-9).unwrap();
        assert_eq!(cap.local, 0);
        assert_eq!(cap.remote, 999);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(partition(0, 1.0).is_err());
        assert!(partition(10, 0.0).is_err());
        assert!(partition(10, -0.5).is_err());
        assert!(partition(10, f64::NAN).is_err());
        assert!(partition(10, f64::INFINITY).is_err());
    }
}
