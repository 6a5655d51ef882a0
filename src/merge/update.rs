use serde::{Deserialize, Serialize};

use crate::response::UpdateOutcome;

/// Logical summary of the update outcomes of one statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedUpdateResult {
    pub affected_rows: u64,
    pub last_insert_id: u64,
}

impl MergedUpdateResult {
    /// Sum affected rows, saturating at `u64::MAX`; the last insert id is the
    /// first nonzero one in dispatch order
    pub fn merge(units: &[UpdateOutcome]) -> Self {
        let affected_rows = units
            .iter()
            .fold(0u64, |total, u| total.saturating_add(u.affected_rows));
        let last_insert_id = units
            .iter()
            .map(|u| u.last_insert_id)
            .find(|id| *id != 0)
            .unwrap_or(0);
        Self {
            affected_rows,
            last_insert_id,
        }
    }

    /// Outcome of the designated first unit only
    pub fn first(units: &[UpdateOutcome]) -> Self {
        units
            .first()
            .map(|u| Self {
                affected_rows: u.affected_rows,
                last_insert_id: u.last_insert_id,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_and_first_nonzero_id() {
        let units = vec![
            UpdateOutcome::new(2, 0),
            UpdateOutcome::new(0, 7),
            UpdateOutcome::new(5, 0),
        ];
        let merged = MergedUpdateResult::merge(&units);
        assert_eq!(merged.affected_rows, 7);
        assert_eq!(merged.last_insert_id, 7);
    }

    #[test]
    fn test_sum_saturates_on_overflow() {
        let units = vec![UpdateOutcome::new(u64::MAX - 1, 0), UpdateOutcome::new(5, 3)];
        let merged = MergedUpdateResult::merge(&units);
        assert_eq!(merged.affected_rows, u64::MAX);
        assert_eq!(merged.last_insert_id, 3);
    }

    #[test]
    fn test_sum_is_order_independent() {
        let mut units = vec![
            UpdateOutcome::new(3, 0),
            UpdateOutcome::new(4, 0),
            UpdateOutcome::new(1, 0),
        ];
        let forward = MergedUpdateResult::merge(&units).affected_rows;
        units.reverse();
        assert_eq!(MergedUpdateResult::merge(&units).affected_rows, forward);
    }

    #[test]
    fn test_first_nonzero_wins() {
        let units = vec![UpdateOutcome::new(1, 11), UpdateOutcome::new(1, 12)];
        assert_eq!(MergedUpdateResult::merge(&units).last_insert_id, 11);
    }

    #[test]
    fn test_first_unit_only() {
        let units = vec![UpdateOutcome::new(0, 0), UpdateOutcome::new(3, 0)];
        assert_eq!(MergedUpdateResult::first(&units), MergedUpdateResult::default());
        assert_eq!(MergedUpdateResult::first(&[]), MergedUpdateResult::default());
    }
}
