//! Running price statistics
//!
//! [`AggregateState`] mirrors the single `bt.stats` row. It is only ever moved
//! forward by folding in a [`BatchSummary`]; nothing here re-reads records.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::fmt;

/// Count, sum, min and max over every ingested price.
///
/// `count == 0` implies `sum == 0` and `min == max == None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateState {
    pub count: i64,
    pub sum: BigDecimal,
    pub min: Option<BigDecimal>,
    pub max: Option<BigDecimal>,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self {
            count: 0,
            sum: BigDecimal::from(0),
            min: None,
            max: None,
        }
    }
}

impl AggregateState {
    /// Fold a batch of prices into the state. An empty batch returns `self`
    /// unchanged.
    pub fn combine<'a>(&self, values: impl IntoIterator<Item = &'a BigDecimal>) -> Self {
        match BatchSummary::from_values(values) {
            Some(batch) => self.merge(&batch),
            None => self.clone(),
        }
    }

    /// A `None` bound on `self` loses to any batch value.
    pub fn merge(&self, batch: &BatchSummary) -> Self {
        Self {
            count: self.count + batch.count,
            sum: &self.sum + &batch.sum,
            min: Some(match &self.min {
                Some(current) if current <= &batch.min => current.clone(),
                _ => batch.min.clone(),
            }),
            max: Some(match &self.max {
                Some(current) if current >= &batch.max => current.clone(),
                _ => batch.max.clone(),
            }),
        }
    }

    /// `sum / count`, derived at read time
    pub fn mean(&self) -> Option<BigDecimal> {
        (self.count > 0).then(|| &self.sum / &BigDecimal::from(self.count))
    }

    pub fn is_consistent(&self) -> bool {
        if self.count == 0 {
            self.sum == BigDecimal::from(0) && self.min.is_none() && self.max.is_none()
        } else {
            self.count > 0
                && match (&self.min, &self.max) {
                    (Some(min), Some(max)) => min <= max,
                    _ => false,
                }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            mean: self.mean().map(|m| m.round(MEAN_DISPLAY_DIGITS).normalized()),
            state: self.clone(),
        }
    }
}

const MEAN_DISPLAY_DIGITS: i64 = 6;

/// Count/sum/min/max of one non-empty batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub count: i64,
    pub sum: BigDecimal,
    pub min: BigDecimal,
    pub max: BigDecimal,
}

impl BatchSummary {
    /// `None` for an empty batch.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a BigDecimal>) -> Option<Self> {
        let mut values = values.into_iter();
        let first = values.next()?;

        let mut summary = BatchSummary {
            count: 1,
            sum: first.clone(),
            min: first.clone(),
            max: first.clone(),
        };

        for value in values {
            summary.count += 1;
            summary.sum += value;
            if value < &summary.min {
                summary.min = value.clone();
            }
            if value > &summary.max {
                summary.max = value.clone();
            }
        }

        Some(summary)
    }
}

/// Aggregate state plus its derived mean, as reported to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub state: AggregateState,
    pub mean: Option<BigDecimal>,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(value: Option<&BigDecimal>) -> String {
            value
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string())
        }

        write!(
            f,
            "rows={}, sum={}, min={}, max={}, mean={}",
            self.state.count,
            self.state.sum,
            opt(self.state.min.as_ref()),
            opt(self.state.max.as_ref()),
            opt(self.mean.as_ref())
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn decs(values: &[&str]) -> Vec<BigDecimal> {
        values.iter().map(|v| dec(v)).collect()
    }

    #[test]
    fn test_combine_from_empty() {
        let state = AggregateState::default().combine(&decs(&["10.00", "20.00", "5.00"]));

        assert_eq!(state.count, 3);
        assert_eq!(state.sum, dec("35.00"));
        assert_eq!(state.min, Some(dec("5.00")));
        assert_eq!(state.max, Some(dec("20.00")));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_combine_keeps_existing_bounds() {
        let current = AggregateState {
            count: 2,
            sum: dec("6"),
            min: Some(dec("1")),
            max: Some(dec("5")),
        };

        let next = current.combine(&decs(&["2", "3"]));

        assert_eq!(next.count, 4);
        assert_eq!(next.sum, dec("11"));
        assert_eq!(next.min, Some(dec("1")));
        assert_eq!(next.max, Some(dec("5")));
    }

    #[test]
    fn test_combine_empty_batch_is_noop() {
        let current = AggregateState::default().combine(&decs(&["7"]));
        assert_eq!(current.combine(&[]), current);
        assert_eq!(AggregateState::default().combine(&[]), AggregateState::default());
    }

    #[test]
    fn test_combine_is_order_independent() {
        let a = AggregateState::default()
            .combine(&decs(&["3.3", "-1"]))
            .combine(&decs(&["10.25"]));
        let b = AggregateState::default()
            .combine(&decs(&["10.25"]))
            .combine(&decs(&["-1", "3.3"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_decimal_sum_has_no_drift() {
        let tenth = vec![dec("0.1"); 1000];
        let state = AggregateState::default().combine(&tenth);
        assert_eq!(state.sum, dec("100"));
    }

    #[test]
    fn test_mean() {
        assert_eq!(AggregateState::default().mean(), None);

        let state = AggregateState::default().combine(&decs(&["1", "2"]));
        assert_eq!(state.mean(), Some(dec("1.5")));
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = AggregateState::default()
            .combine(&decs(&["10.00", "20.00", "5.00"]))
            .snapshot();
        assert_eq!(
            snapshot.to_string(),
            "rows=3, sum=35.00, min=5.00, max=20.00, mean=11.666667"
        );

        assert_eq!(
            AggregateState::default().snapshot().to_string(),
            "rows=0, sum=0, min=-, max=-, mean=-"
        );
    }

    #[test]
    fn test_inconsistent_state_detected() {
        let broken = AggregateState {
            count: 0,
            sum: dec("1"),
            min: None,
            max: None,
        };
        assert!(!broken.is_consistent());
    }
}
