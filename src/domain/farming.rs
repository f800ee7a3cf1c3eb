use chrono::{DateTime, Duration, Utc};

use super::Units;

/// Maps credited farming time to a yield.
///
/// Implementations must be monotonic: more credited time never yields less.
pub trait YieldPolicy: Send + Sync {
    fn yield_for(&self, credited: Duration) -> Units;
}

/// Pays a fixed number of units per full minute of credited time,
/// pro-rated to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearYield {
    pub units_per_minute: Units,
}

impl LinearYield {
    pub fn new(units_per_minute: Units) -> Self {
        Self { units_per_minute }
    }
}

impl YieldPolicy for LinearYield {
    fn yield_for(&self, credited: Duration) -> Units {
        let seconds = credited.num_seconds().max(0) as u128;
        let amount = seconds * u128::from(self.units_per_minute) / 60;
        Units::try_from(amount).unwrap_or(Units::MAX)
    }
}

/// Cadence and cap of the farming mechanic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarmingRules {
    pub min_interval: Duration,
    pub max_credit: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FarmOutcome {
    TooSoon { next_allowed_at: DateTime<Utc> },
    Ready { credited: Duration },
}

impl FarmingRules {
    pub fn new(min_interval: Duration, max_credit: Duration) -> Self {
        Self {
            min_interval,
            max_credit: max_credit.max(min_interval),
        }
    }

    /// Decide whether a farm at `now` is allowed and how much time it credits.
    /// A `now` earlier than `last_farming_at` counts as too soon.
    pub fn evaluate(&self, last_farming_at: DateTime<Utc>, now: DateTime<Utc>) -> FarmOutcome {
        let elapsed = now - last_farming_at;
        if elapsed < self.min_interval || elapsed < Duration::zero() {
            return FarmOutcome::TooSoon {
                next_allowed_at: last_farming_at
                    .checked_add_signed(self.min_interval)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            };
        }

        FarmOutcome::Ready {
            credited: elapsed.min(self.max_credit),
        }
    }
}

impl Default for FarmingRules {
    fn default() -> Self {
        Self::new(Duration::minutes(1), Duration::hours(24))
    }
}
