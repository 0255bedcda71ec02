use std::collections::BTreeMap;

pub const INITIAL_WEIGHT: f64 = 10.0;
pub const MIN_WEIGHT: f64 = 0.5;
pub const MAX_WEIGHT: f64 = 20.0;

const CORRECT_STEP: f64 = 2.0;
const CORRECT_FLOOR: f64 = 1.0;
const WRONG_STEP: f64 = 5.0;
const MASTERY_THRESHOLD: u32 = 5;
const MASTERY_FACTOR: f64 = 0.5;

/// How the learner has done on one drillable fact.
///
/// Field names follow the stored JSON layout so saved progress stays readable
/// across versions of the bot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub correct_count: u32,
    pub wrong_count: u32,
    /// Milliseconds since the epoch, 0 when never asked.
    pub last_asked: i64,
    pub weight: f64,
}

impl Default for PerformanceRecord {
    fn default() -> Self {
        Self {
            correct_count: 0,
            wrong_count: 0,
            last_asked: 0,
            weight: INITIAL_WEIGHT,
        }
    }
}

impl PerformanceRecord {
    /// Applies a graded answer.
    ///
    /// A correct answer lowers the weight by a fixed step (never below 1), and
    /// once the fact is mastered the weight is halved on top of that (never
    /// below the global minimum). A wrong answer raises it up to the maximum.
    pub fn record(&mut self, correct: bool, now: i64) {
        if correct {
            self.correct_count += 1;
            self.weight = (self.weight - CORRECT_STEP).max(CORRECT_FLOOR);

            if self.correct_count >= MASTERY_THRESHOLD {
                self.weight = (self.weight * MASTERY_FACTOR).max(MIN_WEIGHT);
            }
        } else {
            self.wrong_count += 1;
            self.weight = (self.weight + WRONG_STEP).min(MAX_WEIGHT);
        }

        self.last_asked = now;
    }

    /// Pulls a weight read back from storage into bounds.
    pub fn clamp(&mut self) {
        if !self.weight.is_finite() {
            self.weight = INITIAL_WEIGHT;
        }
        self.weight = self.weight.clamp(MIN_WEIGHT, MAX_WEIGHT);
    }

    pub fn is_mastered(&self) -> bool {
        self.correct_count >= MASTERY_THRESHOLD
    }
}

const WRONG_COUNT_CAPACITY: u32 = 5;

/// Wrong-answer tally per item, for games that derive the selection weight
/// instead of storing one.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WrongCounts {
    counts: BTreeMap<String, u32>,
}

impl WrongCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, item: &str) -> u32 {
        self.counts.get(item).copied().unwrap_or(0)
    }

    /// `1 + min(wrong, 5)`, so every item stays drawable and none dominates.
    pub fn weight(&self, item: &str) -> f64 {
        (1 + self.count(item).min(WRONG_COUNT_CAPACITY)) as f64
    }

    pub fn record(&mut self, item: &str, correct: bool) {
        if correct {
            if let Some(count) = self.counts.get_mut(item) {
                *count = count.saturating_sub(1);
            }
        } else {
            *self.counts.entry(item.to_string()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_answers_raise_weight_up_to_ceiling() {
        let mut record = PerformanceRecord::default();
        record.record(false, 1_000);
        assert_eq!(record.weight, 15.0);
        assert_eq!(record.wrong_count, 1);
        assert_eq!(record.last_asked, 1_000);

        for _ in 0..10 {
            record.record(false, 2_000);
        }
        assert_eq!(record.weight, MAX_WEIGHT);
    }

    #[test]
    fn correct_answers_lower_weight_and_mastery_halves_it() {
        let mut record = PerformanceRecord::default();
        for _ in 0..4 {
            record.record(true, 0);
        }
        // 10 -> 8 -> 6 -> 4 -> 2
        assert_eq!(record.weight, 2.0);
        assert!(!record.is_mastered());

        record.record(true, 0);
        // 2 -> 1 (floor), then mastery halves it
        assert_eq!(record.weight, 0.5);
        assert!(record.is_mastered());

        record.record(true, 0);
        assert_eq!(record.weight, MIN_WEIGHT);
    }

    #[test]
    fn weight_stays_bounded_under_mixed_sequences() {
        let mut record = PerformanceRecord::default();
        let pattern = [true, false, true, true, false, false, true, true, true, true, true, false];
        for round in 0..50 {
            for (i, correct) in pattern.iter().enumerate() {
                record.record(*correct ^ (round % 3 == 0 && i % 2 == 0), 0);
                assert!(record.weight >= MIN_WEIGHT && record.weight <= MAX_WEIGHT);
            }
        }
    }

    #[test]
    fn clamp_repairs_stored_weights() {
        let mut record = PerformanceRecord {
            weight: 400.0,
            ..Default::default()
        };
        record.clamp();
        assert_eq!(record.weight, MAX_WEIGHT);

        record.weight = f64::NAN;
        record.clamp();
        assert_eq!(record.weight, INITIAL_WEIGHT);
    }

    #[test]
    fn wrong_counts_derive_capped_weight() {
        let mut counts = WrongCounts::new();
        assert_eq!(counts.weight("א"), 1.0);
        for _ in 0..9 {
            counts.record("א", false);
        }
        assert_eq!(counts.count("א"), 9);
        assert_eq!(counts.weight("א"), 6.0);

        counts.record("א", true);
        assert_eq!(counts.count("א"), 8);

        counts.record("ב", true);
        assert_eq!(counts.count("ב"), 0);
    }
}
