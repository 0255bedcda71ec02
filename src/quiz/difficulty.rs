//! Difficulty knobs that move with the learner's answers.

pub const RATCHET_START: u32 = 10;
pub const RATCHET_MIN: u32 = 10;
pub const RATCHET_MAX: u32 = 1000;

/// Operand range for the add/subtract game. Steps grow with the level so
/// progress stays noticeable at high ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct TieredRatchet {
    value: u32,
}

impl Default for TieredRatchet {
    fn default() -> Self {
        Self { value: RATCHET_START }
    }
}

impl TieredRatchet {
    pub fn new(value: u32) -> Self {
        Self {
            value: value.clamp(RATCHET_MIN, RATCHET_MAX),
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    fn increment(&self) -> u32 {
        match self.value {
            v if v < 50 => 2,
            v if v < 100 => 3,
            _ => 5,
        }
    }

    fn decrement(&self) -> u32 {
        match self.value {
            v if v <= 50 => 3,
            v if v <= 100 => 5,
            _ => 8,
        }
    }

    /// Returns true when the value crossed into a new block of ten.
    pub fn raise(&mut self) -> bool {
        let old = self.value;
        self.value = (self.value + self.increment()).min(RATCHET_MAX);
        self.value / 10 > old / 10
    }

    pub fn lower(&mut self) {
        self.value = self.value.saturating_sub(self.decrement()).max(RATCHET_MIN);
    }

    pub fn apply(&mut self, correct: bool) -> bool {
        if correct {
            self.raise()
        } else {
            self.lower();
            false
        }
    }
}

impl From<u32> for TieredRatchet {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<TieredRatchet> for u32 {
    fn from(ratchet: TieredRatchet) -> Self {
        ratchet.value
    }
}

pub const STEP_MIN: u32 = 1;
pub const STEP_MAX: u32 = 12;

/// Word-problem difficulty, one level per answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct StepRatchet {
    value: u32,
}

impl Default for StepRatchet {
    fn default() -> Self {
        Self { value: STEP_MIN }
    }
}

impl StepRatchet {
    pub fn new(value: u32) -> Self {
        Self {
            value: value.clamp(STEP_MIN, STEP_MAX),
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Returns true when the level actually changed.
    pub fn apply(&mut self, correct: bool) -> bool {
        let old = self.value;
        self.value = if correct {
            (self.value + 1).min(STEP_MAX)
        } else {
            self.value.saturating_sub(1).max(STEP_MIN)
        };
        self.value != old
    }
}

impl From<u32> for StepRatchet {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<StepRatchet> for u32 {
    fn from(ratchet: StepRatchet) -> Self {
        ratchet.value
    }
}

pub const LEVEL_MAXIMA: [u32; 5] = [10, 20, 50, 100, 200];
const CORRECT_TO_LEVEL_UP: u32 = 5;

/// Fixed subtraction levels. Five correct answers in a row promote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelLadder {
    /// 1-based, as shown to the learner.
    pub level: usize,
    pub correct_in_level: u32,
}

impl Default for LevelLadder {
    fn default() -> Self {
        Self {
            level: 1,
            correct_in_level: 0,
        }
    }
}

impl LevelLadder {
    pub fn max_operand(&self) -> u32 {
        LEVEL_MAXIMA[self.level.clamp(1, LEVEL_MAXIMA.len()) - 1]
    }

    pub fn is_top(&self) -> bool {
        self.level >= LEVEL_MAXIMA.len()
    }

    /// Returns true on promotion.
    pub fn apply(&mut self, correct: bool) -> bool {
        if !correct {
            self.correct_in_level = 0;
            return false;
        }

        self.correct_in_level += 1;
        if self.correct_in_level >= CORRECT_TO_LEVEL_UP && !self.is_top() {
            self.level += 1;
            self.correct_in_level = 0;
            return true;
        }
        false
    }

    pub fn description(&self) -> String {
        format!("רמה {}: מספרים עד {}", self.level, self.max_operand())
    }
}
