use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::{
    self,
    difficulty::{LevelLadder, TieredRatchet},
    performance::PerformanceRecord,
    scorer::SessionState,
    selector::{self, SelectError},
};

pub const OPTION_COUNT: usize = 4;
pub const MIN_RANGE: u32 = 2;
pub const MAX_RANGE: u32 = 12;
pub const DEFAULT_RANGE: u32 = 5;

// Decoy generation gives up after this many draws and fills the rest in order.
const MAX_DECOY_ATTEMPTS: usize = 200;

/// A multiplication fact, identified by its two factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fact {
    pub a: u32,
    pub b: u32,
}

impl Fact {
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }

    pub fn product(&self) -> u32 {
        self.a * self.b
    }
}

/// A fact plus its learning history, stored under the same field names the
/// progress file has always used.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FactRecord {
    pub num1: u32,
    pub num2: u32,
    pub answer: u32,
    #[serde(flatten)]
    pub performance: PerformanceRecord,
}

impl FactRecord {
    fn new(fact: Fact) -> Self {
        Self {
            num1: fact.a,
            num2: fact.b,
            answer: fact.product(),
            performance: PerformanceRecord::default(),
        }
    }

    pub fn fact(&self) -> Fact {
        Fact::new(self.num1, self.num2)
    }
}

/// The fact as it is put to the learner: either `a × b` or one of the two
/// divisions it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FactVariant {
    pub fact: Fact,
    pub is_division: bool,
    pub left: u32,
    pub right: u32,
    pub answer: u32,
}

impl FactVariant {
    pub fn multiplication(fact: Fact) -> Self {
        Self {
            fact,
            is_division: false,
            left: fact.a,
            right: fact.b,
            answer: fact.product(),
        }
    }

    pub fn division(fact: Fact, divide_by_first: bool) -> Self {
        let (right, answer) = if divide_by_first {
            (fact.a, fact.b)
        } else {
            (fact.b, fact.a)
        };
        Self {
            fact,
            is_division: true,
            left: fact.product(),
            right,
            answer,
        }
    }

    pub fn operator(&self) -> &'static str {
        if self.is_division {
            "÷"
        } else {
            "×"
        }
    }

    pub fn prompt(&self) -> String {
        format!("{} {} {} = ?", self.left, self.operator(), self.right)
    }

    /// The inverse operation, shown after a miss.
    pub fn explain(&self) -> String {
        if self.is_division {
            format!("כי {} × {} = {}", self.answer, self.right, self.left)
        } else {
            format!("אפשר לבדוק: {} ÷ {} = {}", self.answer, self.right, self.left)
        }
    }

    pub fn to_question<R: Rng + ?Sized>(&self, max_number: u32, rng: &mut R) -> quiz::Question {
        numbers_to_question(self.prompt(), self.answer as i64, multiplication_options(self, max_number, rng))
    }
}

/// Spaced-repetition bank over every fact in `1..=max_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactTracker {
    max_number: u32,
    records: Vec<FactRecord>,
}

fn build_bank(max_number: u32) -> Vec<FactRecord> {
    (1..=max_number)
        .flat_map(|a| (1..=max_number).map(move |b| FactRecord::new(Fact::new(a, b))))
        .collect()
}

impl FactTracker {
    pub fn new(max_number: u32) -> Self {
        let max_number = max_number.clamp(MIN_RANGE, MAX_RANGE);
        Self {
            max_number,
            records: build_bank(max_number),
        }
    }

    pub fn max_number(&self) -> u32 {
        self.max_number
    }

    pub fn records(&self) -> &[FactRecord] {
        &self.records
    }

    pub fn record_for(&self, fact: Fact) -> Option<&FactRecord> {
        self.records.iter().find(|r| r.fact() == fact)
    }

    /// Rebuilds the bank for a new range, carrying over progress for every
    /// fact that exists in both.
    pub fn update_range(&mut self, max_number: u32) {
        let max_number = max_number.clamp(MIN_RANGE, MAX_RANGE);
        let old = std::mem::take(&mut self.records);
        self.records = build_bank(max_number)
            .into_iter()
            .map(|mut record| {
                if let Some(previous) = old.iter().find(|o| o.fact() == record.fact()) {
                    record.performance = previous.performance.clone();
                }
                record
            })
            .collect();
        self.max_number = max_number;
    }

    /// Adopts stored records only when they match the current bank size.
    pub fn restore(&mut self, mut stored: Vec<FactRecord>) -> bool {
        if stored.len() != self.records.len() {
            log::warn!(
                "Ignoring stored progress: {} records for a bank of {}",
                stored.len(),
                self.records.len()
            );
            return false;
        }
        for record in stored.iter_mut() {
            record.performance.clamp();
        }
        self.records = stored;
        true
    }

    pub fn reset(&mut self) {
        self.records = build_bank(self.max_number);
    }

    pub fn next_question<R: Rng + ?Sized>(&self, now: i64, rng: &mut R) -> Result<FactVariant, SelectError> {
        let weights = self
            .records
            .iter()
            .map(|r| selector::effective_weight(&r.performance, now))
            .collect::<Vec<_>>();
        let index = selector::pick_weighted(&weights, rng)?;
        let fact = self.records[index].fact();

        Ok(if rng.gen_bool(0.5) {
            FactVariant::division(fact, rng.gen_bool(0.5))
        } else {
            FactVariant::multiplication(fact)
        })
    }

    /// Returns false if the fact fell out of the bank since it was asked.
    pub fn record(&mut self, fact: Fact, correct: bool, now: i64) -> bool {
        match self.records.iter_mut().find(|r| r.fact() == fact) {
            Some(record) => {
                record.performance.record(correct, now);
                true
            }
            None => {
                log::warn!("Answer for {}×{} is outside the current range", fact.a, fact.b);
                false
            }
        }
    }
}

/// Collects `OPTION_COUNT` distinct numbers starting with the correct one,
/// then shuffles them.
fn collect_options<R, F, V>(correct: i64, rng: &mut R, mut candidate: F, valid: V) -> Vec<i64>
where
    R: Rng + ?Sized,
    F: FnMut(&mut R) -> i64,
    V: Fn(i64) -> bool,
{
    let mut options = vec![correct];
    let mut attempts = 0;
    while options.len() < OPTION_COUNT && attempts < MAX_DECOY_ATTEMPTS {
        attempts += 1;
        let wrong = candidate(&mut *rng);
        if valid(wrong) && !options.contains(&wrong) {
            options.push(wrong);
        }
    }

    let mut filler = correct + 1;
    while options.len() < OPTION_COUNT {
        if !options.contains(&filler) {
            options.push(filler);
        }
        filler += 1;
    }

    options.shuffle(rng);
    options
}

pub fn multiplication_options<R: Rng + ?Sized>(variant: &FactVariant, max_number: u32, rng: &mut R) -> Vec<i64> {
    let correct = variant.answer as i64;
    let max_value = if variant.is_division {
        max_number as i64 * 2
    } else {
        225
    };

    collect_options(
        correct,
        rng,
        |rng| {
            let roll = rng.gen::<f64>();
            if variant.is_division {
                match roll {
                    r if r < 0.4 => correct + rng.gen_range(-3..3),
                    // Classic slip: answering with the divisor or the dividend.
                    r if r < 0.6 => variant.right as i64,
                    r if r < 0.8 => variant.left as i64,
                    _ => rng.gen_range(1..=max_number as i64),
                }
            } else {
                match roll {
                    r if r < 0.4 => correct + rng.gen_range(-5..5),
                    // Off by one group of either factor.
                    r if r < 0.7 => {
                        let factor = i64::from(if rng.gen_bool(0.5) {
                            variant.left
                        } else {
                            variant.right
                        });
                        if rng.gen_bool(0.5) {
                            correct + factor
                        } else {
                            correct - factor
                        }
                    }
                    _ => rng.gen_range(0..(max_number * max_number) as i64),
                }
            }
        },
        |wrong| wrong > 0 && wrong <= max_value,
    )
}

fn numbers_to_question(prompt: String, correct: i64, options: Vec<i64>) -> quiz::Question {
    quiz::Question::new(
        prompt,
        options
            .into_iter()
            .map(|o| quiz::Answer::new(o.to_string(), o == correct))
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operation {
    Add,
    Subtract,
}

impl Operation {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operation::Add => "+",
            Operation::Subtract => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Problem {
    pub left: u32,
    pub right: u32,
    pub operation: Operation,
    pub answer: u32,
}

impl Problem {
    pub fn prompt(&self) -> String {
        format!("{} {} {} = ?", self.left, self.operation.symbol(), self.right)
    }

    /// The column layout shown after answering, digits right-aligned.
    pub fn vertical(&self) -> String {
        let width = [self.left, self.right, self.answer]
            .iter()
            .map(|n| n.to_string().len())
            .max()
            .unwrap_or(1);
        format!(
            "  {:>w$}\n{} {:>w$}\n  {}\n  {:>w$}",
            self.left,
            self.operation.symbol(),
            self.right,
            "-".repeat(width),
            self.answer,
            w = width
        )
    }
}

/// Subtraction with a non-negative result; the right operand is kept from
/// always equalling the left one.
fn subtraction<R: Rng + ?Sized>(max: u32, rng: &mut R) -> Problem {
    let left = rng.gen_range(1..=max);
    let mut right = rng.gen_range(1..=left);
    if right == left {
        right = rng.gen_range(0..left);
    }
    Problem {
        left,
        right,
        operation: Operation::Subtract,
        answer: left - right,
    }
}

fn subtraction_question<R: Rng + ?Sized>(problem: &Problem, random_max: u32, rng: &mut R) -> quiz::Question {
    let correct = problem.answer as i64;
    let options = collect_options(
        correct,
        rng,
        |rng| {
            if rng.gen_bool(0.5) {
                correct + rng.gen_range(-10..10)
            } else {
                rng.gen_range(0..random_max.max(1) as i64)
            }
        },
        |wrong| wrong >= 0,
    );
    numbers_to_question(problem.prompt(), correct, options)
}

/// Mixed addition and subtraction whose operand range follows the
/// tiered ratchet.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSubtractGame {
    pub difficulty: TieredRatchet,
    #[serde(flatten)]
    pub session: SessionState,
}

impl AddSubtractGame {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Problem {
        let max = self.difficulty.value();
        if rng.gen_bool(0.5) {
            let left = rng.gen_range(1..=max);
            let right = rng.gen_range(1..=max);
            Problem {
                left,
                right,
                operation: Operation::Add,
                answer: left + right,
            }
        } else {
            subtraction(max, rng)
        }
    }

    pub fn question<R: Rng + ?Sized>(&self, problem: &Problem, rng: &mut R) -> quiz::Question {
        let max = self.difficulty.value();
        match problem.operation {
            Operation::Subtract => subtraction_question(problem, max, rng),
            Operation::Add => {
                let correct = problem.answer as i64;
                let options = collect_options(
                    correct,
                    rng,
                    |rng| {
                        if rng.gen_bool(0.5) {
                            correct + rng.gen_range(-10..10)
                        } else {
                            rng.gen_range(1..=(max * 2) as i64)
                        }
                    },
                    |wrong| wrong >= 0,
                );
                numbers_to_question(problem.prompt(), correct, options)
            }
        }
    }

    /// Returns true when the range crossed a new block of ten.
    pub fn answer(&mut self, correct: bool, now: i64) -> bool {
        self.session.apply(correct, 1, now);
        self.difficulty.apply(correct)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Subtraction through fixed levels.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtractionGame {
    #[serde(flatten)]
    pub ladder: LevelLadder,
    #[serde(flatten)]
    pub session: SessionState,
}

impl SubtractionGame {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Problem {
        subtraction(self.ladder.max_operand(), rng)
    }

    pub fn question<R: Rng + ?Sized>(&self, problem: &Problem, rng: &mut R) -> quiz::Question {
        subtraction_question(problem, self.ladder.max_operand(), rng)
    }

    /// Returns true on promotion to the next level.
    pub fn answer(&mut self, correct: bool, now: i64) -> bool {
        self.session.apply(correct, 1, now);
        self.ladder.apply(correct)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
