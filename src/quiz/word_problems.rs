use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::{self, difficulty::StepRatchet, scorer::SessionState, selector};

const BANK_JSON: &str = include_str!("../../data/word_problems.json");

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("word problem bank is malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("problem {0} has a correct index outside its answers")]
    CorrectOutOfRange(usize),
    #[error("word problem bank is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WordProblem {
    pub difficulty: u32,
    pub passage: String,
    pub question: String,
    pub answers: Vec<String>,
    pub correct: usize,
}

impl WordProblem {
    pub fn correct_answer(&self) -> &str {
        &self.answers[self.correct]
    }

    /// Shown with the options shuffled; the bank lists the correct one first.
    pub fn to_question<R: Rng + ?Sized>(&self, rng: &mut R) -> quiz::Question {
        let mut answers = self
            .answers
            .iter()
            .enumerate()
            .map(|(i, text)| quiz::Answer::new(text.clone(), i == self.correct))
            .collect::<Vec<_>>();
        answers.shuffle(rng);
        quiz::Question::new(format!("{}\n\n{}", self.passage, self.question), answers)
    }
}

#[derive(Debug, Clone)]
pub struct ProblemBank {
    problems: Vec<WordProblem>,
}

impl ProblemBank {
    pub fn builtin() -> Result<Self, BankError> {
        Self::from_json(BANK_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, BankError> {
        let problems: Vec<WordProblem> = serde_json::from_str(json)?;
        if problems.is_empty() {
            return Err(BankError::Empty);
        }
        if let Some(bad) = problems.iter().position(|p| p.correct >= p.answers.len()) {
            return Err(BankError::CorrectOutOfRange(bad));
        }
        Ok(Self { problems })
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Uniform among problems at `difficulty`, else the closest one.
    pub fn pick<R: Rng + ?Sized>(&self, difficulty: u32, rng: &mut R) -> Option<&WordProblem> {
        let matching = self
            .problems
            .iter()
            .filter(|p| p.difficulty == difficulty)
            .collect::<Vec<_>>();

        match matching.choose(rng) {
            Some(problem) => Some(*problem),
            None => selector::closest_by_difficulty(&self.problems, difficulty as i64, |p| {
                p.difficulty as i64
            }),
        }
    }
}

pub fn level_description(difficulty: u32) -> &'static str {
    match difficulty {
        1 => "רמה 1: חיבור פשוט עד 10",
        2 => "רמה 2: חיסור פשוט עד 10",
        3 => "רמה 3: חיבור עד 20",
        4 => "רמה 4: חיסור עד 20",
        5 => "רמה 5: כפל פשוט (×2, ×3, ×5)",
        6 => "רמה 6: בעיות בשני שלבים",
        7 => "רמה 7: כפל מורכב (×4, ×6, ×7)",
        8 => "רמה 8: חילוק",
        9 => "רמה 9: פעולות מעורבות",
        10 => "רמה 10: בעיות מורכבות",
        11 => "רמה 11: בעיות רב-שלביות מתקדמות",
        12 => "רמה 12: מומחה בעיות מילוליות! 🏆",
        _ => "המשך להתקדם!",
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordProblemGame {
    pub difficulty: StepRatchet,
    #[serde(flatten)]
    pub session: SessionState,
}

impl WordProblemGame {
    /// Scores the answer at the difficulty it was asked at, then moves the
    /// difficulty. Returns true when the level changed.
    pub fn answer(&mut self, correct: bool, now: i64) -> bool {
        self.session.apply(correct, self.difficulty.value(), now);
        self.difficulty.apply(correct)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn builtin_bank_covers_every_level() {
        let bank = ProblemBank::builtin().unwrap();
        assert_eq!(bank.len(), 72);
        for level in 1..=12 {
            assert!(bank.problems.iter().any(|p| p.difficulty == level));
        }
    }

    #[test]
    fn pick_prefers_exact_level() {
        let bank = ProblemBank::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(bank.pick(7, &mut rng).unwrap().difficulty, 7);
        }
    }

    #[test]
    fn pick_falls_back_to_closest() {
        let json = r#"[
            {"difficulty": 1, "passage": "p", "question": "q", "answers": ["1","2","3","4"], "correct": 0},
            {"difficulty": 5, "passage": "p", "question": "q", "answers": ["1","2","3","4"], "correct": 0},
            {"difficulty": 9, "passage": "p", "question": "q", "answers": ["1","2","3","4"], "correct": 0}
        ]"#;
        let bank = ProblemBank::from_json(json).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(bank.pick(6, &mut rng).unwrap().difficulty, 5);
        assert_eq!(bank.pick(12, &mut rng).unwrap().difficulty, 9);
        // 3 is equally far from 1 and 5.
        assert_eq!(bank.pick(3, &mut rng).unwrap().difficulty, 1);
    }

    #[test]
    fn malformed_banks_are_rejected() {
        assert!(matches!(ProblemBank::from_json("[]"), Err(BankError::Empty)));
        let json = r#"[{"difficulty": 1, "passage": "p", "question": "q", "answers": ["1"], "correct": 3}]"#;
        assert!(matches!(
            ProblemBank::from_json(json),
            Err(BankError::CorrectOutOfRange(0))
        ));
    }

    #[test]
    fn shuffled_question_keeps_the_right_answer() {
        let bank = ProblemBank::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let problem = bank.pick(3, &mut rng).unwrap();
        let question = problem.to_question(&mut rng);
        assert_eq!(question.answers.len(), 4);
        assert_eq!(
            question.correct_answer().unwrap().text,
            problem.correct_answer()
        );
    }

    #[test]
    fn score_follows_difficulty() {
        let mut game = WordProblemGame::default();
        assert!(game.answer(true, 0));
        assert!(game.answer(true, 0));
        // 1 + 2
        assert_eq!(game.session.score, 3);
        assert_eq!(game.difficulty.value(), 3);
        assert!(game.answer(false, 0));
        assert_eq!(game.difficulty.value(), 2);
        assert_eq!(game.session.streak, 0);
        assert_eq!(level_description(2), "רמה 2: חיסור פשוט עד 10");
    }
}
