use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("option {selected} is out of range for {count} options")]
    OptionOutOfRange { selected: usize, count: usize },
    #[error("question {index} is out of range for {count} questions")]
    QuestionOutOfRange { index: usize, count: usize },
    #[error("question {index} does not take this kind of answer")]
    WrongAnswerKind { index: usize },
}

pub fn grade_number(submitted: i64, expected: i64) -> bool {
    submitted == expected
}

/// Spelling is graded letter for letter; no tolerance for variants.
pub fn grade_text(submitted: &str, expected: &str) -> bool {
    submitted == expected
}

pub fn grade_option(selected: usize, correct: usize, count: usize) -> Result<bool, ScoreError> {
    if selected >= count {
        return Err(ScoreError::OptionOutOfRange { selected, count });
    }
    Ok(selected == correct)
}

pub fn numeric_feedback(correct: bool, expected: i64) -> String {
    if correct {
        "✓ נכון מצוין!".to_string()
    } else {
        format!("✗ טעות! התשובה הנכונה היא {}", expected)
    }
}

/// Counters for one chat's practice, restored across restarts where the game
/// persists them.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub score: u32,
    pub streak: u32,
    #[serde(default)]
    pub question_count: u32,
    #[serde(rename = "totalTimeSpent", default)]
    pub total_time_secs: u64,
    #[serde(default)]
    pub last_played: i64,
    #[serde(skip)]
    pub started_at: Option<i64>,
}

impl SessionState {
    pub fn start(&mut self, now: i64) {
        self.started_at = Some(now);
    }

    /// Folds the running sitting into the total and stops the clock.
    pub fn stop(&mut self, now: i64) {
        self.total_time_secs = self.elapsed_secs(now);
        self.started_at = None;
        self.last_played = now;
    }

    pub fn elapsed_secs(&self, now: i64) -> u64 {
        let running = self
            .started_at
            .map(|start| ((now - start).max(0) / 1000) as u64)
            .unwrap_or(0);
        self.total_time_secs + running
    }

    pub fn apply(&mut self, correct: bool, points: u32, now: i64) {
        self.question_count += 1;
        if correct {
            self.score += points;
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        self.last_played = now;
    }

    pub fn has_progress(&self) -> bool {
        self.score > 0 || self.total_time_secs > 0
    }

    pub fn welcome_back(&self, now: i64) -> String {
        let hours = (now - self.last_played).max(0) / (1000 * 60 * 60);
        match hours {
            0 => "ברוך שובך! מוכן להמשיך?".to_string(),
            1 => "ברוך שובך! תרגלת לפני שעה.".to_string(),
            h if h < 24 => format!("ברוך שובך! תרגלת לפני {} שעות.", h),
            h if h < 48 => "ברוך שובך! תרגלת לפני יום.".to_string(),
            h => format!("ברוך שובך! תרגלת לפני {} ימים.", h / 24),
        }
    }
}

pub fn format_time(seconds: u64) -> String {
    let mins = seconds / 60;
    let secs = seconds % 60;
    if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Rounded percentage, halves rounding up.
pub fn percentage(score: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((score as f64 / total as f64) * 100.0).round() as u32
}

const PERFECT: [&str; 5] = ["מצוין!", "כל הכבוד!", "פנטסטי!", "מושלם!", "יופי של עבודה!"];
const GOOD: [&str; 5] = ["עבודה טובה!", "יפה מאוד!", "כמעט מושלם!", "ממש יפה!", "עבודה מעולה!"];
const OKAY: [&str; 5] = ["לא רע!", "אפשר להשתפר!", "עבודה סבירה", "כיוון טוב!", "בדרך הנכונה"];
const NEEDS_WORK: [&str; 5] = [
    "כדאי לנסות שוב",
    "בואו ננסה עוד פעם",
    "אל תוותרו!",
    "נמשיך לתרגל",
    "בפעם הבאה יהיה יותר טוב",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encouragement {
    Perfect,
    Good,
    Okay,
    NeedsWork,
}

impl Encouragement {
    pub fn for_percentage(percentage: u32) -> Self {
        match percentage {
            100.. => Encouragement::Perfect,
            80..=99 => Encouragement::Good,
            60..=79 => Encouragement::Okay,
            _ => Encouragement::NeedsWork,
        }
    }

    pub fn pool(&self) -> &'static [&'static str] {
        match self {
            Encouragement::Perfect => &PERFECT,
            Encouragement::Good => &GOOD,
            Encouragement::Okay => &OKAY,
            Encouragement::NeedsWork => &NEEDS_WORK,
        }
    }

    pub fn message<R: Rng + ?Sized>(percentage: u32, rng: &mut R) -> String {
        Self::for_percentage(percentage)
            .pool()
            .choose(rng)
            .map(|m| m.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn numeric_grading_and_feedback() {
        assert!(grade_number(7, 7));
        assert!(!grade_number(6, 7));
        assert!(numeric_feedback(false, 7).contains('7'));
    }

    #[test]
    fn spelling_is_exact() {
        assert!(grade_text("חתול", "חתול"));
        assert!(!grade_text("חתל", "חתול"));
        assert!(!grade_text("חתול ", "חתול"));
    }

    #[test]
    fn option_out_of_range_is_raised() {
        assert_eq!(grade_option(2, 2, 4), Ok(true));
        assert_eq!(grade_option(1, 2, 4), Ok(false));
        assert_eq!(
            grade_option(4, 0, 4),
            Err(ScoreError::OptionOutOfRange { selected: 4, count: 4 })
        );
    }

    #[test]
    fn session_counts_streaks() {
        let mut session = SessionState::default();
        session.apply(true, 1, 10);
        session.apply(true, 3, 20);
        assert_eq!((session.score, session.streak, session.question_count), (4, 2, 2));
        session.apply(false, 1, 30);
        assert_eq!((session.score, session.streak, session.question_count), (4, 0, 3));
        assert_eq!(session.last_played, 30);
    }

    #[test]
    fn session_clock_accumulates() {
        let mut session = SessionState {
            total_time_secs: 30,
            ..Default::default()
        };
        session.start(1_000);
        assert_eq!(session.elapsed_secs(11_000), 40);
        session.stop(21_000);
        assert_eq!(session.total_time_secs, 50);
        assert_eq!(session.elapsed_secs(99_000), 50);
        assert_eq!(format_time(50), "50s");
        assert_eq!(format_time(125), "2m 5s");
    }

    #[test]
    fn encouragement_bands() {
        assert_eq!(Encouragement::for_percentage(100), Encouragement::Perfect);
        assert_eq!(Encouragement::for_percentage(80), Encouragement::Good);
        assert_eq!(Encouragement::for_percentage(60), Encouragement::Okay);
        assert_eq!(Encouragement::for_percentage(59), Encouragement::NeedsWork);

        let mut rng = StdRng::seed_from_u64(11);
        let message = Encouragement::message(40, &mut rng);
        assert!(NEEDS_WORK.contains(&message.as_str()));
    }

    #[test]
    fn percentage_rounds() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(5, 5), 100);
        assert_eq!(percentage(0, 0), 0);
    }
}
