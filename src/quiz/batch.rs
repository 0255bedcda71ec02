use rand::Rng;
use serde_json::Value;

use super::scorer::{self, Encouragement, ScoreError};

pub const QUESTIONS_PER_BATCH: usize = 5;
pub const OPTIONS_PER_QUESTION: usize = 4;
pub const OPTION_LETTERS: [&str; OPTIONS_PER_QUESTION] = ["א", "ב", "ג", "ד"];

/// Why a generated batch was refused. The whole batch is dropped on any of these.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("מבנה שאלון לא תקין")]
    NotAnObject,
    #[error("טקסט הקריאה חסר או לא תקין")]
    MissingText,
    #[error("כותרת חסרה או לא תקינה")]
    MissingTitle,
    #[error("שאלות חסרות או לא תקינות")]
    MissingQuestions,
    #[error("חייב להיות בדיוק {expected} שאלות (התקבלו {found})")]
    QuestionCount { expected: usize, found: usize },
    #[error("שאלה {0} לא תקינה")]
    EmptyQuestion(usize),
    #[error("שאלה {0} חייבת להכיל 4 אפשרויות")]
    OptionCount(usize),
    #[error("אפשרות {option} בשאלה {question} לא תקינה")]
    EmptyOption { question: usize, option: usize },
    #[error("אינדקס תשובה נכונה חסר בשאלה {0}")]
    MissingCorrectIndex(usize),
    #[error("אינדקס תשובה נכונה לא תקין בשאלה {0}")]
    CorrectIndexOutOfRange(usize),
    #[error("תשובה נכונה חסרה בשאלה {0}")]
    MissingCorrectAnswer(usize),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchQuestion {
    Choice {
        question: String,
        options: [String; OPTIONS_PER_QUESTION],
        correct_index: usize,
    },
    Typed {
        question: String,
        correct_answer: String,
        acceptable_answers: Vec<String>,
    },
}

impl BatchQuestion {
    pub fn question(&self) -> &str {
        match self {
            BatchQuestion::Choice { question, .. } | BatchQuestion::Typed { question, .. } => {
                question
            }
        }
    }

    pub fn correct_text(&self) -> &str {
        match self {
            BatchQuestion::Choice {
                options,
                correct_index,
                ..
            } => options
                .get(*correct_index)
                .map(String::as_str)
                .unwrap_or_default(),
            BatchQuestion::Typed { correct_answer, .. } => correct_answer,
        }
    }
}

/// One passage plus its graded questions, trusted only after validation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizBatch {
    pub title: String,
    pub text: String,
    pub questions: Vec<BatchQuestion>,
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl QuizBatch {
    /// Validates a decoded model reply against the batch shape.
    pub fn from_value(value: &Value, expected: usize) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let text = non_empty_str(object.get("text")).ok_or(ValidationError::MissingText)?;
        let title = non_empty_str(object.get("title")).ok_or(ValidationError::MissingTitle)?;
        let raw_questions = object
            .get("questions")
            .and_then(Value::as_array)
            .ok_or(ValidationError::MissingQuestions)?;

        if raw_questions.len() != expected {
            return Err(ValidationError::QuestionCount {
                expected,
                found: raw_questions.len(),
            });
        }

        let questions = raw_questions
            .iter()
            .enumerate()
            .map(|(idx, raw)| validate_question(raw, idx + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            title,
            text,
            questions,
        })
    }
}

fn validate_question(raw: &Value, number: usize) -> Result<BatchQuestion, ValidationError> {
    let question = non_empty_str(raw.get("question")).ok_or(ValidationError::EmptyQuestion(number))?;

    if raw.get("type").and_then(Value::as_str) == Some("typed") {
        let correct_answer =
            non_empty_str(raw.get("correctAnswer")).ok_or(ValidationError::MissingCorrectAnswer(number))?;
        let acceptable_answers = raw
            .get("acceptableAnswers")
            .and_then(Value::as_array)
            .map(|answers| answers.iter().filter_map(|a| non_empty_str(Some(a))).collect())
            .unwrap_or_default();
        return Ok(BatchQuestion::Typed {
            question,
            correct_answer,
            acceptable_answers,
        });
    }

    let raw_options = raw
        .get("options")
        .and_then(Value::as_array)
        .ok_or(ValidationError::OptionCount(number))?;
    if raw_options.len() != OPTIONS_PER_QUESTION {
        return Err(ValidationError::OptionCount(number));
    }

    let mut options: [String; OPTIONS_PER_QUESTION] = Default::default();
    for (i, option) in raw_options.iter().enumerate() {
        options[i] = non_empty_str(Some(option)).ok_or(ValidationError::EmptyOption {
            question: number,
            option: i + 1,
        })?;
    }

    let index = raw
        .get("correctIndex")
        .filter(|v| v.is_number())
        .ok_or(ValidationError::MissingCorrectIndex(number))?;
    let correct_index = index
        .as_u64()
        .map(|i| i as usize)
        .filter(|i| *i < OPTIONS_PER_QUESTION)
        .ok_or(ValidationError::CorrectIndexOutOfRange(number))?;

    Ok(BatchQuestion::Choice {
        question,
        options,
        correct_index,
    })
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Submitted {
    Choice(usize),
    Typed { text: String, accepted: bool },
}

/// What the learner answered so far for one batch.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnswerSheet {
    answers: Vec<Option<Submitted>>,
}

impl AnswerSheet {
    pub fn for_batch(batch: &QuizBatch) -> Self {
        Self {
            answers: vec![None; batch.questions.len()],
        }
    }

    fn check_question(&self, index: usize) -> Result<(), ScoreError> {
        if index >= self.answers.len() {
            return Err(ScoreError::QuestionOutOfRange {
                index,
                count: self.answers.len(),
            });
        }
        Ok(())
    }

    pub fn record_choice(
        &mut self,
        batch: &QuizBatch,
        index: usize,
        option: usize,
    ) -> Result<bool, ScoreError> {
        self.check_question(index)?;
        let BatchQuestion::Choice { correct_index, .. } = &batch.questions[index] else {
            return Err(ScoreError::WrongAnswerKind { index });
        };
        let correct = scorer::grade_option(option, *correct_index, OPTIONS_PER_QUESTION)?;
        self.answers[index] = Some(Submitted::Choice(option));
        Ok(correct)
    }

    /// Stores a typed answer already judged by the caller.
    pub fn record_typed(
        &mut self,
        batch: &QuizBatch,
        index: usize,
        text: &str,
        accepted: bool,
    ) -> Result<(), ScoreError> {
        self.check_question(index)?;
        if !matches!(batch.questions[index], BatchQuestion::Typed { .. }) {
            return Err(ScoreError::WrongAnswerKind { index });
        }
        self.answers[index] = Some(Submitted::Typed {
            text: text.to_string(),
            accepted,
        });
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.answers.iter().all(Option::is_some)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    /// Index of the first question still waiting for an answer.
    pub fn next_unanswered(&self) -> Option<usize> {
        self.answers.iter().position(Option::is_none)
    }

    pub fn results<R: Rng + ?Sized>(&self, batch: &QuizBatch, rng: &mut R) -> BatchResults {
        let details = batch
            .questions
            .iter()
            .enumerate()
            .map(|(idx, question)| {
                let submitted = self.answers.get(idx).cloned().flatten();
                let (submitted_text, is_correct) = match (&submitted, question) {
                    (
                        Some(Submitted::Choice(option)),
                        BatchQuestion::Choice {
                            options,
                            correct_index,
                            ..
                        },
                    ) => (
                        options.get(*option).cloned().unwrap_or_default(),
                        option == correct_index,
                    ),
                    (Some(Submitted::Typed { text, accepted }), _) => (text.clone(), *accepted),
                    _ => (UNANSWERED.to_string(), false),
                };
                ResultDetail {
                    number: idx + 1,
                    question: question.question().to_string(),
                    submitted: submitted_text,
                    correct_answer: question.correct_text().to_string(),
                    is_correct,
                }
            })
            .collect::<Vec<_>>();

        let score = details.iter().filter(|d| d.is_correct).count();
        let total = batch.questions.len();
        let percentage = scorer::percentage(score, total);

        BatchResults {
            score,
            total,
            percentage,
            message: Encouragement::message(percentage, rng),
            details,
        }
    }
}

const UNANSWERED: &str = "לא נענה";

#[derive(Debug, Clone, PartialEq)]
pub struct ResultDetail {
    pub number: usize,
    pub question: String,
    pub submitted: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResults {
    pub score: usize,
    pub total: usize,
    pub percentage: u32,
    pub message: String,
    pub details: Vec<ResultDetail>,
}

impl BatchResults {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("{}/{} ({}%)", self.score, self.total, self.percentage),
            self.message.clone(),
            String::new(),
        ];
        for detail in &self.details {
            let mark = if detail.is_correct { "✓" } else { "✗" };
            lines.push(format!("{} {}. {}", mark, detail.number, detail.question));
            lines.push(format!("   תשובתך: {}", detail.submitted));
            if !detail.is_correct {
                lines.push(format!("   התשובה הנכונה: {}", detail.correct_answer));
            }
        }
        lines.join("\n")
    }
}

/// Deterministic typed-answer check: trimmed exact match against the
/// expected answer or any listed alternative.
pub fn local_typed_match(submitted: &str, correct: &str, acceptable: &[String]) -> bool {
    let submitted = submitted.trim();
    !submitted.is_empty()
        && (submitted == correct.trim() || acceptable.iter().any(|a| a.trim() == submitted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    fn choice(correct_index: i64) -> Value {
        json!({
            "question": "מה עשה הכלב?",
            "options": ["רץ", "ישן", "אכל", "נבח"],
            "correctIndex": correct_index
        })
    }

    fn batch_json(questions: Vec<Value>) -> Value {
        json!({ "title": "הכלב", "text": "הכלב רץ בפארק.", "questions": questions })
    }

    #[test]
    fn accepts_well_formed_batch() {
        let value = batch_json((0..5).map(|i| choice(i % 4)).collect());
        let batch = QuizBatch::from_value(&value, QUESTIONS_PER_BATCH).unwrap();
        assert_eq!(batch.questions.len(), 5);
        assert_eq!(batch.questions[1].correct_text(), "ישן");
    }

    #[test]
    fn rejects_wrong_question_count() {
        let value = batch_json((0..4).map(|_| choice(0)).collect());
        assert_eq!(
            QuizBatch::from_value(&value, QUESTIONS_PER_BATCH),
            Err(ValidationError::QuestionCount { expected: 5, found: 4 })
        );
    }

    #[test]
    fn rejects_three_options() {
        let mut questions = (0..5).map(|_| choice(0)).collect::<Vec<_>>();
        questions[2]["options"] = json!(["רץ", "ישן", "אכל"]);
        assert_eq!(
            QuizBatch::from_value(&batch_json(questions), QUESTIONS_PER_BATCH),
            Err(ValidationError::OptionCount(3))
        );
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut questions = (0..5).map(|_| choice(0)).collect::<Vec<_>>();
        questions[4] = choice(4);
        assert_eq!(
            QuizBatch::from_value(&batch_json(questions.clone()), QUESTIONS_PER_BATCH),
            Err(ValidationError::CorrectIndexOutOfRange(5))
        );
        questions[4] = choice(-1);
        assert_eq!(
            QuizBatch::from_value(&batch_json(questions), QUESTIONS_PER_BATCH),
            Err(ValidationError::CorrectIndexOutOfRange(5))
        );
    }

    #[test]
    fn rejects_missing_title_and_blank_options() {
        let mut value = batch_json((0..5).map(|_| choice(0)).collect());
        value["title"] = json!("  ");
        assert_eq!(
            QuizBatch::from_value(&value, QUESTIONS_PER_BATCH),
            Err(ValidationError::MissingTitle)
        );

        let mut questions = (0..5).map(|_| choice(0)).collect::<Vec<_>>();
        questions[0]["options"][1] = json!("");
        assert_eq!(
            QuizBatch::from_value(&batch_json(questions), QUESTIONS_PER_BATCH),
            Err(ValidationError::EmptyOption { question: 1, option: 2 })
        );
    }

    #[test]
    fn typed_questions_need_an_answer() {
        let mut questions = (0..4).map(|_| choice(0)).collect::<Vec<_>>();
        questions.push(json!({ "type": "typed", "question": "מה צבע השמיים?", "correctAnswer": "" }));
        assert_eq!(
            QuizBatch::from_value(&batch_json(questions.clone()), QUESTIONS_PER_BATCH),
            Err(ValidationError::MissingCorrectAnswer(5))
        );

        questions[4] = json!({
            "type": "typed",
            "question": "מה צבע השמיים?",
            "correctAnswer": "כחול",
            "acceptableAnswers": ["תכלת", ""]
        });
        let batch = QuizBatch::from_value(&batch_json(questions), QUESTIONS_PER_BATCH).unwrap();
        assert_eq!(
            batch.questions[4],
            BatchQuestion::Typed {
                question: "מה צבע השמיים?".to_string(),
                correct_answer: "כחול".to_string(),
                acceptable_answers: vec!["תכלת".to_string()],
            }
        );
    }

    #[test]
    fn sheet_scores_and_reports_details() {
        let value = batch_json((0..5).map(|_| choice(3)).collect());
        let batch = QuizBatch::from_value(&value, QUESTIONS_PER_BATCH).unwrap();
        let mut sheet = AnswerSheet::for_batch(&batch);

        assert_eq!(sheet.record_choice(&batch, 0, 3), Ok(true));
        assert_eq!(sheet.record_choice(&batch, 1, 0), Ok(false));
        assert_eq!(sheet.record_choice(&batch, 2, 3), Ok(true));
        assert_eq!(sheet.record_choice(&batch, 3, 3), Ok(true));
        assert!(!sheet.is_complete());
        assert_eq!(sheet.next_unanswered(), Some(4));

        let mut rng = StdRng::seed_from_u64(5);
        let results = sheet.results(&batch, &mut rng);
        assert_eq!(results.score, 3);
        assert_eq!(results.percentage, 60);
        assert_eq!(results.details[1].submitted, "רץ");
        assert_eq!(results.details[1].correct_answer, "נבח");
        assert_eq!(results.details[4].submitted, UNANSWERED);
        assert!(Encouragement::Okay.pool().contains(&results.message.as_str()));
    }

    #[test]
    fn mixed_sheet_grades_typed_answers_as_judged() {
        let mut questions = (0..3).map(|_| choice(3)).collect::<Vec<_>>();
        for _ in 0..2 {
            questions.push(json!({
                "type": "typed",
                "question": "מה צבע השמיים?",
                "correctAnswer": "כחול",
                "acceptableAnswers": ["תכלת"]
            }));
        }
        let batch = QuizBatch::from_value(&batch_json(questions), QUESTIONS_PER_BATCH).unwrap();
        let mut sheet = AnswerSheet::for_batch(&batch);

        assert_eq!(sheet.record_choice(&batch, 0, 3), Ok(true));
        assert_eq!(sheet.record_choice(&batch, 1, 1), Ok(false));
        assert_eq!(sheet.record_choice(&batch, 2, 3), Ok(true));
        assert_eq!(sheet.record_typed(&batch, 3, "תכלת", true), Ok(()));
        assert_eq!(sheet.record_typed(&batch, 4, "ירוק", false), Ok(()));
        assert!(sheet.is_complete());

        let mut rng = StdRng::seed_from_u64(8);
        let results = sheet.results(&batch, &mut rng);
        assert_eq!((results.score, results.total, results.percentage), (3, 5, 60));
        assert!(results.details[3].is_correct);
        assert_eq!(results.details[3].submitted, "תכלת");
        assert!(!results.details[4].is_correct);
        assert_eq!(results.details[4].submitted, "ירוק");
        assert_eq!(results.details[4].correct_answer, "כחול");

        let summary = results.summary();
        assert!(summary.starts_with("3/5 (60%)"));
        assert!(summary.contains("✓ 4. מה צבע השמיים?\n   תשובתך: תכלת\n✗ 5."));
        assert!(summary.contains("   תשובתך: ירוק\n   התשובה הנכונה: כחול"));
        assert!(summary.contains("✗ 2. מה עשה הכלב?\n   תשובתך: ישן\n   התשובה הנכונה: נבח"));
    }

    #[test]
    fn corrupt_correct_index_reads_as_empty() {
        let question = BatchQuestion::Choice {
            question: "מה עשה הכלב?".to_string(),
            options: ["רץ", "ישן", "אכל", "נבח"].map(String::from),
            correct_index: 9,
        };
        assert_eq!(question.correct_text(), "");
    }

    #[test]
    fn out_of_range_answers_are_programmer_errors() {
        let value = batch_json((0..5).map(|_| choice(0)).collect());
        let batch = QuizBatch::from_value(&value, QUESTIONS_PER_BATCH).unwrap();
        let mut sheet = AnswerSheet::for_batch(&batch);
        assert_eq!(
            sheet.record_choice(&batch, 5, 0),
            Err(ScoreError::QuestionOutOfRange { index: 5, count: 5 })
        );
        assert_eq!(
            sheet.record_choice(&batch, 0, 4),
            Err(ScoreError::OptionOutOfRange { selected: 4, count: 4 })
        );
        assert_eq!(
            sheet.record_typed(&batch, 0, "x", true),
            Err(ScoreError::WrongAnswerKind { index: 0 })
        );
    }

    #[test]
    fn local_match_is_trimmed_exact() {
        let acceptable = vec!["תכלת".to_string()];
        assert!(local_typed_match(" כחול ", "כחול", &acceptable));
        assert!(local_typed_match("תכלת", "כחול", &acceptable));
        assert!(!local_typed_match("כחולים", "כחול", &acceptable));
        assert!(!local_typed_match("  ", "", &[]));
    }
}
