pub mod ai_helper;
pub mod alphabet;
pub mod arithmetic;
pub mod batch;
pub mod difficulty;
pub mod letter_words;
pub mod performance;
pub mod scorer;
pub mod selector;
pub mod session;
pub mod word_problems;

/// A multiple-choice question ready to be shown to the learner.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub text: String,
    pub answers: Vec<Answer>,
}
impl Question {
    pub fn new(text: String, answers: Vec<Answer>) -> Self {
        Self { text, answers }
    }

    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.is_correct)
    }

    /// Position of the answer whose text matches a pressed button.
    pub fn answer_index(&self, text: &str) -> Option<usize> {
        self.answers.iter().position(|a| a.text == text.trim())
    }

    pub fn answer_texts(&self) -> Vec<String> {
        self.answers.iter().map(|a| a.text.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Answer {
    pub text: String,
    pub is_correct: bool,
}
impl Answer {
    pub fn new(text: String, is_correct: bool) -> Self {
        Self { text, is_correct }
    }
}

/// Milliseconds since the Unix epoch, the unit every stored timestamp uses.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_pressed_answer_by_text() {
        let question = Question::new(
            "3 + 4 = ?".to_string(),
            vec![
                Answer::new("6".to_string(), false),
                Answer::new("7".to_string(), true),
            ],
        );
        assert_eq!(question.answer_index(" 7 "), Some(1));
        assert_eq!(question.answer_index("8"), None);
        assert_eq!(question.correct_answer().map(|a| a.text.as_str()), Some("7"));
    }
}
