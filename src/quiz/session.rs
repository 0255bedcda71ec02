use std::time::Duration;

/// Where a drill is between two questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    #[default]
    Presenting,
    Feedback,
    Advancing,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot {action} while {from:?}")]
pub struct PhaseError {
    pub from: Phase,
    pub action: &'static str,
}

/// How long feedback stays up and how long to pause before the next question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub feedback: Duration,
    pub advance: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            feedback: Duration::from_millis(2000),
            advance: Duration::from_millis(500),
        }
    }
}

impl Phase {
    /// Presenting -> Feedback. Returns how long feedback should stay up.
    pub fn answered(&mut self, pacing: &Pacing) -> Result<Duration, PhaseError> {
        self.step(Phase::Presenting, Phase::Feedback, "answer")?;
        Ok(pacing.feedback)
    }

    /// Feedback -> Advancing. Returns the pause before the next question.
    pub fn feedback_elapsed(&mut self, pacing: &Pacing) -> Result<Duration, PhaseError> {
        self.step(Phase::Feedback, Phase::Advancing, "leave feedback")?;
        Ok(pacing.advance)
    }

    /// Advancing -> Presenting.
    pub fn presented(&mut self) -> Result<(), PhaseError> {
        self.step(Phase::Advancing, Phase::Presenting, "present")
    }

    /// Feedback -> Presenting, for games that keep the same item after a miss.
    pub fn retry(&mut self) -> Result<(), PhaseError> {
        self.step(Phase::Feedback, Phase::Presenting, "retry")
    }

    fn step(&mut self, expected: Phase, next: Phase, action: &'static str) -> Result<(), PhaseError> {
        if *self != expected {
            return Err(PhaseError { from: *self, action });
        }
        *self = next;
        Ok(())
    }
}

/// One question as it was posted to the chat.
///
/// Chat message ids only grow, so a reply with an id below the question's
/// was sent before the question existed: a tap queued up while the previous
/// feedback was still on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub phase: Phase,
    pub question_message: i32,
}

impl Turn {
    pub fn posted(question_message: i32) -> Self {
        Self {
            phase: Phase::Presenting,
            question_message,
        }
    }

    pub fn accepts(&self, reply_message: i32) -> bool {
        self.phase == Phase::Presenting && reply_message > self.question_message
    }
}
