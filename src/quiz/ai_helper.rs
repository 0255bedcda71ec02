use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use chatgpt::{client::ChatGPT, config::ChatGPTEngine, types::CompletionResponse};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

use super::batch::{self, QuizBatch, ValidationError, OPTIONS_PER_QUESTION, QUESTIONS_PER_BATCH};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    #[default]
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Anthropic, Provider::OpenAi, Provider::OpenRouter];

    /// Chat-completions endpoint. Every provider speaks the OpenAI wire format
    /// on this URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com/v1/chat/completions",
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions",
            Provider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        }
    }

    pub fn model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::OpenAi => "gpt-4",
            Provider::OpenRouter => "anthropic/claude-3.5-sonnet",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown provider '{0}'")]
pub struct UnknownProvider(String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// What the learner sees when generation fails. Every failure lands in one
/// of these six buckets.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("מפתח API לא תקין. אנא בדוק את ההגדרות.")]
    InvalidKey,
    #[error("יותר מדי בקשות. אנא נסה שוב בעוד כמה רגעים.")]
    RateLimited,
    #[error("בעיית חיבור לאינטרנט. אנא בדוק את החיבור.")]
    Network,
    #[error("לא הצלחנו לפענח את התוכן שנוצר")]
    Parse,
    #[error("התוכן שנוצר אינו תקין")]
    InvalidContent(#[from] ValidationError),
    #[error("אירעה שגיאה. אנא נסה שוב.\n{0}")]
    General(String),
}

impl GenerationError {
    /// Buckets a raw provider or transport error by its message.
    ///
    /// Parsed provider bodies carry no HTTP status, only the provider's own
    /// error type and phrasing.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

        if mentions(&[
            "401",
            "unauthorized",
            "authentication_error",
            "invalid api key",
            "invalid_api_key",
            "incorrect api key",
            "invalid x-api-key",
            "no auth credentials",
        ]) {
            GenerationError::InvalidKey
        } else if mentions(&["429", "rate limit", "rate_limit", "too many requests"]) {
            GenerationError::RateLimited
        } else if mentions(&["network", "fetch", "timed out", "timeout", "connection", "error sending request", "dns"]) {
            GenerationError::Network
        } else if mentions(&["error decoding response body", "failed to parse", "parsing", "expected value", "missing field"]) {
            GenerationError::Parse
        } else {
            GenerationError::General(message.to_string())
        }
    }

    /// Buckets an error body the provider sent back.
    pub fn from_backend(error_type: &str, message: &str) -> Self {
        GenerationError::classify(&format!("{}: {}", error_type, message))
    }
}

impl From<chatgpt::err::Error> for GenerationError {
    fn from(err: chatgpt::err::Error) -> Self {
        match err {
            chatgpt::err::Error::BackendError {
                message,
                error_type,
            } => GenerationError::from_backend(&error_type, &message),
            other => GenerationError::classify(&other.to_string()),
        }
    }
}

/// Sends one prompt and returns the raw reply text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

pub struct ChatGptBackend {
    chat_gpt: ChatGPT,
}

impl ChatGptBackend {
    pub fn new(provider: Provider, api_key: &str) -> Result<Self, GenerationError> {
        let mut chat_gpt = ChatGPT::new(api_key)?;

        chat_gpt.config.engine = ChatGPTEngine::Custom(provider.model());
        chat_gpt.config.timeout = REQUEST_TIMEOUT;
        chat_gpt.config.api_url = url::Url::parse(provider.endpoint())
            .map_err(|err| GenerationError::General(err.to_string()))?;

        Ok(Self { chat_gpt })
    }
}

#[async_trait]
impl CompletionBackend for ChatGptBackend {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let response: CompletionResponse = self.chat_gpt.send_message(prompt).await?;
        Ok(response.message().content.clone())
    }
}

/// Whether typed answers may be judged by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GradingMode {
    #[default]
    Assisted,
    /// Exact match only, for reproducible runs.
    LocalOnly,
}

pub const READING_TOPICS: [&str; 12] = [
    "בעלי חיים",
    "משפחה",
    "בית ספר",
    "טבע",
    "הרפתקאות",
    "חברות",
    "ספורט",
    "מדע פשוט",
    "חגים",
    "אוכל",
    "מזג אוויר",
    "צמחים",
];

pub const SCIENCE_TOPICS: [&str; 10] = [
    "החלל",
    "גוף האדם",
    "בעלי חיים",
    "צמחים",
    "מזג אוויר",
    "אנרגיה",
    "מים",
    "דינוזאורים",
    "כדור הארץ",
    "אור וצבעים",
];

pub const MIN_AGE: u32 = 6;
pub const MAX_AGE: u32 = 18;
const SCIENCE_MIN_WORDS: u32 = 150;
const SCIENCE_MAX_WORDS: u32 = 200;

pub fn grade_for_age(age: u32) -> &'static str {
    match age {
        6 => "א'",
        7 => "ב'",
        8 => "ג'",
        9 => "ד'",
        10 => "ה'",
        11 => "ו'",
        12 => "ז'",
        13 => "ח'",
        14 => "ט'",
        15 => "י'",
        16 => "י\"א",
        17 | 18 => "י\"ב",
        _ => "ד'-ה'",
    }
}

pub fn random_topic<R: Rng + ?Sized>(topics: &[&'static str], rng: &mut R) -> &'static str {
    topics.choose(rng).copied().unwrap_or("טבע")
}

const JSON_FORMAT: &str = r#"החזר את התשובה בפורמט JSON הבא בדיוק:
{
  "text": "הטקסט המלא כאן...",
  "title": "כותרת קצרה לטקסט",
  "questions": [
    {
      "question": "השאלה?",
      "options": ["תשובה 1", "תשובה 2", "תשובה 3", "תשובה 4"],
      "correctIndex": 0
    }
  ]
}

חשוב מאוד: החזר רק את ה-JSON, ללא טקסט נוסף לפני או אחרי."#;

pub fn reading_prompt(topic: &str) -> String {
    format!(
        "אתה מורה לעברית לכיתות ד'-ה'. צור קטע קריאה מעניין ומאתגר ושאלות הבנה.

דרישות לקטע הקריאה:
1. אורך: 180-220 מילים
2. רמת קושי: מתאים לילדים בכיתות ד'-ה' (גילאי 9-11)
3. נושא: {topic}
4. משפטים מגוונים (10-16 מילים למשפט, כולל משפטים מורכבים)
5. אוצר מילים עשיר ומגוון
6. תוכן מעניין וחינוכי עם עומק רעיוני
7. ללא נקודות (כתיב חסר)
8. הטקסט צריך להיות קוהרנטי עם עלילה או מסר ברור

דרישות לשאלות:
1. בדיוק {QUESTIONS_PER_BATCH} שאלות הבנה מאתגרות
2. כל שאלה עם {OPTIONS_PER_QUESTION} אפשרויות תשובה
3. תשובה אחת נכונה בלבד
4. שאלות שבודקות הבנת הנקרא (2), זכירת פרטים (1) והסקת מסקנות (2)
5. כל האפשרויות צריכות להיות באורך דומה ולהיראות סבירות

{JSON_FORMAT}"
    )
}

pub fn science_prompt(age: u32, topic: &str) -> String {
    let grade = grade_for_age(age);
    format!(
        "אתה מורה למדעים המתמחה בהעשרה מדעית לילדים. צור מאמר מדעי מעניין ומדויק עובדתית בעברית ושאלות הבנה.

דרישות למאמר המדעי:
1. אורך: {SCIENCE_MIN_WORDS}-{SCIENCE_MAX_WORDS} מילים
2. רמת קושי: מתאים לגיל {age} (כיתה {grade})
3. נושא: {topic}
4. חשוב מאוד: כל המידע חייב להיות מדויק ועובדתי מבחינה מדעית
5. השתמש במושגים מדעיים מתאימים לגיל
6. ללא נקודות (כתיב חסר)
7. הוסף עובדות מעניינות ודוגמאות מהחיים

דרישות לשאלות:
1. בדיוק {QUESTIONS_PER_BATCH} שאלות
2. שאלה אמריקאית היא עם {OPTIONS_PER_QUESTION} אפשרויות ותשובה נכונה אחת
3. מותר שאלה פתוחה אחת לכל היותר, בפורמט:
   {{\"type\": \"typed\", \"question\": \"השאלה?\", \"correctAnswer\": \"התשובה\", \"acceptableAnswers\": [\"ניסוח נוסף\"]}}
4. כל התשובות חייבות להיות מדויקות מדעית

{JSON_FORMAT}"
    )
}

fn grading_prompt(question: &str, correct: &str, answer: &str) -> String {
    format!(
        "אתה בודק תשובות של תלמיד בשאלה פתוחה.
שאלה: {question}
תשובה נכונה: {correct}
תשובת התלמיד: {answer}

האם תשובת התלמיד נכונה במהותה? התעלם משגיאות כתיב קלות.
החזר רק JSON בפורמט: {{\"correct\": true}} או {{\"correct\": false}}"
    )
}

fn fenced_json(reply: &str) -> Option<&str> {
    let start = reply.find("```json")?;
    let body = &reply[start + "```json".len()..];
    let body = &body[body.find('\n')? + 1..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Pulls the JSON object out of a model reply, which may wrap it in a code
/// fence or surround it with prose.
pub fn extract_json(reply: &str) -> Result<Value, GenerationError> {
    let content = fenced_json(reply).unwrap_or(reply).trim();

    if let Ok(value) = serde_json::from_str(content) {
        return Ok(value);
    }

    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&content[start..=end]).map_err(|_| GenerationError::Parse)
        }
        _ => Err(GenerationError::Parse),
    }
}

pub struct ContentGenerator {
    backend: Box<dyn CompletionBackend>,
    grading: GradingMode,
}

impl ContentGenerator {
    pub fn new(backend: Box<dyn CompletionBackend>, grading: GradingMode) -> Self {
        Self { backend, grading }
    }

    async fn generate(&self, prompt: &str) -> Result<QuizBatch, GenerationError> {
        log::debug!("Sending generation prompt ({} chars)", prompt.len());
        let reply = self.backend.complete(prompt).await?;
        log::debug!("Completion: {:?}", reply);

        let value = extract_json(&reply)?;
        let quiz = QuizBatch::from_value(&value, QUESTIONS_PER_BATCH)?;
        Ok(quiz)
    }

    /// A reading passage with comprehension questions. Picks a random topic
    /// when none is given.
    pub async fn generate_reading(&self, topic: Option<&str>) -> Result<QuizBatch, GenerationError> {
        let topic = match topic {
            Some(topic) => topic.to_string(),
            None => random_topic(&READING_TOPICS, &mut rand::thread_rng()).to_string(),
        };
        log::info!("Generating reading passage about {}", topic);
        self.generate(&reading_prompt(&topic)).await
    }

    pub async fn generate_science(&self, age: u32) -> Result<QuizBatch, GenerationError> {
        let topic = random_topic(&SCIENCE_TOPICS, &mut rand::thread_rng());
        log::info!("Generating science article about {} for age {}", topic, age);
        self.generate(&science_prompt(age, topic)).await
    }

    /// Judges a free-text answer. Falls back to the local exact match whenever
    /// the model cannot give a clear verdict.
    pub async fn grade_typed(
        &self,
        question: &str,
        correct: &str,
        acceptable: &[String],
        answer: &str,
    ) -> bool {
        if answer.trim().is_empty() {
            return false;
        }
        let local = batch::local_typed_match(answer, correct, acceptable);
        if local || self.grading == GradingMode::LocalOnly {
            return local;
        }

        match self.ask_verdict(question, correct, answer).await {
            Ok(verdict) => verdict,
            Err(err) => {
                log::warn!("Falling back to local grading: {}", err);
                local
            }
        }
    }

    async fn ask_verdict(&self, question: &str, correct: &str, answer: &str) -> Result<bool, GenerationError> {
        let reply = self
            .backend
            .complete(&grading_prompt(question, correct, answer))
            .await?;
        extract_json(&reply)?
            .get("correct")
            .and_then(Value::as_bool)
            .ok_or(GenerationError::Parse)
    }
}
