use std::sync::Arc;

use dotenv::dotenv;
use hebrew_drills::{
    config::Config,
    quiz::{
        self,
        ai_helper::{self, ChatGptBackend, ContentGenerator, Provider},
        alphabet::{Attempt, ListeningGame, SpellingGame},
        arithmetic::{
            AddSubtractGame, FactRecord, FactTracker, FactVariant, Problem, SubtractionGame,
            MAX_RANGE, MIN_RANGE,
        },
        batch::{self, AnswerSheet, BatchQuestion, QuizBatch, OPTION_LETTERS},
        letter_words::{LetterWordsGame, Pick, LETTER_WORDS},
        scorer::{self, SessionState},
        session::{Pacing, PhaseError, Turn},
        word_problems::{self, ProblemBank, WordProblemGame},
    },
    storage::{keys, ChatStore, FileStore, Language, Settings},
};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, MessageId},
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerError = Box<dyn std::error::Error + Send + Sync>;
type HandlerResult = Result<(), HandlerError>;
type DialogueStorage = Arc<ErasedStorage<State>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Menu,
    Multiplication {
        variant: FactVariant,
        started_at: i64,
        #[serde(default)]
        turn: Turn,
    },
    AddSubtract {
        problem: Problem,
        started_at: i64,
        #[serde(default)]
        turn: Turn,
    },
    Subtraction {
        problem: Problem,
        started_at: i64,
        #[serde(default)]
        turn: Turn,
    },
    WordProblem {
        question: quiz::Question,
        started_at: i64,
        #[serde(default)]
        turn: Turn,
    },
    Listening {
        #[serde(default)]
        turn: Turn,
    },
    Spelling {
        #[serde(default)]
        turn: Turn,
    },
    LetterWords {
        #[serde(default)]
        turn: Turn,
    },
    ReadingTopic,
    ScienceAge,
    BatchQuiz {
        batch: QuizBatch,
        sheet: AnswerSheet,
    },
    Settings,
    SettingsRange,
    SettingsApiKey,
}

struct App {
    config: Config,
    store: FileStore,
    problems: ProblemBank,
}

impl App {
    fn chat(&self, chat_id: ChatId) -> ChatStore<'_> {
        ChatStore::new(&self.store, chat_id.0)
    }

    /// A chat's own key wins over the one in the environment.
    fn generator(&self, settings: &Settings) -> Option<ContentGenerator> {
        let (provider, key) = match &settings.api_key {
            Some(key) => (settings.provider, key.clone()),
            None => (self.config.provider, self.config.api_key.clone()?),
        };
        match ChatGptBackend::new(provider, &key) {
            Ok(backend) => Some(ContentGenerator::new(Box::new(backend), self.config.grading)),
            Err(err) => {
                log::error!("Unable to set up the {} client: {}", provider, err);
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting drills bot...");

    let config = Config::from_env()?;
    if config.api_key.is_none() {
        log::warn!("LLM_API_KEY is not set; reading and science need a key from the settings menu");
    }

    let bot = Bot::from_env();

    log::info!("Opening dialogue storage at {}", config.dialogue_db);
    let storage: DialogueStorage = SqliteStorage::open(&config.dialogue_db, Json).await?.erase();

    let store = FileStore::open(&config.data_dir)?;
    let problems = ProblemBank::builtin()?;
    log::info!("Loaded {} word problems", problems.len());

    let app = Arc::new(App {
        config,
        store,
        problems,
    });

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::filter(|msg: Message| msg.text() == Some("/start")).endpoint(start))
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::Menu].endpoint(menu))
            .branch(
                dptree::case![State::Multiplication {
                    variant,
                    started_at,
                    turn
                }]
                .endpoint(multiplication),
            )
            .branch(
                dptree::case![State::AddSubtract {
                    problem,
                    started_at,
                    turn
                }]
                .endpoint(add_subtract),
            )
            .branch(
                dptree::case![State::Subtraction {
                    problem,
                    started_at,
                    turn
                }]
                .endpoint(subtraction),
            )
            .branch(
                dptree::case![State::WordProblem {
                    question,
                    started_at,
                    turn
                }]
                .endpoint(word_problem),
            )
            .branch(dptree::case![State::Listening { turn }].endpoint(listening))
            .branch(dptree::case![State::Spelling { turn }].endpoint(spelling))
            .branch(dptree::case![State::LetterWords { turn }].endpoint(letter_words))
            .branch(dptree::case![State::ReadingTopic].endpoint(reading_topic))
            .branch(dptree::case![State::ScienceAge].endpoint(science_age))
            .branch(dptree::case![State::BatchQuiz { batch, sheet }].endpoint(batch_quiz))
            .branch(dptree::case![State::Settings].endpoint(settings_menu))
            .branch(dptree::case![State::SettingsRange].endpoint(settings_range))
            .branch(dptree::case![State::SettingsApiKey].endpoint(settings_api_key)),
    )
    .dependencies(dptree::deps![storage, app])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

const GREETING_TEXT: &str = "שלום! אני בוט התרגול. נתרגל חשבון, אותיות, כתיבה והבנת הנקרא.";
const MENU_TEXT: &str = "מה נתרגל?";

const MULTIPLICATION_GAME: &str = "✖️ לוח הכפל";
const ADD_SUBTRACT_GAME: &str = "➕ חיבור וחיסור";
const SUBTRACTION_GAME: &str = "➖ חיסור בשלבים";
const WORD_PROBLEMS_GAME: &str = "📝 בעיות מילוליות";
const LETTER_WORDS_GAME: &str = "🔤 אות ומילה";
const LISTENING_GAME: &str = "👂 זיהוי אותיות";
const SPELLING_GAME: &str = "✍️ כתיבת מילים";
const READING_GAME: &str = "📚 הבנת הנקרא";
const SCIENCE_GAME: &str = "🔬 העשרה מדעית";
const SETTINGS_BUTTON: &str = "⚙️ הגדרות";

const STOP: &str = "סיום";
const RESET: &str = "איפוס";
const BACK: &str = "⬅️ חזרה";
const NEXT_LETTER: &str = "➡️ האות הבאה";
const RANDOM_TOPIC: &str = "🎲 נושא אקראי";

const NUMBER_PLEASE: &str = "נא לענות במספר";
const CHOOSE_PLEASE: &str = "נא לבחור אחת מהתשובות";
const PROGRESS_RESET: &str = "ההתקדמות אופסה. מתחילים מחדש!";
const LOADING_TEXT: &str = "מייצר טקסט חדש...";
const NO_API_KEY: &str = "כדי לייצר טקסטים צריך מפתח API. אפשר להגדיר אותו בתפריט ההגדרות.";

fn button_rows<I, S>(labels: I, per_row: usize) -> Vec<Vec<KeyboardButton>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let buttons = labels.into_iter().map(KeyboardButton::new).collect::<Vec<_>>();
    buttons.chunks(per_row.max(1)).map(|row| row.to_vec()).collect()
}

fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(button_rows(
        [
            MULTIPLICATION_GAME,
            ADD_SUBTRACT_GAME,
            SUBTRACTION_GAME,
            WORD_PROBLEMS_GAME,
            LETTER_WORDS_GAME,
            LISTENING_GAME,
            SPELLING_GAME,
            READING_GAME,
            SCIENCE_GAME,
            SETTINGS_BUTTON,
        ],
        2,
    ))
}

fn drill_keyboard(answers: Vec<String>, per_row: usize) -> KeyboardMarkup {
    let mut rows = button_rows(answers, per_row);
    rows.push(vec![KeyboardButton::new(STOP), KeyboardButton::new(RESET)]);
    KeyboardMarkup::new(rows)
}

/// Sends a message, silent when the chat turned sound off.
async fn say(
    bot: &Bot,
    chat_id: ChatId,
    settings: &Settings,
    text: impl Into<String>,
    keyboard: KeyboardMarkup,
) -> Result<MessageId, HandlerError> {
    let sent = bot
        .send_message(chat_id, text)
        .reply_markup(keyboard)
        .disable_notification(!settings.sound_enabled)
        .await?;
    Ok(sent.id)
}

async fn show_typing(bot: &Bot, chat_id: ChatId) {
    if let Err(err) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        log::debug!("Typing indicator for chat {} failed: {}", chat_id.0, err);
    }
}

/// Replies queued up while the previous feedback was showing are dropped.
fn is_stale(turn: &Turn, msg: &Message) -> bool {
    if turn.accepts(msg.id.0) {
        return false;
    }
    log::debug!(
        "Dropping message {} in chat {}: sent before question {}",
        msg.id.0,
        msg.chat.id.0,
        turn.question_message
    );
    true
}

/// Keeps the feedback up, then pauses before the next question.
async fn advance(turn: &mut Turn, pacing: &Pacing) -> Result<(), PhaseError> {
    tokio::time::sleep(turn.phase.answered(pacing)?).await;
    tokio::time::sleep(turn.phase.feedback_elapsed(pacing)?).await;
    turn.phase.presented()
}

/// Keeps the feedback up, then puts the same item back.
async fn retry(turn: &mut Turn, pacing: &Pacing) -> Result<(), PhaseError> {
    tokio::time::sleep(turn.phase.answered(pacing)?).await;
    turn.phase.retry()
}

fn stats_line(session: &SessionState) -> String {
    format!(
        "ניקוד: {} | רצף: {} | שאלות: {}",
        session.score, session.streak, session.question_count
    )
}

fn session_summary(session: &SessionState) -> String {
    format!(
        "כל הכבוד על התרגול!\n{}\nזמן תרגול כולל: {}",
        stats_line(session),
        scorer::format_time(session.total_time_secs)
    )
}

/// Folds the sitting that began at `started_at` into the stored total.
fn close_sitting(session: &mut SessionState, started_at: i64, now: i64) {
    session.start(started_at);
    session.stop(now);
}

async fn start(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, msg: Message) -> HandlerResult {
    let settings = app.chat(msg.chat.id).settings();
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;
    show_menu(&bot, &dialogue, msg.chat.id, &settings).await
}

async fn show_menu(bot: &Bot, dialogue: &QuizDialogue, chat_id: ChatId, settings: &Settings) -> HandlerResult {
    say(bot, chat_id, settings, MENU_TEXT, menu_keyboard()).await?;
    dialogue.update(State::Menu).await?;
    Ok(())
}

async fn menu(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let now = quiz::now_millis();

    match msg.text() {
        Some(MULTIPLICATION_GAME) => {
            let session: SessionState = chat.load(keys::MULTIPLICATION_SESSION).unwrap_or_default();
            if session.has_progress() {
                let text = format!("{}\n{}", session.welcome_back(now), stats_line(&session));
                bot.send_message(chat_id, text).await?;
            }
            ask_multiplication(&bot, &dialogue, chat, &settings, now).await
        }
        Some(ADD_SUBTRACT_GAME) => ask_add_subtract(&bot, &dialogue, chat, &settings, now).await,
        Some(SUBTRACTION_GAME) => {
            let game: SubtractionGame = chat.load(keys::SUBTRACTION_PROGRESS).unwrap_or_default();
            bot.send_message(chat_id, game.ladder.description()).await?;
            ask_subtraction(&bot, &dialogue, chat, &settings, now).await
        }
        Some(WORD_PROBLEMS_GAME) => ask_word_problem(&bot, &dialogue, &app, &settings, chat_id, now).await,
        Some(LETTER_WORDS_GAME) => ask_letter_words(&bot, &dialogue, chat, &settings).await,
        Some(LISTENING_GAME) => ask_listening(&bot, &dialogue, chat, &settings).await,
        Some(SPELLING_GAME) => ask_spelling(&bot, &dialogue, chat, &settings).await,
        Some(READING_GAME) => {
            let mut labels = vec![RANDOM_TOPIC];
            labels.extend(ai_helper::READING_TOPICS);
            labels.push(BACK);
            say(&bot, chat_id, &settings, "על מה נקרא?", KeyboardMarkup::new(button_rows(labels, 3))).await?;
            dialogue.update(State::ReadingTopic).await?;
            Ok(())
        }
        Some(SCIENCE_GAME) => {
            let mut labels = (ai_helper::MIN_AGE..=ai_helper::MAX_AGE)
                .map(|age| age.to_string())
                .collect::<Vec<_>>();
            labels.push(BACK.to_string());
            say(&bot, chat_id, &settings, "בן/בת כמה את/ה?", KeyboardMarkup::new(button_rows(labels, 5))).await?;
            dialogue.update(State::ScienceAge).await?;
            Ok(())
        }
        Some(SETTINGS_BUTTON) => show_settings(&bot, &dialogue, chat_id, &settings).await,
        _ => show_menu(&bot, &dialogue, chat_id, &settings).await,
    }
}

fn load_tracker(chat: ChatStore<'_>, settings: &Settings) -> FactTracker {
    let mut tracker = FactTracker::new(settings.practice_range);
    if let Some(records) = chat.load::<Vec<FactRecord>>(keys::MULTIPLICATION_PROGRESS) {
        tracker.restore(records);
    }
    tracker
}

async fn ask_multiplication(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat: ChatStore<'_>,
    settings: &Settings,
    started_at: i64,
) -> HandlerResult {
    let tracker = load_tracker(chat, settings);
    let (variant, question) = {
        let mut rng = rand::thread_rng();
        let variant = tracker.next_question(quiz::now_millis(), &mut rng)?;
        let question = variant.to_question(tracker.max_number(), &mut rng);
        (variant, question)
    };

    let keyboard = if settings.typed_answers {
        drill_keyboard(Vec::new(), 2)
    } else {
        drill_keyboard(question.answer_texts(), 2)
    };
    let sent = say(bot, dialogue.chat_id(), settings, question.text, keyboard).await?;
    dialogue
        .update(State::Multiplication {
            variant,
            started_at,
            turn: Turn::posted(sent.0),
        })
        .await?;
    Ok(())
}

async fn multiplication(
    bot: Bot,
    dialogue: QuizDialogue,
    app: Arc<App>,
    (variant, started_at, mut turn): (FactVariant, i64, Turn),
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let now = quiz::now_millis();
    let mut session: SessionState = chat.load(keys::MULTIPLICATION_SESSION).unwrap_or_default();

    match msg.text().map(str::trim) {
        Some(STOP) => {
            close_sitting(&mut session, started_at, now);
            chat.save(keys::MULTIPLICATION_SESSION, &session);
            bot.send_message(chat_id, session_summary(&session)).await?;
            return show_menu(&bot, &dialogue, chat_id, &settings).await;
        }
        Some(RESET) => {
            chat.remove(keys::MULTIPLICATION_PROGRESS);
            chat.remove(keys::MULTIPLICATION_SESSION);
            bot.send_message(chat_id, PROGRESS_RESET).await?;
            return ask_multiplication(&bot, &dialogue, chat, &settings, now).await;
        }
        _ => {}
    }
    if is_stale(&turn, &msg) {
        return Ok(());
    }

    let Some(answer) = msg.text().and_then(|t| t.trim().parse::<i64>().ok()) else {
        bot.send_message(chat_id, NUMBER_PLEASE).await?;
        return Ok(());
    };

    let correct = scorer::grade_number(answer, i64::from(variant.answer));
    let mut tracker = load_tracker(chat, &settings);
    tracker.record(variant.fact, correct, now);
    session.apply(correct, 1, now);
    chat.save(keys::MULTIPLICATION_PROGRESS, tracker.records());
    chat.save(keys::MULTIPLICATION_SESSION, &session);

    let mut reply = settings.language.numeric_feedback(correct, i64::from(variant.answer));
    if !correct {
        reply = format!("{}\n{}", reply, variant.explain());
    }
    let text = format!("{}\n\n{}", reply, stats_line(&session));
    say(&bot, chat_id, &settings, text, drill_keyboard(Vec::new(), 2)).await?;

    advance(&mut turn, &app.config.pacing).await?;
    ask_multiplication(&bot, &dialogue, chat, &settings, started_at).await
}

async fn ask_add_subtract(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat: ChatStore<'_>,
    settings: &Settings,
    started_at: i64,
) -> HandlerResult {
    let game: AddSubtractGame = chat.load(keys::ADD_SUBTRACT_PROGRESS).unwrap_or_default();
    let (problem, question) = {
        let mut rng = rand::thread_rng();
        let problem = game.generate(&mut rng);
        let question = game.question(&problem, &mut rng);
        (problem, question)
    };

    let text = format!("טווח: עד {}\n{}", game.difficulty.value(), question.text);
    let sent = say(bot, dialogue.chat_id(), settings, text, drill_keyboard(question.answer_texts(), 2)).await?;
    dialogue
        .update(State::AddSubtract {
            problem,
            started_at,
            turn: Turn::posted(sent.0),
        })
        .await?;
    Ok(())
}

async fn add_subtract(
    bot: Bot,
    dialogue: QuizDialogue,
    app: Arc<App>,
    (problem, started_at, mut turn): (Problem, i64, Turn),
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let now = quiz::now_millis();
    let mut game: AddSubtractGame = chat.load(keys::ADD_SUBTRACT_PROGRESS).unwrap_or_default();

    match msg.text().map(str::trim) {
        Some(STOP) => {
            close_sitting(&mut game.session, started_at, now);
            chat.save(keys::ADD_SUBTRACT_PROGRESS, &game);
            bot.send_message(chat_id, session_summary(&game.session)).await?;
            return show_menu(&bot, &dialogue, chat_id, &settings).await;
        }
        Some(RESET) => {
            game.reset();
            chat.save(keys::ADD_SUBTRACT_PROGRESS, &game);
            bot.send_message(chat_id, PROGRESS_RESET).await?;
            return ask_add_subtract(&bot, &dialogue, chat, &settings, now).await;
        }
        _ => {}
    }
    if is_stale(&turn, &msg) {
        return Ok(());
    }

    let Some(answer) = msg.text().and_then(|t| t.trim().parse::<i64>().ok()) else {
        bot.send_message(chat_id, NUMBER_PLEASE).await?;
        return Ok(());
    };

    let correct = scorer::grade_number(answer, i64::from(problem.answer));
    let milestone = game.answer(correct, now);
    chat.save(keys::ADD_SUBTRACT_PROGRESS, &game);

    let mut parts = vec![
        settings.language.numeric_feedback(correct, i64::from(problem.answer)),
        problem.vertical(),
    ];
    if milestone {
        parts.push(format!("🎉 עלית לטווח של עד {}!", game.difficulty.value()));
    }
    parts.push(stats_line(&game.session));
    say(&bot, chat_id, &settings, parts.join("\n\n"), drill_keyboard(Vec::new(), 2)).await?;

    advance(&mut turn, &app.config.pacing).await?;
    ask_add_subtract(&bot, &dialogue, chat, &settings, started_at).await
}

async fn ask_subtraction(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat: ChatStore<'_>,
    settings: &Settings,
    started_at: i64,
) -> HandlerResult {
    let game: SubtractionGame = chat.load(keys::SUBTRACTION_PROGRESS).unwrap_or_default();
    let (problem, question) = {
        let mut rng = rand::thread_rng();
        let problem = game.generate(&mut rng);
        let question = game.question(&problem, &mut rng);
        (problem, question)
    };

    let keyboard = drill_keyboard(question.answer_texts(), 2);
    let sent = say(bot, dialogue.chat_id(), settings, question.text, keyboard).await?;
    dialogue
        .update(State::Subtraction {
            problem,
            started_at,
            turn: Turn::posted(sent.0),
        })
        .await?;
    Ok(())
}

async fn subtraction(
    bot: Bot,
    dialogue: QuizDialogue,
    app: Arc<App>,
    (problem, started_at, mut turn): (Problem, i64, Turn),
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let now = quiz::now_millis();
    let mut game: SubtractionGame = chat.load(keys::SUBTRACTION_PROGRESS).unwrap_or_default();

    match msg.text().map(str::trim) {
        Some(STOP) => {
            close_sitting(&mut game.session, started_at, now);
            chat.save(keys::SUBTRACTION_PROGRESS, &game);
            bot.send_message(chat_id, session_summary(&game.session)).await?;
            return show_menu(&bot, &dialogue, chat_id, &settings).await;
        }
        Some(RESET) => {
            game.reset();
            chat.save(keys::SUBTRACTION_PROGRESS, &game);
            bot.send_message(chat_id, format!("{}\n{}", PROGRESS_RESET, game.ladder.description())).await?;
            return ask_subtraction(&bot, &dialogue, chat, &settings, now).await;
        }
        _ => {}
    }
    if is_stale(&turn, &msg) {
        return Ok(());
    }

    let Some(answer) = msg.text().and_then(|t| t.trim().parse::<i64>().ok()) else {
        bot.send_message(chat_id, NUMBER_PLEASE).await?;
        return Ok(());
    };

    let correct = scorer::grade_number(answer, i64::from(problem.answer));
    let promoted = game.answer(correct, now);
    chat.save(keys::SUBTRACTION_PROGRESS, &game);

    let mut parts = vec![
        settings.language.numeric_feedback(correct, i64::from(problem.answer)),
        problem.vertical(),
    ];
    if promoted {
        parts.push(format!("🏆 עלית רמה! {}", game.ladder.description()));
    }
    parts.push(stats_line(&game.session));
    say(&bot, chat_id, &settings, parts.join("\n\n"), drill_keyboard(Vec::new(), 2)).await?;

    advance(&mut turn, &app.config.pacing).await?;
    ask_subtraction(&bot, &dialogue, chat, &settings, started_at).await
}

async fn ask_word_problem(
    bot: &Bot,
    dialogue: &QuizDialogue,
    app: &App,
    settings: &Settings,
    chat_id: ChatId,
    started_at: i64,
) -> HandlerResult {
    let game: WordProblemGame = app.chat(chat_id).load(keys::WORD_PROBLEMS_PROGRESS).unwrap_or_default();
    let difficulty = game.difficulty.value();
    let question = {
        let mut rng = rand::thread_rng();
        app.problems
            .pick(difficulty, &mut rng)
            .map(|problem| problem.to_question(&mut rng))
    };
    let Some(question) = question else {
        bot.send_message(chat_id, "אין כרגע שאלות זמינות").await?;
        return show_menu(bot, dialogue, chat_id, settings).await;
    };

    let text = format!("{}\n\n{}", word_problems::level_description(difficulty), question.text);
    let sent = say(bot, chat_id, settings, text, drill_keyboard(question.answer_texts(), 2)).await?;
    dialogue
        .update(State::WordProblem {
            question,
            started_at,
            turn: Turn::posted(sent.0),
        })
        .await?;
    Ok(())
}

async fn word_problem(
    bot: Bot,
    dialogue: QuizDialogue,
    app: Arc<App>,
    (question, started_at, mut turn): (quiz::Question, i64, Turn),
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let now = quiz::now_millis();
    let mut game: WordProblemGame = chat.load(keys::WORD_PROBLEMS_PROGRESS).unwrap_or_default();

    match msg.text().map(str::trim) {
        Some(STOP) => {
            close_sitting(&mut game.session, started_at, now);
            chat.save(keys::WORD_PROBLEMS_PROGRESS, &game);
            bot.send_message(chat_id, session_summary(&game.session)).await?;
            return show_menu(&bot, &dialogue, chat_id, &settings).await;
        }
        Some(RESET) => {
            game.reset();
            chat.save(keys::WORD_PROBLEMS_PROGRESS, &game);
            bot.send_message(chat_id, PROGRESS_RESET).await?;
            return ask_word_problem(&bot, &dialogue, &app, &settings, chat_id, now).await;
        }
        _ => {}
    }
    if is_stale(&turn, &msg) {
        return Ok(());
    }

    let Some(selected) = msg.text().and_then(|t| question.answer_index(t)) else {
        bot.send_message(chat_id, CHOOSE_PLEASE).await?;
        return Ok(());
    };
    let correct_index = question
        .answers
        .iter()
        .position(|a| a.is_correct)
        .ok_or("word problem without a correct answer")?;

    let correct = scorer::grade_option(selected, correct_index, question.answers.len())?;
    let level_changed = game.answer(correct, now);
    chat.save(keys::WORD_PROBLEMS_PROGRESS, &game);

    let mut parts = vec![settings
        .language
        .text_feedback(correct, &question.answers[correct_index].text)];
    if level_changed {
        parts.push(word_problems::level_description(game.difficulty.value()).to_string());
    }
    parts.push(stats_line(&game.session));
    say(&bot, chat_id, &settings, parts.join("\n\n"), drill_keyboard(Vec::new(), 2)).await?;

    advance(&mut turn, &app.config.pacing).await?;
    ask_word_problem(&bot, &dialogue, &app, &settings, chat_id, started_at).await
}

async fn ask_letter_words(bot: &Bot, dialogue: &QuizDialogue, chat: ChatStore<'_>, settings: &Settings) -> HandlerResult {
    let game: LetterWordsGame = chat.load(keys::LETTER_WORDS_PROGRESS).unwrap_or_default();
    let words = game.shuffled_words(&mut rand::thread_rng());
    let entry = game.current();

    let listing = words
        .iter()
        .map(|w| format!("{} {} ({})", w.emoji, w.word, w.meaning))
        .collect::<Vec<_>>()
        .join("\n");
    let text = format!(
        "{}\n{}\n\n{}  {}\nבחרו מילה שמתחילה באות {}:\n{}\n\nלמדת {} מתוך {} אותיות",
        game.progress(),
        game.overview(),
        entry.letter,
        entry.name,
        entry.letter,
        listing,
        game.learned_count(),
        LETTER_WORDS.len()
    );

    let mut rows = button_rows(words.iter().map(|w| w.label()), 2);
    rows.push(vec![KeyboardButton::new(NEXT_LETTER)]);
    rows.push(vec![KeyboardButton::new(STOP), KeyboardButton::new(RESET)]);

    let sent = say(bot, dialogue.chat_id(), settings, text, KeyboardMarkup::new(rows)).await?;
    dialogue
        .update(State::LetterWords {
            turn: Turn::posted(sent.0),
        })
        .await?;
    Ok(())
}

async fn letter_words(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, mut turn: Turn, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let mut game: LetterWordsGame = chat.load(keys::LETTER_WORDS_PROGRESS).unwrap_or_default();

    let text = msg.text().map(str::trim).unwrap_or_default();
    match text {
        STOP => {
            let summary = format!("למדת {} מתוך {} אותיות", game.learned_count(), LETTER_WORDS.len());
            bot.send_message(chat_id, summary).await?;
            return show_menu(&bot, &dialogue, chat_id, &settings).await;
        }
        RESET => {
            chat.remove(keys::LETTER_WORDS_PROGRESS);
            bot.send_message(chat_id, PROGRESS_RESET).await?;
            return ask_letter_words(&bot, &dialogue, chat, &settings).await;
        }
        _ => {}
    }
    if is_stale(&turn, &msg) {
        return Ok(());
    }

    if text == NEXT_LETTER {
        game.next_letter();
        chat.save(keys::LETTER_WORDS_PROGRESS, &game);
        return ask_letter_words(&bot, &dialogue, chat, &settings).await;
    }
    if game.jump_to(text) {
        chat.save(keys::LETTER_WORDS_PROGRESS, &game);
        return ask_letter_words(&bot, &dialogue, chat, &settings).await;
    }

    let letter = game.current().letter;
    match game.pick(text) {
        Pick::Correct => {
            game.next_letter();
            chat.save(keys::LETTER_WORDS_PROGRESS, &game);
            let reply = format!("🎉 כל הכבוד! Excellent!\nהמילה מתחילה באות {}", letter);
            say(&bot, chat_id, &settings, reply, drill_keyboard(Vec::new(), 2)).await?;
            advance(&mut turn, &app.config.pacing).await?;
            ask_letter_words(&bot, &dialogue, chat, &settings).await
        }
        Pick::Wrong => {
            say(&bot, chat_id, &settings, "❌ נסה שוב! Try again!", drill_keyboard(Vec::new(), 2)).await?;
            retry(&mut turn, &app.config.pacing).await?;
            ask_letter_words(&bot, &dialogue, chat, &settings).await
        }
        Pick::Unknown => {
            bot.send_message(chat_id, CHOOSE_PLEASE).await?;
            Ok(())
        }
    }
}

async fn send_listening_question(
    bot: &Bot,
    dialogue: &QuizDialogue,
    settings: &Settings,
    game: &ListeningGame,
) -> HandlerResult {
    let Some(question) = game.question() else {
        return Ok(());
    };
    let text = format!("שאלה {}\n{}", game.question_number, question.text);
    let sent = say(bot, dialogue.chat_id(), settings, text, drill_keyboard(question.answer_texts(), 4)).await?;
    dialogue
        .update(State::Listening {
            turn: Turn::posted(sent.0),
        })
        .await?;
    Ok(())
}

async fn ask_listening(bot: &Bot, dialogue: &QuizDialogue, chat: ChatStore<'_>, settings: &Settings) -> HandlerResult {
    let mut game: ListeningGame = chat.load(keys::LISTENING_PROGRESS).unwrap_or_default();
    game.next(&mut rand::thread_rng())?;
    chat.save(keys::LISTENING_PROGRESS, &game);

    send_listening_question(bot, dialogue, settings, &game).await
}

async fn listening(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, mut turn: Turn, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let mut game: ListeningGame = chat.load(keys::LISTENING_PROGRESS).unwrap_or_default();

    let text = msg.text().map(str::trim).unwrap_or_default();
    match text {
        STOP => {
            bot.send_message(chat_id, format!("ניקוד: {}", game.score)).await?;
            return show_menu(&bot, &dialogue, chat_id, &settings).await;
        }
        RESET => {
            chat.remove(keys::LISTENING_PROGRESS);
            bot.send_message(chat_id, PROGRESS_RESET).await?;
            return ask_listening(&bot, &dialogue, chat, &settings).await;
        }
        _ => {}
    }
    if is_stale(&turn, &msg) {
        return Ok(());
    }

    if game.current_letter().is_none() {
        return ask_listening(&bot, &dialogue, chat, &settings).await;
    }
    if !game.options.iter().any(|o| o == text) {
        bot.send_message(chat_id, CHOOSE_PLEASE).await?;
        return Ok(());
    }

    match game.answer(text) {
        Attempt::Correct => {
            chat.save(keys::LISTENING_PROGRESS, &game);
            let reply = format!("🎉 מצוין! כל הכבוד!\nניקוד: {}", game.score);
            say(&bot, chat_id, &settings, reply, drill_keyboard(Vec::new(), 4)).await?;
            advance(&mut turn, &app.config.pacing).await?;
            ask_listening(&bot, &dialogue, chat, &settings).await
        }
        Attempt::Retry { .. } => {
            chat.save(keys::LISTENING_PROGRESS, &game);
            say(&bot, chat_id, &settings, "❌ לא נכון, נסה שוב!", drill_keyboard(Vec::new(), 4)).await?;
            retry(&mut turn, &app.config.pacing).await?;
            send_listening_question(&bot, &dialogue, &settings, &game).await
        }
        Attempt::Empty => ask_listening(&bot, &dialogue, chat, &settings).await,
    }
}

async fn send_spelling_prompt(
    bot: &Bot,
    dialogue: &QuizDialogue,
    settings: &Settings,
    text: String,
) -> HandlerResult {
    let sent = say(bot, dialogue.chat_id(), settings, text, drill_keyboard(Vec::new(), 2)).await?;
    dialogue
        .update(State::Spelling {
            turn: Turn::posted(sent.0),
        })
        .await?;
    Ok(())
}

async fn ask_spelling(bot: &Bot, dialogue: &QuizDialogue, chat: ChatStore<'_>, settings: &Settings) -> HandlerResult {
    let mut game: SpellingGame = chat.load(keys::SPELLING_PROGRESS).unwrap_or_default();
    game.next(&mut rand::thread_rng())?;
    chat.save(keys::SPELLING_PROGRESS, &game);

    let prompt = game.prompt().unwrap_or_default();
    let text = format!("מילה {}\n{}", game.question_number, prompt);
    send_spelling_prompt(bot, dialogue, settings, text).await
}

async fn spelling(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, mut turn: Turn, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let settings = chat.settings();
    let mut game: SpellingGame = chat.load(keys::SPELLING_PROGRESS).unwrap_or_default();

    let text = msg.text().map(str::trim).unwrap_or_default();
    match text {
        STOP => {
            bot.send_message(chat_id, format!("ניקוד: {}", game.score)).await?;
            return show_menu(&bot, &dialogue, chat_id, &settings).await;
        }
        RESET => {
            chat.remove(keys::SPELLING_PROGRESS);
            bot.send_message(chat_id, PROGRESS_RESET).await?;
            return ask_spelling(&bot, &dialogue, chat, &settings).await;
        }
        _ => {}
    }
    if is_stale(&turn, &msg) {
        return Ok(());
    }

    if game.current_word().is_none() {
        return ask_spelling(&bot, &dialogue, chat, &settings).await;
    }

    match game.answer(text) {
        Attempt::Empty => {
            bot.send_message(chat_id, "⚠️ כתוב משהו קודם!").await?;
            Ok(())
        }
        Attempt::Correct => {
            chat.save(keys::SPELLING_PROGRESS, &game);
            let reply = format!("🎉 מצוין! כל הכבוד!\nניקוד: {}", game.score);
            say(&bot, chat_id, &settings, reply, drill_keyboard(Vec::new(), 2)).await?;
            advance(&mut turn, &app.config.pacing).await?;
            ask_spelling(&bot, &dialogue, chat, &settings).await
        }
        Attempt::Retry { expected } => {
            chat.save(keys::SPELLING_PROGRESS, &game);
            let reply = format!("❌ לא נכון, נסה שוב!\nהמילה הנכונה היא: {}", expected);
            say(&bot, chat_id, &settings, reply, drill_keyboard(Vec::new(), 2)).await?;
            retry(&mut turn, &app.config.pacing).await?;
            let prompt = game.prompt().unwrap_or_default();
            send_spelling_prompt(&bot, &dialogue, &settings, format!("נסה לכתוב שוב...\n{}", prompt)).await
        }
    }
}

enum BatchRequest {
    Reading(Option<String>),
    Science(u32),
}

async fn reading_topic(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let settings = app.chat(chat_id).settings();

    let topic = match msg.text() {
        Some(BACK) => return show_menu(&bot, &dialogue, chat_id, &settings).await,
        Some(RANDOM_TOPIC) => None,
        Some(text) if ai_helper::READING_TOPICS.contains(&text) => Some(text.to_string()),
        _ => {
            bot.send_message(chat_id, "נא לבחור נושא מהרשימה").await?;
            return Ok(());
        }
    };

    generate_batch(&bot, &dialogue, &app, chat_id, &settings, BatchRequest::Reading(topic)).await
}

async fn science_age(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let settings = app.chat(chat_id).settings();

    if msg.text() == Some(BACK) {
        return show_menu(&bot, &dialogue, chat_id, &settings).await;
    }
    let age = msg
        .text()
        .and_then(|t| t.trim().parse::<u32>().ok())
        .filter(|age| (ai_helper::MIN_AGE..=ai_helper::MAX_AGE).contains(age));
    let Some(age) = age else {
        bot.send_message(chat_id, "נא לבחור גיל בין 6 ל-18").await?;
        return Ok(());
    };

    generate_batch(&bot, &dialogue, &app, chat_id, &settings, BatchRequest::Science(age)).await
}

async fn generate_batch(
    bot: &Bot,
    dialogue: &QuizDialogue,
    app: &App,
    chat_id: ChatId,
    settings: &Settings,
    request: BatchRequest,
) -> HandlerResult {
    let Some(generator) = app.generator(settings) else {
        bot.send_message(chat_id, NO_API_KEY).await?;
        return show_menu(bot, dialogue, chat_id, settings).await;
    };

    say(bot, chat_id, settings, LOADING_TEXT, KeyboardMarkup::new(button_rows([STOP], 1))).await?;
    show_typing(bot, chat_id).await;

    let generated = match &request {
        BatchRequest::Reading(topic) => generator.generate_reading(topic.as_deref()).await,
        BatchRequest::Science(age) => generator.generate_science(*age).await,
    };

    match generated {
        Ok(batch) => {
            bot.send_message(chat_id, format!("📖 {}\n\n{}", batch.title, batch.text)).await?;
            let sheet = AnswerSheet::for_batch(&batch);
            ask_batch_question(bot, dialogue, settings, chat_id, batch, sheet).await
        }
        Err(err) => {
            log::warn!("Generation failed for chat {}: {:?}", chat_id.0, err);
            bot.send_message(chat_id, err.to_string()).await?;
            show_menu(bot, dialogue, chat_id, settings).await
        }
    }
}

async fn ask_batch_question(
    bot: &Bot,
    dialogue: &QuizDialogue,
    settings: &Settings,
    chat_id: ChatId,
    batch: QuizBatch,
    sheet: AnswerSheet,
) -> HandlerResult {
    let Some(index) = sheet.next_unanswered() else {
        return finish_batch(bot, dialogue, settings, chat_id, &batch, &sheet).await;
    };

    let header = format!("שאלה {}/{}", index + 1, batch.questions.len());
    let (text, keyboard) = match &batch.questions[index] {
        BatchQuestion::Choice {
            question, options, ..
        } => {
            let lines = OPTION_LETTERS
                .iter()
                .zip(options.iter())
                .map(|(letter, option)| format!("{}) {}", letter, option))
                .collect::<Vec<_>>()
                .join("\n");
            let mut rows = button_rows(OPTION_LETTERS, 4);
            rows.push(vec![KeyboardButton::new(STOP)]);
            (format!("{}\n{}\n\n{}", header, question, lines), KeyboardMarkup::new(rows))
        }
        BatchQuestion::Typed { question, .. } => (
            format!("{}\n{}\n\nכתבו את התשובה:", header, question),
            KeyboardMarkup::new(button_rows([STOP], 1)),
        ),
    };

    say(bot, chat_id, settings, text, keyboard).await?;
    dialogue.update(State::BatchQuiz { batch, sheet }).await?;
    Ok(())
}

async fn finish_batch(
    bot: &Bot,
    dialogue: &QuizDialogue,
    settings: &Settings,
    chat_id: ChatId,
    batch: &QuizBatch,
    sheet: &AnswerSheet,
) -> HandlerResult {
    let results = sheet.results(batch, &mut rand::thread_rng());
    bot.send_message(chat_id, results.summary()).await?;
    show_menu(bot, dialogue, chat_id, settings).await
}

async fn batch_quiz(
    bot: Bot,
    dialogue: QuizDialogue,
    app: Arc<App>,
    (batch, mut sheet): (QuizBatch, AnswerSheet),
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let settings = app.chat(chat_id).settings();
    let text = msg.text().map(str::trim).unwrap_or_default();

    let Some(index) = sheet.next_unanswered() else {
        return finish_batch(&bot, &dialogue, &settings, chat_id, &batch, &sheet).await;
    };
    if text == STOP {
        return finish_batch(&bot, &dialogue, &settings, chat_id, &batch, &sheet).await;
    }

    match &batch.questions[index] {
        BatchQuestion::Choice { .. } => {
            let Some(option) = OPTION_LETTERS.iter().position(|letter| *letter == text) else {
                bot.send_message(chat_id, CHOOSE_PLEASE).await?;
                return Ok(());
            };
            sheet.record_choice(&batch, index, option)?;
        }
        BatchQuestion::Typed {
            question,
            correct_answer,
            acceptable_answers,
        } => {
            if text.is_empty() {
                bot.send_message(chat_id, "⚠️ כתוב משהו קודם!").await?;
                return Ok(());
            }
            let accepted = match app.generator(&settings) {
                Some(generator) => {
                    show_typing(&bot, chat_id).await;
                    generator
                        .grade_typed(question, correct_answer, acceptable_answers, text)
                        .await
                }
                None => batch::local_typed_match(text, correct_answer, acceptable_answers),
            };
            sheet.record_typed(&batch, index, text, accepted)?;
        }
    }

    ask_batch_question(&bot, &dialogue, &settings, chat_id, batch, sheet).await
}

const RANGE_BUTTON: &str = "🔢 טווח לוח הכפל";
const SOUND_BUTTON: &str = "🔔 צליל";
const INPUT_BUTTON: &str = "⌨️ אופן מענה";
const LANGUAGE_BUTTON: &str = "🌐 שפת משוב";
const PROVIDER_BUTTON: &str = "🤖 ספק בינה מלאכותית";
const API_KEY_BUTTON: &str = "🔑 מפתח API";
const DELETE_KEY: &str = "מחק";

fn on_off(value: bool) -> &'static str {
    if value {
        "פועל"
    } else {
        "כבוי"
    }
}

async fn show_settings(bot: &Bot, dialogue: &QuizDialogue, chat_id: ChatId, settings: &Settings) -> HandlerResult {
    let text = format!(
        "הגדרות:\n{}: 1-{}\n{}: {}\n{}: {}\n{}: {}\n{}: {}\n{}: {}",
        RANGE_BUTTON,
        settings.practice_range,
        SOUND_BUTTON,
        on_off(settings.sound_enabled),
        INPUT_BUTTON,
        if settings.typed_answers { "הקלדה" } else { "כפתורים" },
        LANGUAGE_BUTTON,
        match settings.language {
            Language::He => "עברית",
            Language::En => "English",
        },
        PROVIDER_BUTTON,
        settings.provider,
        API_KEY_BUTTON,
        if settings.api_key.is_some() { "מוגדר" } else { "לא מוגדר" },
    );
    let keyboard = KeyboardMarkup::new(button_rows(
        [
            RANGE_BUTTON,
            SOUND_BUTTON,
            INPUT_BUTTON,
            LANGUAGE_BUTTON,
            PROVIDER_BUTTON,
            API_KEY_BUTTON,
            BACK,
        ],
        2,
    ));
    say(bot, chat_id, settings, text, keyboard).await?;
    dialogue.update(State::Settings).await?;
    Ok(())
}

async fn settings_menu(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let mut settings = chat.settings();

    match msg.text() {
        Some(RANGE_BUTTON) => {
            let mut rows = button_rows((MIN_RANGE..=MAX_RANGE).map(|n| n.to_string()), 4);
            rows.push(vec![KeyboardButton::new(BACK)]);
            say(&bot, chat_id, &settings, "עד איזה מספר נתרגל?", KeyboardMarkup::new(rows)).await?;
            dialogue.update(State::SettingsRange).await?;
            return Ok(());
        }
        Some(API_KEY_BUTTON) => {
            let keyboard = KeyboardMarkup::new(button_rows([DELETE_KEY, BACK], 2));
            say(&bot, chat_id, &settings, "שלחו את מפתח ה-API (ההודעה תימחק מהצ'אט)", keyboard).await?;
            dialogue.update(State::SettingsApiKey).await?;
            return Ok(());
        }
        Some(SOUND_BUTTON) => settings.sound_enabled = !settings.sound_enabled,
        Some(INPUT_BUTTON) => settings.typed_answers = !settings.typed_answers,
        Some(LANGUAGE_BUTTON) => {
            settings.language = match settings.language {
                Language::He => Language::En,
                Language::En => Language::He,
            }
        }
        Some(PROVIDER_BUTTON) => {
            let position = Provider::ALL
                .iter()
                .position(|p| *p == settings.provider)
                .unwrap_or(0);
            settings.provider = Provider::ALL[(position + 1) % Provider::ALL.len()];
        }
        Some(BACK) => return show_menu(&bot, &dialogue, chat_id, &settings).await,
        _ => {}
    }

    chat.save(keys::SETTINGS, &settings);
    show_settings(&bot, &dialogue, chat_id, &settings).await
}

async fn settings_range(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let mut settings = chat.settings();

    if msg.text() != Some(BACK) {
        let range = msg
            .text()
            .and_then(|t| t.trim().parse::<u32>().ok())
            .filter(|n| (MIN_RANGE..=MAX_RANGE).contains(n));
        let Some(range) = range else {
            bot.send_message(chat_id, format!("נא לבחור מספר בין {} ל-{}", MIN_RANGE, MAX_RANGE)).await?;
            return Ok(());
        };

        // Facts shared by both ranges keep their history.
        let mut tracker = load_tracker(chat, &settings);
        tracker.update_range(range);
        chat.save(keys::MULTIPLICATION_PROGRESS, tracker.records());

        settings.practice_range = range;
        chat.save(keys::SETTINGS, &settings);
        log::info!("Chat {} practises up to {} now", chat_id.0, range);
    }

    show_settings(&bot, &dialogue, chat_id, &settings).await
}

async fn settings_api_key(bot: Bot, dialogue: QuizDialogue, app: Arc<App>, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let chat = app.chat(chat_id);
    let mut settings = chat.settings();

    match msg.text().map(str::trim) {
        Some(BACK) => {}
        Some(DELETE_KEY) => {
            settings.api_key = None;
            chat.save(keys::SETTINGS, &settings);
        }
        Some(key) if !key.is_empty() => {
            settings.api_key = Some(key.to_string());
            chat.save(keys::SETTINGS, &settings);
            // Not fatal if the bot lacks the right to delete.
            if let Err(err) = bot.delete_message(chat_id, msg.id).await {
                log::warn!("Could not delete the API key message: {}", err);
            }
        }
        _ => {
            bot.send_message(chat_id, "נא לשלוח את המפתח כטקסט").await?;
            return Ok(());
        }
    }

    show_settings(&bot, &dialogue, chat_id, &settings).await
}
