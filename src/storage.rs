//! Per-chat progress kept as small JSON documents under string keys.
//!
//! Saving is best effort: a failed write is logged and the game carries on
//! with its in-memory state. Loading treats anything unreadable as absent.

use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::quiz::{
    ai_helper::Provider,
    arithmetic::{DEFAULT_RANGE, MAX_RANGE, MIN_RANGE},
    scorer,
};

pub mod keys {
    pub const MULTIPLICATION_PROGRESS: &str = "multiplicationProgress";
    pub const MULTIPLICATION_SESSION: &str = "multiplicationSession";
    pub const ADD_SUBTRACT_PROGRESS: &str = "addSubtractProgress";
    pub const SUBTRACTION_PROGRESS: &str = "subtractionProgress";
    pub const WORD_PROBLEMS_PROGRESS: &str = "wordProblemsProgress";
    pub const LISTENING_PROGRESS: &str = "listeningProgress";
    pub const SPELLING_PROGRESS: &str = "spellingProgress";
    pub const LETTER_WORDS_PROGRESS: &str = "letterWordsProgress";
    pub const SETTINGS: &str = "settings";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("storage lock poisoned")]
    Poisoned,
}

pub trait ProgressStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl ProgressStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::write(self.path_for(key)?, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)?) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

pub fn save<T: Serialize + ?Sized>(store: &dyn ProgressStore, key: &str, value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(err) => {
            log::error!("Failed to serialize {}: {}", key, err);
            return;
        }
    };
    if let Err(err) = store.set(key, &json) {
        log::error!("Failed to save {}: {}", key, err);
    }
}

pub fn load<T: DeserializeOwned>(store: &dyn ProgressStore, key: &str) -> Option<T> {
    let json = match store.get(key) {
        Ok(json) => json?,
        Err(err) => {
            log::error!("Failed to read {}: {}", key, err);
            return None;
        }
    };
    serde_json::from_str(&json)
        .inspect_err(|err| log::warn!("Discarding unreadable {}: {}", key, err))
        .ok()
}

pub fn remove(store: &dyn ProgressStore, key: &str) {
    if let Err(err) = store.remove(key) {
        log::error!("Failed to remove {}: {}", key, err);
    }
}

/// The keys of one chat, kept apart from every other chat's.
#[derive(Clone, Copy)]
pub struct ChatStore<'a> {
    store: &'a dyn ProgressStore,
    chat_id: i64,
}

impl<'a> ChatStore<'a> {
    pub fn new(store: &'a dyn ProgressStore, chat_id: i64) -> Self {
        Self { store, chat_id }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}.{}", self.chat_id, key)
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        save(self.store, &self.scoped(key), value)
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        load(self.store, &self.scoped(key))
    }

    pub fn remove(&self, key: &str) {
        remove(self.store, &self.scoped(key))
    }

    pub fn settings(&self) -> Settings {
        self.load::<Settings>(keys::SETTINGS)
            .map(Settings::normalized)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    He,
    En,
}

impl Language {
    pub fn numeric_feedback(&self, correct: bool, expected: i64) -> String {
        match self {
            Language::He => scorer::numeric_feedback(correct, expected),
            Language::En => self.text_feedback(correct, &expected.to_string()),
        }
    }

    pub fn text_feedback(&self, correct: bool, expected: &str) -> String {
        match (self, correct) {
            (Language::He, true) => "✓ נכון מצוין!".to_string(),
            (Language::He, false) => format!("✗ טעות! התשובה הנכונה היא {}", expected),
            (Language::En, true) => "✓ Correct, well done!".to_string(),
            (Language::En, false) => format!("✗ Not quite! The right answer is {}", expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub practice_range: u32,
    pub sound_enabled: bool,
    pub typed_answers: bool,
    pub language: Language,
    pub provider: Provider,
    pub api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            practice_range: DEFAULT_RANGE,
            sound_enabled: true,
            typed_answers: false,
            language: Language::He,
            provider: Provider::default(),
            api_key: None,
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.practice_range = self.practice_range.clamp(MIN_RANGE, MAX_RANGE);
        self.api_key = self.api_key.filter(|key| !key.trim().is_empty());
        self
    }
}
