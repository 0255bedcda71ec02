//! Letter recognition and spelling games for early readers.

use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;

use crate::quiz::{
    self,
    performance::WrongCounts,
    scorer,
    selector::{self, SelectError},
};

pub const POINTS_PER_ANSWER: u32 = 10;
const DECOY_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letter {
    pub letter: &'static str,
    pub name: &'static str,
    pub transliteration: &'static str,
}

const fn letter(letter: &'static str, name: &'static str, transliteration: &'static str) -> Letter {
    Letter {
        letter,
        name,
        transliteration,
    }
}

pub static ALPHABET: [Letter; 22] = [
    letter("א", "אָלֶף", "Alef"),
    letter("ב", "בֵּית", "Bet"),
    letter("ג", "גִּימֶל", "Gimel"),
    letter("ד", "דָּלֶת", "Dalet"),
    letter("ה", "הֵא", "Hey"),
    letter("ו", "וָו", "Vav"),
    letter("ז", "זַיִן", "Zayin"),
    letter("ח", "חֵית", "Chet"),
    letter("ט", "טֵית", "Tet"),
    letter("י", "יוֹד", "Yod"),
    letter("כ", "כַּף", "Kaf"),
    letter("ל", "לָמֶד", "Lamed"),
    letter("מ", "מֵם", "Mem"),
    letter("נ", "נוּן", "Nun"),
    letter("ס", "סָמֶךְ", "Samech"),
    letter("ע", "עַיִן", "Ayin"),
    letter("פ", "פֵּא", "Pey"),
    letter("צ", "צָדִי", "Tzadi"),
    letter("ק", "קוֹף", "Kuf"),
    letter("ר", "רֵישׁ", "Resh"),
    letter("ש", "שִׁין", "Shin"),
    letter("ת", "תָּו", "Tav"),
];

pub fn find_letter(text: &str) -> Option<&'static Letter> {
    ALPHABET.iter().find(|l| l.letter == text.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    pub word: &'static str,
    pub meaning: &'static str,
    pub emoji: &'static str,
}

const fn word(word: &'static str, meaning: &'static str, emoji: &'static str) -> Word {
    Word {
        word,
        meaning,
        emoji,
    }
}

pub static WORDS: [Word; 20] = [
    word("אבא", "Dad", "👨"),
    word("אמא", "Mom", "👩"),
    word("בית", "House", "🏠"),
    word("גמל", "Camel", "🐪"),
    word("דג", "Fish", "🐟"),
    word("הר", "Mountain", "⛰️"),
    word("ורד", "Rose", "🌹"),
    word("חתול", "Cat", "🐱"),
    word("יד", "Hand", "✋"),
    word("ים", "Sea", "🌊"),
    word("כלב", "Dog", "🐕"),
    word("לב", "Heart", "❤️"),
    word("מים", "Water", "💧"),
    word("נר", "Candle", "🕯️"),
    word("סוס", "Horse", "🐴"),
    word("עץ", "Tree", "🌳"),
    word("פיל", "Elephant", "🐘"),
    word("קוף", "Monkey", "🐵"),
    word("שמש", "Sun", "☀️"),
    word("תות", "Strawberry", "🍓"),
];

fn pick_by_wrong_counts<'a, T, R, F>(items: &'a [T], counts: &WrongCounts, key: F, rng: &mut R) -> Result<&'a T, SelectError>
where
    R: Rng + ?Sized,
    F: Fn(&T) -> &str,
{
    let weights = items.iter().map(|item| counts.weight(key(item))).collect::<Vec<_>>();
    let index = selector::pick_weighted(&weights, rng)?;
    Ok(&items[index])
}

/// Outcome of one attempt. A miss keeps the same item for another try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Correct,
    Retry { expected: String },
    Empty,
}

/// "Which letter is this?" with the letter's name as the cue.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningGame {
    pub score: u32,
    pub question_number: u32,
    pub wrong_answers: WrongCounts,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl ListeningGame {
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&'static Letter, SelectError> {
        let target = pick_by_wrong_counts(&ALPHABET, &self.wrong_answers, |l| l.letter, rng)?;

        let mut options = ALPHABET
            .iter()
            .filter(|l| l.letter != target.letter)
            .choose_multiple(rng, DECOY_COUNT)
            .into_iter()
            .map(|l| l.letter.to_string())
            .collect::<Vec<_>>();
        options.push(target.letter.to_string());
        options.shuffle(rng);

        self.question_number += 1;
        self.current = Some(target.letter.to_string());
        self.options = options;
        Ok(target)
    }

    pub fn current_letter(&self) -> Option<&'static Letter> {
        self.current.as_deref().and_then(find_letter)
    }

    pub fn question(&self) -> Option<quiz::Question> {
        let target = self.current_letter()?;
        Some(quiz::Question::new(
            format!("🔊 {} ({})\nאיזו אות זו?", target.name, target.transliteration),
            self.options
                .iter()
                .map(|o| quiz::Answer::new(o.clone(), o == target.letter))
                .collect(),
        ))
    }

    pub fn answer(&mut self, selected: &str) -> Attempt {
        let Some(target) = self.current_letter() else {
            return Attempt::Empty;
        };
        let correct = scorer::grade_text(selected.trim(), target.letter);
        self.wrong_answers.record(target.letter, correct);
        if correct {
            self.score += POINTS_PER_ANSWER;
            self.current = None;
            Attempt::Correct
        } else {
            Attempt::Retry {
                expected: target.letter.to_string(),
            }
        }
    }
}

/// Spell the pictured word letter for letter.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellingGame {
    pub score: u32,
    pub question_number: u32,
    pub wrong_words: WrongCounts,
    #[serde(default)]
    pub current: Option<String>,
}

impl SpellingGame {
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&'static Word, SelectError> {
        let target = pick_by_wrong_counts(&WORDS, &self.wrong_words, |w| w.word, rng)?;
        self.question_number += 1;
        self.current = Some(target.word.to_string());
        Ok(target)
    }

    pub fn current_word(&self) -> Option<&'static Word> {
        let current = self.current.as_deref()?;
        WORDS.iter().find(|w| w.word == current)
    }

    pub fn prompt(&self) -> Option<String> {
        self.current_word()
            .map(|w| format!("{} {}\nכתבו את המילה בעברית:", w.emoji, w.meaning))
    }

    /// Empty input is turned away without touching the tallies.
    pub fn answer(&mut self, written: &str) -> Attempt {
        let Some(target) = self.current_word() else {
            return Attempt::Empty;
        };
        if written.trim().is_empty() {
            return Attempt::Empty;
        }

        let correct = scorer::grade_text(written, target.word);
        self.wrong_words.record(target.word, correct);
        if correct {
            self.score += POINTS_PER_ANSWER;
            self.current = None;
            Attempt::Correct
        } else {
            Attempt::Retry {
                expected: target.word.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn options_hold_target_and_three_distinct_decoys() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut game = ListeningGame::default();
        for _ in 0..100 {
            let target = game.next(&mut rng).unwrap();
            assert_eq!(game.options.len(), 4);
            let mut unique = game.options.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 4);
            assert_eq!(game.options.iter().filter(|o| *o == target.letter).count(), 1);
        }
        assert_eq!(game.question_number, 100);
    }

    #[test]
    fn miss_keeps_the_letter_and_counts_it() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut game = ListeningGame::default();
        let target = game.next(&mut rng).unwrap();
        let wrong = game
            .options
            .iter()
            .find(|o| *o != target.letter)
            .cloned()
            .unwrap();

        assert_eq!(
            game.answer(&wrong),
            Attempt::Retry {
                expected: target.letter.to_string()
            }
        );
        assert_eq!(game.current_letter(), Some(target));
        assert_eq!(game.wrong_answers.count(target.letter), 1);

        assert_eq!(game.answer(target.letter), Attempt::Correct);
        assert_eq!(game.score, POINTS_PER_ANSWER);
        assert_eq!(game.wrong_answers.count(target.letter), 0);
        assert!(game.current.is_none());
    }

    #[test]
    fn missed_letters_come_up_more_often() {
        let mut game = ListeningGame::default();
        for _ in 0..10 {
            game.wrong_answers.record("ש", false);
        }
        let mut rng = StdRng::seed_from_u64(21);
        let hits = (0..20_000)
            .filter(|_| game.next(&mut rng).unwrap().letter == "ש")
            .count();
        // Weight 6 out of 21 + 6 = 27.
        let expected = 20_000.0 * 6.0 / 27.0;
        assert!((hits as f64 - expected).abs() < expected * 0.1);
    }

    #[test]
    fn spelling_is_exact_and_rejects_empty_input() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut game = SpellingGame::default();
        let target = game.next(&mut rng).unwrap();
        assert!(game.prompt().unwrap().contains(target.emoji));

        assert_eq!(game.answer(""), Attempt::Empty);
        assert_eq!(game.wrong_words.count(target.word), 0);

        let misspelled = format!("{}א", target.word);
        assert!(matches!(game.answer(&misspelled), Attempt::Retry { .. }));
        assert_eq!(game.wrong_words.count(target.word), 1);

        assert_eq!(game.answer(target.word), Attempt::Correct);
        assert_eq!(game.score, POINTS_PER_ANSWER);
    }

    #[test]
    fn blank_spelling_is_not_a_miss() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut game = SpellingGame::default();
        let target = game.next(&mut rng).unwrap();

        assert_eq!(game.answer("   "), Attempt::Empty);
        assert_eq!(game.answer("\n\t"), Attempt::Empty);
        assert_eq!(game.wrong_words.count(target.word), 0);
        assert_eq!(game.current_word().map(|w| w.word), Some(target.word));
    }

    #[test]
    fn state_survives_a_round_trip_through_json() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut game = SpellingGame::default();
        game.next(&mut rng).unwrap();
        game.answer("x");
        let json = serde_json::to_string(&game).unwrap();
        let back: SpellingGame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, game);
    }
}
