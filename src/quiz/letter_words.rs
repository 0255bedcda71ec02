//! Letter to word: the learner is shown a letter and picks the pictured words
//! that start with it. Picking one right marks the letter as learned.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleWord {
    pub word: &'static str,
    pub meaning: &'static str,
    pub emoji: &'static str,
    pub starts_with_letter: bool,
}

impl ExampleWord {
    /// Button text for the word.
    pub fn label(&self) -> String {
        format!("{} {}", self.emoji, self.word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterWords {
    pub letter: &'static str,
    pub name: &'static str,
    pub words: [ExampleWord; 4],
}

const fn yes(word: &'static str, meaning: &'static str, emoji: &'static str) -> ExampleWord {
    ExampleWord {
        word,
        meaning,
        emoji,
        starts_with_letter: true,
    }
}

const fn no(word: &'static str, meaning: &'static str, emoji: &'static str) -> ExampleWord {
    ExampleWord {
        word,
        meaning,
        emoji,
        starts_with_letter: false,
    }
}

pub static LETTER_WORDS: [LetterWords; 22] = [
    LetterWords {
        letter: "א",
        name: "אָלֶף",
        words: [
            yes("אַבָּא", "Abba (Dad)", "👨"),
            no("בַּיִת", "Bayit (House)", "🏠"),
            yes("אִמָּא", "Ima (Mom)", "👩"),
            no("גָּמָל", "Gamal (Camel)", "🐪"),
        ],
    },
    LetterWords {
        letter: "ב",
        name: "בֵּית",
        words: [
            yes("בַּיִת", "Bayit (House)", "🏠"),
            yes("בָּנָנָה", "Banana", "🍌"),
            no("אַבָּא", "Abba (Dad)", "👨"),
            no("כֶּלֶב", "Kelev (Dog)", "🐕"),
        ],
    },
    LetterWords {
        letter: "ג",
        name: "גִּימֶל",
        words: [
            yes("גָּמָל", "Gamal (Camel)", "🐪"),
            yes("גִּינָה", "Gina (Garden)", "🌻"),
            no("דַּג", "Dag (Fish)", "🐟"),
            no("חָתוּל", "Chatul (Cat)", "🐱"),
        ],
    },
    LetterWords {
        letter: "ד",
        name: "דָּלֶת",
        words: [
            yes("דַּג", "Dag (Fish)", "🐟"),
            yes("דֶּלֶת", "Delet (Door)", "🚪"),
            no("הַר", "Har (Mountain)", "⛰️"),
            no("וָרֹד", "Vered (Rose)", "🌹"),
        ],
    },
    LetterWords {
        letter: "ה",
        name: "הֵא",
        words: [
            yes("הַר", "Har (Mountain)", "⛰️"),
            yes("הוֹרִים", "Horim (Parents)", "👨‍👩‍👧"),
            no("זֶבְרָה", "Zebra", "🦓"),
            no("חָלָב", "Chalav (Milk)", "🥛"),
        ],
    },
    LetterWords {
        letter: "ו",
        name: "וָו",
        words: [
            yes("וָרֹד", "Vered (Rose)", "🌹"),
            yes("וִילוֹן", "Vilon (Curtain)", "🪟"),
            no("זַיִת", "Zayit (Olive)", "🫒"),
            no("טֶלֶפוֹן", "Telefon (Phone)", "📱"),
        ],
    },
    LetterWords {
        letter: "ז",
        name: "זַיִן",
        words: [
            yes("זֶבְרָה", "Zebra", "🦓"),
            yes("זַיִת", "Zayit (Olive)", "🫒"),
            no("חָתוּל", "Chatul (Cat)", "🐱"),
            no("יָד", "Yad (Hand)", "✋"),
        ],
    },
    LetterWords {
        letter: "ח",
        name: "חֵית",
        words: [
            yes("חָתוּל", "Chatul (Cat)", "🐱"),
            yes("חָלָב", "Chalav (Milk)", "🥛"),
            no("טֶלֶפוֹן", "Telefon (Phone)", "📱"),
            no("יָם", "Yam (Sea)", "🌊"),
        ],
    },
    LetterWords {
        letter: "ט",
        name: "טֵית",
        words: [
            yes("טֶלֶפוֹן", "Telefon (Phone)", "📱"),
            yes("טָבָּעַת", "Tabaat (Ring)", "💍"),
            no("כַּדּוּר", "Kadur (Ball)", "⚽"),
            no("לֶחֶם", "Lechem (Bread)", "🍞"),
        ],
    },
    LetterWords {
        letter: "י",
        name: "יוֹד",
        words: [
            yes("יָד", "Yad (Hand)", "✋"),
            yes("יָם", "Yam (Sea)", "🌊"),
            no("כֶּלֶב", "Kelev (Dog)", "🐕"),
            no("מַיִם", "Mayim (Water)", "💧"),
        ],
    },
    LetterWords {
        letter: "כ",
        name: "כַּף",
        words: [
            yes("כֶּלֶב", "Kelev (Dog)", "🐕"),
            yes("כַּדּוּר", "Kadur (Ball)", "⚽"),
            no("לֶחֶם", "Lechem (Bread)", "🍞"),
            no("מַיִם", "Mayim (Water)", "💧"),
        ],
    },
    LetterWords {
        letter: "ל",
        name: "לָמֶד",
        words: [
            yes("לֶחֶם", "Lechem (Bread)", "🍞"),
            yes("לֵב", "Lev (Heart)", "❤️"),
            no("מַיִם", "Mayim (Water)", "💧"),
            no("נֵר", "Ner (Candle)", "🕯️"),
        ],
    },
    LetterWords {
        letter: "מ",
        name: "מֵם",
        words: [
            yes("מַיִם", "Mayim (Water)", "💧"),
            yes("מֶלֶךְ", "Melech (King)", "🤴"),
            no("נֵר", "Ner (Candle)", "🕯️"),
            no("סוּס", "Sus (Horse)", "🐴"),
        ],
    },
    LetterWords {
        letter: "נ",
        name: "נוּן",
        words: [
            yes("נֵר", "Ner (Candle)", "🕯️"),
            yes("נָחָשׁ", "Nachash (Snake)", "🐍"),
            no("סוּס", "Sus (Horse)", "🐴"),
            no("עֵץ", "Etz (Tree)", "🌳"),
        ],
    },
    LetterWords {
        letter: "ס",
        name: "סָמֶךְ",
        words: [
            yes("סוּס", "Sus (Horse)", "🐴"),
            yes("סֵפֶר", "Sefer (Book)", "📖"),
            no("עֵץ", "Etz (Tree)", "🌳"),
            no("פֶּרַח", "Perach (Flower)", "🌸"),
        ],
    },
    LetterWords {
        letter: "ע",
        name: "עַיִן",
        words: [
            yes("עֵץ", "Etz (Tree)", "🌳"),
            yes("עַיִן", "Ayin (Eye)", "👁️"),
            no("פֶּרַח", "Perach (Flower)", "🌸"),
            no("צִפּוֹר", "Tzipor (Bird)", "🐦"),
        ],
    },
    LetterWords {
        letter: "פ",
        name: "פֵּא",
        words: [
            yes("פֶּרַח", "Perach (Flower)", "🌸"),
            yes("פִּיל", "Pil (Elephant)", "🐘"),
            no("צִפּוֹר", "Tzipor (Bird)", "🐦"),
            no("קוֹף", "Kof (Monkey)", "🐵"),
        ],
    },
    LetterWords {
        letter: "צ",
        name: "צַדִּי",
        words: [
            yes("צִפּוֹר", "Tzipor (Bird)", "🐦"),
            yes("צַב", "Tzav (Turtle)", "🐢"),
            no("קוֹף", "Kof (Monkey)", "🐵"),
            no("רֹאשׁ", "Rosh (Head)", "🧑"),
        ],
    },
    LetterWords {
        letter: "ק",
        name: "קוֹף",
        words: [
            yes("קוֹף", "Kof (Monkey)", "🐵"),
            yes("קָפֶה", "Kafe (Coffee)", "☕"),
            no("רֹאשׁ", "Rosh (Head)", "🧑"),
            no("שֶׁמֶשׁ", "Shemesh (Sun)", "☀️"),
        ],
    },
    LetterWords {
        letter: "ר",
        name: "רֵישׁ",
        words: [
            yes("רֹאשׁ", "Rosh (Head)", "🧑"),
            yes("רֶגֶל", "Regel (Leg/Foot)", "🦵"),
            no("שֶׁמֶשׁ", "Shemesh (Sun)", "☀️"),
            no("תַּפּוּחַ", "Tapuach (Apple)", "🍎"),
        ],
    },
    LetterWords {
        letter: "ש",
        name: "שִׁין",
        words: [
            yes("שֶׁמֶשׁ", "Shemesh (Sun)", "☀️"),
            yes("שֻׁלְחָן", "Shulchan (Table)", "🪑"),
            no("תַּפּוּחַ", "Tapuach (Apple)", "🍎"),
            no("אַבָּא", "Abba (Dad)", "👨"),
        ],
    },
    LetterWords {
        letter: "ת",
        name: "תָּו",
        words: [
            yes("תַּפּוּחַ", "Tapuach (Apple)", "🍎"),
            yes("תּוּת", "Tut (Strawberry)", "🍓"),
            no("אִמָּא", "Ima (Mom)", "👩"),
            no("בַּיִת", "Bayit (House)", "🏠"),
        ],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Correct,
    Wrong,
    /// Not one of the current letter's words.
    Unknown,
}

/// Walks the alphabet in order and remembers which letters were learned.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LetterWordsGame {
    pub current_letter: usize,
    pub learned_letters: BTreeSet<usize>,
}

impl LetterWordsGame {
    pub fn current(&self) -> &'static LetterWords {
        &LETTER_WORDS[self.current_letter % LETTER_WORDS.len()]
    }

    pub fn progress(&self) -> String {
        format!(
            "אות {} מתוך {}",
            self.current_letter % LETTER_WORDS.len() + 1,
            LETTER_WORDS.len()
        )
    }

    pub fn learned_count(&self) -> usize {
        self.learned_letters
            .iter()
            .filter(|i| **i < LETTER_WORDS.len())
            .count()
    }

    pub fn is_learned(&self, letter: &str) -> bool {
        LETTER_WORDS
            .iter()
            .position(|l| l.letter == letter)
            .is_some_and(|i| self.learned_letters.contains(&i))
    }

    /// The current letter's words in a fresh order.
    pub fn shuffled_words<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<&'static ExampleWord> {
        let mut words = self.current().words.iter().collect::<Vec<_>>();
        words.shuffle(rng);
        words
    }

    /// Accepts a button label or the bare word.
    pub fn pick(&mut self, text: &str) -> Pick {
        let text = text.trim();
        let Some(word) = self
            .current()
            .words
            .iter()
            .find(|w| w.label() == text || w.word == text)
        else {
            return Pick::Unknown;
        };

        if word.starts_with_letter {
            self.learned_letters.insert(self.current_letter % LETTER_WORDS.len());
            Pick::Correct
        } else {
            Pick::Wrong
        }
    }

    /// Moves on, back to alef after tav.
    pub fn next_letter(&mut self) {
        self.current_letter = (self.current_letter % LETTER_WORDS.len() + 1) % LETTER_WORDS.len();
    }

    pub fn jump_to(&mut self, letter: &str) -> bool {
        match LETTER_WORDS.iter().position(|l| l.letter == letter.trim()) {
            Some(index) => {
                self.current_letter = index;
                true
            }
            None => false,
        }
    }

    /// The alphabet on one line, learned letters ticked and the current one
    /// bracketed.
    pub fn overview(&self) -> String {
        let current = self.current_letter % LETTER_WORDS.len();
        LETTER_WORDS
            .iter()
            .enumerate()
            .map(|(i, l)| {
                if i == current {
                    format!("[{}]", l.letter)
                } else if self.learned_letters.contains(&i) {
                    format!("{}✓", l.letter)
                } else {
                    l.letter.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn first_char(word: &str) -> char {
        word.chars().next().unwrap()
    }

    #[test]
    fn correct_words_start_with_their_letter() {
        for entry in LETTER_WORDS.iter() {
            let letter = first_char(entry.letter);
            assert!(entry.words.iter().any(|w| w.starts_with_letter));
            for word in entry.words.iter() {
                assert_eq!(first_char(word.word) == letter, word.starts_with_letter, "{}", word.word);
            }
        }
    }

    #[test]
    fn right_pick_marks_the_letter_and_wrong_pick_does_not() {
        let mut game = LetterWordsGame::default();
        assert_eq!(game.pick("🏠 בַּיִת"), Pick::Wrong);
        assert!(!game.is_learned("א"));

        assert_eq!(game.pick("קוֹף"), Pick::Unknown);
        assert_eq!(game.pick(" 👨 אַבָּא "), Pick::Correct);
        assert!(game.is_learned("א"));
        assert_eq!(game.learned_count(), 1);
        assert_eq!(game.current().letter, "א");
    }

    #[test]
    fn next_wraps_after_tav() {
        let mut game = LetterWordsGame::default();
        assert!(game.jump_to("ת"));
        assert_eq!(game.progress(), "אות 22 מתוך 22");
        game.next_letter();
        assert_eq!(game.current().letter, "א");
        assert!(!game.jump_to("x"));
    }

    #[test]
    fn shuffle_keeps_the_four_words() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut game = LetterWordsGame::default();
        game.jump_to("מ");
        let mut words = game.shuffled_words(&mut rng).iter().map(|w| w.word).collect::<Vec<_>>();
        words.sort();
        let mut expected = game.current().words.iter().map(|w| w.word).collect::<Vec<_>>();
        expected.sort();
        assert_eq!(words, expected);
    }

    #[test]
    fn learned_letters_survive_storage_and_bad_indices_are_tolerated() {
        let mut game = LetterWordsGame::default();
        game.pick("אִמָּא");
        game.next_letter();
        let json = serde_json::to_string(&game).unwrap();
        assert_eq!(json, r#"{"currentLetter":1,"learnedLetters":[0]}"#);
        assert_eq!(serde_json::from_str::<LetterWordsGame>(&json).unwrap(), game);

        let odd: LetterWordsGame = serde_json::from_str(r#"{"currentLetter":45,"learnedLetters":[0,99]}"#).unwrap();
        assert_eq!(odd.current().letter, "ב");
        assert_eq!(odd.learned_count(), 1);
        assert!(odd.overview().contains("[ב]"));
        assert!(odd.overview().starts_with("א✓"));
    }
}
