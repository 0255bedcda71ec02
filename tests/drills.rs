use hebrew_drills::{
    quiz::{
        arithmetic::{AddSubtractGame, Fact, FactRecord, FactTracker, Operation, Problem},
        difficulty::{RATCHET_MAX, RATCHET_MIN},
        letter_words::{LetterWordsGame, Pick, LETTER_WORDS},
        performance::INITIAL_WEIGHT,
        selector,
    },
    storage::{keys, ChatStore, MemoryStore},
};
use rand::{rngs::StdRng, SeedableRng};

fn next_addition(game: &AddSubtractGame, rng: &mut StdRng) -> Problem {
    loop {
        let problem = game.generate(rng);
        if problem.operation == Operation::Add {
            return problem;
        }
    }
}

#[test]
fn addition_streak_raises_then_a_miss_lowers() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut game = AddSubtractGame::default();
    assert_eq!(game.difficulty.value(), 10);

    let mut seen = vec![game.difficulty.value()];
    for _ in 0..5 {
        let problem = next_addition(&game, &mut rng);
        assert!(problem.left <= game.difficulty.value() && problem.right <= game.difficulty.value());
        game.answer(true, 1_000);
        seen.push(game.difficulty.value());
    }

    assert!(seen.windows(2).all(|w| w[1] > w[0]));
    assert!(seen.iter().all(|v| *v <= RATCHET_MAX));
    // Below 50 every correct answer adds 2.
    assert_eq!(seen, vec![10, 12, 14, 16, 18, 20]);
    assert_eq!(game.session.streak, 5);

    next_addition(&game, &mut rng);
    game.answer(false, 2_000);
    assert_eq!(game.difficulty.value(), 17);
    assert_eq!(game.session.streak, 0);

    for _ in 0..10 {
        game.answer(false, 3_000);
    }
    assert_eq!(game.difficulty.value(), RATCHET_MIN);
}

#[test]
fn long_streaks_stop_at_the_ceiling() {
    let mut game = AddSubtractGame::default();
    for _ in 0..1_000 {
        game.answer(true, 0);
        assert!(game.difficulty.value() <= RATCHET_MAX);
    }
    assert_eq!(game.difficulty.value(), RATCHET_MAX);
}

#[test]
fn a_missed_fact_is_drilled_more_often() {
    let mut tracker = FactTracker::new(12);
    assert_eq!(tracker.records().len(), 144);

    let missed = Fact::new(7, 8);
    let untouched = Fact::new(3, 4);
    assert!(tracker.record(missed, false, 1_000));

    let weight = tracker.record_for(missed).map(|r| r.performance.weight);
    assert!(weight.is_some_and(|w| w > INITIAL_WEIGHT));

    // Well past the recency window, so every fact gets the same boost.
    let later = 1_000 + 10 * selector::RECENCY_WINDOW_MS;
    let mut rng = StdRng::seed_from_u64(99);
    let (mut missed_hits, mut untouched_hits) = (0, 0);
    for _ in 0..200_000 {
        let variant = tracker.next_question(later, &mut rng).unwrap();
        if variant.fact == missed {
            missed_hits += 1;
        } else if variant.fact == untouched {
            untouched_hits += 1;
        }
    }
    assert!(missed_hits > untouched_hits, "{} vs {}", missed_hits, untouched_hits);
}

#[test]
fn tracker_progress_survives_storage() {
    let store = MemoryStore::new();
    let chat = ChatStore::new(&store, 42);

    let mut tracker = FactTracker::new(12);
    tracker.record(Fact::new(7, 8), false, 5_000);
    chat.save(keys::MULTIPLICATION_PROGRESS, tracker.records());

    let stored: Vec<FactRecord> = chat.load(keys::MULTIPLICATION_PROGRESS).unwrap();
    let mut restored = FactTracker::new(12);
    assert!(restored.restore(stored));
    assert_eq!(restored, tracker);

    // A bank of a different size ignores the stored records.
    let stored: Vec<FactRecord> = chat.load(keys::MULTIPLICATION_PROGRESS).unwrap();
    let mut smaller = FactTracker::new(5);
    assert!(!smaller.restore(stored));
    assert_eq!(smaller, FactTracker::new(5));
}

#[test]
fn shrinking_the_range_keeps_shared_facts() {
    let mut tracker = FactTracker::new(12);
    tracker.record(Fact::new(2, 3), false, 5_000);
    tracker.record(Fact::new(9, 9), false, 5_000);

    tracker.update_range(5);
    assert_eq!(tracker.records().len(), 25);
    assert_eq!(tracker.record_for(Fact::new(2, 3)).map(|r| r.performance.wrong_count), Some(1));
    assert!(tracker.record_for(Fact::new(9, 9)).is_none());
}

#[test]
fn game_state_round_trips_per_chat() {
    let store = MemoryStore::new();
    let chat = ChatStore::new(&store, -100);

    let mut game = AddSubtractGame::default();
    game.answer(true, 1_000);
    game.answer(true, 2_000);
    chat.save(keys::ADD_SUBTRACT_PROGRESS, &game);

    let loaded: AddSubtractGame = chat.load(keys::ADD_SUBTRACT_PROGRESS).unwrap();
    assert_eq!(loaded.difficulty, game.difficulty);
    assert_eq!(loaded.session.score, 2);
    assert!(ChatStore::new(&store, 100).load::<AddSubtractGame>(keys::ADD_SUBTRACT_PROGRESS).is_none());
}

#[test]
fn learned_letters_persist_across_a_full_lap() {
    let store = MemoryStore::new();
    let chat = ChatStore::new(&store, 7);

    for _ in 0..LETTER_WORDS.len() {
        let mut game: LetterWordsGame = chat.load(keys::LETTER_WORDS_PROGRESS).unwrap_or_default();
        let right = game
            .current()
            .words
            .iter()
            .find(|w| w.starts_with_letter)
            .map(|w| w.label())
            .unwrap();
        assert_eq!(game.pick(&right), Pick::Correct);
        game.next_letter();
        chat.save(keys::LETTER_WORDS_PROGRESS, &game);
    }

    let game: LetterWordsGame = chat.load(keys::LETTER_WORDS_PROGRESS).unwrap();
    assert_eq!(game.learned_count(), LETTER_WORDS.len());
    assert_eq!(game.current().letter, "א");
    // The current letter is bracketed rather than ticked.
    assert_eq!(game.overview().matches('✓').count(), LETTER_WORDS.len() - 1);
}
