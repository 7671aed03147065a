use std::collections::HashSet;
use std::sync::Arc;
use wordchain::config::{BootstrapConfig, RefereeConfig};
use wordchain::referee::Referee;
use wordchain::state::AppState;
use wordchain::store::{MemoryStore, RetryPolicy};
use wordchain::text::Phrase;
use wordchain::types::{Player, RoundStatus, SubmitOutcome};

const SCENARIO: &[&str] = &["con mèo", "mèo con", "con chó"];

fn phrase(s: &str) -> Phrase {
    Phrase::parse(s).expect("test phrase should normalize")
}

fn config(fail_limit: u32) -> RefereeConfig {
    RefereeConfig {
        fail_limit,
        read_retry: RetryPolicy::none(),
        ..Default::default()
    }
}

async fn setup(lines: &[&str], config: RefereeConfig) -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), config);
    state
        .bootstrap(lines.iter().copied(), &BootstrapConfig::default())
        .await
        .expect("bootstrap should succeed");
    (store, state)
}

/// Restart until the random opening is `wanted`
async fn open_with(referee: &Referee, wanted: &str) {
    let wanted = phrase(wanted);
    for _ in 0..200 {
        if referee.start_round_random().await.unwrap().as_ref() == Some(&wanted) {
            return;
        }
    }
    panic!("Opening {} was never drawn", wanted);
}

/// Three-phrase scenario from a fresh dictionary through a chain-exhaustion win
#[tokio::test]
async fn test_three_phrase_round() {
    let (_, state) = setup(SCENARIO, config(3)).await;
    let referee = state.referee("scenario").await;

    // "con chó" dead-ends immediately, so it can never open
    for _ in 0..50 {
        let opening = referee.start_round_random().await.unwrap();
        assert_ne!(opening, Some(phrase("con chó")));
        assert!(opening.is_some());
    }

    open_with(&referee, "con mèo").await;
    assert_eq!(
        referee.submit("alice", "mèo con").await.unwrap(),
        SubmitOutcome::Accepted
    );
    assert_eq!(
        referee.submit("bob", "mèo con").await.unwrap(),
        SubmitOutcome::Used
    );

    let win = referee.submit("bob", "con chó").await.unwrap();
    assert_eq!(
        win,
        SubmitOutcome::Won {
            winner: "bob".to_string()
        }
    );
    assert!(win.ok());
    assert!(win.ended());

    assert_eq!(
        referee.cooldowns().remaining(&phrase("con chó")).await.unwrap(),
        Some(3)
    );
    assert_eq!(referee.status().await.unwrap(), RoundStatus::Ended);
    assert_eq!(
        referee.submit("carol", "con mèo").await.unwrap(),
        SubmitOutcome::Ended {
            winner: Some("bob".to_string())
        }
    );
    assert_eq!(referee.hint().await.unwrap(), None);
}

/// A winning phrase rests for the next rounds, counting down as other rounds end
#[tokio::test]
async fn test_cooldown_across_rounds() {
    let (_, state) = setup(SCENARIO, config(3)).await;
    let referee = state.referee("cooldown").await;

    open_with(&referee, "con mèo").await;
    referee.submit("alice", "mèo con").await.unwrap();
    referee.submit("bob", "con chó").await.unwrap();

    // Round 2: starting a round does not decay the cooldown
    referee.start_round_random().await.unwrap();
    assert_eq!(
        referee.submit("alice", "con chó").await.unwrap(),
        SubmitOutcome::Cooldown { remaining: 3 }
    );

    // End round 2 with a different phrase via the fail limit
    open_with(&referee, "con mèo").await;
    referee.submit("alice", "mèo con").await.unwrap();
    for junk in ["xyz", "abc"] {
        assert_eq!(
            referee.submit("bob", junk).await.unwrap(),
            SubmitOutcome::NotInDict
        );
    }
    assert_eq!(
        referee.submit("bob", "qwerty").await.unwrap(),
        SubmitOutcome::FailLimitReached {
            winner: "alice".to_string()
        }
    );

    // Round 3: the count went down, and "mèo con" now rests too
    referee.start_round_random().await.unwrap();
    assert_eq!(
        referee.submit("alice", "con chó").await.unwrap(),
        SubmitOutcome::Cooldown { remaining: 2 }
    );
    let entries = referee.cooldowns().entries().await.unwrap();
    assert_eq!(entries.get("mèo con"), Some(&5));
}

/// Cooldowns belong to one game
#[tokio::test]
async fn test_cooldowns_are_per_game() {
    let (_, state) = setup(SCENARIO, config(3)).await;
    let first = state.referee("first").await;
    let second = state.referee("second").await;

    open_with(&first, "con mèo").await;
    first.submit("alice", "mèo con").await.unwrap();
    assert!(first.submit("bob", "con chó").await.unwrap().ended());

    open_with(&second, "con mèo").await;
    second.submit("carol", "mèo con").await.unwrap();
    assert_eq!(
        second.submit("dave", "con chó").await.unwrap(),
        SubmitOutcome::Won {
            winner: "dave".to_string()
        }
    );
}

/// Concurrent identical submissions for one game accept exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_accept_once() {
    let (_, state) = setup(SCENARIO, config(10)).await;
    let referee = state.referee("race").await;
    open_with(&referee, "con mèo").await;

    let mut handles = Vec::new();
    for i in 0..16 {
        // Each task gets its own referee; they share the game's lock
        let referee = state.referee("race").await;
        let user = format!("user{}", i);
        handles.push(tokio::spawn(async move {
            referee.submit(&user, "mèo con").await
        }));
    }

    let outcomes: Vec<SubmitOutcome> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("submit failed"))
        .collect();

    let accepted = outcomes.iter().filter(|o| o.ok()).count();
    let used = outcomes
        .iter()
        .filter(|o| **o == SubmitOutcome::Used)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(used, 15);
    assert_eq!(referee.round().used_count().await.unwrap(), 2);
}

/// A store fault is an error, never a "not in dictionary" verdict
#[tokio::test]
async fn test_store_fault_surfaces_as_error() {
    let (store, state) = setup(SCENARIO, config(3)).await;
    let referee = state.referee("fault").await;
    open_with(&referee, "con mèo").await;

    store.set_offline(true);
    let err = referee.submit("alice", "mèo con").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(referee.hint().await.is_err());

    store.set_offline(false);
    let snapshot = referee.snapshot().await.unwrap();
    assert_eq!(snapshot.last_word, Some(phrase("con mèo")));
    assert_eq!(snapshot.last_player, Some(Player::Bot));
    assert_eq!(
        referee.submit("alice", "mèo con").await.unwrap(),
        SubmitOutcome::Accepted
    );
}

/// Hints never consume phrases or count as failures
#[tokio::test]
async fn test_hint_has_no_side_effects() {
    let (_, state) = setup(&["con mèo", "mèo con", "mèo mướp", "con chó"], config(3)).await;
    let referee = state.referee("hint").await;
    open_with(&referee, "con mèo").await;

    let options: HashSet<Phrase> = [phrase("mèo con"), phrase("mèo mướp")].into();
    for _ in 0..20 {
        let hint = referee.hint().await.unwrap().expect("a reply exists");
        assert!(options.contains(&hint));
    }

    let snapshot = referee.snapshot().await.unwrap();
    assert_eq!(snapshot.used_count, 1);
    assert_eq!(
        referee.round().fail_count(&phrase("con mèo")).await.unwrap(),
        0
    );
}

/// Every bootstrapped phrase sits in the bucket of its own first token
#[tokio::test]
async fn test_bootstrap_bucket_invariant() {
    let lines = [
        "# animals",
        "Con Mèo",
        "mèo con",
        "con chó",
        "chó sói!",
        "\"xin\" chào",
        "",
        "xin lỗi",
    ];
    let (_, state) = setup(&lines, config(3)).await;

    let mut seen = HashSet::new();
    for token in ["con", "mèo", "chó", "xin", "sói", "chào", "lỗi"] {
        for member in state.dictionary.bucket(token).await.unwrap() {
            assert_eq!(member.first_token(), Some(token));
            assert!(seen.insert(member), "phrase in more than one bucket");
        }
    }
    assert_eq!(seen.len() as u64, state.dictionary.len().await.unwrap());
    assert!(seen.contains(&phrase("\"xin\" chào")));
}

/// Dictionary edits mid-round are seen by the next move
#[tokio::test]
async fn test_dictionary_edits_during_round() {
    let (_, state) = setup(SCENARIO, config(3)).await;
    let referee = state.referee("edits").await;
    open_with(&referee, "con mèo").await;
    referee.submit("alice", "mèo con").await.unwrap();

    // "con chó" would win; give it a continuation first
    state.add_phrase("chó sói").await.unwrap();
    assert_eq!(
        referee.submit("bob", "con chó").await.unwrap(),
        SubmitOutcome::Accepted
    );

    // Removing the only reply empties the hint
    state.remove_phrase("chó sói").await.unwrap();
    assert_eq!(referee.hint().await.unwrap(), None);
    assert_eq!(
        referee.submit("alice", "chó sói").await.unwrap(),
        SubmitOutcome::NotInDict
    );
}

/// An opening always leaves the next player a legal reply
#[tokio::test]
async fn test_opening_always_has_a_reply() {
    let (_, state) = setup(&["mèo mèo", "con chó"], config(3)).await;
    let referee = state.referee("self-reply").await;
    assert_eq!(referee.start_round_random().await.unwrap(), None);

    state.add_phrase("mèo con").await.unwrap();
    for _ in 0..20 {
        let opening = referee.start_round_random().await.unwrap();
        assert!(opening.is_some());
        assert!(
            referee.hint().await.unwrap().is_some(),
            "opening {:?} has no reply",
            opening
        );
    }
}
