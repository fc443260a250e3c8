mod common;

use common::MockClient;
use genrelay_lib::config::TranslationConfig;
use genrelay_lib::provider::ProviderError;
use genrelay_lib::translation::{SessionEvent, SessionPhase, SegmentOrigin, TranslationSession};
use genrelay_lib::TranslationUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn spawn_session(
    client: &Arc<MockClient>,
) -> (TranslationSession, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = TranslationSession::spawn(client.clone(), TranslationConfig::default(), Arc::new(tx));
    (session, rx)
}

fn translation_updates(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<TranslationUpdate> {
    let mut updates = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SessionEvent::Translation(update) = event {
            updates.push(update);
        }
    }
    updates
}

#[tokio::test(start_paused = true)]
async fn interim_is_translated_after_debounce() {
    let client = Arc::new(MockClient::new());
    let (session, mut rx) = spawn_session(&client);

    session.on_interim_result("hello");
    sleep(Duration::from_millis(700)).await;
    session.flush().await;
    assert!(client.translated_texts().is_empty());
    assert_eq!(session.snapshot().phase, SessionPhase::Debouncing);

    sleep(Duration::from_millis(100)).await;
    session.flush().await;
    assert_eq!(client.translated_texts(), vec!["hello".to_string()]);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.transcript, "");
    assert_eq!(snapshot.translation, "");
    assert_eq!(snapshot.live_translation.as_deref(), Some("HELLO"));

    let updates = translation_updates(&mut rx);
    assert!(matches!(
        updates.last(),
        Some(TranslationUpdate::Completed { origin: SegmentOrigin::Interim, reused: false, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn newer_interim_restarts_debounce() {
    let client = Arc::new(MockClient::new());
    let (session, _rx) = spawn_session(&client);

    session.on_interim_result("hel");
    sleep(Duration::from_millis(300)).await;
    session.on_interim_result("hello");

    sleep(Duration::from_millis(700)).await;
    session.flush().await;
    assert!(client.translated_texts().is_empty());

    sleep(Duration::from_millis(200)).await;
    session.flush().await;
    assert_eq!(client.translated_texts(), vec!["hello".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn repeated_final_is_translated_once() {
    let client = Arc::new(MockClient::new());
    let (session, mut rx) = spawn_session(&client);

    session.on_final_result("hi");
    session.on_final_result("hi");
    sleep(Duration::from_millis(500)).await;
    session.flush().await;

    assert_eq!(client.translated_texts(), vec!["hi".to_string()]);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.transcript, "hi hi");
    assert_eq!(snapshot.translation, "HI HI");

    let completed = translation_updates(&mut rx)
        .into_iter()
        .filter(|u| matches!(u, TranslationUpdate::Completed { .. }))
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test(start_paused = true)]
async fn final_within_cooldown_reuses_translation() {
    let client = Arc::new(MockClient::new());
    let (session, mut rx) = spawn_session(&client);

    session.on_final_result("hi");
    sleep(Duration::from_millis(200)).await;
    session.on_final_result("hi");
    session.flush().await;

    assert_eq!(client.translated_texts(), vec!["hi".to_string()]);
    assert_eq!(session.snapshot().transcript, "hi hi");
    assert_eq!(session.snapshot().translation, "HI HI");

    let reused: Vec<_> = translation_updates(&mut rx)
        .into_iter()
        .filter_map(|u| match u {
            TranslationUpdate::Completed { reused, .. } => Some(reused),
            _ => None,
        })
        .collect();
    assert_eq!(reused, vec![false, true]);
}

#[tokio::test(start_paused = true)]
async fn final_after_cooldown_calls_provider_again() {
    let client = Arc::new(MockClient::new());
    let (session, _rx) = spawn_session(&client);

    session.on_final_result("hi");
    sleep(Duration::from_millis(1500)).await;
    session.on_final_result("hi");
    sleep(Duration::from_millis(100)).await;
    session.flush().await;

    assert_eq!(client.translated_texts(), vec!["hi".to_string(), "hi".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn cached_final_cancels_inflight_interim() {
    let client = Arc::new(MockClient::new().with_chunk_delay(Duration::from_millis(100)));
    let (session, mut rx) = spawn_session(&client);

    // Dispatched at 0, done at 100.
    session.on_final_result("hi");
    sleep(Duration::from_millis(100)).await;
    session.on_interim_result("yo there");

    // Debounce fires at 850; the first chunk of "yo there" lands at 950.
    sleep(Duration::from_millis(800)).await;
    session.flush().await;
    let interim = session.snapshot().active_dispatch.expect("interim in flight");

    session.on_final_result("hi");
    session.flush().await;
    assert!(client.tokens.lock().unwrap()[1].is_cancelled());
    assert!(session.snapshot().active_dispatch.is_none());

    sleep(Duration::from_secs(2)).await;
    session.flush().await;

    assert_eq!(
        client.translated_texts(),
        vec!["hi".to_string(), "yo there".to_string()]
    );
    let snapshot = session.snapshot();
    assert_eq!(snapshot.transcript, "hi hi");
    assert_eq!(snapshot.translation, "HI HI");
    assert!(snapshot.live_translation.is_none());

    let updates = translation_updates(&mut rx);
    let superseded = updates
        .iter()
        .position(|u| matches!(u, TranslationUpdate::Superseded { dispatch_id } if *dispatch_id == interim))
        .expect("interim superseded");
    assert!(updates[superseded..]
        .iter()
        .all(|u| u.dispatch_id() != interim || matches!(u, TranslationUpdate::Superseded { .. })));
    assert!(matches!(
        updates.last(),
        Some(TranslationUpdate::Completed { reused: true, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn cooldown_window_runs_from_dispatch() {
    let client = Arc::new(MockClient::new().with_chunk_delay(Duration::from_millis(400)));
    let (session, _rx) = spawn_session(&client);

    // Dispatched at 0, two chunks, done at 800.
    session.on_final_result("one two");
    sleep(Duration::from_millis(950)).await;
    session.on_final_result("one two");
    session.flush().await;
    assert_eq!(client.translated_texts().len(), 1);

    // 1100ms after the first attempt: outside the window even though the
    // stream only finished 300ms ago.
    sleep(Duration::from_millis(150)).await;
    session.on_final_result("one two");
    sleep(Duration::from_millis(10)).await;
    session.flush().await;
    assert_eq!(
        client.translated_texts(),
        vec!["one two".to_string(), "one two".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn final_supersedes_inflight_interim() {
    let client = Arc::new(MockClient::new().with_chunk_delay(Duration::from_millis(500)));
    let (session, mut rx) = spawn_session(&client);

    session.on_interim_result("good");
    sleep(Duration::from_millis(1000)).await;
    session.flush().await;
    let first = session.snapshot().active_dispatch.expect("interim in flight");

    session.on_final_result("good morning");
    sleep(Duration::from_secs(3)).await;
    session.flush().await;

    assert_eq!(
        client.translated_texts(),
        vec!["good".to_string(), "good morning".to_string()]
    );
    assert!(client.tokens.lock().unwrap()[0].is_cancelled());

    let snapshot = session.snapshot();
    assert_eq!(snapshot.transcript, "good morning");
    assert_eq!(snapshot.translation, "GOOD MORNING");
    assert_eq!(snapshot.phase, SessionPhase::Idle);

    let updates = translation_updates(&mut rx);
    let superseded = updates
        .iter()
        .position(|u| matches!(u, TranslationUpdate::Superseded { dispatch_id } if *dispatch_id == first))
        .expect("first dispatch superseded");
    let second_started = updates
        .iter()
        .position(|u| matches!(u, TranslationUpdate::Started { text, .. } if text == "good morning"))
        .expect("second dispatch started");
    assert!(superseded < second_started);
    assert!(updates[superseded..]
        .iter()
        .all(|u| u.dispatch_id() != first || matches!(u, TranslationUpdate::Superseded { .. })));
}

#[tokio::test(start_paused = true)]
async fn reset_drops_late_output() {
    let client = Arc::new(MockClient::new().with_chunk_delay(Duration::from_millis(500)));
    let (session, mut rx) = spawn_session(&client);

    session.on_final_result("hello there");
    sleep(Duration::from_millis(600)).await;
    session.flush().await;
    assert_eq!(session.snapshot().live_translation.as_deref(), Some("HELLO"));
    let dispatch = session.snapshot().active_dispatch.expect("dispatch in flight");

    session.reset();
    sleep(Duration::from_secs(5)).await;
    session.flush().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.transcript, "");
    assert_eq!(snapshot.translation, "");
    assert!(snapshot.live_translation.is_none());
    assert!(snapshot.active_dispatch.is_none());
    assert!(client.tokens.lock().unwrap()[0].is_cancelled());

    let updates = translation_updates(&mut rx);
    let superseded = updates
        .iter()
        .position(|u| matches!(u, TranslationUpdate::Superseded { .. }))
        .expect("reset acknowledged");
    assert_eq!(updates[superseded].dispatch_id(), dispatch);
    assert_eq!(updates.len(), superseded + 1);
}

#[tokio::test(start_paused = true)]
async fn recognition_end_finalizes_pending_interim() {
    let client = Arc::new(MockClient::new());
    let (session, _rx) = spawn_session(&client);

    session.on_interim_result("see you");
    session.on_recognition_ended();
    sleep(Duration::from_millis(50)).await;
    session.flush().await;

    // Dispatched at once, not after the debounce.
    assert_eq!(client.translated_texts(), vec!["see you".to_string()]);
    assert_eq!(session.snapshot().transcript, "see you");
    assert!(session.snapshot().pending_interim.is_none());

    sleep(Duration::from_secs(2)).await;
    session.flush().await;
    assert_eq!(client.translated_texts().len(), 1);
    assert_eq!(session.snapshot().translation, "SEE YOU");
}

#[tokio::test(start_paused = true)]
async fn failed_translation_keeps_accumulated_text() {
    let client = Arc::new(MockClient::new());
    let (session, mut rx) = spawn_session(&client);

    session.on_final_result("one");
    sleep(Duration::from_millis(100)).await;
    session.flush().await;
    assert_eq!(session.snapshot().translation, "ONE");

    client.fail_translations(Some(ProviderError::RateLimited));
    session.on_final_result("two");
    sleep(Duration::from_millis(100)).await;
    session.flush().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.transcript, "one two");
    assert_eq!(snapshot.translation, "ONE");
    assert_eq!(snapshot.phase, SessionPhase::Idle);

    let failed = translation_updates(&mut rx)
        .into_iter()
        .find(|u| matches!(u, TranslationUpdate::Failed { .. }))
        .expect("failure reported");
    match failed {
        TranslationUpdate::Failed { text, error, .. } => {
            assert_eq!(text, "two");
            assert!(error.starts_with("Translation stream failed"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn timestamp_markers_are_stripped_before_dispatch() {
    let client = Arc::new(MockClient::new());
    let (session, _rx) = spawn_session(&client);

    session.on_final_result("[00:01.200] good   night (00:03)");
    session.on_final_result("   ");
    sleep(Duration::from_millis(100)).await;
    session.flush().await;

    assert_eq!(client.translated_texts(), vec!["good night".to_string()]);
    assert_eq!(session.snapshot().transcript, "good night");
}

#[tokio::test(start_paused = true)]
async fn target_language_change_resets_session() {
    let client = Arc::new(MockClient::new());
    let (session, _rx) = spawn_session(&client);

    session.on_final_result("bonjour");
    sleep(Duration::from_millis(100)).await;
    session.set_target_language("de");
    session.on_final_result("bonjour");
    sleep(Duration::from_millis(100)).await;
    session.flush().await;

    let calls = client.translations.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("bonjour".to_string(), "en".to_string()),
            ("bonjour".to_string(), "de".to_string()),
        ]
    );
    let snapshot = session.snapshot();
    assert_eq!(snapshot.target_language, "de");
    assert_eq!(snapshot.transcript, "bonjour");
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_inflight_translation() {
    let client = Arc::new(MockClient::new().with_chunk_delay(Duration::from_secs(1)));
    let (session, _rx) = spawn_session(&client);

    session.on_final_result("long sentence here");
    session.flush().await;
    sleep(Duration::from_millis(10)).await;

    session.shutdown().await;
    assert!(client.tokens.lock().unwrap()[0].is_cancelled());
}
