//! Backend arbitration: fallback, unlock retry, exhaustion, supersede

mod helpers;

use helpers::*;
use narrator_common::events::{BackendKind, EndReason, ErrorCode, NarrationEvent, SessionState};
use narrator_engine::playback::NarrationRequest;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn error_events(events: &mut EventCollector) -> Vec<(ErrorCode, String)> {
    events
        .of_type("NarrationError")
        .into_iter()
        .filter_map(|e| match e {
            NarrationEvent::NarrationError { code, reason, .. } => Some((code, reason)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_element_gets_one_unlock_retry() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 1.0 })
            .suspended();
    let element = ScriptedBackend::new(
        BackendKind::BufferedElement,
        vec![Script::Fail(FailKind::Autoplay)],
        Script::Play { duration: 1.0 },
    );
    let engine = engine_with(&[decode.clone(), element.clone()]);
    let mut events = EventCollector::new(&engine);

    let outcome = engine
        .play(hello_request().with_audio(dummy_payload()))
        .await
        .unwrap();

    assert!(outcome.completed);
    assert_eq!(outcome.backend, BackendKind::BufferedElement);
    assert_eq!(element.start_count(), 2);
    assert_eq!(element.unlock_count(), 1);
    // Suspended decode context is tried last, so never reached
    assert_eq!(decode.start_count(), 0);
    assert!(error_events(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_backends_degrade_to_captions() {
    let decode = ScriptedBackend::always(
        BackendKind::StreamingDecode,
        Script::Fail(FailKind::Decode),
    );
    let element = ScriptedBackend::always(
        BackendKind::BufferedElement,
        Script::Fail(FailKind::Autoplay),
    );
    let engine = engine_with(&[decode.clone(), element.clone()]);
    let mut events = EventCollector::new(&engine);

    let started = Instant::now();
    let outcome = engine
        .play(hello_request().with_audio(dummy_payload()))
        .await
        .unwrap();

    // Captions still run on the 1.6s estimate
    assert!((started.elapsed().as_secs_f64() - 1.6).abs() < 0.01);
    assert!(!outcome.completed);
    assert!(!outcome.skipped);
    assert_eq!(outcome.backend, BackendKind::Synthetic);
    assert_eq!(outcome.end_reason, EndReason::Natural);
    assert_eq!(engine.caption_cursor(), 2);
    assert_eq!(events.count("CaptionsDone"), 1);

    assert_eq!(decode.start_count(), 1);
    assert_eq!(element.start_count(), 2);

    let errors = error_events(&mut events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ErrorCode::AutoplayRejected);
    assert!(errors[0].1.starts_with("playback-blocked"), "{}", errors[0].1);
}

#[tokio::test(start_paused = true)]
async fn test_suspended_context_prefers_element() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 1.0 })
            .suspended();
    let element =
        ScriptedBackend::always(BackendKind::BufferedElement, Script::Play { duration: 1.0 });
    let engine = engine_with(&[decode.clone(), element.clone()]);

    assert!(!engine.snapshot().await.decode_context_running);
    let outcome = engine
        .play(hello_request().with_audio(dummy_payload()))
        .await
        .unwrap();

    assert_eq!(outcome.backend, BackendKind::BufferedElement);
    assert_eq!(decode.start_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_gesture_resumes_decode_context() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 1.0 })
            .suspended();
    let element =
        ScriptedBackend::always(BackendKind::BufferedElement, Script::Play { duration: 1.0 });
    let engine = engine_with(&[decode.clone(), element.clone()]);

    engine.notify_user_gesture().await;
    assert!(engine.snapshot().await.decode_context_running);
    assert_eq!(decode.unlock_count(), 1);
    assert_eq!(element.unlock_count(), 1);

    let outcome = engine
        .play(hello_request().with_audio(dummy_payload()))
        .await
        .unwrap();
    assert_eq!(outcome.backend, BackendKind::StreamingDecode);
}

#[tokio::test(start_paused = true)]
async fn test_element_preferred_once_after_gesture_success() {
    let decode = ScriptedBackend::new(
        BackendKind::StreamingDecode,
        vec![Script::Fail(FailKind::Decode)],
        Script::Play { duration: 1.0 },
    );
    let element =
        ScriptedBackend::always(BackendKind::BufferedElement, Script::Play { duration: 1.0 });
    let engine = engine_with(&[decode.clone(), element.clone()]);
    let request = || hello_request().with_audio(dummy_payload());

    engine.notify_user_gesture().await;

    let first = engine.play(request()).await.unwrap();
    assert_eq!(first.backend, BackendKind::BufferedElement);

    // Element goes first even though decode would work now
    let second = engine.play(request()).await.unwrap();
    assert_eq!(second.backend, BackendKind::BufferedElement);
    assert_eq!(decode.start_count(), 1);

    let third = engine.play(request()).await.unwrap();
    assert_eq!(third.backend, BackendKind::StreamingDecode);
    assert_eq!(decode.start_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_mid_playback_failure_ends_session() {
    let decode = ScriptedBackend::always(
        BackendKind::StreamingDecode,
        Script::FailMidway {
            duration: 2.0,
            after: Duration::from_millis(300),
        },
    );
    let engine = engine_with(&[decode.clone()]);
    let mut events = EventCollector::new(&engine);

    let started = Instant::now();
    let outcome = engine
        .play(hello_request().with_audio(dummy_payload()))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(310));
    assert!(!outcome.completed);
    assert!(!outcome.skipped);
    assert_eq!(outcome.end_reason, EndReason::BackendFailure);

    // Remaining captions are flushed so the lesson can move on
    assert_eq!(engine.caption_cursor(), 2);
    assert_eq!(events.count("CaptionsDone"), 1);

    let errors = error_events(&mut events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ErrorCode::DecodeFailure);

    if let Some(StartedHandle::Manual(handle)) = decode.last_handle() {
        assert!(handle.stopped.load(Ordering::SeqCst));
    } else {
        panic!("expected a manual handle");
    }
}

#[tokio::test(start_paused = true)]
async fn test_new_narration_supersedes_active_one() {
    let decode = ScriptedBackend::new(
        BackendKind::StreamingDecode,
        vec![Script::Play { duration: 10.0 }],
        Script::Play { duration: 2.0 },
    );
    let engine = engine_with(&[decode.clone()]);
    let mut events = EventCollector::new(&engine);

    let first = spawn_play(&engine, hello_request().with_audio(dummy_payload()));
    sleep(Duration::from_secs(1)).await;
    let first_handle = decode.last_handle();

    let second = engine
        .play(hello_request().with_audio(dummy_payload()))
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(first.skipped);
    assert!(!first.completed);
    assert_eq!(first.end_reason, EndReason::Superseded);
    assert!(second.completed);
    assert_ne!(first.session_id, second.session_id);

    match first_handle {
        Some(StartedHandle::Clock(clock)) => assert!(!clock.is_running()),
        _ => panic!("expected a clock handle"),
    }
    assert_eq!(events.count("NarrationEnded"), 2);
    // Only the second narration finished its captions
    assert_eq!(events.count("CaptionsDone"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_playing() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Stuck { duration: 5.0 });
    let engine = engine_with(&[decode.clone()]);
    let mut events = EventCollector::new(&engine);

    let task = spawn_play(&engine, hello_request().with_audio(dummy_payload()));
    sleep(Duration::from_secs(1)).await;

    assert!(engine.stop().await);
    assert!(!engine.stop().await);

    let outcome = task.await.unwrap().unwrap();
    assert!(outcome.skipped);
    assert!(!outcome.completed);
    assert_eq!(outcome.end_reason, EndReason::Stopped);

    // No late watchdog trip for a stopped session
    sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.watchdog_interventions(), 0);
    assert_eq!(events.count("NarrationEnded"), 1);
    assert_eq!(events.count("CaptionsDone"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_loading_skips_backends() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 1.0 });
    let synth = CountingSynthesizer::returning(dummy_payload(), Duration::from_secs(1));
    let engine = narrator_engine::NarrationEngine::builder(settings())
        .backend(decode.clone())
        .synthesizer(synth.clone())
        .build()
        .unwrap();

    let task = spawn_play(&engine, hello_request());
    sleep(Duration::from_millis(100)).await;
    assert!(engine.stop().await);

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.end_reason, EndReason::Stopped);
    assert_eq!(synth.call_count(), 1);
    assert_eq!(decode.start_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_narration_still_fills_cache() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 1.0 });
    let synth = CountingSynthesizer::returning(dummy_payload(), Duration::from_millis(300));
    let engine = narrator_engine::NarrationEngine::builder(settings())
        .backend(decode.clone())
        .synthesizer(synth.clone())
        .build()
        .unwrap();

    let task = spawn_play(&engine, NarrationRequest::new("Hello.", ["Hello."]));
    sleep(Duration::from_millis(50)).await;
    assert!(engine.stop().await);
    task.await.unwrap().unwrap();

    sleep(Duration::from_secs(1)).await;
    let stats = engine.cache().stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.entries, 1);

    engine.cache().prefetch("Hello.");
    let outcome = engine
        .play(NarrationRequest::new("Hello.", ["Hello."]))
        .await
        .unwrap();
    assert_eq!(outcome.backend, BackendKind::StreamingDecode);
    assert_eq!(synth.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_play_releases_loading_session() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 1.0 });
    let synth = CountingSynthesizer::returning(dummy_payload(), Duration::from_millis(300));
    let engine = narrator_engine::NarrationEngine::builder(settings())
        .backend(decode.clone())
        .synthesizer(synth.clone())
        .build()
        .unwrap();
    let mut events = EventCollector::new(&engine);

    let task = spawn_play(&engine, hello_request());
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.snapshot().await.session.map(|s| s.state),
        Some(SessionState::Loading)
    );

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    settle().await;

    assert!(engine.snapshot().await.session.is_none());
    let ended = events.of_type("NarrationEnded");
    assert_eq!(ended.len(), 1);
    assert!(matches!(
        ended[0],
        NarrationEvent::NarrationEnded {
            end_reason: EndReason::Stopped,
            ..
        }
    ));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(decode.start_count(), 0);
    assert!(!engine.pause().await);

    let outcome = engine.play(hello_request()).await.unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.backend, BackendKind::StreamingDecode);
}

#[tokio::test(start_paused = true)]
async fn test_tts_failure_reports_network_error() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 1.0 });
    let engine = narrator_engine::NarrationEngine::builder(settings())
        .backend(decode.clone())
        .synthesizer(CountingSynthesizer::failing(Duration::from_millis(50)))
        .build()
        .unwrap();
    let mut events = EventCollector::new(&engine);

    let outcome = engine.play(hello_request()).await.unwrap();

    assert_eq!(outcome.backend, BackendKind::Synthetic);
    assert!(outcome.completed);
    assert_eq!(decode.start_count(), 0);
    let errors = error_events(&mut events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ErrorCode::NetworkFailure);
}

#[tokio::test(start_paused = true)]
async fn test_mute_applies_to_start_and_live_handle() {
    let decode =
        ScriptedBackend::always(BackendKind::StreamingDecode, Script::Play { duration: 2.0 });
    let engine = engine_with(&[decode.clone()]);
    let mut events = EventCollector::new(&engine);

    engine.set_muted(true).await;
    let task = spawn_play(&engine, hello_request().with_audio(dummy_payload()));
    sleep(Duration::from_millis(100)).await;

    assert!(decode.start_params.lock().unwrap()[0].muted);
    let handle = decode.last_handle().unwrap();
    assert!(handle.is_muted());

    engine.set_muted(false).await;
    assert!(!handle.is_muted());
    engine.set_muted(false).await;

    task.await.unwrap().unwrap();
    assert!(!engine.is_muted());
    assert_eq!(events.count("MuteChanged"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_duration_retimes_captions() {
    let element = ScriptedBackend::always(
        BackendKind::BufferedElement,
        Script::PlayLateDuration {
            duration: 3.0,
            delay: Duration::from_millis(100),
        },
    );
    let engine = engine_with(&[element.clone()]);
    let mut events = EventCollector::new(&engine);

    let started = Instant::now();
    let task = spawn_play(&engine, hello_request().with_audio(dummy_payload()));

    sleep(Duration::from_millis(200)).await;
    let session = engine.snapshot().await.session.unwrap();
    assert!(session.duration_authoritative);
    assert!((session.duration_seconds - 3.0).abs() < 1e-9);

    // The 1.6s estimate put the first boundary at 0.4s; 3s puts it at 0.75s
    sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.caption_cursor(), 0);
    sleep(Duration::from_millis(60)).await;
    assert_eq!(engine.caption_cursor(), 1);

    let outcome = task.await.unwrap().unwrap();
    assert!((started.elapsed().as_secs_f64() - 3.0).abs() < 0.01);
    assert!(outcome.completed);
    assert_eq!(outcome.end_reason, EndReason::Natural);
    assert_eq!(engine.watchdog_interventions(), 0);

    let started_events = events.of_type("NarrationStarted");
    match &started_events[0] {
        NarrationEvent::NarrationStarted {
            duration_seconds, ..
        } => assert!((duration_seconds - 1.6).abs() < 1e-9),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_engine_without_audio_backends_runs_synthetic() {
    let engine = engine_with(&[]);
    let request = NarrationRequest::new("Hi.", ["Hi."]).starting_at(5);
    let outcome = engine.play(request).await.unwrap();
    assert!(outcome.completed);
    assert_eq!(engine.caption_cursor(), 6);
}
