mod common;

use common::{guild, track, wait_until, FakeProvider};
use open_music_engine::{
    audio::{
        equalizer::EqualizerPreset, PlaybackStatus, PlayerEvent, RepeatMode, Session,
        SessionOptions,
    },
    error::PlayerError,
    sources::{SinkEvent, SinkSignal},
};
use pretty_assertions::assert_eq;
use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};
use tokio::{
    sync::{broadcast::Receiver, Notify},
    task::JoinHandle,
};

fn session(provider: &Arc<FakeProvider>) -> Arc<Session> {
    Session::spawn(guild(), provider.clone(), SessionOptions::default())
}

fn drain(events: &mut Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn ended(generation: u64) -> SinkSignal {
    SinkSignal {
        generation,
        event: SinkEvent::Ended,
    }
}

#[tokio::test]
async fn enqueue_starts_playback_when_idle() {
    let provider = FakeProvider::new();
    let session = session(&provider);

    let first = session.enqueue(track("a")).await.unwrap();
    assert_eq!(first.position, 1);
    assert!(first.started);

    let second = session.enqueue(track("b")).await.unwrap();
    assert_eq!(second.position, 2);
    assert!(!second.started);

    assert_eq!(session.status(), PlaybackStatus::Playing);
    assert_eq!(session.current_track().unwrap().title(), "a");
    assert_eq!(provider.opened_titles(), vec!["a"]);
}

#[tokio::test]
async fn seek_while_idle_reports_no_active_track() {
    let provider = FakeProvider::new();
    let session = session(&provider);

    assert_eq!(session.seek(10).await, Err(PlayerError::NoActiveTrack));
    assert!(provider.attempts().is_empty());
}

#[tokio::test]
async fn seek_past_the_end_is_rejected() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session.enqueue(track("a")).await.unwrap();

    assert!(matches!(
        session.seek(100).await,
        Err(PlayerError::InvalidArgument(_))
    ));
    assert_eq!(provider.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn speed_change_reopens_at_current_offset_and_ignores_stale_end() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session.enqueue(track("a")).await.unwrap();
    session.seek(40).await.unwrap();

    session.set_speed(1.5).await.unwrap();

    let attempts = provider.attempts();
    assert_eq!(attempts.len(), 3);
    let reopened = &attempts[2];
    assert_eq!(reopened.title, "a");
    assert_eq!(reopened.options.offset_secs, 40);
    assert_eq!(reopened.options.speed, 1.5);

    let sinks = provider.sinks();
    assert!(sinks[0].closed.load(Ordering::SeqCst));
    assert!(sinks[1].closed.load(Ordering::SeqCst));
    assert!(!sinks[2].closed.load(Ordering::SeqCst));

    // El sink reemplazado termina tarde: no debe avanzar la cola
    session
        .on_sink_signal(ended(attempts[1].observer.generation()))
        .await;

    assert_eq!(session.status(), PlaybackStatus::Playing);
    assert_eq!(session.current_track().unwrap().title(), "a");
    assert_eq!(provider.attempts().len(), 3);
}

#[tokio::test]
async fn stop_during_acquisition_leaves_session_idle() {
    let provider = FakeProvider::new();
    let gate = provider.hold_streams();
    let session = session(&provider);

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.enqueue(track("a")).await })
    };
    wait_until(|| provider.attempts().len() == 1).await;

    assert!(!session.stop().await);
    gate.notify_waiters();

    let enqueued = pending.await.unwrap().unwrap();
    assert!(!enqueued.started);
    assert_eq!(session.status(), PlaybackStatus::Idle);
    assert!(provider.sinks().is_empty());
    // La cola no se toca
    assert_eq!(session.queue_len(), 1);
}

#[tokio::test]
async fn failed_tracks_are_skipped() {
    let provider = FakeProvider::new();
    provider.fail_on("a");
    let session = session(&provider);
    let mut events = session.subscribe();

    let enqueued = session
        .enqueue_many(vec![track("a"), track("b"), track("c")])
        .await
        .unwrap();

    assert_eq!(enqueued.added, 3);
    assert!(enqueued.started);
    assert_eq!(session.current_track().unwrap().title(), "b");

    let seen = drain(&mut events);
    assert!(matches!(&seen[0], PlayerEvent::TrackFailed { track, .. } if track.title() == "a"));
    assert!(matches!(&seen[1], PlayerEvent::TrackStarted { track, offset_secs: 0 } if track.title() == "b"));
}

#[tokio::test]
async fn sink_errors_advance_to_the_next_track() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session
        .enqueue_many(vec![track("a"), track("b")])
        .await
        .unwrap();

    let generation = provider.attempts()[0].observer.generation();
    session
        .on_sink_signal(SinkSignal {
            generation,
            event: SinkEvent::Errored("decoder".into()),
        })
        .await;

    assert_eq!(session.current_track().unwrap().title(), "b");
    assert_eq!(session.status(), PlaybackStatus::Playing);
}

#[tokio::test]
async fn recovery_is_bounded_when_every_track_fails() {
    let provider = FakeProvider::new();
    provider.fail_on("a");
    provider.fail_on("b");
    let session = session(&provider);
    session.set_repeat(RepeatMode::Queue).await;
    let mut events = session.subscribe();

    let result = session.enqueue_many(vec![track("a"), track("b")]).await;

    assert!(matches!(result, Err(PlayerError::Acquisition(_))));
    assert_eq!(session.status(), PlaybackStatus::Idle);
    assert_eq!(provider.attempts().len(), 2);

    let failures = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, PlayerEvent::PlaybackFailed { .. }))
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn acquisition_times_out() {
    let provider = FakeProvider::new();
    let _gate = provider.hold_streams();
    let options = SessionOptions {
        acquire_timeout: Duration::from_millis(50),
        ..SessionOptions::default()
    };
    let session = Session::spawn(guild(), provider.clone(), options);

    let err = session.enqueue(track("a")).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.status(), PlaybackStatus::Idle);
}

#[tokio::test]
async fn natural_end_follows_repeat_mode() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session.set_repeat(RepeatMode::Track).await;
    session
        .enqueue_many(vec![track("a"), track("b")])
        .await
        .unwrap();

    let generation = provider.attempts()[0].observer.generation();
    session.on_sink_signal(ended(generation)).await;

    assert_eq!(provider.opened_titles(), vec!["a", "a"]);
    assert_eq!(session.current_track().unwrap().title(), "a");
}

#[tokio::test]
async fn queue_finishes_without_autoplay() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    let mut events = session.subscribe();
    session.enqueue(track("a")).await.unwrap();

    let generation = provider.attempts()[0].observer.generation();
    session.on_sink_signal(ended(generation)).await;

    assert_eq!(session.status(), PlaybackStatus::Idle);
    assert!(session.current_track().is_none());
    assert!(provider.seeds().is_empty());
    assert_eq!(drain(&mut events).last(), Some(&PlayerEvent::QueueFinished));
}

#[tokio::test]
async fn autoplay_expands_once_per_exhaustion() {
    let provider = FakeProvider::new();
    provider.set_related(vec![track("x"), track("a"), track("y"), track("x")]);
    let session = session(&provider);
    session.set_autoplay(true).await;
    let mut events = session.subscribe();
    session.enqueue(track("a")).await.unwrap();

    let generation = provider.attempts()[0].observer.generation();
    session.on_sink_signal(ended(generation)).await;

    let current = session.current_track().unwrap();
    assert_eq!(current.title(), "x");
    assert!(current.is_autoplay());
    assert_eq!(session.queue_len(), 3);
    assert_eq!(provider.seeds(), vec!["a"]);
    assert!(drain(&mut events).contains(&PlayerEvent::AutoplayQueued { count: 2 }));

    // x -> y, y -> cola agotada: la nueva expansión no aporta nada nuevo
    for attempt in 1..3 {
        let generation = provider.attempts()[attempt].observer.generation();
        session.on_sink_signal(ended(generation)).await;
    }

    assert_eq!(provider.seeds(), vec!["a", "y"]);
    assert_eq!(session.queue_len(), 3);
    assert_eq!(session.status(), PlaybackStatus::Idle);
    assert_eq!(drain(&mut events).last(), Some(&PlayerEvent::QueueFinished));
}

/// `a` terminó y la sesión espera los relacionados con autoplay activo
async fn waiting_on_autoplay(
    provider: &Arc<FakeProvider>,
) -> (Arc<Session>, Arc<Notify>, JoinHandle<()>) {
    provider.set_related(vec![track("r1"), track("r2")]);
    let gate = provider.hold_related();
    let session = session(provider);
    session.set_autoplay(true).await;
    session.enqueue(track("a")).await.unwrap();

    let generation = provider.attempts()[0].observer.generation();
    let handler = tokio::spawn({
        let session = session.clone();
        async move { session.on_sink_signal(ended(generation)).await }
    });
    wait_until(|| provider.seeds().len() == 1).await;

    (session, gate, handler)
}

#[tokio::test]
async fn stop_during_autoplay_lookup_starts_nothing() {
    let provider = FakeProvider::new();
    let (session, gate, handler) = waiting_on_autoplay(&provider).await;
    let mut events = session.subscribe();

    gate.notify_one();
    assert!(!session.stop().await);
    handler.await.unwrap();

    assert_eq!(provider.opened_titles(), vec!["a"]);
    assert_eq!(session.status(), PlaybackStatus::Idle);
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, PlayerEvent::TrackStarted { .. })));

    // Las canciones de autoplay quedan en cola y `play` arranca la primera
    assert_eq!(session.current_track().unwrap().title(), "r1");
    assert!(session.play().await.unwrap());
    assert_eq!(provider.opened_titles(), vec!["a", "r1"]);
}

#[tokio::test]
async fn skip_during_autoplay_lookup_plays_the_first_related_track() {
    let provider = FakeProvider::new();
    let (session, gate, handler) = waiting_on_autoplay(&provider).await;

    gate.notify_one();
    let playing = session.skip().await.unwrap();
    handler.await.unwrap();

    assert_eq!(
        playing.map(|track| track.title().to_string()),
        Some("r1".into())
    );
    assert_eq!(provider.opened_titles(), vec!["a", "r1"]);
    assert_eq!(session.current_track().unwrap().title(), "r1");
    assert_eq!(session.status(), PlaybackStatus::Playing);
}

#[tokio::test]
async fn stop_while_a_failing_track_loads_opens_nothing_else() {
    let provider = FakeProvider::new();
    let gate = provider.hold_streams();
    provider.fail_on("a");
    let session = session(&provider);

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.enqueue_many(vec![track("a"), track("b")]).await }
    });
    wait_until(|| provider.attempts().len() == 1).await;

    // `a` falla mientras stop interrumpe el comando; `b` no debe abrirse
    gate.notify_one();
    session.stop().await;
    let enqueued = pending.await.unwrap().unwrap();

    assert!(!enqueued.started);
    assert_eq!(provider.opened_titles(), vec!["a"]);
    assert_eq!(session.status(), PlaybackStatus::Idle);
}

#[tokio::test]
async fn pause_and_resume_reach_the_sink() {
    let provider = FakeProvider::new();
    let session = session(&provider);

    assert_eq!(session.pause().await, Err(PlayerError::NoActiveTrack));

    session.enqueue(track("a")).await.unwrap();
    assert_eq!(session.pause().await, Ok(true));
    assert_eq!(session.pause().await, Ok(false));
    assert_eq!(session.status(), PlaybackStatus::Paused);
    assert!(provider.last_sink().paused.load(Ordering::SeqCst));

    assert_eq!(session.resume().await, Ok(true));
    assert_eq!(session.status(), PlaybackStatus::Playing);
    assert!(!provider.last_sink().paused.load(Ordering::SeqCst));
}

#[tokio::test]
async fn reopening_a_paused_track_keeps_it_paused() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session.enqueue(track("a")).await.unwrap();
    session.pause().await.unwrap();

    session.set_equalizer(EqualizerPreset::Rock).await.unwrap();

    assert_eq!(provider.attempts().len(), 2);
    assert_eq!(
        provider.attempts()[1].options.filters.equalizer,
        EqualizerPreset::Rock
    );
    assert_eq!(session.status(), PlaybackStatus::Paused);
    assert!(provider.last_sink().paused.load(Ordering::SeqCst));
}

#[tokio::test]
async fn settings_while_idle_apply_to_the_next_stream() {
    let provider = FakeProvider::new();
    let session = session(&provider);

    session.set_bass_boost(true).await.unwrap();
    assert!(provider.attempts().is_empty());

    session.enqueue(track("a")).await.unwrap();
    assert!(provider.attempts()[0].options.filters.bass_boost);
}

#[tokio::test]
async fn volume_is_clamped_and_applied_live() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session.enqueue(track("a")).await.unwrap();

    assert_eq!(session.set_volume(150).await, 100);
    assert_eq!(*provider.last_sink().volume.lock(), Some(1.0));
    assert_eq!(session.set_volume(-5).await, 0);
    assert_eq!(session.snapshot().volume, 0);
}

#[tokio::test]
async fn skip_and_previous_move_through_the_queue() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session
        .enqueue_many(vec![track("a"), track("b")])
        .await
        .unwrap();

    let next = session.skip().await.unwrap();
    assert_eq!(next.map(|track| track.title().to_string()), Some("b".into()));
    assert!(provider.sinks()[0].closed.load(Ordering::SeqCst));

    let back = session.previous().await.unwrap();
    assert_eq!(back.map(|track| track.title().to_string()), Some("a".into()));
    assert_eq!(provider.opened_titles(), vec!["a", "b", "a"]);
}

#[tokio::test]
async fn clear_keeps_the_playing_track() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session
        .enqueue_many(vec![track("a"), track("b"), track("c")])
        .await
        .unwrap();

    assert_eq!(session.clear().await, 2);
    assert_eq!(session.queue_len(), 1);
    assert_eq!(session.current_track().unwrap().title(), "a");
}

#[tokio::test]
async fn shutdown_releases_the_sink() {
    let provider = FakeProvider::new();
    let session = session(&provider);
    session.enqueue(track("a")).await.unwrap();

    session.shutdown().await;

    assert_eq!(session.status(), PlaybackStatus::Idle);
    assert!(provider.last_sink().closed.load(Ordering::SeqCst));
}
