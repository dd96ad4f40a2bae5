mod common;

use common::{guild, track, FakeProvider};
use open_music_engine::audio::{
    PlaybackStatus, RegistryStats, SessionOptions, SessionRegistry,
};
use pretty_assertions::assert_eq;
use serenity::model::id::GuildId;
use std::sync::{atomic::Ordering, Arc};

fn registry(provider: &Arc<FakeProvider>) -> SessionRegistry {
    SessionRegistry::new(provider.clone(), SessionOptions::default())
}

#[tokio::test]
async fn one_session_per_guild() {
    let provider = FakeProvider::new();
    let registry = registry(&provider);

    let first = registry.get_or_create(guild());
    let again = registry.get_or_create(guild());
    let other = registry.get_or_create(GuildId::new(2));

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.len(), 2);
    assert!(registry.get(GuildId::new(3)).is_none());
}

#[tokio::test]
async fn destroy_stops_playback_and_is_idempotent() {
    let provider = FakeProvider::new();
    let registry = registry(&provider);
    let session = registry.get_or_create(guild());
    session.enqueue(track("a")).await.unwrap();

    assert!(registry.destroy(guild()).await);
    assert!(!registry.destroy(guild()).await);

    assert!(registry.is_empty());
    assert_eq!(session.status(), PlaybackStatus::Idle);
    assert!(provider.last_sink().closed.load(Ordering::SeqCst));

    let fresh = registry.get_or_create(guild());
    assert!(!Arc::ptr_eq(&session, &fresh));
    assert_eq!(fresh.queue_len(), 0);
}

#[tokio::test]
async fn stats_and_active_guilds() {
    let provider = FakeProvider::new();
    let registry = registry(&provider);

    registry
        .get_or_create(guild())
        .enqueue_many(vec![track("a"), track("b")])
        .await
        .unwrap();
    registry.get_or_create(GuildId::new(2));

    assert_eq!(registry.list_active(), vec![guild()]);
    assert_eq!(
        registry.stats(),
        RegistryStats {
            sessions: 2,
            active: 1,
            playing: 1,
            queued_tracks: 2,
        }
    );
}

#[tokio::test]
async fn shutdown_all_empties_the_registry() {
    let provider = FakeProvider::new();
    let registry = registry(&provider);
    registry.get_or_create(guild()).enqueue(track("a")).await.unwrap();
    registry.get_or_create(GuildId::new(2));

    registry.shutdown_all().await;

    assert!(registry.is_empty());
    assert!(provider.sinks().iter().all(|sink| sink.closed.load(Ordering::SeqCst)));
}
