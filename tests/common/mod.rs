#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use open_music_engine::{
    audio::effects::StreamOptions,
    sources::{ResolutionProvider, Sink, SinkObserver, Track},
};
use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;

pub fn user() -> UserId {
    UserId::new(42)
}

pub fn guild() -> GuildId {
    GuildId::new(1)
}

pub fn track(name: &str) -> Track {
    Track::new(name, format!("https://youtu.be/{}", name), user()).with_duration(100)
}

/// Estado observable de un sink falso
#[derive(Debug, Default)]
pub struct SinkState {
    pub closed: AtomicBool,
    pub paused: AtomicBool,
    pub volume: Mutex<Option<f32>>,
}

pub struct FakeSink {
    state: Arc<SinkState>,
}

impl Sink for FakeSink {
    fn pause(&self) -> Result<()> {
        self.state.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.state.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        *self.state.volume.lock() = Some(volume);
        Ok(())
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Un intento de `open_stream`
#[derive(Debug, Clone)]
pub struct OpenAttempt {
    pub title: String,
    pub options: StreamOptions,
    pub observer: SinkObserver,
}

/// Proveedor en memoria: registra cada apertura y puede fallar o bloquearse
#[derive(Default)]
pub struct FakeProvider {
    attempts: Mutex<Vec<OpenAttempt>>,
    sinks: Mutex<Vec<Arc<SinkState>>>,
    failing: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
    related_gate: Mutex<Option<Arc<Notify>>>,
    related: Mutex<Vec<Track>>,
    seeds: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `open_stream` falla para los tracks con este título
    pub fn fail_on(&self, title: &str) {
        self.failing.lock().insert(title.to_string());
    }

    /// Bloquea las aperturas hasta que se notifique el `Notify` devuelto
    pub fn hold_streams(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Bloquea `related_tracks` (después de registrar la semilla)
    pub fn hold_related(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.related_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn set_related(&self, tracks: Vec<Track>) {
        *self.related.lock() = tracks;
    }

    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.attempts.lock().clone()
    }

    pub fn opened_titles(&self) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .map(|attempt| attempt.title.clone())
            .collect()
    }

    pub fn sinks(&self) -> Vec<Arc<SinkState>> {
        self.sinks.lock().clone()
    }

    pub fn last_sink(&self) -> Arc<SinkState> {
        self.sinks.lock().last().cloned().expect("ningún sink abierto")
    }

    pub fn seeds(&self) -> Vec<String> {
        self.seeds.lock().clone()
    }
}

#[async_trait]
impl ResolutionProvider for FakeProvider {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Option<Track>> {
        Ok(Some(track(query).with_requested_by(requested_by)))
    }

    async fn search(&self, query: &str, limit: usize, requested_by: UserId) -> Result<Vec<Track>> {
        Ok((0..limit)
            .map(|i| track(&format!("{query}-{i}")).with_requested_by(requested_by))
            .collect())
    }

    async fn related_tracks(&self, seed: &Track, limit: usize) -> Result<Vec<Track>> {
        self.seeds.lock().push(seed.title().to_string());

        let gate = self.related_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        Ok(self.related.lock().iter().take(limit).cloned().collect())
    }

    async fn open_stream(
        &self,
        _guild_id: GuildId,
        track: &Track,
        options: &StreamOptions,
        observer: SinkObserver,
    ) -> Result<Box<dyn Sink>> {
        self.attempts.lock().push(OpenAttempt {
            title: track.title().to_string(),
            options: options.clone(),
            observer,
        });

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().contains(track.title()) {
            return Err(anyhow!("HTTP 403 para {}", track.title()));
        }

        let state = Arc::new(SinkState::default());
        self.sinks.lock().push(state.clone());
        Ok(Box::new(FakeSink { state }))
    }
}

/// Espera (con tiempo real) a que se cumpla `condition`
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("la condición no se cumplió a tiempo");
}
