//! # Voice Transport
//!
//! Songbird-backed [`Sink`]: one [`TrackHandle`] per acquisition, with its
//! track events forwarded to the session through a [`SinkObserver`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::model::id::GuildId;
use songbird::{
    input::{ChildContainer, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, warn};

use crate::sources::{Sink, SinkEvent, SinkObserver};

/// Track de songbird reproduciéndose en un canal de voz
pub struct SongbirdSink {
    handle: TrackHandle,
    closed: AtomicBool,
}

impl SongbirdSink {
    /// Reproduce `input` en la llamada del servidor y conecta los eventos del track
    pub async fn start(
        manager: &Songbird,
        guild_id: GuildId,
        input: Input,
        observer: SinkObserver,
    ) -> Result<Self> {
        let call = manager
            .get(guild_id)
            .with_context(|| format!("No hay conexión de voz en guild {}", guild_id))?;

        let handle = {
            let mut call = call.lock().await;
            call.play_input(input)
        };

        let forwarder = TrackSignalForwarder::new(observer);
        for event in [
            TrackEvent::Play,
            TrackEvent::Pause,
            TrackEvent::End,
            TrackEvent::Error,
        ] {
            handle
                .add_event(Event::Track(event), forwarder.clone())
                .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;
        }

        Ok(Self {
            handle,
            closed: AtomicBool::new(false),
        })
    }

    /// Envuelve un proceso (ffmpeg) cuya salida estándar es el audio
    pub fn input_from_child(child: std::process::Child) -> Input {
        Input::from(ChildContainer::from(child))
    }
}

impl Sink for SongbirdSink {
    fn pause(&self) -> Result<()> {
        self.handle.pause().context("Error al pausar el track")
    }

    fn resume(&self) -> Result<()> {
        self.handle.play().context("Error al reanudar el track")
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.handle
            .set_volume(volume.clamp(0.0, 1.0))
            .context("Error al ajustar el volumen")
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.handle.stop() {
            debug!("El track ya estaba detenido: {:?}", e);
        }
    }
}

impl Drop for SongbirdSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Traduce los eventos de songbird a señales del sink
#[derive(Clone)]
struct TrackSignalForwarder {
    observer: SinkObserver,
    started: Arc<AtomicBool>,
}

impl TrackSignalForwarder {
    fn new(observer: SinkObserver) -> Self {
        Self {
            observer,
            started: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackSignalForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        for (state, _) in tracks.iter() {
            let event = match &state.playing {
                PlayMode::Play => {
                    if self.started.swap(true, Ordering::SeqCst) {
                        SinkEvent::Resumed
                    } else {
                        SinkEvent::Started
                    }
                }
                PlayMode::Pause => SinkEvent::Paused,
                PlayMode::Errored(e) => {
                    warn!("❌ Error en el track de songbird: {:?}", e);
                    SinkEvent::Errored(format!("{:?}", e))
                }
                _ => SinkEvent::Ended,
            };
            self.observer.notify(event);
        }

        None
    }
}
