//! # Sources Module
//!
//! Track model and the contracts the playback engine consumes from the
//! outside world:
//!
//! - [`ResolutionProvider`] - resolves queries to [`Track`]s and opens streams
//! - [`Sink`] - an open audio output bound to one track at one offset
//! - [`SinkObserver`] - generation-tagged channel a sink reports through
//!
//! The production provider lives in [`youtube`] (yt-dlp + ffmpeg, played
//! through songbird); [`spotify`] cross-references Spotify links.

pub mod spotify;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{GuildId, UserId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::audio::effects::StreamOptions;

pub use spotify::SpotifyClient;
pub use youtube::YtDlpProvider;

/// Referencia cruzada a la canción original de Spotify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotifyReference {
    pub name: String,
    pub artist: String,
    pub url: Option<String>,
}

/// Representa un track de música. Inmutable una vez encolado.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    url: String,
    duration: u64,
    thumbnail: Option<String>,
    author: Option<String>,
    requested_by: UserId,
    is_autoplay: bool,
    loaded_from_playlist: Option<String>,
    spotify: Option<SpotifyReference>,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration: 0,
            thumbnail: None,
            author: None,
            requested_by,
            is_autoplay: false,
            loaded_from_playlist: None,
            spotify: None,
            added_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    /// Duración en segundos; 0 significa desconocida
    pub fn duration(&self) -> u64 {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn is_autoplay(&self) -> bool {
        self.is_autoplay
    }
    pub fn loaded_from_playlist(&self) -> Option<&str> {
        self.loaded_from_playlist.as_deref()
    }
    pub fn spotify(&self) -> Option<&SpotifyReference> {
        self.spotify.as_ref()
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    // Builders
    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_spotify(mut self, reference: SpotifyReference) -> Self {
        self.spotify = Some(reference);
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = user_id;
        self
    }

    /// Marca el track como agregado por autoplay
    pub fn into_autoplay(mut self) -> Self {
        self.is_autoplay = true;
        self
    }

    /// Marca el track como cargado desde una playlist guardada
    pub fn from_playlist(mut self, playlist: impl Into<String>) -> Self {
        self.loaded_from_playlist = Some(playlist.into());
        self
    }
}

/// Estado reportado por un sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Started,
    Paused,
    Resumed,
    Ended,
    Errored(String),
}

/// Evento de sink etiquetado con la generación que lo produjo
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSignal {
    pub generation: u64,
    pub event: SinkEvent,
}

/// Canal por el que un sink informa su ciclo de vida a la sesión.
///
/// Cada adquisición recibe un observer con su propia generación; la sesión
/// descarta las señales cuya generación ya no es la vigente.
#[derive(Debug, Clone)]
pub struct SinkObserver {
    generation: u64,
    tx: mpsc::UnboundedSender<SinkSignal>,
}

impl SinkObserver {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<SinkSignal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self, event: SinkEvent) {
        let signal = SinkSignal {
            generation: self.generation,
            event,
        };
        if self.tx.send(signal).is_err() {
            debug!("Sesión cerrada, descartando evento de la generación {}", self.generation);
        }
    }
}

/// Salida de audio abierta. Se reemplaza, nunca se muta, cuando cambian los filtros.
pub trait Sink: Send + Sync {
    fn pause(&self) -> Result<()>;

    fn resume(&self) -> Result<()>;

    /// Volumen lineal en `0.0..=1.0`
    fn set_volume(&self, volume: f32) -> Result<()>;

    /// Libera el recurso; llamar dos veces no tiene efecto
    fn close(&self);
}

/// Contrato con el resolvedor de metadata y streams
#[async_trait]
pub trait ResolutionProvider: Send + Sync {
    /// Resuelve una URL o búsqueda a un único track; `None` si no hay resultados
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Option<Track>>;

    /// Busca tracks, en orden de relevancia
    async fn search(&self, query: &str, limit: usize, requested_by: UserId) -> Result<Vec<Track>>;

    /// Tracks relacionados con `seed`, usados por autoplay
    async fn related_tracks(&self, seed: &Track, limit: usize) -> Result<Vec<Track>>;

    /// Abre un stream con los ajustes dados y empieza a reproducirlo
    async fn open_stream(
        &self,
        guild_id: GuildId,
        track: &Track,
        options: &StreamOptions,
        observer: SinkObserver,
    ) -> Result<Box<dyn Sink>>;
}

/// Verifica si la consulta es una URL http(s) en lugar de una búsqueda
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query.trim())
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new(42)
    }

    #[test]
    fn builders_set_provenance() {
        let track = Track::new("Song", "https://youtu.be/abc", user())
            .with_duration(215)
            .with_author("Band")
            .into_autoplay()
            .from_playlist("favs");

        assert_eq!(track.duration(), 215);
        assert_eq!(track.author(), Some("Band"));
        assert!(track.is_autoplay());
        assert_eq!(track.loaded_from_playlist(), Some("favs"));
        assert_eq!(track.requested_by(), user());
    }

    #[test]
    fn detects_urls() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url(" http://example.com/a.mp3 "));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/file"));
    }

    #[tokio::test]
    async fn observer_tags_signals_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = SinkObserver::new(7, tx);

        observer.notify(SinkEvent::Ended);

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.generation, 7);
        assert_eq!(signal.event, SinkEvent::Ended);
    }
}
