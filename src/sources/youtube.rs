use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::{GuildId, UserId};
use songbird::Songbird;
use std::{process::Stdio, sync::Arc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{is_url, ResolutionProvider, Sink, SinkObserver, Track};
use crate::audio::{effects::StreamOptions, transport::SongbirdSink};

/// Resultados extra que se piden al buscar relacionados, para compensar los descartados
const RELATED_EXTRA_RESULTS: usize = 5;

/// Requests concurrentes a yt-dlp
const MAX_CONCURRENT_REQUESTS: usize = 3;

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    id: Option<String>,
}

impl YtDlpInfo {
    fn into_track(self, requested_by: UserId) -> Option<Track> {
        let url = self
            .webpage_url
            .or_else(|| self.url.filter(|url| is_url(url)))
            .or_else(|| {
                self.id
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })?;

        let mut track = Track::new(self.title, url, requested_by)
            .with_duration(self.duration.map(|d| d.max(0.0) as u64).unwrap_or(0));
        if let Some(author) = self.uploader.or(self.channel) {
            track = track.with_author(author);
        }
        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        Some(track)
    }
}

/// Resolución con yt-dlp y streams con ffmpeg reproducidos por songbird
pub struct YtDlpProvider {
    songbird: Arc<Songbird>,
    rate_limiter: Semaphore,
}

impl YtDlpProvider {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(MAX_CONCURRENT_REQUESTS),
        }
    }

    /// Ejecuta yt-dlp y devuelve su salida estándar
    async fn run_ytdlp(&self, args: &[&str]) -> Result<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .context("Rate limiter cerrado")?;

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Obtiene información de una URL específica
    async fn get_info(&self, url: &str, requested_by: UserId) -> Result<Option<Track>> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run_ytdlp(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;
        let info: YtDlpInfo =
            serde_json::from_str(&stdout).context("Error al parsear respuesta de yt-dlp")?;

        Ok(info.into_track(requested_by))
    }

    /// Obtiene la URL de streaming de audio
    async fn get_stream_url(&self, url: &str) -> Result<String> {
        debug!("🎵 Obteniendo URL de stream para: {}", url);

        let stdout = self
            .run_ytdlp(&[
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--get-url",
                "--no-warnings",
                url,
            ])
            .await?;

        let stream_url = stdout.lines().next().unwrap_or_default().trim().to_string();
        if stream_url.is_empty() {
            anyhow::bail!("No se pudo obtener URL de stream");
        }

        Ok(stream_url)
    }

    /// Verifica que yt-dlp y ffmpeg estén instalados
    pub async fn verify_dependencies() -> Result<()> {
        for (binary, flag) in [("yt-dlp", "--version"), ("ffmpeg", "-version")] {
            let output = Command::new(binary)
                .arg(flag)
                .output()
                .await
                .with_context(|| format!("{} no está instalado", binary))?;
            if !output.status.success() {
                anyhow::bail!("{} no responde correctamente", binary);
            }
        }
        Ok(())
    }
}

/// Argumentos de ffmpeg para decodificar `stream_url` con los ajustes dados
pub fn ffmpeg_args(stream_url: &str, options: &StreamOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
        "-hide_banner",
        "-loglevel",
        "error",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();

    if options.offset_secs > 0 {
        args.push("-ss".to_string());
        args.push(options.offset_secs.to_string());
    }

    args.push("-i".to_string());
    args.push(stream_url.to_string());

    if let Some(chain) = options.ffmpeg_filter_chain() {
        args.push("-af".to_string());
        args.push(chain);
    }

    args.extend(
        ["-f", "wav", "-ar", "48000", "-ac", "2", "pipe:1"]
            .iter()
            .map(|arg| arg.to_string()),
    );
    args
}

#[async_trait]
impl ResolutionProvider for YtDlpProvider {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Option<Track>> {
        if is_url(query) {
            return self.get_info(query.trim(), requested_by).await;
        }

        Ok(self.search(query, 1, requested_by).await?.into_iter().next())
    }

    async fn search(&self, query: &str, limit: usize, requested_by: UserId) -> Result<Vec<Track>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit.max(1), query.trim());
        let stdout = self
            .run_ytdlp(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        let results = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
            .filter_map(|info| info.into_track(requested_by))
            .take(limit)
            .collect();

        Ok(results)
    }

    async fn related_tracks(&self, seed: &Track, limit: usize) -> Result<Vec<Track>> {
        let query = match seed.author() {
            Some(author) => format!("{} {}", seed.title(), author),
            None => seed.title().to_string(),
        };

        let results = self
            .search(&query, limit + RELATED_EXTRA_RESULTS, seed.requested_by())
            .await?;

        Ok(results
            .into_iter()
            .filter(|track| track.url() != seed.url())
            .take(limit)
            .collect())
    }

    async fn open_stream(
        &self,
        guild_id: GuildId,
        track: &Track,
        options: &StreamOptions,
        observer: SinkObserver,
    ) -> Result<Box<dyn Sink>> {
        let stream_url = self.get_stream_url(track.url()).await?;
        let args = ffmpeg_args(&stream_url, options);
        debug!("🎛️ ffmpeg {:?}", options.ffmpeg_filter_chain());

        let child = std::process::Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Error al ejecutar ffmpeg")?;

        let input = SongbirdSink::input_from_child(child);
        match SongbirdSink::start(&self.songbird, guild_id, input, observer).await {
            Ok(sink) => Ok(Box::new(sink)),
            Err(e) => {
                warn!("⚠️ No se pudo iniciar el stream en guild {}: {:?}", guild_id, e);
                Err(e)
            }
        }
    }
}
