use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    collections::HashSet,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        effects::AudioFilters,
        equalizer::EqualizerPreset,
        player::{PlaybackController, PlaybackStatus, SignalOutcome},
        queue::{MusicQueue, QueuePage, RepeatMode},
    },
    config::Config,
    error::{PlayerError, PlayerResult},
    sources::{ResolutionProvider, SinkObserver, SinkSignal, Track},
};

const EVENT_CAPACITY: usize = 64;

/// Parámetros con los que se crea cada sesión
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub max_queue_size: usize,
    pub default_volume: u8,
    pub acquire_timeout: Duration,
    pub search_timeout: Duration,
    pub autoplay_batch: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            default_volume: 50,
            acquire_timeout: Duration::from_secs(20),
            search_timeout: Duration::from_secs(15),
            autoplay_batch: 5,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            default_volume: config.default_volume,
            acquire_timeout: config.acquire_timeout,
            search_timeout: config.search_timeout,
            autoplay_batch: config.autoplay_batch,
        }
    }
}

/// Transiciones publicadas para las capas de presentación
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackStarted { track: Track, offset_secs: u64 },
    TrackFailed { track: Track, reason: String },
    AutoplayQueued { count: usize },
    QueueFinished,
    PlaybackFailed { reason: String },
}

/// Resultado de encolar uno o varios tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Posición (base 1) del primer track agregado
    pub position: usize,
    pub added: usize,
    /// La sesión estaba inactiva y arrancó la reproducción
    pub started: bool,
}

/// Vista de solo lectura del estado de una sesión
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub status: PlaybackStatus,
    pub current: Option<Track>,
    pub position_secs: u64,
    pub queue_len: usize,
    pub cursor: usize,
    pub repeat_mode: RepeatMode,
    pub volume: u8,
    pub speed: f32,
    pub filters: AudioFilters,
    pub autoplay: bool,
    pub total_duration: Duration,
}

enum Movement {
    /// Fin natural: respeta la repetición de un track
    Natural,
    /// Skip del usuario o recuperación de errores
    Skip,
}

enum Acquisition {
    Started,
    Superseded,
}

struct SessionState {
    queue: MusicQueue,
    controller: PlaybackController,
    /// Interrupciones vistas al tomar el lock de comandos
    epoch: u64,
    /// La canción actual fue elegida pero nunca empezó porque un comando
    /// interrumpió el avance
    unplayed: bool,
}

/// Motor de reproducción de un servidor: cola + controlador.
///
/// Los comandos y las señales de los sinks se serializan con `commands`
/// (cola FIFO de tokio). `state` es un lock corto que nunca se mantiene a
/// través de un `.await`.
pub struct Session {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    commands: tokio::sync::Mutex<()>,
    provider: Arc<dyn ResolutionProvider>,
    options: SessionOptions,
    signals: mpsc::UnboundedSender<SinkSignal>,
    events: broadcast::Sender<PlayerEvent>,
    shutdown: CancellationToken,
}

impl Session {
    /// Crea la sesión y lanza su bucle de eventos de sink
    pub fn spawn(
        guild_id: GuildId,
        provider: Arc<dyn ResolutionProvider>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shutdown = CancellationToken::new();

        let mut queue = MusicQueue::new(options.max_queue_size);
        queue.set_volume(i32::from(options.default_volume));

        let session = Arc::new(Self {
            guild_id,
            state: Mutex::new(SessionState {
                queue,
                controller: PlaybackController::new(),
                epoch: 0,
                unplayed: false,
            }),
            commands: tokio::sync::Mutex::new(()),
            provider,
            options,
            signals,
            events,
            shutdown: shutdown.clone(),
        });

        tokio::spawn(run_signal_loop(
            Arc::downgrade(&session),
            signal_rx,
            shutdown,
            guild_id,
        ));

        info!("🎛️ Sesión creada para guild {}", guild_id);
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    // Lecturas

    pub fn status(&self) -> PlaybackStatus {
        self.state.lock().controller.status()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.state.lock().queue.current_track().cloned()
    }

    pub fn position(&self) -> u64 {
        self.state.lock().controller.position()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.state.lock().queue.tracks().to_vec()
    }

    pub fn page_queue(&self, page: usize, page_size: usize) -> QueuePage {
        self.state.lock().queue.page(page, page_size)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            guild_id: self.guild_id,
            status: state.controller.status(),
            current: state.queue.current_track().cloned(),
            position_secs: state.controller.position(),
            queue_len: state.queue.len(),
            cursor: state.queue.cursor(),
            repeat_mode: state.queue.repeat_mode(),
            volume: state.queue.volume(),
            speed: state.queue.playback_speed(),
            filters: state.queue.filters(),
            autoplay: state.queue.autoplay(),
            total_duration: state.queue.total_duration(),
        }
    }

    // Edición de la cola

    /// Agrega un track y arranca la reproducción si la sesión estaba inactiva
    pub async fn enqueue(&self, track: Track) -> PlayerResult<Enqueued> {
        let _guard = self.lock_commands().await;

        let position = self.state.lock().queue.append(track)?;
        let started = self.start_if_idle().await?;
        Ok(Enqueued {
            position,
            added: 1,
            started,
        })
    }

    /// Agrega varios tracks hasta llenar la cola
    pub async fn enqueue_many(&self, tracks: Vec<Track>) -> PlayerResult<Enqueued> {
        let _guard = self.lock_commands().await;

        let (position, added) = {
            let mut state = self.state.lock();
            let position = state.queue.len() + 1;
            if !tracks.is_empty() && state.queue.len() >= state.queue.max_size() {
                return Err(PlayerError::QueueFull(state.queue.max_size()));
            }
            (position, state.queue.append_many(tracks))
        };

        let started = if added > 0 {
            self.start_if_idle().await?
        } else {
            false
        };
        Ok(Enqueued {
            position,
            added,
            started,
        })
    }

    pub async fn remove_track(&self, index: usize) -> PlayerResult<Track> {
        let _guard = self.lock_commands().await;
        self.state.lock().queue.remove_at(index)
    }

    pub async fn move_track(&self, from: usize, to: usize) -> PlayerResult<()> {
        let _guard = self.lock_commands().await;
        self.state.lock().queue.move_to(from, to)
    }

    pub async fn shuffle(&self) -> PlayerResult<()> {
        let _guard = self.lock_commands().await;
        self.state.lock().queue.shuffle()
    }

    /// Limpia la cola; si hay algo sonando se conserva la canción actual
    pub async fn clear(&self) -> usize {
        let _guard = self.lock_commands().await;
        let mut state = self.state.lock();
        if state.controller.is_active() {
            state.queue.retain_current()
        } else {
            let removed = state.queue.len();
            state.queue.clear();
            removed
        }
    }

    pub async fn set_repeat(&self, mode: RepeatMode) {
        let _guard = self.lock_commands().await;
        self.state.lock().queue.set_repeat_mode(mode);
    }

    pub async fn set_autoplay(&self, enabled: bool) {
        let _guard = self.lock_commands().await;
        self.state.lock().queue.set_autoplay(enabled);
    }

    // Control de reproducción

    /// Reproduce la canción actual; `Ok(false)` si ya había algo activo
    pub async fn play(&self) -> PlayerResult<bool> {
        let _guard = self.lock_commands().await;

        let track = {
            let state = self.state.lock();
            if state.controller.is_active() {
                return Ok(false);
            }
            state
                .queue
                .current_track()
                .cloned()
                .ok_or(PlayerError::NoActiveTrack)?
        };

        Ok(self.play_with_recovery(track).await?.is_some())
    }

    pub async fn pause(&self) -> PlayerResult<bool> {
        let _guard = self.lock_commands().await;
        self.state.lock().controller.pause()
    }

    pub async fn resume(&self) -> PlayerResult<bool> {
        let _guard = self.lock_commands().await;
        self.state.lock().controller.resume()
    }

    /// Detiene la reproducción; la cola queda intacta
    pub async fn stop(&self) -> bool {
        self.preempt();
        let _guard = self.lock_commands().await;

        let stopped = self.state.lock().controller.release();
        if stopped {
            info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        }
        stopped
    }

    /// Salta al siguiente track; `None` si la cola terminó
    pub async fn skip(&self) -> PlayerResult<Option<Track>> {
        self.preempt();
        let _guard = self.lock_commands().await;

        let unplayed = {
            let mut state = self.state.lock();
            if !state.controller.is_active() && state.queue.current_track().is_none() {
                return Err(PlayerError::NoActiveTrack);
            }
            state.controller.release();
            if state.unplayed {
                state.queue.current_track().cloned()
            } else {
                None
            }
        };

        // Lo que sonaba ya terminó; el skip cae sobre la canción que nunca arrancó
        if let Some(track) = unplayed {
            info!("⏭️ Reproduciendo '{}', que no llegó a sonar", track.title());
            return self.play_with_recovery(track).await;
        }

        info!("⏭️ Saltando canción en guild {}", self.guild_id);
        self.advance_and_play(Movement::Skip).await
    }

    /// Vuelve al track anterior
    pub async fn previous(&self) -> PlayerResult<Option<Track>> {
        self.preempt();
        let _guard = self.lock_commands().await;

        let track = {
            let mut state = self.state.lock();
            if state.queue.is_empty() {
                return Err(PlayerError::NoActiveTrack);
            }
            state.controller.release();
            state.queue.step_back()
        };

        match track {
            Some(track) => {
                info!("⏮️ Volviendo a: {}", track.title());
                self.play_with_recovery(track).await
            }
            None => Ok(None),
        }
    }

    /// Reinicia la canción actual en `seconds`
    pub async fn seek(&self, seconds: u64) -> PlayerResult<()> {
        let _guard = self.lock_commands().await;

        {
            let state = self.state.lock();
            if !state.controller.is_active() {
                return Err(PlayerError::NoActiveTrack);
            }
            let track = state
                .queue
                .current_track()
                .ok_or(PlayerError::NoActiveTrack)?;
            if seconds >= track.duration() {
                return Err(PlayerError::InvalidArgument(format!(
                    "la posición debe estar entre 0 y {} segundos",
                    track.duration().saturating_sub(1)
                )));
            }
        }

        info!("⏩ Buscando posición {}s", seconds);
        self.reacquire_locked(seconds).await
    }

    /// Ajusta el volumen (0-100) y lo aplica en vivo
    pub async fn set_volume(&self, volume: i32) -> u8 {
        let _guard = self.lock_commands().await;

        let mut state = self.state.lock();
        let applied = state.queue.set_volume(volume);
        state.controller.set_volume(f32::from(applied) / 100.0);
        info!("🔊 Volumen ajustado a {}%", applied);
        applied
    }

    pub async fn set_speed(&self, rate: f32) -> PlayerResult<()> {
        let _guard = self.lock_commands().await;

        let offset = {
            let mut state = self.state.lock();
            state.queue.set_playback_speed(rate)?;
            info!("⏱️ Velocidad ajustada a {}x", rate);
            self.capture_offset(&mut state)
        };
        self.restart_if_active(offset).await
    }

    pub async fn set_bass_boost(&self, enabled: bool) -> PlayerResult<()> {
        let _guard = self.lock_commands().await;

        let offset = {
            let mut state = self.state.lock();
            state.queue.set_bass_boost(enabled);
            info!(
                "🔈 Bass boost {}",
                if enabled { "activado" } else { "desactivado" }
            );
            self.capture_offset(&mut state)
        };
        self.restart_if_active(offset).await
    }

    pub async fn set_equalizer(&self, preset: EqualizerPreset) -> PlayerResult<()> {
        let _guard = self.lock_commands().await;

        let offset = {
            let mut state = self.state.lock();
            state.queue.set_equalizer(preset);
            info!("🎚️ Ecualizador: {}", preset);
            self.capture_offset(&mut state)
        };
        self.restart_if_active(offset).await
    }

    /// Vuelve a abrir la canción actual en `offset` con los ajustes vigentes
    pub async fn reacquire_with_current_settings(&self, offset: u64) -> PlayerResult<()> {
        let _guard = self.lock_commands().await;
        self.reacquire_locked(offset).await
    }

    /// Entrada del bucle de eventos: aplica una señal del sink
    pub async fn on_sink_signal(&self, signal: SinkSignal) {
        let _guard = self.lock_commands().await;

        let outcome = self.state.lock().controller.apply_signal(&signal);
        let result = match outcome {
            SignalOutcome::Ignored => {
                debug!(
                    "Señal {:?} ignorada (generación {})",
                    signal.event, signal.generation
                );
                return;
            }
            SignalOutcome::Synced => return,
            SignalOutcome::Ended => {
                debug!("Track terminado, reproduciendo siguiente...");
                self.advance_and_play(Movement::Natural).await
            }
            SignalOutcome::Failed(reason) => {
                warn!("❌ Error en el stream: {}", reason);
                if let Some(track) = self.current_track() {
                    self.publish(PlayerEvent::TrackFailed { track, reason });
                }
                self.advance_and_play(Movement::Skip).await
            }
        };

        if let Err(e) = result {
            error!("Error al reproducir siguiente track: {}", e);
        }
    }

    /// Cancela todo y libera el sink; usado al destruir la sesión
    pub async fn shutdown(&self) {
        self.preempt();
        self.shutdown.cancel();
        let _guard = self.lock_commands().await;

        self.state.lock().controller.release();
        info!("👋 Sesión cerrada para guild {}", self.guild_id);
    }

    // Funciones privadas

    fn publish(&self, event: PlayerEvent) {
        if let Err(e) = self.events.send(event) {
            debug!("Nadie escucha los eventos de guild {}: {:?}", self.guild_id, e.0);
        }
    }

    fn preempt(&self) {
        self.state.lock().controller.preempt();
    }

    /// Toma el lock de comandos y fija la época de interrupciones del comando
    async fn lock_commands(&self) -> tokio::sync::MutexGuard<'_, ()> {
        let guard = self.commands.lock().await;
        let mut state = self.state.lock();
        state.epoch = state.controller.preemptions();
        guard
    }

    fn capture_offset(&self, state: &mut SessionState) -> Option<u64> {
        if !state.controller.is_active() {
            return None;
        }
        let offset = state.controller.position();
        state.queue.set_last_known_offset(offset);
        Some(offset)
    }

    async fn restart_if_active(&self, offset: Option<u64>) -> PlayerResult<()> {
        match offset {
            Some(offset) => self.reacquire_locked(offset).await,
            None => Ok(()),
        }
    }

    async fn start_if_idle(&self) -> PlayerResult<bool> {
        let track = {
            let state = self.state.lock();
            if state.controller.is_active() {
                return Ok(false);
            }
            match state.queue.current_track() {
                Some(track) => track.clone(),
                None => return Ok(false),
            }
        };

        Ok(self.play_with_recovery(track).await?.is_some())
    }

    async fn reacquire_locked(&self, offset: u64) -> PlayerResult<()> {
        let (track, was_paused) = {
            let state = self.state.lock();
            let track = state
                .queue
                .current_track()
                .cloned()
                .ok_or(PlayerError::NoActiveTrack)?;
            (track, state.controller.status() == PlaybackStatus::Paused)
        };

        match self.start_track(&track, offset).await {
            Ok(Acquisition::Started) => {
                if was_paused {
                    self.state.lock().controller.pause()?;
                }
                Ok(())
            }
            Ok(Acquisition::Superseded) => Ok(()),
            Err(err) => {
                warn!("⚠️ No se pudo reabrir '{}': {}", track.title(), err);
                self.publish(PlayerEvent::TrackFailed {
                    track,
                    reason: err.to_string(),
                });
                if let Err(next_err) = self.advance_and_play(Movement::Skip).await {
                    debug!("Recuperación tras reapertura fallida: {}", next_err);
                }
                Err(err)
            }
        }
    }

    async fn advance_and_play(&self, movement: Movement) -> PlayerResult<Option<Track>> {
        let next = {
            let mut state = self.state.lock();
            match movement {
                Movement::Natural => state.queue.advance(),
                Movement::Skip => state.queue.skip_forward(),
            }
        };

        let next = match next {
            Some(track) => Some(track),
            None => self.expand_with_autoplay().await,
        };

        match next {
            Some(track) => self.play_with_recovery(track).await,
            None => {
                info!("📭 Cola terminada en guild {}", self.guild_id);
                self.publish(PlayerEvent::QueueFinished);
                Ok(None)
            }
        }
    }

    /// Intenta reproducir `first`; los fallos avanzan al siguiente, a lo sumo
    /// una vuelta completa a la cola
    async fn play_with_recovery(&self, first: Track) -> PlayerResult<Option<Track>> {
        let attempts = self.state.lock().queue.len().max(1);
        let mut track = first;
        let mut last_error = None;

        for _ in 0..attempts {
            match self.start_track(&track, 0).await {
                Ok(Acquisition::Started) => return Ok(Some(track)),
                Ok(Acquisition::Superseded) => return Ok(None),
                Err(err) => {
                    warn!("⚠️ Saltando '{}': {}", track.title(), err);
                    self.publish(PlayerEvent::TrackFailed {
                        track: track.clone(),
                        reason: err.to_string(),
                    });
                    last_error = Some(err);

                    match self.state.lock().queue.skip_forward() {
                        Some(next) => track = next,
                        None => break,
                    }
                }
            }
        }

        self.state.lock().controller.release();
        let err = last_error.unwrap_or(PlayerError::NoActiveTrack);
        error!("❌ No se pudo reproducir ningún track en guild {}", self.guild_id);
        self.publish(PlayerEvent::PlaybackFailed {
            reason: err.to_string(),
        });
        Err(err)
    }

    /// Adquiere un sink para `track` en `offset`
    async fn start_track(&self, track: &Track, offset: u64) -> PlayerResult<Acquisition> {
        let (generation, token, options) = {
            let mut state = self.state.lock();
            if state.controller.preemptions() != state.epoch {
                debug!("'{}' no arranca: el comando fue interrumpido", track.title());
                state.unplayed = true;
                return Ok(Acquisition::Superseded);
            }
            state.unplayed = false;
            let (generation, token) = state.controller.begin_acquisition();
            (generation, token, state.queue.stream_options(offset))
        };

        let observer = SinkObserver::new(generation, self.signals.clone());
        let limit = self.options.acquire_timeout;

        let opened = tokio::select! {
            _ = token.cancelled() => {
                debug!("Adquisición de '{}' cancelada", track.title());
                return Ok(Acquisition::Superseded);
            }
            result = timeout(limit, self.provider.open_stream(self.guild_id, track, &options, observer)) => result,
        };

        let sink = match opened {
            Ok(Ok(sink)) => sink,
            Ok(Err(e)) => return Err(PlayerError::acquisition(format!("{:#}", e))),
            Err(_) => {
                return Err(PlayerError::Acquisition(format!(
                    "tiempo de espera agotado tras {}",
                    humantime::format_duration(limit)
                )))
            }
        };

        {
            let mut state = self.state.lock();
            let volume = f32::from(state.queue.volume()) / 100.0;
            let speed = state.queue.playback_speed();
            if let Err(stale) = state
                .controller
                .activate(generation, sink, offset, speed, volume)
            {
                stale.close();
                return Ok(Acquisition::Superseded);
            }
            state.queue.set_last_known_offset(offset);
        }

        info!("🎵 Reproduciendo: {} (desde {}s)", track.title(), offset);
        self.publish(PlayerEvent::TrackStarted {
            track: track.clone(),
            offset_secs: offset,
        });
        Ok(Acquisition::Started)
    }

    /// Autoplay: una sola expansión por agotamiento, sembrada con el último track
    async fn expand_with_autoplay(&self) -> Option<Track> {
        let seed = {
            let state = self.state.lock();
            if !state.queue.autoplay() {
                return None;
            }
            state.queue.last_track().cloned()?
        };

        info!("🔄 Autoplay: buscando canciones relacionadas con '{}'", seed.title());
        let related = match timeout(
            self.options.search_timeout,
            self.provider
                .related_tracks(&seed, self.options.autoplay_batch),
        )
        .await
        {
            Ok(Ok(tracks)) => tracks,
            Ok(Err(e)) => {
                warn!("⚠️ Autoplay falló: {:?}", e);
                return None;
            }
            Err(_) => {
                warn!("⚠️ Autoplay: tiempo de espera agotado");
                return None;
            }
        };

        let mut state = self.state.lock();
        let mut seen = HashSet::new();
        let fresh: Vec<Track> = related
            .into_iter()
            .filter(|track| !state.queue.contains_url(track.url()))
            .filter(|track| seen.insert(track.url().to_string()))
            .map(Track::into_autoplay)
            .collect();

        let added = state.queue.append_many(fresh);
        if added == 0 {
            return None;
        }

        self.publish(PlayerEvent::AutoplayQueued { count: added });
        state.queue.current_track().cloned()
    }
}

async fn run_signal_loop(
    session: Weak<Session>,
    mut signals: mpsc::UnboundedReceiver<SinkSignal>,
    shutdown: CancellationToken,
    guild_id: GuildId,
) {
    loop {
        let signal = tokio::select! {
            _ = shutdown.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        let Some(session) = session.upgrade() else {
            break;
        };
        session.on_sink_signal(signal).await;
    }

    debug!("Bucle de eventos terminado para guild {}", guild_id);
}
