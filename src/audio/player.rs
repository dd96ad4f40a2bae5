use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{PlayerError, PlayerResult},
    sources::{Sink, SinkEvent, SinkSignal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackStatus::Idle)
    }
}

/// Reloj de reproducción: offset base más el tiempo sin pausa escalado por la velocidad
#[derive(Debug, Default)]
struct PlaybackClock {
    base_offset: u64,
    speed: f32,
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl PlaybackClock {
    fn start(&mut self, offset: u64, speed: f32) {
        self.base_offset = offset;
        self.speed = speed;
        self.accumulated = Duration::ZERO;
        self.running_since = Some(Instant::now());
    }

    fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn position(&self) -> u64 {
        let running = self
            .running_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        let played = (self.accumulated + running).as_secs_f64() * f64::from(self.speed);
        self.base_offset + played as u64
    }
}

/// Resultado de aplicar una señal del sink al controlador
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// Generación vieja o ningún sink activo
    Ignored,
    /// Solo sincronizó el estado (pausa/reanudación externa)
    Synced,
    /// El track terminó de forma natural; el sink ya fue liberado
    Ended,
    /// El stream falló; el sink ya fue liberado
    Failed(String),
}

/// Controlador de reproducción de una sesión.
///
/// Posee el único sink activo. Cada adquisición o invalidación incrementa la
/// generación; un sink solo se activa si su generación sigue siendo la vigente.
#[derive(Default)]
pub struct PlaybackController {
    status: PlaybackStatus,
    sink: Option<Box<dyn Sink>>,
    generation: u64,
    /// Veces que un comando interrumpió a la sesión (stop, skip, previous, cierre)
    preemptions: u64,
    clock: PlaybackClock,
    pending: Option<CancellationToken>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn preemptions(&self) -> u64 {
        self.preemptions
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Posición estimada en segundos; 0 si no hay nada activo
    pub fn position(&self) -> u64 {
        if self.is_active() {
            self.clock.position()
        } else {
            0
        }
    }

    /// Libera el sink anterior y abre una nueva generación para adquirir
    pub fn begin_acquisition(&mut self) -> (u64, CancellationToken) {
        self.release();
        self.generation += 1;

        let token = CancellationToken::new();
        if let Some(previous) = self.pending.replace(token.clone()) {
            previous.cancel();
        }

        debug!("🎫 Nueva adquisición, generación {}", self.generation);
        (self.generation, token)
    }

    /// Invalida la generación actual y cancela la adquisición en curso
    pub fn preempt(&mut self) {
        self.generation += 1;
        self.preemptions += 1;
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    /// Activa un sink recién abierto. Si la generación ya no es la vigente
    /// devuelve el sink para que el llamador lo cierre.
    pub fn activate(
        &mut self,
        generation: u64,
        sink: Box<dyn Sink>,
        offset: u64,
        speed: f32,
        volume: f32,
    ) -> Result<(), Box<dyn Sink>> {
        if generation != self.generation {
            debug!(
                "Descartando sink de la generación {} (vigente: {})",
                generation, self.generation
            );
            return Err(sink);
        }

        if let Err(e) = sink.set_volume(volume) {
            warn!("⚠️ No se pudo aplicar el volumen al nuevo stream: {:?}", e);
        }

        self.sink = Some(sink);
        self.status = PlaybackStatus::Playing;
        self.clock.start(offset, speed);
        self.pending = None;
        Ok(())
    }

    /// Cierra el sink activo y vuelve a Idle. Devuelve si había algo activo.
    pub fn release(&mut self) -> bool {
        let had_sink = match self.sink.take() {
            Some(sink) => {
                sink.close();
                true
            }
            None => false,
        };
        self.status = PlaybackStatus::Idle;
        self.clock.reset();
        had_sink
    }

    /// Pausa; `Ok(false)` si ya estaba pausado
    pub fn pause(&mut self) -> PlayerResult<bool> {
        match self.status {
            PlaybackStatus::Idle => Err(PlayerError::NoActiveTrack),
            PlaybackStatus::Paused => Ok(false),
            PlaybackStatus::Playing => {
                let sink = self.sink.as_ref().ok_or(PlayerError::NoActiveTrack)?;
                sink.pause().map_err(PlayerError::acquisition)?;
                self.status = PlaybackStatus::Paused;
                self.clock.pause();
                info!("⏸️ Reproducción pausada");
                Ok(true)
            }
        }
    }

    /// Reanuda; `Ok(false)` si ya estaba sonando
    pub fn resume(&mut self) -> PlayerResult<bool> {
        match self.status {
            PlaybackStatus::Idle => Err(PlayerError::NoActiveTrack),
            PlaybackStatus::Playing => Ok(false),
            PlaybackStatus::Paused => {
                let sink = self.sink.as_ref().ok_or(PlayerError::NoActiveTrack)?;
                sink.resume().map_err(PlayerError::acquisition)?;
                self.status = PlaybackStatus::Playing;
                self.clock.resume();
                info!("▶️ Reproducción reanudada");
                Ok(true)
            }
        }
    }

    /// Aplica el volumen en vivo si hay un sink
    pub fn set_volume(&self, volume: f32) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.set_volume(volume) {
                warn!("⚠️ No se pudo ajustar el volumen: {:?}", e);
            }
        }
    }

    /// Aplica una señal del sink activo
    pub fn apply_signal(&mut self, signal: &SinkSignal) -> SignalOutcome {
        if signal.generation != self.generation || self.sink.is_none() {
            return SignalOutcome::Ignored;
        }

        match &signal.event {
            SinkEvent::Started => SignalOutcome::Synced,
            SinkEvent::Paused => {
                if self.status == PlaybackStatus::Playing {
                    self.status = PlaybackStatus::Paused;
                    self.clock.pause();
                }
                SignalOutcome::Synced
            }
            SinkEvent::Resumed => {
                if self.status == PlaybackStatus::Paused {
                    self.status = PlaybackStatus::Playing;
                    self.clock.resume();
                }
                SignalOutcome::Synced
            }
            SinkEvent::Ended => {
                self.release();
                SignalOutcome::Ended
            }
            SinkEvent::Errored(reason) => {
                self.release();
                SignalOutcome::Failed(reason.clone())
            }
        }
    }
}
