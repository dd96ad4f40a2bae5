use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    audio::{
        effects::{self, AudioFilters, StreamOptions},
        equalizer::EqualizerPreset,
    },
    error::{PlayerError, PlayerResult},
    sources::Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

/// Cola de reproducción de una sesión.
///
/// `tracks` conserva el orden de inserción; `cursor` apunta a la canción
/// seleccionada. Tras agotarse con `RepeatMode::Off` el cursor queda en
/// `len`, de modo que lo que se agregue después pasa a ser la actual.
#[derive(Debug)]
pub struct MusicQueue {
    tracks: Vec<Track>,
    cursor: usize,
    repeat_mode: RepeatMode,
    volume: u8,
    playback_speed: f32,
    filters: AudioFilters,
    autoplay: bool,
    last_known_offset: u64,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            tracks: Vec::new(),
            cursor: 0,
            repeat_mode: RepeatMode::Off,
            volume: 50,
            playback_speed: 1.0,
            filters: AudioFilters::default(),
            autoplay: false,
            last_known_offset: 0,
            max_size,
        }
    }

    /// Agrega un track al final y devuelve su posición (base 1)
    pub fn append(&mut self, track: Track) -> PlayerResult<usize> {
        if self.tracks.len() >= self.max_size {
            return Err(PlayerError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.tracks.push(track);
        Ok(self.tracks.len())
    }

    /// Agrega múltiples tracks (playlist, autoplay) hasta llenar la cola
    pub fn append_many(&mut self, tracks: Vec<Track>) -> usize {
        let available_space = self.max_size.saturating_sub(self.tracks.len());
        let to_add = tracks.len().min(available_space);

        self.tracks.extend(tracks.into_iter().take(to_add));

        info!("➕ Agregadas {} canciones a la cola", to_add);
        to_add
    }

    /// Elimina un track; la canción actual no se puede eliminar
    pub fn remove_at(&mut self, index: usize) -> PlayerResult<Track> {
        self.check_index(index)?;
        if index == self.cursor {
            return Err(PlayerError::InvalidOperation(
                "no se puede eliminar la canción actual, usa skip",
            ));
        }

        let removed = self.tracks.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }

        debug!("❌ Track eliminado en posición {}", index);
        Ok(removed)
    }

    /// Mueve un track a una nueva posición manteniendo la canción actual seleccionada
    pub fn move_to(&mut self, from: usize, to: usize) -> PlayerResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Err(PlayerError::NoOp("origen y destino son la misma posición"));
        }
        if from == self.cursor {
            return Err(PlayerError::InvalidOperation(
                "no se puede mover la canción actual",
            ));
        }

        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        if from < self.cursor && self.cursor <= to {
            self.cursor -= 1;
        } else if to <= self.cursor && self.cursor < from {
            self.cursor += 1;
        }

        debug!("📍 Track movido de posición {} a {}", from, to);
        Ok(())
    }

    /// Avanza tras terminar una canción de forma natural
    pub fn advance(&mut self) -> Option<Track> {
        if self.repeat_mode == RepeatMode::Track {
            if let Some(current) = self.current_track() {
                info!("🔂 Repitiendo track: {}", current.title());
            }
            return self.current_track().cloned();
        }

        self.step_forward()
    }

    /// Como `advance`, pero ignora la repetición de un solo track
    pub fn skip_forward(&mut self) -> Option<Track> {
        self.step_forward()
    }

    /// Retrocede una canción, volviendo al final si está al principio
    pub fn step_back(&mut self) -> Option<Track> {
        if self.tracks.is_empty() {
            return None;
        }

        self.cursor = if self.cursor == 0 {
            self.tracks.len() - 1
        } else {
            (self.cursor - 1).min(self.tracks.len() - 1)
        };
        self.current_track().cloned()
    }

    /// Mezcla la cola dejando la canción actual al principio
    pub fn shuffle(&mut self) -> PlayerResult<()> {
        if self.tracks.len() < 2 {
            return Err(PlayerError::NoOp("se necesitan al menos 2 canciones para mezclar"));
        }

        let current = if self.cursor < self.tracks.len() {
            Some(self.tracks.remove(self.cursor))
        } else {
            None
        };

        let mut rng = rand::thread_rng();
        self.tracks.shuffle(&mut rng);

        if let Some(current) = current {
            self.tracks.insert(0, current);
        }
        self.cursor = 0;

        info!("🔀 Cola mezclada");
        Ok(())
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cursor = 0;
        info!("🗑️ Cola limpiada");
    }

    /// Deja solo la canción actual; devuelve cuántas se eliminaron
    pub fn retain_current(&mut self) -> usize {
        let original_len = self.tracks.len();
        match self.tracks.get(self.cursor).cloned() {
            Some(current) => self.tracks = vec![current],
            None => self.tracks.clear(),
        }
        self.cursor = 0;

        let removed = original_len - self.tracks.len();
        info!("🗑️ Eliminadas {} canciones de la cola", removed);
        removed
    }

    /// Obtiene el track actual
    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.cursor)
    }

    /// Obtiene una página de la cola para mostrarla
    pub fn page(&self, page: usize, page_size: usize) -> QueuePage {
        let page_size = page_size.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1).saturating_mul(page_size);
        let end = start.saturating_add(page_size).min(self.tracks.len());

        let entries = if start < self.tracks.len() {
            self.tracks[start..end]
                .iter()
                .enumerate()
                .map(|(offset, track)| QueueEntry {
                    position: start + offset,
                    is_current: start + offset == self.cursor,
                    track: track.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        QueuePage {
            entries,
            current_page: safe_page,
            total_pages: self.tracks.len().div_ceil(page_size),
            total_tracks: self.tracks.len(),
        }
    }

    /// Último track de la cola, semilla para autoplay
    pub fn last_track(&self) -> Option<&Track> {
        self.tracks.last()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.tracks.iter().any(|track| track.url() == url)
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.tracks.iter().map(Track::duration).sum())
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// La cola terminó y no hay canción seleccionada
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.tracks.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    // Ajustes de la sesión

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Cambia el modo de repetición
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Track => info!("🔂 Repetir canción activado"),
            RepeatMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn set_autoplay(&mut self, enabled: bool) {
        self.autoplay = enabled;
        info!(
            "🔄 Autoplay {}",
            if enabled { "activado" } else { "desactivado" }
        );
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Ajusta el volumen, limitado a [0, 100]
    pub fn set_volume(&mut self, volume: i32) -> u8 {
        self.volume = volume.clamp(0, 100) as u8;
        self.volume
    }

    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    pub fn set_playback_speed(&mut self, rate: f32) -> PlayerResult<()> {
        self.playback_speed = effects::validate_speed(rate)?;
        Ok(())
    }

    pub fn filters(&self) -> AudioFilters {
        self.filters
    }

    pub fn set_bass_boost(&mut self, enabled: bool) {
        self.filters.bass_boost = enabled;
    }

    pub fn set_equalizer(&mut self, preset: EqualizerPreset) {
        self.filters.equalizer = preset;
    }

    pub fn last_known_offset(&self) -> u64 {
        self.last_known_offset
    }

    pub fn set_last_known_offset(&mut self, offset: u64) {
        self.last_known_offset = offset;
    }

    /// Ajustes con los que se abre el próximo stream
    pub fn stream_options(&self, offset_secs: u64) -> StreamOptions {
        StreamOptions {
            offset_secs,
            speed: self.playback_speed,
            filters: self.filters,
        }
    }

    // Funciones privadas

    fn step_forward(&mut self) -> Option<Track> {
        if self.tracks.is_empty() {
            self.cursor = 0;
            return None;
        }

        self.cursor = (self.cursor + 1).min(self.tracks.len());
        if self.cursor == self.tracks.len() {
            if self.repeat_mode == RepeatMode::Queue {
                self.cursor = 0;
                info!("🔁 Volviendo al inicio de la cola");
            } else {
                info!("📭 Cola terminada, no hay siguiente track");
                return None;
            }
        }

        let next = self.current_track().cloned();
        if let Some(track) = &next {
            info!("➡️ Siguiente en cola: {}", track.title());
        }
        next
    }

    fn check_index(&self, index: usize) -> PlayerResult<()> {
        if index >= self.tracks.len() {
            return Err(PlayerError::OutOfRange {
                index,
                len: self.tracks.len(),
            });
        }
        Ok(())
    }
}

/// Track con su posición absoluta dentro de la cola
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub position: usize,
    pub is_current: bool,
    pub track: Track,
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub entries: Vec<QueueEntry>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_tracks: usize,
}
