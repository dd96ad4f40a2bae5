use serde::{Deserialize, Serialize};

use crate::{audio::equalizer::EqualizerPreset, error::PlayerError};

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 2.0;

/// Rango que acepta cada filtro `atempo` de ffmpeg
const ATEMPO_MIN: f32 = 0.5;
const ATEMPO_MAX: f32 = 2.0;

const BASS_BOOST_FILTER: &str = "bass=g=10:f=110:w=0.6";

/// Filtros de audio de la sesión
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFilters {
    pub bass_boost: bool,
    pub equalizer: EqualizerPreset,
}

/// Ajustes aplicados al abrir un stream. Un sink abierto no los puede cambiar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    pub offset_secs: u64,
    pub speed: f32,
    pub filters: AudioFilters,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            offset_secs: 0,
            speed: 1.0,
            filters: AudioFilters::default(),
        }
    }
}

impl StreamOptions {
    /// Cadena `-af` de ffmpeg, o `None` si no hay nada que aplicar
    pub fn ffmpeg_filter_chain(&self) -> Option<String> {
        let mut filters = atempo_chain(self.speed);

        if self.filters.bass_boost {
            filters.push(BASS_BOOST_FILTER.to_string());
        }
        filters.extend(self.filters.equalizer.ffmpeg_bands());

        if filters.is_empty() {
            None
        } else {
            Some(filters.join(","))
        }
    }
}

/// Valida la velocidad de reproducción
pub fn validate_speed(rate: f32) -> Result<f32, PlayerError> {
    if rate.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&rate) {
        Ok(rate)
    } else {
        Err(PlayerError::InvalidArgument(format!(
            "La velocidad debe estar entre {}x y {}x, se recibió {}x",
            MIN_SPEED, MAX_SPEED, rate
        )))
    }
}

/// Descompone la velocidad en factores `atempo` dentro de [0.5, 2.0]
fn atempo_chain(speed: f32) -> Vec<String> {
    if (speed - 1.0).abs() < f32::EPSILON {
        return Vec::new();
    }

    let mut remaining = speed;
    let mut factors = Vec::new();
    while remaining < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    while remaining > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    if (remaining - 1.0).abs() >= f32::EPSILON {
        factors.push(remaining);
    }

    factors
        .into_iter()
        .map(|factor| format!("atempo={}", factor))
        .collect()
}
