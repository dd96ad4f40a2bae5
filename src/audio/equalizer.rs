use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::PlayerError;

/// Frecuencias centrales para el ecualizador de 10 bandas
const EQ_FREQUENCIES: [f32; 10] = [
    32.0,    // Sub-bass
    64.0,    // Bass
    125.0,   // Low-mid
    250.0,   // Mid
    500.0,   // Upper-mid
    1000.0,  // Presence
    2000.0,  // Brilliance
    4000.0,  // High
    8000.0,  // Very high
    16000.0, // Air
];

/// Ancho de banda Q para cada frecuencia
const EQ_Q: f32 = 1.414; // Factor Q estándar (octava)

/// Presets de ecualizador disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqualizerPreset {
    #[default]
    None,
    Pop,
    Rock,
    Jazz,
    Classical,
}

impl EqualizerPreset {
    pub const ALL: [EqualizerPreset; 5] = [
        EqualizerPreset::None,
        EqualizerPreset::Pop,
        EqualizerPreset::Rock,
        EqualizerPreset::Jazz,
        EqualizerPreset::Classical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EqualizerPreset::None => "none",
            EqualizerPreset::Pop => "pop",
            EqualizerPreset::Rock => "rock",
            EqualizerPreset::Jazz => "jazz",
            EqualizerPreset::Classical => "classical",
        }
    }

    /// Ganancias en dB para cada banda
    pub fn gains(&self) -> [f32; 10] {
        match self {
            EqualizerPreset::None => [0.0; 10],
            EqualizerPreset::Pop => [-1.0, 2.0, 4.0, 5.0, 3.0, 0.0, -1.0, -1.0, 0.0, 0.0],
            EqualizerPreset::Rock => [5.0, 4.0, 3.0, 1.0, -1.0, -1.0, 0.0, 2.0, 3.0, 4.0],
            EqualizerPreset::Jazz => [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0],
            EqualizerPreset::Classical => [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -2.0, -2.0, -2.0, -3.0],
        }
    }

    /// Filtros `equalizer` de ffmpeg para las bandas con ganancia distinta de cero
    pub fn ffmpeg_bands(&self) -> Vec<String> {
        EQ_FREQUENCIES
            .iter()
            .zip(self.gains())
            .filter(|(_, gain)| *gain != 0.0)
            .map(|(freq, gain)| format!("equalizer=f={}:t=q:w={}:g={}", freq, EQ_Q, gain))
            .collect()
    }

    /// Lista los nombres de todos los presets
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|preset| preset.as_str()).collect()
    }
}

impl fmt::Display for EqualizerPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EqualizerPreset {
    type Err = PlayerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "none" | "flat" | "normal" => Ok(EqualizerPreset::None),
            "pop" => Ok(EqualizerPreset::Pop),
            "rock" => Ok(EqualizerPreset::Rock),
            "jazz" => Ok(EqualizerPreset::Jazz),
            "classical" => Ok(EqualizerPreset::Classical),
            other => Err(PlayerError::InvalidArgument(format!(
                "Preset '{}' no encontrado (disponibles: {})",
                other,
                Self::names().join(", ")
            ))),
        }
    }
}
