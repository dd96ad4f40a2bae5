//! # Error Types
//!
//! Errores del motor de reproducción. Los adaptadores externos (yt-dlp,
//! songbird, Spotify) trabajan con `anyhow` y se convierten a
//! [`PlayerError::Acquisition`] al cruzar el límite del motor.

use thiserror::Error;

/// Errores que devuelven la cola, el controlador y el almacenamiento.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// Índice fuera de los límites de la cola.
    #[error("Posición {index} fuera de rango (la cola tiene {len} canciones)")]
    OutOfRange { index: usize, len: usize },

    /// La edición apunta a la canción activa.
    #[error("Operación inválida: {0}")]
    InvalidOperation(&'static str),

    /// La operación no cambiaría nada.
    #[error("Nada que hacer: {0}")]
    NoOp(&'static str),

    /// Velocidad, preset o tiempo fuera del dominio permitido.
    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("No hay ninguna canción reproduciéndose")]
    NoActiveTrack,

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    /// Fallo al resolver o abrir el stream, incluido el timeout.
    #[error("No se pudo obtener el audio: {0}")]
    Acquisition(String),

    #[error("No encontrado: {0}")]
    NotFound(String),

    #[error("Solo quien creó la playlist '{0}' puede eliminarla")]
    NotOwner(String),

    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl PlayerError {
    /// Los fallos de adquisición se pueden reintentar; el resto son errores del llamador.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlayerError::Acquisition(_))
    }

    pub(crate) fn acquisition(err: impl std::fmt::Display) -> Self {
        PlayerError::Acquisition(err.to_string())
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(err: serde_json::Error) -> Self {
        PlayerError::Storage(err.to_string())
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
