use std::time::Duration;

use crate::{
    audio::{queue::QueueEntry, RepeatMode},
    error::{PlayerError, PlayerResult},
    sources::Track,
};

/// Formatea una duración como `m:ss` o `h:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Duración de un track, o "En vivo" si es desconocida
pub fn format_track_length(track: &Track) -> String {
    match track.duration() {
        0 => "🔴 En vivo".to_string(),
        secs => format_duration(Duration::from_secs(secs)),
    }
}

/// Parsea `90`, `1:30` o `1:02:03` a segundos
pub fn parse_timestamp(input: &str) -> PlayerResult<u64> {
    let invalid = || {
        PlayerError::InvalidArgument(format!(
            "'{}' no es un tiempo válido (usa 90, 1:30 o 1:02:03)",
            input
        ))
    };

    let parts: Vec<&str> = input.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }

    let mut values = Vec::with_capacity(parts.len());
    for part in &parts {
        let value: u64 = part.parse().map_err(|_| invalid())?;
        values.push(value);
    }

    // Minutos y segundos después del primer campo deben ser < 60
    if values.iter().skip(1).any(|v| *v >= 60) {
        return Err(invalid());
    }

    values
        .iter()
        .try_fold(0u64, |total, v| total.checked_mul(60)?.checked_add(*v))
        .ok_or_else(invalid)
}

/// Barra de progreso de la reproducción
pub fn progress_bar(position: u64, duration: u64) -> String {
    let segments = 20;
    if duration == 0 {
        return format!("`[{}]`", "▒".repeat(segments));
    }

    let ratio = (position.min(duration) as f64) / (duration as f64);
    let filled = ((ratio * segments as f64) as usize).min(segments);
    format!(
        "`[{}{}]`",
        "█".repeat(filled),
        "▒".repeat(segments - filled)
    )
}

/// Crea una barra visual de volumen
pub fn volume_bar(volume: u8) -> String {
    let segments = 20;
    let filled = (usize::from(volume.min(100)) * segments) / 100;
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}

pub fn repeat_label(mode: RepeatMode) -> &'static str {
    match mode {
        RepeatMode::Off => "➡️ Desactivado",
        RepeatMode::Track => "🔂 Canción",
        RepeatMode::Queue => "🔁 Cola",
    }
}

/// Una línea de la cola: posición para el usuario (base 1), título y duración
pub fn queue_line(entry: &QueueEntry) -> String {
    let marker = if entry.is_current { "▶️ " } else { "" };
    let author = entry
        .track
        .author()
        .map(|author| format!(" - {}", author))
        .unwrap_or_default();
    let autoplay = if entry.track.is_autoplay() { " 🔄" } else { "" };

    format!(
        "{}**{}**. {}{} `[{}]`{}",
        marker,
        entry.position + 1,
        entry.track.title(),
        author,
        format_track_length(&entry.track),
        autoplay
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::UserId;

    #[test]
    fn formats_short_and_long_durations() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(215)), "3:35");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn parses_timestamps() {
        assert_eq!(parse_timestamp("90"), Ok(90));
        assert_eq!(parse_timestamp("1:30"), Ok(90));
        assert_eq!(parse_timestamp("1:02:03"), Ok(3723));
        assert_eq!(parse_timestamp(" 0:05 "), Ok(5));
    }

    #[test]
    fn rejects_malformed_timestamps() {
        for input in ["", "abc", "1:60", "1:2:3:4", "-5", "1::2"] {
            assert!(parse_timestamp(input).is_err(), "{} debería fallar", input);
        }
    }

    #[test]
    fn huge_timestamps_are_rejected_instead_of_wrapping() {
        assert!(matches!(
            parse_timestamp("999999999999999999:00"),
            Err(PlayerError::InvalidArgument(_))
        ));
        assert!(parse_timestamp("18446744073709551615:59:59").is_err());
        assert_eq!(parse_timestamp("307445734561825860"), Ok(307_445_734_561_825_860));
    }

    #[test]
    fn progress_bar_is_clamped() {
        assert_eq!(progress_bar(50, 100), format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10)));
        assert_eq!(progress_bar(500, 100), format!("`[{}]`", "█".repeat(20)));
        assert_eq!(progress_bar(5, 0), format!("`[{}]`", "▒".repeat(20)));
    }

    #[test]
    fn queue_lines_use_one_based_positions() {
        let entry = QueueEntry {
            position: 2,
            is_current: true,
            track: Track::new("Song", "https://youtu.be/x", UserId::new(1))
                .with_duration(65)
                .with_author("Band"),
        };
        assert_eq!(queue_line(&entry), "▶️ **3**. Song - Band `[1:05]`");
    }
}
