use dashmap::DashMap;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, error, warn};

use crate::{
    audio::PlayerEvent,
    ui::{embeds, format::format_duration},
};

/// Embed con el que se anuncia cada evento del reproductor en el canal de texto.
///
/// Las reaperturas (seek, velocidad, filtros) no se anuncian.
pub fn announcement(event: &PlayerEvent) -> Option<CreateEmbed> {
    match event {
        PlayerEvent::TrackStarted { offset_secs, .. } if *offset_secs > 0 => None,
        PlayerEvent::TrackStarted { track, .. } => Some(embeds::track_started_embed(track)),
        PlayerEvent::TrackFailed { track, reason } => Some(embeds::error_embed(
            "Canción omitida",
            &format!("**{}** no se pudo reproducir: {}", track.title(), reason),
        )),
        PlayerEvent::AutoplayQueued { count } => Some(embeds::info_embed(
            "🔄 Autoplay",
            &format!("Se agregaron {} canciones relacionadas", count),
        )),
        PlayerEvent::QueueFinished => Some(embeds::info_embed(
            "📭 Cola terminada",
            "No quedan canciones. Usa `/play` para seguir escuchando",
        )),
        PlayerEvent::PlaybackFailed { reason } => Some(embeds::error_embed(
            "Reproducción detenida",
            &format!("Ninguna canción de la cola se pudo reproducir: {}", reason),
        )),
    }
}

/// Reenvía los eventos de una sesión al último canal de texto usado en el servidor.
///
/// Termina cuando la sesión se destruye y su canal de eventos se cierra.
pub async fn run_announcer(
    http: Arc<Http>,
    guild_id: GuildId,
    mut events: Receiver<PlayerEvent>,
    text_channels: Arc<DashMap<GuildId, ChannelId>>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Se perdieron {} eventos en guild {}", skipped, guild_id);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if let PlayerEvent::TrackStarted { track, offset_secs } = &event {
            debug!(
                "▶️ {} en guild {} desde {}",
                track.title(),
                guild_id,
                format_duration(std::time::Duration::from_secs(*offset_secs))
            );
        }

        let Some(embed) = announcement(&event) else {
            continue;
        };
        let Some(channel_id) = text_channels.get(&guild_id).map(|entry| *entry) else {
            continue;
        };

        if let Err(e) = channel_id
            .send_message(&http, CreateMessage::new().embed(embed))
            .await
        {
            error!("Error al enviar anuncio en guild {}: {:?}", guild_id, e);
        }
    }

    debug!("Anuncios terminados para guild {}", guild_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Track;
    use serenity::model::id::UserId;

    fn track() -> Track {
        Track::new("Song", "https://youtu.be/a", UserId::new(1)).with_duration(120)
    }

    #[test]
    fn reacquisitions_are_not_announced() {
        assert!(announcement(&PlayerEvent::TrackStarted {
            track: track(),
            offset_secs: 40,
        })
        .is_none());
        assert!(announcement(&PlayerEvent::TrackStarted {
            track: track(),
            offset_secs: 0,
        })
        .is_some());
    }

    #[test]
    fn every_other_event_is_announced() {
        for event in [
            PlayerEvent::TrackFailed {
                track: track(),
                reason: "403".into(),
            },
            PlayerEvent::AutoplayQueued { count: 3 },
            PlayerEvent::QueueFinished,
            PlayerEvent::PlaybackFailed {
                reason: "timeout".into(),
            },
        ] {
            assert!(announcement(&event).is_some());
        }
    }
}
