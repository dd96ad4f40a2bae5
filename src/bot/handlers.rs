use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{application::CommandInteraction, id::GuildId},
    prelude::Context,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    audio::Session,
    bot::{
        commands::{Command, CommandArgs, PlaylistCommand},
        OpenMusicBot,
    },
    error::PlayerError,
    sources::Track,
    storage::PlaylistOwner,
    ui::{
        embeds,
        format::{format_duration, repeat_label},
    },
};

/// Canciones por página en `/queue`
const QUEUE_PAGE_SIZE: usize = 10;

/// Resultados que muestra `/search`
const SEARCH_RESULTS: usize = 5;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Los comandos solo funcionan dentro de un servidor")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    bot.remember_text_channel(guild_id, command.channel_id);

    let embed = match execute(ctx, &command, guild_id, bot).await {
        Ok(embed) => embed,
        Err(e) => {
            warn!("⚠️ /{} falló en guild {}: {:#}", command.data.name, guild_id, e);
            embeds::error_embed("Error", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn execute(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &OpenMusicBot,
) -> Result<CreateEmbed> {
    let args = CommandArgs::from_resolved(&command.data.options());
    let parsed = Command::parse(&command.data.name, &args)?;

    if parsed.needs_voice() {
        bot.ensure_voice(ctx, guild_id, command.user.id).await?;
    }

    let embed = match parsed {
        Command::Play { query } => {
            if bot.spotify.parse_link(&query).is_some() {
                return handle_spotify(ctx, command, guild_id, bot, &query).await;
            }
            let track = resolve(bot, &query, command).await?;
            let session = bot.session(ctx, guild_id);
            let enqueued = session.enqueue(track.clone()).await?;
            embeds::track_added_embed(&track, enqueued.position, enqueued.started)
        }
        Command::Search { query } => {
            let results = with_search_timeout(
                bot,
                bot.provider
                    .search(&query, SEARCH_RESULTS, command.user.id),
            )
            .await?;
            if results.is_empty() {
                return Err(PlayerError::NotFound(format!("resultados para '{}'", query)).into());
            }
            embeds::search_results_embed(&query, &results)
        }
        Command::Spotify { url } => {
            return handle_spotify(ctx, command, guild_id, bot, &url).await;
        }
        Command::Pause => {
            if existing(bot, guild_id)?.pause().await? {
                embeds::success_embed("⏸️ Pausado", "Reproducción pausada")
            } else {
                embeds::info_embed("⏸️ Pausado", "La reproducción ya estaba en pausa")
            }
        }
        Command::Resume => {
            if existing(bot, guild_id)?.resume().await? {
                embeds::success_embed("▶️ Reanudado", "Reproducción reanudada")
            } else {
                embeds::info_embed("▶️ Reproduciendo", "La reproducción no estaba en pausa")
            }
        }
        Command::Stop => {
            if existing(bot, guild_id)?.stop().await {
                embeds::success_embed("⏹️ Detenido", "Reproducción detenida, la cola se conserva")
            } else {
                embeds::info_embed("⏹️ Detenido", "No había nada sonando")
            }
        }
        Command::Skip => match existing(bot, guild_id)?.skip().await? {
            Some(track) => {
                embeds::success_embed("⏭️ Saltado", &format!("Ahora suena **{}**", track.title()))
            }
            None => embeds::info_embed("⏭️ Saltado", "No quedan más canciones en la cola"),
        },
        Command::Previous => match existing(bot, guild_id)?.previous().await? {
            Some(track) => embeds::success_embed(
                "⏮️ Anterior",
                &format!("Ahora suena **{}**", track.title()),
            ),
            None => embeds::info_embed("⏮️ Anterior", "No hay canción anterior"),
        },
        Command::Seek { seconds } => {
            existing(bot, guild_id)?.seek(seconds).await?;
            embeds::success_embed(
                "⏩ Posición cambiada",
                &format!("Reproduciendo desde {}", format_duration(Duration::from_secs(seconds))),
            )
        }
        Command::Volume { level: None } => {
            let volume = bot
                .registry
                .get(guild_id)
                .map(|session| session.snapshot().volume)
                .unwrap_or(bot.config.default_volume);
            embeds::volume_embed(volume)
        }
        Command::Volume { level: Some(level) } => {
            let applied = bot.session(ctx, guild_id).set_volume(level).await;
            embeds::volume_embed(applied)
        }
        Command::Speed { rate } => {
            let session = bot.session(ctx, guild_id);
            session.set_speed(rate).await?;
            embeds::effects_embed(&session.snapshot())
        }
        Command::BassBoost { enabled } => {
            let session = bot.session(ctx, guild_id);
            session.set_bass_boost(enabled).await?;
            embeds::effects_embed(&session.snapshot())
        }
        Command::Equalizer { preset } => {
            let session = bot.session(ctx, guild_id);
            session.set_equalizer(preset).await?;
            embeds::effects_embed(&session.snapshot())
        }
        Command::Loop { mode } => {
            bot.session(ctx, guild_id).set_repeat(mode).await;
            embeds::success_embed("🔁 Repetición", repeat_label(mode))
        }
        Command::Autoplay { enabled } => {
            bot.session(ctx, guild_id).set_autoplay(enabled).await;
            let state = if enabled { "activado" } else { "desactivado" };
            embeds::success_embed("🔄 Autoplay", &format!("Autoplay {}", state))
        }
        Command::Shuffle => {
            existing(bot, guild_id)?.shuffle().await?;
            embeds::success_embed("🔀 Cola mezclada", "La canción actual sigue primera")
        }
        Command::Clear => {
            let removed = existing(bot, guild_id)?.clear().await;
            embeds::success_embed(
                "🗑️ Cola limpiada",
                &format!("Se eliminaron {} canciones", removed),
            )
        }
        Command::Remove { index } => {
            let track = existing(bot, guild_id)?.remove_track(index).await?;
            embeds::success_embed(
                "🗑️ Canción eliminada",
                &format!("**{}** salió de la cola", track.title()),
            )
        }
        Command::Move { from, to } => {
            existing(bot, guild_id)?.move_track(from, to).await?;
            embeds::success_embed(
                "↕️ Canción movida",
                &format!("De la posición {} a la {}", from + 1, to + 1),
            )
        }
        Command::Queue { page } => match bot.registry.get(guild_id) {
            Some(session) => embeds::queue_embed(
                &session.page_queue(page, QUEUE_PAGE_SIZE),
                &session.snapshot(),
            ),
            None => embeds::info_embed("📋 Cola de Reproducción", "😴 **La cola está vacía**"),
        },
        Command::NowPlaying => match bot.registry.get(guild_id) {
            Some(session) => embeds::now_playing_embed(&session.snapshot()),
            None => embeds::info_embed("📭 Nada sonando", "No hay ninguna canción en reproducción"),
        },
        Command::Playlist(action) => {
            return handle_playlist(ctx, command, guild_id, bot, action).await;
        }
        Command::Join => embeds::success_embed("🔊 Conectado", "Listo para reproducir música"),
        Command::Leave => {
            bot.leave_voice_channel(ctx, guild_id).await?;
            embeds::success_embed("👋 Desconectado", "Hasta la próxima")
        }
        Command::Stats => embeds::stats_embed(&bot.registry.stats()),
        Command::Help => embeds::help_embed(),
        Command::Ping => embeds::info_embed("🏓 Pong!", "El bot está en línea"),
    };

    Ok(embed)
}

async fn handle_spotify(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &OpenMusicBot,
    url: &str,
) -> Result<CreateEmbed> {
    let mut tracks = bot
        .spotify
        .resolve_tracks(bot.provider.as_ref(), url, command.user.id)
        .await?;

    if tracks.is_empty() {
        return Err(PlayerError::NotFound("canciones de Spotify en YouTube".to_string()).into());
    }

    let session = bot.session(ctx, guild_id);
    if tracks.len() == 1 {
        let track = tracks.remove(0);
        let enqueued = session.enqueue(track.clone()).await?;
        return Ok(embeds::track_added_embed(
            &track,
            enqueued.position,
            enqueued.started,
        ));
    }

    let requested = tracks.len();
    let enqueued = session.enqueue_many(tracks).await?;
    Ok(embeds::tracks_added_embed("Spotify", enqueued.added, requested))
}

async fn handle_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &OpenMusicBot,
    action: PlaylistCommand,
) -> Result<CreateEmbed> {
    let embed = match action {
        PlaylistCommand::Save { name } => {
            let tracks = bot
                .registry
                .get(guild_id)
                .map(|session| session.tracks())
                .unwrap_or_default();
            let owner = PlaylistOwner {
                id: command.user.id,
                tag: command.user.tag(),
            };
            let playlist = bot.store.save(guild_id, &name, &tracks, &owner).await?;
            embeds::playlist_saved_embed(&playlist)
        }
        PlaylistCommand::Load { name } => {
            let playlist = bot.store.load(guild_id, &name).await?;
            let tracks = playlist.to_tracks(command.user.id);
            let requested = tracks.len();
            let enqueued = bot.session(ctx, guild_id).enqueue_many(tracks).await?;
            embeds::tracks_added_embed(
                &format!("la playlist **{}**", playlist.name),
                enqueued.added,
                requested,
            )
        }
        PlaylistCommand::List => embeds::playlist_list_embed(&bot.store.list(guild_id).await?),
        PlaylistCommand::Delete { name } => {
            let playlist = bot.store.delete(guild_id, &name, command.user.id).await?;
            embeds::success_embed(
                "🗑️ Playlist eliminada",
                &format!("**{}** ya no está disponible", playlist.name),
            )
        }
    };

    Ok(embed)
}

/// Sesión ya creada del servidor; sin ella no hay nada que controlar
fn existing(bot: &OpenMusicBot, guild_id: GuildId) -> Result<Arc<Session>, PlayerError> {
    bot.registry.get(guild_id).ok_or(PlayerError::NoActiveTrack)
}

/// Resuelve la consulta a un único track
async fn resolve(bot: &OpenMusicBot, query: &str, command: &CommandInteraction) -> Result<Track> {
    let track = with_search_timeout(bot, bot.provider.resolve(query, command.user.id)).await?;
    track.ok_or_else(|| PlayerError::NotFound(format!("resultados para '{}'", query)).into())
}

async fn with_search_timeout<T>(
    bot: &OpenMusicBot,
    search: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    let limit = bot.config.search_timeout;
    tokio::time::timeout(limit, search).await.map_err(|_| {
        PlayerError::Acquisition(format!(
            "la búsqueda tardó más de {}",
            humantime::format_duration(limit)
        ))
    })?
}
