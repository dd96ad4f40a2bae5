use num_format::{Locale, ToFormattedString};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{QueuePage, RegistryStats, SessionSnapshot},
    sources::Track,
    storage::{Playlist, PlaylistSummary},
    ui::format::{
        format_duration, format_track_length, progress_bar, queue_line, repeat_label, volume_bar,
    },
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Music Bot";

fn track_fields(mut embed: CreateEmbed, track: &Track) -> CreateEmbed {
    embed = embed
        .field("🎤 Artista", track.author().unwrap_or("Desconocido"), true)
        .field("⏱️ Duración", format_track_length(track), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by()), true);

    if let Some(reference) = track.spotify() {
        embed = embed.field(
            "🟢 Spotify",
            format!("{} - {}", reference.artist, reference.name),
            true,
        );
    }
    if let Some(playlist) = track.loaded_from_playlist() {
        embed = embed.field("📋 Playlist", playlist, true);
    }
    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed.url(track.url())
}

/// Crea un embed para mostrar la canción actual
pub fn now_playing_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let Some(track) = &snapshot.current else {
        return info_embed("📭 Nada sonando", "No hay ninguna canción en reproducción");
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::MUSIC_PURPLE);
    embed = track_fields(embed, track);

    let progress = format!(
        "{} {} / {}",
        progress_bar(snapshot.position_secs, track.duration()),
        format_duration(Duration::from_secs(snapshot.position_secs)),
        format_track_length(track)
    );

    embed
        .field("📊 Progreso", progress, false)
        .field("🔁 Repetición", repeat_label(snapshot.repeat_mode), true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .field("⏱️ Velocidad", format!("{}x", snapshot.speed), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn track_added_embed(track: &Track, position: usize, started: bool) -> CreateEmbed {
    let (title, footer) = if started {
        ("▶️ Reproduciendo", STANDARD_FOOTER.to_string())
    } else {
        ("✅ Canción Agregada", format!("Posición en la cola: {}", position))
    };

    let embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Anuncio de una canción que empezó a sonar
pub fn track_started_embed(track: &Track) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::MUSIC_PURPLE);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para varias canciones agregadas de una vez
pub fn tracks_added_embed(source: &str, added: usize, requested: usize) -> CreateEmbed {
    let mut description = format!("Se agregaron **{}** canciones desde {}", added, source);
    if added < requested {
        description.push_str(&format!(
            "\n⚠️ {} canciones no entraron (cola llena)",
            requested - added
        ));
    }

    CreateEmbed::default()
        .title("📋 Canciones Agregadas")
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn queue_embed(page: &QueuePage, snapshot: &SessionSnapshot) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if page.total_tracks == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let listing = if page.entries.is_empty() {
        "No hay canciones en esta página".to_string()
    } else {
        page.entries
            .iter()
            .map(queue_line)
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut info = format!("**Total:** {} canciones", page.total_tracks);
    if snapshot.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(snapshot.total_duration)
        ));
    }
    info.push_str(&format!(" • {}", repeat_label(snapshot.repeat_mode)));
    if snapshot.autoplay {
        info.push_str(" • 🔄 **Autoplay**");
    }

    embed
        .description(listing)
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Open Music Bot",
            page.current_page,
            page.total_pages.max(1)
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed de volumen con indicador visual
pub fn volume_embed(volume: u8) -> CreateEmbed {
    let status_emoji = match volume {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen actual: {}%**", volume))
        .field("📊 Nivel", volume_bar(volume), false)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
}

/// Estado de los efectos de audio
pub fn effects_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎛️ Efectos de Audio")
        .field("⏱️ Velocidad", format!("{}x", snapshot.speed), true)
        .field(
            "🔈 Bass boost",
            if snapshot.filters.bass_boost { "Activado" } else { "Desactivado" },
            true,
        )
        .field("🎚️ Ecualizador", snapshot.filters.equalizer.as_str(), true)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
}

/// Resultados de búsqueda
pub fn search_results_embed(query: &str, results: &[Track]) -> CreateEmbed {
    let listing = results
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "**{}**. [{}]({}) `[{}]`",
                i + 1,
                track.title(),
                track.url(),
                format_track_length(track)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title(format!("🔍 Resultados para: {}", query))
        .description(listing)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Usa /play <url> para reproducir uno"))
}

pub fn playlist_saved_embed(playlist: &Playlist) -> CreateEmbed {
    success_embed(
        "💾 Playlist Guardada",
        &format!(
            "**{}** con {} canciones ({})",
            playlist.name,
            playlist.tracks.len(),
            format_duration(Duration::from_secs(playlist.total_duration))
        ),
    )
}

pub fn playlist_list_embed(playlists: &[PlaylistSummary]) -> CreateEmbed {
    if playlists.is_empty() {
        return info_embed("📋 Playlists", "No hay playlists guardadas en este servidor");
    }

    let listing = playlists
        .iter()
        .map(|summary| {
            format!(
                "**{}** • {} canciones • {} • por {}",
                summary.name,
                summary.track_count,
                format_duration(Duration::from_secs(summary.total_duration)),
                summary.created_by_tag
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("📋 Playlists Guardadas")
        .description(listing)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn stats_embed(stats: &RegistryStats) -> CreateEmbed {
    let formatted = |n: usize| n.to_formatted_string(&Locale::es);

    CreateEmbed::default()
        .title("📊 Estadísticas")
        .field("🎛️ Sesiones", formatted(stats.sessions), true)
        .field("📋 Con cola", formatted(stats.active), true)
        .field("▶️ Reproduciendo", formatted(stats.playing), true)
        .field("🎵 Canciones en cola", formatted(stats.queued_tracks), true)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda general
pub fn help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Open Music Bot - Comandos")
        .field(
            "▶️ Reproducción",
            "`/play` `/search` `/spotify` `/pause` `/resume` `/stop`\n\
             `/skip` `/previous` `/seek` `/nowplaying`",
            false,
        )
        .field(
            "📋 Cola",
            "`/queue` `/shuffle` `/clear` `/remove` `/move` `/loop` `/autoplay`",
            false,
        )
        .field(
            "🎛️ Audio",
            "`/volume` `/speed` `/bassboost` `/equalizer`",
            false,
        )
        .field(
            "💾 Playlists",
            "`/playlist save` `/playlist load` `/playlist list` `/playlist delete`",
            false,
        )
        .field("🔧 Otros", "`/join` `/leave` `/stats` `/ping` `/help`", false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
}

pub fn info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
}
