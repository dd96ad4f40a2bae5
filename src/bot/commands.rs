use anyhow::Result;
use serenity::{
    all::{ResolvedOption, ResolvedValue},
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};
use std::collections::HashMap;

use crate::{
    audio::{
        effects::{MAX_SPEED, MIN_SPEED},
        equalizer::EqualizerPreset,
        RepeatMode,
    },
    error::{PlayerError, PlayerResult},
    ui::format::parse_timestamp,
};

/// Comando ya validado, con posiciones convertidas a índices base 0
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { query: String },
    Search { query: String },
    Spotify { url: String },
    Pause,
    Resume,
    Stop,
    Skip,
    Previous,
    Seek { seconds: u64 },
    Volume { level: Option<i32> },
    Speed { rate: f32 },
    BassBoost { enabled: bool },
    Equalizer { preset: EqualizerPreset },
    Loop { mode: RepeatMode },
    Autoplay { enabled: bool },
    Shuffle,
    Clear,
    Remove { index: usize },
    Move { from: usize, to: usize },
    Queue { page: usize },
    NowPlaying,
    Playlist(PlaylistCommand),
    Join,
    Leave,
    Stats,
    Help,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistCommand {
    Save { name: String },
    Load { name: String },
    List,
    Delete { name: String },
}

#[derive(Debug, Clone, PartialEq)]
enum ArgValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Flag(bool),
}

/// Opciones de una interacción, con el subcomando (si hay) aplanado
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    subcommand: Option<String>,
    values: HashMap<String, ArgValue>,
}

impl CommandArgs {
    /// Lee las opciones resueltas de un `CommandInteraction`
    pub fn from_resolved(options: &[ResolvedOption<'_>]) -> Self {
        let mut args = Self::default();
        args.collect(options);
        args
    }

    fn collect(&mut self, options: &[ResolvedOption<'_>]) {
        for option in options {
            let value = match &option.value {
                ResolvedValue::String(text) => ArgValue::Text(text.to_string()),
                ResolvedValue::Integer(value) => ArgValue::Integer(*value),
                ResolvedValue::Number(value) => ArgValue::Number(*value),
                ResolvedValue::Boolean(value) => ArgValue::Flag(*value),
                ResolvedValue::SubCommand(nested) => {
                    self.subcommand = Some(option.name.to_string());
                    self.collect(nested);
                    continue;
                }
                _ => continue,
            };
            self.values.insert(option.name.to_string(), value);
        }
    }

    pub fn with_subcommand(mut self, name: &str) -> Self {
        self.subcommand = Some(name.to_string());
        self
    }

    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.values
            .insert(name.to_string(), ArgValue::Text(value.to_string()));
        self
    }

    pub fn with_integer(mut self, name: &str, value: i64) -> Self {
        self.values.insert(name.to_string(), ArgValue::Integer(value));
        self
    }

    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), ArgValue::Number(value));
        self
    }

    pub fn with_flag(mut self, name: &str, value: bool) -> Self {
        self.values.insert(name.to_string(), ArgValue::Flag(value));
        self
    }

    fn text(&self, name: &str) -> PlayerResult<String> {
        match self.values.get(name) {
            Some(ArgValue::Text(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(missing(name)),
        }
    }

    fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ArgValue::Number(value)) => Some(*value),
            Some(ArgValue::Integer(value)) => Some(*value as f64),
            _ => None,
        }
    }

    fn flag(&self, name: &str) -> PlayerResult<bool> {
        match self.values.get(name) {
            Some(ArgValue::Flag(value)) => Ok(*value),
            _ => Err(missing(name)),
        }
    }

    /// Posición para el usuario (base 1) convertida a índice
    fn position(&self, name: &str) -> PlayerResult<usize> {
        let value = self.integer(name).ok_or_else(|| missing(name))?;
        if value < 1 {
            return Err(PlayerError::InvalidArgument(format!(
                "'{}' debe ser 1 o mayor",
                name
            )));
        }
        usize::try_from(value - 1)
            .map_err(|_| PlayerError::InvalidArgument(format!("'{}' es demasiado grande", name)))
    }
}

fn missing(name: &str) -> PlayerError {
    PlayerError::InvalidArgument(format!("falta la opción '{}'", name))
}

impl Command {
    /// Construye un comando a partir del nombre del slash command y sus opciones
    pub fn parse(name: &str, args: &CommandArgs) -> PlayerResult<Self> {
        let command = match name {
            "play" => Command::Play {
                query: args.text("query")?,
            },
            "search" => Command::Search {
                query: args.text("query")?,
            },
            "spotify" => Command::Spotify {
                url: args.text("url")?,
            },
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "skip" => Command::Skip,
            "previous" => Command::Previous,
            "seek" => Command::Seek {
                seconds: parse_timestamp(&args.text("time")?)?,
            },
            "volume" => Command::Volume {
                level: args
                    .integer("level")
                    .map(|level| level.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32),
            },
            "speed" => Command::Speed {
                rate: args.number("rate").ok_or_else(|| missing("rate"))? as f32,
            },
            "bassboost" => Command::BassBoost {
                enabled: args.flag("enable")?,
            },
            "equalizer" => Command::Equalizer {
                preset: args.text("preset")?.parse()?,
            },
            "loop" => Command::Loop {
                mode: parse_repeat_mode(&args.text("mode")?)?,
            },
            "autoplay" => Command::Autoplay {
                enabled: args.flag("enable")?,
            },
            "shuffle" => Command::Shuffle,
            "clear" => Command::Clear,
            "remove" => Command::Remove {
                index: args.position("position")?,
            },
            "move" => Command::Move {
                from: args.position("from")?,
                to: args.position("to")?,
            },
            "queue" => Command::Queue {
                page: match args.integer("page") {
                    Some(page) if page >= 1 => usize::try_from(page).unwrap_or(usize::MAX),
                    Some(_) => {
                        return Err(PlayerError::InvalidArgument(
                            "la página debe ser 1 o mayor".to_string(),
                        ))
                    }
                    None => 1,
                },
            },
            "nowplaying" => Command::NowPlaying,
            "playlist" => Command::Playlist(parse_playlist(args)?),
            "join" => Command::Join,
            "leave" => Command::Leave,
            "stats" => Command::Stats,
            "help" => Command::Help,
            "ping" => Command::Ping,
            other => {
                return Err(PlayerError::InvalidArgument(format!(
                    "comando desconocido: /{}",
                    other
                )))
            }
        };

        Ok(command)
    }

    /// Comandos que necesitan al bot en el canal de voz del usuario
    pub fn needs_voice(&self) -> bool {
        matches!(
            self,
            Command::Play { .. }
                | Command::Spotify { .. }
                | Command::Join
                | Command::Playlist(PlaylistCommand::Load { .. })
        )
    }
}

fn parse_repeat_mode(mode: &str) -> PlayerResult<RepeatMode> {
    match mode.to_lowercase().as_str() {
        "off" => Ok(RepeatMode::Off),
        "track" => Ok(RepeatMode::Track),
        "queue" => Ok(RepeatMode::Queue),
        other => Err(PlayerError::InvalidArgument(format!(
            "modo de repetición '{}' inválido (off, track, queue)",
            other
        ))),
    }
}

fn parse_playlist(args: &CommandArgs) -> PlayerResult<PlaylistCommand> {
    let subcommand = args
        .subcommand
        .as_deref()
        .ok_or_else(|| missing("subcomando"))?;

    match subcommand {
        "save" => Ok(PlaylistCommand::Save {
            name: args.text("name")?,
        }),
        "load" => Ok(PlaylistCommand::Load {
            name: args.text("name")?,
        }),
        "list" => Ok(PlaylistCommand::List),
        "delete" => Ok(PlaylistCommand::Delete {
            name: args.text("name")?,
        }),
        other => Err(PlayerError::InvalidArgument(format!(
            "subcomando de playlist desconocido: {}",
            other
        ))),
    }
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in definitions() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, definitions()).await?;

    Ok(())
}

/// Definiciones de todos los slash commands
pub fn definitions() -> Vec<CreateCommand> {
    vec![
        play_command(),
        search_command(),
        spotify_command(),
        CreateCommand::new("pause").description("Pausa la reproducción actual"),
        CreateCommand::new("resume").description("Reanuda la reproducción pausada"),
        CreateCommand::new("stop").description("Detiene la reproducción (la cola se conserva)"),
        CreateCommand::new("skip").description("Salta a la siguiente canción"),
        CreateCommand::new("previous").description("Vuelve a la canción anterior"),
        seek_command(),
        volume_command(),
        speed_command(),
        toggle_command("bassboost", "Activa o desactiva el bass boost"),
        equalizer_command(),
        loop_command(),
        toggle_command("autoplay", "Agrega canciones relacionadas cuando la cola termina"),
        CreateCommand::new("shuffle").description("Mezcla la cola (la canción actual queda primera)"),
        CreateCommand::new("clear").description("Limpia la cola de reproducción"),
        remove_command(),
        move_command(),
        queue_command(),
        CreateCommand::new("nowplaying").description("Muestra información de la canción actual"),
        playlist_command(),
        CreateCommand::new("join").description("Conecta el bot a tu canal de voz"),
        CreateCommand::new("leave").description("Desconecta el bot del canal de voz"),
        CreateCommand::new("stats").description("Muestra estadísticas de las sesiones"),
        CreateCommand::new("help").description("Muestra información de ayuda"),
        CreateCommand::new("ping").description("Comprueba que el bot responde"),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la agrega a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Busca canciones y muestra resultados")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                .required(true),
        )
}

fn spotify_command() -> CreateCommand {
    CreateCommand::new("spotify")
        .description("Reproduce un track o playlist de Spotify")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "Enlace de Spotify")
                .required(true),
        )
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a un punto de la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "time", "Tiempo (90, 1:30, 1:02:03)")
                .required(true),
        )
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Nivel de volumen (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
}

fn speed_command() -> CreateCommand {
    CreateCommand::new("speed")
        .description("Cambia la velocidad de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "rate", "Velocidad (0.25-2.0)")
                .min_number_value(f64::from(MIN_SPEED))
                .max_number_value(f64::from(MAX_SPEED))
                .required(true),
        )
}

fn toggle_command(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description).add_option(
        CreateCommandOption::new(CommandOptionType::Boolean, "enable", "Activar o desactivar")
            .required(true),
    )
}

fn equalizer_command() -> CreateCommand {
    let mut preset =
        CreateCommandOption::new(CommandOptionType::String, "preset", "Preset de ecualizador")
            .required(true);
    for name in EqualizerPreset::names() {
        preset = preset.add_string_choice(name, name);
    }

    CreateCommand::new("equalizer")
        .description("Configura el ecualizador")
        .add_option(preset)
}

// Comandos de cola

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Canción", "track")
                .add_string_choice("Cola", "queue")
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Elimina una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción dentro de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .min_int_value(1)
                .required(true),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

// Playlists guardadas

fn playlist_command() -> CreateCommand {
    let name_option = || {
        CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
            .required(true)
    };

    CreateCommand::new("playlist")
        .description("Gestiona las playlists del servidor")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "save",
                "Guarda la cola actual como playlist",
            )
            .add_sub_option(name_option()),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "load",
                "Agrega una playlist guardada a la cola",
            )
            .add_sub_option(name_option()),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Lista las playlists guardadas",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "delete",
                "Elimina una playlist (solo su creador)",
            )
            .add_sub_option(name_option()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args() -> CommandArgs {
        CommandArgs::default()
    }

    #[test]
    fn play_requires_a_query() {
        assert_eq!(
            Command::parse("play", &args().with_text("query", " lofi beats ")),
            Ok(Command::Play {
                query: "lofi beats".into()
            })
        );
        assert!(matches!(
            Command::parse("play", &args().with_text("query", "   ")),
            Err(PlayerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn positions_are_converted_to_indices() {
        assert_eq!(
            Command::parse("remove", &args().with_integer("position", 3)),
            Ok(Command::Remove { index: 2 })
        );
        assert_eq!(
            Command::parse(
                "move",
                &args().with_integer("from", 1).with_integer("to", 4)
            ),
            Ok(Command::Move { from: 0, to: 3 })
        );
        assert!(Command::parse("remove", &args().with_integer("position", 0)).is_err());
    }

    #[test]
    fn seek_accepts_timestamps() {
        assert_eq!(
            Command::parse("seek", &args().with_text("time", "1:30")),
            Ok(Command::Seek { seconds: 90 })
        );
        assert!(Command::parse("seek", &args().with_text("time", "1:75")).is_err());
    }

    #[test]
    fn audio_settings_are_typed() {
        assert_eq!(
            Command::parse("speed", &args().with_number("rate", 1.5)),
            Ok(Command::Speed { rate: 1.5 })
        );
        assert_eq!(
            Command::parse("equalizer", &args().with_text("preset", "rock")),
            Ok(Command::Equalizer {
                preset: EqualizerPreset::Rock
            })
        );
        assert_eq!(
            Command::parse("volume", &args()),
            Ok(Command::Volume { level: None })
        );
        assert_eq!(
            Command::parse("bassboost", &args().with_flag("enable", true)),
            Ok(Command::BassBoost { enabled: true })
        );
    }

    #[test]
    fn loop_modes() {
        assert_eq!(
            Command::parse("loop", &args().with_text("mode", "queue")),
            Ok(Command::Loop {
                mode: RepeatMode::Queue
            })
        );
        assert!(Command::parse("loop", &args().with_text("mode", "forever")).is_err());
    }

    #[test]
    fn queue_page_defaults_to_first() {
        assert_eq!(
            Command::parse("queue", &args()),
            Ok(Command::Queue { page: 1 })
        );
        assert_eq!(
            Command::parse("queue", &args().with_integer("page", 2)),
            Ok(Command::Queue { page: 2 })
        );
    }

    #[test]
    fn playlist_subcommands() {
        assert_eq!(
            Command::parse(
                "playlist",
                &args().with_subcommand("save").with_text("name", "favs")
            ),
            Ok(Command::Playlist(PlaylistCommand::Save {
                name: "favs".into()
            }))
        );
        assert_eq!(
            Command::parse("playlist", &args().with_subcommand("list")),
            Ok(Command::Playlist(PlaylistCommand::List))
        );
        assert!(Command::parse("playlist", &args()).is_err());
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(matches!(
            Command::parse("lyrics", &args()),
            Err(PlayerError::InvalidArgument(msg)) if msg.contains("/lyrics")
        ));
    }

    #[test]
    fn every_definition_has_a_parser() {
        let names: Vec<String> = definitions()
            .iter()
            .map(|command| {
                let json = serde_json::to_value(command).unwrap();
                json["name"].as_str().unwrap().to_string()
            })
            .collect();

        assert_eq!(names.len(), 27);
        for name in names {
            let result = Command::parse(&name, &args());
            assert!(
                !matches!(&result, Err(PlayerError::InvalidArgument(msg)) if msg.starts_with("comando desconocido")),
                "/{} no tiene parser",
                name
            );
        }
    }
}
