//! # Bot Module
//!
//! Discord front end for the playback engine.
//!
//! This module contains the serenity glue around the per-guild sessions:
//! - Slash command registration and dispatch
//! - Voice connection management through songbird
//! - Event handling (ready, interactions, voice state updates)
//! - Announcements of player events in the guild's text channel
//!
//! ## Architecture
//!
//! The bot is built around the [`OpenMusicBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It never decides anything about the
//! queue or playback itself; every command is forwarded to the guild's
//! [`Session`] obtained from the [`SessionRegistry`].
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use open_music_engine::{audio::{SessionOptions, SessionRegistry}, bot::OpenMusicBot,
//! #     config::Config, sources::{SpotifyClient, YtDlpProvider}, storage::JsonPlaylistStore};
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let songbird = songbird::Songbird::serenity();
//! let provider = Arc::new(YtDlpProvider::new(songbird.clone()));
//! let registry = Arc::new(SessionRegistry::new(provider.clone(), SessionOptions::from(&config)));
//! let store = Arc::new(JsonPlaylistStore::new(config.data_dir.join("playlists"), 50).await?);
//! let spotify = Arc::new(SpotifyClient::new(None, None)?);
//!
//! let bot = OpenMusicBot::new(config, registry, provider, spotify, store);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{Session, SessionRegistry},
    config::Config,
    sources::{ResolutionProvider, SpotifyClient},
    storage::PlaylistStore,
};

/// Main Discord bot handler for Open Music Bot.
///
/// This struct implements Serenity's [`EventHandler`] trait and owns the
/// collaborators every command needs.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, limits, timeouts)
/// - `registry`: Per-guild playback sessions
/// - `provider`: Track resolution and stream acquisition
/// - `spotify`: Spotify link cross-referencing
/// - `store`: Saved playlists
///
/// ## Thread Safety
///
/// All fields are wrapped in appropriate synchronization primitives:
/// - [`Arc`] for shared ownership
/// - [`DashMap`] for concurrent per-guild maps
pub struct OpenMusicBot {
    /// Bot configuration loaded from environment variables
    pub(crate) config: Arc<Config>,
    /// Explicit owner of every guild session
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) provider: Arc<dyn ResolutionProvider>,
    pub(crate) spotify: Arc<SpotifyClient>,
    pub(crate) store: Arc<dyn PlaylistStore>,
    /// Text channel of the last command per guild, used for announcements
    text_channels: Arc<DashMap<GuildId, ChannelId>>,
    /// Session each announcer task is attached to
    announcers: DashMap<GuildId, Weak<Session>>,
    /// Pending auto-leave timers per guild
    alone_timers: Arc<DashMap<GuildId, CancellationToken>>,
}

impl OpenMusicBot {
    /// Creates a new instance of the Open Music Bot.
    ///
    /// # Arguments
    ///
    /// * `config` - Bot configuration (Discord token, limits, timeouts)
    /// * `registry` - Session registry shared with the shutdown handler
    /// * `provider` - Resolution provider used for `/play` and `/search`
    /// * `spotify` - Spotify client (may be disabled)
    /// * `store` - Playlist persistence
    pub fn new(
        config: Config,
        registry: Arc<SessionRegistry>,
        provider: Arc<dyn ResolutionProvider>,
        spotify: Arc<SpotifyClient>,
        store: Arc<dyn PlaylistStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            provider,
            spotify,
            store,
            text_channels: Arc::new(DashMap::new()),
            announcers: DashMap::new(),
            alone_timers: Arc::new(DashMap::new()),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands can be registered globally (visible in all servers) or per-guild
    /// (faster updates, useful for development). The registration strategy is
    /// determined by the `guild_id` configuration option.
    ///
    /// # Command Registration Timing
    ///
    /// - **Guild commands**: ~1 second propagation time
    /// - **Global commands**: ~1 hour propagation time
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Returns the guild's session, creating it on first use.
    ///
    /// The first time a given session is seen, an announcer task is attached
    /// to its event stream so track changes are posted in the guild's text
    /// channel.
    pub(crate) fn session(&self, ctx: &Context, guild_id: GuildId) -> Arc<Session> {
        let session = self.registry.get_or_create(guild_id);

        let attached = self
            .announcers
            .get(&guild_id)
            .is_some_and(|known| Weak::ptr_eq(known.value(), &Arc::downgrade(&session)));
        if !attached {
            self.announcers.insert(guild_id, Arc::downgrade(&session));
            tokio::spawn(events::run_announcer(
                ctx.http.clone(),
                guild_id,
                session.subscribe(),
                self.text_channels.clone(),
            ));
        }

        session
    }

    pub(crate) fn remember_text_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.text_channels.insert(guild_id, channel_id);
    }

    /// Makes sure the bot is in a voice channel of the guild.
    ///
    /// If it is not connected yet, it joins the voice channel of `user_id`.
    pub(crate) async fn ensure_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        if let Some(call) = manager.get(guild_id) {
            if call.lock().await.current_channel().is_some() {
                return Ok(());
            }
        }

        let channel_id = get_user_voice_channel(ctx, guild_id, user_id)?;
        self.join_voice_channel(ctx, guild_id, channel_id).await
    }

    /// Connects the bot to a voice channel.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        match manager.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al obtener handler de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Disconnects the bot from a voice channel.
    ///
    /// # Side Effects
    ///
    /// - Destroys the guild's session (stops playback, drops the queue)
    /// - Cancels any pending auto-leave timer
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        leave_guild(ctx, &self.registry, &self.alone_timers, guild_id).await
    }

    /// Starts or cancels the auto-leave timer depending on who is left in
    /// the bot's voice channel.
    async fn check_alone(&self, ctx: &Context, guild_id: GuildId) {
        let Some(manager) = songbird::get(ctx).await else {
            return;
        };
        let Some(call) = manager.get(guild_id) else {
            return;
        };
        let Some(channel_id) = call.lock().await.current_channel() else {
            return;
        };
        let channel_id = ChannelId::from(channel_id.0);
        let bot_id = ctx.cache.current_user().id;

        if listeners_in_channel(ctx, guild_id, channel_id, bot_id) > 0 {
            if let Some((_, timer)) = self.alone_timers.remove(&guild_id) {
                debug!("Auto-desconexión cancelada en guild {}", guild_id);
                timer.cancel();
            }
            return;
        }

        if self.alone_timers.contains_key(&guild_id) {
            return;
        }

        let timer = CancellationToken::new();
        self.alone_timers.insert(guild_id, timer.clone());
        info!(
            "🚪 Programando auto-desconexión por inactividad en guild {} ({})",
            guild_id,
            humantime::format_duration(self.config.alone_timeout)
        );

        let ctx = ctx.clone();
        let registry = self.registry.clone();
        let timers = self.alone_timers.clone();
        let delay = self.config.alone_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    info!("🚪 Bot solo en el canal, desconectando de guild {}", guild_id);
                    if let Err(e) = leave_guild(&ctx, &registry, &timers, guild_id).await {
                        warn!("⚠️ Error en auto-desconexión: {:?}", e);
                    }
                }
            }
        });
    }
}

/// Destroys the session and leaves the voice channel
async fn leave_guild(
    ctx: &Context,
    registry: &SessionRegistry,
    alone_timers: &DashMap<GuildId, CancellationToken>,
    guild_id: GuildId,
) -> Result<()> {
    if let Some((_, timer)) = alone_timers.remove(&guild_id) {
        timer.cancel();
    }
    registry.destroy(guild_id).await;

    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
    if manager.get(guild_id).is_some() {
        manager.remove(guild_id).await?;
    }

    info!("👋 Desconectado del canal de voz en guild {}", guild_id);
    Ok(())
}

/// Canal de voz en el que está el usuario
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

/// Usuarios (sin contar bots) conectados a `channel_id`
fn listeners_in_channel(
    ctx: &Context,
    guild_id: GuildId,
    channel_id: ChannelId,
    bot_id: UserId,
) -> usize {
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| {
            state
                .member
                .as_ref()
                .map_or(true, |member| !member.user.bot)
        })
        .count()
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    /// Called when the bot is ready and connected to Discord.
    ///
    /// Registers slash commands (global or per-guild) and logs connection
    /// information.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Handles incoming Discord interactions.
    ///
    /// Only slash commands are processed; every command is deferred and
    /// answered by editing the deferred response with an embed.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Handles voice state updates for users and the bot.
    ///
    /// # Behaviors
    ///
    /// - **Bot disconnected**: Destroys the guild's session
    /// - **Bot alone**: Schedules auto-disconnect after `ALONE_TIMEOUT_SECS`
    /// - **Users join**: Cancels a pending auto-disconnect
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id && old.is_some() && new.channel_id.is_none() {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            if let Some((_, timer)) = self.alone_timers.remove(&guild_id) {
                timer.cancel();
            }
            self.registry.destroy(guild_id).await;
            return;
        }

        self.check_alone(&ctx, guild_id).await;
    }
}
