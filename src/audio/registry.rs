use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::session::{Session, SessionOptions},
    sources::ResolutionProvider,
};

/// Resumen de las sesiones vivas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub sessions: usize,
    /// Sesiones con la cola no vacía
    pub active: usize,
    pub playing: usize,
    pub queued_tracks: usize,
}

/// Dueño de una sesión por servidor. Es el único estado compartido entre guilds.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    provider: Arc<dyn ResolutionProvider>,
    options: SessionOptions,
}

impl SessionRegistry {
    pub fn new(provider: Arc<dyn ResolutionProvider>, options: SessionOptions) -> Self {
        Self {
            sessions: DashMap::new(),
            provider,
            options,
        }
    }

    /// Obtiene la sesión del servidor o crea una vacía
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Session> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                Session::spawn(guild_id, self.provider.clone(), self.options.clone())
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
    }

    /// Detiene la sesión y la elimina; `false` si no existía
    pub async fn destroy(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.get(guild_id) else {
            debug!("No hay sesión que destruir para guild {}", guild_id);
            return false;
        };

        session.shutdown().await;

        let removed = self
            .sessions
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &session))
            .is_some();
        if removed {
            info!("🗑️ Sesión eliminada para guild {}", guild_id);
        }
        removed
    }

    /// Servidores con canciones en cola
    pub fn list_active(&self) -> Vec<GuildId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().queue_len() > 0)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.sessions
            .iter()
            .fold(RegistryStats::default(), |mut stats, entry| {
                let session = entry.value();
                let queued = session.queue_len();
                stats.sessions += 1;
                stats.queued_tracks += queued;
                if queued > 0 {
                    stats.active += 1;
                }
                if session.status().is_active() {
                    stats.playing += 1;
                }
                stats
            })
    }

    /// Destruye todas las sesiones (apagado del proceso)
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        info!("🛑 Cerrando {} sesiones", guilds.len());

        for guild_id in guilds {
            self.destroy(guild_id).await;
        }
    }
}
