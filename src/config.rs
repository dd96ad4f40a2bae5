use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

/// Límite superior de canciones por expansión de autoplay
const MAX_AUTOPLAY_BATCH: usize = 25;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>,

    // Audio
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub autoplay_batch: usize,

    // Tiempos de espera
    pub acquire_timeout: Duration,
    pub search_timeout: Duration,
    pub alone_timeout: Duration,

    // Rendimiento
    pub worker_threads: usize,

    // Paths
    pub data_dir: PathBuf,

    // APIs (Opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    /// Carga `.env` y luego las variables de entorno del proceso
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("No se pudo crear el directorio {}", config.data_dir.display())
        })?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de claves.
    ///
    /// Los valores vacíos cuentan como ausentes. La configuración resultante ya
    /// está validada.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            guild_id: get("GUILD_ID")
                .map(|raw| {
                    raw.trim()
                        .parse()
                        .with_context(|| format!("GUILD_ID inválido ('{}')", raw))
                })
                .transpose()?,

            // Audio
            default_volume: setting(&get, "DEFAULT_VOLUME", 50)?,
            max_queue_size: setting(&get, "MAX_QUEUE_SIZE", 100)?,
            max_playlist_size: setting(&get, "MAX_PLAYLIST_SIZE", 50)?,
            autoplay_batch: setting(&get, "AUTOPLAY_BATCH", 5)?,

            // Tiempos de espera
            acquire_timeout: Duration::from_secs(setting(&get, "ACQUIRE_TIMEOUT_SECS", 20)?),
            search_timeout: Duration::from_secs(setting(&get, "SEARCH_TIMEOUT_SECS", 15)?),
            alone_timeout: Duration::from_secs(setting(&get, "ALONE_TIMEOUT_SECS", 30)?),

            // Rendimiento
            worker_threads: setting(&get, "WORKER_THREADS", num_cpus::get())?,

            // Paths
            data_dir: get("DATA_DIR")
                .unwrap_or_else(|| "./data".to_string())
                .into(),

            // APIs
            spotify_client_id: get("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: get("SPOTIFY_CLIENT_SECRET"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Queue and playlist sizes must be greater than 0
    /// - Timeouts must be greater than 0
    /// - Autoplay batch must be between 1 and 25
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!(
                "Default volume must be between 0 and 100, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.acquire_timeout.is_zero() || self.search_timeout.is_zero() {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        if self.autoplay_batch == 0 || self.autoplay_batch > MAX_AUTOPLAY_BATCH {
            anyhow::bail!(
                "Autoplay batch must be between 1 and {}, got: {}",
                MAX_AUTOPLAY_BATCH,
                self.autoplay_batch
            );
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token and Spotify credentials.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: {}\n  \
            Audio: {}% vol, {} queue, {} playlist, autoplay batch {}\n  \
            Timeouts: acquire {}, search {}, alone {}\n  \
            Runtime: {} workers, data in {}\n  \
            Spotify: {}",
            match self.guild_id {
                Some(guild) => format!("guild {}", guild),
                None => "global".to_string(),
            },
            self.default_volume,
            self.max_queue_size,
            self.max_playlist_size,
            self.autoplay_batch,
            humantime::format_duration(self.acquire_timeout),
            humantime::format_duration(self.search_timeout),
            humantime::format_duration(self.alone_timeout),
            self.worker_threads,
            self.data_dir.display(),
            if self.spotify_enabled() { "enabled" } else { "disabled" },
        )
    }
}

/// Lee y parsea una clave, usando `default` si no está definida
fn setting<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} inválido ('{}'): {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            // Audio defaults
            default_volume: 50,
            max_queue_size: 100,
            max_playlist_size: 50,
            autoplay_batch: 5,

            // Timeout defaults
            acquire_timeout: Duration::from_secs(20),
            search_timeout: Duration::from_secs(15),
            alone_timeout: Duration::from_secs(30),

            // Performance defaults
            worker_threads: num_cpus::get(),

            // Path defaults
            data_dir: "./data".into(),

            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();

        assert_eq!(config.guild_id, None);
        assert_eq!(config.default_volume, 50);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.max_playlist_size, 50);
        assert_eq!(config.acquire_timeout, Duration::from_secs(20));
        assert_eq!(config.search_timeout, Duration::from_secs(15));
        assert_eq!(config.alone_timeout, Duration::from_secs(30));
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert!(!config.spotify_enabled());
    }

    #[test]
    fn token_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "123456789"),
            ("DEFAULT_VOLUME", "80"),
            ("AUTOPLAY_BATCH", "10"),
            ("ACQUIRE_TIMEOUT_SECS", "5"),
            ("WORKER_THREADS", "2"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.guild_id, Some(123456789));
        assert_eq!(config.default_volume, 80);
        assert_eq!(config.autoplay_batch, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.worker_threads, 2);
        assert!(config.spotify_enabled());
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            ("DEFAULT_VOLUME", "150"),
            ("DEFAULT_VOLUME", "loud"),
            ("MAX_QUEUE_SIZE", "0"),
            ("AUTOPLAY_BATCH", "0"),
            ("AUTOPLAY_BATCH", "26"),
            ("SEARCH_TIMEOUT_SECS", "0"),
            ("GUILD_ID", "abc"),
        ] {
            let result = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc"), (key, value)]));
            assert!(result.is_err(), "{}={} debería ser inválido", key, value);
        }
    }

    #[test]
    fn summary_hides_secrets() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "super-secret-token"),
            ("SPOTIFY_CLIENT_SECRET", "spotify-secret"),
        ]))
        .unwrap();

        let summary = config.summary();
        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("spotify-secret"));
        assert!(summary.contains("50% vol"));
    }
}
