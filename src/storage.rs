use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{GuildId, UserId};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::{
    error::{PlayerError, PlayerResult},
    sources::{SpotifyReference, Track},
};

/// Caracteres que no pueden aparecer en el nombre de archivo
const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Track tal como se guarda en disco; nunca incluye quién lo pidió
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub title: String,
    pub url: String,
    pub duration: u64,
    pub thumbnail: Option<String>,
    pub author: Option<String>,
    pub spotify: Option<SpotifyReference>,
}

impl From<&Track> for StoredTrack {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title().to_string(),
            url: track.url().to_string(),
            duration: track.duration(),
            thumbnail: track.thumbnail().map(str::to_string),
            author: track.author().map(str::to_string),
            spotify: track.spotify().cloned(),
        }
    }
}

/// Playlist guardada de un servidor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub guild_id: u64,
    pub tracks: Vec<StoredTrack>,
    pub created_by: u64,
    pub created_by_tag: String,
    pub created_at: DateTime<Utc>,
    pub total_duration: u64,
}

impl Playlist {
    /// Convierte la playlist en tracks pedidos por `requested_by`
    pub fn to_tracks(&self, requested_by: UserId) -> Vec<Track> {
        self.tracks
            .iter()
            .map(|stored| {
                let mut track = Track::new(&stored.title, &stored.url, requested_by)
                    .with_duration(stored.duration)
                    .from_playlist(&self.name);
                if let Some(thumbnail) = &stored.thumbnail {
                    track = track.with_thumbnail(thumbnail);
                }
                if let Some(author) = &stored.author {
                    track = track.with_author(author);
                }
                if let Some(reference) = &stored.spotify {
                    track = track.with_spotify(reference.clone());
                }
                track
            })
            .collect()
    }
}

/// Resumen para listar playlists
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSummary {
    pub name: String,
    pub track_count: usize,
    pub created_by_tag: String,
    pub created_at: DateTime<Utc>,
    pub total_duration: u64,
}

/// Usuario que guarda una playlist
#[derive(Debug, Clone)]
pub struct PlaylistOwner {
    pub id: UserId,
    pub tag: String,
}

/// Almacenamiento durable de playlists
#[async_trait]
pub trait PlaylistStore: Send + Sync {
    async fn save(
        &self,
        guild_id: GuildId,
        name: &str,
        tracks: &[Track],
        owner: &PlaylistOwner,
    ) -> PlayerResult<Playlist>;

    async fn load(&self, guild_id: GuildId, name: &str) -> PlayerResult<Playlist>;

    async fn list(&self, guild_id: GuildId) -> PlayerResult<Vec<PlaylistSummary>>;

    /// Solo el creador puede eliminar la playlist
    async fn delete(
        &self,
        guild_id: GuildId,
        name: &str,
        requester: UserId,
    ) -> PlayerResult<Playlist>;
}

/// Playlists en archivos JSON `<dir>/<guild>_<nombre>.json`
pub struct JsonPlaylistStore {
    dir: PathBuf,
    max_playlist_size: usize,
}

impl JsonPlaylistStore {
    pub async fn new(dir: impl Into<PathBuf>, max_playlist_size: usize) -> PlayerResult<Self> {
        let dir = dir.into();
        // Crear directorio de datos si no existe
        fs::create_dir_all(&dir).await?;

        info!("📁 Playlists en: {}", dir.display());
        Ok(Self {
            dir,
            max_playlist_size,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn playlist_path(&self, guild_id: GuildId, name: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", guild_id, name))
    }

    async fn read_playlist(path: &Path) -> PlayerResult<Playlist> {
        let data = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn read_existing(&self, guild_id: GuildId, name: &str) -> PlayerResult<(PathBuf, Playlist)> {
        let name = sanitize_name(name)?;
        let path = self.playlist_path(guild_id, &name);
        if !fs::try_exists(&path).await? {
            return Err(PlayerError::NotFound(format!("playlist '{}'", name)));
        }
        let playlist = Self::read_playlist(&path).await?;
        Ok((path, playlist))
    }
}

#[async_trait]
impl PlaylistStore for JsonPlaylistStore {
    async fn save(
        &self,
        guild_id: GuildId,
        name: &str,
        tracks: &[Track],
        owner: &PlaylistOwner,
    ) -> PlayerResult<Playlist> {
        let name = sanitize_name(name)?;
        if tracks.is_empty() {
            return Err(PlayerError::InvalidArgument(
                "no hay canciones para guardar".to_string(),
            ));
        }

        let kept = tracks.len().min(self.max_playlist_size);
        if kept < tracks.len() {
            warn!(
                "⚠️ Playlist '{}' recortada a {} canciones",
                name, self.max_playlist_size
            );
        }

        let stored: Vec<StoredTrack> = tracks[..kept].iter().map(StoredTrack::from).collect();
        let playlist = Playlist {
            total_duration: stored.iter().map(|track| track.duration).sum(),
            name: name.clone(),
            guild_id: guild_id.get(),
            tracks: stored,
            created_by: owner.id.get(),
            created_by_tag: owner.tag.clone(),
            created_at: Utc::now(),
        };

        let path = self.playlist_path(guild_id, &name);
        fs::write(&path, serde_json::to_string_pretty(&playlist)?).await?;

        info!("💾 Playlist guardada: {} para guild {}", name, guild_id);
        Ok(playlist)
    }

    async fn load(&self, guild_id: GuildId, name: &str) -> PlayerResult<Playlist> {
        let (_, playlist) = self.read_existing(guild_id, name).await?;
        info!("📂 Playlist cargada: {} para guild {}", playlist.name, guild_id);
        Ok(playlist)
    }

    async fn list(&self, guild_id: GuildId) -> PlayerResult<Vec<PlaylistSummary>> {
        let prefix = format!("{}_", guild_id);
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut summaries = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.starts_with(&prefix) || !file_name.ends_with(".json") {
                continue;
            }

            match Self::read_playlist(&entry.path()).await {
                Ok(playlist) => summaries.push(PlaylistSummary {
                    track_count: playlist.tracks.len(),
                    name: playlist.name,
                    created_by_tag: playlist.created_by_tag,
                    created_at: playlist.created_at,
                    total_duration: playlist.total_duration,
                }),
                Err(e) => warn!("⚠️ No se pudo leer la playlist {}: {}", file_name, e),
            }
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn delete(
        &self,
        guild_id: GuildId,
        name: &str,
        requester: UserId,
    ) -> PlayerResult<Playlist> {
        let (path, playlist) = self.read_existing(guild_id, name).await?;
        if playlist.created_by != requester.get() {
            return Err(PlayerError::NotOwner(playlist.name));
        }

        fs::remove_file(&path).await?;
        info!("🗑️ Playlist eliminada: {} para guild {}", playlist.name, guild_id);
        Ok(playlist)
    }
}

/// Quita los caracteres inválidos para un nombre de archivo
pub fn sanitize_name(name: &str) -> PlayerResult<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_NAME_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Err(PlayerError::InvalidArgument(
            "nombre de playlist inválido".to_string(),
        ));
    }
    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn owner(id: u64) -> PlaylistOwner {
        PlaylistOwner {
            id: UserId::new(id),
            tag: format!("user#{id}"),
        }
    }

    fn tracks(count: usize) -> Vec<Track> {
        (0..count)
            .map(|i| {
                Track::new(format!("Song {i}"), format!("https://youtu.be/{i}"), UserId::new(9))
                    .with_duration(100)
            })
            .collect()
    }

    async fn store(max: usize) -> (tempfile::TempDir, JsonPlaylistStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPlaylistStore::new(dir.path(), max).await.unwrap();
        (dir, store)
    }

    #[test]
    fn strips_invalid_characters() {
        assert_eq!(sanitize_name(" my/fav:mix? ").unwrap(), "myfavmix");
        assert!(matches!(
            sanitize_name("<>|"),
            Err(PlayerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn save_then_load_stamps_loading_user() {
        let (_dir, store) = store(50).await;
        let guild = GuildId::new(1);

        let saved = store.save(guild, "favs", &tracks(3), &owner(7)).await.unwrap();
        assert_eq!(saved.total_duration, 300);
        assert_eq!(saved.created_by, 7);

        let loaded = store.load(guild, "favs").await.unwrap();
        assert_eq!(loaded, saved);

        let restored = loaded.to_tracks(UserId::new(42));
        assert_eq!(restored.len(), 3);
        assert_eq!(restored[0].requested_by(), UserId::new(42));
        assert_eq!(restored[0].loaded_from_playlist(), Some("favs"));
    }

    #[tokio::test]
    async fn save_keeps_only_max_playlist_size() {
        let (_dir, store) = store(2).await;
        let saved = store
            .save(GuildId::new(1), "big", &tracks(5), &owner(7))
            .await
            .unwrap();
        assert_eq!(saved.tracks.len(), 2);
    }

    #[tokio::test]
    async fn missing_playlist_is_not_found() {
        let (_dir, store) = store(50).await;
        assert!(matches!(
            store.load(GuildId::new(1), "nope").await,
            Err(PlayerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_creator_can_delete() {
        let (_dir, store) = store(50).await;
        let guild = GuildId::new(1);
        store.save(guild, "mine", &tracks(1), &owner(7)).await.unwrap();

        assert_eq!(
            store.delete(guild, "mine", UserId::new(8)).await,
            Err(PlayerError::NotOwner("mine".to_string()))
        );
        assert!(store.delete(guild, "mine", UserId::new(7)).await.is_ok());
        assert!(matches!(
            store.load(guild, "mine").await,
            Err(PlayerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_scoped_to_guild_and_skips_broken_files() {
        let (dir, store) = store(50).await;
        store.save(GuildId::new(1), "b", &tracks(2), &owner(7)).await.unwrap();
        store.save(GuildId::new(1), "a", &tracks(1), &owner(7)).await.unwrap();
        store.save(GuildId::new(2), "other", &tracks(1), &owner(7)).await.unwrap();
        std::fs::write(dir.path().join("1_broken.json"), "{ not json").unwrap();

        let names: Vec<String> = store
            .list(GuildId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|summary| summary.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
