use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::{stream, StreamExt};
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ResolutionProvider, SpotifyReference, Track};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Canciones leídas de una playlist de Spotify
const PLAYLIST_LIMIT: usize = 50;

/// El token se renueva un minuto antes de expirar
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Búsquedas simultáneas al resolver una playlist
const RESOLVE_CONCURRENCY: usize = 3;

/// Enlace de Spotify reconocido
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyLink {
    Track(String),
    Playlist(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
    artists: Vec<ApiArtist>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

impl From<ApiTrack> for SpotifyReference {
    fn from(track: ApiTrack) -> Self {
        Self {
            artist: track
                .artists
                .into_iter()
                .next()
                .map(|artist| artist.name)
                .unwrap_or_default(),
            name: track.name,
            url: track.external_urls.and_then(|urls| urls.spotify),
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Referencias cruzadas de enlaces de Spotify a búsquedas en el proveedor
pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    token: Mutex<Option<CachedToken>>,
    track_pattern: Regex,
    playlist_pattern: Regex,
}

impl SpotifyClient {
    pub fn new(client_id: Option<String>, client_secret: Option<String>) -> Result<Self> {
        let credentials = client_id.zip(client_secret);
        if credentials.is_none() {
            info!("🟢 Spotify deshabilitado (sin credenciales)");
        }

        Ok(Self {
            http: reqwest::Client::new(),
            credentials,
            token: Mutex::new(None),
            track_pattern: Regex::new(r"open\.spotify\.com/(?:intl-[a-z]+/)?track/([A-Za-z0-9]+)")?,
            playlist_pattern: Regex::new(
                r"open\.spotify\.com/(?:intl-[a-z]+/)?playlist/([A-Za-z0-9]+)",
            )?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Reconoce enlaces de tracks y playlists
    pub fn parse_link(&self, url: &str) -> Option<SpotifyLink> {
        if let Some(caps) = self.track_pattern.captures(url) {
            return Some(SpotifyLink::Track(caps[1].to_string()));
        }
        self.playlist_pattern
            .captures(url)
            .map(|caps| SpotifyLink::Playlist(caps[1].to_string()))
    }

    /// Consulta de búsqueda para encontrar la canción en el proveedor
    pub fn search_query(reference: &SpotifyReference) -> String {
        format!("{} {}", reference.artist, reference.name)
            .trim()
            .to_string()
    }

    /// Lee las canciones a las que apunta un enlace
    pub async fn references(&self, url: &str) -> Result<Vec<SpotifyReference>> {
        let link = self
            .parse_link(url)
            .context("El enlace no es un track ni una playlist de Spotify")?;

        match link {
            SpotifyLink::Track(id) => {
                let track: ApiTrack = self
                    .get_json(&format!("{}/tracks/{}", API_URL, urlencoding::encode(&id)))
                    .await?;
                Ok(vec![track.into()])
            }
            SpotifyLink::Playlist(id) => {
                let page: PlaylistPage = self
                    .get_json(&format!(
                        "{}/playlists/{}/tracks?limit={}",
                        API_URL,
                        urlencoding::encode(&id),
                        PLAYLIST_LIMIT
                    ))
                    .await?;
                Ok(page
                    .items
                    .into_iter()
                    .filter_map(|item| item.track)
                    .map(SpotifyReference::from)
                    .collect())
            }
        }
    }

    /// Resuelve un enlace a tracks del proveedor, conservando el orden
    pub async fn resolve_tracks(
        &self,
        provider: &dyn ResolutionProvider,
        url: &str,
        requested_by: UserId,
    ) -> Result<Vec<Track>> {
        let references = self.references(url).await?;
        info!("🟢 Spotify: resolviendo {} canciones", references.len());

        let tracks: Vec<Track> = stream::iter(references)
            .map(|reference| async move {
                let query = Self::search_query(&reference);
                match provider.resolve(&query, requested_by).await {
                    Ok(Some(track)) => Some(track.with_spotify(reference)),
                    Ok(None) => {
                        debug!("Sin resultados para '{}'", query);
                        None
                    }
                    Err(e) => {
                        warn!("⚠️ No se pudo resolver '{}': {:?}", query, e);
                        None
                    }
                }
            })
            .buffered(RESOLVE_CONCURRENCY)
            .filter_map(|track| async move { track })
            .collect()
            .await;

        Ok(tracks)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Error al conectar con Spotify")?
            .error_for_status()
            .context("Spotify rechazó la consulta")?;

        response
            .json()
            .await
            .context("Error al parsear respuesta de Spotify")
    }

    /// Token de aplicación (client credentials), cacheado hasta poco antes de expirar
    async fn access_token(&self) -> Result<String> {
        let (client_id, client_secret) = self
            .credentials
            .as_ref()
            .context("Spotify no está configurado (SPOTIFY_CLIENT_ID / SPOTIFY_CLIENT_SECRET)")?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let basic = BASE64.encode(format!("{}:{}", client_id, client_secret));
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header(AUTHORIZATION, format!("Basic {}", basic))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .context("Error al conectar con Spotify")?
            .error_for_status()
            .context("Credenciales de Spotify inválidas")?
            .json()
            .await
            .context("Error al parsear el token de Spotify")?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_MARGIN);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SpotifyClient {
        SpotifyClient::new(None, None).unwrap()
    }

    #[test]
    fn recognises_track_and_playlist_links() {
        let client = client();
        assert_eq!(
            client.parse_link("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=x"),
            Some(SpotifyLink::Track("4uLU6hMCjMI75M1A2tKUQC".into()))
        );
        assert_eq!(
            client.parse_link("https://open.spotify.com/intl-es/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            Some(SpotifyLink::Playlist("37i9dQZF1DXcBWIGoYBM5M".into()))
        );
        assert_eq!(client.parse_link("https://youtu.be/abc"), None);
    }

    #[test]
    fn search_query_puts_artist_first() {
        let reference = SpotifyReference {
            name: "Bohemian Rhapsody".into(),
            artist: "Queen".into(),
            url: None,
        };
        assert_eq!(SpotifyClient::search_query(&reference), "Queen Bohemian Rhapsody");
    }

    #[tokio::test]
    async fn links_fail_without_credentials() {
        let client = client();
        assert!(!client.is_enabled());
        let err = client
            .references("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Spotify no está configurado"));
    }
}
