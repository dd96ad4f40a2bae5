use anyhow::{Context as _, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use open_music_engine::{
    audio::{SessionOptions, SessionRegistry},
    bot::OpenMusicBot,
    config::Config,
    sources::{SpotifyClient, YtDlpProvider},
    storage::JsonPlaylistStore,
};

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_engine=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("No se pudo crear el runtime de tokio")?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return runtime.block_on(health_check());
    }

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    if let Err(e) = YtDlpProvider::verify_dependencies().await {
        warn!("⚠️ Dependencias de audio incompletas: {:#}", e);
    }

    let songbird = Songbird::serenity();
    let provider = Arc::new(YtDlpProvider::new(songbird.clone()));
    let registry = Arc::new(SessionRegistry::new(
        provider.clone(),
        SessionOptions::from(&config),
    ));

    // Inicializar almacenamiento de playlists
    let store = Arc::new(
        JsonPlaylistStore::new(config.data_dir.join("playlists"), config.max_playlist_size).await?,
    );

    let spotify = Arc::new(SpotifyClient::new(
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
    )?);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let handler = OpenMusicBot::new(config, registry.clone(), provider, spotify, store);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    YtDlpProvider::verify_dependencies().await?;
    println!("OK");
    Ok(())
}
