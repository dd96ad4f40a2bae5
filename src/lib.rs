//! Per-guild playback session engine for the Open Music Discord bot.
//!
//! - [`audio`]: queue, playback controller, sessions and their registry
//! - [`sources`]: track model, provider/sink contracts, yt-dlp and Spotify adapters
//! - [`storage`]: saved playlists
//! - [`bot`]: serenity front end
//! - [`ui`]: embeds and text formatting

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;
