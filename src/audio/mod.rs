//! # Audio Module
//!
//! Per-guild playback session engine for Open Music Bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - Ordered tracks with a cursor that always names the current track
//! - Repeat (off / track / queue), shuffle, move and remove with the current
//!   track pinned in place
//! - Session settings: volume, speed, filters, autoplay
//!
//! ### [`player`] - Playback Controller
//! - `Idle` / `Playing` / `Paused` state machine around a single active sink
//! - Generation counter so late sink events from replaced streams are dropped
//! - Playback clock for resuming at the current position
//!
//! ### [`session`] - Session
//! - Serialized command stream per guild (queue + controller)
//! - Stream acquisition with timeouts, cancellation and error recovery
//! - Autoplay expansion when the queue runs out
//!
//! ### [`registry`] - Session Registry
//! - One session per guild in a sharded map
//!
//! ### [`effects`] / [`equalizer`] - Audio Processing
//! - Speed, bass boost and equalizer presets rendered as ffmpeg filter chains
//!
//! ### [`transport`] - Voice Transport
//! - Songbird track handles wrapped as sinks
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_engine::audio::{registry::SessionRegistry, session::SessionOptions};
//! use open_music_engine::sources::{ResolutionProvider, Track};
//! use serenity::all::{GuildId, UserId};
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn ResolutionProvider>) -> anyhow::Result<()> {
//! let registry = SessionRegistry::new(provider, SessionOptions::default());
//! let session = registry.get_or_create(GuildId::new(123456789));
//!
//! session
//!     .enqueue(Track::new("Song", "https://youtu.be/abc", UserId::new(1)))
//!     .await?;
//! session.pause().await?;
//! session.resume().await?;
//! session.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod effects;
pub mod equalizer;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;

pub use player::PlaybackStatus;
pub use queue::{MusicQueue, QueueEntry, QueuePage, RepeatMode};
pub use registry::{RegistryStats, SessionRegistry};
pub use session::{Enqueued, PlayerEvent, Session, SessionOptions, SessionSnapshot};
