//! # Minigame Client
//!
//! The player side of a classroom game session. A host machine runs the session and publishes its
//! orders in a file; every player runs this client, which:
//!
//! - announces the player in the lobby (`Join`) and waits for the host's `Accepted` order,
//! - polls the host's order feed over SFTP,
//! - launches the mini-game assigned for each round, after any `Sabotage` delay,
//! - plays the final game when the session reaches its `Final` stage,
//! - pushes its event log back to the host after every event and every game.
//!
//! The mini-games are external programs. They append their results to the same event log as the
//! client, so the host receives everything in a single `player_<id>.log` file.
//!
//! # Documentation Overview
//!
//! - The protocol itself lives in [`dispatcher`], see [`Dispatcher`](crate::dispatcher::Dispatcher).
//! - Settings and their `CLIENT_*` environment variables are in [`configuration`].
//! - The format of host orders is described in [`order_feed`].
//! - Which program is started for a game id is decided by the [`catalog`].
//!
//! # Usage Example
//!
//! ```no_run
//! use minigame_client::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new("7")
//!         .with_host("192.168.0.24", 22)
//!         .with_credentials("host-user", "secret")
//!         .with_remote_dirs("/home/host/Game_App/Player_logs", None);
//!
//!     Dispatcher::from_config(&config)?.run();
//!     Ok(())
//! }
//! ```
//!
//! The network, the games and the waits are behind traits
//! ([`SyncChannel`](crate::sync_channel::SyncChannel),
//! [`ProgramRunner`](crate::launcher::ProgramRunner), [`Sleeper`](crate::pacing::Sleeper)), so a
//! whole session can be replayed without a host nor any game installed.
#![warn(missing_docs)]

pub use anyhow;
pub mod catalog;
pub mod configuration;
pub mod dispatcher;
pub mod event_log;
pub mod launcher;
mod logger;
pub mod order_feed;
pub mod pacing;
pub mod sync_channel;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use minigame_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::catalog::{GameCatalog, GameId};
    pub use crate::configuration::Configuration;
    pub use crate::dispatcher::{Dispatcher, Stage};
    pub use crate::event_log::{EventLog, LogEntry};
    pub use crate::launcher::{ProgramRunner, ProcessRunner};
    pub use crate::pacing::{Sleeper, ThreadSleeper};
    pub use crate::sync_channel::{SftpChannel, SyncChannel};
}
