//! IRC relay channel.
//!
//! [`RelayClient`] registers a nick, joins one channel and turns every
//! summary it receives into a `TOPIC` update. Disconnects, nick collisions
//! and forced channel removal all funnel into one reconnect path guarded by a
//! randomized exponential [`Backoff`].
//!
//! ```ignore
//! let (summary_tx, summary_rx) = tokio::sync::mpsc::channel(32);
//! let cancel = CancellationToken::new();
//! let client = RelayClient::new(IrcConfig::new("irc.libera.chat:6667", "hub", "#sensors"), summary_rx, cancel.clone());
//! tokio::spawn(client.run());
//! summary_tx.send("!pre /63 380 60 70/  1  Nov16 23:43".into()).await?;
//! ```

pub mod backoff;
pub mod client;
pub mod error;
pub mod line;

pub use backoff::Backoff;
pub use client::{IrcConfig, RelayClient, Session, SessionState};
pub use error::Disconnect;
