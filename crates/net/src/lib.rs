//! Tally Network Library
//!
//! TCP transport and session engine for estimation rooms.
//!
//! # Architecture
//!
//! - **Server**: the long-running gateway; owns the room registry, binds
//!   connections to participants, and fans snapshots out per room
//! - **Client**: thin connection handle (used by tests and tooling)
//! - **Protocol**: length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(4641).await?;
//!
//! let mut client = Client::connect(server.local_addr()).await?;
//! client
//!     .send(&ClientMessage::Join {
//!         room_id: "R1".into(),
//!         display_name: "alice".into(),
//!     })
//!     .await?;
//!
//! while let Ok(msg) = client.next_message().await {
//!     match msg {
//!         ServerMessage::RoundSnapshot(round) => { /* render */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod registry;
pub mod server;

pub use client::Client;
pub use error::{Error, Result};
pub use protocol::{ClientMessage, ErrorKind, ParticipantInfo, RoundView, ServerMessage};
pub use registry::{RoomEntry, RoomRegistry, RoundTimer};
pub use server::Server;

/// Default port for Tally servers
pub const DEFAULT_PORT: u16 = 4641;
