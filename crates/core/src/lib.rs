//! Tally Core Library
//!
//! Data model and state machine for collaborative estimation sessions:
//! rooms, participants, voting rounds, and the card deck. Pure logic only;
//! networking lives in `tally-net`.

pub mod deck;
pub mod error;
pub mod invariants;
pub mod models;

pub use deck::{Deck, VoteValue};
pub use error::{Error, Result};
pub use models::*;
