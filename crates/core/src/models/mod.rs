//! Data models for Tally

mod participant;
mod room;
mod round;

pub use participant::*;
pub use room::*;
pub use round::*;
