//! Game discovery over the overlay
//!
//! Two halves of the same conversation: the [`ProbeEngine`] asks every
//! peer what it is hosting, the [`Responder`] answers the same question
//! when a peer asks us.

mod probe;
mod responder;

pub use probe::ProbeEngine;
pub use responder::Responder;
