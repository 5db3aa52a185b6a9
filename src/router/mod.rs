//! In-process message routing.
//!
//! [`LocalMessageRouter`] delivers frozen messages straight to the
//! dispatcher that serves the recipient. Unicast messages go to one next
//! hop; multicasts go to every subscriber whose registered pattern matches
//! the multicast id.

pub mod engine;
pub mod receivers;

pub use engine::LocalMessageRouter;
pub use receivers::{MulticastReceivers, ParticipantId};
