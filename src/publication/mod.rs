//! Provider-side subscription lifecycle.
//!
//! Every subscription id moves through *queued* (provider not registered
//! yet), *active* (listener registered and/or periodic polling scheduled)
//! and *ended* (expired, stopped, provider removed or manager shut down).
//! [`PublicationManager`] owns that state; [`DelayedScheduler`] runs its
//! polls and publication-end tasks.

mod listeners;
mod manager;
mod scheduler;

pub use manager::PublicationManager;
pub use scheduler::{DelayedScheduler, TaskHandle};

/// Error text of the subscription reply sent for an already ended subscription.
pub const PUBLICATION_END_IN_PAST: &str = "publication end is in the past";

#[cfg(test)]
mod tests;
