//! The `persistence` module stores outstanding subscription requests so a
//! restarted process can pick them up again.
//!
//! The publication manager only needs a string blob per key, expressed by
//! [`SubscriptionStore`]. [`SledStore`] backs it with `sled`, an embedded
//! key-value store.

pub mod sled_store;

pub use sled_store::{SledStore, SubscriptionStore};
