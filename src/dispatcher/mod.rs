//! The `dispatcher` module routes every received message to the local
//! party that handles it: request callers for requests, reply callers for
//! replies, the publication manager for subscription requests and stops,
//! and the subscription manager for subscription replies and publications.

#[allow(clippy::module_inception)]
mod dispatcher;
mod reply_caller;

pub use dispatcher::Dispatcher;
pub use reply_caller::{ReplyCaller, ReplyCallerDirectory};
