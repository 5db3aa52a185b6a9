//! Provider-side seams used by the dispatcher and the publication manager.
//!
//! A [`RequestCaller`] represents one registered provider instance. The
//! [`InterpreterRegistry`] maps `(interface name, major version)` to the
//! [`RequestInterpreter`] that knows how to invoke methods on it. Both are
//! supplied by generated glue in a full system; here they are plain traits.

pub mod interpreter;
pub mod listeners;

use std::any::Any;
use std::sync::Arc;

pub use interpreter::{InterpreterRegistry, OnError, OnSuccess, RequestInterpreter};
pub use listeners::{AttributeListener, BroadcastFilter, BroadcastListener, ListenerRegistry};

/// A provider instance that requests can be executed on.
pub trait RequestCaller: Send + Sync {
    fn interface_name(&self) -> &str;

    fn major_version(&self) -> u32;

    fn register_attribute_listener(&self, attribute_name: &str, listener: Arc<dyn AttributeListener>);

    fn unregister_attribute_listener(
        &self,
        attribute_name: &str,
        listener: &Arc<dyn AttributeListener>,
    );

    fn register_broadcast_listener(&self, broadcast_name: &str, listener: Arc<dyn BroadcastListener>);

    fn unregister_broadcast_listener(
        &self,
        broadcast_name: &str,
        listener: &Arc<dyn BroadcastListener>,
    );

    /// Lets an interpreter downcast to the concrete provider type.
    fn as_any(&self) -> &dyn Any;
}
