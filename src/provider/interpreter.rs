use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::payload::Request;
use crate::provider::RequestCaller;
use crate::utils::JoynrException;

pub type OnSuccess = Box<dyn FnOnce(Vec<Value>) + Send>;
pub type OnError = Box<dyn FnOnce(JoynrException) + Send>;

/// Invokes a named method on a request caller.
///
/// Exactly one of the two continuations must be called, either before
/// `execute` returns or later from another task.
pub trait RequestInterpreter: Send + Sync {
    fn execute(
        &self,
        caller: Arc<dyn RequestCaller>,
        request: Request,
        on_success: OnSuccess,
        on_error: OnError,
    );
}

type InterfaceKey = (String, u32);

/// Interpreters by interface name and major version.
#[derive(Default)]
pub struct InterpreterRegistry {
    interpreters: RwLock<HashMap<InterfaceKey, Arc<dyn RequestInterpreter>>>,
}

impl InterpreterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        interface_name: &str,
        major_version: u32,
        interpreter: Arc<dyn RequestInterpreter>,
    ) {
        debug!(interface = interface_name, major_version, "registering request interpreter");
        self.interpreters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((interface_name.to_string(), major_version), interpreter);
    }

    pub fn unregister(&self, interface_name: &str, major_version: u32) -> bool {
        self.interpreters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(interface_name.to_string(), major_version))
            .is_some()
    }

    pub fn get(&self, interface_name: &str, major_version: u32) -> Option<Arc<dyn RequestInterpreter>> {
        self.interpreters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(interface_name.to_string(), major_version))
            .cloned()
    }

    /// Interpreter matching a caller's interface.
    pub fn for_caller(&self, caller: &dyn RequestCaller) -> Option<Arc<dyn RequestInterpreter>> {
        self.get(caller.interface_name(), caller.major_version())
    }
}
