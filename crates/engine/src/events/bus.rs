use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;
use tracing::warn;

use super::notification::{Notification, NotificationKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Registered callback. Identity is the `Rc` allocation, so keep the clone you
/// subscribed with to unsubscribe later.
pub type Handler = Rc<dyn Fn(&Notification) -> Result<(), HandlerError>>;

/// Publish/subscribe hub shared by every component of one client.
///
/// Clones share the same registry. Delivery is synchronous on the caller's thread,
/// in registration order; handlers may publish or (un)subscribe while being invoked.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<HashMap<NotificationKind, Vec<Handler>>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        let handler_count = registry.values().map(Vec::len).sum::<usize>();
        f.debug_struct("EventBus")
            .field("kinds", &registry.len())
            .field("handlers", &handler_count)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<F>(callback: F) -> Handler
    where
        F: Fn(&Notification) -> Result<(), HandlerError> + 'static,
    {
        Rc::new(callback)
    }

    /// Returns false if `handler` was already registered for `kind`.
    pub fn subscribe(&self, kind: NotificationKind, handler: &Handler) -> bool {
        let mut registry = self.registry.borrow_mut();
        let handlers = registry.entry(kind).or_default();
        if handlers.iter().any(|existing| same_handler(existing, handler)) {
            return false;
        }
        handlers.push(Rc::clone(handler));
        true
    }

    /// Returns false if `handler` was not registered for `kind`.
    pub fn unsubscribe(&self, kind: NotificationKind, handler: &Handler) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(handlers) = registry.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|existing| !same_handler(existing, handler));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            registry.remove(&kind);
        }
        removed
    }

    /// Delivers to the handlers registered when the call starts. Returns how many
    /// handlers ran without error or panic.
    pub fn publish(&self, notification: Notification) -> usize {
        let kind = notification.kind();
        let handlers = self
            .registry
            .borrow()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0usize;
        for (index, handler) in handlers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(error)) => {
                    warn!(
                        kind = ?kind,
                        handler_index = index,
                        error = %error,
                        "event_handler_failed"
                    );
                }
                Err(payload) => {
                    warn!(
                        kind = ?kind,
                        handler_index = index,
                        panic = %panic_message(payload.as_ref()),
                        "event_handler_panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, kind: NotificationKind) -> usize {
        self.registry.borrow().get(&kind).map_or(0, Vec::len)
    }
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
