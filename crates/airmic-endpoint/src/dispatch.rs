//! Event dispatch table.
//!
//! Each [`ServerEventKind`] has at most one handler. Handlers are plain
//! functions over a context, so a session registers its own methods and
//! keeps its state unshared.

use std::collections::HashMap;
use std::fmt;

use airmic_common::protocol::ServerEventKind;
use airmic_common::{ClientError, ServerMessage};
use thiserror::Error;

/// What the event loop does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub type Handler<C> = fn(&mut C, &ServerMessage) -> Flow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("handler already registered for {0:?}")]
    AlreadyRegistered(ServerEventKind),
}

impl From<DispatchError> for ClientError {
    fn from(e: DispatchError) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Handled(Flow),
    Unhandled,
}

pub struct EventTable<C> {
    handlers: HashMap<ServerEventKind, Handler<C>>,
}

impl<C> EventTable<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `kind`. A second registration is an error.
    pub fn on(&mut self, kind: ServerEventKind, handler: Handler<C>) -> Result<(), DispatchError> {
        if self.handlers.contains_key(&kind) {
            return Err(DispatchError::AlreadyRegistered(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn handles(&self, kind: ServerEventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn dispatch(&self, ctx: &mut C, msg: &ServerMessage) -> Dispatched {
        match self.handlers.get(&msg.kind()) {
            Some(handler) => Dispatched::Handled(handler(ctx, msg)),
            None => {
                tracing::trace!(kind = ?msg.kind(), "No handler");
                Dispatched::Unhandled
            }
        }
    }
}

impl<C> Default for EventTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTable")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
