//! # Type-Keyed Message Dispatch
//!
//! Each process owns a [`HandlerRegistry`] mapping message [`TypeId`]s to handler
//! closures. Registration happens once, during process initialization; dispatch
//! happens every quantum. The registry is parameterized over the state type `S`
//! the handlers mutate, so it can sit beside the state it targets without
//! borrowing it.
//!
//! Dispatch is a checked downcast. A handler is stored as a closure over
//! `Box<dyn Any + Send>` that downcasts to its concrete message type before
//! invoking the typed function. The downcast cannot fail in practice because the
//! registry key and the closure were minted together from the same type
//! parameter, but it is still verified rather than assumed.
//!
//! Contract violations panic: registering two handlers for one message type is a
//! programming error, as is receiving a message no handler was registered for.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::id::ProcessId;
use crate::message::ProcessMessage;

type BoxedHandler<S> = Box<dyn FnMut(&mut S, ProcessId, Box<dyn Any + Send>) + Send>;

/// Registry of message handlers for one process, keyed by message type.
pub struct HandlerRegistry<S> {
    handlers: HashMap<TypeId, BoxedHandler<S>>,
}

impl<S> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for message type `M`.
    ///
    /// # Panics
    ///
    /// Panics if a handler for `M` is already registered.
    pub fn register<M, F>(&mut self, mut handler: F)
    where
        M: ProcessMessage,
        F: FnMut(&mut S, ProcessId, Box<M>) + Send + 'static,
    {
        let key = TypeId::of::<M>();
        let erased: BoxedHandler<S> = Box::new(move |state, source, message| {
            match message.downcast::<M>() {
                Ok(message) => handler(state, source, message),
                Err(_) => panic!(
                    "handler for {} invoked with a different message type",
                    std::any::type_name::<M>()
                ),
            }
        });
        if self.handlers.insert(key, erased).is_some() {
            panic!(
                "duplicate handler registration for message type {}",
                std::any::type_name::<M>()
            );
        }
    }

    pub fn handles(&self, message_type: TypeId) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Dispatches one message to its registered handler.
    ///
    /// # Panics
    ///
    /// Panics if no handler is registered for the message's type.
    pub fn dispatch(&mut self, state: &mut S, source: ProcessId, message: Box<dyn ProcessMessage>) {
        // Deref first: the blanket impl also covers the box itself, and the
        // boxed receiver would report the box's TypeId, not the payload's.
        let key = (*message).message_type();
        match self.handlers.get_mut(&key) {
            Some(handler) => handler(state, source, message.into_any()),
            None => panic!("no handler registered for message type {key:?}"),
        }
    }
}

impl<S> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
