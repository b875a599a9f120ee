//! # Message Envelope & Frame
//!
//! Messages are the only way virtual processes interact. The substrate is
//! payload-agnostic: any `Send + Debug + 'static` value is a message, thanks to the
//! blanket [`ProcessMessage`] implementation. A message is exclusively owned at
//! every point of its life: by the producer before the send, by a
//! [`MessageFrame`] in transit, and by the handler during dispatch. Ownership
//! transfers; it is never shared.
//!
//! ## Frames
//!
//! A [`MessageFrame`] batches every message one process sends to one destination
//! during a scheduling quantum. Batching is the core throughput optimization of
//! the mailbox layer: N messages cross the synchronized queue with a single lock
//! acquisition instead of N. A frame is stamped with its source process id at
//! construction and the id can never change; messages can only be appended before
//! transport, never removed or reordered.

use std::any::{Any, TypeId};
use std::fmt;

use crate::id::ProcessId;

/// Object-safe view of a message payload.
///
/// Implemented for every `Send + Debug + 'static` type via a blanket impl, so user
/// crates define message types as plain structs/enums with no framework
/// boilerplate. [`message_type`](ProcessMessage::message_type) reports the
/// `TypeId` of the concrete payload, which is the dispatch key used by the
/// handler registry; [`into_any`](ProcessMessage::into_any) surrenders the
/// payload for the registry's checked downcast.
pub trait ProcessMessage: Send + fmt::Debug + 'static {
    /// `TypeId` of the concrete payload type, captured at the point the payload
    /// was boxed.
    fn message_type(&self) -> TypeId;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<M> ProcessMessage for M
where
    M: Send + fmt::Debug + 'static,
{
    fn message_type(&self) -> TypeId {
        TypeId::of::<M>()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// An ordered batch of messages from a single source process.
pub struct MessageFrame {
    source: ProcessId,
    messages: Vec<Box<dyn ProcessMessage>>,
}

impl MessageFrame {
    pub fn new(source: ProcessId) -> Self {
        Self {
            source,
            messages: Vec::new(),
        }
    }

    pub fn source(&self) -> ProcessId {
        self.source
    }

    /// Appends a message; arrival order at the consumer is exactly append order.
    pub fn add_message<M: ProcessMessage>(&mut self, message: M) {
        self.messages.push(Box::new(message));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consumes the frame, yielding its source and messages in append order.
    pub fn into_parts(self) -> (ProcessId, Vec<Box<dyn ProcessMessage>>) {
        (self.source, self.messages)
    }
}

impl fmt::Debug for MessageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFrame")
            .field("source", &self.source)
            .field("len", &self.messages.len())
            .finish()
    }
}
