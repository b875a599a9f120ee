//! # Mailbox Pair
//!
//! The mailbox layer is the only cross-thread, shared, mutable structure in the
//! runtime. Each process owns exactly one [`ReadMailbox`]; any number of peers hold
//! cloned [`WriteMailbox`] handles to it. Both halves share ownership of one
//! [`FrameQueue`], so a sender that outlives the owning process can still enqueue
//! safely; the frames are simply never drained. That "write into the void"
//! contract is what lets process shutdown stay fully asynchronous.
//!
//! The queue itself is a `parking_lot` mutex around an in-memory list. Every
//! operation is a push or a wholesale drain, so lock hold time is bounded by a
//! move, never by message processing. Concurrent `add_frame` calls never lose or
//! duplicate a frame, and a single `remove_frames` call drains everything enqueued
//! before it exactly once, in one global FIFO order.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::id::ProcessId;
use crate::message::MessageFrame;
use crate::properties::ProcessProperties;

/// Shared concurrent queue of message frames underlying one mailbox pair.
pub struct FrameQueue {
    frames: Mutex<Vec<MessageFrame>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, frame: MessageFrame) {
        self.frames.lock().push(frame);
    }

    fn drain_into(&self, out: &mut Vec<MessageFrame>) {
        let mut frames = self.frames.lock();
        out.reserve(frames.len());
        out.append(&mut frames);
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Write half of a mailbox pair; cheap to clone and share among senders.
///
/// Carries the owning process's id and properties so a peer that learns a write
/// mailbox also learns who it belongs to.
#[derive(Clone)]
pub struct WriteMailbox {
    process_id: ProcessId,
    properties: ProcessProperties,
    queue: Arc<FrameQueue>,
}

impl WriteMailbox {
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn properties(&self) -> ProcessProperties {
        self.properties
    }

    /// Transfers ownership of a frame into the shared queue. Never fails; blocks
    /// only on bounded lock contention.
    pub fn add_frame(&self, frame: MessageFrame) {
        self.queue.push(frame);
    }
}

impl std::fmt::Debug for WriteMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteMailbox")
            .field("process_id", &self.process_id)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Read half of a mailbox pair; held only by the owning process.
pub struct ReadMailbox {
    queue: Arc<FrameQueue>,
}

impl ReadMailbox {
    /// Atomically drains all currently queued frames into `out`, preserving the
    /// order producers enqueued them.
    pub fn remove_frames(&self, out: &mut Vec<MessageFrame>) {
        self.queue.drain_into(out);
    }
}

/// Owner of one queue plus the identity it is bound to; allocated exclusively by
/// the concurrency manager when a process registers. The mailbox binding for a
/// process exists iff its manager registry entry exists.
pub struct ProcessMailbox {
    process_id: ProcessId,
    properties: ProcessProperties,
    queue: Arc<FrameQueue>,
}

impl ProcessMailbox {
    pub fn new(process_id: ProcessId, properties: ProcessProperties) -> Self {
        Self {
            process_id,
            properties,
            queue: Arc::new(FrameQueue::new()),
        }
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn properties(&self) -> ProcessProperties {
        self.properties
    }

    pub fn write_mailbox(&self) -> WriteMailbox {
        WriteMailbox {
            process_id: self.process_id,
            properties: self.properties,
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn read_mailbox(&self) -> ReadMailbox {
        ReadMailbox {
            queue: Arc::clone(&self.queue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn mailbox_pair(id: u32) -> (WriteMailbox, ReadMailbox) {
        let mailbox = ProcessMailbox::new(ProcessId(id), ProcessProperties::new(3));
        (mailbox.write_mailbox(), mailbox.read_mailbox())
    }

    #[derive(Debug)]
    struct Tagged {
        producer: u32,
        seq: u32,
    }

    #[test]
    fn drain_preserves_frame_and_message_order() {
        let (write, read) = mailbox_pair(5);

        for frame_index in 0..3 {
            let mut frame = MessageFrame::new(ProcessId(9));
            for seq in 0..4 {
                frame.add_message(Tagged {
                    producer: frame_index,
                    seq,
                });
            }
            write.add_frame(frame);
        }

        let mut frames = Vec::new();
        read.remove_frames(&mut frames);
        assert_eq!(frames.len(), 3);

        for (frame_index, frame) in frames.into_iter().enumerate() {
            let (source, messages) = frame.into_parts();
            assert_eq!(source, ProcessId(9));
            assert_eq!(messages.len(), 4);
            for (seq, message) in messages.into_iter().enumerate() {
                let tagged = message.into_any().downcast::<Tagged>().unwrap();
                assert_eq!(tagged.producer, frame_index as u32);
                assert_eq!(tagged.seq, seq as u32);
            }
        }
    }

    #[test]
    fn second_drain_is_empty() {
        let (write, read) = mailbox_pair(5);
        write.add_frame(MessageFrame::new(ProcessId(1)));

        let mut first = Vec::new();
        read.remove_frames(&mut first);
        assert_eq!(first.len(), 1);

        let mut second = Vec::new();
        read.remove_frames(&mut second);
        assert!(second.is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: u32 = 8;
        const FRAMES_PER_PRODUCER: u32 = 200;

        let (write, read) = mailbox_pair(5);

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let write = write.clone();
                thread::spawn(move || {
                    for seq in 0..FRAMES_PER_PRODUCER {
                        let mut frame = MessageFrame::new(ProcessId(100 + producer));
                        frame.add_message(Tagged { producer, seq });
                        write.add_frame(frame);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut frames = Vec::new();
        read.remove_frames(&mut frames);
        assert_eq!(frames.len(), (PRODUCERS * FRAMES_PER_PRODUCER) as usize);

        // Exactly-once delivery with per-producer FIFO order.
        let mut next_seq = [0u32; PRODUCERS as usize];
        for frame in frames {
            let (_, messages) = frame.into_parts();
            let tagged = messages
                .into_iter()
                .next()
                .unwrap()
                .into_any()
                .downcast::<Tagged>()
                .unwrap();
            assert_eq!(tagged.seq, next_seq[tagged.producer as usize]);
            next_seq[tagged.producer as usize] += 1;
        }
        assert!(next_seq.iter().all(|&n| n == FRAMES_PER_PRODUCER));
    }

    #[test]
    fn writes_after_reader_dropped_are_absorbed() {
        let (write, read) = mailbox_pair(5);
        drop(read);
        write.add_frame(MessageFrame::new(ProcessId(1)));
        write.add_frame(MessageFrame::new(ProcessId(2)));
        // No panic, no error; the frames are simply never drained.
    }
}
