//! # Virtual Process
//!
//! The execution unit of the runtime. A virtual process is application logic
//! wrapped in a [`VirtualProcess`] shell that owns its mailbox ends, its message
//! handler registry, its task scheduler, and its lifecycle state. Worker threads
//! drive processes through the object-safe [`ManagedProcess`] trait one
//! cooperative quantum at a time; nothing preempts a process mid-run.
//!
//! A quantum proceeds in a fixed order: drain and dispatch every queued inbound
//! frame, service the task scheduler, run the logic's per-quantum hook, then
//! flush outbound frames. Outbound messages batch into one frame per destination
//! per quantum, so peers pay one queue lock per sender per quantum no matter how
//! many messages flow.
//!
//! ## Lifecycle
//!
//! `Initializing` until the first quantum, then `Running`. A
//! [`ShutdownSelfRequest`] moves the process to `ShuttingDownSoft` or
//! `ShuttingDownHard`; at the end of that quantum the process flushes what the
//! mode permits, acknowledges the manager with [`ShutdownSelfResponse`], drops
//! its mailbox ends, and becomes `Terminated`. A soft shutdown flushes every
//! frame with a known destination; a hard shutdown flushes only frames bound for
//! the manager or the logging process.

use std::collections::HashMap;
use std::mem;

use tracing::debug;

use crate::handler::HandlerRegistry;
use crate::id::ProcessId;
use crate::mailbox::{ReadMailbox, WriteMailbox};
use crate::message::{MessageFrame, ProcessMessage};
use crate::messages::{
    AddMailboxMessage, GetMailboxByIdRequest, GetMailboxByPropertiesRequest, LogRequestMessage,
    ReleaseMailboxRequest, ReleaseMailboxResponse, ShutdownManagerMessage, ShutdownProcessMessage,
    ShutdownSelfRequest, ShutdownSelfResponse,
};
use crate::properties::ProcessProperties;
use crate::scheduler::{TaskHandle, TaskScheduler};

/// Lifecycle state of a virtual process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Initializing,
    Running,
    ShuttingDownSoft,
    ShuttingDownHard,
    Terminated,
}

impl ProcessState {
    pub fn is_shutting_down(self) -> bool {
        matches!(self, Self::ShuttingDownSoft | Self::ShuttingDownHard)
    }
}

/// Object-safe interface the manager and worker threads use to drive a process.
pub trait ManagedProcess: Send {
    fn id(&self) -> ProcessId;
    fn properties(&self) -> ProcessProperties;

    /// Called once by the manager during registration, before any quantum runs.
    fn set_id(&mut self, id: ProcessId);
    fn set_read_mailbox(&mut self, mailbox: ReadMailbox);
    fn set_manager_mailbox(&mut self, mailbox: WriteMailbox);
    fn set_logging_mailbox(&mut self, mailbox: WriteMailbox);

    /// Called once on the owning worker thread before the first quantum.
    fn initialize(&mut self);

    /// Runs one cooperative quantum at `current_time`.
    fn run(&mut self, current_time: f64);

    fn state(&self) -> ProcessState;
}

/// Shared machinery every process carries: identity, mailboxes, outbound frame
/// batching, and the task scheduler. Application logic receives `&mut
/// ProcessCore` in its hooks and scheduled tasks.
pub struct ProcessCore {
    id: ProcessId,
    properties: ProcessProperties,
    state: ProcessState,
    current_time: f64,
    read_mailbox: Option<ReadMailbox>,
    mailboxes: HashMap<ProcessId, WriteMailbox>,
    pending_frames: HashMap<ProcessId, MessageFrame>,
    scheduler: TaskScheduler<ProcessCore>,
    requested_shutdown: Option<bool>,
}

impl ProcessCore {
    fn new(properties: ProcessProperties) -> Self {
        Self {
            id: ProcessId::INVALID,
            properties,
            state: ProcessState::Initializing,
            current_time: 0.0,
            read_mailbox: None,
            mailboxes: HashMap::new(),
            pending_frames: HashMap::new(),
            scheduler: TaskScheduler::new(),
            requested_shutdown: None,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn properties(&self) -> ProcessProperties {
        self.properties
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Time of the quantum currently executing.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Whether a write mailbox for `process_id` is currently held.
    pub fn has_mailbox(&self, process_id: ProcessId) -> bool {
        self.mailboxes.contains_key(&process_id)
    }

    /// Ids of known peers whose properties match `pattern`, from the local
    /// mailbox table only; no manager round trip.
    pub fn process_ids_matching(&self, pattern: &ProcessProperties) -> Vec<ProcessId> {
        self.mailboxes
            .iter()
            .filter(|(_, mailbox)| pattern.matches(&mailbox.properties()))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Queues a message for `destination`, batched into this quantum's outbound
    /// frame for that destination. Delivery happens at end of quantum; if no
    /// mailbox for the destination is known by then, the frame is retained for
    /// later quanta and dropped at shutdown.
    pub fn send_message<M: ProcessMessage>(&mut self, destination: ProcessId, message: M) {
        let source = self.id;
        self.pending_frames
            .entry(destination)
            .or_insert_with(|| MessageFrame::new(source))
            .add_message(message);
    }

    /// Queues a message for the concurrency manager.
    pub fn send_manager_message<M: ProcessMessage>(&mut self, message: M) {
        self.send_message(ProcessId::MANAGER, message);
    }

    /// Sends a formatted line to the logging process, tagged with this
    /// process's properties.
    pub fn log(&mut self, text: impl Into<String>) {
        let message = LogRequestMessage::new(self.properties, text);
        self.send_message(ProcessId::LOGGING, message);
    }

    /// Asks the manager for the write mailbox of a specific process. The
    /// answer, if the process exists, arrives later as an [`AddMailboxMessage`].
    pub fn request_mailbox_by_id(&mut self, target_id: ProcessId) {
        self.send_manager_message(GetMailboxByIdRequest { target_id });
    }

    /// Asks the manager for the mailboxes of all processes matching `pattern`.
    /// Persistent requests also cover processes registered later.
    pub fn request_mailbox_by_properties(&mut self, pattern: ProcessProperties, persistent: bool) {
        self.send_manager_message(GetMailboxByPropertiesRequest {
            pattern,
            is_persistent: persistent,
        });
    }

    /// Asks the manager to spawn a new process.
    pub fn add_new_process(&mut self, process: Box<dyn ManagedProcess>, return_mailbox: bool) {
        self.send_manager_message(crate::messages::AddNewProcessMessage::new(
            process,
            return_mailbox,
        ));
    }

    /// Asks the manager to shut down the process with the given id.
    pub fn shutdown_process(&mut self, process_id: ProcessId) {
        self.send_manager_message(ShutdownProcessMessage { process_id });
    }

    /// Asks the manager to shut the whole runtime down.
    pub fn shutdown_manager(&mut self) {
        self.send_manager_message(ShutdownManagerMessage);
    }

    /// Schedules a task on this process's scheduler.
    ///
    /// # Panics
    ///
    /// Panics if the task is already scheduled.
    pub fn submit_task(&mut self, task: &TaskHandle<ProcessCore>) {
        self.scheduler.submit_task(task);
    }

    /// Cancels a previously scheduled task; a no-op if it is not scheduled.
    pub fn remove_task(&mut self, task: &TaskHandle<ProcessCore>) {
        self.scheduler.remove_task(task);
    }

    fn add_mailbox(&mut self, mailbox: WriteMailbox) {
        let owner = mailbox.process_id();
        if owner.is_reserved() {
            panic!("mailbox for reserved process {owner} delivered through AddMailboxMessage");
        }
        self.mailboxes.entry(owner).or_insert(mailbox);
    }

    fn release_mailbox(&mut self, process_id: ProcessId) {
        // The peer keeps running until its own shutdown order arrives, so
        // anything already queued for it is still deliverable. Flush first.
        if let Some(mailbox) = self.mailboxes.remove(&process_id) {
            if let Some(frame) = self.pending_frames.remove(&process_id) {
                if !frame.is_empty() {
                    mailbox.add_frame(frame);
                }
            }
        } else {
            self.pending_frames.remove(&process_id);
        }
        self.send_manager_message(ReleaseMailboxResponse { process_id });
    }

    fn request_self_shutdown(&mut self, is_hard: bool) {
        if self.state.is_shutting_down() || self.state == ProcessState::Terminated {
            return;
        }
        self.state = if is_hard {
            ProcessState::ShuttingDownHard
        } else {
            ProcessState::ShuttingDownSoft
        };
        self.requested_shutdown = Some(is_hard);
    }

    fn flush_pending_frames(&mut self, reserved_only: bool, drop_undeliverable: bool) {
        let frames = mem::take(&mut self.pending_frames);
        for (destination, frame) in frames {
            if frame.is_empty() {
                continue;
            }
            if reserved_only && !destination.is_reserved() {
                continue;
            }
            match self.mailboxes.get(&destination) {
                Some(mailbox) => mailbox.add_frame(frame),
                None if !drop_undeliverable => {
                    self.pending_frames.insert(destination, frame);
                }
                None => {}
            }
        }
    }
}

/// Application behavior plugged into a [`VirtualProcess`].
pub trait ProcessLogic: Send + 'static {
    /// Registers handlers for the application message types this process
    /// understands. Receiving an unregistered type is fatal.
    fn register_handlers(&mut self, registry: &mut HandlerRegistry<ProcessBody<Self>>)
    where
        Self: Sized,
    {
        let _ = registry;
    }

    /// Called once before the first quantum, after mailboxes are attached.
    fn on_initialize(&mut self, core: &mut ProcessCore) {
        let _ = core;
    }

    /// Called every quantum after inbound dispatch and scheduler service.
    fn on_run(&mut self, core: &mut ProcessCore) {
        let _ = core;
    }

    /// Called once when the process shuts down, before the final flush.
    fn on_shutdown(&mut self, core: &mut ProcessCore) {
        let _ = core;
    }
}

/// The state message handlers operate on: the process core plus the
/// application logic, borrowable together without touching the registry.
pub struct ProcessBody<L> {
    pub core: ProcessCore,
    pub logic: L,
}

/// A complete virtual process: core machinery, handler registry, and logic.
pub struct VirtualProcess<L: ProcessLogic> {
    body: ProcessBody<L>,
    registry: HandlerRegistry<ProcessBody<L>>,
    initialized: bool,
}

impl<L: ProcessLogic> VirtualProcess<L> {
    pub fn new(properties: ProcessProperties, logic: L) -> Self {
        Self {
            body: ProcessBody {
                core: ProcessCore::new(properties),
                logic,
            },
            registry: HandlerRegistry::new(),
            initialized: false,
        }
    }

    pub fn boxed(properties: ProcessProperties, logic: L) -> Box<dyn ManagedProcess> {
        Box::new(Self::new(properties, logic))
    }

    fn register_builtin_handlers(&mut self) {
        self.registry
            .register::<AddMailboxMessage, _>(|body, _, message| {
                body.core.add_mailbox(message.mailbox);
            });
        self.registry
            .register::<ReleaseMailboxRequest, _>(|body, source, message| {
                if source != ProcessId::MANAGER {
                    panic!("ReleaseMailboxRequest from non-manager process {source}");
                }
                body.core.release_mailbox(message.process_id);
            });
        self.registry
            .register::<ShutdownSelfRequest, _>(|body, source, message| {
                if source != ProcessId::MANAGER {
                    panic!("ShutdownSelfRequest from non-manager process {source}");
                }
                body.core.request_self_shutdown(message.is_hard);
            });
    }

    fn dispatch_inbound_frames(&mut self) {
        let mut frames = Vec::new();
        if let Some(read_mailbox) = &self.body.core.read_mailbox {
            read_mailbox.remove_frames(&mut frames);
        }
        for frame in frames {
            let (source, messages) = frame.into_parts();
            for message in messages {
                self.registry.dispatch(&mut self.body, source, message);
            }
        }
    }

    fn service_scheduler(&mut self, current_time: f64) {
        // The scheduler is swapped out so payloads get `&mut ProcessCore`
        // without aliasing it; submissions they make land in the placeholder
        // and are folded back afterwards.
        let mut scheduler = mem::take(&mut self.body.core.scheduler);
        scheduler.service(current_time, &mut self.body.core);
        let placeholder = mem::replace(&mut self.body.core.scheduler, scheduler);
        self.body.core.scheduler.absorb(placeholder);
    }

    fn finish_shutdown(&mut self, is_hard: bool) {
        let ProcessBody { core, logic } = &mut self.body;
        logic.on_shutdown(core);

        core.flush_pending_frames(is_hard, true);

        if let Some(manager) = core.mailboxes.get(&ProcessId::MANAGER) {
            let mut frame = MessageFrame::new(core.id);
            frame.add_message(ShutdownSelfResponse { is_hard });
            manager.add_frame(frame);
        }

        debug!(process_id = core.id.0, is_hard, "process terminated");
        core.read_mailbox = None;
        core.mailboxes.clear();
        core.state = ProcessState::Terminated;
    }
}

impl<L: ProcessLogic> ManagedProcess for VirtualProcess<L> {
    fn id(&self) -> ProcessId {
        self.body.core.id
    }

    fn properties(&self) -> ProcessProperties {
        self.body.core.properties
    }

    fn set_id(&mut self, id: ProcessId) {
        self.body.core.id = id;
    }

    fn set_read_mailbox(&mut self, mailbox: ReadMailbox) {
        self.body.core.read_mailbox = Some(mailbox);
    }

    fn set_manager_mailbox(&mut self, mailbox: WriteMailbox) {
        self.body.core.mailboxes.insert(ProcessId::MANAGER, mailbox);
    }

    fn set_logging_mailbox(&mut self, mailbox: WriteMailbox) {
        self.body.core.mailboxes.insert(ProcessId::LOGGING, mailbox);
    }

    fn initialize(&mut self) {
        if self.initialized {
            panic!("process {} initialized twice", self.body.core.id);
        }
        self.initialized = true;
        self.register_builtin_handlers();
        let ProcessBody { core, logic } = &mut self.body;
        logic.on_initialize(core);
        self.body.logic.register_handlers(&mut self.registry);
        debug!(
            process_id = self.body.core.id.0,
            "process initialized"
        );
    }

    fn run(&mut self, current_time: f64) {
        if self.body.core.state == ProcessState::Terminated {
            return;
        }
        self.body.core.current_time = current_time;
        if self.body.core.state == ProcessState::Initializing {
            self.body.core.state = ProcessState::Running;
        }

        self.dispatch_inbound_frames();
        self.service_scheduler(current_time);

        {
            let ProcessBody { core, logic } = &mut self.body;
            logic.on_run(core);
        }

        match self.body.core.requested_shutdown.take() {
            Some(is_hard) => self.finish_shutdown(is_hard),
            None => self.body.core.flush_pending_frames(false, false),
        }
    }

    fn state(&self) -> ProcessState {
        self.body.core.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::ProcessMailbox;
    use crate::properties::{MANAGER_PROCESS_PROPERTIES, LOGGING_PROCESS_PROPERTIES};
    use crate::scheduler::ScheduledTask;

    #[derive(Debug)]
    struct Tick(u32);

    #[derive(Default)]
    struct RecordingLogic {
        received: Vec<(ProcessId, u32)>,
        runs: u32,
        shut_down: bool,
    }

    impl ProcessLogic for RecordingLogic {
        fn register_handlers(&mut self, registry: &mut HandlerRegistry<ProcessBody<Self>>) {
            registry.register::<Tick, _>(|body, source, message| {
                body.logic.received.push((source, message.0));
            });
        }

        fn on_run(&mut self, _: &mut ProcessCore) {
            self.runs += 1;
        }

        fn on_shutdown(&mut self, _: &mut ProcessCore) {
            self.shut_down = true;
        }
    }

    struct Harness {
        process: VirtualProcess<RecordingLogic>,
        own: ProcessMailbox,
        manager: ProcessMailbox,
        logging: ProcessMailbox,
    }

    fn harness() -> Harness {
        let own = ProcessMailbox::new(ProcessId(5), ProcessProperties::new(3));
        let manager = ProcessMailbox::new(ProcessId::MANAGER, MANAGER_PROCESS_PROPERTIES);
        let logging = ProcessMailbox::new(ProcessId::LOGGING, LOGGING_PROCESS_PROPERTIES);

        let mut process =
            VirtualProcess::new(ProcessProperties::new(3), RecordingLogic::default());
        process.set_id(ProcessId(5));
        process.set_read_mailbox(own.read_mailbox());
        process.set_manager_mailbox(manager.write_mailbox());
        process.set_logging_mailbox(logging.write_mailbox());
        process.initialize();

        Harness {
            process,
            own,
            manager,
            logging,
        }
    }

    fn drain(mailbox: &ProcessMailbox) -> Vec<MessageFrame> {
        let mut frames = Vec::new();
        mailbox.read_mailbox().remove_frames(&mut frames);
        frames
    }

    fn single_message<M: 'static>(frames: Vec<MessageFrame>) -> (ProcessId, Box<M>) {
        assert_eq!(frames.len(), 1);
        let (source, mut messages) = frames.into_iter().next().unwrap().into_parts();
        assert_eq!(messages.len(), 1);
        let message = messages
            .pop()
            .unwrap()
            .into_any()
            .downcast::<M>()
            .unwrap();
        (source, message)
    }

    #[test]
    fn quantum_drains_all_frames_and_preserves_order() {
        let mut h = harness();
        let sender = h.own.write_mailbox();

        let mut first = MessageFrame::new(ProcessId(8));
        first.add_message(Tick(1));
        first.add_message(Tick(2));
        sender.add_frame(first);

        let mut second = MessageFrame::new(ProcessId(9));
        second.add_message(Tick(3));
        sender.add_frame(second);

        h.process.run(1.0);

        assert_eq!(h.process.state(), ProcessState::Running);
        assert_eq!(
            h.process.body.logic.received,
            vec![(ProcessId(8), 1), (ProcessId(8), 2), (ProcessId(9), 3)]
        );
        assert_eq!(h.process.body.logic.runs, 1);
    }

    #[test]
    fn outbound_messages_batch_into_one_frame_per_destination() {
        let mut h = harness();
        let peer = ProcessMailbox::new(ProcessId(6), ProcessProperties::new(4));

        let mut add = MessageFrame::new(ProcessId::MANAGER);
        add.add_message(AddMailboxMessage::new(peer.write_mailbox()));
        h.own.write_mailbox().add_frame(add);

        h.process.run(1.0);
        h.process.body.core.send_message(ProcessId(6), Tick(10));
        h.process.body.core.send_message(ProcessId(6), Tick(11));
        h.process.run(2.0);

        let frames = drain(&peer);
        assert_eq!(frames.len(), 1);
        let (source, messages) = frames.into_iter().next().unwrap().into_parts();
        assert_eq!(source, ProcessId(5));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn sends_to_unknown_destination_are_retained_until_mailbox_arrives() {
        let mut h = harness();
        let peer = ProcessMailbox::new(ProcessId(6), ProcessProperties::new(4));

        h.process.body.core.send_message(ProcessId(6), Tick(1));
        h.process.run(1.0);
        assert!(drain(&peer).is_empty());

        let mut add = MessageFrame::new(ProcessId::MANAGER);
        add.add_message(AddMailboxMessage::new(peer.write_mailbox()));
        h.own.write_mailbox().add_frame(add);
        h.process.run(2.0);

        assert_eq!(drain(&peer).len(), 1);
    }

    #[test]
    fn release_mailbox_drops_handle_and_acknowledges() {
        let mut h = harness();
        let peer = ProcessMailbox::new(ProcessId(6), ProcessProperties::new(4));

        let mut setup = MessageFrame::new(ProcessId::MANAGER);
        setup.add_message(AddMailboxMessage::new(peer.write_mailbox()));
        h.own.write_mailbox().add_frame(setup);
        h.process.run(1.0);
        assert!(h.process.body.core.has_mailbox(ProcessId(6)));

        let mut release = MessageFrame::new(ProcessId::MANAGER);
        release.add_message(ReleaseMailboxRequest {
            process_id: ProcessId(6),
        });
        h.own.write_mailbox().add_frame(release);
        h.process.run(2.0);

        assert!(!h.process.body.core.has_mailbox(ProcessId(6)));
        let (source, response) = single_message::<ReleaseMailboxResponse>(drain(&h.manager));
        assert_eq!(source, ProcessId(5));
        assert_eq!(response.process_id, ProcessId(6));
    }

    #[test]
    fn mailbox_by_id_request_rides_the_manager_frame() {
        let mut h = harness();
        h.process.body.core.request_mailbox_by_id(ProcessId(9));
        h.process.run(1.0);

        let (source, request) = single_message::<GetMailboxByIdRequest>(drain(&h.manager));
        assert_eq!(source, ProcessId(5));
        assert_eq!(request.target_id, ProcessId(9));
    }

    #[test]
    fn release_mailbox_flushes_queued_frames_to_the_peer_first() {
        let mut h = harness();
        let peer = ProcessMailbox::new(ProcessId(6), ProcessProperties::new(4));

        let mut setup = MessageFrame::new(ProcessId::MANAGER);
        setup.add_message(AddMailboxMessage::new(peer.write_mailbox()));
        h.own.write_mailbox().add_frame(setup);
        h.process.run(1.0);

        // Queued before the release order arrives; the peer keeps running
        // until its own shutdown completes, so the message must still land.
        h.process.body.core.send_message(ProcessId(6), Tick(42));
        let mut release = MessageFrame::new(ProcessId::MANAGER);
        release.add_message(ReleaseMailboxRequest {
            process_id: ProcessId(6),
        });
        h.own.write_mailbox().add_frame(release);
        h.process.run(2.0);

        assert!(!h.process.body.core.has_mailbox(ProcessId(6)));
        let (source, tick) = single_message::<Tick>(drain(&peer));
        assert_eq!(source, ProcessId(5));
        assert_eq!(tick.0, 42);
    }

    #[test]
    fn soft_shutdown_flushes_then_acknowledges_and_terminates() {
        let mut h = harness();

        h.process.body.core.log("going down");
        let mut frame = MessageFrame::new(ProcessId::MANAGER);
        frame.add_message(ShutdownSelfRequest { is_hard: false });
        h.own.write_mailbox().add_frame(frame);

        h.process.run(1.0);

        assert_eq!(h.process.state(), ProcessState::Terminated);
        assert!(h.process.body.logic.shut_down);
        assert_eq!(drain(&h.logging).len(), 1);
        let (_, response) = single_message::<ShutdownSelfResponse>(drain(&h.manager));
        assert!(!response.is_hard);

        // Further quanta are no-ops.
        h.process.run(2.0);
        assert_eq!(h.process.state(), ProcessState::Terminated);
    }

    #[test]
    fn hard_shutdown_flushes_only_reserved_destinations() {
        let mut h = harness();
        let peer = ProcessMailbox::new(ProcessId(6), ProcessProperties::new(4));

        let mut setup = MessageFrame::new(ProcessId::MANAGER);
        setup.add_message(AddMailboxMessage::new(peer.write_mailbox()));
        h.own.write_mailbox().add_frame(setup);
        h.process.run(1.0);

        h.process.body.core.send_message(ProcessId(6), Tick(1));
        h.process.body.core.log("last words");
        let mut frame = MessageFrame::new(ProcessId::MANAGER);
        frame.add_message(ShutdownSelfRequest { is_hard: true });
        h.own.write_mailbox().add_frame(frame);
        h.process.run(2.0);

        assert_eq!(h.process.state(), ProcessState::Terminated);
        assert!(drain(&peer).is_empty());
        assert_eq!(drain(&h.logging).len(), 1);
        let (_, response) = single_message::<ShutdownSelfResponse>(drain(&h.manager));
        assert!(response.is_hard);
    }

    #[test]
    fn scheduled_task_runs_with_core_context() {
        let mut h = harness();

        let task = ScheduledTask::new(
            1.5,
            Box::new(|_: f64, core: &mut ProcessCore| -> Option<f64> {
                core.log("task fired");
                None
            }),
        );
        h.process.body.core.submit_task(&task);

        h.process.run(1.0);
        assert!(drain(&h.logging).is_empty());

        h.process.run(2.0);
        let frames = drain(&h.logging);
        let (_, log) = single_message::<LogRequestMessage>(frames);
        assert_eq!(log.text, "task fired");
        assert!(!task.is_scheduled());
    }
}
