//! # Concurrency Manager
//!
//! The single authority over the process registry. Every process learns about
//! peers, spawns children, and shuts down exclusively by messaging the manager;
//! the registry itself is mutated only on the manager's own service loop, so it
//! needs no locks. A mailbox binding exists if and only if the corresponding
//! record exists.
//!
//! ## Shutdown protocol
//!
//! Shutting down one process is a two-phase handshake. Phase one broadcasts
//! [`ReleaseMailboxRequest`] for the target to every other live process and
//! collects one [`ReleaseMailboxResponse`] per recipient; only once no peer can
//! still address the target does phase two send it
//! [`ShutdownSelfRequest`]. The target's [`ShutdownSelfResponse`] erases the
//! record. Runtime-wide shutdown skips the release phase and hard-stops every
//! process directly, keeping the logging process alive until last so final log
//! lines still land, then stops once the record table is empty.

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{FrameworkError, FrameworkResult};
use crate::handler::HandlerRegistry;
use crate::id::ProcessId;
use crate::logging::{logging_process, LogSink};
use crate::mailbox::{ProcessMailbox, ReadMailbox, WriteMailbox};
use crate::message::{MessageFrame, ProcessMessage};
use crate::messages::{
    AddMailboxMessage, AddNewProcessMessage, GetMailboxByIdRequest,
    GetMailboxByPropertiesRequest, ReleaseMailboxRequest, ReleaseMailboxResponse,
    ShutdownManagerMessage, ShutdownProcessMessage, ShutdownSelfRequest, ShutdownSelfResponse,
};
use crate::process::ManagedProcess;
use crate::properties::{ProcessProperties, ProcessSubject, MANAGER_PROCESS_PROPERTIES};
use crate::time::TimeKeeper;
use crate::worker::WorkerPool;

const SERVICE_INTERVAL: Duration = Duration::from_millis(1);

enum RecordStage {
    Active,
    AwaitingReleases {
        pending: HashSet<ProcessId>,
        is_hard: bool,
    },
    AwaitingShutdownAck,
}

struct ProcessRecord {
    properties: ProcessProperties,
    write_mailbox: WriteMailbox,
    stage: RecordStage,
}

impl ProcessRecord {
    fn is_active(&self) -> bool {
        matches!(self.stage, RecordStage::Active)
    }
}

struct PersistentRequest {
    requester: ProcessId,
    pattern: ProcessProperties,
}

struct ManagerState {
    time_keeper: TimeKeeper,
    mailbox: ProcessMailbox,
    read_mailbox: ReadMailbox,
    records: HashMap<ProcessId, ProcessRecord>,
    next_id: u32,
    pool: WorkerPool,
    persistent_requests: Vec<PersistentRequest>,
    pending_frames: HashMap<ProcessId, MessageFrame>,
    shutting_down: bool,
}

impl ManagerState {
    /// Batches a message toward a process, one frame per destination per
    /// service iteration.
    fn queue_message<M: ProcessMessage>(&mut self, destination: ProcessId, message: M) {
        self.pending_frames
            .entry(destination)
            .or_insert_with(|| MessageFrame::new(ProcessId::MANAGER))
            .add_message(message);
    }

    fn flush_pending_frames(&mut self) {
        let frames = std::mem::take(&mut self.pending_frames);
        for (destination, frame) in frames {
            match self.records.get(&destination) {
                Some(record) => record.write_mailbox.add_frame(frame),
                None => debug!(
                    process_id = destination.0,
                    "dropping frame for unregistered process"
                ),
            }
        }
    }

    fn allocate_id(&mut self, properties: &ProcessProperties) -> ProcessId {
        if properties.subject() == ProcessSubject::LOGGING {
            return ProcessId::LOGGING;
        }
        let id = ProcessId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers an application process, whichever path it arrives on: the
    /// spawn API or a runtime [`AddNewProcessMessage`]. Wildcarded properties
    /// and reserved subjects are rejected before installation.
    fn register_process(
        &mut self,
        process: Box<dyn ManagedProcess>,
    ) -> FrameworkResult<WriteMailbox> {
        if self.shutting_down {
            return Err(FrameworkError::ManagerShutDown);
        }
        let properties = process.properties();
        if !properties.is_valid() {
            return Err(FrameworkError::InvalidProperties(format!(
                "process properties must be fully concrete, got {properties:?}"
            )));
        }
        if properties.subject() < ProcessSubject::FIRST_APPLICATION {
            return Err(FrameworkError::InvalidProperties(format!(
                "subject {} is reserved for the runtime",
                properties.subject()
            )));
        }
        self.install_process(process)
    }

    /// Installation path shared by [`Self::register_process`] and the
    /// runtime's own logging process: allocates the id and mailbox pair,
    /// wires the reserved mailboxes, records the process, satisfies open
    /// persistent pattern requests, and places it on a worker.
    ///
    /// # Panics
    ///
    /// Panics if a record already exists for the allocated id.
    fn install_process(
        &mut self,
        mut process: Box<dyn ManagedProcess>,
    ) -> FrameworkResult<WriteMailbox> {
        let properties = process.properties();
        let id = self.allocate_id(&properties);
        if self.records.contains_key(&id) {
            panic!("duplicate process record for id {id}");
        }
        let mailbox = ProcessMailbox::new(id, properties);

        process.set_id(id);
        process.set_read_mailbox(mailbox.read_mailbox());
        process.set_manager_mailbox(self.mailbox.write_mailbox());
        if id != ProcessId::LOGGING {
            if let Some(logging) = self.records.get(&ProcessId::LOGGING) {
                process.set_logging_mailbox(logging.write_mailbox.clone());
            }
        }

        let write_mailbox = mailbox.write_mailbox();
        self.records.insert(
            id,
            ProcessRecord {
                properties,
                write_mailbox: write_mailbox.clone(),
                stage: RecordStage::Active,
            },
        );

        // Open persistent pattern requests cover processes registered later.
        if !id.is_reserved() {
            let interested: Vec<ProcessId> = self
                .persistent_requests
                .iter()
                .filter(|request| request.requester != id && request.pattern.matches(&properties))
                .map(|request| request.requester)
                .collect();
            for requester in interested {
                self.queue_message(requester, AddMailboxMessage::new(write_mailbox.clone()));
            }
        }

        if let Err(error) = self.pool.assign(process) {
            self.records.remove(&id);
            return Err(error);
        }

        info!(process_id = id.0, ?properties, "process registered");
        Ok(write_mailbox)
    }

    fn handle_get_mailbox_by_id(&mut self, source: ProcessId, request: GetMailboxByIdRequest) {
        let target = request.target_id;
        if target == source || target.is_reserved() {
            return;
        }
        let mailbox = match self.records.get(&target) {
            Some(record) if record.is_active() => record.write_mailbox.clone(),
            _ => return,
        };
        self.queue_message(source, AddMailboxMessage::new(mailbox));
    }

    fn handle_get_mailbox_by_properties(
        &mut self,
        source: ProcessId,
        request: GetMailboxByPropertiesRequest,
    ) {
        let matches: Vec<WriteMailbox> = self
            .records
            .iter()
            .filter(|(&id, record)| {
                !id.is_reserved()
                    && id != source
                    && record.is_active()
                    && request.pattern.matches(&record.properties)
            })
            .map(|(_, record)| record.write_mailbox.clone())
            .collect();
        for mailbox in matches {
            self.queue_message(source, AddMailboxMessage::new(mailbox));
        }
        if request.is_persistent {
            self.persistent_requests.push(PersistentRequest {
                requester: source,
                pattern: request.pattern,
            });
        }
    }

    fn handle_add_new_process(&mut self, source: ProcessId, message: AddNewProcessMessage) {
        match self.register_process(message.process) {
            Ok(write_mailbox) if message.return_mailbox => {
                self.queue_message(source, AddMailboxMessage::new(write_mailbox));
            }
            Ok(_) => {}
            Err(error) => warn!(source = source.0, %error, "spawn request rejected"),
        }
    }

    /// Phase one of the two-phase shutdown: ask every other live process to
    /// drop its handles to the target.
    fn initiate_shutdown(&mut self, target: ProcessId, is_hard: bool) {
        match self.records.get(&target) {
            Some(record) if record.is_active() => {}
            _ => return,
        }

        let others: HashSet<ProcessId> = self
            .records
            .iter()
            .filter(|(&id, record)| id != target && record.is_active())
            .map(|(&id, _)| id)
            .collect();

        if others.is_empty() {
            self.order_shutdown(target, is_hard);
            return;
        }

        for &other in &others {
            self.queue_message(other, ReleaseMailboxRequest { process_id: target });
        }
        if let Some(record) = self.records.get_mut(&target) {
            record.stage = RecordStage::AwaitingReleases {
                pending: others,
                is_hard,
            };
        }
        debug!(process_id = target.0, is_hard, "shutdown phase one started");
    }

    /// Phase two: all handles are gone, order the target down.
    fn order_shutdown(&mut self, target: ProcessId, is_hard: bool) {
        if let Some(record) = self.records.get_mut(&target) {
            record.stage = RecordStage::AwaitingShutdownAck;
        }
        self.queue_message(target, ShutdownSelfRequest { is_hard });
    }

    fn handle_release_response(&mut self, source: ProcessId, response: ReleaseMailboxResponse) {
        let target = response.process_id;
        let ready = match self.records.get_mut(&target) {
            Some(ProcessRecord {
                stage: RecordStage::AwaitingReleases { pending, is_hard },
                ..
            }) => {
                pending.remove(&source);
                pending.is_empty().then_some(*is_hard)
            }
            _ => None,
        };
        if let Some(is_hard) = ready {
            self.order_shutdown(target, is_hard);
        }
    }

    fn handle_shutdown_ack(&mut self, source: ProcessId) {
        if self.records.remove(&source).is_none() {
            return;
        }
        info!(process_id = source.0, "process unregistered");
        self.pending_frames.remove(&source);
        self.persistent_requests
            .retain(|request| request.requester != source);

        // A terminated process can no longer acknowledge release requests.
        let ready: Vec<(ProcessId, bool)> = self
            .records
            .iter_mut()
            .filter_map(|(&id, record)| match &mut record.stage {
                RecordStage::AwaitingReleases { pending, is_hard } => {
                    pending.remove(&source);
                    pending.is_empty().then_some((id, *is_hard))
                }
                _ => None,
            })
            .collect();
        for (target, is_hard) in ready {
            self.order_shutdown(target, is_hard);
        }
    }

    fn handle_shutdown_manager(&mut self) {
        if self.shutting_down {
            return;
        }
        info!("manager shutdown started");
        self.shutting_down = true;
        let targets: Vec<ProcessId> = self
            .records
            .iter()
            .filter(|(&id, record)| id != ProcessId::LOGGING && record.is_active())
            .map(|(&id, _)| id)
            .collect();
        for target in targets {
            self.order_shutdown(target, true);
        }
    }

    /// Sequences the tail of a manager shutdown: the logging process goes down
    /// only once it is the last record standing.
    fn service_shutdown(&mut self) {
        if !self.shutting_down || self.records.len() != 1 {
            return;
        }
        let logging_is_last = self
            .records
            .get(&ProcessId::LOGGING)
            .map(ProcessRecord::is_active)
            .unwrap_or(false);
        if logging_is_last {
            self.order_shutdown(ProcessId::LOGGING, true);
        }
    }
}

/// Central coordinator owning every process record, the worker pool, and the
/// shared clock.
pub struct ConcurrencyManager {
    state: ManagerState,
    registry: HandlerRegistry<ManagerState>,
}

impl ConcurrencyManager {
    /// Builds a manager with `worker_count` worker threads and installs the
    /// logging process around `sink`.
    pub fn new(worker_count: usize, sink: impl LogSink) -> FrameworkResult<Self> {
        let time_keeper = TimeKeeper::new();
        let pool = WorkerPool::spawn(worker_count, time_keeper)?;
        let mailbox = ProcessMailbox::new(ProcessId::MANAGER, MANAGER_PROCESS_PROPERTIES);
        let read_mailbox = mailbox.read_mailbox();

        let mut state = ManagerState {
            time_keeper,
            mailbox,
            read_mailbox,
            records: HashMap::new(),
            next_id: ProcessId::FIRST_FREE.0,
            pool,
            persistent_requests: Vec::new(),
            pending_frames: HashMap::new(),
            shutting_down: false,
        };
        state.install_process(logging_process(sink))?;

        let mut registry = HandlerRegistry::new();
        registry.register::<GetMailboxByIdRequest, _>(|state: &mut ManagerState, source, message| {
            state.handle_get_mailbox_by_id(source, *message);
        });
        registry.register::<GetMailboxByPropertiesRequest, _>(|state, source, message| {
            state.handle_get_mailbox_by_properties(source, *message);
        });
        registry.register::<AddNewProcessMessage, _>(|state, source, message| {
            state.handle_add_new_process(source, *message);
        });
        registry.register::<ShutdownProcessMessage, _>(|state, _, message| {
            if !message.process_id.is_reserved() {
                state.initiate_shutdown(message.process_id, false);
            }
        });
        registry.register::<ReleaseMailboxResponse, _>(|state, source, message| {
            state.handle_release_response(source, *message);
        });
        registry.register::<ShutdownSelfResponse, _>(|state, source, _| {
            state.handle_shutdown_ack(source);
        });
        registry.register::<ShutdownManagerMessage, _>(|state, _, _| {
            state.handle_shutdown_manager();
        });

        Ok(Self { state, registry })
    }

    /// Registers a process before or during the run. Fails once manager
    /// shutdown has begun.
    pub fn spawn_process(&mut self, process: Box<dyn ManagedProcess>) -> FrameworkResult<ProcessId> {
        let mailbox = self.state.register_process(process)?;
        self.state.flush_pending_frames();
        Ok(mailbox.process_id())
    }

    /// Write mailbox of the manager itself; external code uses it to inject
    /// shutdown or spawn requests from outside the process graph.
    pub fn write_mailbox(&self) -> WriteMailbox {
        self.state.mailbox.write_mailbox()
    }

    /// Shared clock handle, for callers that want timestamps consistent with
    /// the workers'.
    pub fn time_keeper(&self) -> TimeKeeper {
        self.state.time_keeper
    }

    /// Services the manager loop until every process record is gone, then
    /// stops and joins the workers.
    pub fn run(mut self) {
        while !self.state.records.is_empty() {
            self.service_one_iteration();
            thread::sleep(SERVICE_INTERVAL);
        }
        info!("manager stopped");
        self.state.pool.shutdown();
    }

    fn service_one_iteration(&mut self) {
        let mut frames = Vec::new();
        self.state.read_mailbox.remove_frames(&mut frames);
        for frame in frames {
            let (source, messages) = frame.into_parts();
            for message in messages {
                self.registry.dispatch(&mut self.state, source, message);
            }
        }
        self.state.service_shutdown();
        self.state.flush_pending_frames();
    }
}
