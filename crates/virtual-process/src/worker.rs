//! # Worker Pool
//!
//! Worker threads are the execution substrate under the manager. Each worker
//! owns a disjoint set of processes handed to it over a channel; every tick it
//! runs each owned process one quantum at the shared clock's current time and
//! drops any that reached `Terminated`. Ownership is exclusive, so no process
//! ever runs on two threads and no process state needs a lock.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::error::{FrameworkError, FrameworkResult};
use crate::process::{ManagedProcess, ProcessState};
use crate::time::TimeKeeper;

const TICK_INTERVAL: Duration = Duration::from_millis(1);

enum WorkerCommand {
    Assign(Box<dyn ManagedProcess>),
    Stop,
}

struct Worker {
    sender: Sender<WorkerCommand>,
    handle: Option<JoinHandle<()>>,
}

/// Fixed set of worker threads with round-robin process placement.
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
    next: usize,
}

impl WorkerPool {
    pub(crate) fn spawn(worker_count: usize, time_keeper: TimeKeeper) -> FrameworkResult<Self> {
        if worker_count == 0 {
            return Err(FrameworkError::WorkerUnavailable);
        }
        let workers = (0..worker_count)
            .map(|index| {
                let (sender, receiver) = crossbeam_channel::unbounded();
                let handle = thread::Builder::new()
                    .name(format!("process-worker-{index}"))
                    .spawn(move || worker_loop(index, receiver, time_keeper))
                    .map_err(|_| FrameworkError::WorkerUnavailable)?;
                Ok(Worker {
                    sender,
                    handle: Some(handle),
                })
            })
            .collect::<FrameworkResult<Vec<_>>>()?;
        Ok(Self { workers, next: 0 })
    }

    /// Hands a process to the next worker in round-robin order.
    pub(crate) fn assign(&mut self, process: Box<dyn ManagedProcess>) -> FrameworkResult<()> {
        let index = self.next % self.workers.len();
        self.next = self.next.wrapping_add(1);
        self.workers[index]
            .sender
            .send(WorkerCommand::Assign(process))
            .map_err(|_| FrameworkError::WorkerUnavailable)
    }

    /// Stops every worker and joins its thread. Workers are expected to hold
    /// only terminated processes by the time this is called.
    pub(crate) fn shutdown(&mut self) {
        for worker in &self.workers {
            let _ = worker.sender.send(WorkerCommand::Stop);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, receiver: Receiver<WorkerCommand>, time_keeper: TimeKeeper) {
    let mut processes: Vec<Box<dyn ManagedProcess>> = Vec::new();

    loop {
        match receiver.recv_timeout(TICK_INTERVAL) {
            Ok(WorkerCommand::Assign(mut process)) => {
                process.initialize();
                debug!(worker = index, process_id = process.id().0, "process assigned");
                processes.push(process);
            }
            Ok(WorkerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = time_keeper.current_time();
        processes.retain_mut(|process| {
            process.run(now);
            let alive = process.state() != ProcessState::Terminated;
            if !alive {
                trace!(worker = index, process_id = process.id().0, "process dropped");
            }
            alive
        });
    }
}
