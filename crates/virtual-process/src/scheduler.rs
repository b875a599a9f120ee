//! # Task Scheduler
//!
//! A per-process timed-task facility built on a binary min-heap ordered by
//! execution time. Each process services its own scheduler once per quantum, so
//! tasks run on the owning worker thread with mutable access to the process's
//! context; there is no global timer thread.
//!
//! Tasks are reference counted. The scheduler holds one reference for every
//! scheduled task and callers may keep another as a cancellation handle. Each
//! task tracks its own heap slot, which makes cancellation a single O(log n)
//! heap repair instead of a linear scan.
//!
//! Rescheduling is deferred: a payload that asks to run again is reinserted only
//! after the current service pass finishes, so a reschedule time at or before
//! the current time fires on the next service call rather than re-entering the
//! current one.

use std::sync::Arc;

use parking_lot::Mutex;

/// Fractional slack below which a quantized time rounds down instead of up,
/// absorbing floating point noise at exact granularity multiples.
const GRANULARITY_FRACTION_CUTOFF: f64 = 0.00001;

/// Work item executed by a [`TaskScheduler`] when its time arrives.
pub trait TaskPayload<C>: Send {
    /// Runs the task. Returning `Some(time)` reschedules it at `time`;
    /// returning `None` completes it.
    fn execute(&mut self, current_time: f64, context: &mut C) -> Option<f64>;
}

impl<C, F> TaskPayload<C> for F
where
    F: FnMut(f64, &mut C) -> Option<f64> + Send,
{
    fn execute(&mut self, current_time: f64, context: &mut C) -> Option<f64> {
        self(current_time, context)
    }
}

struct TaskState {
    execute_time: f64,
    heap_index: Option<usize>,
}

/// A schedulable task: an execution time plus a payload.
///
/// The scheduling state and the payload live behind separate locks so that a
/// payload running inside [`TaskScheduler::service`] can observe or cancel
/// other tasks without deadlocking on its own entry.
pub struct ScheduledTask<C> {
    state: Mutex<TaskState>,
    payload: Mutex<Box<dyn TaskPayload<C>>>,
}

/// Shared handle to a scheduled task, usable for cancellation.
pub type TaskHandle<C> = Arc<ScheduledTask<C>>;

impl<C> ScheduledTask<C> {
    pub fn new(execute_time: f64, payload: Box<dyn TaskPayload<C>>) -> TaskHandle<C> {
        Arc::new(Self {
            state: Mutex::new(TaskState {
                execute_time,
                heap_index: None,
            }),
            payload: Mutex::new(payload),
        })
    }

    pub fn execute_time(&self) -> f64 {
        self.state.lock().execute_time
    }

    pub fn is_scheduled(&self) -> bool {
        self.state.lock().heap_index.is_some()
    }

    fn heap_index(&self) -> Option<usize> {
        self.state.lock().heap_index
    }

    fn set_heap_index(&self, index: Option<usize>) {
        self.state.lock().heap_index = index;
    }
}

/// Min-heap of timed tasks serviced cooperatively by the owning thread.
///
/// `C` is the context type passed mutably to payloads; the default `()` suits
/// standalone use.
pub struct TaskScheduler<C = ()> {
    heap: Vec<TaskHandle<C>>,
    granularity: f64,
}

impl<C> TaskScheduler<C> {
    /// A scheduler with no time quantization.
    pub fn new() -> Self {
        Self::with_granularity(0.0)
    }

    /// A scheduler that rounds submitted execution times up to multiples of
    /// `granularity` (zero disables quantization).
    pub fn with_granularity(granularity: f64) -> Self {
        Self {
            heap: Vec::new(),
            granularity,
        }
    }

    pub fn count(&self) -> usize {
        self.heap.len()
    }

    /// Earliest pending execution time, if any task is scheduled.
    pub fn next_task_time(&self) -> Option<f64> {
        self.heap.first().map(|task| task.execute_time())
    }

    /// Schedules a task, quantizing its execution time per the scheduler's
    /// granularity.
    ///
    /// # Panics
    ///
    /// Panics if the task is already scheduled.
    pub fn submit_task(&mut self, task: &TaskHandle<C>) {
        {
            let mut state = task.state.lock();
            if state.heap_index.is_some() {
                panic!("task submitted while already scheduled");
            }
            state.execute_time = quantize_time(state.execute_time, self.granularity);
        }
        self.insert(Arc::clone(task));
    }

    /// Cancels a task if it is currently scheduled; a no-op otherwise.
    pub fn remove_task(&mut self, task: &TaskHandle<C>) {
        if let Some(index) = task.heap_index() {
            self.remove_at(index);
        }
    }

    /// Executes every task whose time is at or before `current_time`, in time
    /// order. Rescheduled tasks are reinserted after the pass, so they run no
    /// earlier than the next service call.
    pub fn service(&mut self, current_time: f64, context: &mut C) {
        let mut rescheduled = Vec::new();

        while let Some(next_time) = self.next_task_time() {
            if next_time > current_time {
                break;
            }
            let task = self.remove_at(0);
            let outcome = task.payload.lock().execute(current_time, context);
            if let Some(new_time) = outcome {
                task.state.lock().execute_time = new_time;
                rescheduled.push(task);
            }
        }

        for task in rescheduled {
            self.insert(task);
        }
    }

    /// Moves every task scheduled in `other` into this scheduler, preserving
    /// execution times. Used to fold a temporary scheduler's submissions back
    /// into the primary one.
    pub fn absorb(&mut self, mut other: TaskScheduler<C>) {
        for task in other.heap.drain(..) {
            task.set_heap_index(None);
            self.insert(task);
        }
    }

    fn insert(&mut self, task: TaskHandle<C>) {
        let index = self.heap.len();
        task.set_heap_index(Some(index));
        self.heap.push(task);
        self.sift_up(index);
    }

    fn remove_at(&mut self, index: usize) -> TaskHandle<C> {
        let removed = self.heap.swap_remove(index);
        removed.set_heap_index(None);
        if index < self.heap.len() {
            self.heap[index].set_heap_index(Some(index));
            let moved_up = self.sift_up(index);
            if !moved_up {
                self.sift_down(index);
            }
        }
        removed
    }

    fn sift_up(&mut self, mut index: usize) -> bool {
        let mut moved = false;
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[index].execute_time() >= self.heap[parent].execute_time() {
                break;
            }
            self.swap_entries(index, parent);
            index = parent;
            moved = true;
        }
        moved
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            if left >= self.heap.len() {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < self.heap.len()
                && self.heap[right].execute_time() < self.heap[left].execute_time()
            {
                smallest = right;
            }
            if self.heap[index].execute_time() <= self.heap[smallest].execute_time() {
                break;
            }
            self.swap_entries(index, smallest);
            index = smallest;
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.heap[a].set_heap_index(Some(a));
        self.heap[b].set_heap_index(Some(b));
    }
}

impl<C> Default for TaskScheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Drop for TaskScheduler<C> {
    fn drop(&mut self) {
        // Outstanding handles observe cancellation rather than a stale slot.
        for task in self.heap.drain(..) {
            task.set_heap_index(None);
        }
    }
}

fn quantize_time(time: f64, granularity: f64) -> f64 {
    if granularity <= 0.0 {
        return time;
    }
    let quotient = time / granularity;
    let floor = quotient.floor();
    if quotient - floor <= GRANULARITY_FRACTION_CUTOFF {
        floor * granularity
    } else {
        (floor + 1.0) * granularity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingPayload {
        count: Arc<AtomicU32>,
        reschedule_delta: Option<f64>,
    }

    impl TaskPayload<()> for CountingPayload {
        fn execute(&mut self, current_time: f64, _: &mut ()) -> Option<f64> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.reschedule_delta.map(|delta| current_time + delta)
        }
    }

    fn counting_task(
        execute_time: f64,
        reschedule_delta: Option<f64>,
    ) -> (TaskHandle<()>, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let task = ScheduledTask::new(
            execute_time,
            Box::new(CountingPayload {
                count: Arc::clone(&count),
                reschedule_delta,
            }),
        );
        (task, count)
    }

    #[test]
    fn submit_and_remove_track_scheduled_state() {
        let mut scheduler = TaskScheduler::new();
        let (task, _) = counting_task(1.0, None);

        assert!(!task.is_scheduled());
        scheduler.submit_task(&task);
        assert!(task.is_scheduled());
        assert_eq!(scheduler.count(), 1);

        scheduler.remove_task(&task);
        assert!(!task.is_scheduled());
        assert_eq!(scheduler.count(), 0);

        // Removing an unscheduled task is a no-op.
        scheduler.remove_task(&task);
        assert_eq!(scheduler.count(), 0);
    }

    #[test]
    #[should_panic(expected = "already scheduled")]
    fn double_submit_panics() {
        let mut scheduler = TaskScheduler::new();
        let (task, _) = counting_task(1.0, None);
        scheduler.submit_task(&task);
        scheduler.submit_task(&task);
    }

    #[test]
    fn destruction_cancels_all_tasks() {
        let (task_a, _) = counting_task(1.0, None);
        let (task_b, _) = counting_task(2.0, None);
        {
            let mut scheduler = TaskScheduler::new();
            scheduler.submit_task(&task_a);
            scheduler.submit_task(&task_b);
            assert!(task_a.is_scheduled());
            assert!(task_b.is_scheduled());
        }
        assert!(!task_a.is_scheduled());
        assert!(!task_b.is_scheduled());
    }

    #[test]
    fn granularity_rounds_submission_times_up() {
        let cases = [
            (0.0, 0.0),
            (0.01, 1.0),
            (0.999, 1.0),
            (1.0, 1.0),
            (1.1, 2.0),
            (1.99, 2.0),
            (2.0, 2.0),
            (2.5, 3.0),
        ];
        for (submitted, expected) in cases {
            let mut scheduler = TaskScheduler::with_granularity(1.0);
            let (task, _) = counting_task(submitted, None);
            scheduler.submit_task(&task);
            assert_eq!(
                task.execute_time(),
                expected,
                "submitted time {submitted} should quantize to {expected}"
            );
        }
    }

    #[test]
    fn tasks_execute_in_time_order() {
        let mut scheduler = TaskScheduler::new();
        let mut context = ();
        let order = Arc::new(Mutex::new(Vec::new()));

        for time in [3.0, 1.0, 2.0] {
            let order = Arc::clone(&order);
            let task = ScheduledTask::new(
                time,
                Box::new(move |_: f64, _: &mut ()| -> Option<f64> {
                    order.lock().push(time);
                    None
                }),
            );
            scheduler.submit_task(&task);
        }

        scheduler.service(10.0, &mut context);
        assert_eq!(*order.lock(), vec![1.0, 2.0, 3.0]);
        assert_eq!(scheduler.count(), 0);
    }

    #[test]
    fn tasks_after_current_time_do_not_fire() {
        let mut scheduler = TaskScheduler::new();
        let mut context = ();
        let (task, count) = counting_task(5.0, None);
        scheduler.submit_task(&task);

        scheduler.service(4.999, &mut context);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(task.is_scheduled());

        scheduler.service(5.0, &mut context);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!task.is_scheduled());
    }

    #[test]
    fn reschedule_fires_once_per_service_pass() {
        let mut scheduler = TaskScheduler::new();
        let mut context = ();
        let (task, count) = counting_task(1.0, Some(0.1));
        scheduler.submit_task(&task);

        let expectations = [(0.5, 0), (1.0, 1), (2.0, 2), (2.05, 2), (2.1, 3)];
        for (time, expected) in expectations {
            scheduler.service(time, &mut context);
            assert_eq!(
                count.load(Ordering::SeqCst),
                expected,
                "execution count after servicing at {time}"
            );
        }
        assert!(task.is_scheduled());
    }

    #[test]
    fn absorb_merges_pending_tasks() {
        let mut primary = TaskScheduler::new();
        let mut secondary = TaskScheduler::new();
        let mut context = ();

        let (task_a, count_a) = counting_task(1.0, None);
        let (task_b, count_b) = counting_task(2.0, None);
        primary.submit_task(&task_a);
        secondary.submit_task(&task_b);

        primary.absorb(secondary);
        assert_eq!(primary.count(), 2);

        primary.service(5.0, &mut context);
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_from_middle_preserves_order() {
        let mut scheduler = TaskScheduler::new();
        let mut context = ();

        let tasks: Vec<_> = [5.0, 1.0, 4.0, 2.0, 3.0]
            .into_iter()
            .map(|time| counting_task(time, None))
            .collect();
        for (task, _) in &tasks {
            scheduler.submit_task(task);
        }

        // Cancel the task scheduled at 2.0.
        scheduler.remove_task(&tasks[3].0);
        assert_eq!(scheduler.count(), 4);

        scheduler.service(10.0, &mut context);
        assert_eq!(tasks[3].1.load(Ordering::SeqCst), 0);
        for (index, (_, count)) in tasks.iter().enumerate() {
            if index != 3 {
                assert_eq!(count.load(Ordering::SeqCst), 1);
            }
        }
    }
}
