//! Worker pool backed by a crossbeam channel.
//!
//! `n` long-lived worker threads drain a shared, unbounded task queue. A task
//! is a callable plus the argument value it runs with; if the callable fails
//! or panics, the pool-wide error handler is invoked with the same argument
//! value. Tasks carry no result channel: callers either write into storage
//! they own (one slot per task, see [`WorkerPool::map_slots`]) and read it
//! after [`WorkerPool::wait_completion`], or communicate through side effects.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Why a single task did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The callable returned an error.
    #[error("task failed: {0}")]
    Failed(String),
    /// The callable panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Errors from submitting work to the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool has been shut down and no longer accepts tasks.
    #[error("worker pool is shut down")]
    Closed,
}

type TaskFn<A> = Box<dyn FnOnce(&A) -> anyhow::Result<()> + Send>;
type ErrorHandler<A> = Arc<dyn Fn(&A, &TaskError) + Send + Sync>;
type EndHandler = Arc<dyn Fn() + Send + Sync>;

struct Task<A> {
    func: TaskFn<A>,
    args: A,
}

/// Counts tasks that were enqueued but have not finished yet.
#[derive(Default)]
struct Completion {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl Completion {
    fn enqueue(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn done(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn pending(&self) -> usize {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self
                .drained
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Fixed-size pool of worker threads draining a shared task queue.
///
/// `A` is the argument value handed to each task and, on failure, to the
/// pool's task error handler.
pub struct WorkerPool<A: Send + 'static> {
    size: usize,
    sender: Option<Sender<Task<A>>>,
    receiver: Receiver<Task<A>>,
    completion: Arc<Completion>,
    on_task_error: ErrorHandler<A>,
    on_pool_end: Option<EndHandler>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: Send + 'static> WorkerPool<A> {
    /// Creates a pool with `workers` threads. A request for zero workers is
    /// coerced to one. Threads are started by [`spawn_workers`](Self::spawn_workers).
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            size: workers.max(1),
            sender: Some(sender),
            receiver,
            completion: Arc::new(Completion::default()),
            on_task_error: Arc::new(|_: &A, error: &TaskError| {
                tracing::warn!(%error, "worker task failed");
            }),
            on_pool_end: None,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Sets the handler invoked with a failed task's argument and error.
    pub fn with_task_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&A, &TaskError) + Send + Sync + 'static,
    {
        self.on_task_error = Arc::new(handler);
        self
    }

    /// Sets a callback invoked each time [`wait_completion`](Self::wait_completion)
    /// returns from the barrier.
    pub fn with_pool_end_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_pool_end = Some(Arc::new(handler));
        self
    }

    /// Number of worker threads this pool runs.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks enqueued but not yet finished.
    pub fn pending(&self) -> usize {
        self.completion.pending()
    }

    /// Enqueues a task. Fails only when the pool has been shut down.
    pub fn add_task<F>(&self, func: F, args: A) -> Result<(), PoolError>
    where
        F: FnOnce(&A) -> anyhow::Result<()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolError::Closed)?;
        self.completion.enqueue();
        let task = Task {
            func: Box::new(func),
            args,
        };
        if sender.send(task).is_err() {
            self.completion.done();
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Starts the worker threads. Calling this more than once is a no-op.
    pub fn spawn_workers(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() || self.sender.is_none() {
            return;
        }
        for id in 0..self.size {
            let receiver = self.receiver.clone();
            let completion = Arc::clone(&self.completion);
            let on_task_error = Arc::clone(&self.on_task_error);
            let spawned = thread::Builder::new()
                .name(format!("convoscribe-worker-{id}"))
                .spawn(move || worker_loop(receiver, completion, on_task_error));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(error) => tracing::error!(%error, worker = id, "failed to spawn worker"),
            }
        }
        if workers.is_empty() {
            // Without any thread the barrier could never drain; run inline instead.
            tracing::error!("no worker thread could be spawned, draining queue inline");
            drop(workers);
            while let Ok(task) = self.receiver.try_recv() {
                run_task(task, &self.on_task_error);
                self.completion.done();
            }
        } else {
            tracing::debug!(workers = workers.len(), "worker pool started");
        }
    }

    /// Blocks until every task enqueued so far has been dequeued and finished,
    /// including its error handler. Starts the workers first if needed.
    pub fn wait_completion(&self) {
        self.spawn_workers();
        self.completion.wait();
        if let Some(on_pool_end) = &self.on_pool_end
            && let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_pool_end()))
        {
            tracing::error!(panic = %panic_message(payload.as_ref()), "pool end handler panicked");
        }
    }

    /// Stops accepting tasks, lets workers drain the queue and joins them.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in workers {
            if let Err(payload) = handle.join() {
                tracing::error!(panic = %panic_message(payload.as_ref()), "worker thread panicked");
            }
        }
        // Tasks queued on a pool whose workers never started are discarded.
        while self.receiver.try_recv().is_ok() {
            self.completion.done();
        }
    }
}

impl WorkerPool<usize> {
    /// Runs `func` once per input on the pool and returns the results in input
    /// order.
    ///
    /// One result slot per input is allocated before dispatch and each task only
    /// ever writes its own slot. Blocks on the completion barrier, so it also
    /// waits for any other work already queued on this pool.
    pub fn map_slots<T, R, F>(
        &self,
        inputs: Vec<T>,
        func: F,
    ) -> Result<Vec<Result<R, TaskError>>, PoolError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let slots: Arc<Vec<Mutex<Option<Result<R, TaskError>>>>> =
            Arc::new((0..inputs.len()).map(|_| Mutex::new(None)).collect());
        let func = Arc::new(func);

        for (index, input) in inputs.into_iter().enumerate() {
            let slots = Arc::clone(&slots);
            let func = Arc::clone(&func);
            self.add_task(
                move |&index: &usize| {
                    let outcome = func(input);
                    let (stored, returned) = match outcome {
                        Ok(value) => (Ok(value), Ok(())),
                        Err(error) => (Err(TaskError::Failed(format!("{error:#}"))), Err(error)),
                    };
                    *slots[index].lock().unwrap_or_else(PoisonError::into_inner) = Some(stored);
                    returned
                },
                index,
            )?;
        }

        self.wait_completion();

        Ok(slots
            .iter()
            .map(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .unwrap_or_else(|| {
                        Err(TaskError::Panicked("task ended without a result".to_string()))
                    })
            })
            .collect())
    }
}

impl<A: Send + 'static> Drop for WorkerPool<A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<A>(
    receiver: Receiver<Task<A>>,
    completion: Arc<Completion>,
    on_task_error: ErrorHandler<A>,
) {
    while let Ok(task) = receiver.recv() {
        run_task(task, &on_task_error);
        completion.done();
    }
}

fn run_task<A>(task: Task<A>, on_task_error: &ErrorHandler<A>) {
    let Task { func, args } = task;
    let failure = match panic::catch_unwind(AssertUnwindSafe(|| func(&args))) {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(TaskError::Failed(format!("{error:#}"))),
        Err(payload) => Some(TaskError::Panicked(panic_message(payload.as_ref()))),
    };
    if let Some(error) = failure
        && let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| on_task_error(&args, &error)))
    {
        tracing::error!(panic = %panic_message(payload.as_ref()), "task error handler panicked");
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_zero_workers_coerced_to_one() {
        let pool: WorkerPool<usize> = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_all_tasks_run_before_barrier_returns() {
        let pool = WorkerPool::new(3);
        pool.spawn_workers();
        let results = Arc::new(Mutex::new(HashMap::new()));

        for i in 0..50usize {
            let results = Arc::clone(&results);
            pool.add_task(
                move |key: &usize| {
                    results.lock().unwrap().insert(*key, key * 2);
                    Ok(())
                },
                i,
            )
            .unwrap();
        }
        pool.wait_completion();

        assert_eq!(results.lock().unwrap().len(), 50);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_failing_task_invokes_handler_with_args() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_handler = Arc::clone(&seen);
        let pool = WorkerPool::new(2).with_task_error_handler(move |args: &String, error| {
            seen_handler
                .lock()
                .unwrap()
                .push((args.clone(), error.clone()));
        });

        pool.add_task(|_| anyhow::bail!("boom"), "payload-1".to_string())
            .unwrap();
        pool.add_task(|_| Ok(()), "payload-2".to_string()).unwrap();
        pool.wait_completion();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "payload-1");
        assert_eq!(seen[0].1, TaskError::Failed("boom".to_string()));
    }

    #[test]
    fn test_panicking_task_does_not_deadlock() {
        let handled = Arc::new(AtomicUsize::new(0));
        let handled_clone = Arc::clone(&handled);
        let pool = WorkerPool::new(1).with_task_error_handler(move |_: &usize, error| {
            assert!(matches!(error, TaskError::Panicked(_)));
            handled_clone.fetch_add(1, Ordering::SeqCst);
        });

        pool.add_task(|_| panic!("worker task exploded"), 0).unwrap();
        pool.add_task(|_| Ok(()), 1).unwrap();
        pool.wait_completion();

        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_is_swallowed() {
        let pool = WorkerPool::new(1)
            .with_task_error_handler(|_: &usize, _| panic!("handler exploded"));
        let ran = Arc::new(AtomicUsize::new(0));

        pool.add_task(|_| anyhow::bail!("first"), 0).unwrap();
        let ran_clone = Arc::clone(&ran);
        pool.add_task(
            move |_| {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            1,
        )
        .unwrap();
        pool.wait_completion();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_end_handler_runs_after_barrier() {
        let ended = Arc::new(AtomicUsize::new(0));
        let ended_clone = Arc::clone(&ended);
        let pool = WorkerPool::new(2).with_pool_end_handler(move || {
            ended_clone.fetch_add(1, Ordering::SeqCst);
        });

        pool.add_task(|_: &usize| Ok(()), 0).unwrap();
        pool.wait_completion();
        pool.wait_completion();

        assert_eq!(ended.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_completion_without_tasks_returns() {
        let pool: WorkerPool<usize> = WorkerPool::new(4);
        pool.wait_completion();
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_add_task_after_shutdown_is_rejected() {
        let mut pool: WorkerPool<usize> = WorkerPool::new(2);
        pool.spawn_workers();
        pool.shutdown();

        let result = pool.add_task(|_| Ok(()), 0);
        assert_eq!(result, Err(PoolError::Closed));
    }

    #[test]
    fn test_shutdown_drains_queued_tasks() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(2);
        pool.spawn_workers();
        for i in 0..20usize {
            let count = Arc::clone(&count);
            pool.add_task(
                move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                i,
            )
            .unwrap();
        }
        pool.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_map_slots_preserves_input_order() {
        let pool = WorkerPool::new(4);
        let results = pool
            .map_slots((0..10).collect::<Vec<u32>>(), |n| {
                if n == 3 {
                    anyhow::bail!("three is unlucky");
                }
                Ok(n * n)
            })
            .unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(results[2], Ok(4));
        assert_eq!(
            results[3],
            Err(TaskError::Failed("three is unlucky".to_string()))
        );
        assert_eq!(results[9], Ok(81));
    }

    #[test]
    fn test_map_slots_records_panics() {
        let pool = WorkerPool::new(2);
        let results = pool
            .map_slots(vec![1u32, 2], |n| {
                if n == 2 {
                    panic!("bad input");
                }
                Ok(n)
            })
            .unwrap();

        assert_eq!(results[0], Ok(1));
        assert!(matches!(results[1], Err(TaskError::Panicked(_))));
    }

    #[test]
    fn test_map_slots_empty_input() {
        let pool = WorkerPool::new(2);
        let results = pool.map_slots(Vec::<u8>::new(), |n| Ok(n)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_panic_message_variants() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new("owned".to_string());
        let other: Box<dyn Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
