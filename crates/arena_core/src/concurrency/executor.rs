//! Runs asynchronous work off the tick thread and resumes it on the tick
//! thread.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::warn;

use crate::concurrency::Action;

/// Bridges async completions back into the tick loop.
///
/// Futures run on the given tokio runtime. When one completes, its
/// continuation is queued and runs, exactly once, during the first
/// [`update`](Executor::update) after completion.
pub struct Executor<T> {
    handle: Handle,
    sender: Sender<Action<T>>,
    receiver: Receiver<Action<T>>,
    pending: Arc<AtomicUsize>,
}

impl<T: 'static> Executor<T> {
    pub fn new(handle: Handle) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            handle,
            sender,
            receiver,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawns `future` and arranges for `continuation` to receive its output
    /// on the tick thread. A future that panics is logged and its
    /// continuation dropped.
    pub fn submit<F, C>(&self, future: F, continuation: C)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        C: FnOnce(&mut T, F::Output) + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let sender = self.sender.clone();

        self.handle.spawn(async move {
            let action: Action<T> = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(output) => Box::new(move |target: &mut T| continuation(target, output)),
                Err(_) => {
                    warn!("⚠️ Executor task panicked; dropping its continuation");
                    Box::new(|_: &mut T| {})
                }
            };
            let _ = sender.send(action);
        });
    }

    /// Runs every continuation that was queued when the call started.
    /// Completions that arrive mid-pass are left for the next call.
    pub fn update(&self, target: &mut T) -> usize {
        let ready = self.receiver.len();
        let mut ran = 0;
        while ran < ready {
            match self.receiver.try_recv() {
                Ok(action) => {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    action(target);
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    /// Submitted work whose continuation has not run yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl<T> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for_completions<T: 'static>(executor: &Executor<T>, count: usize) {
        for _ in 0..200 {
            if executor.receiver.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("completions did not arrive");
    }

    #[tokio::test]
    async fn test_continuation_runs_once_on_update() {
        let executor = Executor::<Vec<u32>>::new(Handle::current());
        executor.submit(async { 21 * 2 }, |log, value| log.push(value));
        assert_eq!(executor.pending(), 1);

        wait_for_completions(&executor, 1).await;

        let mut log = Vec::new();
        assert_eq!(executor.update(&mut log), 1);
        assert_eq!(executor.update(&mut log), 0);
        assert_eq!(log, vec![42]);
        assert_eq!(executor.pending(), 0);
    }

    #[tokio::test]
    async fn test_nothing_runs_before_update() {
        let executor = Executor::<u32>::new(Handle::current());
        executor.submit(async {}, |count, ()| *count += 1);
        wait_for_completions(&executor, 1).await;

        assert_eq!(executor.pending(), 1);
        let mut count = 0;
        executor.update(&mut count);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_panicking_future_is_contained() {
        let executor = Executor::<u32>::new(Handle::current());
        executor.submit(
            async {
                if true {
                    panic!("boom");
                }
            },
            |count, ()| *count += 1,
        );
        executor.submit(async { 5 }, |count, value| *count += value);
        wait_for_completions(&executor, 2).await;

        let mut count = 0;
        executor.update(&mut count);
        assert_eq!(count, 5);
        assert_eq!(executor.pending(), 0);
    }

    struct Chain {
        executor: Executor<Chain>,
        log: Vec<&'static str>,
    }

    #[tokio::test]
    async fn test_completion_during_update_waits_for_next_pass() {
        let executor = Executor::<Chain>::new(Handle::current());
        executor.submit(async {}, |chain: &mut Chain, ()| {
            chain.log.push("first");
            // Lands on the queue while this pass is still running.
            chain.executor.pending.fetch_add(1, Ordering::SeqCst);
            let late: Action<Chain> = Box::new(|chain: &mut Chain| chain.log.push("late"));
            let _ = chain.executor.sender.send(late);
        });
        wait_for_completions(&executor, 1).await;

        let mut chain = Chain {
            executor: executor.clone(),
            log: Vec::new(),
        };
        assert_eq!(executor.update(&mut chain), 1);
        assert_eq!(chain.log, vec!["first"]);
        assert_eq!(executor.pending(), 1);

        assert_eq!(executor.update(&mut chain), 1);
        assert_eq!(chain.log, vec!["first", "late"]);
        assert_eq!(executor.update(&mut chain), 0);
        assert_eq!(executor.pending(), 0);
    }

    #[tokio::test]
    async fn test_work_submitted_from_a_continuation_runs_once() {
        let executor = Executor::<Chain>::new(Handle::current());
        executor.submit(async {}, |chain: &mut Chain, ()| {
            chain.log.push("outer");
            chain
                .executor
                .submit(async {}, |chain: &mut Chain, ()| chain.log.push("inner"));
        });
        wait_for_completions(&executor, 1).await;

        let mut chain = Chain {
            executor: executor.clone(),
            log: Vec::new(),
        };
        assert_eq!(executor.update(&mut chain), 1);
        assert_eq!(chain.log, vec!["outer"]);

        wait_for_completions(&executor, 1).await;
        assert_eq!(executor.update(&mut chain), 1);
        assert_eq!(executor.update(&mut chain), 0);
        assert_eq!(chain.log, vec!["outer", "inner"]);
        assert_eq!(executor.pending(), 0);
    }
}
