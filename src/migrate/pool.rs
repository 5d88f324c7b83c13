use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::warn;

/// How many import units run at once within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// One worker per item.
    Unbounded,
    /// At most `n` workers pulling from a shared queue.
    Bounded(usize),
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::Bounded(8)
    }
}

impl From<usize> for Concurrency {
    /// `0` selects unbounded fan-out.
    fn from(n: usize) -> Self {
        if n == 0 {
            Self::Unbounded
        } else {
            Self::Bounded(n)
        }
    }
}

impl Concurrency {
    pub fn workers(self, items: usize) -> usize {
        match self {
            Self::Unbounded => items,
            Self::Bounded(n) => n.max(1).min(items),
        }
    }
}

/// Run `work` once per item on scoped worker threads and return when every
/// item has been processed. A failing item never stops its siblings; any
/// error handling belongs inside `work`.
pub fn for_each<T, F>(items: &[T], concurrency: Concurrency, work: F)
where
    T: Sync,
    F: Fn(&T) + Sync,
{
    if items.is_empty() {
        return;
    }

    run(items, concurrency.workers(items.len()), &work, |i| {
        Ok(thread::Builder::new().name(format!("railsync-worker-{i}")))
    });
}

/// Start up to `workers` threads draining a shared queue. A thread that
/// cannot be started ends the ramp-up; the ones already running take the
/// rest of the queue, or the calling thread does if none started.
fn run<T, F, B>(items: &[T], workers: usize, work: &F, builder: B)
where
    T: Sync,
    F: Fn(&T) + Sync,
    B: Fn(usize) -> io::Result<thread::Builder>,
{
    let next = AtomicUsize::new(0);
    let drain = || {
        while let Some(item) = items.get(next.fetch_add(1, Ordering::Relaxed)) {
            work(item);
        }
    };

    thread::scope(|scope| {
        let mut started = 0;
        for i in 0..workers {
            match builder(i).and_then(|b| b.spawn_scoped(scope, &drain)) {
                Ok(_) => started += 1,
                Err(err) => {
                    warn!(started, wanted = workers, error = %err, "could not start worker thread");
                    break;
                }
            }
        }
        if started == 0 {
            drain();
        }
    });
}
