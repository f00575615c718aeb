use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// A contiguous run of rays. Ray `i` of the batch uses seed `seed + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// Global index of the first ray.
    pub first_ray: u64,
    pub seed: u64,
    pub count: u64,
}

impl Batch {
    pub fn ray_seed(&self, offset: u64) -> u64 {
        self.seed.wrapping_add(offset)
    }
}

/// Shared flag for cooperative cancellation. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the queue hands out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchPlan {
    pub seed: u64,
    /// Total rays; zero means unbounded.
    pub rays: u64,
    pub time_limit: Option<Duration>,
    pub batch_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Unbounded,
    Remaining(u64),
    /// Budget spent, time up or cancelled. Sticky.
    Drained,
}

#[derive(Debug)]
struct QueueState {
    next_ray: u64,
    budget: Budget,
}

/// Thread-safe generator of batches.
///
/// `pop` returns `None` once no more work will ever be handed out. Limits
/// are checked only when a batch is taken, so batches already running are
/// always allowed to finish.
#[derive(Debug)]
pub struct BatchQueue {
    plan: BatchPlan,
    cancel: CancelToken,
    started: Instant,
    state: Mutex<QueueState>,
}

impl BatchQueue {
    pub fn new(plan: BatchPlan, cancel: CancelToken) -> Self {
        let budget = if plan.rays == 0 {
            Budget::Unbounded
        } else {
            Budget::Remaining(plan.rays)
        };
        Self {
            plan: BatchPlan {
                batch_size: plan.batch_size.max(1),
                ..plan
            },
            cancel,
            started: Instant::now(),
            state: Mutex::new(QueueState {
                next_ray: 0,
                budget,
            }),
        }
    }

    pub fn pop(&self) -> Option<Batch> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.budget == Budget::Drained {
            return None;
        }

        let out_of_time = self
            .plan
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit);
        if self.cancel.is_cancelled() || out_of_time {
            state.budget = Budget::Drained;
            return None;
        }

        let count = match state.budget {
            Budget::Unbounded => self.plan.batch_size,
            Budget::Remaining(remaining) => remaining.min(self.plan.batch_size),
            Budget::Drained => 0,
        };
        if count == 0 {
            state.budget = Budget::Drained;
            return None;
        }

        let batch = Batch {
            first_ray: state.next_ray,
            seed: self.plan.seed.wrapping_add(state.next_ray),
            count,
        };
        state.next_ray += count;
        state.budget = match state.budget {
            Budget::Remaining(remaining) if remaining > count => Budget::Remaining(remaining - count),
            Budget::Remaining(_) => Budget::Drained,
            other => other,
        };
        Some(batch)
    }

    /// Stop handing out work.
    pub fn drain(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.budget = Budget::Drained;
    }

    /// Rays handed out so far.
    pub fn dispatched(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_ray
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }
}

/// Every batch of a finite budget, in dispatch order.
pub fn plan_batches(seed: u64, rays: u64, batch_size: u64) -> Vec<Batch> {
    if rays == 0 {
        return Vec::new();
    }
    let queue = BatchQueue::new(
        BatchPlan {
            seed,
            rays,
            time_limit: None,
            batch_size,
        },
        CancelToken::new(),
    );
    std::iter::from_fn(|| queue.pop()).collect()
}

/// Run `work` over every batch of `queue` on `threads` workers.
///
/// Each worker builds its own state with `init` and keeps it for all the
/// batches it takes; the finished states are returned, one per worker, in
/// no particular order. Zero threads means one per available core.
pub fn run_batches<S, I, W>(
    threads: usize,
    queue: &BatchQueue,
    init: I,
    work: W,
) -> Result<Vec<S>, rayon::ThreadPoolBuildError>
where
    S: Send,
    I: Fn() -> S + Sync,
    W: Fn(&mut S, Batch) + Sync,
{
    let threads = if threads == 0 {
        rayon::current_num_threads()
    } else {
        threads
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("hqz-worker-{i}"))
        .build()?;

    let finished = Mutex::new(Vec::with_capacity(threads));
    pool.scope(|scope| {
        for _ in 0..threads {
            let (finished, init, work) = (&finished, &init, &work);
            scope.spawn(move |_| {
                let mut state = init();
                while let Some(batch) = queue.pop() {
                    work(&mut state, batch);
                }
                finished
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(state);
            });
        }
    });
    Ok(finished.into_inner().unwrap_or_else(PoisonError::into_inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_batch_is_shrunk() {
        let batches = plan_batches(100, 2500, 1000);
        let counts: Vec<u64> = batches.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1000, 1000, 500]);
        assert_eq!(batches[2].seed, 2100);
        assert_eq!(batches[2].first_ray, 2000);
    }

    #[test]
    fn seeds_wrap() {
        let batches = plan_batches(u64::MAX, 3, 2);
        assert_eq!(batches[0].seed, u64::MAX);
        assert_eq!(batches[1].seed, 1);
        assert_eq!(batches[0].ray_seed(1), 0);
    }

    #[test]
    fn cancelled_queue_stays_empty() {
        let cancel = CancelToken::new();
        let queue = BatchQueue::new(
            BatchPlan {
                seed: 0,
                rays: 0,
                time_limit: None,
                batch_size: 10,
            },
            cancel.clone(),
        );
        assert!(queue.pop().is_some());
        cancel.cancel();
        assert!(queue.pop().is_none());
        assert!(queue.pop().is_none());
        assert_eq!(queue.dispatched(), 10);
    }

    #[test]
    fn expired_time_limit_hands_out_nothing() {
        let queue = BatchQueue::new(
            BatchPlan {
                seed: 0,
                rays: 0,
                time_limit: Some(Duration::ZERO),
                batch_size: 10,
            },
            CancelToken::new(),
        );
        assert!(queue.pop().is_none());
    }

    #[test]
    fn zero_batch_size_still_makes_progress() {
        assert_eq!(plan_batches(0, 3, 0).len(), 3);
    }
}
