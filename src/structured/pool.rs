//! Supervised pool of parse worker threads.
//!
//! Callers block in [`ParsePool::submit`] until their job is answered or its
//! deadline passes. Jobs wait in one FIFO queue and are handed to idle workers.
//! A worker whose parser panics answers its job with `None` and exits; the pool
//! then respawns the slot after a backoff, or gives the slot up once the restart
//! policy's failure limit is reached.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::cache::{cache_key, Clock, SystemClock, TtlCache};
use super::supervisor::{ExitDecision, SlotSupervisor, WorkerState};
use super::tree::{parse_guarded, SqlTree, StatementParser};
use crate::config::ParseConfig;
use crate::error::{ParseFailure, SqlIndexError};
use crate::parser::DialectOptions;

type ParseResult = Option<Arc<SqlTree>>;

/// A pending parse request.
#[derive(Debug)]
struct Job {
    id: u64,
    text: String,
    dialect: DialectOptions,
    deadline: Instant,
}

struct Slot {
    supervisor: SlotSupervisor,
    sender: Option<Sender<Job>>,
    /// Bumped whenever the slot's worker is replaced; exits reported with an old epoch are ignored
    epoch: u64,
}

struct PoolState {
    slots: Vec<Slot>,
    queue: VecDeque<Job>,
    waiters: HashMap<u64, Sender<ParseResult>>,
}

struct Shared {
    backend: Arc<dyn StatementParser>,
    config: ParseConfig,
    state: Mutex<PoolState>,
    cache: Mutex<TtlCache<ParseResult>>,
    shutdown: AtomicBool,
    next_job: AtomicU64,
    jobs_submitted: AtomicU64,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub live_workers: usize,
    pub degraded_slots: usize,
    pub spawn_attempts: u64,
    pub jobs_submitted: u64,
    pub queued_jobs: usize,
}

/// Fixed-size pool of structured-parse workers with a result cache.
pub struct ParsePool {
    shared: Arc<Shared>,
}

impl ParsePool {
    /// Start `config.pool_size` workers. Failing to start any of them is an error.
    pub fn new(config: &ParseConfig, backend: Arc<dyn StatementParser>) -> Result<Self, SqlIndexError> {
        Self::with_clock(config, backend, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &ParseConfig,
        backend: Arc<dyn StatementParser>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SqlIndexError> {
        let slots = (0..config.pool_size)
            .map(|_| Slot {
                supervisor: SlotSupervisor::new(config.restart),
                sender: None,
                epoch: 0,
            })
            .collect();
        let shared = Arc::new(Shared {
            backend,
            config: config.clone(),
            state: Mutex::new(PoolState {
                slots,
                queue: VecDeque::new(),
                waiters: HashMap::new(),
            }),
            cache: Mutex::new(TtlCache::with_clock(config.cache_capacity, config.cache_ttl, clock)),
            shutdown: AtomicBool::new(false),
            next_job: AtomicU64::new(1),
            jobs_submitted: AtomicU64::new(0),
        });

        let pool = Self { shared };
        for slot in 0..config.pool_size {
            spawn_worker(&pool.shared, slot)
                .map_err(|source| SqlIndexError::WorkerSpawnError { slot, source })?;
        }
        debug!(workers = config.pool_size, "Parse pool started");
        Ok(pool)
    }

    /// Parse one statement, waiting at most `timeout`.
    ///
    /// Returns `None` for oversized statements (without touching the pool or
    /// cache), when no worker is live, on parse failure, worker crash or
    /// timeout. Every outcome except the oversize rejection is cached.
    pub fn submit(&self, text: &str, dialect: DialectOptions, timeout: Duration) -> Option<Arc<SqlTree>> {
        let shared = &self.shared;
        if text.len() > shared.config.max_statement_len {
            trace!(len = text.len(), "Statement too long for structured parse");
            return None;
        }

        let key = cache_key(text, dialect);
        if let Some(cached) = shared.cache.lock().get(&key) {
            trace!("Parse cache hit");
            return cached;
        }

        if shared.shutdown.load(Ordering::Acquire) || !self.is_ready() {
            shared.cache.lock().insert(key, None);
            return None;
        }

        let id = shared.next_job.fetch_add(1, Ordering::Relaxed);
        let (reply, answer) = mpsc::channel();
        {
            let mut state = shared.state.lock();
            state.waiters.insert(id, reply);
            state.queue.push_back(Job {
                id,
                text: text.to_string(),
                dialect,
                deadline: Instant::now() + timeout,
            });
            dispatch(shared, &mut state);
        }
        shared.jobs_submitted.fetch_add(1, Ordering::Relaxed);

        let result = match answer.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => {
                let mut state = shared.state.lock();
                state.waiters.remove(&id);
                state.queue.retain(|job| job.id != id);
                debug!(job = id, "Parse job timed out");
                None
            }
        };
        shared.cache.lock().insert(key, result.clone());
        result
    }

    /// True while at least one worker is live.
    pub fn is_ready(&self) -> bool {
        self.shared
            .state
            .lock()
            .slots
            .iter()
            .any(|slot| slot.supervisor.is_live())
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            live_workers: state.slots.iter().filter(|s| s.supervisor.is_live()).count(),
            degraded_slots: state.slots.iter().filter(|s| s.supervisor.is_degraded()).count(),
            spawn_attempts: state.slots.iter().map(|s| s.supervisor.spawn_attempts()).sum(),
            jobs_submitted: self.shared.jobs_submitted.load(Ordering::Relaxed),
            queued_jobs: state.queue.len(),
        }
    }

    pub fn cached_results(&self) -> usize {
        self.shared.cache.lock().len()
    }

    /// Stop all workers and suppress respawns. Waiting callers receive `None`.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.shared.state.lock();
        for slot in &mut state.slots {
            slot.sender = None;
            slot.epoch += 1;
        }
        state.queue.clear();
        for (_, waiter) in state.waiters.drain() {
            let _ = waiter.send(None);
        }
        debug!("Parse pool shut down");
    }
}

impl Drop for ParsePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Hand queued jobs to idle workers, oldest first.
///
/// A worker that can no longer receive is taken out of service and replaced;
/// its job goes back to the front of the queue.
fn dispatch(shared: &Arc<Shared>, state: &mut PoolState) {
    while !state.queue.is_empty() {
        let Some(slot) = state
            .slots
            .iter()
            .position(|s| s.supervisor.state() == WorkerState::Idle && s.sender.is_some())
        else {
            return;
        };
        let Some(job) = state.queue.pop_front() else {
            return;
        };
        if !state.waiters.contains_key(&job.id) || job.deadline <= Instant::now() {
            continue;
        }

        let target = &mut state.slots[slot];
        let Some(sender) = target.sender.as_ref() else {
            state.queue.push_front(job);
            continue;
        };
        target.supervisor.on_dispatch();
        if let Err(mpsc::SendError(job)) = sender.send(job) {
            warn!(slot, job = job.id, "Parse worker unreachable, requeueing job");
            state.queue.push_front(job);
            handle_exit(shared, state, slot);
        }
    }
}

fn spawn_worker(shared: &Arc<Shared>, slot: usize) -> std::io::Result<()> {
    let mut state = shared.state.lock();
    if shared.shutdown.load(Ordering::Acquire) {
        return Ok(());
    }
    let (sender, jobs) = mpsc::channel();
    let entry = &mut state.slots[slot];
    entry.epoch += 1;
    entry.supervisor.on_spawn_attempt();
    let epoch = entry.epoch;

    let worker_shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("sql-parse-{slot}"))
        .spawn(move || worker_loop(worker_shared, slot, epoch, jobs))?;

    let entry = &mut state.slots[slot];
    entry.sender = Some(sender);
    entry.supervisor.on_spawned();
    trace!(slot, epoch, "Parse worker spawned");
    dispatch(shared, &mut state);
    Ok(())
}

/// Reports the worker's exit however its thread ends.
struct ExitGuard {
    shared: Arc<Shared>,
    slot: usize,
    epoch: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        let mut state = self.shared.state.lock();
        if state.slots[self.slot].epoch != self.epoch {
            return;
        }
        handle_exit(&self.shared, &mut state, self.slot);
    }
}

fn worker_loop(shared: Arc<Shared>, slot: usize, epoch: u64, jobs: Receiver<Job>) {
    let _guard = ExitGuard {
        shared: Arc::clone(&shared),
        slot,
        epoch,
    };

    while let Ok(job) = jobs.recv() {
        let (result, crashed) = match parse_guarded(shared.backend.as_ref(), &job.text, job.dialect) {
            Ok(tree) => (Some(Arc::new(tree)), false),
            Err(ParseFailure::Syntax(message)) => {
                trace!(job = job.id, %message, "Statement did not parse");
                (None, false)
            }
            Err(failure @ ParseFailure::Panicked(_)) => {
                warn!(slot, job = job.id, error = %failure, "Parse worker crashed");
                (None, true)
            }
        };

        let mut state = shared.state.lock();
        match state.waiters.remove(&job.id) {
            Some(waiter) => {
                let _ = waiter.send(result);
            }
            None => trace!(job = job.id, "Discarding result of abandoned job"),
        }
        if crashed || state.slots[slot].epoch != epoch {
            return;
        }
        state.slots[slot].supervisor.on_success();
        dispatch(&shared, &mut state);
    }
}

/// Take a slot's worker out of service and schedule its replacement.
fn handle_exit(shared: &Arc<Shared>, state: &mut PoolState, slot: usize) {
    let entry = &mut state.slots[slot];
    entry.sender = None;
    entry.epoch += 1;
    match entry.supervisor.on_exit() {
        ExitDecision::Respawn(delay) => {
            debug!(slot, ?delay, failures = entry.supervisor.consecutive_failures(), "Scheduling parse worker respawn");
            schedule_respawn(shared, slot, delay);
        }
        ExitDecision::GiveUp => {
            warn!(
                slot,
                failures = entry.supervisor.consecutive_failures(),
                "Parse worker failed too often, slot disabled"
            );
            let any_recoverable = state
                .slots
                .iter()
                .any(|s| s.supervisor.is_live() || !s.supervisor.is_degraded());
            if !any_recoverable {
                warn!("All parse workers disabled, structured parsing unavailable");
                state.queue.clear();
                for (_, waiter) in state.waiters.drain() {
                    let _ = waiter.send(None);
                }
            }
        }
    }
}

fn schedule_respawn(shared: &Arc<Shared>, slot: usize, delay: Duration) {
    let respawn_shared = Arc::clone(shared);
    let timer = thread::Builder::new()
        .name(format!("sql-parse-respawn-{slot}"))
        .spawn(move || {
            thread::sleep(delay);
            if let Err(error) = spawn_worker(&respawn_shared, slot) {
                warn!(slot, %error, "Failed to respawn parse worker");
                let mut state = respawn_shared.state.lock();
                handle_exit(&respawn_shared, &mut state, slot);
            }
        });
    if let Err(error) = timer {
        warn!(slot, %error, "Failed to schedule parse worker respawn");
    }
}
