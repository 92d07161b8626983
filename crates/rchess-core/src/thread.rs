//! Worker threads and the search thread pool.
//!
//! Each worker is one OS thread parked on a condition variable; the
//! distinguished worker at index 0 (the main thread) additionally drives
//! pool-wide bookkeeping: it wakes the helpers, polls the time controller
//! and reconciles the final answer. All hand-offs use a lock + condvar pair
//! per worker, never a spin wait.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::RwLock;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro128PlusPlus;

use crate::engine::SearchContext;
use crate::history::Histories;
use crate::position::{Position, StateList};
use crate::search::{RootMove, RootMoves, SearchLimits, SearchRoutine};
use crate::types::{Depth, Move, Value};

// The external search body recurses deeply; give workers a roomy stack
// instead of relying on platform defaults.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Distinguishes the orchestrating main thread from plain helpers. The
/// distinction is fixed at construction; the pool calls an explicit method
/// set for the main role instead of relying on dynamic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Main,
    Helper,
}

/// Bookkeeping carried only by the main thread, used by the time controller
/// between iterations.
#[derive(Debug, Clone)]
pub struct MainState {
    pub last_info_time: Instant,
    pub previous_time_reduction: f64,
    pub best_previous_score: Value,
    pub best_previous_average_score: Value,
    pub iter_values: [Value; 4],
    pub calls_cnt: i32,
}

impl MainState {
    fn new() -> MainState {
        MainState {
            last_info_time: Instant::now(),
            previous_time_reduction: 1.0,
            best_previous_score: Value::INFINITE,
            best_previous_average_score: Value::INFINITE,
            iter_values: [Value::ZERO; 4],
            calls_cnt: 0,
        }
    }

    fn reset(&mut self) {
        self.previous_time_reduction = 1.0;
        self.best_previous_score = Value::INFINITE;
        self.best_previous_average_score = Value::INFINITE;
        self.calls_cnt = 0;
    }
}

/// Mutable per-worker search state, exclusively borrowed by the search
/// routine while the worker runs and by the pool while it is parked.
pub struct WorkerState {
    pub idx: usize,
    pub role: Role,
    pub root_pos: Position,
    pub root_moves: RootMoves,
    /// Read-only shared prefix of the position-state history.
    pub history: Arc<StateList>,
    pub limits: SearchLimits,
    pub nodes: Arc<AtomicU64>,
    pub tb_hits: Arc<AtomicU64>,
    pub best_move_changes: u64,
    pub sel_depth: i32,
    pub nmp_min_ply: i32,
    pub root_depth: Depth,
    pub completed_depth: Depth,
    pub best_value: Value,
    /// Move-ordering perturbation seed for this episode; the main thread
    /// searches unperturbed.
    pub jitter_seed: Option<u64>,
    pub histories: Histories,
    /// Present exactly when `role == Role::Main`.
    pub main: Option<MainState>,
}

impl WorkerState {
    fn new(idx: usize, role: Role, nodes: Arc<AtomicU64>, tb_hits: Arc<AtomicU64>) -> WorkerState {
        WorkerState {
            idx,
            role,
            root_pos: Position::default(),
            root_moves: RootMoves::new(),
            history: Arc::new(StateList::new()),
            limits: SearchLimits::default(),
            nodes,
            tb_hits,
            best_move_changes: 0,
            sel_depth: 0,
            nmp_min_ply: 0,
            root_depth: 0,
            completed_depth: 0,
            best_value: -Value::INFINITE,
            jitter_seed: None,
            histories: Histories::new(),
            main: None,
        }
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.role == Role::Main
    }
}

struct Flags {
    searching: bool,
    exit: bool,
}

/// Shared half of one worker: the parking lock and the state the pool and
/// the search routine exchange across the handshake.
pub(crate) struct WorkerInner {
    idx: usize,
    flags: Mutex<Flags>,
    cv: Condvar,
    data: Mutex<WorkerState>,
    nodes: Arc<AtomicU64>,
    tb_hits: Arc<AtomicU64>,
}

impl WorkerInner {
    /// Wakes the worker: the flag is set under the lock and the lock is
    /// released before signalling. Callers must only request a search on a
    /// parked worker.
    fn start_searching(&self) {
        let mut flags = self.flags.lock().unwrap();
        flags.searching = true;
        drop(flags); // unlock before notifying
        self.cv.notify_one();
    }

    /// Blocks until the worker has parked again.
    fn wait_for_search_finished(&self) {
        let mut flags = self.flags.lock().unwrap();
        while flags.searching {
            flags = self.cv.wait(flags).unwrap();
        }
    }

    fn is_searching(&self) -> bool {
        self.flags.lock().unwrap().searching
    }
}

/// Owning handle for one worker thread.
struct Worker {
    inner: Arc<WorkerInner>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Launches the thread and waits until it parks in its idle loop, so a
    /// fully constructed worker is always dispatchable. `searching` starts
    /// out true and is cleared by the loop itself.
    fn spawn(
        idx: usize,
        ctx: Arc<SearchContext>,
        shared: Arc<PoolShared>,
        routine: Arc<dyn SearchRoutine>,
    ) -> Worker {
        let role = if idx == 0 { Role::Main } else { Role::Helper };
        let nodes = Arc::new(AtomicU64::new(0));
        let tb_hits = Arc::new(AtomicU64::new(0));
        let mut state = WorkerState::new(idx, role, Arc::clone(&nodes), Arc::clone(&tb_hits));
        if role == Role::Main {
            state.main = Some(MainState::new());
        }
        let inner = Arc::new(WorkerInner {
            idx,
            flags: Mutex::new(Flags {
                searching: true,
                exit: false,
            }),
            cv: Condvar::new(),
            data: Mutex::new(state),
            nodes,
            tb_hits,
        });
        let loop_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("rchess-worker-{idx}"))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || idle_loop(loop_inner, ctx, shared, routine))
            .expect("failed to spawn search thread");
        let worker = Worker {
            inner,
            handle: Some(handle),
        };
        worker.inner.wait_for_search_finished();
        worker
    }
}

impl Drop for Worker {
    /// Wakes the parked loop so it can observe `exit`, then joins. The
    /// worker must already be idle.
    fn drop(&mut self) {
        debug_assert!(!self.inner.is_searching(), "worker destroyed while searching");
        {
            let mut flags = self.inner.flags.lock().unwrap();
            flags.exit = true;
            flags.searching = true;
        }
        self.inner.cv.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Idle loop: park, run the external search routine when told to, re-park.
/// The wake is edge-triggered: the flag is set before the signal and
/// checked under the same lock, so a wake-up is never lost and a spurious
/// wake-up is harmless.
fn idle_loop(
    inner: Arc<WorkerInner>,
    ctx: Arc<SearchContext>,
    shared: Arc<PoolShared>,
    routine: Arc<dyn SearchRoutine>,
) {
    loop {
        {
            let mut flags = inner.flags.lock().unwrap();
            flags.searching = false;
            inner.cv.notify_all(); // wake anyone waiting for search finished
            while !flags.searching {
                flags = inner.cv.wait(flags).unwrap();
            }
            if flags.exit {
                return;
            }
        }
        let mut data = inner.data.lock().unwrap();
        routine.search(&ctx, &shared, &mut data);
    }
}

/// Pool state shared with every worker thread and with the search routine.
pub struct PoolShared {
    pub stop: AtomicBool,
    pub ponder: AtomicBool,
    pub stop_on_ponderhit: AtomicBool,
    pub increase_depth: AtomicBool,
    workers: RwLock<Vec<Arc<WorkerInner>>>,
}

impl PoolShared {
    fn new() -> PoolShared {
        PoolShared {
            stop: AtomicBool::new(false),
            ponder: AtomicBool::new(false),
            stop_on_ponderhit: AtomicBool::new(false),
            increase_depth: AtomicBool::new(true),
            workers: RwLock::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.read().len()
    }

    /// Starts every worker except the main thread. Called by the main
    /// thread's search routine to fan an episode out; dispatch itself only
    /// ever wakes the main thread.
    pub fn start_searching(&self) {
        for w in self.workers.read().iter().skip(1) {
            w.start_searching();
        }
    }

    /// Blocks until every worker except the main thread is idle.
    pub fn wait_for_search_finished(&self) {
        for w in self.workers.read().iter().skip(1) {
            w.wait_for_search_finished();
        }
    }

    /// The protocol's reply to an expected opponent move arriving: leave
    /// ponder mode, and if the main thread already decided to stop once the
    /// hit arrives, raise the stop flag now.
    pub fn on_ponderhit(&self) {
        self.ponder.store(false, Ordering::Relaxed);
        if self.stop_on_ponderhit.load(Ordering::Relaxed) {
            self.stop.store(true, Ordering::Relaxed);
        }
    }

    pub fn nodes_searched(&self) -> u64 {
        self.workers
            .read()
            .iter()
            .map(|w| w.nodes.load(Ordering::Relaxed))
            .sum()
    }

    pub fn tb_hits(&self) -> u64 {
        self.workers
            .read()
            .iter()
            .map(|w| w.tb_hits.load(Ordering::Relaxed))
            .sum()
    }

    /// Runs `f` against the parked worker `idx`'s state. Must not be called
    /// for the caller's own worker index: its state is already exclusively
    /// borrowed by the running routine.
    pub fn with_worker<R>(&self, idx: usize, f: impl FnOnce(&WorkerState) -> R) -> Option<R> {
        let workers = self.workers.read();
        let inner = workers.get(idx)?;
        let data = inner.data.lock().unwrap();
        Some(f(&data))
    }

    /// Reconciles the workers' independent results into one answer. The
    /// caller is the main thread's routine, which passes its own state in;
    /// every other worker must already be idle with a non-empty, up-to-date
    /// root move list.
    pub fn best_thread(&self, main: &WorkerState) -> usize {
        debug_assert!(main.is_main());
        let workers = self.workers.read();
        let mut snapshots = Vec::with_capacity(workers.len());
        for inner in workers.iter() {
            if inner.idx == main.idx {
                snapshots.push(ThreadVote::of(main));
            } else {
                let data = inner.data.lock().unwrap();
                snapshots.push(ThreadVote::of(&data));
            }
        }
        select_best_thread(&snapshots)
    }
}

/// Per-worker snapshot entering the vote.
struct ThreadVote {
    mv: Move,
    score: Value,
    pv_len: usize,
    depth: Depth,
}

impl ThreadVote {
    fn of(w: &WorkerState) -> ThreadVote {
        debug_assert!(!w.root_moves.is_empty(), "vote requires a root move list");
        match w.root_moves.first() {
            Some(rm) => ThreadVote {
                mv: rm.mv(),
                score: rm.score,
                pv_len: rm.pv.len(),
                depth: w.completed_depth,
            },
            None => ThreadVote {
                mv: Move::NONE,
                score: -Value::INFINITE,
                pv_len: 0,
                depth: 0,
            },
        }
    }
}

/// Vote-based best-thread selection. Each worker backs its chosen move with
/// a weight growing with score margin and completed depth; proven wins and
/// losses short-circuit the vote. The formula is a fixed contract inherited
/// from the lazy-SMP scheme, constants included.
fn select_best_thread(threads: &[ThreadVote]) -> usize {
    let min_score = threads.iter().map(|t| t.score).min().unwrap_or(Value::ZERO);
    let thread_value =
        |t: &ThreadVote| (t.score.raw() - min_score.raw() + 14) as i64 * t.depth as i64;

    let mut votes: BTreeMap<Move, i64> = BTreeMap::new();
    for t in threads {
        *votes.entry(t.mv).or_insert(0) += thread_value(t);
    }

    let mut best = 0usize;
    for (i, t) in threads.iter().enumerate() {
        let bt = &threads[best];
        if bt.score.abs() >= Value::TB_WIN_IN_MAX_PLY {
            // Pick the shortest mate / tablebase conversion, or stave off
            // mate the longest.
            if t.score > bt.score {
                best = i;
            }
        } else if t.score >= Value::TB_WIN_IN_MAX_PLY
            || (t.score > Value::TB_LOSS_IN_MAX_PLY
                && (votes[&t.mv] > votes[&bt.mv]
                    || (votes[&t.mv] == votes[&bt.mv]
                        && thread_value(t) * (t.pv_len > 2) as i64
                            > thread_value(bt) * (bt.pv_len > 2) as i64)))
        {
            best = i;
        }
    }
    best
}

/// The worker pool. Owns the worker threads; all access to them goes
/// through this type or through [`PoolShared`].
pub struct ThreadPool {
    workers: Vec<Worker>,
    shared: Arc<PoolShared>,
    ctx: Arc<SearchContext>,
    routine: Arc<dyn SearchRoutine>,
    /// Retained position-state history, reused across successive searches.
    setup_states: Option<Arc<StateList>>,
    limits: SearchLimits,
    rng: Xoshiro128PlusPlus,
}

impl ThreadPool {
    /// An empty pool bound to its collaborators. Collaborators are injected
    /// once here and never rebuilt; call [`ThreadPool::resize`] to populate.
    pub fn new(ctx: Arc<SearchContext>, routine: Arc<dyn SearchRoutine>) -> ThreadPool {
        ThreadPool {
            workers: Vec::new(),
            shared: Arc::new(PoolShared::new()),
            ctx,
            routine,
            setup_states: None,
            limits: SearchLimits::default(),
            rng: Xoshiro128PlusPlus::seed_from_u64(0x9E37_79B9_7F4A_7C15),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn shared(&self) -> &Arc<PoolShared> {
        &self.shared
    }

    #[inline]
    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    pub fn nodes_searched(&self) -> u64 {
        self.shared.nodes_searched()
    }

    pub fn tb_hits(&self) -> u64 {
        self.shared.tb_hits()
    }

    /// Blocks until the whole pool is quiescent. Helpers are only ever
    /// started by the main thread, which fans them back in before its own
    /// episode ends, so main-idle implies pool-idle.
    pub fn wait_for_search_finished(&self) {
        if let Some(main) = self.workers.first() {
            main.inner.wait_for_search_finished();
        }
    }

    /// Creates/destroys workers to match the requested number. Any running
    /// search completes first; existing workers are always torn down and
    /// recreated. `resize(0)` leaves the pool empty (clean shutdown).
    ///
    /// After recreation every per-worker history is reset to its baseline,
    /// the shared hash table is resized to the currently configured
    /// `hash_mb` with the new pool, and the search routine's init hook is
    /// re-run for the new pool shape.
    pub fn resize(&mut self, requested: usize, hash_mb: usize) {
        if !self.workers.is_empty() {
            self.wait_for_search_finished();
            self.shared.workers.write().clear();
            self.workers.clear();
        }

        if requested == 0 {
            return;
        }

        for idx in 0..requested {
            self.workers.push(Worker::spawn(
                idx,
                Arc::clone(&self.ctx),
                Arc::clone(&self.shared),
                Arc::clone(&self.routine),
            ));
        }
        *self.shared.workers.write() = self
            .workers
            .iter()
            .map(|w| Arc::clone(&w.inner))
            .collect();

        self.clear();
        self.ctx.tt.resize(hash_mb, &self.shared);
        self.routine.init(&self.shared);
    }

    /// Resets per-worker histories and counters to their fixed baseline and
    /// the main thread's iteration bookkeeping to its initial values.
    /// Callers must ensure the pool is idle.
    pub fn clear(&mut self) {
        for worker in &self.workers {
            let mut data = worker.inner.data.lock().unwrap();
            data.histories.clear();
            data.nodes.store(0, Ordering::Relaxed);
            data.tb_hits.store(0, Ordering::Relaxed);
            if let Some(main) = data.main.as_mut() {
                main.reset();
            }
        }
    }

    /// Dispatches a new search episode and returns immediately after waking
    /// the main thread; the main thread wakes the helpers itself, so a
    /// helper never starts before the main thread has begun.
    ///
    /// A freshly supplied `states` history is moved into pool-owned storage
    /// (the caller's handle is left empty); with `states` `None` the pool
    /// must still retain a history from a prior call. Dispatching without
    /// any history is a fatal usage error.
    pub fn start_thinking(
        &mut self,
        pos: &Position,
        states: &mut Option<StateList>,
        limits: SearchLimits,
        ponder: bool,
    ) {
        assert!(!self.workers.is_empty(), "start_thinking on an empty pool");

        // Reentrancy guard: a new search cannot begin while one is active.
        self.wait_for_search_finished();

        self.shared.stop_on_ponderhit.store(false, Ordering::Relaxed);
        self.shared.stop.store(false, Ordering::Relaxed);
        self.shared.increase_depth.store(true, Ordering::Relaxed);
        self.shared.ponder.store(ponder, Ordering::Relaxed);

        let mut root_moves: RootMoves = self
            .ctx
            .rules
            .legal_moves(pos)
            .iter()
            .copied()
            .filter(|m| limits.searchmoves.is_empty() || limits.searchmoves.contains(m))
            .map(RootMove::new)
            .collect();

        if !root_moves.is_empty() {
            self.ctx.tb.rank_root_moves(pos, &mut root_moves);
        }

        // After ownership transfer 'states' is empty, so stopping a search
        // and dispatching again without installing a new position requires
        // the history retained from the previous call.
        assert!(
            states.is_some() || self.setup_states.is_some(),
            "start_thinking without a position-state history"
        );
        if let Some(list) = states.take() {
            self.setup_states = Some(Arc::new(list));
        }
        let history = Arc::clone(self.setup_states.as_ref().unwrap());
        let tail = history.last().cloned().unwrap_or_default();

        self.limits = limits.clone();

        // Each worker gets an independent, fully initialized root: the
        // serialized snapshot is re-set per thread and the state fields not
        // derivable from it are spliced in from the history tail. Earlier
        // states are shared read-only.
        for worker in &self.workers {
            let mut data = worker.inner.data.lock().unwrap();
            data.nodes.store(0, Ordering::Relaxed);
            data.tb_hits.store(0, Ordering::Relaxed);
            data.best_move_changes = 0;
            data.sel_depth = 0;
            data.nmp_min_ply = 0;
            data.root_depth = 0;
            data.completed_depth = 0;
            data.best_value = -Value::INFINITE;
            data.root_moves = root_moves.clone();
            data.limits = limits.clone();
            data.history = Arc::clone(&history);
            data.root_pos = Position::rebuild(pos.fen(), &tail);
            data.jitter_seed = if data.idx == 0 {
                None
            } else {
                Some(self.rng.random())
            };
        }

        self.workers[0].inner.start_searching();
    }

    /// Best-thread selection over an idle pool. See
    /// [`PoolShared::best_thread`] for the in-episode variant used by the
    /// main thread's routine.
    pub fn get_best_thread(&self) -> usize {
        assert!(!self.workers.is_empty());
        let main = self.workers[0].inner.data.lock().unwrap();
        self.shared.best_thread(&main)
    }

    /// Runs `f` against a parked worker's state.
    pub fn with_worker<R>(&self, idx: usize, f: impl FnOnce(&WorkerState) -> R) -> Option<R> {
        self.shared.with_worker(idx, f)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.wait_for_search_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::StateInfo;
    use crate::test_support::{test_context, FnRoutine};
    use std::time::Duration;

    fn startpos() -> (Position, Option<StateList>) {
        (Position::new("startpos"), Some(vec![StateInfo::default()]))
    }

    fn idle_routine() -> Arc<dyn SearchRoutine> {
        Arc::new(FnRoutine(|_ctx: &SearchContext, pool: &PoolShared, w: &mut WorkerState| {
            if w.is_main() {
                pool.start_searching();
                pool.wait_for_search_finished();
            }
        }))
    }

    #[test]
    fn resize_creates_contiguous_workers() {
        let mut pool = ThreadPool::new(test_context(), idle_routine());
        for n in [1usize, 4, 2] {
            pool.resize(n, 16);
            assert_eq!(pool.size(), n);
            assert_eq!(pool.shared().size(), n);
            for idx in 0..n {
                let (got_idx, role) = pool.with_worker(idx, |w| (w.idx, w.role)).unwrap();
                assert_eq!(got_idx, idx);
                assert_eq!(role, if idx == 0 { Role::Main } else { Role::Helper });
            }
        }
        pool.resize(0, 16);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn resize_to_zero_then_back_is_fresh() {
        let routine = Arc::new(FnRoutine(|_ctx: &SearchContext, pool: &PoolShared, w: &mut WorkerState| {
            w.nodes.fetch_add(100, Ordering::Relaxed);
            w.completed_depth = 9;
            if w.is_main() {
                pool.start_searching();
                pool.wait_for_search_finished();
            }
        }));
        let mut pool = ThreadPool::new(test_context(), routine);
        pool.resize(2, 16);
        let (pos, mut states) = startpos();
        pool.start_thinking(&pos, &mut states, SearchLimits::default(), false);
        pool.wait_for_search_finished();
        assert!(pool.nodes_searched() > 0);

        pool.resize(0, 16);
        pool.resize(3, 16);
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.nodes_searched(), 0);
        for idx in 0..3 {
            pool.with_worker(idx, |w| {
                assert_eq!(w.completed_depth, 0);
                assert!(w.root_moves.is_empty());
            });
        }
    }

    #[test]
    fn helpers_wake_after_main() {
        for n in [2usize, 4] {
            let wakes: Arc<parking_lot::Mutex<Vec<(usize, Instant)>>> = Arc::default();
            let recorder = Arc::clone(&wakes);
            let routine = Arc::new(FnRoutine(
                move |_ctx: &SearchContext, pool: &PoolShared, w: &mut WorkerState| {
                    recorder.lock().push((w.idx, Instant::now()));
                    if w.is_main() {
                        pool.start_searching();
                        pool.wait_for_search_finished();
                    }
                },
            ));
            let mut pool = ThreadPool::new(test_context(), routine);
            pool.resize(n, 16);
            let (pos, mut states) = startpos();
            pool.start_thinking(&pos, &mut states, SearchLimits::default(), false);
            pool.wait_for_search_finished();

            let wakes = wakes.lock();
            assert_eq!(wakes.len(), n);
            let main_wake = wakes.iter().find(|(idx, _)| *idx == 0).unwrap().1;
            for &(idx, at) in wakes.iter().filter(|(idx, _)| *idx != 0) {
                assert!(at >= main_wake, "helper {idx} woke before the main thread");
            }
        }
    }

    #[test]
    fn resize_blocks_until_search_finishes() {
        let routine = Arc::new(FnRoutine(|_ctx: &SearchContext, pool: &PoolShared, w: &mut WorkerState| {
            if w.is_main() {
                pool.start_searching();
                while !pool.stop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(1));
                }
                pool.wait_for_search_finished();
            }
        }));
        let mut pool = ThreadPool::new(test_context(), routine);
        pool.resize(2, 16);
        let (pos, mut states) = startpos();
        pool.start_thinking(&pos, &mut states, SearchLimits::default(), false);

        // Stop arrives from another thread while the episode runs; resize
        // must block until quiescence, then land on the new size.
        let shared = Arc::clone(pool.shared());
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            shared.stop.store(true, Ordering::Relaxed);
        });
        let t0 = Instant::now();
        pool.resize(3, 16);
        assert!(t0.elapsed() >= Duration::from_millis(50));
        assert_eq!(pool.size(), 3);
        stopper.join().unwrap();
    }

    #[test]
    fn history_ownership_transfer_is_retained() {
        let mut pool = ThreadPool::new(test_context(), idle_routine());
        pool.resize(1, 16);
        let (pos, mut states) = startpos();
        pool.start_thinking(&pos, &mut states, SearchLimits::default(), false);
        assert!(states.is_none(), "dispatch must consume the supplied history");
        pool.wait_for_search_finished();

        // No fresh history: the retained one from the previous call is used.
        let mut none = None;
        pool.start_thinking(&pos, &mut none, SearchLimits::default(), false);
        pool.wait_for_search_finished();
    }

    #[test]
    #[should_panic(expected = "position-state history")]
    fn dispatch_without_history_panics() {
        let mut pool = ThreadPool::new(test_context(), idle_routine());
        pool.resize(1, 16);
        let pos = Position::new("startpos");
        let mut none = None;
        pool.start_thinking(&pos, &mut none, SearchLimits::default(), false);
    }

    #[test]
    fn root_state_spliced_from_history_tail() {
        let mut pool = ThreadPool::new(test_context(), idle_routine());
        pool.resize(2, 16);
        let pos = Position::new("startpos");
        let tail = StateInfo {
            previous: Some(3),
            plies_from_null: 5,
            captured_piece: crate::types::Piece(9),
        };
        let mut states = Some(vec![StateInfo::default(), tail.clone()]);
        pool.start_thinking(&pos, &mut states, SearchLimits::default(), false);
        pool.wait_for_search_finished();
        for idx in 0..2 {
            pool.with_worker(idx, |w| {
                assert_eq!(w.root_pos.state(), &tail);
                assert_eq!(w.history.len(), 2);
            });
        }
    }

    #[test]
    fn searchmoves_restricts_root() {
        let mut pool = ThreadPool::new(test_context(), idle_routine());
        pool.resize(1, 16);
        let (pos, mut states) = startpos();
        let limits = SearchLimits {
            searchmoves: vec![Move(2)],
            ..SearchLimits::default()
        };
        pool.start_thinking(&pos, &mut states, limits, false);
        pool.wait_for_search_finished();
        pool.with_worker(0, |w| {
            assert_eq!(w.root_moves.len(), 1);
            assert_eq!(w.root_moves[0].mv(), Move(2));
        });
    }

    #[test]
    fn counters_aggregate_across_workers() {
        let routine = Arc::new(FnRoutine(|_ctx: &SearchContext, pool: &PoolShared, w: &mut WorkerState| {
            w.nodes.fetch_add(10 + w.idx as u64, Ordering::Relaxed);
            w.tb_hits.fetch_add(1, Ordering::Relaxed);
            if w.is_main() {
                pool.start_searching();
                pool.wait_for_search_finished();
            }
        }));
        let mut pool = ThreadPool::new(test_context(), routine);
        pool.resize(3, 16);
        let (pos, mut states) = startpos();
        pool.start_thinking(&pos, &mut states, SearchLimits::default(), false);
        pool.wait_for_search_finished();
        assert_eq!(pool.nodes_searched(), 10 + 11 + 12);
        assert_eq!(pool.tb_hits(), 3);
    }

    #[test]
    fn ponderhit_clears_ponder_and_honors_deferred_stop() {
        let shared = PoolShared::new();
        shared.ponder.store(true, Ordering::Relaxed);
        shared.on_ponderhit();
        assert!(!shared.ponder.load(Ordering::Relaxed));
        assert!(!shared.stop.load(Ordering::Relaxed));

        shared.ponder.store(true, Ordering::Relaxed);
        shared.stop_on_ponderhit.store(true, Ordering::Relaxed);
        shared.on_ponderhit();
        assert!(shared.stop.load(Ordering::Relaxed));
    }

    fn vote(mv: u16, score: i32, depth: Depth, pv_len: usize) -> ThreadVote {
        ThreadVote {
            mv: Move(mv),
            score: Value(score),
            pv_len,
            depth,
        }
    }

    /// Fixture from the selection contract: minScore = 80, weights
    /// (100-80+14)*10 = 340 and (80-80+14)*12 = 168, no vote tie, so worker
    /// 0's move must win.
    #[test]
    fn voting_fixture_two_workers() {
        let threads = [vote(1, 100, 10, 3), vote(2, 80, 12, 3)];
        assert_eq!(select_best_thread(&threads), 0);
    }

    #[test]
    fn voting_prefers_corroborated_move() {
        // Two workers back move 2 with a combined weight above worker 0's.
        let threads = [vote(1, 100, 10, 3), vote(2, 90, 10, 3), vote(2, 80, 10, 3)];
        assert_eq!(select_best_thread(&threads), 1);
    }

    #[test]
    fn voting_breaks_ties_against_bare_pv() {
        // Same move, equal votes: the deeper-weighted thread wins only if
        // its PV extends past two plies.
        let threads = [vote(1, 50, 10, 2), vote(1, 50, 12, 3)];
        assert_eq!(select_best_thread(&threads), 1);
    }

    #[test]
    fn voting_prefers_shortest_mate() {
        let near_mate = Value::MATE.raw() - 20;
        let nearer_mate = Value::MATE.raw() - 10;
        let threads = [vote(1, near_mate, 10, 3), vote(2, nearer_mate, 8, 3)];
        assert_eq!(select_best_thread(&threads), 1);
    }

    #[test]
    fn voting_ignores_proven_losses() {
        let lost = Value::TB_LOSS_IN_MAX_PLY.raw() - 1;
        let threads = [vote(1, 10, 10, 3), vote(2, lost, 30, 3)];
        assert_eq!(select_best_thread(&threads), 0);
    }

    #[test]
    fn get_best_thread_over_idle_pool() {
        let routine = Arc::new(FnRoutine(|_ctx: &SearchContext, pool: &PoolShared, w: &mut WorkerState| {
            // Deterministic per-worker result: helper 1 goes deeper on the
            // same move as helper 2.
            let (score, depth, mv) = match w.idx {
                0 => (100, 10, Move(1)),
                _ => (90, 12, Move(2)),
            };
            w.completed_depth = depth;
            if let Some(rm) = w.root_moves.iter_mut().find(|rm| rm.mv() == mv) {
                rm.score = Value(score);
                rm.pv = vec![mv, Move(7), Move(8)];
            }
            w.root_moves.sort_by(|a, b| b.score.cmp(&a.score));
            if w.is_main() {
                pool.start_searching();
                pool.wait_for_search_finished();
            }
        }));
        let mut pool = ThreadPool::new(test_context(), routine);
        pool.resize(3, 16);
        let (pos, mut states) = startpos();
        pool.start_thinking(&pos, &mut states, SearchLimits::default(), false);
        pool.wait_for_search_finished();

        // min = 90; weights: main (100-90+14)*10 = 240, helpers
        // (90-90+14)*12 = 168 each, move 2 totals 336 > 240.
        let best = pool.get_best_thread();
        let mv = pool.with_worker(best, |w| w.root_moves[0].mv()).unwrap();
        assert_eq!(mv, Move(2));
    }
}
