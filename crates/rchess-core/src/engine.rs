//! The engine context: one explicit object bundling every shared subsystem.
//!
//! Collaborators are injected once at construction and shared by reference
//! with the pool and every worker thread; nothing in the crate reaches for
//! process-wide state, so several independent engine instances can coexist
//! in one process, each bound to its own I/O channel.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::eval::Evaluator;
use crate::io::IoChannel;
use crate::options::OptionMap;
use crate::position::Rules;
use crate::search::SearchRoutine;
use crate::tb::TablebaseProbe;
use crate::thread::ThreadPool;
use crate::timeman::TimeController;
use crate::tt::HashTable;
use crate::tune::Tune;

/// Shared, immutable collaborator bundle handed to every worker thread.
pub struct SearchContext {
    pub rules: Arc<dyn Rules>,
    pub eval: Arc<dyn Evaluator>,
    pub tt: Arc<dyn HashTable>,
    pub tb: Arc<dyn TablebaseProbe>,
    pub time: Arc<dyn TimeController>,
    pub io: Arc<IoChannel>,
}

/// One engine instance: the option and tuning registries, the worker pool
/// and the collaborator context. Option change callbacks receive `&mut
/// Engine` and may reconfigure any of it.
pub struct Engine {
    pub options: OptionMap,
    pub tune: Tune,
    pub threads: ThreadPool,
    ctx: Arc<SearchContext>,
}

impl Engine {
    /// A new instance with an empty option table and an empty pool. Callers
    /// register their option table, then size the pool from it.
    pub fn new(ctx: Arc<SearchContext>, routine: Arc<dyn SearchRoutine>) -> Engine {
        Engine {
            options: OptionMap::new(),
            tune: Tune::new(),
            threads: ThreadPool::new(Arc::clone(&ctx), routine),
            ctx,
        }
    }

    #[inline]
    pub fn ctx(&self) -> &Arc<SearchContext> {
        &self.ctx
    }

    /// Assigns `value` to the named option. A failed validation is a
    /// silent no-op: the previous value stays and no callback runs. On
    /// success the option's change callback, if any, runs exactly once,
    /// after the new value is committed.
    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        match self.options.commit(name, value) {
            Some((snapshot, callback)) => {
                if let Some(callback) = callback {
                    (*callback)(self, &snapshot);
                }
                true
            }
            None => false,
        }
    }

    /// Materializes one spin option per tunable parameter registered in the
    /// tuning registry. Call after the base option table is in place.
    pub fn init_tuned_options(&mut self) {
        let Engine { tune, options, .. } = self;
        tune.init(options);
    }

    /// Reads every tuned parameter back from its option. Invoked by the
    /// tuning registry's change callback.
    pub fn read_tuned_options(&mut self) {
        let Engine { tune, options, .. } = self;
        tune.read_options(options);
    }

    /// Sizes the pool from the `Threads` and `Hash` options.
    pub fn resize_threads(&mut self) {
        let requested = self.options.get("Threads").map_or(1, |o| o.int()) as usize;
        let hash_mb = self.options.get("Hash").map_or(16, |o| o.int()) as usize;
        self.threads.resize(requested, hash_mb);
    }

    /// Resets histories and the shared table for a new game.
    pub fn new_game(&mut self) {
        self.threads.wait_for_search_finished();
        self.threads.clear();
        self.ctx.tt.clear();
    }

    /// Stops any running search and tears the pool down.
    pub fn shutdown(&mut self) {
        if self.threads.size() > 0 {
            self.threads.shared().stop.store(true, Ordering::Relaxed);
            self.threads.resize(0, 0);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
