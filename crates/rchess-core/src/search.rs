//! Root-move bookkeeping, search limits and the search-routine boundary.

use std::time::Duration;

use crate::engine::SearchContext;
use crate::thread::{PoolShared, WorkerState};
use crate::types::{Depth, Move, Value};

/// A candidate first move with its current evaluation and principal
/// variation. `pv[0]` is the root move itself.
#[derive(Debug, Clone)]
pub struct RootMove {
    pub pv: Vec<Move>,
    pub score: Value,
    pub previous_score: Value,
    pub sel_depth: i32,
    /// Rank assigned by the tablebase collaborator, zero when unranked.
    pub tb_rank: i32,
    pub tb_score: Value,
}

impl RootMove {
    pub fn new(m: Move) -> RootMove {
        RootMove {
            pv: vec![m],
            score: -Value::INFINITE,
            previous_score: -Value::INFINITE,
            sel_depth: 0,
            tb_rank: 0,
            tb_score: -Value::INFINITE,
        }
    }

    /// The root move this entry stands for.
    #[inline]
    pub fn mv(&self) -> Move {
        self.pv[0]
    }
}

pub type RootMoves = Vec<RootMove>;

/// Budget and restrictions for one search episode.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    pub nodes: Option<u64>,
    pub movetime: Option<Duration>,
    pub depth: Option<Depth>,
    pub mate: Option<i32>,
    pub infinite: bool,
    /// Restricts the root to these moves when non-empty.
    pub searchmoves: Vec<Move>,
}

impl SearchLimits {
    /// True when no explicit budget is given and the time controller is in
    /// charge of ending the search.
    pub fn use_time_management(&self) -> bool {
        !self.infinite
            && self.nodes.is_none()
            && self.movetime.is_none()
            && self.depth.is_none()
            && self.mate.is_none()
    }
}

/// The externally supplied search body.
///
/// `search` runs synchronously on the worker's own thread with the worker
/// state exclusively borrowed. An implementation running on the main
/// thread (`worker.is_main()`) is expected to fan work out with
/// [`PoolShared::start_searching`], poll the time controller and the shared
/// stop flag at its own safe points, and fan back in with
/// [`PoolShared::wait_for_search_finished`] before returning: a helper must
/// never still be running once the main thread's episode is over.
pub trait SearchRoutine: Send + Sync {
    /// Reinitializes pool-size-dependent search parameters. Called by the
    /// pool at the end of every resize.
    fn init(&self, _pool: &PoolShared) {}

    /// Body of one worker's search episode: fills in the scores, depths and
    /// principal variations of `worker.root_moves`.
    fn search(&self, ctx: &SearchContext, pool: &PoolShared, worker: &mut WorkerState);
}
