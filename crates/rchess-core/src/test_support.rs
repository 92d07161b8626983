//! Stub collaborators shared by the crate's tests.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use smallvec::smallvec;

use crate::engine::SearchContext;
use crate::eval::Evaluator;
use crate::io::IoChannel;
use crate::position::{MoveList, Position, Rules, StateInfo, StateList};
use crate::search::{RootMoves, SearchRoutine, SearchLimits};
use crate::tb::{ProbeError, TablebaseProbe};
use crate::thread::{PoolShared, WorkerState};
use crate::timeman::TimeController;
use crate::tt::HashTable;
use crate::types::{Move, Value};

/// A fixed three-move "game": enough board for the orchestration core.
pub struct StubRules;

impl Rules for StubRules {
    fn legal_moves(&self, _pos: &Position) -> MoveList {
        smallvec![Move(1), Move(2), Move(3)]
    }

    fn parse_position(&self, input: &str) -> anyhow::Result<(Position, StateList)> {
        let fen = input.split_whitespace().next().unwrap_or("startpos");
        Ok((Position::new(fen), vec![StateInfo::default()]))
    }

    fn parse_move(&self, _pos: &Position, s: &str) -> Option<Move> {
        s.strip_prefix('m').and_then(|n| n.parse().ok()).map(Move)
    }

    fn format_move(&self, m: Move) -> String {
        format!("m{}", m.0)
    }
}

pub struct StubEval;

impl Evaluator for StubEval {
    fn evaluate(&self, _pos: &Position) -> Value {
        Value::ZERO
    }
}

pub struct StubTable;

impl HashTable for StubTable {
    fn resize(&self, _mb: usize, _pool: &PoolShared) {}
    fn clear(&self) {}
}

pub struct StubTb;

impl TablebaseProbe for StubTb {
    fn init(&self, _path: &str) -> Result<(), ProbeError> {
        Ok(())
    }
    fn rank_root_moves(&self, _pos: &Position, _root_moves: &mut RootMoves) {}
}

pub struct StubTime;

impl TimeController for StubTime {
    fn init(&self, _limits: &SearchLimits) {}
    fn check(&self, _elapsed: Duration) -> bool {
        true
    }
}

/// Context over the stubs with a discarded I/O channel.
pub fn test_context() -> Arc<SearchContext> {
    Arc::new(SearchContext {
        rules: Arc::new(StubRules),
        eval: Arc::new(StubEval),
        tt: Arc::new(StubTable),
        tb: Arc::new(StubTb),
        time: Arc::new(StubTime),
        io: Arc::new(IoChannel::new(
            Box::new(Cursor::new(Vec::new())),
            Box::new(Vec::new()),
        )),
    })
}

/// Adapts a closure into a [`SearchRoutine`].
pub struct FnRoutine<F>(pub F);

impl<F> SearchRoutine for FnRoutine<F>
where
    F: Fn(&SearchContext, &PoolShared, &mut WorkerState) + Send + Sync,
{
    fn search(&self, ctx: &SearchContext, pool: &PoolShared, worker: &mut WorkerState) {
        (self.0)(ctx, pool, worker)
    }
}

/// A routine that immediately fans out and back in; used where the episode
/// body itself does not matter.
pub fn idle_routine() -> Arc<dyn SearchRoutine> {
    Arc::new(FnRoutine(|_: &SearchContext, pool: &PoolShared, w: &mut WorkerState| {
        if w.is_main() {
            pool.start_searching();
            pool.wait_for_search_finished();
        }
    }))
}
