//! Stub collaborators for driving complete engine instances in tests.

use std::io::{self, Cursor, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smallvec::smallvec;

use rchess_core::engine::{Engine, SearchContext};
use rchess_core::eval::Evaluator;
use rchess_core::io::IoChannel;
use rchess_core::position::{MoveList, Position, Rules, StateInfo, StateList};
use rchess_core::search::{RootMoves, SearchLimits, SearchRoutine};
use rchess_core::tb::{ProbeError, TablebaseProbe};
use rchess_core::thread::{PoolShared, WorkerState};
use rchess_core::timeman::TimeController;
use rchess_core::tt::HashTable;
use rchess_core::types::{Move, Value};

/// Output sink shared between the engine instance and the test.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().clone()).expect("utf-8 protocol output")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A fixed three-move game, enough board for protocol tests.
pub struct TestRules;

impl Rules for TestRules {
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

pub struct TestEval;

impl Evaluator for TestEval {
    fn evaluate(&self, _pos: &Position) -> Value {
        Value::ZERO
    }
}

pub struct TestTable;

impl HashTable for TestTable {
    fn resize(&self, _mb: usize, _pool: &PoolShared) {}
    fn clear(&self) {}
}

pub struct TestTb;

impl TablebaseProbe for TestTb {
    fn init(&self, path: &str) -> Result<(), ProbeError> {
        Err(ProbeError::PathNotFound(path.to_string()))
    }
    fn rank_root_moves(&self, _pos: &Position, _root_moves: &mut RootMoves) {}
}

pub struct TestTime;

impl TimeController for TestTime {
    fn init(&self, _limits: &SearchLimits) {}
    fn check(&self, _elapsed: Duration) -> bool {
        true
    }
}

/// A miniature search body: every worker scores the shared root move list
/// deterministically, the main thread fans the helpers out and back in,
/// votes and reports.
pub struct TestRoutine;

impl SearchRoutine for TestRoutine {
    fn search(&self, ctx: &SearchContext, pool: &PoolShared, worker: &mut WorkerState) {
        worker.nodes.fetch_add(100, Ordering::Relaxed);
        let base = ctx.eval.evaluate(&worker.root_pos);
        for (i, rm) in worker.root_moves.iter_mut().enumerate() {
            rm.score = base + Value::new(100 - 10 * i as i32 - worker.idx as i32);
            rm.pv = vec![rm.mv(), Move(8), Move(9)];
        }
        worker.root_moves.sort_by(|a, b| b.score.cmp(&a.score));
        worker.completed_depth = 8;

        if !worker.is_main() {
            if worker.limits.infinite {
                while !pool.stop.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            return;
        }

        pool.start_searching();
        if worker.limits.infinite {
            while !pool.stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(1));
            }
        } else if worker.limits.use_time_management() {
            let started = std::time::Instant::now();
            while !ctx.time.check(started.elapsed()) && !pool.stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        pool.wait_for_search_finished();

        let best = pool.best_thread(worker);
        let (mv, score) = if best == worker.idx {
            (worker.root_moves[0].mv(), worker.root_moves[0].score)
        } else {
            pool.with_worker(best, |w| (w.root_moves[0].mv(), w.root_moves[0].score))
                .expect("best thread exists")
        };
        ctx.io.println(&format!(
            "info depth {} score cp {} nodes {}",
            worker.completed_depth,
            score.raw(),
            pool.nodes_searched()
        ));
        ctx.io.println(&format!("bestmove {}", ctx.rules.format_move(mv)));
    }
}

/// Builds an engine instance bound to `input`, returning it with its output
/// sink.
pub fn test_engine(input: &str) -> (Engine, SharedBuf) {
    let out = SharedBuf::default();
    let ctx = Arc::new(SearchContext {
        rules: Arc::new(TestRules),
        eval: Arc::new(TestEval),
        tt: Arc::new(TestTable),
        tb: Arc::new(TestTb),
        time: Arc::new(TestTime),
        io: Arc::new(IoChannel::new(
            Box::new(Cursor::new(input.as_bytes().to_vec())),
            Box::new(out.clone()),
        )),
    });
    (Engine::new(ctx, Arc::new(TestRoutine)), out)
}
