//! The standard option table and its change actions.

use std::sync::Arc;

use rchess_core::engine::Engine;
use rchess_core::options::{Opt, OptValue};

/// Registers the options this core drives, in their advertised order.
/// Embedding applications may add their own entries afterwards.
pub fn register_options(engine: &mut Engine) {
    const MAX_HASH_MB: i64 = 33_554_432;

    let o = &mut engine.options;
    o.add("Threads", Opt::spin(1, 1, 1024).on_change(Arc::new(on_threads)));
    o.add("Hash", Opt::spin(16, 1, MAX_HASH_MB).on_change(Arc::new(on_hash_size)));
    o.add("Clear Hash", Opt::button().on_change(Arc::new(on_clear_hash)));
    o.add("Ponder", Opt::check(false));
    o.add("MultiPV", Opt::spin(1, 1, 500));
    o.add("Move Overhead", Opt::spin(10, 0, 5000));
    o.add("Slow Mover", Opt::spin(100, 10, 1000));
    o.add("nodestime", Opt::spin(0, 0, 10000));
    o.add(
        "Analysis Contempt",
        Opt::combo("Both var Off var White var Black var Both", "Both"),
    );
    o.add("SyzygyPath", Opt::string_opt("<empty>").on_change(Arc::new(on_tb_path)));
    o.add("SyzygyProbeDepth", Opt::spin(1, 1, 100));
    o.add("Syzygy50MoveRule", Opt::check(true));
    o.add("SyzygyProbeLimit", Opt::spin(7, 0, 7));
}

fn on_threads(engine: &mut Engine, _v: &OptValue) {
    engine.resize_threads();
}

fn on_hash_size(engine: &mut Engine, v: &OptValue) {
    // The table must never be resized under a running search.
    engine.threads.wait_for_search_finished();
    engine.ctx().tt.resize(v.int() as usize, engine.threads.shared());
}

fn on_clear_hash(engine: &mut Engine, _v: &OptValue) {
    engine.new_game();
}

fn on_tb_path(engine: &mut Engine, v: &OptValue) {
    let path = v.string();
    if path.is_empty() || path == "<empty>" {
        return;
    }
    if let Err(err) = engine.ctx().tb.init(path) {
        // Non-fatal: the search proceeds without tablebase knowledge.
        log::warn!("tablebase init failed: {err}");
        engine.ctx().io.info_string(format!("tablebase init failed: {err}"));
    }
}
