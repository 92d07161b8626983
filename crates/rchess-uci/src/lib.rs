//! UCI protocol layer for the rchess engine core.
//!
//! The protocol is a line-oriented text channel over the engine instance's
//! own input/output stream pair; nothing here touches the process's
//! standard streams, so independent instances can be served concurrently
//! from one process.

use once_cell::sync::Lazy;

use rchess_core::engine::Engine;

pub mod options;
pub mod protocol;

/// One-line engine identification printed when an instance comes up.
pub fn engine_info() -> &'static str {
    static INFO: Lazy<String> =
        Lazy::new(|| format!("rchess {} by the rchess developers", env!("CARGO_PKG_VERSION")));
    &INFO
}

/// Registers the standard option table, sizes the pool from it and serves
/// the protocol until the peer disconnects or sends `quit`. One call per
/// engine instance.
pub fn serve(engine: &mut Engine) -> anyhow::Result<()> {
    options::register_options(engine);
    engine.init_tuned_options();
    engine.resize_threads();
    protocol::run(engine)
}
