//! The protocol loop: parses line-oriented commands from the instance's
//! input stream and drives the pool.
//!
//! Dispatch-side commands return as soon as the main thread is woken; the
//! search routine owns all output produced during an episode (`info` lines
//! and the final `bestmove`), so the loop stays responsive to `stop` and
//! `ponderhit` while a search runs.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use rchess_core::engine::Engine;
use rchess_core::position::{Position, Rules, StateList};
use rchess_core::search::SearchLimits;

use crate::engine_info;

pub fn run(engine: &mut Engine) -> Result<()> {
    let io = Arc::clone(&engine.ctx().io);
    io.println(engine_info());

    let mut pos: Option<Position> = None;
    let mut states: Option<StateList> = None;

    loop {
        let Some(line) = io.read_line()? else { break };
        let line = line.trim();
        let (cmd, args) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => {}
            "uci" => {
                io.println(&format!("id name rchess {}", env!("CARGO_PKG_VERSION")));
                io.println("id author the rchess developers");
                for opt_line in engine.options.to_string().lines() {
                    io.println(opt_line);
                }
                io.println("uciok");
            }
            "isready" => io.println("readyok"),
            "setoption" => match split_setoption(args) {
                Some((name, value)) => {
                    if !engine.options.contains(name) {
                        io.println(&format!("No such option: {name}"));
                    } else if !engine.set_option(name, value) {
                        // Bad value: previous setting stays in effect.
                        log::debug!("setoption rejected: {name} = {value}");
                    }
                }
                None => log::debug!("malformed setoption: {args}"),
            },
            "ucinewgame" => engine.new_game(),
            "position" => match engine.ctx().rules.parse_position(args) {
                Ok((p, s)) => {
                    pos = Some(p);
                    states = Some(s);
                }
                Err(err) => log::warn!("position rejected: {err:#}"),
            },
            "go" => {
                if pos.is_none() {
                    let (p, s) = engine.ctx().rules.parse_position("startpos")?;
                    pos = Some(p);
                    states = Some(s);
                }
                let p = pos.as_ref().unwrap();
                let (limits, ponder) = parse_go(engine.ctx().rules.as_ref(), p, args);
                engine.ctx().time.init(&limits);
                let p = p.clone();
                engine.threads.start_thinking(&p, &mut states, limits, ponder);
            }
            "stop" => engine.threads.shared().stop.store(true, Ordering::Relaxed),
            "ponderhit" => engine.threads.shared().on_ponderhit(),
            "quit" => break,
            _ => log::debug!("unknown command: {line}"),
        }
    }

    engine.shutdown();
    Ok(())
}

/// Splits `name <name> [value <value>]`. The name may contain spaces.
fn split_setoption(args: &str) -> Option<(&str, &str)> {
    let rest = args.strip_prefix("name")?.trim_start();
    match rest.find(" value ") {
        Some(i) => Some((rest[..i].trim_end(), rest[i + 7..].trim())),
        None => Some((rest.trim_end(), "")),
    }
    .filter(|(name, _)| !name.is_empty())
}

fn parse_go(rules: &dyn Rules, pos: &Position, args: &str) -> (SearchLimits, bool) {
    let mut limits = SearchLimits::default();
    let mut ponder = false;
    let mut tokens = args.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        match token {
            "searchmoves" => {
                while let Some(&next) = tokens.peek() {
                    match rules.parse_move(pos, next) {
                        Some(m) => {
                            limits.searchmoves.push(m);
                            tokens.next();
                        }
                        None => break,
                    }
                }
            }
            "ponder" => ponder = true,
            "nodes" => limits.nodes = tokens.next().and_then(|v| v.parse().ok()),
            "movetime" => {
                limits.movetime = tokens
                    .next()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
            }
            "depth" => limits.depth = tokens.next().and_then(|v| v.parse().ok()),
            "mate" => limits.mate = tokens.next().and_then(|v| v.parse().ok()),
            "infinite" => limits.infinite = true,
            _ => {}
        }
    }
    (limits, ponder)
}
