//! Root position snapshot and state history.
//!
//! The board representation lives in an external collaborator behind the
//! [`Rules`] trait; the core carries positions as opaque serialized
//! snapshots plus the small set of state fields that cannot be rebuilt
//! from a snapshot alone.

use smallvec::SmallVec;

use crate::types::{Move, Piece};

/// Legal-move list as produced by the board collaborator.
pub type MoveList = SmallVec<[Move; 64]>;

/// Root state fields not derivable from a serialized snapshot: the link to
/// the preceding position, the null-move ply counter and the last captured
/// piece. They are spliced in from the tail of the retained history when a
/// worker's root position is rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateInfo {
    /// Index of the preceding state in the shared history, if any.
    pub previous: Option<usize>,
    pub plies_from_null: i32,
    pub captured_piece: Piece,
}

/// Position-state history accumulated while playing out a game line. The
/// pool retains one list across successive searches; workers share it as a
/// read-only prefix.
pub type StateList = Vec<StateInfo>;

/// A position under search: an opaque serialized snapshot (`fen`) plus the
/// per-instance mutable root state.
#[derive(Debug, Clone, Default)]
pub struct Position {
    fen: String,
    st: StateInfo,
}

impl Position {
    pub fn new(fen: impl Into<String>) -> Position {
        Position {
            fen: fen.into(),
            st: StateInfo::default(),
        }
    }

    /// Worker-local rebuild: the snapshot is carried over verbatim and the
    /// non-derivable state fields are copied from the history tail, so every
    /// worker starts from an independent, fully initialized root state.
    pub fn rebuild(fen: &str, tail: &StateInfo) -> Position {
        Position {
            fen: fen.to_string(),
            st: tail.clone(),
        }
    }

    #[inline]
    pub fn fen(&self) -> &str {
        &self.fen
    }

    #[inline]
    pub fn state(&self) -> &StateInfo {
        &self.st
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut StateInfo {
        &mut self.st
    }
}

/// Board and move-generation boundary.
///
/// The enumeration order of `legal_moves` must be total and stable across
/// calls with identical input; beyond that the encoding of moves and
/// snapshots is entirely the implementation's business.
pub trait Rules: Send + Sync {
    /// Enumerates all legal moves of `pos` in a stable order.
    fn legal_moves(&self, pos: &Position) -> MoveList;

    /// Parses the body of a protocol `position` command (`startpos ...` or
    /// `fen ...`), returning the resulting position and the state history of
    /// the moves played to reach it.
    fn parse_position(&self, input: &str) -> anyhow::Result<(Position, StateList)>;

    /// Parses a single move in the protocol's text encoding, in the context
    /// of `pos`. Returns `None` for unknown or illegal input.
    fn parse_move(&self, pos: &Position, s: &str) -> Option<Move>;

    /// Formats a move for protocol output.
    fn format_move(&self, m: Move) -> String;
}
