//! Endgame tablebase contract.
//!
//! Tablebase files are externally owned, read-only inputs. A missing or
//! invalid path is a non-fatal condition: the caller logs it and the search
//! proceeds without tablebase knowledge.

use thiserror::Error;

use crate::position::Position;
use crate::search::RootMoves;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("tablebase path not found: {0}")]
    PathNotFound(String),
    #[error("unusable tablebase files: {0}")]
    Invalid(String),
}

pub trait TablebaseProbe: Send + Sync {
    /// Points the prober at a new file location. Failure leaves the previous
    /// tables (if any) in effect.
    fn init(&self, path: &str) -> Result<(), ProbeError>;

    /// Ranks and possibly reorders the root moves using tablebase knowledge.
    /// May mark entries as proven wins or losses via their `tb_rank` and
    /// `tb_score` fields.
    fn rank_root_moves(&self, pos: &Position, root_moves: &mut RootMoves);

    /// DTZ probe at the root. Returns false when the position is not covered
    /// and the caller should fall back to an ordinary search.
    fn root_probe(&self, _pos: &Position, _root_moves: &mut RootMoves) -> bool {
        false
    }
}
