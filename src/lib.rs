//! A chess rules engine.
//!
//! This crate represents positions, generates legal moves (standard and
//! Chess960 castling, en passant, promotions), applies and reverts moves,
//! and classifies game outcomes: checkmate, stalemate, threefold
//! repetition, the fifty-move rule, and insufficient material. Positions
//! travel as FEN, moves as SAN or UCI coordinates.
//!
//! There is no search and no evaluation here — just the rules.
//!
//! # Example
//!
//! ```
//! use chess_rules::{GameStatus, Position, san};
//!
//! let mut pos = Position::starting();
//! for m in ["f3", "e5", "g4", "Qh4#"] {
//!     let mv = san::from_san(&mut pos, m)?;
//!     pos.apply(&mv);
//! }
//! assert_eq!(pos.status(), GameStatus::Checkmate);
//! # Ok::<(), chess_rules::ChessError>(())
//! ```
//!
//! A [`Position`] is a mutable value with interior bookkeeping (a trial
//! layer stack and per-color move memoization); it must not be shared
//! across threads, but independent positions are fully independent.

mod attacks;

pub mod board;
pub mod castling;
pub mod movegen;
pub mod san;
pub mod types;

pub use board::{Position, START_FEN};
pub use castling::CastleRights;
pub use movegen::{legal_moves, legal_moves_from, perft};
pub use types::{ChessError, Color, GameStatus, Move, Piece, PieceKind, Square};
