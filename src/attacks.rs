//! Incremental attack-count table.
//!
//! The position keeps one counter per (square, color) pair: how many pieces
//! of that color currently attack the square. `Position` calls
//! [`own_attacks`] when a piece lands or leaves, and [`slider_rays_through`]
//! whenever occupancy changes, so "is this square attacked?" stays a single
//! table read no matter how the sliders move.
//!
//! The subtle half is the second call: a piece appearing on (or vanishing
//! from) a square shortens (or extends) the ray of *every* slider aimed
//! through that square. Updating only the moved piece's own attacks would
//! quietly corrupt check detection around rooks, bishops, and queens.

use crate::types::{Color, Piece, PieceKind, Square};

/// 0x88 board: one packed piece byte per cell, valid cells `0x00..=0x77`.
pub type Board = [Piece; 128];

/// Attacker counters, indexed `2 * square + color_bit`.
pub type AttackTable = [u8; 256];

/// Step deltas for the eight principal directions: orthogonal first
/// (indices 0..4), then diagonal (4..8).
pub const DIRS: [i8; 8] = [16, 1, -16, -1, 17, -15, -17, 15];

/// Knight jump deltas.
pub const KNIGHT_JUMPS: [i8; 8] = [31, 33, 14, 18, -18, -14, -33, -31];

/// Index into an [`AttackTable`].
#[inline]
pub fn table_index(sq: Square, color: Color) -> usize {
    sq.index() * 2 + color.index()
}

/// Diagonal capture deltas for a pawn of the given color.
#[inline]
pub fn pawn_capture_dirs(color: Color) -> [i8; 2] {
    match color {
        Color::White => [15, 17],
        Color::Black => [-15, -17],
    }
}

/// Ray directions a slider moves along.
fn ray_dirs(kind: PieceKind) -> &'static [i8] {
    match kind {
        PieceKind::Rook => &DIRS[..4],
        PieceKind::Bishop => &DIRS[4..],
        PieceKind::Queen => &DIRS,
        _ => &[],
    }
}

/// Does a slider of this kind cover the direction at `dir_index` in `DIRS`?
/// Non-sliders cover nothing; the direction sets are symmetric, so the
/// answer is the same for a delta and its negation.
#[inline]
fn covers(kind: PieceKind, dir_index: usize) -> bool {
    match kind {
        PieceKind::Rook => dir_index < 4,
        PieceKind::Bishop => dir_index >= 4,
        PieceKind::Queen => true,
        _ => false,
    }
}

#[inline]
fn bump(cell: &mut u8, delta: i8) {
    debug_assert!(delta >= 0 || *cell > 0, "attack counter underflow");
    *cell = cell.wrapping_add_signed(delta);
}

/// Visit every square `piece` attacks from `sq` through the current
/// occupancy. Slider rays include the first blocker and stop there.
pub fn for_each_attack(board: &Board, sq: Square, piece: Piece, mut visit: impl FnMut(Square)) {
    match piece.kind() {
        PieceKind::Pawn => {
            for d in pawn_capture_dirs(piece.color()) {
                let t = sq.offset(d);
                if t.is_on_board() {
                    visit(t);
                }
            }
        }
        PieceKind::Knight => {
            for &d in &KNIGHT_JUMPS {
                let t = sq.offset(d);
                if t.is_on_board() {
                    visit(t);
                }
            }
        }
        PieceKind::King => {
            for &d in &DIRS {
                let t = sq.offset(d);
                if t.is_on_board() {
                    visit(t);
                }
            }
        }
        kind => {
            for &d in ray_dirs(kind) {
                let mut t = sq.offset(d);
                while t.is_on_board() {
                    visit(t);
                    if !board[t.index()].is_empty() {
                        break;
                    }
                    t = t.offset(d);
                }
            }
        }
    }
}

/// Add (`delta = 1`) or remove (`delta = -1`) the attack contribution of
/// `piece` standing on `sq`. The board must already hold the occupancy the
/// contribution is computed against; the piece's own cell is never read.
pub fn own_attacks(board: &Board, attacks: &mut AttackTable, sq: Square, piece: Piece, delta: i8) {
    let color = piece.color();
    for_each_attack(board, sq, piece, |t| {
        bump(&mut attacks[table_index(t, color)], delta);
    });
}

/// Occupancy at `sq` is changing: extend (`delta = 1`, piece leaving) or
/// truncate (`delta = -1`, piece arriving) the ray of every slider that
/// shoots through `sq`. Must run while `sq` itself is empty on `board` —
/// i.e. before writing an arriving piece or after erasing a leaving one —
/// although the walks below never read the cell either way.
pub fn slider_rays_through(board: &Board, attacks: &mut AttackTable, sq: Square, delta: i8) {
    for (i, &d) in DIRS.iter().enumerate() {
        // Nearest piece looking out from sq.
        let mut t = sq.offset(d);
        while t.is_on_board() && board[t.index()].is_empty() {
            t = t.offset(d);
        }
        if !t.is_on_board() {
            continue;
        }
        let slider = board[t.index()];
        if !covers(slider.kind(), i) {
            continue;
        }
        // Its ray continues past sq away from it; every square up to and
        // including the next blocker gains or loses the contribution.
        let color = slider.color();
        let mut u = sq.offset(-d);
        while u.is_on_board() {
            bump(&mut attacks[table_index(u, color)], delta);
            if !board[u.index()].is_empty() {
                break;
            }
            u = u.offset(-d);
        }
    }
}

/// Rebuild the whole table from scratch. Used to cross-check the
/// incremental bookkeeping in debug builds and tests.
pub fn recompute(board: &Board) -> AttackTable {
    let mut attacks = [0u8; 256];
    for rank in 0..8 {
        for file in 0..8 {
            let sq = Square::new(file, rank);
            let piece = board[sq.index()];
            if !piece.is_empty() {
                own_attacks(board, &mut attacks, sq, piece, 1);
            }
        }
    }
    attacks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
