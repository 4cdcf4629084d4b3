//! Standard Algebraic Notation, plus coordinate and UCI move input.
//!
//! Rendering produces minimal but unambiguous SAN (`e4`, `Nf3`, `Raxd1#`,
//! `O-O-O`); parsing resolves SAN against the legal-move list, tolerating
//! annotation suffixes. Coordinate input (`from`/`to` pairs and UCI strings
//! like `e7e8q`) goes through the same selection, keyed on squares instead
//! of SAN features.

use crate::board::Position;
use crate::movegen;
use crate::types::{ChessError, GameStatus, Move, PieceKind, Square};

// =========================================================================
// Rendering
// =========================================================================

/// Format a move as SAN in the position it is legal in.
///
/// The check (`+`) and mate (`#`) marks are computed by trial-applying the
/// move; the position comes back untouched.
pub fn to_san(pos: &mut Position, mv: &Move) -> String {
    let legal = movegen::legal_moves(pos);

    let mut san = if mv.is_castle() {
        // The side of the castle is named by where the rook started.
        if mv.castle_rook_from.index() > mv.from.index() {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        }
    } else if mv.what.kind() == PieceKind::Pawn {
        let mut s = String::with_capacity(8);
        if mv.is_capture() {
            s.push((b'a' + mv.from.file()) as char);
            s.push('x');
        }
        s.push_str(&mv.to.to_algebraic());
        if let Some(kind) = mv.promote {
            s.push('=');
            s.push(kind.letter());
        }
        s
    } else {
        let mut s = String::with_capacity(8);
        s.push(mv.what.kind().letter());
        s.push_str(&departure(mv, &legal));
        if mv.is_capture() {
            s.push('x');
        }
        s.push_str(&mv.to.to_algebraic());
        s
    };

    pos.apply(mv);
    if pos.status() == GameStatus::Checkmate {
        san.push('#');
    } else if pos.king_in_danger(pos.turn()) {
        san.push('+');
    }
    pos.revert(mv);

    san
}

/// Departure coordinates for a piece move: empty when unique, otherwise the
/// shortest of file, rank, or full square that pins the move down. When
/// twins share both the file and the rank, only the full square works.
fn departure(mv: &Move, legal: &[Move]) -> String {
    let twins: Vec<&Move> = legal
        .iter()
        .filter(|m| {
            m.to == mv.to
                && m.from != mv.from
                && !m.is_castle()
                && m.what.kind() == mv.what.kind()
        })
        .collect();
    if twins.is_empty() {
        return String::new();
    }
    let file_twin = twins.iter().any(|m| m.from.file() == mv.from.file());
    let rank_twin = twins.iter().any(|m| m.from.rank() == mv.from.rank());
    match (file_twin, rank_twin) {
        (false, _) => ((b'a' + mv.from.file()) as char).to_string(),
        (true, false) => ((b'1' + mv.from.rank()) as char).to_string(),
        (true, true) => mv.from.to_algebraic(),
    }
}

// =========================================================================
// Parsing
// =========================================================================

/// Resolve a SAN string against the legal moves of the position.
///
/// Trailing annotations (`!`, `?`, `+`, `#`, `e.p.`, result markers) are
/// ignored. Capture notation is strict: `x` must be present exactly when
/// the move captures. A promotion move without `=<piece>` fails with
/// [`ChessError::NeedsPromotion`].
pub fn from_san(pos: &mut Position, input: &str) -> Result<Move, ChessError> {
    let legal = movegen::legal_moves(pos);
    let san = strip_annotations(input);
    if san.is_empty() {
        return Err(ChessError::BadInput(format!("empty SAN string '{input}'")));
    }

    let castle_side = match san {
        "O-O" | "0-0" => Some(6u8),
        "O-O-O" | "0-0-0" => Some(2u8),
        _ => None,
    };
    if let Some(target_file) = castle_side {
        return legal
            .iter()
            .find(|m| m.is_castle() && m.to.file() == target_file)
            .copied()
            .ok_or_else(|| ChessError::BadMove(format!("castling not available: {san}")));
    }

    let chars: Vec<char> = san.chars().collect();

    // Trailing "=Q".
    let (body, promote) = if chars.len() >= 2 && chars[chars.len() - 2] == '=' {
        let letter = chars[chars.len() - 1];
        let kind = PieceKind::from_promotion_letter(letter)
            .ok_or_else(|| ChessError::BadInput(format!("bad promotion letter '{letter}'")))?;
        (&chars[..chars.len() - 2], Some(kind))
    } else {
        (&chars[..], None)
    };

    // Leading piece letter; pawn moves have none.
    let (kind, body) = match body.first() {
        Some(&c) if c.is_ascii_uppercase() => {
            let kind = PieceKind::from_letter(c)
                .ok_or_else(|| ChessError::BadInput(format!("bad piece letter '{c}'")))?;
            (kind, &body[1..])
        }
        _ => (PieceKind::Pawn, body),
    };

    let has_capture = body.contains(&'x');
    let body: Vec<char> = body.iter().copied().filter(|&c| c != 'x').collect();
    if body.len() < 2 {
        return Err(ChessError::BadInput(format!("SAN too short: '{input}'")));
    }

    let dest_str: String = body[body.len() - 2..].iter().collect();
    let dest = Square::from_algebraic(&dest_str)
        .ok_or_else(|| ChessError::BadInput(format!("bad destination in '{input}'")))?;

    let mut from_file = None;
    let mut from_rank = None;
    for &c in &body[..body.len() - 2] {
        match c {
            'a'..='h' => from_file = Some(c as u8 - b'a'),
            '1'..='8' => from_rank = Some(c as u8 - b'1'),
            _ => {
                return Err(ChessError::BadInput(format!(
                    "bad disambiguation '{c}' in '{input}'"
                )));
            }
        }
    }

    let candidates: Vec<&Move> = legal
        .iter()
        .filter(|m| {
            if m.is_castle() || m.to != dest || m.what.kind() != kind {
                return false;
            }
            if from_file.is_some_and(|f| m.from.file() != f) {
                return false;
            }
            if from_rank.is_some_and(|r| m.from.rank() != r) {
                return false;
            }
            if m.is_capture() != has_capture {
                return false;
            }
            if let Some(p) = promote {
                if m.promote != Some(p) {
                    return false;
                }
            }
            true
        })
        .collect();

    pick_unique(candidates, san)
}

/// Strip one or more trailing annotation glyphs, en-passant markers, game
/// results, and whitespace.
fn strip_annotations(input: &str) -> &str {
    let mut s = input.trim();
    loop {
        let before = s;
        s = s.trim_end_matches(['!', '?', '+', '#']).trim_end();
        for marker in ["e.p.", "ep", "1-0", "0-1", "1/2-1/2", "½-½"] {
            if let Some(rest) = s.strip_suffix(marker) {
                s = rest.trim_end();
            }
        }
        if s == before {
            return s;
        }
    }
}

// =========================================================================
// Coordinate and UCI input
// =========================================================================

/// Select the legal move with the given squares (and promotion, if any).
///
/// When several moves differ only by promotion piece and none was supplied,
/// fails with [`ChessError::NeedsPromotion`], mirroring SAN resolution.
pub fn find_move(
    pos: &mut Position,
    from: Square,
    to: Square,
    promote: Option<PieceKind>,
) -> Result<Move, ChessError> {
    let legal = movegen::legal_moves(pos);
    let candidates: Vec<&Move> = legal
        .iter()
        .filter(|m| {
            m.from == from && m.to == to && (promote.is_none() || m.promote == promote)
        })
        .collect();
    pick_unique(candidates, &format!("{from}{to}"))
}

/// Parse a UCI-style move string: `<from><to>[promo]`, e.g. `e2e4`,
/// `e7e8q`.
pub fn from_uci(pos: &mut Position, input: &str) -> Result<Move, ChessError> {
    let s = input.trim();
    if !s.is_ascii() || !(4..=5).contains(&s.len()) {
        return Err(ChessError::BadInput(format!("bad UCI move '{input}'")));
    }
    let from = Square::from_algebraic(&s[..2])
        .ok_or_else(|| ChessError::BadInput(format!("bad source square in '{input}'")))?;
    let to = Square::from_algebraic(&s[2..4])
        .ok_or_else(|| ChessError::BadInput(format!("bad target square in '{input}'")))?;
    let promote = if s.len() == 5 {
        let letter = s.as_bytes()[4] as char;
        Some(
            PieceKind::from_promotion_letter(letter)
                .ok_or_else(|| ChessError::BadInput(format!("bad promotion letter '{letter}'")))?,
        )
    } else {
        None
    };
    find_move(pos, from, to, promote)
}

/// One match wins; several matches are ambiguous unless they are the same
/// move modulo promotion piece, which asks the caller for one.
fn pick_unique(candidates: Vec<&Move>, what: &str) -> Result<Move, ChessError> {
    match candidates.len() {
        0 => Err(ChessError::BadMove(what.to_string())),
        1 => Ok(*candidates[0]),
        _ => {
            let promotion_only = candidates.iter().all(|m| m.promote.is_some())
                && candidates.windows(2).all(|w| w[0].from == w[1].from);
            if promotion_only {
                Err(ChessError::NeedsPromotion(what.to_string()))
            } else {
                Err(ChessError::Ambiguous(what.to_string()))
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
