use std::fmt;

use serde::{Deserialize, Serialize};

use crate::castling::CastleRights;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// The two sides in a chess game.
///
/// The discriminants match the color bit of the packed piece byte (white = 0,
/// black = 8), so `8 - color` flips sides and `piece & 0x08` extracts one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 8,
}

impl Color {
    /// Index for array lookups: White=0, Black=1.
    #[inline]
    pub const fn index(self) -> usize {
        (self as usize) >> 3
    }

    /// Rank index of this side's back rank (0 for White, 7 for Black).
    #[inline]
    pub const fn back_rank(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// FEN active-color letter.
    pub const fn letter(self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }
}

impl std::ops::Not for Color {
    type Output = Self;
    fn not(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

// ---------------------------------------------------------------------------
// PieceKind
// ---------------------------------------------------------------------------

/// The six piece kinds. Discriminants are the low three bits of the packed
/// piece byte; zero is reserved for the empty square.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PieceKind {
    Pawn = 1,
    Bishop = 2,
    Knight = 3,
    Rook = 4,
    Queen = 5,
    King = 6,
}

impl PieceKind {
    /// All piece kinds in byte-encoding order.
    pub const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Bishop,
        PieceKind::Knight,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ];

    /// Does this piece move along rays (bishop, rook, queen)?
    #[inline]
    pub const fn is_slider(self) -> bool {
        matches!(self, PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen)
    }

    /// SAN piece letter (`P` for pawns, though SAN omits it for moves).
    pub const fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Bishop => 'B',
            PieceKind::Knight => 'N',
            PieceKind::Rook => 'R',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        }
    }

    /// Parse a SAN piece letter (uppercase).
    pub fn from_letter(c: char) -> Option<PieceKind> {
        match c {
            'P' => Some(PieceKind::Pawn),
            'B' => Some(PieceKind::Bishop),
            'N' => Some(PieceKind::Knight),
            'R' => Some(PieceKind::Rook),
            'Q' => Some(PieceKind::Queen),
            'K' => Some(PieceKind::King),
            _ => None,
        }
    }

    /// Parse a promotion letter, either case (`q`, `R`, …). Kings and pawns
    /// are not valid promotion targets.
    pub fn from_promotion_letter(c: char) -> Option<PieceKind> {
        match c.to_ascii_uppercase() {
            'B' => Some(PieceKind::Bishop),
            'N' => Some(PieceKind::Knight),
            'R' => Some(PieceKind::Rook),
            'Q' => Some(PieceKind::Queen),
            _ => None,
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceKind::Pawn => write!(f, "pawn"),
            PieceKind::Bishop => write!(f, "bishop"),
            PieceKind::Knight => write!(f, "knight"),
            PieceKind::Rook => write!(f, "rook"),
            PieceKind::Queen => write!(f, "queen"),
            PieceKind::King => write!(f, "king"),
        }
    }
}

// ---------------------------------------------------------------------------
// Piece — packed byte
// ---------------------------------------------------------------------------

/// A board cell: `0` is empty, otherwise low 3 bits = kind, `0x08` = color,
/// `0x10` = the piece has moved at least once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Piece(pub u8);

impl Piece {
    pub const EMPTY: Piece = Piece(0);

    const KIND_MASK: u8 = 0x07;
    const COLOR_MASK: u8 = 0x08;
    const MOVED_MASK: u8 = 0x10;

    #[inline]
    pub const fn new(color: Color, kind: PieceKind) -> Piece {
        Piece(color as u8 | kind as u8)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Kind of a non-empty piece. Panics on the empty byte; callers check
    /// `is_empty` first.
    #[inline]
    pub fn kind(self) -> PieceKind {
        match self.0 & Self::KIND_MASK {
            1 => PieceKind::Pawn,
            2 => PieceKind::Bishop,
            3 => PieceKind::Knight,
            4 => PieceKind::Rook,
            5 => PieceKind::Queen,
            6 => PieceKind::King,
            _ => panic!("kind() on empty or corrupt piece byte {:#04x}", self.0),
        }
    }

    #[inline]
    pub const fn color(self) -> Color {
        if self.0 & Self::COLOR_MASK == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    #[inline]
    pub const fn has_moved(self) -> bool {
        self.0 & Self::MOVED_MASK != 0
    }

    /// The same piece with its moved flag set.
    #[inline]
    pub const fn with_moved(self) -> Piece {
        Piece(self.0 | Self::MOVED_MASK)
    }

    /// True for a non-empty piece of the given kind and color.
    #[inline]
    pub fn is(self, color: Color, kind: PieceKind) -> bool {
        !self.is_empty() && self.color() == color && self.kind() == kind
    }

    /// FEN character: uppercase white, lowercase black.
    pub fn to_char(self) -> char {
        let c = match self.kind() {
            PieceKind::Pawn => 'p',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        };
        match self.color() {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// Parse a FEN piece character.
    pub fn from_char(c: char) -> Option<Piece> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let kind = match c.to_ascii_lowercase() {
            'p' => PieceKind::Pawn,
            'b' => PieceKind::Bishop,
            'n' => PieceKind::Knight,
            'r' => PieceKind::Rook,
            'q' => PieceKind::Queen,
            'k' => PieceKind::King,
            _ => return None,
        };
        Some(Piece::new(color, kind))
    }
}

// ---------------------------------------------------------------------------
// Square — 0x88 index
// ---------------------------------------------------------------------------

/// A 0x88 square index: low nibble = file, next nibble = rank. A square is
/// on the board iff `(index & 0x88) == 0`, which makes off-board detection
/// after any delta a single bit test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Square(pub u8);

impl Square {
    #[inline]
    pub const fn new(file: u8, rank: u8) -> Square {
        Square(rank << 4 | file)
    }

    #[inline]
    pub const fn file(self) -> u8 {
        self.0 & 0x0F
    }

    #[inline]
    pub const fn rank(self) -> u8 {
        self.0 >> 4
    }

    /// Board-array index. Only meaningful for on-board squares.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_on_board(self) -> bool {
        self.0 & 0x88 == 0
    }

    /// The square `delta` steps away in 0x88 arithmetic. The result may be
    /// off the board; check `is_on_board` before indexing with it.
    #[inline]
    pub const fn offset(self, delta: i8) -> Square {
        Square((self.0 as i8).wrapping_add(delta) as u8)
    }

    /// Parse algebraic notation like "e4".
    pub fn from_algebraic(s: &str) -> Option<Square> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        if file < 8 && rank < 8 {
            Some(Square::new(file, rank))
        } else {
            None
        }
    }

    /// Convert to algebraic notation like "e4".
    pub fn to_algebraic(self) -> String {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        format!("{file}{rank}")
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_algebraic())
    }
}

// ---------------------------------------------------------------------------
// GameStatus
// ---------------------------------------------------------------------------

/// Status of a game. The ordering is meaningful: everything from `Draw`
/// upward is a drawn result, and anything but `Active` ends the game.
/// `Resigned` and the plain `Draw` (agreed) are set by game-facade layers,
/// never by the rules core.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GameStatus {
    Active,
    Checkmate,
    Resigned,
    Draw,
    DrawStalemate,
    DrawRepetition,
    DrawFiftyMoves,
    DrawNoMaterial,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Checkmate => "checkmate",
            GameStatus::Resigned => "resigned",
            GameStatus::Draw => "draw",
            GameStatus::DrawStalemate => "stalemate",
            GameStatus::DrawRepetition => "threefold_repetition",
            GameStatus::DrawFiftyMoves => "fifty_move_rule",
            GameStatus::DrawNoMaterial => "insufficient_material",
        }
    }

    #[inline]
    pub fn is_over(self) -> bool {
        self != GameStatus::Active
    }

    #[inline]
    pub fn is_draw(self) -> bool {
        self >= GameStatus::Draw
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Prior — restorable metadata snapshot
// ---------------------------------------------------------------------------

/// Position metadata captured before a move is applied, carried inside the
/// move record so `revert` needs nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prior {
    pub clock: u16,
    pub move_num: u16,
    pub ep: Option<Square>,
    pub status: GameStatus,
    pub castles: CastleRights,
}

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

/// A fully resolved move. `what` and `capture` are the pre-move piece bytes
/// (so reverting restores the original moved flags); `capture_coord` equals
/// `to` except for en passant, where it is the captured pawn's actual
/// square. Castling carries the rook and both its squares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Move {
    pub what: Piece,
    pub from: Square,
    pub to: Square,
    pub capture: Piece,
    pub capture_coord: Square,
    pub castle_rook: Piece,
    pub castle_rook_from: Square,
    pub castle_rook_to: Square,
    pub promote: Option<PieceKind>,
    pub mark_ep: Option<Square>,
    pub prior: Prior,
}

impl Move {
    /// A quiet move.
    pub(crate) fn new(what: Piece, from: Square, to: Square, prior: Prior) -> Move {
        Move {
            what,
            from,
            to,
            capture: Piece::EMPTY,
            capture_coord: to,
            castle_rook: Piece::EMPTY,
            castle_rook_from: to,
            castle_rook_to: to,
            promote: None,
            mark_ep: None,
            prior,
        }
    }

    /// A capture; `capture_coord` differs from `to` only for en passant.
    pub(crate) fn with_capture(
        what: Piece,
        from: Square,
        to: Square,
        capture: Piece,
        capture_coord: Square,
        prior: Prior,
    ) -> Move {
        Move {
            capture,
            capture_coord,
            ..Move::new(what, from, to, prior)
        }
    }

    /// A castle: the king travels `from` → `to`, the rook
    /// `castle_rook_from` → `castle_rook_to`.
    pub(crate) fn castle(
        what: Piece,
        from: Square,
        to: Square,
        rook: Piece,
        rook_from: Square,
        rook_to: Square,
        prior: Prior,
    ) -> Move {
        Move {
            castle_rook: rook,
            castle_rook_from: rook_from,
            castle_rook_to: rook_to,
            ..Move::new(what, from, to, prior)
        }
    }

    /// The same move promoting to `kind`.
    pub(crate) fn promoting(self, kind: PieceKind) -> Move {
        Move {
            promote: Some(kind),
            ..self
        }
    }

    /// The same move leaving an en-passant target behind (double push).
    pub(crate) fn marking_ep(self, sq: Square) -> Move {
        Move {
            mark_ep: Some(sq),
            ..self
        }
    }

    #[inline]
    pub fn is_capture(&self) -> bool {
        !self.capture.is_empty()
    }

    #[inline]
    pub fn is_castle(&self) -> bool {
        !self.castle_rook.is_empty()
    }

    #[inline]
    pub fn is_en_passant(&self) -> bool {
        self.is_capture() && self.capture_coord != self.to
    }
}

impl fmt::Display for Move {
    /// UCI form: `e2e4`, `e7e8q`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promote {
            write!(f, "{}", kind.letter().to_ascii_lowercase())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChessError
// ---------------------------------------------------------------------------

/// Domain errors for the rules engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChessError {
    /// Malformed FEN, SAN, UCI coordinates, or promotion letter.
    #[error("invalid input: {0}")]
    BadInput(String),

    /// Well-formed input that matches no legal move.
    #[error("no legal move matches: {0}")]
    BadMove(String),

    /// Input that matches several distinct legal moves.
    #[error("ambiguous move: {0}")]
    Ambiguous(String),

    /// The only ambiguity is the promotion piece and none was supplied.
    #[error("promotion piece required: {0}")]
    NeedsPromotion(String),

    /// A move was attempted on a finished game. Raised by game facades
    /// layered on top of the core, never by the core itself.
    #[error("game is over: {0}")]
    GameOver(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
