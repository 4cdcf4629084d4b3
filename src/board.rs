//! 0x88 position representation with an incremental attack map and a
//! layered undo stack.
//!
//! `Position` owns a growable stack of [`Layer`]s and an index into it. All
//! reads and writes go to the current layer; `save`/`restore` push and pop
//! cheap snapshots so the move generator can trial-apply candidates without
//! allocating per node. Repetition counts span the stack: each layer's
//! `seen` map holds only the hashes recorded at that depth, and lookups walk
//! downward (see `put_hash`).

use std::collections::HashMap;

use crate::attacks::{self, AttackTable, Board};
use crate::castling::CastleRights;
use crate::movegen;
use crate::types::{ChessError, Color, GameStatus, Move, Piece, PieceKind, Prior, Square};

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

// ---------------------------------------------------------------------------
// Layer — one snapshot slot
// ---------------------------------------------------------------------------

/// Complete position state: board, attack counters, metadata, repetition
/// hashes recorded at this depth, occupied-square list, and the per-color
/// legal-move memo.
#[derive(Clone)]
struct Layer {
    board: Board,
    attacks: AttackTable,
    clock: u16,
    move_num: u16,
    ep: Option<Square>,
    status: GameStatus,
    turn: Color,
    castles: CastleRights,
    seen: HashMap<String, u32>,
    piece_list: Vec<Square>,
    move_cache: [Option<Vec<Move>>; 2],
}

impl Layer {
    fn blank() -> Layer {
        Layer {
            board: [Piece::EMPTY; 128],
            attacks: [0; 256],
            clock: 0,
            move_num: 1,
            ep: None,
            status: GameStatus::Active,
            turn: Color::White,
            castles: CastleRights::NONE,
            seen: HashMap::new(),
            piece_list: Vec::new(),
            move_cache: [None, None],
        }
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A chess position.
///
/// Mutable and single-threaded by design: the layer stack and move caches
/// are interior state, so a position must not be aliased across threads.
/// Independent positions are fully independent.
#[derive(Clone)]
pub struct Position {
    layers: Vec<Layer>,
    depth: usize,
}

impl Position {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// An empty board, white to move, no castling rights.
    pub fn empty() -> Position {
        Position {
            layers: vec![Layer::blank()],
            depth: 0,
        }
    }

    /// Standard starting position.
    pub fn starting() -> Position {
        Position::from_fen(START_FEN).expect("starting FEN is always valid")
    }

    #[inline]
    fn cur(&self) -> &Layer {
        &self.layers[self.depth]
    }

    #[inline]
    fn cur_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.depth]
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Side to move.
    #[inline]
    pub fn turn(&self) -> Color {
        self.cur().turn
    }

    /// Current game status (updated after every `apply`).
    #[inline]
    pub fn status(&self) -> GameStatus {
        self.cur().status
    }

    /// En-passant target square, if the previous move was a double push.
    /// This is the square the capturing pawn would move *to*.
    #[inline]
    pub fn en_passant(&self) -> Option<Square> {
        self.cur().ep
    }

    /// Castling availability.
    #[inline]
    pub fn castles(&self) -> CastleRights {
        self.cur().castles
    }

    /// Halfmove clock for the fifty-move rule.
    #[inline]
    pub fn halfmove_clock(&self) -> u16 {
        self.cur().clock
    }

    /// Full-move number (starts at 1, increments after Black moves).
    #[inline]
    pub fn fullmove_number(&self) -> u16 {
        self.cur().move_num
    }

    /// The piece on `sq`, or `Piece::EMPTY`.
    #[inline]
    pub fn piece_at(&self, sq: Square) -> Piece {
        debug_assert!(sq.is_on_board());
        self.cur().board[sq.index()]
    }

    /// Snapshot of all occupied squares, in piece-list order.
    pub fn occupied_squares(&self) -> Vec<Square> {
        self.cur().piece_list.clone()
    }

    /// The king square for `color`, if one is on the board.
    pub fn king_square(&self, color: Color) -> Option<Square> {
        let layer = self.cur();
        layer
            .piece_list
            .iter()
            .copied()
            .find(|&sq| layer.board[sq.index()].is(color, PieceKind::King))
    }

    // -----------------------------------------------------------------------
    // Attack queries
    // -----------------------------------------------------------------------

    /// Is `sq` attacked by any piece of `by`? O(1) table read.
    #[inline]
    pub fn is_attacked(&self, sq: Square, by: Color) -> bool {
        self.cur().attacks[attacks::table_index(sq, by)] > 0
    }

    /// How many pieces of `by` attack `sq`?
    #[inline]
    pub fn attackers_count(&self, sq: Square, by: Color) -> u8 {
        self.cur().attacks[attacks::table_index(sq, by)]
    }

    /// Is any king of `color` attacked? Castling legality checks place
    /// phantom kings along the king's path, so this deliberately scans for
    /// every king of the color rather than assuming a single one.
    pub fn king_in_danger(&self, color: Color) -> bool {
        let layer = self.cur();
        layer.piece_list.iter().any(|&sq| {
            layer.board[sq.index()].is(color, PieceKind::King) && self.is_attacked(sq, !color)
        })
    }

    // -----------------------------------------------------------------------
    // Low-level mutation
    // -----------------------------------------------------------------------

    /// Put `piece` on the empty square `sq`, maintaining the piece list and
    /// the attack table (including slider rays newly blocked by `sq`).
    pub(crate) fn place(&mut self, sq: Square, piece: Piece) {
        debug_assert!(sq.is_on_board());
        debug_assert!(!piece.is_empty());
        let layer = &mut self.layers[self.depth];
        debug_assert!(layer.board[sq.index()].is_empty(), "place on occupied {sq}");
        attacks::slider_rays_through(&layer.board, &mut layer.attacks, sq, -1);
        layer.board[sq.index()] = piece;
        layer.piece_list.push(sq);
        attacks::own_attacks(&layer.board, &mut layer.attacks, sq, piece, 1);
    }

    /// Remove and return the piece on `sq`, maintaining the piece list and
    /// the attack table (including slider rays newly opened through `sq`).
    pub(crate) fn lift(&mut self, sq: Square) -> Piece {
        debug_assert!(sq.is_on_board());
        let layer = &mut self.layers[self.depth];
        let piece = layer.board[sq.index()];
        debug_assert!(!piece.is_empty(), "lift from empty {sq}");
        attacks::own_attacks(&layer.board, &mut layer.attacks, sq, piece, -1);
        layer.board[sq.index()] = Piece::EMPTY;
        let idx = layer
            .piece_list
            .iter()
            .position(|&s| s == sq)
            .expect("piece list out of sync");
        layer.piece_list.swap_remove(idx);
        attacks::slider_rays_through(&layer.board, &mut layer.attacks, sq, 1);
        piece
    }

    /// Directly edit a square (used while building a position).
    ///
    /// Permitted only during construction, before the first move or status
    /// query: direct edits do not invalidate the legal-move memo or the
    /// repetition bookkeeping.
    pub fn set(&mut self, sq: Square, piece: Piece) {
        if !self.piece_at(sq).is_empty() {
            self.lift(sq);
        }
        if !piece.is_empty() {
            self.place(sq, piece);
        }
    }

    // -----------------------------------------------------------------------
    // Layer stack
    // -----------------------------------------------------------------------

    /// Push a snapshot of the current layer and switch to it. Slots are
    /// reused across save/restore; the new layer starts with an empty
    /// `seen` map (see `put_hash`) and cold move caches.
    pub(crate) fn save(&mut self) {
        if self.depth + 1 == self.layers.len() {
            let mut next = self.layers[self.depth].clone();
            next.seen.clear();
            next.move_cache = [None, None];
            self.layers.push(next);
        } else {
            let (lower, upper) = self.layers.split_at_mut(self.depth + 1);
            let src = &lower[self.depth];
            let dst = &mut upper[0];
            dst.board = src.board;
            dst.attacks = src.attacks;
            dst.clock = src.clock;
            dst.move_num = src.move_num;
            dst.ep = src.ep;
            dst.status = src.status;
            dst.turn = src.turn;
            dst.castles = src.castles;
            dst.piece_list.clone_from(&src.piece_list);
            dst.seen.clear();
            dst.move_cache = [None, None];
        }
        self.depth += 1;
    }

    /// Drop the current layer, returning to the previous snapshot.
    pub(crate) fn restore(&mut self) {
        debug_assert!(self.depth > 0, "restore below the base layer");
        self.depth -= 1;
    }

    // -----------------------------------------------------------------------
    // Repetition hashes across layers
    // -----------------------------------------------------------------------

    /// Record one more occurrence of `key` and return the total count. The
    /// count found in the nearest layer (current first, then downward) plus
    /// one is stored in the *current* layer, which keeps `save` O(1) in
    /// `seen` size.
    pub(crate) fn put_hash(&mut self, key: String) -> u32 {
        let mut count = 1;
        for layer in self.layers[..=self.depth].iter().rev() {
            if let Some(&n) = layer.seen.get(&key) {
                count = n + 1;
                break;
            }
        }
        self.layers[self.depth].seen.insert(key, count);
        count
    }

    /// Remove one occurrence of `key`, decrementing the nearest record.
    pub(crate) fn remove_hash(&mut self, key: &str) {
        for i in (0..=self.depth).rev() {
            if let Some(n) = self.layers[i].seen.get_mut(key) {
                if *n <= 1 {
                    self.layers[i].seen.remove(key);
                } else {
                    *n -= 1;
                }
                return;
            }
        }
    }

    /// How many times the current position has occurred (including now).
    pub fn repetition_count(&self) -> u32 {
        let key = self.hash_key();
        for layer in self.layers[..=self.depth].iter().rev() {
            if let Some(&n) = layer.seen.get(&key) {
                return n;
            }
        }
        0
    }

    /// Deterministic position key: the first four FEN fields (placement,
    /// turn, castling, en passant) joined by spaces. Clocks are excluded on
    /// purpose so repetition equality holds across different clock values.
    pub fn hash_key(&self) -> String {
        let layer = self.cur();
        let mut s = String::with_capacity(80);
        for rank in (0..8u8).rev() {
            let mut empties = 0u8;
            for file in 0..8u8 {
                let piece = layer.board[Square::new(file, rank).index()];
                if piece.is_empty() {
                    empties += 1;
                } else {
                    if empties > 0 {
                        s.push((b'0' + empties) as char);
                        empties = 0;
                    }
                    s.push(piece.to_char());
                }
            }
            if empties > 0 {
                s.push((b'0' + empties) as char);
            }
            if rank > 0 {
                s.push('/');
            }
        }
        s.push(' ');
        s.push(layer.turn.letter());
        s.push(' ');
        s.push_str(&self.castling_field());
        s.push(' ');
        match layer.ep {
            Some(sq) => s.push_str(&sq.to_algebraic()),
            None => s.push('-'),
        }
        s
    }

    // -----------------------------------------------------------------------
    // Legal moves (memoized; generation lives in `movegen`)
    // -----------------------------------------------------------------------

    /// All legal moves for the side to move. The list is memoized per color
    /// until the next mutation; callers get their own copy.
    pub fn legal_moves(&mut self) -> Vec<Move> {
        movegen::legal_moves(self)
    }

    /// Legal moves originating from `from`.
    pub fn legal_moves_from(&mut self, from: Square) -> Vec<Move> {
        movegen::legal_moves_from(self, from)
    }

    pub(crate) fn cached_moves(&self, color: Color) -> Option<&Vec<Move>> {
        self.cur().move_cache[color.index()].as_ref()
    }

    pub(crate) fn cache_moves(&mut self, color: Color, moves: Vec<Move>) {
        self.cur_mut().move_cache[color.index()] = Some(moves);
    }

    /// Metadata snapshot embedded into generated moves for reversion.
    pub(crate) fn prior(&self) -> Prior {
        let layer = self.cur();
        Prior {
            clock: layer.clock,
            move_num: layer.move_num,
            ep: layer.ep,
            status: layer.status,
            castles: layer.castles,
        }
    }

    // -----------------------------------------------------------------------
    // Apply / revert
    // -----------------------------------------------------------------------

    /// Apply a move produced by the generator. Legality is assumed, not
    /// re-checked. Updates all metadata, records the new position hash, and
    /// classifies the resulting status.
    pub fn apply(&mut self, mv: &Move) {
        let mover = mv.what.color();
        debug_assert_eq!(mover, self.turn(), "move applied out of turn");

        // Lift everything first, then land: with Chess960 castling the king
        // may target the rook's square or vice versa.
        self.lift(mv.from);
        if mv.is_capture() {
            self.lift(mv.capture_coord);
        }
        if mv.is_castle() {
            self.lift(mv.castle_rook_from);
        }
        let landing = match mv.promote {
            Some(kind) => Piece::new(mover, kind).with_moved(),
            None => mv.what.with_moved(),
        };
        self.place(mv.to, landing);
        if mv.is_castle() {
            self.place(mv.castle_rook_to, mv.castle_rook.with_moved());
        }

        let layer = self.cur_mut();
        layer.ep = mv.mark_ep;
        if mv.what.kind() == PieceKind::Pawn || mv.is_capture() {
            layer.clock = 0;
        } else {
            layer.clock += 1;
        }
        match mv.what.kind() {
            PieceKind::King => layer.castles.king_moved(mover),
            PieceKind::Rook => layer.castles.rook_moved(mv.from),
            _ => {}
        }
        if mv.is_capture() && mv.capture.kind() == PieceKind::Rook {
            layer.castles.rook_moved(mv.capture_coord);
        }
        if mover == Color::Black {
            layer.move_num += 1;
        }
        layer.turn = !mover;
        layer.move_cache = [None, None];

        let key = self.hash_key();
        let times_seen = self.put_hash(key);
        self.update_status(times_seen);
    }

    /// Reverse a move previously applied with [`apply`](Position::apply).
    /// The move record carries everything needed: the pre-move piece bytes
    /// and the `prior` metadata snapshot.
    pub fn revert(&mut self, mv: &Move) {
        let key = self.hash_key();
        self.remove_hash(&key);

        self.lift(mv.to);
        if mv.is_castle() {
            self.lift(mv.castle_rook_to);
        }
        self.place(mv.from, mv.what);
        if mv.is_castle() {
            self.place(mv.castle_rook_from, mv.castle_rook);
        }
        if mv.is_capture() {
            self.place(mv.capture_coord, mv.capture);
        }

        let layer = self.cur_mut();
        layer.clock = mv.prior.clock;
        layer.move_num = mv.prior.move_num;
        layer.ep = mv.prior.ep;
        layer.status = mv.prior.status;
        layer.castles = mv.prior.castles;
        layer.turn = mv.what.color();
        layer.move_cache = [None, None];
    }

    // -----------------------------------------------------------------------
    // Outcome classification
    // -----------------------------------------------------------------------

    /// Classify the position for the side now to move. Checkmate and
    /// stalemate take precedence; draws are checked fifty-move first, then
    /// repetition, then material. Anything else leaves the status as is.
    fn update_status(&mut self, times_seen: u32) {
        let defender = self.turn();
        let in_check = self.king_in_danger(defender);
        let can_move = !movegen::legal_moves(self).is_empty();
        let status = if !can_move {
            if in_check {
                GameStatus::Checkmate
            } else {
                GameStatus::DrawStalemate
            }
        } else if self.cur().clock >= 100 {
            GameStatus::DrawFiftyMoves
        } else if times_seen >= 3 {
            GameStatus::DrawRepetition
        } else if self.insufficient_material() {
            GameStatus::DrawNoMaterial
        } else {
            self.cur().status
        };
        if status.is_over() && status != self.cur().status {
            tracing::debug!("game over: {status}");
        }
        self.cur_mut().status = status;
    }

    /// Dead-position test: K vs K, lone minor vs K, or same-colored single
    /// bishops. Any pawn, rook, or queen means mate is still possible; two
    /// knights against a bare king do not draw automatically.
    fn insufficient_material(&self) -> bool {
        let layer = self.cur();
        let mut minors = [0u32; 2];
        let mut bishops = [0u32; 2];
        let mut bishop_sq = [None; 2];
        for &sq in &layer.piece_list {
            let piece = layer.board[sq.index()];
            let side = piece.color().index();
            match piece.kind() {
                PieceKind::King => {}
                PieceKind::Knight => minors[side] += 1,
                PieceKind::Bishop => {
                    minors[side] += 1;
                    bishops[side] += 1;
                    bishop_sq[side] = Some(sq);
                }
                _ => return false,
            }
        }
        match (minors[0], minors[1]) {
            (0, 0) => true,
            (1, 0) | (0, 1) => true,
            (1, 1) if bishops == [1, 1] => {
                let shade = |sq: Square| (sq.file() + sq.rank()) & 1;
                shade(bishop_sq[0].unwrap()) == shade(bishop_sq[1].unwrap())
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Consistency check (debug and test builds)
    // -----------------------------------------------------------------------

    /// Verify the piece list against the board and the attack table against
    /// a from-scratch recompute.
    #[cfg(any(debug_assertions, test))]
    pub fn assert_consistent(&self) {
        let layer = self.cur();
        let mut listed = [false; 128];
        for &sq in &layer.piece_list {
            assert!(sq.is_on_board(), "off-board square in piece list");
            assert!(
                !layer.board[sq.index()].is_empty(),
                "piece list points at empty {sq}"
            );
            assert!(!listed[sq.index()], "duplicate {sq} in piece list");
            listed[sq.index()] = true;
        }
        for rank in 0..8u8 {
            for file in 0..8u8 {
                let sq = Square::new(file, rank);
                if !layer.board[sq.index()].is_empty() {
                    assert!(listed[sq.index()], "{sq} occupied but not listed");
                }
            }
        }
        let expected = attacks::recompute(&layer.board);
        assert!(layer.attacks == expected, "attack table out of sync");
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::starting()
    }
}

// ---------------------------------------------------------------------------
// FEN parsing & rendering
// ---------------------------------------------------------------------------

impl Position {
    /// Parse a FEN string.
    ///
    /// All six fields are validated; exactly one king per side is required.
    /// Castling accepts both standard `KQkq` letters and Chess960 /
    /// Shredder file letters.
    pub fn from_fen(fen: &str) -> Result<Position, ChessError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ChessError::BadInput(format!(
                "FEN expects 6 fields, got {}",
                fields.len()
            )));
        }

        let mut pos = Position::empty();

        // ----- Field 1: piece placement -----
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(ChessError::BadInput(format!(
                "FEN expects 8 ranks, got {}",
                ranks.len()
            )));
        }
        let mut kings = [0u32; 2];
        for (i, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for ch in rank_str.chars() {
                if file > 7 {
                    return Err(ChessError::BadInput(format!(
                        "rank {} overflows 8 squares",
                        rank + 1
                    )));
                }
                if let Some(digit) = ch.to_digit(10) {
                    if !(1..=8).contains(&digit) {
                        return Err(ChessError::BadInput(format!(
                            "bad empty-square count '{ch}'"
                        )));
                    }
                    file += digit as u8;
                } else if let Some(mut piece) = Piece::from_char(ch) {
                    // A pawn off its home rank has necessarily moved.
                    if piece.kind() == PieceKind::Pawn {
                        let home = match piece.color() {
                            Color::White => 1,
                            Color::Black => 6,
                        };
                        if rank != home {
                            piece = piece.with_moved();
                        }
                    }
                    if piece.kind() == PieceKind::King {
                        kings[piece.color().index()] += 1;
                    }
                    pos.place(Square::new(file, rank), piece);
                    file += 1;
                } else {
                    return Err(ChessError::BadInput(format!(
                        "bad piece character '{ch}'"
                    )));
                }
            }
            if file != 8 {
                return Err(ChessError::BadInput(format!(
                    "rank {} has {} squares instead of 8",
                    rank + 1,
                    file
                )));
            }
        }
        for color in [Color::White, Color::Black] {
            if kings[color.index()] != 1 {
                return Err(ChessError::BadInput(format!(
                    "{color} has {} kings (expected 1)",
                    kings[color.index()]
                )));
            }
        }

        // ----- Field 2: side to move -----
        pos.cur_mut().turn = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(ChessError::BadInput(format!(
                    "bad side to move '{other}'"
                )));
            }
        };

        // ----- Field 3: castling availability -----
        let castles = parse_castling_field(fields[2], &pos)?;
        pos.cur_mut().castles = castles;

        // ----- Field 4: en-passant target -----
        if fields[3] != "-" {
            let ep = Square::from_algebraic(fields[3]).ok_or_else(|| {
                ChessError::BadInput(format!("bad en-passant square '{}'", fields[3]))
            })?;
            if ep.rank() != 2 && ep.rank() != 5 {
                return Err(ChessError::BadInput(format!(
                    "en-passant square {} not on rank 3 or 6",
                    fields[3]
                )));
            }
            pos.cur_mut().ep = Some(ep);
        }

        // ----- Field 5: halfmove clock -----
        pos.cur_mut().clock = fields[4]
            .parse::<u16>()
            .map_err(|_| ChessError::BadInput(format!("bad halfmove clock '{}'", fields[4])))?;

        // ----- Field 6: fullmove number -----
        let move_num = fields[5]
            .parse::<u16>()
            .map_err(|_| ChessError::BadInput(format!("bad fullmove number '{}'", fields[5])))?;
        if move_num == 0 {
            return Err(ChessError::BadInput("fullmove number must be >= 1".into()));
        }
        pos.cur_mut().move_num = move_num;

        // Record the starting occurrence and classify.
        let key = pos.hash_key();
        let times_seen = pos.put_hash(key);
        pos.update_status(times_seen);

        #[cfg(debug_assertions)]
        pos.assert_consistent();

        tracing::trace!("loaded position {}", fields[0]);
        Ok(pos)
    }

    /// Export the position as FEN. The first four fields are exactly the
    /// repetition hash key.
    pub fn to_fen(&self) -> String {
        format!(
            "{} {} {}",
            self.hash_key(),
            self.cur().clock,
            self.cur().move_num
        )
    }

    /// Castling field, preferring `KQkq` and falling back to file letters
    /// when a tracked rook sits on a non-standard file.
    fn castling_field(&self) -> String {
        let c = self.cur().castles;
        let mut s = String::with_capacity(4);
        if let Some(f) = c.kingside(Color::White) {
            s.push(if f == 7 { 'K' } else { (b'A' + f) as char });
        }
        if let Some(f) = c.queenside(Color::White) {
            s.push(if f == 0 { 'Q' } else { (b'A' + f) as char });
        }
        if let Some(f) = c.kingside(Color::Black) {
            s.push(if f == 7 { 'k' } else { (b'a' + f) as char });
        }
        if let Some(f) = c.queenside(Color::Black) {
            s.push(if f == 0 { 'q' } else { (b'a' + f) as char });
        }
        if s.is_empty() {
            s.push('-');
        }
        s
    }
}

/// Parse the FEN castling field against the already-placed board. Standard
/// letters resolve to the outermost rook on the king's side of the back
/// rank (X-FEN), defaulting to the classical files; Shredder file letters
/// name the rook file directly.
fn parse_castling_field(field: &str, pos: &Position) -> Result<CastleRights, ChessError> {
    let mut rights = CastleRights::NONE;
    if field == "-" {
        return Ok(rights);
    }
    if field.is_empty() {
        return Err(ChessError::BadInput("empty castling field".into()));
    }
    for ch in field.chars() {
        let color = if ch.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let king_file = pos
            .king_square(color)
            .filter(|k| k.rank() == color.back_rank())
            .map(|k| k.file());
        match ch {
            'K' | 'k' => {
                let file = outermost_rook(pos, color, king_file, true).unwrap_or(7);
                rights.grant_kingside(color, file);
            }
            'Q' | 'q' => {
                let file = outermost_rook(pos, color, king_file, false).unwrap_or(0);
                rights.grant_queenside(color, file);
            }
            'A'..='H' | 'a'..='h' => {
                let file = ch.to_ascii_lowercase() as u8 - b'a';
                match king_file {
                    Some(kf) if file > kf => rights.grant_kingside(color, file),
                    Some(kf) if file < kf => rights.grant_queenside(color, file),
                    _ => {
                        return Err(ChessError::BadInput(format!(
                            "castling file '{ch}' without a matching back-rank king"
                        )));
                    }
                }
            }
            _ => {
                return Err(ChessError::BadInput(format!(
                    "bad castling character '{ch}'"
                )));
            }
        }
    }
    Ok(rights)
}

/// Outermost rook on the given side of the king along the back rank.
fn outermost_rook(
    pos: &Position,
    color: Color,
    king_file: Option<u8>,
    kingside: bool,
) -> Option<u8> {
    let kf = king_file?;
    let back = color.back_rank();
    let is_rook = |f: &u8| pos.piece_at(Square::new(*f, back)).is(color, PieceKind::Rook);
    if kingside {
        (kf + 1..8).rev().find(is_rook)
    } else {
        (0..kf).find(is_rook)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    fn pos(fen: &str) -> Position {
        Position::from_fen(fen).unwrap()
    }

    // ===================================================================
    // Starting position
    // ===================================================================

    #[test]
    fn starting_position_round_trips() {
        assert_eq!(Position::starting().to_fen(), START_FEN);
    }

    #[test]
    fn starting_position_metadata() {
        let p = Position::starting();
        assert_eq!(p.turn(), Color::White);
        assert_eq!(p.status(), GameStatus::Active);
        assert_eq!(p.en_passant(), None);
        assert_eq!(p.halfmove_clock(), 0);
        assert_eq!(p.fullmove_number(), 1);
        assert_eq!(p.castles(), CastleRights::standard());
    }

    #[test]
    fn starting_position_pieces() {
        let p = Position::starting();
        assert!(p.piece_at(sq("e1")).is(Color::White, PieceKind::King));
        assert!(p.piece_at(sq("d8")).is(Color::Black, PieceKind::Queen));
        assert!(p.piece_at(sq("a1")).is(Color::White, PieceKind::Rook));
        assert!(p.piece_at(sq("g8")).is(Color::Black, PieceKind::Knight));
        for file in 0..8 {
            assert!(p.piece_at(Square::new(file, 1)).is(Color::White, PieceKind::Pawn));
            assert!(p.piece_at(Square::new(file, 6)).is(Color::Black, PieceKind::Pawn));
        }
        for rank in 2..6 {
            for file in 0..8 {
                assert!(p.piece_at(Square::new(file, rank)).is_empty());
            }
        }
        assert_eq!(p.occupied_squares().len(), 32);
    }

    #[test]
    fn starting_position_is_consistent() {
        Position::starting().assert_consistent();
    }

    #[test]
    fn king_squares() {
        let p = Position::starting();
        assert_eq!(p.king_square(Color::White), Some(sq("e1")));
        assert_eq!(p.king_square(Color::Black), Some(sq("e8")));
    }

    // ===================================================================
    // Attack queries
    // ===================================================================

    #[test]
    fn starting_attacks() {
        let p = Position::starting();
        // d3 is covered by the c2 and e2 pawns.
        assert_eq!(p.attackers_count(sq("d3"), Color::White), 2);
        // f3 additionally by the g1 knight.
        assert_eq!(p.attackers_count(sq("f3"), Color::White), 3);
        // e4 by nobody.
        assert!(!p.is_attacked(sq("e4"), Color::White));
        assert!(!p.is_attacked(sq("e4"), Color::Black));
        assert!(p.is_attacked(sq("f6"), Color::Black));
    }

    #[test]
    fn king_in_danger_detection() {
        let p = pos("4k3/8/8/8/8/8/8/4K2r w - - 0 1");
        assert!(p.king_in_danger(Color::White));
        assert!(!p.king_in_danger(Color::Black));
    }

    // ===================================================================
    // FEN round trips
    // ===================================================================

    #[test]
    fn fen_round_trip_known_positions() {
        for fen in [
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w Kq - 5 20",
        ] {
            assert_eq!(pos(fen).to_fen(), fen);
        }
    }

    #[test]
    fn fen_shredder_castling_letters() {
        // Chess960: kings on b1/b8, rooks on a- and g-files. The kingside
        // rook is on a non-standard file and renders as a file letter; the
        // queenside rook sits on the classical a-file and renders as Q/q.
        let p = pos("rk4r1/pppppppp/8/8/8/8/PPPPPPPP/RK4R1 w GAga - 0 1");
        assert_eq!(p.castles().kingside(Color::White), Some(6));
        assert_eq!(p.castles().queenside(Color::White), Some(0));
        assert_eq!(
            p.to_fen(),
            "rk4r1/pppppppp/8/8/8/8/PPPPPPPP/RK4R1 w GQgq - 0 1"
        );
        // And the file-letter form parses back to the same rights.
        let q = pos(&p.to_fen());
        assert_eq!(q.castles(), p.castles());
    }

    #[test]
    fn fen_standard_letters_resolve_outermost_rooks() {
        let p = pos("rk4r1/pppppppp/8/8/8/8/PPPPPPPP/RK4R1 w KQkq - 0 1");
        // X-FEN: K finds the g1 rook, Q the a1 rook.
        assert_eq!(p.castles().kingside(Color::White), Some(6));
        assert_eq!(p.castles().queenside(Color::White), Some(0));
        assert_eq!(p.castles().kingside(Color::Black), Some(6));
    }

    #[test]
    fn fen_loaded_positions_are_consistent() {
        for fen in [
            START_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        ] {
            pos(fen).assert_consistent();
        }
    }

    // ===================================================================
    // FEN errors
    // ===================================================================

    #[test]
    fn fen_errors() {
        for bad in [
            "",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -",
            "rnbqkbnr/pppppppp/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "xnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w XY - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq z9 0 1",
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e4 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - abc 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQ1BNR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBKKBNR w KQkq - 0 1",
            "rnbqkbnrr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBN9 w KQkq - 0 1",
        ] {
            assert!(
                matches!(Position::from_fen(bad), Err(ChessError::BadInput(_))),
                "expected BadInput for {bad:?}"
            );
        }
    }

    // ===================================================================
    // Apply / revert
    // ===================================================================

    #[test]
    fn apply_pawn_double_push() {
        let mut p = Position::starting();
        let mv = crate::san::from_san(&mut p, "e4").unwrap();
        p.apply(&mv);
        assert_eq!(
            p.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
        assert!(p.piece_at(sq("e4")).has_moved());
        p.assert_consistent();
    }

    #[test]
    fn apply_revert_restores_everything() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let mut p = pos(fen);
        let key = p.hash_key();
        for mv in p.legal_moves() {
            p.apply(&mv);
            p.revert(&mv);
            assert_eq!(p.to_fen(), fen, "state mismatch after {mv}");
            assert_eq!(p.hash_key(), key);
            assert_eq!(p.status(), GameStatus::Active);
            p.assert_consistent();
        }
    }

    #[test]
    fn apply_updates_clock_and_move_number() {
        let mut p = Position::starting();
        let mv = crate::san::from_san(&mut p, "Nf3").unwrap();
        p.apply(&mv);
        assert_eq!(p.halfmove_clock(), 1);
        assert_eq!(p.fullmove_number(), 1);
        let mv = crate::san::from_san(&mut p, "Nf6").unwrap();
        p.apply(&mv);
        assert_eq!(p.halfmove_clock(), 2);
        assert_eq!(p.fullmove_number(), 2);
        let mv = crate::san::from_san(&mut p, "e4").unwrap();
        p.apply(&mv);
        assert_eq!(p.halfmove_clock(), 0, "pawn move resets the clock");
    }

    #[test]
    fn king_move_forfeits_castling() {
        let mut p = pos("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1");
        let mv = crate::san::find_move(&mut p, sq("e1"), sq("d1"), None).unwrap();
        p.apply(&mv);
        assert!(!p.castles().any(Color::White));
        assert!(p.castles().any(Color::Black));
        p.revert(&mv);
        assert_eq!(p.castles(), CastleRights::standard());
    }

    #[test]
    fn rook_move_and_rook_capture_forfeit_rights() {
        // Open h-file: Rh1xh8 moves one tracked rook and captures another.
        let mut p = pos("r3k2r/ppppppp1/8/8/8/8/PPPPPPP1/R3K2R w KQkq - 0 1");
        let mv = crate::san::find_move(&mut p, sq("h1"), sq("h8"), None).unwrap();
        p.apply(&mv);
        assert_eq!(p.castles().kingside(Color::White), None);
        assert_eq!(p.castles().kingside(Color::Black), None);
        assert_eq!(p.castles().queenside(Color::White), Some(0));
        assert_eq!(p.castles().queenside(Color::Black), Some(0));
        p.revert(&mv);
        assert_eq!(p.castles(), CastleRights::standard());
    }

    // ===================================================================
    // Repetition hash layering
    // ===================================================================

    #[test]
    fn put_hash_counts_across_layers() {
        let mut p = Position::starting();
        let key = p.hash_key();
        assert_eq!(p.repetition_count(), 1); // recorded at load

        p.save();
        assert_eq!(p.put_hash(key.clone()), 2);
        p.save();
        assert_eq!(p.put_hash(key.clone()), 3);
        assert_eq!(p.repetition_count(), 3);
        p.remove_hash(&key);
        assert_eq!(p.repetition_count(), 2);
        p.restore();
        p.restore();
        assert_eq!(p.repetition_count(), 1);
    }

    #[test]
    fn seen_counts_survive_save_apply_revert_restore() {
        let mut p = Position::starting();
        let before = p.repetition_count();
        let mv = crate::san::from_san(&mut p, "e4").unwrap();
        p.save();
        p.apply(&mv);
        p.revert(&mv);
        p.restore();
        assert_eq!(p.repetition_count(), before);
    }

    #[test]
    fn hash_ignores_clocks() {
        let a = pos("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        let b = pos("4k3/8/8/8/8/8/4P3/4K3 w - - 31 77");
        assert_eq!(a.hash_key(), b.hash_key());
        assert_ne!(a.to_fen(), b.to_fen());
    }

    // ===================================================================
    // Status classification at load
    // ===================================================================

    #[test]
    fn load_checkmate() {
        // Fool's mate final position.
        let p = pos("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        assert_eq!(p.status(), GameStatus::Checkmate);
        assert!(p.status().is_over());
        assert!(!p.status().is_draw());
    }

    #[test]
    fn load_stalemate() {
        let p = pos("k7/2K5/1Q6/8/8/8/8/8 b - - 0 1");
        assert_eq!(p.status(), GameStatus::DrawStalemate);
    }

    #[test]
    fn load_fifty_moves() {
        let p = pos("4k3/8/8/8/8/8/4P3/4K3 w - - 100 80");
        assert_eq!(p.status(), GameStatus::DrawFiftyMoves);
    }

    #[test]
    fn load_insufficient_material() {
        let p = pos("4k3/8/8/8/8/8/8/4K3 w - - 0 1");
        assert_eq!(p.status(), GameStatus::DrawNoMaterial);
    }

    #[test]
    fn checkmate_beats_draw_conditions() {
        // Mate on the board with the clock past fifty moves: mate wins.
        let p = pos("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 100 80");
        assert_eq!(p.status(), GameStatus::Checkmate);
    }

    // ===================================================================
    // Insufficient material
    // ===================================================================

    #[test]
    fn insufficient_k_vs_k() {
        assert_eq!(pos("4k3/8/8/8/8/8/8/4K3 w - - 0 1").status(), GameStatus::DrawNoMaterial);
    }

    #[test]
    fn insufficient_lone_minor() {
        assert_eq!(
            pos("4k3/8/8/8/8/8/8/4KB2 w - - 0 1").status(),
            GameStatus::DrawNoMaterial
        );
        assert_eq!(
            pos("4k3/8/8/8/8/8/8/4KN2 w - - 0 1").status(),
            GameStatus::DrawNoMaterial
        );
        assert_eq!(
            pos("3nk3/8/8/8/8/8/8/4K3 w - - 0 1").status(),
            GameStatus::DrawNoMaterial
        );
    }

    #[test]
    fn insufficient_same_colored_bishops() {
        // c1 and f8 are both dark squares.
        assert_eq!(
            pos("4kb2/8/8/8/8/8/8/2B1K3 w - - 0 1").status(),
            GameStatus::DrawNoMaterial
        );
    }

    #[test]
    fn sufficient_opposite_colored_bishops() {
        // c1 dark, c8 light.
        assert_eq!(pos("2b1k3/8/8/8/8/8/8/2B1K3 w - - 0 1").status(), GameStatus::Active);
    }

    #[test]
    fn sufficient_with_pawn_rook_or_queen() {
        assert_eq!(pos("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").status(), GameStatus::Active);
        assert_eq!(pos("4k3/8/8/8/8/8/8/4K2R w - - 0 1").status(), GameStatus::Active);
        assert_eq!(pos("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").status(), GameStatus::Active);
    }

    #[test]
    fn two_knights_are_not_an_automatic_draw() {
        assert_eq!(
            pos("4k3/8/8/8/8/8/8/2NNK3 w - - 0 1").status(),
            GameStatus::Active
        );
    }

    #[test]
    fn two_bishops_one_side_sufficient() {
        assert_eq!(
            pos("4k3/8/8/8/8/8/8/2BBK3 w - - 0 1").status(),
            GameStatus::Active
        );
    }

    // ===================================================================
    // Direct editing
    // ===================================================================

    #[test]
    fn set_replaces_and_clears() {
        let mut p = Position::empty();
        let e4 = sq("e4");
        p.set(e4, Piece::new(Color::White, PieceKind::Knight));
        assert!(p.piece_at(e4).is(Color::White, PieceKind::Knight));
        p.set(e4, Piece::new(Color::Black, PieceKind::Queen));
        assert!(p.piece_at(e4).is(Color::Black, PieceKind::Queen));
        p.set(e4, Piece::EMPTY);
        assert!(p.piece_at(e4).is_empty());
        assert_eq!(p.occupied_squares().len(), 0);
        p.assert_consistent();
    }
}
