use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;

use crate::EngineError;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasePosition {
    StartPos,
    Fen(String),
}

/// What the engine was last told about the board: a base plus the moves
/// played from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    base: BasePosition,
    moves: Vec<String>,
    synced: bool,
}

impl Default for PositionRecord {
    fn default() -> Self {
        Self::from_moves(Vec::new())
    }
}

impl PositionRecord {
    pub fn from_moves(moves: Vec<String>) -> Self {
        Self {
            base: BasePosition::StartPos,
            moves,
            synced: true,
        }
    }

    pub fn from_fen(fen: &str) -> Self {
        Self {
            base: BasePosition::Fen(fen.trim().to_string()),
            moves: Vec::new(),
            synced: true,
        }
    }

    pub fn base(&self) -> &BasePosition {
        &self.base
    }

    pub fn base_fen(&self) -> &str {
        match &self.base {
            BasePosition::StartPos => START_FEN,
            BasePosition::Fen(fen) => fen,
        }
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn push(&mut self, mv: &str) {
        self.moves.push(mv.to_string());
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Marks the record as no longer matching the engine. Only a wholesale
    /// replacement clears this.
    pub fn mark_stale(&mut self) {
        self.synced = false;
    }

    pub fn white_to_move(&self) -> bool {
        let base_white = self.base_fen().split_whitespace().nth(1) != Some("b");
        base_white == (self.moves.len() % 2 == 0)
    }

    pub fn to_command(&self) -> String {
        let mut cmd = match &self.base {
            BasePosition::StartPos => "position startpos".to_string(),
            BasePosition::Fen(fen) => format!("position fen {}", fen),
        };
        if !self.moves.is_empty() {
            cmd.push_str(" moves ");
            cmd.push_str(&self.moves.join(" "));
        }
        cmd
    }
}

fn parse_square(square: &str) -> Option<(usize, usize)> {
    let bytes = square.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let file = bytes[0].checked_sub(b'a')? as usize;
    let rank = bytes[1].checked_sub(b'1')? as usize;
    (file < 8 && rank < 8).then_some((file, rank))
}

pub fn validate_square(square: &str) -> Result<(usize, usize), EngineError> {
    parse_square(square)
        .ok_or_else(|| EngineError::InvalidMoveNotation(format!("{:?} is not a square", square)))
}

/// Checks coordinate notation (`e2e4`, `e7e8q`). Says nothing about legality.
pub fn validate_move(mv: &str) -> Result<(), EngineError> {
    let invalid = || EngineError::InvalidMoveNotation(mv.to_string());
    if !mv.is_ascii() || !(4..=5).contains(&mv.len()) {
        return Err(invalid());
    }
    parse_square(&mv[0..2]).ok_or_else(invalid)?;
    parse_square(&mv[2..4]).ok_or_else(invalid)?;
    if mv.len() == 5 && !matches!(&mv[4..], "q" | "r" | "b" | "n") {
        return Err(invalid());
    }
    Ok(())
}

/// Syntactic FEN check: six fields, eight ranks of eight squares each, and
/// well-formed side, castling, en passant and clock fields.
pub fn check_fen_syntax(fen: &str) -> Result<(), String> {
    let fields: Vec<&str> = fen.split(' ').collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, got {}", fields.len()));
    }

    let ranks: Vec<&str> = fields[0].split('/').collect();
    if ranks.len() != 8 {
        return Err(format!("expected 8 ranks, got {}", ranks.len()));
    }
    for rank in &ranks {
        let mut width = 0;
        for c in rank.chars() {
            match c {
                '1'..='8' => width += c as u32 - '0' as u32,
                _ if Piece::from_fen_char(c).is_some() => width += 1,
                _ => return Err(format!("unexpected {:?} in rank {:?}", c, rank)),
            }
        }
        if width != 8 {
            return Err(format!("rank {:?} covers {} squares", rank, width));
        }
    }

    if !matches!(fields[1], "w" | "b") {
        return Err(format!("bad side to move {:?}", fields[1]));
    }

    let castling = fields[2];
    if castling != "-" {
        let unique: HashSet<char> = castling.chars().collect();
        if castling.len() > 4
            || unique.len() != castling.len()
            || !castling.chars().all(|c| "KQkq".contains(c))
        {
            return Err(format!("bad castling rights {:?}", castling));
        }
    }

    let ep = fields[3];
    if ep != "-" && !matches!(parse_square(ep), Some((_, 2)) | Some((_, 5))) {
        return Err(format!("bad en passant square {:?}", ep));
    }

    for clock in &fields[4..] {
        if clock.is_empty() || !clock.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("bad move counter {:?}", clock));
        }
    }
    Ok(())
}

pub fn en_passant_square(fen: &str) -> Option<&str> {
    fen.split_whitespace().nth(3).filter(|sq| *sq != "-")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Piece {
    WhitePawn,
    WhiteKnight,
    WhiteBishop,
    WhiteRook,
    WhiteQueen,
    WhiteKing,
    BlackPawn,
    BlackKnight,
    BlackBishop,
    BlackRook,
    BlackQueen,
    BlackKing,
}

impl Piece {
    pub fn from_fen_char(c: char) -> Option<Self> {
        Some(match c {
            'P' => Self::WhitePawn,
            'N' => Self::WhiteKnight,
            'B' => Self::WhiteBishop,
            'R' => Self::WhiteRook,
            'Q' => Self::WhiteQueen,
            'K' => Self::WhiteKing,
            'p' => Self::BlackPawn,
            'n' => Self::BlackKnight,
            'b' => Self::BlackBishop,
            'r' => Self::BlackRook,
            'q' => Self::BlackQueen,
            'k' => Self::BlackKing,
            _ => return None,
        })
    }

    pub fn to_fen_char(self) -> char {
        match self {
            Self::WhitePawn => 'P',
            Self::WhiteKnight => 'N',
            Self::WhiteBishop => 'B',
            Self::WhiteRook => 'R',
            Self::WhiteQueen => 'Q',
            Self::WhiteKing => 'K',
            Self::BlackPawn => 'p',
            Self::BlackKnight => 'n',
            Self::BlackBishop => 'b',
            Self::BlackRook => 'r',
            Self::BlackQueen => 'q',
            Self::BlackKing => 'k',
        }
    }

    pub fn is_white(self) -> bool {
        self.to_fen_char().is_ascii_uppercase()
    }

    pub fn is_pawn(self) -> bool {
        matches!(self, Self::WhitePawn | Self::BlackPawn)
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_fen_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capture {
    DirectCapture,
    EnPassant,
    NoCapture,
}

/// Piece placement decoded from a FEN. Index `[rank][file]`, rank 0 is rank 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    pub fn from_fen(fen: &str) -> Result<Self, EngineError> {
        let placement = fen
            .split_whitespace()
            .next()
            .ok_or_else(|| EngineError::InvalidFen(fen.to_string()))?;
        let mut squares = [[None; 8]; 8];
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(EngineError::InvalidFen(fen.to_string()));
        }
        for (i, rank) in ranks.iter().enumerate() {
            let row = &mut squares[7 - i];
            let mut file = 0;
            for c in rank.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as usize;
                } else {
                    let piece = Piece::from_fen_char(c)
                        .ok_or_else(|| EngineError::InvalidFen(fen.to_string()))?;
                    *row
                        .get_mut(file)
                        .ok_or_else(|| EngineError::InvalidFen(fen.to_string()))? = Some(piece);
                    file += 1;
                }
            }
            if file != 8 {
                return Err(EngineError::InvalidFen(fen.to_string()));
            }
        }
        Ok(Self { squares })
    }

    pub fn piece_at(&self, square: &str) -> Result<Option<Piece>, EngineError> {
        let (file, rank) = validate_square(square)?;
        Ok(self.squares[rank][file])
    }

    pub fn count(&self, filter: &PieceFilter) -> usize {
        let mut total = 0;
        for (rank, row) in self.squares.iter().enumerate() {
            for (file, square) in row.iter().enumerate() {
                let file_char = (b'a' + file as u8) as char;
                if let Some(piece) = square {
                    if filter.files.contains(&file_char)
                        && filter.ranks.contains(&(rank as u8 + 1))
                        && filter.pieces.as_ref().is_none_or(|set| set.contains(piece))
                    {
                        total += 1;
                    }
                }
            }
        }
        total
    }
}

#[derive(Debug, Clone)]
pub struct PieceFilter {
    pub files: RangeInclusive<char>,
    pub ranks: RangeInclusive<u8>,
    /// `None` counts every piece.
    pub pieces: Option<HashSet<Piece>>,
}

impl Default for PieceFilter {
    fn default() -> Self {
        Self {
            files: 'a'..='h',
            ranks: 1..=8,
            pieces: None,
        }
    }
}

impl PieceFilter {
    pub fn validate(&self) -> Result<(), EngineError> {
        let files_ok = ('a'..='h').contains(self.files.start())
            && ('a'..='h').contains(self.files.end())
            && self.files.start() <= self.files.end();
        let ranks_ok = (1..=8).contains(self.ranks.start())
            && (1..=8).contains(self.ranks.end())
            && self.ranks.start() <= self.ranks.end();
        if !files_ok || !ranks_ok {
            return Err(EngineError::InvalidParameter(format!(
                "piece filter out of board: files {:?}, ranks {:?}",
                self.files, self.ranks
            )));
        }
        Ok(())
    }
}

const SEPARATOR: &str = " +---+---+---+---+---+---+---+---+";

/// Renders the grid the way Stockfish's `d` command does. With
/// `white_bottom == false` the board is seen from Black's side.
pub fn render_board(board: &Board, white_bottom: bool) -> String {
    let ranks: Vec<usize> = if white_bottom {
        (0..8).rev().collect()
    } else {
        (0..8).collect()
    };
    let files: Vec<usize> = if white_bottom {
        (0..8).collect()
    } else {
        (0..8).rev().collect()
    };

    let mut out = String::new();
    out.push_str(SEPARATOR);
    out.push('\n');
    for rank in ranks {
        out.push(' ');
        for &file in &files {
            let c = board.squares[rank][file].map_or(' ', Piece::to_fen_char);
            out.push_str(&format!("| {} ", c));
        }
        out.push_str(&format!("| {}\n", rank + 1));
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out.push_str("  ");
    for &file in &files {
        out.push_str(&format!(" {}  ", (b'a' + file as u8) as char));
    }
    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}
