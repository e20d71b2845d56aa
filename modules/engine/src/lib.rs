use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod config;
#[cfg(test)]
mod fake;
pub mod params;
pub mod parser;
pub mod position;
pub mod process;
pub mod session;
pub mod stockfish;

pub use config::EngineConfig;
pub use params::{OptionKind, OptionValue, ParameterStore};
pub use position::{Board, Capture, Piece, PieceFilter, PositionRecord, START_FEN};
pub use process::{ChannelState, Handshake, ProcessChannel};
pub use session::{SearchOutcome, Session, SessionState};
pub use stockfish::Stockfish;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to start engine: {0}")]
    StartFailed(String),
    #[error("Engine is no longer available")]
    Unavailable,
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Invalid move notation: {0}")]
    InvalidMoveNotation(String),
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),
    #[error("Engine crashed: {0}")]
    Crashed(String),
    #[error("Engine timeout")]
    Timeout,
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Errors after which the engine stream can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Crashed(_) | EngineError::Timeout | EngineError::Io(_)
        )
    }
}

/// Bounds for a single `go` command. At least one bound must be set since
/// there is no way to stop a search once it has been issued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoParams {
    pub depth: Option<u32>,
    pub time_limit_ms: Option<u64>,
    pub wtime_ms: Option<u64>,
    pub btime_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub search_moves: Option<Vec<String>>,
}

impl GoParams {
    pub fn depth(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    pub fn movetime(ms: u64) -> Self {
        Self {
            time_limit_ms: Some(ms),
            ..Self::default()
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.depth.is_some()
            || self.time_limit_ms.is_some()
            || self.nodes.is_some()
            || (self.wtime_ms.is_some() && self.btime_ms.is_some())
    }

    pub fn to_command(&self) -> String {
        let mut cmd = "go".to_string();
        if let Some(depth) = self.depth {
            cmd.push_str(&format!(" depth {}", depth));
        }
        if let Some(wtime) = self.wtime_ms {
            cmd.push_str(&format!(" wtime {}", wtime));
        }
        if let Some(btime) = self.btime_ms {
            cmd.push_str(&format!(" btime {}", btime));
        }
        if let Some(nodes) = self.nodes {
            cmd.push_str(&format!(" nodes {}", nodes));
        }
        if let Some(time) = self.time_limit_ms {
            cmd.push_str(&format!(" movetime {}", time));
        }
        if let Some(moves) = self.search_moves.as_ref().filter(|m| !m.is_empty()) {
            cmd.push_str(" searchmoves ");
            cmd.push_str(&moves.join(" "));
        }
        cmd
    }
}

/// An engine score. Mate values are signed move counts to mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Score {
    Centipawn(i32),
    Mate(i32),
}

impl Score {
    pub fn negate(self) -> Self {
        match self {
            Score::Centipawn(cp) => Score::Centipawn(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }

    pub fn centipawn(&self) -> Option<i32> {
        match self {
            Score::Centipawn(cp) => Some(*cp),
            Score::Mate(_) => None,
        }
    }

    pub fn mate(&self) -> Option<i32> {
        match self {
            Score::Mate(n) => Some(*n),
            Score::Centipawn(_) => None,
        }
    }
}

/// Win/draw/loss expectation in permille.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WdlStats {
    pub win: u32,
    pub draw: u32,
    pub loss: u32,
}

impl WdlStats {
    pub fn flipped(self) -> Self {
        Self {
            win: self.loss,
            draw: self.draw,
            loss: self.win,
        }
    }
}

/// One ranked candidate from a multi-PV search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMove {
    #[serde(rename = "move")]
    pub mv: String,
    pub score: Score,
    pub rank: u32,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time_ms: Option<u64>,
    pub wdl: Option<WdlStats>,
    pub pv: Vec<String>,
}

impl TopMove {
    pub fn centipawn(&self) -> Option<i32> {
        self.score.centipawn()
    }

    pub fn mate(&self) -> Option<i32> {
        self.score.mate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkParams {
    pub hash_mb: u32,
    pub threads: u32,
    pub limit: u32,
    pub fen_file: String,
    pub limit_type: String,
    pub eval_type: String,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            hash_mb: 16,
            threads: 1,
            limit: 13,
            fen_file: "default".to_string(),
            limit_type: "depth".to_string(),
            eval_type: "mixed".to_string(),
        }
    }
}

impl BenchmarkParams {
    pub fn to_command(&self) -> String {
        format!(
            "bench {} {} {} {} {} {}",
            self.hash_mb, self.threads, self.limit, self.fen_file, self.limit_type, self.eval_type
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchReport {
    pub total_time_ms: Option<u64>,
    pub nodes_searched: Option<u64>,
    pub nodes_per_second: u64,
}

/// Line-oriented duplex connection to one engine instance. Only one consumer
/// reads from a channel at a time; lines come back in the order the engine
/// wrote them.
#[async_trait]
pub trait EngineChannel: Send {
    async fn send_line(&mut self, line: &str) -> Result<(), EngineError>;
    /// `Ok(None)` means the engine closed its output and nothing is buffered.
    async fn read_line(&mut self, timeout: Option<Duration>) -> Result<Option<String>, EngineError>;
    fn is_alive(&mut self) -> bool;
    async fn terminate(&mut self) -> Result<(), EngineError>;
    /// Starts an independent engine of the same kind, already past its handshake.
    async fn spawn_probe(&mut self) -> Result<Box<dyn EngineChannel>, EngineError>;
}
