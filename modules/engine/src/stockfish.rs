use log::{debug, info};
use std::collections::BTreeMap;

use crate::params::{OptionValue, ParameterStore};
use crate::position::{
    Board, Capture, Piece, PieceFilter, PositionRecord, check_fen_syntax, en_passant_square,
    render_board, validate_move, validate_square,
};
use crate::process::{Handshake, ProcessChannel};
use crate::session::{Session, SessionState};
use crate::{
    BenchReport, BenchmarkParams, EngineChannel, EngineConfig, EngineError, GoParams, Score,
    TopMove, WdlStats,
};

/// Search depth used by the throwaway engine that checks FEN legality.
const PROBE_DEPTH: u32 = 10;

fn single(name: &str, value: OptionValue) -> BTreeMap<String, OptionValue> {
    BTreeMap::from([(name.to_string(), value)])
}

/// High level handle on one running engine.
pub struct Stockfish {
    session: Session,
    params: ParameterStore,
    position: PositionRecord,
    depth: u32,
    turn_perspective: bool,
    last_info: Option<String>,
}

impl Stockfish {
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let (channel, handshake) = ProcessChannel::start(&config).await?;
        Self::with_channel(Box::new(channel), handshake, config).await
    }

    /// Builds a session over an already handshaken channel, applies the
    /// default options plus the configured overrides and sets the start
    /// position.
    pub async fn with_channel(
        channel: Box<dyn EngineChannel>,
        handshake: Handshake,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        if config.depth == 0 {
            return Err(EngineError::InvalidParameter(
                "depth must be at least 1".to_string(),
            ));
        }
        let params = ParameterStore::new(&handshake.options);
        let mut initial = params.defaults();
        initial.extend(config.parameters.clone());

        let mut stockfish = Self {
            session: Session::new(channel, handshake, config.read_timeout()),
            params,
            position: PositionRecord::default(),
            depth: config.depth,
            turn_perspective: config.turn_perspective,
            last_info: None,
        };
        stockfish.update_parameters(initial).await?;
        stockfish
            .session
            .set_position(&stockfish.position, true)
            .await?;
        info!(
            "Engine session ready: {}",
            stockfish.engine_name().unwrap_or("unnamed engine")
        );
        Ok(stockfish)
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn position(&self) -> &PositionRecord {
        &self.position
    }

    /// The raw last `info` line of the most recent best move search.
    pub fn last_info(&self) -> Option<&str> {
        self.last_info.as_deref()
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.session.handshake().name.as_deref()
    }

    pub fn major_version(&self) -> Option<u32> {
        let version = self.engine_name()?.split_whitespace().nth(1)?;
        version.split(['.', '-']).next()?.parse().ok()
    }

    pub fn is_development_build(&self) -> bool {
        self.engine_name()
            .and_then(|name| name.split_whitespace().nth(1))
            .is_some_and(|version| version.starts_with("dev"))
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn set_depth(&mut self, depth: u32) -> Result<(), EngineError> {
        if depth == 0 {
            return Err(EngineError::InvalidParameter(
                "depth must be at least 1".to_string(),
            ));
        }
        self.depth = depth;
        Ok(())
    }

    pub fn turn_perspective(&self) -> bool {
        self.turn_perspective
    }

    pub fn set_turn_perspective(&mut self, turn_perspective: bool) {
        self.turn_perspective = turn_perspective;
    }

    // Parameters

    pub fn parameters(&self) -> BTreeMap<String, OptionValue> {
        self.params.get_all()
    }

    pub fn parameter(&self, name: &str) -> Option<OptionValue> {
        self.params.get(name)
    }

    /// Sends only the entries that differ from the acknowledged values. The
    /// local mirror changes only after the engine confirmed the whole batch.
    pub async fn update_parameters(
        &mut self,
        updates: BTreeMap<String, OptionValue>,
    ) -> Result<(), EngineError> {
        self.session.ensure_ready()?;
        let changes = self.params.plan(&updates)?;
        if changes.is_empty() {
            return Ok(());
        }
        self.session.set_options(&changes).await?;
        self.params.commit(changes);
        Ok(())
    }

    pub async fn reset_parameters(&mut self) -> Result<(), EngineError> {
        self.update_parameters(self.params.defaults()).await
    }

    pub async fn set_skill_level(&mut self, level: u32) -> Result<(), EngineError> {
        self.update_parameters(BTreeMap::from([
            ("UCI_LimitStrength".to_string(), OptionValue::Bool(false)),
            ("Skill Level".to_string(), OptionValue::from(level)),
        ]))
        .await
    }

    pub async fn set_elo_rating(&mut self, elo: u32) -> Result<(), EngineError> {
        self.update_parameters(BTreeMap::from([
            ("UCI_LimitStrength".to_string(), OptionValue::Bool(true)),
            ("UCI_Elo".to_string(), OptionValue::from(elo)),
        ]))
        .await
    }

    pub async fn resume_full_strength(&mut self) -> Result<(), EngineError> {
        self.set_skill_level(20).await
    }

    // Position

    fn synced_position(&self) -> Result<&PositionRecord, EngineError> {
        self.session.ensure_ready()?;
        if !self.position.is_synced() {
            return Err(EngineError::ProtocolViolation(
                "position is out of sync with the engine; set a new position".to_string(),
            ));
        }
        Ok(&self.position)
    }

    async fn replace_position(
        &mut self,
        record: PositionRecord,
        new_game: bool,
    ) -> Result<(), EngineError> {
        self.session.ensure_ready()?;
        match self.session.set_position(&record, new_game).await {
            Ok(()) => {
                self.position = record;
                Ok(())
            }
            Err(e) => {
                self.position.mark_stale();
                Err(e)
            }
        }
    }

    /// Plays `moves` from the standard start position.
    pub async fn set_position<S: AsRef<str>>(&mut self, moves: &[S]) -> Result<(), EngineError> {
        for mv in moves {
            validate_move(mv.as_ref())?;
        }
        let record =
            PositionRecord::from_moves(moves.iter().map(|m| m.as_ref().to_string()).collect());
        self.replace_position(record, true).await
    }

    pub async fn set_fen_position(
        &mut self,
        fen: &str,
        send_ucinewgame: bool,
    ) -> Result<(), EngineError> {
        check_fen_syntax(fen.trim())
            .map_err(|reason| EngineError::InvalidFen(format!("{}: {}", fen, reason)))?;
        self.replace_position(PositionRecord::from_fen(fen), send_ucinewgame)
            .await
    }

    /// Appends moves to the current position. Every move is checked for
    /// legality before it is applied; on an illegal move the engine is put
    /// back on the original position. The record is rebased onto the
    /// engine's current FEN so only the new moves travel.
    pub async fn make_moves_from_current_position<S: AsRef<str>>(
        &mut self,
        moves: &[S],
    ) -> Result<(), EngineError> {
        if moves.is_empty() {
            return Ok(());
        }
        for mv in moves {
            validate_move(mv.as_ref())?;
        }
        self.synced_position()?;

        let current_fen = self.session.board().await?.fen;
        let mut candidate = PositionRecord::from_fen(&current_fen);
        for mv in moves {
            let mv = mv.as_ref();
            if !self.probe_move(mv).await? {
                if !candidate.moves().is_empty() {
                    if let Err(e) = self.session.set_position(&self.position, false).await {
                        self.position.mark_stale();
                        return Err(e);
                    }
                }
                return Err(EngineError::IllegalMove(mv.to_string()));
            }
            candidate.push(mv);
            if let Err(e) = self.session.set_position(&candidate, false).await {
                self.position.mark_stale();
                return Err(e);
            }
        }
        debug!("Position rebased onto {}", candidate.base_fen());
        self.position = candidate;
        Ok(())
    }

    async fn probe_move(&mut self, mv: &str) -> Result<bool, EngineError> {
        let params = GoParams {
            depth: Some(1),
            search_moves: Some(vec![mv.to_string()]),
            ..GoParams::default()
        };
        Ok(self.session.search(&params).await?.best_move.is_some())
    }

    pub async fn is_move_correct(&mut self, mv: &str) -> Result<bool, EngineError> {
        validate_move(mv)?;
        self.synced_position()?;
        self.probe_move(mv).await
    }

    /// Syntax check first; only a well formed FEN is handed to a separate
    /// engine instance. Positions without legal moves (mate, stalemate) are
    /// reported invalid.
    pub async fn is_fen_valid(&mut self, fen: &str) -> Result<bool, EngineError> {
        let fen = fen.trim();
        if let Err(reason) = check_fen_syntax(fen) {
            debug!("Rejected FEN {:?}: {}", fen, reason);
            return Ok(false);
        }
        self.session.probe_fen(fen, PROBE_DEPTH).await
    }

    pub async fn fen_position(&mut self) -> Result<String, EngineError> {
        self.synced_position()?;
        Ok(self.session.board().await?.fen)
    }

    pub async fn board_visual(&mut self, white_perspective: bool) -> Result<String, EngineError> {
        self.synced_position()?;
        let dump = self.session.board().await?;
        if white_perspective {
            let mut visual = dump.diagram.join("\n");
            visual.push('\n');
            Ok(visual)
        } else {
            Ok(render_board(&Board::from_fen(&dump.fen)?, false))
        }
    }

    pub async fn what_is_on_square(&mut self, square: &str) -> Result<Option<Piece>, EngineError> {
        validate_square(square)?;
        let fen = self.fen_position().await?;
        Board::from_fen(&fen)?.piece_at(square)
    }

    pub async fn will_move_be_a_capture(&mut self, mv: &str) -> Result<Capture, EngineError> {
        if !self.is_move_correct(mv).await? {
            return Err(EngineError::IllegalMove(mv.to_string()));
        }
        let fen = self.fen_position().await?;
        let board = Board::from_fen(&fen)?;
        let (from, to) = (&mv[0..2], &mv[2..4]);

        if board.piece_at(to)?.is_some() {
            Ok(Capture::DirectCapture)
        } else if en_passant_square(&fen) == Some(to)
            && board.piece_at(from)?.is_some_and(Piece::is_pawn)
        {
            Ok(Capture::EnPassant)
        } else {
            Ok(Capture::NoCapture)
        }
    }

    pub async fn count_pieces(&mut self, filter: &PieceFilter) -> Result<usize, EngineError> {
        filter.validate()?;
        let fen = self.fen_position().await?;
        Ok(Board::from_fen(&fen)?.count(filter))
    }

    // Search

    fn flip_to_white(&self) -> bool {
        !self.turn_perspective && !self.position.white_to_move()
    }

    fn orient(&self, score: Score) -> Score {
        if self.flip_to_white() {
            score.negate()
        } else {
            score
        }
    }

    async fn best_move_with(&mut self, params: GoParams) -> Result<Option<String>, EngineError> {
        self.synced_position()?;
        let outcome = self.session.search(&params).await?;
        self.last_info = outcome.last_info;
        Ok(outcome.best_move)
    }

    /// `None` when the side to move has no legal move.
    pub async fn best_move(&mut self) -> Result<Option<String>, EngineError> {
        self.best_move_with(GoParams::depth(self.depth)).await
    }

    pub async fn best_move_with_clock(
        &mut self,
        wtime_ms: u64,
        btime_ms: u64,
    ) -> Result<Option<String>, EngineError> {
        self.best_move_with(GoParams {
            wtime_ms: Some(wtime_ms),
            btime_ms: Some(btime_ms),
            ..GoParams::default()
        })
        .await
    }

    pub async fn best_move_time(&mut self, ms: u64) -> Result<Option<String>, EngineError> {
        self.best_move_with(GoParams::movetime(ms)).await
    }

    pub async fn evaluation(&mut self) -> Result<Score, EngineError> {
        self.synced_position()?;
        let outcome = self.session.search(&GoParams::depth(self.depth)).await?;
        let score = outcome
            .principal()
            .and_then(|info| info.score)
            .ok_or_else(|| EngineError::ParseError("search reported no score".to_string()))?;
        Ok(self.orient(score))
    }

    /// Static evaluation in pawns, `None` when the side to move is in check.
    pub async fn static_eval(&mut self) -> Result<Option<f64>, EngineError> {
        self.synced_position()?;
        let white_side = self.session.static_eval().await?;
        let negate = self.turn_perspective && !self.position.white_to_move();
        Ok(white_side.map(|v| if negate { -v } else { v }))
    }

    /// The `n` best moves at the configured depth, best first. Strength
    /// limits (`Skill Level`, `UCI_Elo`) are left as configured.
    pub async fn top_moves(&mut self, n: u32) -> Result<Vec<TopMove>, EngineError> {
        if n == 0 {
            return Err(EngineError::InvalidParameter(
                "number of top moves must be positive".to_string(),
            ));
        }
        self.synced_position()?;

        let wanted = OptionValue::from(n);
        let previous = self.params.get("MultiPV");
        if previous.as_ref() != Some(&wanted) {
            self.update_parameters(single("MultiPV", wanted.clone()))
                .await?;
        }
        let outcome = self.session.search(&GoParams::depth(self.depth)).await?;
        if let Some(previous) = previous.filter(|p| *p != wanted) {
            self.update_parameters(single("MultiPV", previous)).await?;
        }

        if outcome.best_move.is_none() {
            return Ok(Vec::new());
        }
        let depth = outcome.principal().and_then(|info| info.depth);
        let flip = self.flip_to_white();
        Ok(outcome
            .lines
            .into_values()
            .filter(|info| info.rank() <= n && info.depth == depth)
            .filter_map(|info| {
                let score = info.score?;
                let mv = info.pv.first()?.clone();
                Some(TopMove {
                    mv,
                    score: self.orient(score),
                    rank: info.rank(),
                    depth: info.depth,
                    seldepth: info.seldepth,
                    nodes: info.nodes,
                    nps: info.nps,
                    time_ms: info.time_ms,
                    wdl: info.wdl.map(|w| if flip { w.flipped() } else { w }),
                    pv: info.pv,
                })
            })
            .collect())
    }

    pub fn supports_wdl(&self) -> bool {
        self.params.supports("UCI_ShowWDL")
    }

    /// Win/draw/loss permille for the principal line, `None` when the game
    /// is already over.
    pub async fn wdl_stats(&mut self) -> Result<Option<WdlStats>, EngineError> {
        if !self.supports_wdl() {
            return Err(EngineError::InvalidParameter(
                "engine does not advertise UCI_ShowWDL".to_string(),
            ));
        }
        self.synced_position()?;

        let on = OptionValue::Bool(true);
        let previous = self.params.get("UCI_ShowWDL");
        if previous.as_ref() != Some(&on) {
            self.update_parameters(single("UCI_ShowWDL", on.clone()))
                .await?;
        }
        let outcome = self.session.search(&GoParams::depth(self.depth)).await?;
        if let Some(previous) = previous.filter(|p| *p != on) {
            self.update_parameters(single("UCI_ShowWDL", previous))
                .await?;
        }

        if outcome.best_move.is_none() {
            return Ok(None);
        }
        let wdl = outcome
            .principal()
            .and_then(|info| info.wdl)
            .ok_or_else(|| EngineError::ParseError("search reported no wdl".to_string()))?;
        Ok(Some(if self.flip_to_white() {
            wdl.flipped()
        } else {
            wdl
        }))
    }

    pub async fn benchmark(&mut self, params: &BenchmarkParams) -> Result<BenchReport, EngineError> {
        self.session.bench(params).await
    }

    pub async fn quit(&mut self) -> Result<(), EngineError> {
        info!("Shutting down engine session");
        self.session.quit().await
    }
}
