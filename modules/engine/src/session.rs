use log::{debug, warn};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::params::OptionValue;
use crate::parser::{
    BenchCollector, BoardDump, InfoLine, UciMessage, is_board_dump_end, parse_board_dump,
    parse_uci_line,
};
use crate::position::PositionRecord;
use crate::process::Handshake;
use crate::{BenchReport, BenchmarkParams, EngineChannel, EngineError, GoParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    /// Waiting for the reply to a non-search command (`isready`, `d`, `eval`).
    Confirming,
    /// A `go` or `bench` is outstanding.
    Searching,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub best_move: Option<String>,
    pub ponder: Option<String>,
    /// Latest scored `info` line per multi-PV rank.
    pub lines: BTreeMap<u32, InfoLine>,
    /// Raw text of the last `info` line before `bestmove`.
    pub last_info: Option<String>,
}

impl SearchOutcome {
    pub fn principal(&self) -> Option<&InfoLine> {
        self.lines.get(&1)
    }
}

/// UCI conversation with one engine. Every exchange runs to completion
/// before the next may start; an exchange abandoned halfway (its future
/// dropped) leaves the session refusing further commands.
pub struct Session {
    channel: Box<dyn EngineChannel>,
    handshake: Handshake,
    state: SessionState,
    read_timeout: Option<Duration>,
}

impl Session {
    pub fn new(
        channel: Box<dyn EngineChannel>,
        handshake: Handshake,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            channel,
            handshake,
            state: SessionState::Ready,
            read_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn ensure_ready(&self) -> Result<(), EngineError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(EngineError::Unavailable),
            SessionState::Confirming | SessionState::Searching => Err(
                EngineError::ProtocolViolation(format!(
                    "previous exchange still outstanding ({:?})",
                    self.state
                )),
            ),
        }
    }

    fn begin(&mut self, state: SessionState) -> Result<(), EngineError> {
        self.ensure_ready()?;
        self.state = state;
        Ok(())
    }

    fn finish<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        match &result {
            Err(e) if e.is_fatal() || matches!(e, EngineError::Unavailable) => {
                warn!("Closing engine session: {}", e);
                self.state = SessionState::Closed;
            }
            _ => self.state = SessionState::Ready,
        }
        result
    }

    async fn send(&mut self, line: &str) -> Result<(), EngineError> {
        debug!(">> {}", line);
        self.channel.send_line(line).await
    }

    async fn next_line(&mut self) -> Result<String, EngineError> {
        match self.channel.read_line(self.read_timeout).await? {
            Some(line) => {
                debug!("<< {}", line);
                Ok(line)
            }
            None => Err(EngineError::Crashed(
                "engine closed its output stream".to_string(),
            )),
        }
    }

    async fn sync(&mut self) -> Result<(), EngineError> {
        self.send("isready").await?;
        loop {
            let line = self.next_line().await?;
            if let Some(UciMessage::ReadyOk) = parse_uci_line(&line) {
                return Ok(());
            }
        }
    }

    /// Sends `commands` and returns once the engine has acknowledged all of
    /// them with `readyok`.
    pub async fn confirm(&mut self, commands: &[String]) -> Result<(), EngineError> {
        self.begin(SessionState::Confirming)?;
        let result = async {
            for command in commands {
                self.send(command).await?;
            }
            self.sync().await
        }
        .await;
        self.finish(result)
    }

    pub async fn set_options(&mut self, changes: &[(String, OptionValue)]) -> Result<(), EngineError> {
        let commands: Vec<String> = changes
            .iter()
            .map(|(name, value)| format!("setoption name {} value {}", name, value))
            .collect();
        self.confirm(&commands).await
    }

    pub async fn set_position(
        &mut self,
        record: &PositionRecord,
        new_game: bool,
    ) -> Result<(), EngineError> {
        let mut commands = Vec::with_capacity(2);
        if new_game {
            commands.push("ucinewgame".to_string());
        }
        commands.push(record.to_command());
        self.confirm(&commands).await
    }

    pub async fn search(&mut self, params: &GoParams) -> Result<SearchOutcome, EngineError> {
        if !params.is_bounded() {
            return Err(EngineError::ProtocolViolation(
                "a search needs a depth, time, clock or node bound".to_string(),
            ));
        }
        self.begin(SessionState::Searching)?;
        let result = self.collect_search(params).await;
        self.finish(result)
    }

    async fn collect_search(&mut self, params: &GoParams) -> Result<SearchOutcome, EngineError> {
        self.send(&params.to_command()).await?;
        let mut outcome = SearchOutcome::default();
        loop {
            let line = self.next_line().await?;
            match parse_uci_line(&line) {
                Some(UciMessage::Info(info)) => {
                    if info.score.is_some() {
                        outcome.lines.insert(info.rank(), info);
                    }
                    outcome.last_info = Some(line);
                }
                Some(UciMessage::BestMove { best_move, ponder }) => {
                    outcome.best_move = best_move;
                    outcome.ponder = ponder;
                    return Ok(outcome);
                }
                _ => {}
            }
        }
    }

    /// Runs `d` and parses the board diagram and FEN echo.
    pub async fn board(&mut self) -> Result<BoardDump, EngineError> {
        self.begin(SessionState::Confirming)?;
        let result = async {
            self.send("d").await?;
            let mut lines = Vec::new();
            loop {
                let line = self.next_line().await?;
                let done = is_board_dump_end(&line);
                lines.push(line);
                if done {
                    break;
                }
            }
            parse_board_dump(&lines)
        }
        .await;
        self.finish(result)
    }

    /// White-side static evaluation in pawns; `None` when the engine refuses
    /// to evaluate (side to move in check).
    pub async fn static_eval(&mut self) -> Result<Option<f64>, EngineError> {
        self.begin(SessionState::Confirming)?;
        let result = async {
            self.send("eval").await?;
            loop {
                let line = self.next_line().await?;
                if let Some(UciMessage::FinalEvaluation(value)) = parse_uci_line(&line) {
                    return Ok::<_, EngineError>(value);
                }
            }
        }
        .await;
        self.finish(result)
    }

    pub async fn bench(&mut self, params: &BenchmarkParams) -> Result<BenchReport, EngineError> {
        self.begin(SessionState::Searching)?;
        let result = async {
            self.send(&params.to_command()).await?;
            let mut collector = BenchCollector::default();
            loop {
                let line = self.next_line().await?;
                if let Some(report) = collector.feed(&line) {
                    // The summary may overtake the last stdout lines; drain them.
                    self.sync().await?;
                    return Ok::<_, EngineError>(report);
                }
            }
        }
        .await;
        self.finish(result)
    }

    /// Asks a throwaway engine to search `fen`. A crash or the absence of a
    /// best move both count as an invalid position, so mates and stalemates
    /// are reported invalid too.
    pub async fn probe_fen(&mut self, fen: &str, depth: u32) -> Result<bool, EngineError> {
        self.ensure_ready()?;
        let mut probe = self.channel.spawn_probe().await?;
        let verdict = run_probe(probe.as_mut(), fen, depth, self.read_timeout).await;
        if let Err(e) = probe.terminate().await {
            warn!("Failed to shut down probe engine: {}", e);
        }
        match verdict {
            Ok(found) => Ok(found),
            Err(EngineError::Crashed(reason)) => {
                debug!("Probe engine crashed on {:?}: {}", fen, reason);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn quit(&mut self) -> Result<(), EngineError> {
        self.state = SessionState::Closed;
        self.channel.terminate().await
    }
}

async fn run_probe(
    probe: &mut dyn EngineChannel,
    fen: &str,
    depth: u32,
    timeout: Option<Duration>,
) -> Result<bool, EngineError> {
    probe.send_line("setoption name Hash value 1").await?;
    probe.send_line(&format!("position fen {}", fen)).await?;
    probe.send_line(&GoParams::depth(depth).to_command()).await?;
    loop {
        let Some(line) = probe.read_line(timeout).await? else {
            return Err(EngineError::Crashed("probe engine exited".to_string()));
        };
        if let Some(UciMessage::BestMove { best_move, .. }) = parse_uci_line(&line) {
            return Ok(best_move.is_some());
        }
    }
}
