//! Scripted in-memory engine that speaks enough UCI for the session tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::position::{Board, START_FEN, render_board};
use crate::process::{Handshake, handshake};
use crate::{EngineChannel, EngineConfig, EngineError};

pub(crate) const START_MOVES: [&str; 20] = [
    "e2e4", "d2d4", "g1f3", "c2c4", "b1c3", "e2e3", "d2d3", "g2g3", "b2b3", "c2c3", "a2a3",
    "h2h3", "f2f4", "b2b4", "a2a4", "h2h4", "g2g4", "f2f3", "g1h3", "b1a3",
];

#[derive(Clone)]
pub(crate) struct FakeScript {
    pub name: String,
    pub options: Vec<String>,
    /// Full `position ...` command to the FEN it produces.
    pub positions: HashMap<String, String>,
    /// Legal moves per FEN, best first.
    pub legal: HashMap<String, Vec<String>>,
    pub mates: HashMap<String, i32>,
    pub static_eval: String,
    pub crash_on_go: bool,
    pub crash_fens: HashSet<String>,
}

impl Default for FakeScript {
    fn default() -> Self {
        let options = [
            "option name Debug Log File type string default <empty>",
            "option name Threads type spin default 1 min 1 max 1024",
            "option name Hash type spin default 16 min 1 max 33554432",
            "option name Clear Hash type button",
            "option name Ponder type check default false",
            "option name MultiPV type spin default 1 min 1 max 500",
            "option name Skill Level type spin default 20 min 0 max 20",
            "option name Move Overhead type spin default 10 min 0 max 5000",
            "option name Slow Mover type spin default 100 min 10 max 1000",
            "option name UCI_Chess960 type check default false",
            "option name UCI_LimitStrength type check default false",
            "option name UCI_Elo type spin default 1320 min 1320 max 3190",
            "option name UCI_ShowWDL type check default false",
        ];
        let mut legal = HashMap::new();
        legal.insert(
            START_FEN.to_string(),
            START_MOVES.iter().map(|m| m.to_string()).collect(),
        );
        Self {
            name: "Stockfish 16".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            positions: HashMap::new(),
            legal,
            mates: HashMap::new(),
            static_eval: "+0.08".to_string(),
            crash_on_go: false,
            crash_fens: HashSet::new(),
        }
    }
}

impl FakeScript {
    pub fn position(mut self, command: &str, fen: &str) -> Self {
        self.positions.insert(command.to_string(), fen.to_string());
        self
    }

    pub fn legal(mut self, fen: &str, moves: &[&str]) -> Self {
        self.legal
            .insert(fen.to_string(), moves.iter().map(|m| m.to_string()).collect());
        self
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeHandles {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub probes: Arc<AtomicUsize>,
}

impl FakeHandles {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeEngine {
    script: FakeScript,
    handles: FakeHandles,
    outbox: VecDeque<String>,
    alive: bool,
    fen: String,
    multipv: usize,
    show_wdl: bool,
}

impl FakeEngine {
    pub fn new(script: FakeScript, handles: FakeHandles) -> Self {
        Self {
            script,
            handles,
            outbox: VecDeque::new(),
            alive: true,
            fen: START_FEN.to_string(),
            multipv: 1,
            show_wdl: false,
        }
    }

    pub async fn start(
        script: FakeScript,
    ) -> (Box<dyn EngineChannel>, Handshake, FakeHandles) {
        let handles = FakeHandles::default();
        let mut engine = FakeEngine::new(script, handles.clone());
        let handshake = handshake(&mut engine, &EngineConfig::default())
            .await
            .expect("fake handshake");
        (Box::new(engine), handshake, handles)
    }

    fn say(&mut self, line: impl Into<String>) {
        self.outbox.push_back(line.into());
    }

    fn respond(&mut self, line: &str) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.first().copied() {
            Some("uci") => {
                self.say(format!("id name {}", self.script.name));
                self.say("id author the fake authors");
                for option in self.script.options.clone() {
                    self.say(option);
                }
                self.say("uciok");
            }
            Some("isready") => self.say("readyok"),
            Some("setoption") => {
                if let Some(value_idx) = parts.iter().position(|p| *p == "value") {
                    let name = parts[2..value_idx].join(" ");
                    let value = parts[value_idx + 1..].join(" ");
                    match name.as_str() {
                        "MultiPV" => self.multipv = value.parse().unwrap_or(1),
                        "UCI_ShowWDL" => self.show_wdl = value == "true",
                        _ => {}
                    }
                }
            }
            Some("position") => {
                self.fen = if let Some(fen) = self.script.positions.get(line) {
                    fen.clone()
                } else if line == "position startpos" {
                    START_FEN.to_string()
                } else if parts.get(1) == Some(&"fen") && !parts.contains(&"moves") {
                    parts[2..].join(" ")
                } else {
                    START_FEN.to_string()
                };
            }
            Some("go") => self.search(&parts),
            Some("d") => {
                self.say("");
                if let Ok(board) = Board::from_fen(&self.fen) {
                    for row in render_board(&board, true).lines() {
                        self.say(row);
                    }
                }
                self.say("");
                self.say(format!("Fen: {}", self.fen));
                self.say("Key: 8F8F01D4562F59FB");
                self.say("Checkers: ");
            }
            Some("eval") => {
                if self.script.static_eval == "none" {
                    self.say("Final evaluation: none (in check)");
                } else {
                    self.say(format!(
                        "Final evaluation       {} (white side) [with scaled NNUE]",
                        self.script.static_eval
                    ));
                }
            }
            Some("bench") => {
                self.say("Position: 1/1 (fake)");
                self.say("===========================");
                self.say("Total time (ms) : 1000");
                self.say("Nodes searched  : 1500000");
                self.say("Nodes/second    : 1500000");
            }
            Some("quit") => self.alive = false,
            _ => {}
        }
    }

    fn search(&mut self, parts: &[&str]) {
        if self.script.crash_on_go || self.script.crash_fens.contains(&self.fen) {
            self.say("info depth 1 seldepth 1 multipv 1 score cp 0 nodes 1 pv");
            self.alive = false;
            return;
        }

        let depth: u32 = parts
            .iter()
            .position(|p| *p == "depth")
            .and_then(|i| parts.get(i + 1))
            .and_then(|d| d.parse().ok())
            .unwrap_or(1);
        let legal = self.script.legal.get(&self.fen).cloned().unwrap_or_default();
        let candidates: Vec<String> = match parts.iter().position(|p| *p == "searchmoves") {
            Some(i) => legal
                .into_iter()
                .filter(|m| parts[i + 1..].contains(&m.as_str()))
                .collect(),
            None => legal,
        };

        if candidates.is_empty() {
            self.say("info depth 0 score mate 0");
            self.say("bestmove (none)");
            return;
        }

        let lines = self.multipv.min(candidates.len());
        for d in 1..=depth {
            for k in 1..=lines {
                let score = match self.script.mates.get(&self.fen) {
                    Some(n) if k == 1 => format!("mate {}", n),
                    _ => format!("cp {}", 20 - 15 * (k as i32 - 1) + d as i32 % 2),
                };
                let wdl = if self.show_wdl { " wdl 80 870 50" } else { "" };
                self.say(format!(
                    "info depth {} seldepth {} multipv {} score {}{} nodes {} nps 500000 tbhits 0 time {} pv {}",
                    d,
                    d + 2,
                    k,
                    score,
                    wdl,
                    d * 1000,
                    d * 2,
                    candidates[k - 1]
                ));
            }
        }
        let best = candidates[0].clone();
        self.say(format!("bestmove {}", best));
    }
}

#[async_trait]
impl EngineChannel for FakeEngine {
    async fn send_line(&mut self, line: &str) -> Result<(), EngineError> {
        if !self.alive {
            return Err(EngineError::Crashed("fake engine exited".to_string()));
        }
        self.handles.sent.lock().unwrap().push(line.to_string());
        self.respond(line);
        Ok(())
    }

    async fn read_line(&mut self, _timeout: Option<Duration>) -> Result<Option<String>, EngineError> {
        // Real pipes are not always ready; give pollers a chance to see Pending.
        tokio::task::yield_now().await;
        match self.outbox.pop_front() {
            Some(line) => Ok(Some(line)),
            None if !self.alive => Ok(None),
            None => panic!("fake engine has nothing more to say"),
        }
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        self.alive = false;
        self.outbox.clear();
        Ok(())
    }

    async fn spawn_probe(&mut self) -> Result<Box<dyn EngineChannel>, EngineError> {
        self.handles.probes.fetch_add(1, Ordering::SeqCst);
        let mut probe = FakeEngine::new(self.script.clone(), FakeHandles::default());
        handshake(&mut probe, &EngineConfig::default()).await?;
        Ok(Box::new(probe))
    }
}
