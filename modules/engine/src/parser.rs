use crate::{EngineError, Score, WdlStats};

pub fn parse_uci_line(line: &str) -> Option<UciMessage> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }

    match parts[0] {
        "id" => {
            if parts.len() >= 3 {
                match parts[1] {
                    "name" => Some(UciMessage::IdName(parts[2..].join(" "))),
                    "author" => Some(UciMessage::IdAuthor(parts[2..].join(" "))),
                    _ => None,
                }
            } else {
                None
            }
        }
        "option" => parse_option(&parts).map(UciMessage::Option),
        "uciok" => Some(UciMessage::UciOk),
        "readyok" => Some(UciMessage::ReadyOk),
        "bestmove" => {
            if parts.len() >= 2 {
                let best_move = match parts[1] {
                    "(none)" | "0000" => None,
                    mv => Some(mv.to_string()),
                };
                let ponder = if parts.len() >= 4 && parts[2] == "ponder" {
                    Some(parts[3].to_string())
                } else {
                    None
                };
                Some(UciMessage::BestMove { best_move, ponder })
            } else {
                None
            }
        }
        "info" => {
            if parts.get(1) == Some(&"string") {
                return Some(UciMessage::InfoString(parts[2..].join(" ")));
            }
            Some(UciMessage::Info(parse_info(&parts)))
        }
        "Fen:" => Some(UciMessage::Fen(parts[1..].join(" "))),
        "Final" | "Total" if parts.get(1).map(|p| p.starts_with("evaluation")) == Some(true) => {
            Some(UciMessage::FinalEvaluation(parse_final_evaluation(&parts)))
        }
        _ => Some(UciMessage::Unknown(line.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UciMessage {
    IdName(String),
    IdAuthor(String),
    Option(AdvertisedOption),
    UciOk,
    ReadyOk,
    BestMove { best_move: Option<String>, ponder: Option<String> },
    Info(InfoLine),
    InfoString(String),
    Fen(String),
    /// White-side static evaluation in pawns, `None` when the engine declines (in check).
    FinalEvaluation(Option<f64>),
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoLine {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub wdl: Option<WdlStats>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time_ms: Option<u64>,
    pub pv: Vec<String>,
}

impl InfoLine {
    /// Lines without a `multipv` field belong to the principal line.
    pub fn rank(&self) -> u32 {
        self.multipv.unwrap_or(1)
    }
}

fn parse_info(parts: &[&str]) -> InfoLine {
    let mut info = InfoLine::default();
    let mut i = 1;
    while i < parts.len() {
        let next = parts.get(i + 1);
        match parts[i] {
            "depth" => {
                info.depth = next.and_then(|v| v.parse().ok());
                i += 2;
            }
            "seldepth" => {
                info.seldepth = next.and_then(|v| v.parse().ok());
                i += 2;
            }
            "multipv" => {
                info.multipv = next.and_then(|v| v.parse().ok());
                i += 2;
            }
            "nodes" => {
                info.nodes = next.and_then(|v| v.parse().ok());
                i += 2;
            }
            "nps" => {
                info.nps = next.and_then(|v| v.parse().ok());
                i += 2;
            }
            "time" => {
                info.time_ms = next.and_then(|v| v.parse().ok());
                i += 2;
            }
            "score" => {
                if i + 2 < parts.len() {
                    match parts[i + 1] {
                        "cp" => {
                            info.score = parts[i + 2].parse().ok().map(Score::Centipawn);
                            i += 3;
                        }
                        "mate" => {
                            info.score = parts[i + 2].parse().ok().map(Score::Mate);
                            i += 3;
                        }
                        _ => {
                            i += 1;
                        }
                    }
                } else {
                    i += 1;
                }
            }
            "wdl" => {
                if i + 3 < parts.len() {
                    let values: Vec<u32> = parts[i + 1..i + 4]
                        .iter()
                        .filter_map(|v| v.parse().ok())
                        .collect();
                    if let [win, draw, loss] = values[..] {
                        info.wdl = Some(WdlStats { win, draw, loss });
                    }
                    i += 4;
                } else {
                    i += 1;
                }
            }
            "pv" => {
                info.pv = parts[i + 1..].iter().map(|m| m.to_string()).collect();
                break;
            }
            _ => {
                i += 1;
            }
        }
    }
    info
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisedKind {
    Spin,
    Check,
    Text,
    Combo(Vec<String>),
    Button,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedOption {
    pub name: String,
    pub kind: AdvertisedKind,
    pub default: Option<String>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

const OPTION_KEYWORDS: [&str; 5] = ["type", "default", "min", "max", "var"];

// option name <id...> type <t> [default <x...>] [min <n>] [max <n>] [var <v>]*
fn parse_option(parts: &[&str]) -> Option<AdvertisedOption> {
    if parts.get(1) != Some(&"name") {
        return None;
    }
    let type_idx = parts.iter().position(|p| *p == "type")?;
    if type_idx <= 2 {
        return None;
    }
    let name = parts[2..type_idx].join(" ");

    let mut kind_name = "";
    let mut default = None;
    let mut min = None;
    let mut max = None;
    let mut vars = Vec::new();

    let mut i = type_idx;
    while i < parts.len() {
        let keyword = parts[i];
        let end = parts[i + 1..]
            .iter()
            .position(|p| OPTION_KEYWORDS.contains(p))
            .map(|off| i + 1 + off)
            .unwrap_or(parts.len());
        let value = parts[i + 1..end].join(" ");
        match keyword {
            "type" => kind_name = parts.get(i + 1).copied().unwrap_or(""),
            "default" => {
                default = Some(if value == "<empty>" { String::new() } else { value });
            }
            "min" => min = value.parse().ok(),
            "max" => max = value.parse().ok(),
            "var" => vars.push(value),
            _ => {}
        }
        i = end;
    }

    let kind = match kind_name {
        "spin" => AdvertisedKind::Spin,
        "check" => AdvertisedKind::Check,
        "string" => AdvertisedKind::Text,
        "combo" => AdvertisedKind::Combo(vars),
        "button" => AdvertisedKind::Button,
        _ => return None,
    };

    Some(AdvertisedOption {
        name,
        kind,
        default,
        min,
        max,
    })
}

// "Final evaluation       +0.08 (white side) [with scaled NNUE, ...]"
// "Final evaluation: none (in check)"
// "Total evaluation: +0.13 (white side)" (older builds)
fn parse_final_evaluation(parts: &[&str]) -> Option<f64> {
    let value = if parts[1] == "evaluation" || parts[1] == "evaluation:" {
        parts.get(2)?
    } else {
        return None;
    };
    value.parse::<f64>().ok()
}

/// The block printed in reply to `d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDump {
    pub diagram: Vec<String>,
    pub fen: String,
    pub checkers: Vec<String>,
}

pub fn is_board_dump_end(line: &str) -> bool {
    line.starts_with("Checkers:")
}

pub fn parse_board_dump(lines: &[String]) -> Result<BoardDump, EngineError> {
    let diagram: Vec<String> = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("+---") || t.starts_with('|') || t.starts_with("a   b")
        })
        .cloned()
        .collect();

    let fen = lines
        .iter()
        .find_map(|l| match parse_uci_line(l) {
            Some(UciMessage::Fen(fen)) => Some(fen),
            _ => None,
        })
        .ok_or_else(|| EngineError::ParseError("board dump without a Fen line".to_string()))?;

    let checkers = lines
        .iter()
        .find(|l| is_board_dump_end(l))
        .map(|l| {
            l["Checkers:".len()..]
                .split_whitespace()
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    if diagram.len() != 18 {
        return Err(EngineError::ParseError(format!(
            "expected an 18 line board diagram, got {} lines",
            diagram.len()
        )));
    }

    Ok(BoardDump {
        diagram,
        fen,
        checkers,
    })
}

/// Accumulates the summary `bench` prints once it has finished.
#[derive(Debug, Default)]
pub struct BenchCollector {
    report: crate::BenchReport,
}

impl BenchCollector {
    /// Feeds one line, returning the finished report on the terminal `Nodes/second` line.
    pub fn feed(&mut self, line: &str) -> Option<crate::BenchReport> {
        let (key, value) = line.split_once(':')?;
        let value = value.trim().parse::<u64>().ok();
        match key.trim() {
            "Total time (ms)" => self.report.total_time_ms = value,
            "Nodes searched" => self.report.nodes_searched = value,
            "Nodes/second" => {
                self.report.nodes_per_second = value.unwrap_or(0);
                return Some(std::mem::take(&mut self.report));
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uciok() {
        let msg = parse_uci_line("uciok").unwrap();
        assert!(matches!(msg, UciMessage::UciOk));
    }

    #[test]
    fn test_parse_readyok() {
        let msg = parse_uci_line("readyok").unwrap();
        assert!(matches!(msg, UciMessage::ReadyOk));
    }

    #[test]
    fn test_parse_bestmove() {
        let msg = parse_uci_line("bestmove e2e4 ponder e7e5").unwrap();
        if let UciMessage::BestMove { best_move, ponder } = msg {
            assert_eq!(best_move.as_deref(), Some("e2e4"));
            assert_eq!(ponder, Some("e7e5".to_string()));
        } else {
            panic!("Expected BestMove");
        }
    }

    #[test]
    fn test_parse_bestmove_none() {
        let msg = parse_uci_line("bestmove (none)").unwrap();
        assert_eq!(
            msg,
            UciMessage::BestMove {
                best_move: None,
                ponder: None
            }
        );
    }

    #[test]
    fn test_parse_info() {
        let msg = parse_uci_line(
            "info depth 12 seldepth 17 multipv 2 score cp 35 nodes 4000 nps 80000 time 50 pv e2e4 e7e5 g1f3",
        )
        .unwrap();
        if let UciMessage::Info(info) = msg {
            assert_eq!(info.depth, Some(12));
            assert_eq!(info.seldepth, Some(17));
            assert_eq!(info.rank(), 2);
            assert_eq!(info.score, Some(Score::Centipawn(35)));
            assert_eq!(info.nodes, Some(4000));
            assert_eq!(info.nps, Some(80000));
            assert_eq!(info.time_ms, Some(50));
            assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
        } else {
            panic!("Expected Info");
        }
    }

    #[test]
    fn test_parse_info_mate() {
        let msg = parse_uci_line("info depth 2 seldepth 3 multipv 1 score mate -1 nodes 11 nps 5500 tbhits 0 time 2 pv h2g1 h4g3").unwrap();
        if let UciMessage::Info(info) = msg {
            assert_eq!(info.depth, Some(2));
            assert_eq!(info.score, Some(Score::Mate(-1)));
            assert_eq!(info.pv, vec!["h2g1", "h4g3"]);
        } else {
            panic!("Expected Info");
        }
    }

    #[test]
    fn test_parse_info_bound_and_wdl() {
        let msg =
            parse_uci_line("info depth 20 score cp 18 upperbound wdl 60 900 40 nodes 10 pv d2d4")
                .unwrap();
        let UciMessage::Info(info) = msg else {
            panic!("Expected Info");
        };
        assert_eq!(info.score, Some(Score::Centipawn(18)));
        assert_eq!(
            info.wdl,
            Some(WdlStats {
                win: 60,
                draw: 900,
                loss: 40
            })
        );
        assert_eq!(info.nodes, Some(10));
        assert_eq!(info.rank(), 1);
    }

    #[test]
    fn test_parse_info_string() {
        let msg = parse_uci_line("info string NNUE evaluation using nn-5af11540bbfe.nnue").unwrap();
        assert!(matches!(msg, UciMessage::InfoString(_)));
    }

    #[test]
    fn test_parse_id() {
        let msg = parse_uci_line("id name Stockfish 16").unwrap();
        if let UciMessage::IdName(name) = msg {
            assert_eq!(name, "Stockfish 16");
        } else {
            panic!("Expected IdName");
        }
    }

    #[test]
    fn test_parse_spin_option() {
        let msg =
            parse_uci_line("option name Skill Level type spin default 20 min 0 max 20").unwrap();
        let UciMessage::Option(opt) = msg else {
            panic!("Expected Option");
        };
        assert_eq!(opt.name, "Skill Level");
        assert_eq!(opt.kind, AdvertisedKind::Spin);
        assert_eq!(opt.default.as_deref(), Some("20"));
        assert_eq!((opt.min, opt.max), (Some(0), Some(20)));
    }

    #[test]
    fn test_parse_string_and_combo_options() {
        let UciMessage::Option(opt) =
            parse_uci_line("option name Debug Log File type string default <empty>").unwrap()
        else {
            panic!("Expected Option");
        };
        assert_eq!(opt.kind, AdvertisedKind::Text);
        assert_eq!(opt.default.as_deref(), Some(""));

        let UciMessage::Option(opt) = parse_uci_line(
            "option name Analysis Contempt type combo default Both var Off var White var Black var Both",
        )
        .unwrap() else {
            panic!("Expected Option");
        };
        assert_eq!(
            opt.kind,
            AdvertisedKind::Combo(vec![
                "Off".to_string(),
                "White".to_string(),
                "Black".to_string(),
                "Both".to_string()
            ])
        );
    }

    #[test]
    fn test_parse_final_evaluation() {
        let msg = parse_uci_line(
            "Final evaluation       +0.08 (white side) [with scaled NNUE, hybrid, ...]",
        )
        .unwrap();
        assert_eq!(msg, UciMessage::FinalEvaluation(Some(0.08)));

        let msg = parse_uci_line("Final evaluation: none (in check)").unwrap();
        assert_eq!(msg, UciMessage::FinalEvaluation(None));
    }

    #[test]
    fn test_parse_board_dump() {
        let mut lines: Vec<String> = vec![String::new()];
        lines.extend(
            crate::position::render_board(
                &crate::Board::from_fen(crate::START_FEN).unwrap(),
                true,
            )
            .lines()
            .map(|l| l.to_string()),
        );
        lines.push(String::new());
        lines.push(format!("Fen: {}", crate::START_FEN));
        lines.push("Key: 8F8F01D4562F59FB".to_string());
        lines.push("Checkers: ".to_string());

        let dump = parse_board_dump(&lines).unwrap();
        assert_eq!(dump.fen, crate::START_FEN);
        assert_eq!(dump.diagram.len(), 18);
        assert!(dump.checkers.is_empty());
        assert!(dump.diagram[1].contains("| r | n | b | q | k | b | n | r | 8"));
    }

    #[test]
    fn test_board_dump_requires_fen() {
        let lines = vec!["Checkers: ".to_string()];
        assert!(matches!(
            parse_board_dump(&lines),
            Err(EngineError::ParseError(_))
        ));
    }

    #[test]
    fn test_bench_collector() {
        let mut collector = BenchCollector::default();
        assert!(collector.feed("Position: 1/47 (rnbqkbnr/...)").is_none());
        assert!(collector.feed("Total time (ms) : 1500").is_none());
        assert!(collector.feed("Nodes searched  : 2000000").is_none());
        let report = collector.feed("Nodes/second    : 1333333").unwrap();
        assert_eq!(report.total_time_ms, Some(1500));
        assert_eq!(report.nodes_searched, Some(2_000_000));
        assert_eq!(report.nodes_per_second, 1_333_333);
    }
}
