use engine::{EngineConfig, EngineError, Score, Stockfish, TopMove};
use log::{error, info};
use serde::Serialize;
use std::env;
use std::process::ExitCode;

#[derive(Serialize)]
struct Analysis {
    engine: Option<String>,
    fen: String,
    best_move: Option<String>,
    evaluation: Score,
    top_moves: Vec<TopMove>,
}

async fn analyse(config: EngineConfig, fen: Option<String>) -> Result<Analysis, EngineError> {
    let mut stockfish = Stockfish::new(config).await?;
    if let Some(fen) = fen {
        stockfish.set_fen_position(&fen, true).await?;
    }

    let analysis = Analysis {
        engine: stockfish.engine_name().map(str::to_string),
        fen: stockfish.fen_position().await?,
        best_move: stockfish.best_move().await?,
        evaluation: stockfish.evaluation().await?,
        top_moves: stockfish.top_moves(3).await?,
    };
    stockfish.quit().await?;
    Ok(analysis)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = EngineConfig::from_env();
    let fen = env::args().nth(1);
    info!("Analysing with {} at depth {}", config.path, config.depth);

    match analyse(config, fen).await {
        Ok(analysis) => match serde_json::to_string_pretty(&analysis) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to serialize analysis: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("Analysis failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
