use std::path::{Path, PathBuf};

use clap::Parser;
use flexi_logger::{AdaptiveFormat, Logger, WriteMode};
use lib_ninarow::prelude::*;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Samples search trees over the positions of a participant file and reports
/// the average planning depth and branching factor.
#[derive(Clone, Debug, Parser)]
pub struct StatsOptions {
    /// The file containing the positions to analyze.
    #[arg(short = 'f', long)]
    pub participant_file: PathBuf,

    /// Optional BADS parameter file; the default heuristic otherwise.
    #[arg(short, long)]
    pub params: Option<PathBuf>,

    /// Search trees sampled per position.
    #[arg(short, long, default_value_t = 10)]
    pub num_samples: usize,

    #[arg(short, long)]
    pub log_level: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let options = StatsOptions::parse();
    let _logger = Logger::try_with_env_or_str(options.log_level.clone().unwrap_or("info".into()).as_str())?
        .write_mode(WriteMode::BufferAndFlush)
        .log_to_stderr()
        .adaptive_format_for_stderr(match cfg!(debug_assertions) {
            true => AdaptiveFormat::WithThread,
            _ => AdaptiveFormat::Default,
        })
        .start()?;

    let mut heuristic: FourByNineHeuristic = match &options.params {
        Some(path) => {
            let params = parse_bads_parameter_file_to_model_parameters(path)?;
            Heuristic::from_parameters(&params)?
        }
        None => FourByNineHeuristic::create_default(),
    };
    heuristic.set_noise_enabled(true);

    let moves = parse_participant_file(Path::new(&options.participant_file))?;
    if moves.is_empty() {
        return Err(anyhow!("no positions ingested from {}", options.participant_file.display()));
    }

    let mut seeder = StdRng::from_entropy();
    let samples = options.num_samples.max(1);
    let mut total_depth = 0usize;
    let mut total_branching = 0.0f64;
    for observation in &moves {
        for _ in 0..samples {
            heuristic.seed_generator(seeder.next_u64());
            let mut search = BestFirstSearch::new(
                &heuristic,
                observation.board.active_player(),
                observation.board,
            );
            search.complete_search(&mut heuristic)?;
            total_depth += search.depth_of_pv();
            total_branching += search.average_branching_factor();
        }
    }

    let denominator = (moves.len() * samples) as f64;
    println!(
        "Average planning depth: {}, Average branching factor: {}",
        total_depth as f64 / denominator,
        total_branching / denominator
    );
    Ok(())
}
