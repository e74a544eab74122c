use std::path::{Path, PathBuf};

use clap::Parser;
use flexi_logger::{AdaptiveFormat, Logger, WriteMode};
use itertools::Itertools;
use lib_ninarow::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Fits the noisy heuristic model to observed human play, with optional
/// cross-validation over randomized splits.
#[derive(Clone, Debug, Parser)]
pub struct FitOptions {
    /// Participant file to ingest, optionally followed by a split count.
    #[arg(short = 'f', long, num_args = 1..=2, value_names = ["input_file", "split_count"])]
    pub participant_file: Option<Vec<String>>,

    /// Directory of pre-split groups named 1.csv .. n.csv, and the split count.
    #[arg(short, long, num_args = 2, value_names = ["input_dir", "split_count"])]
    pub input_dir: Option<Vec<String>>,

    /// Directory to write results to.
    #[arg(short, long, default_value = "./")]
    pub output_dir: PathBuf,

    /// Terminate after generating and writing splits.
    #[arg(short, long, default_value_t = false)]
    pub splits_only: bool,

    /// Print extra debugging info.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Process a single split (1-based) against the rest; requires -i.
    #[arg(short, long)]
    pub cluster_mode: Option<usize>,

    /// Evaluate only this many randomly chosen observations per optimizer call.
    #[arg(short = 'r', long)]
    pub subsample: Option<usize>,

    /// Worker count for the estimation pool.
    #[arg(short = 't', long, default_value_t = 16)]
    pub threads: usize,

    #[arg(short, long)]
    pub log_level: Option<String>,
}

impl FitOptions {
    /// Produces the configured fitter.
    pub fn fitter(&self) -> ModelFitter {
        ModelFitter {
            estimator: IbsEstimator { workers: self.threads.max(1), ..Default::default() },
            subsample: self.subsample,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let options = FitOptions::parse();
    let default_level = if options.verbose { "debug" } else { "info" };
    let _logger = Logger::try_with_env_or_str(
        options.log_level.clone().unwrap_or(default_level.into()).as_str(),
    )?
    .write_mode(WriteMode::BufferAndFlush)
    .log_to_stderr()
    .adaptive_format_for_stderr(match cfg!(debug_assertions) {
        true => AdaptiveFormat::WithThread,
        _ => AdaptiveFormat::Default,
    })
    .start()?;

    run(&options)
}

fn run(options: &FitOptions) -> Result<()> {
    if options.participant_file.is_some() && options.input_dir.is_some() {
        return Err(anyhow!("inconsistent request: -f and -i cannot both be specified"));
    }

    let mut wrote_splits = false;
    let groups = if let Some(args) = &options.participant_file {
        if options.cluster_mode.is_some() {
            return Err(anyhow!("inconsistent request: -c cannot be used with -f; pre-split with -s"));
        }
        let split_count = match args.len() {
            1 => 1,
            2 => args[1].parse::<usize>().context("bad split count")?,
            _ => return Err(anyhow!("inconsistent request: -f takes at most 2 arguments")),
        };
        let moves = parse_participant_file(Path::new(&args[0]))?;
        if moves.is_empty() {
            return Err(anyhow!("no observations ingested from {}", args[0]));
        }
        log::info!("ingested {} observations from {}", moves.len(), args[0]);
        let mut rng = StdRng::from_entropy();
        let groups = generate_splits(moves, split_count, &mut rng);
        write_splits(&options.output_dir, &groups)?;
        wrote_splits = true;
        groups
    } else if let Some(args) = &options.input_dir {
        let input_path = Path::new(&args[0]);
        let split_count = args[1].parse::<usize>().context("bad split count")?;
        let mut groups = Vec::with_capacity(split_count);
        for i in 1..=split_count {
            let split_path = input_path.join(format!("{i}.csv"));
            log::info!("ingesting split {}", split_path.display());
            groups.push(parse_participant_file(&split_path)?);
        }
        groups
    } else {
        return Err(anyhow!("inconsistent request: either -f or -i must be specified"));
    };

    if options.splits_only {
        if !wrote_splits {
            log::warn!("-s without -f: nothing new to write");
        }
        return Ok(());
    }

    let fitter = options.fitter();
    let (start, end) = match options.cluster_mode {
        Some(split) => {
            if split == 0 || split > groups.len() {
                return Err(anyhow!("inconsistent request: no split {split} to process"));
            }
            (split - 1, split)
        }
        None => (0, groups.len()),
    };

    std::fs::create_dir_all(&options.output_dir)?;
    for i in start..end {
        let fold = fitter.cross_validate(&groups, i)?;
        write_fold(&options.output_dir, i + 1, &fold)?;
    }
    Ok(())
}

/// Mirrors the ingested observations into `<output>/splits/{i}.csv`.
fn write_splits(output_dir: &Path, groups: &[Vec<Observation>]) -> Result<()> {
    let splits_dir = output_dir.join("splits");
    std::fs::create_dir_all(&splits_dir)?;
    for (i, group) in groups.iter().enumerate() {
        let path = splits_dir.join(format!("{}.csv", i + 1));
        log::info!("writing split {}", path.display());
        let content = group.iter().map(|o| o.to_string()).join("\n");
        std::fs::write(&path, content + "\n")?;
    }
    Ok(())
}

/// Persists one fold: the fitted 10-vector, the training loss samples, and
/// the per-observation held-out losses.
fn write_fold(output_dir: &Path, number: usize, fold: &CrossValidation) -> Result<()> {
    let params = fold.parameters.iter().map(|x| x.to_string()).join(",");
    std::fs::write(output_dir.join(format!("params{number}.csv")), params)?;

    let train = fold.loglik_train.iter().map(|x| x.to_string()).join(",");
    std::fs::write(output_dir.join(format!("lltrain{number}.csv")), train)?;

    let test = fold.loglik_test.iter().map(|x| x.to_string()).join(" ");
    std::fs::write(output_dir.join(format!("lltest{number}.csv")), test + "\n")?;
    Ok(())
}
