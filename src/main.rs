use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use distnet::{
    best_config, load_results, run_search, ChartOptions, Mlp, RecordSet, SearchOptions,
    VideoOptions,
};

/// Hyperparameter search and training pipeline for curve distance-field
/// networks, plus frame/loss utilities.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Randomly sample network configurations, train each briefly, and append
    /// the results to the persisted list
    Search {
        /// Flat binary record file (little-endian f32, 9 values per record)
        #[arg(long, default_value = "training_data")]
        data: PathBuf,
        /// Persisted results list
        #[arg(long, default_value = "output.json")]
        results: PathBuf,
        #[arg(long, default_value_t = 100)]
        trials: usize,
        /// Training iterations per trial
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
        /// RNG seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Retrain the best configuration from the results list for many more
    /// iterations and save the checkpoint
    Tune {
        #[arg(long, default_value = "training_data")]
        data: PathBuf,
        #[arg(long, default_value = "output.json")]
        results: PathBuf,
        #[arg(long, default_value = "net.json")]
        checkpoint: PathBuf,
        #[arg(long, default_value_t = 1_000_000)]
        iterations: usize,
        /// Batch size override for the long run
        #[arg(long, default_value_t = 16384)]
        batch_size: usize,
        /// Also write the per-step loss trace here
        #[arg(long)]
        losses: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Export each layer's weight matrix and bias vector to .npy files
    ExportWeights {
        #[arg(long, default_value = "net.json")]
        checkpoint: PathBuf,
        #[arg(long, default_value = "weights")]
        out_dir: PathBuf,
    },
    /// Compile numbered PNG frames into an H.264 video via ffmpeg
    CompileVideo {
        #[arg(long, default_value = "frames")]
        frames: PathBuf,
        #[arg(long, default_value = "output_video.mp4")]
        output: PathBuf,
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
    /// Render a loss-curve chart from a newline-delimited loss trace
    PlotLosses {
        #[arg(long, default_value = "losses.txt")]
        input: PathBuf,
        #[arg(long, default_value = "losses.png")]
        output: PathBuf,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
    },
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Search {
            data,
            results,
            trials,
            iterations,
            seed,
        } => {
            let records = RecordSet::load(&data)?;
            info!(records = records.len(), "loaded {}", data.display());

            let mut rng = rng_from_seed(seed);
            let opts = SearchOptions { trials, iterations };
            let all = run_search(&records, opts, &results, &mut rng)?;
            info!(
                evaluated = trials,
                total = all.len(),
                "results saved to {}",
                results.display()
            );
        }
        Command::Tune {
            data,
            results,
            checkpoint,
            iterations,
            batch_size,
            losses,
            seed,
        } => {
            let records = RecordSet::load(&data)?;
            let saved = load_results(&results)?;
            let best = best_config(&saved).ok_or_else(|| {
                distnet::Error::InvalidData(format!(
                    "no evaluated configurations in {}",
                    results.display()
                ))
            })?;

            let mut config = best.clone();
            config.batch_size = batch_size;
            info!(
                layers = ?config.layer_params,
                lr = config.learning_rate,
                batch_size = config.batch_size,
                search_loss = ?best.loss,
                "tuning best configuration"
            );

            let mut rng = rng_from_seed(seed);
            let outcome = distnet::train::train(&records, &config, iterations, &mut rng)?;

            info!(loss = outcome.trailing_loss, "saving network");
            outcome.model.save_checkpoint(&checkpoint)?;
            info!("network saved to {}", checkpoint.display());

            if let Some(path) = losses {
                distnet::write_loss_trace(&path, &outcome.losses)?;
                info!("loss trace written to {}", path.display());
            }
        }
        Command::ExportWeights {
            checkpoint,
            out_dir,
        } => {
            let model = Mlp::load_checkpoint(&checkpoint)?;
            let layers = distnet::export_weights(&model, &out_dir)?;
            info!(layers, "weights exported to {}", out_dir.display());
        }
        Command::CompileVideo {
            frames,
            output,
            fps,
        } => {
            distnet::compile_video(&frames, &output, VideoOptions { fps })?;
        }
        Command::PlotLosses {
            input,
            output,
            width,
            height,
        } => {
            let losses = distnet::read_losses(&input)?;
            distnet::render_chart(&losses, &output, ChartOptions { width, height })?;
            info!(steps = losses.len(), "chart saved to {}", output.display());
        }
    }

    Ok(())
}
