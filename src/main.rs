//! HySOM CLI - Self-Organizing Maps for loops
//!
//! Command-line interface for training maps on loop datasets and using them.

use clap::{Parser, Subcommand};
use hysom::{
    Decay, Distance, LoopDataset, Result, Som, SomConfig, SomTrainer, TrainConfig,
    TrainingProgress,
};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::error;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "hysom")]
#[command(author = "HySOM Contributors")]
#[command(version)]
#[command(about = "Self-Organizing Maps for hysteresis loops", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new map from a JSON loop dataset
    Train {
        /// Input dataset ({"arrays": [...], "classes": [...]})
        #[arg(short, long)]
        input: PathBuf,

        /// Output map file
        #[arg(short, long)]
        output: PathBuf,

        /// Training options as JSON (flags below override it)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Grid width
        #[arg(long, default_value = "8")]
        width: usize,

        /// Grid height
        #[arg(long, default_value = "8")]
        height: usize,

        /// Number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Distance metric (euclidean, dtw)
        #[arg(short, long)]
        distance: Option<Distance>,

        /// Decay schedule for both learning rate and radius (power, linear)
        #[arg(long)]
        decay: Option<Decay>,

        /// Initial neighborhood radius (default: sqrt(width * height))
        #[arg(long)]
        initial_sigma: Option<f64>,

        /// Initial learning rate
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Feed samples in dataset order instead of shuffling
        #[arg(long)]
        sequential: bool,

        /// Track quantization and topographic errors during training
        #[arg(long)]
        track_errors: bool,

        /// Write the QE/TE history as JSON
        #[arg(long)]
        history: Option<PathBuf>,

        /// Random seed for reproducibility
        #[arg(short, long)]
        seed: Option<u64>,

        /// Threads for distance evaluation (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,
    },

    /// Compute mean quantization and topographic errors of a dataset
    Evaluate {
        /// Map file to use
        #[arg(short, long)]
        map: PathBuf,

        /// Dataset to evaluate
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Project every loop of a dataset onto its best-matching unit
    Project {
        /// Map file to use
        #[arg(short, long)]
        map: PathBuf,

        /// Dataset to project
        #[arg(short, long)]
        input: PathBuf,

        /// Write the projection as JSON instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show map statistics
    Info {
        /// Map file to inspect
        map: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let result = match cli.command {
        Commands::Train {
            input,
            output,
            config,
            width,
            height,
            epochs,
            distance,
            decay,
            initial_sigma,
            learning_rate,
            sequential,
            track_errors,
            history,
            seed,
            threads,
        } => {
            let overrides = TrainOverrides {
                epochs,
                distance,
                decay,
                initial_sigma,
                learning_rate,
                sequential,
                track_errors,
                verbose: cli.verbose,
            };
            train_map(
                input,
                output,
                config,
                overrides,
                (width, height),
                history,
                seed,
                threads,
            )
        }

        Commands::Evaluate { map, input } => evaluate_map(map, input),

        Commands::Project { map, input, output } => project_dataset(map, input, output),

        Commands::Info { map } => show_info(map),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Flag values that replace fields of the JSON training config.
struct TrainOverrides {
    epochs: Option<usize>,
    distance: Option<Distance>,
    decay: Option<Decay>,
    initial_sigma: Option<f64>,
    learning_rate: Option<f64>,
    sequential: bool,
    track_errors: bool,
    verbose: bool,
}

impl TrainOverrides {
    fn apply(self, config: &mut TrainConfig) {
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(distance) = self.distance {
            config.distance = distance;
        }
        if let Some(decay) = self.decay {
            config.decay_sigma = decay.clone();
            config.decay_learning_rate = decay;
        }
        if self.initial_sigma.is_some() {
            config.initial_sigma = self.initial_sigma;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.initial_learning_rate = learning_rate;
        }
        if self.sequential {
            config.random_order = false;
        }
        if self.track_errors {
            config.track_errors = true;
        }
        if self.verbose && config.verbose == 0 {
            config.verbose = 1;
        }
    }
}

#[derive(Serialize)]
struct History<'a> {
    quantization_error: &'a [(usize, f64)],
    topographic_error: &'a [(usize, f64)],
}

#[derive(Serialize)]
struct Projection {
    bmus: Vec<(usize, usize)>,
    classes: Option<Vec<String>>,
    frequencies: Vec<Vec<usize>>,
}

#[allow(clippy::too_many_arguments)]
fn train_map(
    input: PathBuf,
    output: PathBuf,
    config_path: Option<PathBuf>,
    overrides: TrainOverrides,
    (width, height): (usize, usize),
    history: Option<PathBuf>,
    seed: Option<u64>,
    threads: usize,
) -> Result<()> {
    let start_time = Instant::now();

    println!("HySOM");
    println!("   Training map from: {}", input.display());
    println!();

    let dataset = LoopDataset::from_json_file(&input)?;
    let (seq_len, point_dim) = dataset.input_dim();
    println!(
        "✓ Loaded {} loops ({} points x {} coordinates)",
        dataset.len(),
        seq_len,
        point_dim
    );

    let mut train_config = match config_path {
        Some(path) => TrainConfig::from_json_file(path)?,
        None => TrainConfig::default(),
    };
    overrides.apply(&mut train_config);
    train_config.validate()?;

    let som_config = SomConfig {
        width,
        height,
        input_dim: dataset.input_dim(),
        seed,
        num_threads: threads,
    };
    let mut som = Som::new(&som_config)?;
    println!(
        "✓ Initialized SOM ({}x{} = {} units, distance={})",
        height,
        width,
        som_config.total_units(),
        train_config.distance
    );

    println!();
    println!("Training SOM...");

    let epochs = train_config.epochs;
    let pb = ProgressBar::new((dataset.len() * epochs) as u64);
    let bar_style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ");
    pb.set_style(bar_style);

    let trainer = SomTrainer::new(train_config);
    let mut current_epoch = usize::MAX;
    let summary = trainer.train_with_progress(&mut som, dataset.samples(), |p: &TrainingProgress| {
        if p.epoch != current_epoch {
            current_epoch = p.epoch;
            pb.set_message(format!(
                "Epoch {}/{} (lr={:.4}, sigma={:.3})",
                p.epoch + 1,
                p.epochs,
                p.learning_rate,
                p.sigma
            ));
        }
        pb.set_position(p.iteration as u64 + 1);
    });
    pb.finish_and_clear();
    let summary = summary?;

    som.save(&output)?;
    println!("✓ Saved map to {}", output.display());

    if let Some(path) = history {
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(
            writer,
            &History {
                quantization_error: som.qe_history(),
                topographic_error: som.te_history(),
            },
        )?;
        println!("✓ Saved error history to {}", path.display());
    }

    let elapsed = start_time.elapsed();
    println!();
    println!("Training complete in {}", HumanDuration(elapsed));
    println!("   Epochs: {} ({} iterations)", summary.epochs, summary.iterations);
    println!(
        "   Final learning rate: {:.4}, final sigma: {:.4}",
        summary.final_learning_rate, summary.final_sigma
    );
    if let (Some(qe), Some(te)) = (summary.last_quantization_error, summary.last_topographic_error) {
        println!("   Quant. error: {:.4}, topo. error: {:.4}", qe, te);
    }
    println!("   Output: {}", output.display());

    Ok(())
}

fn evaluate_map(map_path: PathBuf, input: PathBuf) -> Result<()> {
    let som = Som::load(&map_path, None)?;
    let dataset = LoopDataset::from_json_file(&input)?;

    let qe = som.quantization_error(dataset.samples())?;
    let te = som.topographic_error(dataset.samples())?;
    let n = dataset.len() as f64;

    println!("Map: {:?}", map_path);
    println!("  Samples: {}", dataset.len());
    println!("  Distance: {}", som.distance());
    println!("  Quantization error: {:.6}", qe.iter().sum::<f64>() / n);
    println!(
        "  Topographic error: {:.6}",
        te.iter().map(|&e| e as f64).sum::<f64>() / n
    );

    Ok(())
}

fn project_dataset(map_path: PathBuf, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let som = Som::load(&map_path, None)?;
    let dataset = LoopDataset::from_json_file(&input)?;

    let bmus = som.bmus(dataset.samples())?;
    let frequencies = som.activation_frequencies(dataset.samples())?;

    match output {
        Some(path) => {
            let projection = Projection {
                bmus,
                classes: dataset.classes().map(<[String]>::to_vec),
                frequencies: frequencies.rows().into_iter().map(|r| r.to_vec()).collect(),
            };
            let writer = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(writer, &projection)?;
            println!("✓ Saved projection to {}", path.display());
        }
        None => {
            for (k, (row, col)) in bmus.iter().enumerate() {
                match dataset.classes() {
                    Some(classes) => println!("{}\t{}\t{}\t{}", k, row, col, classes[k]),
                    None => println!("{}\t{}\t{}", k, row, col),
                }
            }
            println!();
            println!("Activation frequencies:");
            for row in frequencies.rows() {
                let cells: Vec<String> = row.iter().map(|c| format!("{:>5}", c)).collect();
                println!("{}", cells.join(""));
            }
        }
    }

    Ok(())
}

fn show_info(map_path: PathBuf) -> Result<()> {
    let som = Som::load(&map_path, None)?;
    let (seq_len, point_dim) = som.input_dim();

    println!("Map: {:?}", map_path);
    println!("  Grid: {}x{} ({} units)", som.height(), som.width(), som.grid().len());
    println!("  Input shape: {} points x {} coordinates", seq_len, point_dim);
    println!("  Distance: {}", som.distance());
    println!("  QE history: {} snapshots", som.qe_history().len());
    println!("  TE history: {} snapshots", som.te_history().len());
    if let (Some(&(t, qe)), Some(&(_, te))) = (som.qe_history().last(), som.te_history().last()) {
        println!("  Last snapshot (iteration {}): QE={:.4}, TE={:.4}", t, qe, te);
    }

    Ok(())
}
