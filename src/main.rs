use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing_subscriber::EnvFilter;

use flowsplit::io::{FormatRegistry, load_config};
use flowsplit::{FlowConfig, FlowDiagram};

/// Animated particle flow diagrams for hierarchical count data.
#[derive(Parser)]
#[command(name = "flowsplit")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write route paths and label positions as JSON
    Geometry {
        /// Counts file (.json, .yaml, .yml)
        #[arg(short, long)]
        input: PathBuf,

        /// Diagram config file (.json, .yaml, .yml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the particle simulation until every particle has arrived
    Simulate {
        /// Counts file (.json, .yaml, .yml)
        #[arg(short, long)]
        input: PathBuf,

        /// Diagram config file (.json, .yaml, .yml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed (overrides the config's seed)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Give up after this many ticks
        #[arg(long, default_value = "1000000")]
        max_ticks: u64,

        /// Write one JSON frame per tick to this file
        #[arg(short, long)]
        frames: Option<PathBuf>,
    },
}

fn build_diagram(input: &Path, config: Option<&Path>) -> anyhow::Result<FlowDiagram> {
    let counts = FormatRegistry::with_defaults()
        .read_counts(input)
        .with_context(|| format!("failed to read counts from {}", input.display()))?;
    let config = match config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?,
        None => FlowConfig::default(),
    };
    Ok(FlowDiagram::build(&counts, config)?)
}

fn geometry(input: &Path, config: Option<&Path>, output: Option<&Path>) -> anyhow::Result<()> {
    let diagram = build_diagram(input, config)?;
    let json = serde_json::to_string_pretty(&diagram.geometry())?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote geometry to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn simulate(
    input: &Path,
    config: Option<&Path>,
    seed: Option<u64>,
    max_ticks: u64,
    frames: Option<&Path>,
) -> anyhow::Result<()> {
    let diagram = build_diagram(input, config)?;
    let mut rng = match seed.or(diagram.config().seed) {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };

    let mut sink = frames
        .map(|path| {
            File::create(path)
                .map(BufWriter::new)
                .with_context(|| format!("failed to create {}", path.display()))
        })
        .transpose()?;

    let simulator = diagram.simulator();
    let mut state = diagram.new_state();
    let mut last = None;
    for _ in 0..max_ticks {
        if state.is_complete() {
            break;
        }
        let frame = simulator.tick(&mut state, &mut rng);
        if let Some(out) = sink.as_mut() {
            serde_json::to_writer(&mut *out, &frame)?;
            out.write_all(b"\n")?;
        }
        last = Some(frame);
    }
    if let Some(mut out) = sink {
        out.flush()?;
    }

    if !state.is_complete() {
        anyhow::bail!(
            "simulation did not finish within {max_ticks} ticks ({} of {} particles spawned)",
            state.spawned(),
            state.total_particles()
        );
    }

    println!(
        "Simulated {} particles in {} ticks",
        state.total_particles(),
        state.tick()
    );
    if let Some(frame) = last {
        for counter in &frame.counters {
            println!(
                "{}/{}: {} ({:.1}%)",
                counter.leaf_name,
                counter.group_key,
                counter.absolute_count,
                counter.percent * 100.0
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowsplit=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Geometry {
            input,
            config,
            output,
        } => geometry(&input, config.as_deref(), output.as_deref()),
        Commands::Simulate {
            input,
            config,
            seed,
            max_ticks,
            frames,
        } => simulate(
            &input,
            config.as_deref(),
            seed,
            max_ticks,
            frames.as_deref(),
        ),
    }
}
