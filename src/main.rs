use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edc_sharing::{
    filtered_csv, statistics_exports, AllocationOptimizer, CancellationToken, DisplaySettings,
    EanSide, EdcParser, Grouping, KwhFormat, OptimizationAlgorithm, OptimizedAllocation,
    OptimizerConfig, SharingSimulator, Summary,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "edc-sharing")]
#[command(author, version, about = "EDC energy-sharing import, simulation and allocation optimizer")]
struct Cli {
    /// Display settings JSON (units, hidden/anonymized EANs, day filter)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-EAN balances, shared and missed energy
    Summary {
        /// EDC export (semicolon CSV)
        file: PathBuf,

        /// 15m, 1h, 1d or 1m (defaults to the settings' grouping)
        #[arg(long)]
        grouping: Option<Grouping>,

        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Data-quality warnings recorded while reconciling
    Warnings {
        file: PathBuf,

        /// Also print every single warning
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },

    /// Re-export visible consumers in the EDC layout
    Export {
        file: PathBuf,

        /// Write to a file instead of stdout
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Write statistics import files for every metric and EAN
    Statistics {
        file: PathBuf,

        #[arg(long, default_value = "1m")]
        grouping: Grouping,

        #[arg(long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,
    },

    /// Simulate sharing with fixed allocation percentages
    Simulate {
        file: PathBuf,

        /// Percentage per consumer, comma separated (sorted EAN order)
        #[arg(long, value_delimiter = ',', required = true)]
        allocations: Vec<f64>,

        /// Value of one kWh per consumer, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        costs: Vec<f64>,

        #[arg(long, default_value_t = 5)]
        rounds: usize,
    },

    /// Search allocation percentages that maximize profit
    Optimize {
        file: PathBuf,

        /// Optimizer config JSON; flags below override it
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        #[arg(long, value_delimiter = ',')]
        costs: Option<Vec<f64>>,

        #[arg(long)]
        rounds: Option<usize>,

        #[arg(long)]
        restarts: Option<usize>,

        #[arg(long)]
        max_fails: Option<usize>,

        /// random or gradientDescend
        #[arg(long)]
        algorithm: Option<OptimizationAlgorithm>,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("edc_sharing=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => DisplaySettings::from_file(path)?,
        None => DisplaySettings::default(),
    };

    match cli.command {
        Commands::Summary { file, grouping, json } => run_summary(&file, grouping, json, settings),
        Commands::Warnings { file, verbose } => run_warnings(&file, verbose),
        Commands::Export { file, output } => run_export(&file, output.as_deref(), &settings),
        Commands::Statistics {
            file,
            grouping,
            out_dir,
        } => run_statistics(&file, grouping, &out_dir),
        Commands::Simulate {
            file,
            allocations,
            costs,
            rounds,
        } => run_simulate(&file, &allocations, &costs, rounds),
        Commands::Optimize {
            file,
            config,
            costs,
            rounds,
            restarts,
            max_fails,
            algorithm,
            seed,
        } => {
            let mut optimizer_config = match config {
                Some(path) => OptimizerConfig::from_file(path)?,
                None => OptimizerConfig::default(),
            };
            if let Some(costs) = costs {
                optimizer_config.costs_per_kwh = costs;
            }
            if let Some(rounds) = rounds {
                optimizer_config.sharing_rounds = rounds;
            }
            if let Some(restarts) = restarts {
                optimizer_config.restarts = restarts;
            }
            if let Some(max_fails) = max_fails {
                optimizer_config.max_fails = max_fails;
            }
            if let Some(algorithm) = algorithm {
                optimizer_config.algorithm = algorithm;
            }
            if seed.is_some() {
                optimizer_config.seed = seed;
            }
            run_optimize(&file, optimizer_config)
        }
    }
}

fn run_summary(file: &Path, grouping: Option<Grouping>, json: bool, mut settings: DisplaySettings) -> Result<()> {
    let doc = EdcParser::new().parse_file(file)?;
    if let Some(grouping) = grouping {
        settings.grouping = grouping;
    }

    let intervals = doc.grouped_intervals_in_range(settings.grouping, &settings)?;
    let summary = Summary::from_intervals(
        &intervals,
        doc.producer_eans().len(),
        doc.consumer_eans().len(),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("📊 {} ({} days, {} intervals)", doc.filename(), doc.num_days(), intervals.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   {} .. {}", doc.date_from(), doc.date_to());

    let energy = KwhFormat {
        always_kwh: true,
        nbsp: false,
    };
    for row in summary.rows(doc.producer_eans(), doc.consumer_eans(), &settings) {
        let icon = match row.side {
            EanSide::Producer => "☀️ ",
            EanSide::Consumer => "🏠",
        };
        println!(
            "{} {:<20} original {:>14}  shared {:>14}  missed {:>14}",
            icon,
            row.label,
            settings.format_kwh(row.stats.original_balance, energy)?,
            settings.format_kwh(row.stats.shared(), energy)?,
            settings.format_kwh(row.stats.missed_due_to_allocation, energy)?,
        );
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Shared total: {}", settings.format_kwh(summary.total_shared(), energy)?);
    println!("✓ Missed total: {}", settings.format_kwh(summary.total_missed(), energy)?);

    Ok(())
}

fn run_warnings(file: &Path, verbose: bool) -> Result<()> {
    let doc = EdcParser::new().parse_file(file)?;
    let warnings = doc.warning_summary();

    if warnings.is_clean() {
        println!("✅ No data-quality warnings in {}", doc.filename());
        return Ok(());
    }

    println!("⚠️  {}", warnings.summary());
    if verbose {
        for interval in doc.intervals().iter().filter(|i| i.has_warnings()) {
            for warning in &interval.warnings {
                println!("   {} {}", interval.start, warning);
            }
        }
    }

    Ok(())
}

fn run_export(file: &Path, output: Option<&Path>, settings: &DisplaySettings) -> Result<()> {
    let doc = EdcParser::new().parse_file(file)?;
    let text = filtered_csv(&doc, settings).context("Failed to build filtered CSV")?;

    match output {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Filtered CSV written to {}", path.display());
        }
        None => print!("{}", text),
    }

    Ok(())
}

fn run_statistics(file: &Path, grouping: Grouping, out_dir: &Path) -> Result<()> {
    let doc = EdcParser::new().parse_file(file)?;
    let exports = statistics_exports(&doc, grouping)?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory {}", out_dir.display()))?;

    for export in &exports {
        let path = out_dir.join(&export.file_name);
        fs::write(&path, &export.text).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(entity = %export.entity, path = %path.display(), "statistics file written");
    }

    println!("✓ {} statistics files written to {}", exports.len(), out_dir.display());
    Ok(())
}

fn run_simulate(file: &Path, allocations: &[f64], costs: &[f64], rounds: usize) -> Result<()> {
    let doc = EdcParser::new().parse_file(file)?;
    let simulator = SharingSimulator::new(&doc)?;

    let result = simulator.simulate(allocations, costs, rounds)?;

    println!("🔁 Simulated {} intervals, {} rounds", simulator.interval_count(), rounds);
    for (i, ean) in doc.consumer_eans().iter().enumerate() {
        println!(
            "   {:<20} {:>6.2} %  shared {:>10.2} kWh  profit {:>10.2}",
            ean.name(),
            allocations[i],
            result.sharing_per_ean[i],
            result.profit_per_ean[i]
        );
    }
    println!("✓ Total shared {:.2} kWh, profit {:.2}", result.total_sharing(), result.total_profit());

    Ok(())
}

fn run_optimize(file: &Path, config: OptimizerConfig) -> Result<()> {
    let doc = EdcParser::new().parse_file(file)?;
    let simulator = SharingSimulator::new(&doc)?;
    let planned = config.restarts.max(1);

    let mut optimizer = AllocationOptimizer::new(&simulator, config)?;

    println!("🎯 Optimizing allocation for {} consumers ({} attempts)", simulator.consumer_count(), planned);
    let mut progress = |best: &OptimizedAllocation, attempt: usize| {
        println!(
            "   [{}/{}] best profit {:.2}, shared {:.2} kWh",
            attempt,
            planned,
            best.total_profit(),
            best.total_sharing()
        );
    };

    let outcome = optimizer.optimize(&mut progress, &CancellationToken::new())?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (i, ean) in doc.consumer_eans().iter().enumerate() {
        println!(
            "   {:<20} {:>6.2} %  shared {:>10.2} kWh  profit {:>10.2}",
            ean.name(),
            outcome.best.weights[i],
            outcome.best.sharing[i],
            outcome.best.profit[i]
        );
    }
    println!(
        "✅ Best of {} attempts: profit {:.2}, shared {:.2} kWh",
        outcome.attempts,
        outcome.best.total_profit(),
        outcome.best.total_sharing()
    );

    Ok(())
}
