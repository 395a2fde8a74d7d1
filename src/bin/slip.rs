//! SLIP command-line driver
//!
//! Exercises the list engine from the shell:
//! - Reference scenarios with an arena report
//! - Deterministic stress workload
//! - Effective configuration and Prometheus metrics
//!
//! # Examples
//!
//! ```bash
//! # Run every scenario
//! slip scenario
//!
//! # Stress with a fixed seed, JSON statistics
//! slip stress --operations 100000 --seed 7 --json
//!
//! # Show configuration after SLIP_* overrides
//! SLIP_GROWTH_SLOTS=4096 slip config
//! ```

use anyhow::ensure;
use clap::{Args, Parser, Subcommand};
use slip::arena::{Arena, ArenaConfig};
use slip::list::{Cursor, Value};
use slip::{metrics, CellId, Datum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// SLIP - list engine with reference-counted sublists
#[derive(Parser, Debug)]
#[command(name = "slip")]
#[command(version = slip::VERSION)]
#[command(about = "SLIP - list engine with reference-counted sublists", long_about = None)]
#[command(author = "Anton Feldmann <anton.feldmann@gmail.com>")]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Arena configuration file (TOML)
    #[arg(long, global = true, env = "SLIP_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path (console only when omitted)
    #[arg(long, global = true, env = "SLIP_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reference scenarios
    Scenario {
        /// Scenario number (1-6); all when omitted
        number: Option<u8>,
    },

    /// Run a deterministic allocate/link/replace/delete workload
    Stress(StressArgs),

    /// Print the effective arena configuration
    Config,

    /// Run a stress workload and print the Prometheus exposition
    Metrics(StressArgs),

    /// Show version
    Version,
}

/// Stress workload arguments
#[derive(Args, Debug, Clone)]
struct StressArgs {
    /// Number of operations
    #[arg(short, long, default_value = "10000")]
    operations: usize,

    /// Live lists kept by the workload
    #[arg(short, long, default_value = "16")]
    lists: usize,

    /// Workload seed
    #[arg(short, long, default_value = "1")]
    seed: u64,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli) {
        eprintln!("failed to set up logging: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        // Storage and configuration failures are unrecoverable for the engine
        if let Some(err) = e.downcast_ref::<slip::Error>() {
            if err.is_fatal() {
                error!(kind = err.kind().as_str(), "Fatal: {}", err);
                eprintln!("SLIP fatal [{}]: {}", err.kind().as_str(), err);
                std::process::exit(2);
            }
        }
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ArenaConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scenario { number } => scenario_command(config, number),
        Commands::Stress(args) => stress_command(config, &args),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Metrics(args) => {
            metrics::init_metrics();
            let mut arena = Arena::new(config);
            stress(&mut arena, &args)?;
            arena.stats();
            print!("{}", metrics::export_metrics());
            Ok(())
        }
        Commands::Version => {
            println!("SLIP {}", slip::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with console output and optional rolling files
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let file_layer = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "slip.log");
            Some(fmt::layer().with_writer(appender).with_ansi(false))
        }
        None => None,
    };

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color)
                .pretty(),
        )
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

// === Scenarios ===

type Scenario = fn(ArenaConfig) -> anyhow::Result<String>;

const SCENARIOS: [(&str, Scenario); 6] = [
    ("fragment growth", scenario_growth),
    ("shared sublists", scenario_shared_sublists),
    ("in-place replace", scenario_replace_in_place),
    ("sublist to primitive", scenario_replace_sublist),
    ("sublist over primitive", scenario_sublist_over_primitive),
    ("chain release", scenario_chain_release),
];

fn scenario_command(config: ArenaConfig, number: Option<u8>) -> anyhow::Result<()> {
    let selected: Vec<usize> = match number {
        Some(n) => {
            ensure!((1..=SCENARIOS.len() as u8).contains(&n), "no scenario {}", n);
            vec![n as usize - 1]
        }
        None => (0..SCENARIOS.len()).collect(),
    };

    for index in selected {
        let (name, scenario) = SCENARIOS[index];
        info!(scenario = index + 1, name, "Running scenario");
        let summary = scenario(config)?;
        println!("[{}] {}: ok", index + 1, name);
        println!("{}", summary);
    }
    Ok(())
}

fn scenario_growth(_config: ArenaConfig) -> anyhow::Result<String> {
    let mut arena = Arena::new(ArenaConfig::new(25, 25));
    for _ in 0..25 {
        arena.allocate()?;
    }
    ensure!(arena.total_slots() == 25, "growth before exhaustion");
    arena.allocate()?;
    ensure!(arena.free_count() == 24, "expected 24 free, got {}", arena.free_count());
    Ok(arena.report_usage())
}

fn scenario_shared_sublists(config: ArenaConfig) -> anyhow::Result<String> {
    let mut arena = Arena::new(config);
    let h = arena.new_header()?;
    for v in 1..=3 {
        arena.push_back(h, v)?;
    }
    let s1 = arena.new_sublist(h)?;
    let s2 = arena.new_sublist(h)?;
    ensure!(arena.ref_count(h) == Some(2), "refcount after two sublists");

    arena.destroy_sublist(s1)?;
    ensure!(arena.ref_count(h) == Some(1), "refcount after first destroy");
    ensure!(arena.list_len(h) == 3, "list touched by first destroy");

    let before = arena.free_count();
    arena.destroy_sublist(s2)?;
    ensure!(arena.is_free(h), "header not reclaimed");
    // Header and three members, plus the sublist's own slot
    ensure!(arena.free_count() == before + 5, "unexpected free delta");
    Ok(arena.report_usage())
}

fn scenario_replace_in_place(config: ArenaConfig) -> anyhow::Result<String> {
    let mut arena = Arena::new(config);
    let h = arena.new_header()?;
    arena.push_back(h, 1)?;
    let bottom = arena.push_back(h, 123)?;
    let id = arena.replace(bottom, Value::datum(true))?;
    ensure!(id == bottom, "address changed");
    ensure!(arena.render(id) == "true", "rendered {}", arena.render(id));
    Ok(format!("list: {}", arena.render(h)))
}

fn scenario_replace_sublist(config: ArenaConfig) -> anyhow::Result<String> {
    let mut arena = Arena::new(config);
    let inner = arena.new_header()?;
    arena.push_back(inner, "inner")?;
    let h = arena.new_header()?;
    arena.push_sublist_back(h, inner)?;

    let mut cursor = Cursor::new(&mut arena, h)?;
    let old = cursor.current();
    let new = cursor.replace(&mut arena, Value::datum(42))?;
    ensure!(Some(new) != old, "sublist slot survived");
    ensure!(arena.is_free(inner), "inner header not reclaimed");
    Ok(format!("list: {}", arena.render(h)))
}

fn scenario_sublist_over_primitive(config: ArenaConfig) -> anyhow::Result<String> {
    let mut arena = Arena::new(config);
    let h = arena.new_header()?;
    let data = arena.push_back(h, 7)?;
    let err = match arena.new_sublist(data) {
        Ok(_) => anyhow::bail!("sublist over a primitive was accepted"),
        Err(e) => e,
    };
    ensure!(arena.list_len(h) == 1, "list corrupted");
    let last = arena.diagnostics().last().map(ToString::to_string).unwrap_or_default();
    Ok(format!("rejected with {}\n{}", err.kind().as_str(), last))
}

fn scenario_chain_release(config: ArenaConfig) -> anyhow::Result<String> {
    let mut arena = Arena::new(config);
    let chain: Vec<CellId> = (0..5).map(|_| arena.allocate()).collect::<Result<_, _>>()?;
    for pair in chain.windows(2) {
        arena.set_right_link(pair[0], Some(pair[1]));
    }
    let head = arena.free_list_head();
    let before = arena.free_count();
    arena.release(chain[0], chain[4])?;
    ensure!(arena.free_count() == before + 5, "free count delta");
    ensure!(arena.right_link(chain[4]) == head, "chain end must point at the prior head");
    Ok(arena.report_usage())
}

// === Stress ===

/// Deterministic pseudo-random source (xorshift64)
struct Workload {
    state: u64,
}

impl Workload {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n.max(1) as u64) as usize
    }
}

/// One working list: its header plus an unlinked sublist holding the
/// workload's own reference
#[derive(Clone, Copy)]
struct Held {
    header: CellId,
    anchor: CellId,
}

fn hold(arena: &mut Arena) -> anyhow::Result<Held> {
    let header = arena.new_header()?;
    let anchor = arena.new_sublist(header)?;
    Ok(Held { header, anchor })
}

fn stress(arena: &mut Arena, args: &StressArgs) -> anyhow::Result<()> {
    let mut rng = Workload::new(args.seed);
    let mut lists: Vec<Held> = Vec::with_capacity(args.lists);
    for _ in 0..args.lists.max(1) {
        lists.push(hold(arena)?);
    }

    for _ in 0..args.operations {
        let slot = rng.below(lists.len());
        let h = lists[slot].header;
        match rng.below(8) {
            0..=2 => {
                arena.push_back(h, rng.next_u64() as i64)?;
            }
            3 => {
                arena.push_front(h, Datum::Float(rng.below(1000) as f64 / 10.0))?;
            }
            4 => {
                let other = lists[rng.below(lists.len())].header;
                arena.push_sublist_back(h, other)?;
            }
            5 => {
                if let Some(first) = arena.first(h) {
                    let value = if rng.below(2) == 0 {
                        Value::datum(rng.below(2) == 0)
                    } else {
                        Value::list(lists[rng.below(lists.len())].header)
                    };
                    arena.replace(first, value)?;
                }
            }
            6 => {
                if let Some(last) = arena.last(h) {
                    arena.destroy(last)?;
                }
            }
            _ => {
                // Drop our reference; the list survives while sublists hold it
                arena.destroy_sublist(lists[slot].anchor)?;
                lists[slot] = hold(arena)?;
            }
        }
    }

    info!(
        operations = args.operations,
        pending = arena.pending_reclaims(),
        "Stress workload finished"
    );
    arena.flush_pending();
    let check = arena.check_free_list();
    ensure!(check.is_consistent(), "free list inconsistent: {:?}", check.issues);
    Ok(())
}

fn stress_command(config: ArenaConfig, args: &StressArgs) -> anyhow::Result<()> {
    let mut arena = Arena::new(config);
    stress(&mut arena, args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&arena.stats())?);
    } else {
        print!("{}", arena.report_usage());
    }
    Ok(())
}
