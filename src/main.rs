//! `ramutex` command-line driver.
//!
//! Each positional argument is the simulated time at which one node asks
//! for the critical region; node `i` takes the `i`-th argument.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ramutex::{
    ConfigError, MutexSimulation, RamutexError, RequestSchedule, RunReport, SimConfig,
    SimulationEnd, VirtualTime, WriterSink,
};
use ramutex::config::{DEFAULT_HORIZON, DEFAULT_SEED, MAX_MESSAGE_DELAY, RUNNING_INTERVAL};

#[derive(Parser)]
#[command(name = "ramutex")]
#[command(about = "Simulate Ricart-Agrawala mutual exclusion over a set of nodes")]
#[command(version)]
struct Cli {
    /// Request time for each node (node i requests at the i-th value)
    #[arg(value_name = "TIME", allow_negative_numbers = true)]
    times: Vec<String>,

    /// Seed for message delays
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Ticks a node spends in the critical region
    #[arg(long, default_value_t = RUNNING_INTERVAL)]
    running_interval: u64,

    /// Largest message delay; delays are uniform over [0, MAX]
    #[arg(long, value_name = "MAX", default_value_t = MAX_MESSAGE_DELAY)]
    max_delay: u64,

    /// Stop once the next event lies after this time
    #[arg(long, default_value_t = DEFAULT_HORIZON)]
    horizon: u64,

    /// Only print the summary, not the per-event trace
    #[arg(short, long)]
    quiet: bool,

    /// Write the dispatched-event log to PATH
    #[arg(long, value_name = "PATH")]
    export_log: Option<PathBuf>,

    /// Checkpoint node state every N events in the exported log
    #[arg(long, value_name = "N", requires = "export_log")]
    checkpoint_every: Option<u64>,
}

fn print_usage(err: &ConfigError) {
    println!("{}", err);
    println!("Correct usage: ramutex [time...]");
    println!("  Each time is when the corresponding node requests the critical region.");
    println!("  The number of times given is the number of nodes.");
    println!("Example: ramutex 0 5 10");
}

fn print_summary(report: &RunReport, log_hash: Option<u64>) {
    println!();
    match report.end {
        SimulationEnd::Drained => println!(
            "Finished at T={}: {} events, no events left.",
            report.final_time.ticks(),
            report.processed
        ),
        SimulationEnd::HorizonReached { next } => println!(
            "Stopped at T={}: {} events, next event at T={} is past the horizon.",
            report.final_time.ticks(),
            report.processed,
            next.ticks()
        ),
    }

    println!("Critical region entries:");
    for s in &report.sessions {
        match s.released_at {
            Some(released) => println!(
                "  {}  {} .. {}",
                s.node,
                s.entered_at.ticks(),
                released.ticks()
            ),
            None => println!("  {}  {} .. (still inside)", s.node, s.entered_at.ticks()),
        }
    }

    let stats = report.stats;
    println!(
        "Messages: {} requests, {} replies ({} deferred)",
        stats.requests_sent, stats.replies_sent, stats.replies_deferred
    );
    if let Some(hash) = log_hash {
        println!("Event log hash: {:016x}", hash);
    }
}

fn run(cli: Cli) -> Result<(), RamutexError> {
    let schedule = RequestSchedule::parse(cli.times.as_slice())?;
    let config = SimConfig::new()
        .with_seed(cli.seed)
        .with_running_interval(cli.running_interval)
        .with_max_message_delay(cli.max_delay)
        .with_horizon(VirtualTime::new(cli.horizon));

    let mut sim = MutexSimulation::new(config, &schedule)?.without_trace_buffer();
    if !cli.quiet {
        sim = sim.with_sink(Box::new(WriterSink::new(std::io::stdout())));
    }
    if cli.export_log.is_some() {
        match cli.checkpoint_every {
            Some(n) => sim.enable_logging_with_checkpoints(n),
            None => sim.enable_logging(),
        }
    }

    let report = sim.run()?;
    print_summary(&report, sim.event_log().map(|log| log.log_hash()));

    if let Some(path) = &cli.export_log {
        sim.export_log(path)?;
        println!("Event log written to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RamutexError::Config(err)) => {
            print_usage(&err);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("ramutex: {}", err);
            ExitCode::FAILURE
        }
    }
}
