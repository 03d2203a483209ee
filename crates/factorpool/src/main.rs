use std::io;
use std::process;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use factorpool::config::parse_value;
use factorpool::{
    ConfigError, FACTORPOOL_VERSION, PoolConfig, RandomInputs, ReportFormat, ReportWriter,
    WorkerPool,
};

const USAGE: &str = "\
Usage: factorpool [options]

Options:
  --workers <n>        Worker count, 0 for CPUs + 1 [default: 0]
  --tasks <n>          Number of random jobs [default: 100]
  --min <n>            Smallest input, inclusive [default: 3]
  --max <n>            Largest input, exclusive [default: 1000]
  --window <n>         Successful runs averaged per worker [default: 20]
  --threshold <x>      Multiplier on the average run time [default: 1.1]
  --deadline-ms <ms>   Deadline before the window fills [default: 60000]
  --delay-ms <ms>      Random delay bound added to each run [default: 0]
  --skip-compute       Return n instead of n!
  --json               Print reports as JSON lines
  -V, --version        Print version
  -h, --help           Print help

Every option can also be set through FACTORPOOL_* environment variables.
Logging: FACTORPOOL_LOG=debug|info|warn|error, RUST_LOG, LOG_FORMAT=json.";

enum Command {
    Run { config: PoolConfig, format: ReportFormat },
    Version,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let command = match PoolConfig::from_env()
        .map_err(|e| e.to_string())
        .and_then(|base| parse_args(&args, base))
    {
        Ok(command) => command,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    let (config, format) = match command {
        Command::Version => {
            println!("factorpool {FACTORPOOL_VERSION}");
            return;
        }
        Command::Run { config, format } => (config, format),
    };

    init_tracing();

    if let Err(e) = run(config, format) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String], mut config: PoolConfig) -> Result<Command, String> {
    let mut format = ReportFormat::Text;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--skip-compute" => config = config.with_skip_compute(true),
            "--json" => format = ReportFormat::Json,
            "--version" | "-V" => return Ok(Command::Version),
            "--help" | "-h" => return Err(String::new()),
            "--workers" | "--tasks" | "--min" | "--max" | "--window" | "--threshold"
            | "--deadline-ms" | "--delay-ms" => {
                i += 1;
                let raw = args
                    .get(i)
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                config = apply_flag(config, flag, raw).map_err(|e| e.to_string())?;
            }
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(Command::Run { config, format })
}

fn apply_flag(config: PoolConfig, flag: &str, raw: &str) -> Result<PoolConfig, ConfigError> {
    Ok(match flag {
        "--workers" => config.with_worker_count(parse_value(flag, raw)?),
        "--tasks" => config.with_tasks(parse_value(flag, raw)?),
        "--min" => {
            let max = config.max_input;
            config.with_input_range(parse_value(flag, raw)?, max)
        }
        "--max" => {
            let min = config.min_input;
            config.with_input_range(min, parse_value(flag, raw)?)
        }
        "--window" => config.with_history_window(parse_value(flag, raw)?),
        "--threshold" => config.with_threshold(parse_value(flag, raw)?),
        "--deadline-ms" => {
            config.with_initial_deadline(Duration::from_millis(parse_value(flag, raw)?))
        }
        "--delay-ms" => config.with_max_delay(Duration::from_millis(parse_value(flag, raw)?)),
        _ => return Err(ConfigError::invalid(flag, raw, "unknown option")),
    })
}

fn run(config: PoolConfig, format: ReportFormat) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let inputs = RandomInputs::from_config(&config);
    let pool = WorkerPool::new(config)?;
    let mut writer = ReportWriter::new(io::BufWriter::new(io::stdout()), format);

    let summary = runtime
        .block_on(pool.run(inputs, &mut writer))
        .context("pool run failed")?;

    let workers = serde_json::to_string(&summary.workers).context("failed to encode summary")?;
    tracing::debug!(run_id = %summary.run_id, %workers, "Per-worker counters");
    if summary.timed_out > 0 || summary.failed > 0 {
        tracing::warn!(
            timed_out = summary.timed_out,
            failed = summary.failed,
            "Some jobs did not complete"
        );
    }
    Ok(())
}

/// Log to stderr so reports on stdout stay machine-readable.
///
/// `RUST_LOG` takes precedence. Otherwise `FACTORPOOL_LOG` picks the level
/// for this crate. `LOG_FORMAT=json` switches to JSON output.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("FACTORPOOL_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("factorpool={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr));
        let _ = subscriber.try_init();
    }
}
