mod cli;
mod error_fmt;
mod rt;
mod session;

use std::process::ExitCode;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RtLock};
use spoolsync_config::{Calibration, Config};

fn main() -> ExitCode {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);

    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporting: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if args.json {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            let code = error_fmt::exit_code_for_error(&err);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(args: &Cli) -> eyre::Result<()> {
    let config = load_config(args)?;
    init_tracing(args, &config);

    let calibration = match &args.calibration {
        Some(path) => Some(
            spoolsync_config::load_calibration_csv(path)
                .wrap_err_with(|| format!("load calibration {path:?}"))?,
        ),
        None => config.calibration.map(Calibration::from),
    };

    match &args.cmd {
        Commands::Run {
            duration_secs,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            let lock = rt_lock.unwrap_or(RtLock::os_default());
            rt::setup_rt_once(*rt, *rt_prio, lock, *rt_cpu);
            session::run_engine(&config, calibration, *duration_secs, args.json)
        }
        Commands::Simulate => session::simulate(&config, args.json),
        Commands::SelfCheck => session::self_check(&config, args.json),
    }
}

fn load_config(args: &Cli) -> eyre::Result<Config> {
    if !args.config.exists() {
        tracing::debug!(path = ?args.config, "config file absent; using defaults");
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&args.config)
        .wrap_err_with(|| format!("read config {:?}", args.config))?;
    let config = spoolsync_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {:?}: {e}", args.config))?;
    config
        .validate()
        .wrap_err_with(|| format!("validate config {:?}", args.config))?;
    Ok(config)
}

fn init_tracing(args: &Cli, config: &Config) {
    let level = config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| args.log_level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Events go to stdout; logs stay on stderr or in the configured file.
    if let Some(path) = &config.logging.file {
        let path = std::path::Path::new(path);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let name = path.file_name().unwrap_or_else(|| "spoolsync.log".as_ref());
        let appender = match config.logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .init();
    } else if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
