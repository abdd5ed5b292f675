//! Arbiter enforcer
//!
//! Scheduler-facing entry point. Wraps the core engine around a JSON decision
//! file and a JSON-lines audit log.

use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

/// Exit code when a pass finished but reported errors
const EXIT_PASS_ERRORS: u8 = 2;

fn decisions_arg() -> Arg {
    Arg::new("decisions")
        .long("decisions")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON file holding the decision array")
}

fn audit_log_arg() -> Arg {
    Arg::new("audit-log")
        .long("audit-log")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON-lines audit log to append to")
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file")
}

fn no_block_arg() -> Arg {
    Arg::new("no-block")
        .long("no-block")
        .action(ArgAction::SetTrue)
        .help("Escalate without transitioning decisions to blocking")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

pub(crate) fn cli() -> Command {
    Command::new("arbiter-enforcer")
        .version(arbiter_core::VERSION)
        .about("SLA enforcement and escalation for arbiter decisions")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format (filter with RUST_LOG)"),
        )
        .subcommand(
            Command::new("enforce")
                .about("Run one enforcement pass")
                .arg(decisions_arg())
                .arg(audit_log_arg())
                .arg(config_arg())
                .arg(no_block_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("watch")
                .about("Run enforcement passes on an interval until interrupted")
                .arg(decisions_arg())
                .arg(audit_log_arg())
                .arg(config_arg())
                .arg(no_block_arg())
                .arg(
                    Arg::new("interval-secs")
                        .long("interval-secs")
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Seconds between passes (overrides the config file)"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show SLA status of pending decisions without enforcing")
                .arg(decisions_arg())
                .arg(config_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("verify-audit")
                .about("Verify the hash chain of an audit log")
                .arg(audit_log_arg()),
        )
}

fn init_tracing(matches: &ArgMatches) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let json = matches
        .get_one::<String>("log-format")
        .is_some_and(|f| f == "json");
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(matches: ArgMatches) -> Result<bool> {
    match matches.subcommand() {
        Some(("enforce", args)) => commands::enforce(args).await,
        Some(("watch", args)) => commands::watch(args).await,
        Some(("status", args)) => commands::status(args).await,
        Some(("verify-audit", args)) => commands::verify_audit(args).await,
        _ => Ok(true),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(&matches);

    match run(matches).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_PASS_ERRORS),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "arbiter-enforcer failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
