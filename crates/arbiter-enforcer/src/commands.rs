//! Subcommand handlers
//!
//! Each handler returns `Ok(false)` when it ran but has problems to report.

use anyhow::{Context, Result};
use arbiter_core::{
    verify_audit_log, DecisionRepository, EnforcementReport, EnforcerConfig,
    JsonFileDecisionRepository, JsonlEventSink, SlaEnforcer, SystemClock,
};
use clap::ArgMatches;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

fn path_arg(args: &ArgMatches, name: &str) -> Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

async fn load_config(args: &ArgMatches) -> Result<EnforcerConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => EnforcerConfig::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EnforcerConfig::default()),
    }
}

async fn build_enforcer(args: &ArgMatches) -> Result<(SlaEnforcer, EnforcerConfig)> {
    let mut config = load_config(args).await?;
    if args.get_flag("no-block") {
        config.block_on_violation = false;
    }
    let enforcer = SlaEnforcer::new(config.to_options(Arc::new(SystemClock)));
    Ok((enforcer, config))
}

async fn open_sink(args: &ArgMatches) -> Result<JsonlEventSink> {
    let path = path_arg(args, "audit-log")?;
    JsonlEventSink::open(&path)
        .await
        .with_context(|| format!("failed to open audit log {}", path.display()))
}

fn print_report(report: &EnforcementReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.pass_skipped {
        println!("Pass skipped: another pass is running");
        return Ok(());
    }
    println!("Enforcement Report:");
    println!("  Checked:   {}", report.checked);
    println!("  Escalated: {}", report.escalated);
    println!("  Skipped:   {}", report.skipped);
    println!("  Blocked:   {}", report.blocked);
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
    Ok(())
}

/// `enforce`: one pass, then exit
pub(crate) async fn enforce(args: &ArgMatches) -> Result<bool> {
    let (enforcer, _) = build_enforcer(args).await?;
    let repository = JsonFileDecisionRepository::new(path_arg(args, "decisions")?);
    let sink = open_sink(args).await?;

    let report = enforcer.run_pass(Some(&repository), &sink).await;
    print_report(&report, args.get_flag("json"))?;
    Ok(!report.has_errors())
}

/// `watch`: a pass per tick until Ctrl-C
pub(crate) async fn watch(args: &ArgMatches) -> Result<bool> {
    let (enforcer, config) = build_enforcer(args).await?;
    let period = args
        .get_one::<u64>("interval-secs")
        .map_or_else(|| config.interval(), |secs| Duration::from_secs(*secs));
    let repository = JsonFileDecisionRepository::new(path_arg(args, "decisions")?);
    let sink = open_sink(args).await?;

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = period.as_secs(), "watching decisions");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = enforcer.run_pass(Some(&repository), &sink).await;
                if report.has_errors() {
                    warn!(errors = ?report.errors, "pass reported errors");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("interrupted; stopping");
                return Ok(true);
            }
        }
    }
}

/// `status`: read-only SLA view of pending decisions
pub(crate) async fn status(args: &ArgMatches) -> Result<bool> {
    let config = load_config(args).await?;
    let enforcer = SlaEnforcer::new(config.to_options(Arc::new(SystemClock)));
    let path = path_arg(args, "decisions")?;
    let pending = JsonFileDecisionRepository::new(&path)
        .query_pending()
        .await
        .with_context(|| format!("failed to read decisions {}", path.display()))?;

    let rows: Vec<_> = pending
        .iter()
        .map(|decision| (decision, enforcer.status(decision)))
        .collect();

    if args.get_flag("json") {
        let body: Vec<_> = rows
            .iter()
            .map(|(decision, status)| {
                json!({
                    "id": decision.id,
                    "decision_type": decision.decision_type,
                    "blocking": decision.blocking,
                    "escalated": decision.metadata.is_escalated(),
                    "overdue": status.overdue,
                    "age_secs": status.age.as_secs(),
                    "sla_secs": status.sla.as_secs(),
                    "remaining_secs": status.remaining.as_secs(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(true);
    }

    println!(
        "{:<24} {:<20} {:>8} {:>8} {:>10}  STATE",
        "ID", "TYPE", "AGE(h)", "SLA(h)", "LEFT(h)"
    );
    for (decision, status) in &rows {
        let state = if decision.metadata.is_escalated() {
            "escalated"
        } else if decision.blocking {
            "blocking"
        } else if status.overdue {
            "OVERDUE"
        } else {
            "ok"
        };
        println!(
            "{:<24} {:<20} {:>8.1} {:>8.1} {:>10.1}  {state}",
            decision.id.as_str(),
            decision.decision_type,
            hours(status.age),
            hours(status.sla),
            hours(status.remaining),
        );
    }
    Ok(true)
}

/// `verify-audit`: check the hash chain of the log
pub(crate) async fn verify_audit(args: &ArgMatches) -> Result<bool> {
    let path = path_arg(args, "audit-log")?;
    let count = verify_audit_log(&path)
        .await
        .with_context(|| format!("audit log {} failed verification", path.display()))?;
    println!("{count} entries verified in {}", path.display());
    Ok(true)
}

fn hours(duration: Duration) -> f64 {
    duration.as_secs_f64() / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli;
    use arbiter_core::{read_audit_log, Decision};
    use arbiter_test_utils::decision_aged_hours;
    use chrono::Utc;
    use std::path::Path;

    async fn write_decisions(path: &Path, decisions: &[Decision]) {
        JsonFileDecisionRepository::new(path)
            .save(decisions)
            .await
            .unwrap();
    }

    fn matches(argv: &[&str]) -> ArgMatches {
        let mut full = vec!["arbiter-enforcer"];
        full.extend_from_slice(argv);
        let matches = cli().try_get_matches_from(full).unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        sub.clone()
    }

    #[tokio::test]
    async fn enforce_flags_file_and_appends_audit() {
        let dir = tempfile::tempdir().unwrap();
        let decisions = dir.path().join("decisions.json");
        let audit = dir.path().join("audit.jsonl");
        let now = Utc::now();
        write_decisions(
            &decisions,
            &[
                decision_aged_hours("late", "gate_decision", now, 5),
                decision_aged_hours("fresh", "gate_decision", now, 1),
            ],
        )
        .await;

        let args = matches(&[
            "enforce",
            "--decisions",
            decisions.to_str().unwrap(),
            "--audit-log",
            audit.to_str().unwrap(),
            "--no-block",
            "--json",
        ]);
        assert!(enforce(&args).await.unwrap());

        let stored = JsonFileDecisionRepository::new(&decisions)
            .load()
            .await
            .unwrap();
        assert!(stored[0].metadata.is_escalated());
        assert!(!stored[0].blocking);
        assert!(!stored[1].metadata.is_escalated());

        let entries = read_audit_log(&audit).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event.event_data.decision_id, "late");

        // Rerun is a no-op
        assert!(enforce(&args).await.unwrap());
        assert_eq!(verify_audit_log(&audit).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn enforce_with_missing_decisions_file_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let args = matches(&[
            "enforce",
            "--decisions",
            dir.path().join("absent.json").to_str().unwrap(),
            "--audit-log",
            dir.path().join("audit.jsonl").to_str().unwrap(),
        ]);
        assert!(!enforce(&args).await.unwrap());
    }

    #[tokio::test]
    async fn config_file_overrides_policy() {
        let dir = tempfile::tempdir().unwrap();
        let decisions = dir.path().join("decisions.json");
        let audit = dir.path().join("audit.jsonl");
        let config = dir.path().join("arbiter.toml");
        tokio::fs::write(
            &config,
            "[policy]\nfallback_ms = 3600000\n\n[policy.durations]\n",
        )
        .await
        .unwrap();
        write_decisions(
            &decisions,
            &[decision_aged_hours("adv", "advisory", Utc::now(), 2)],
        )
        .await;

        let args = matches(&[
            "enforce",
            "--decisions",
            decisions.to_str().unwrap(),
            "--audit-log",
            audit.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ]);
        assert!(enforce(&args).await.unwrap());

        let stored = JsonFileDecisionRepository::new(&decisions)
            .load()
            .await
            .unwrap();
        assert!(stored[0].metadata.is_escalated());
        assert!(stored[0].blocking);
    }

    #[tokio::test]
    async fn verify_audit_rejects_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let args = matches(&[
            "verify-audit",
            "--audit-log",
            dir.path().join("absent.jsonl").to_str().unwrap(),
        ]);
        assert!(verify_audit(&args).await.is_err());
    }

    #[tokio::test]
    async fn status_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let decisions = dir.path().join("decisions.json");
        write_decisions(
            &decisions,
            &[decision_aged_hours("late", "gate_decision", Utc::now(), 9)],
        )
        .await;
        let before = tokio::fs::read(&decisions).await.unwrap();

        let args = matches(&["status", "--decisions", decisions.to_str().unwrap(), "--json"]);
        assert!(status(&args).await.unwrap());

        assert_eq!(tokio::fs::read(&decisions).await.unwrap(), before);
    }
}
