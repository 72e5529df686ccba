use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use refaudit_catalog::{CatalogReader, PostgresCatalog};
use refaudit_core::{
    AuditError, AuditLogFilter, CheckKind, Config, MutationAuditResult, Operation, ScanLog, ScanReport, Status,
};
use refaudit_engine::{AuditLog, MutationAuditor, Scanner};

/// refaudit - Referential integrity auditing for PostgreSQL
#[derive(Parser)]
#[command(name = "refaudit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: refaudit.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write JSON output to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database host (overrides config and REFAUDIT_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Database port (overrides config and REFAUDIT_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Database name (overrides config and REFAUDIT_DATABASE)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Database user (overrides config and REFAUDIT_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Schema to inspect (overrides config and REFAUDIT_SCHEMA)
    #[arg(long, global = true)]
    schema: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an INSERT, UPDATE or DELETE with audit capture
    Audit {
        /// The statement to run
        statement: String,
    },

    /// Scan the schema for referential integrity anomalies
    Scan {
        /// Checks to run (repeatable; default: [scan] checks from config, or all)
        #[arg(long = "check")]
        checks: Vec<CheckKind>,
    },

    /// Count orphaned and NULL references between two tables
    CheckFk {
        /// Referencing table
        #[arg(long)]
        child: String,

        /// Referenced table
        #[arg(long)]
        parent: String,
    },

    /// Compare declared foreign keys with naming-convention ones
    Relations,

    /// List the referential actions declared on every foreign key
    Actions,

    /// Show audit log entries, newest first
    Logs {
        #[arg(long)]
        table: Option<String>,

        #[arg(long)]
        operation: Option<Operation>,

        /// Entries at or after this time (RFC 3339)
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Entries before this time (RFC 3339)
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Create the audit log table if it does not exist
    InitLog,

    /// Drop and recreate the audit log table, deleting every entry
    RecreateLog {
        /// Confirm that existing entries should be discarded
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = load_config(cli.config.as_deref(), cli.verbose)?;
    apply_overrides(&mut config, &cli, |key| std::env::var(key).ok())?;

    let db = connect(&config, cli.verbose).await?;
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Audit { statement } => audit_command(&db, &config, &statement, output, cli.verbose).await,
        Commands::Scan { checks } => scan_command(&db, &config, checks, output, cli.verbose).await,
        Commands::CheckFk { child, parent } => check_fk_command(&db, &config, &child, &parent, output).await,
        Commands::Relations => relations_command(&db, &config, output, cli.verbose).await,
        Commands::Actions => actions_command(&db, &config, output).await,
        Commands::Logs {
            table,
            operation,
            since,
            until,
            limit,
        } => {
            let mut filter = AuditLogFilter::new().limit(limit);
            filter.table = table;
            filter.operation = operation;
            filter.since = since;
            filter.until = until;
            logs_command(&db, &config, &filter, output).await
        }
        Commands::InitLog => {
            audit_log(&db, &config).ensure().await?;
            eprintln!("{} {}", "✓ Audit log ready:".green(), config.audit.log_table);
            Ok(())
        }
        Commands::RecreateLog { yes } => {
            if !yes {
                anyhow::bail!(
                    "Refusing to recreate audit log {} without --yes; every entry would be lost",
                    config.audit.log_table
                );
            }
            audit_log(&db, &config).recreate().await?;
            eprintln!("{} {}", "✓ Audit log recreated:".green(), config.audit.log_table);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    let config = if let Some(path) = path {
        Config::from_file(path)?
    } else if Path::new("refaudit.toml").exists() {
        Config::from_file(Path::new("refaudit.toml"))?
    } else {
        if verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };
    Ok(config)
}

/// Layer `REFAUDIT_*` variables, then command-line flags, over the file config
fn apply_overrides(config: &mut Config, cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<()> {
    let conn = &mut config.connection;

    if let Some(host) = env("REFAUDIT_HOST") {
        conn.host = host;
    }
    if let Some(port) = env("REFAUDIT_PORT") {
        conn.port = port
            .parse()
            .map_err(|_| anyhow::anyhow!("REFAUDIT_PORT is not a valid port: {}", port))?;
    }
    if let Some(database) = env("REFAUDIT_DATABASE") {
        conn.database = database;
    }
    if let Some(user) = env("REFAUDIT_USER") {
        conn.user = user;
    }
    if let Some(password) = env("REFAUDIT_PASSWORD") {
        conn.password = password;
    }
    if let Some(schema) = env("REFAUDIT_SCHEMA") {
        conn.schema = schema;
    }
    if let Some(tls) = env("REFAUDIT_TLS") {
        conn.tls = matches!(tls.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "require");
    }
    if let Some(log_table) = env("REFAUDIT_LOG_TABLE") {
        config.audit.log_table = log_table;
    }

    let conn = &mut config.connection;
    if let Some(host) = &cli.host {
        conn.host = host.clone();
    }
    if let Some(port) = cli.port {
        conn.port = port;
    }
    if let Some(database) = &cli.database {
        conn.database = database.clone();
    }
    if let Some(user) = &cli.user {
        conn.user = user.clone();
    }
    if let Some(schema) = &cli.schema {
        conn.schema = schema.clone();
    }
    Ok(())
}

async fn connect(config: &Config, verbose: bool) -> Result<PostgresCatalog> {
    config.connection.validate()?;

    if verbose {
        eprintln!(
            "{} {}:{}/{} (schema {})...",
            "Connecting to".cyan(),
            config.connection.host,
            config.connection.port,
            config.connection.database,
            config.connection.schema
        );
    }

    let db = PostgresCatalog::connect(&config.connection)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.test_connection()
        .await
        .map_err(|e| anyhow::anyhow!("Connection test failed: {}", e))?;
    tracing::info!(host = db.host(), port = db.port(), schema = db.schema(), "connected");

    if verbose {
        eprintln!("{}", "✓ Connection successful".green());
    }
    Ok(db)
}

fn audit_log<'a>(db: &'a PostgresCatalog, config: &Config) -> AuditLog<'a> {
    AuditLog::new(db, config.audit.log_table.as_str(), &config.timeouts)
}

/// Pretty JSON to `output`, or stdout
fn write_json(value: &impl Serialize, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("{} {}", "Output saved to:".green(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn error_json(err: &AuditError) -> serde_json::Value {
    serde_json::json!({
        "status": Status::Error,
        "error_kind": err.kind(),
        "message": err.to_string(),
    })
}

async fn audit_command(
    db: &PostgresCatalog,
    config: &Config,
    statement: &str,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    if verbose {
        eprintln!("{} {}", "Auditing:".cyan(), statement);
    }

    let auditor = MutationAuditor::new(db, config.audit.clone(), config.timeouts.clone());
    let result = auditor.audit(statement).await;
    write_json(&result, output)?;
    print_audit_summary(&result);

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn scan_command(
    db: &PostgresCatalog,
    config: &Config,
    checks: Vec<CheckKind>,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let checks = if checks.is_empty() {
        config.scan.enabled_checks()
    } else {
        checks
    };

    if verbose {
        let names: Vec<&str> = checks.iter().map(|c| c.as_str()).collect();
        eprintln!("{} {}", "Running checks:".cyan(), names.join(", "));
    }

    let report = Scanner::new(db, &config.timeouts)
        .ignoring(config.audit.log_table.as_str())
        .scan(&checks)
        .await;
    write_json(&report, output)?;
    print_scan_summary(&report);

    if report.has_violations() {
        std::process::exit(1);
    }
    Ok(())
}

async fn check_fk_command(
    db: &PostgresCatalog,
    config: &Config,
    child: &str,
    parent: &str,
    output: Option<&Path>,
) -> Result<()> {
    match Scanner::new(db, &config.timeouts).check_fk(child, parent).await {
        Ok(report) => {
            write_json(&report, output)?;
            let total = report.total_violations();
            if total > 0 {
                eprintln!("{} {} violation(s) between {} and {}", "✗".red(), total, child, parent);
                std::process::exit(1);
            }
            eprintln!("{} No violations between {} and {}", "✓".green(), child, parent);
            Ok(())
        }
        Err(err) => {
            write_json(&error_json(&err), output)?;
            eprintln!("{} {}", "✗".red(), err);
            std::process::exit(1);
        }
    }
}

async fn relations_command(db: &PostgresCatalog, config: &Config, output: Option<&Path>, verbose: bool) -> Result<()> {
    let mut log = ScanLog::new();
    let report = Scanner::new(db, &config.timeouts)
        .ignoring(config.audit.log_table.as_str())
        .relationships(&mut log)
        .await?;

    if verbose {
        eprint!("{}", log.render());
    }
    write_json(
        &serde_json::json!({ "relationships": report, "log": log.into_lines() }),
        output,
    )?;
    eprintln!(
        "{} existing, {} potential, {} missing foreign keys",
        report.num_existing, report.num_potential, report.num_missing
    );
    Ok(())
}

async fn actions_command(db: &PostgresCatalog, config: &Config, output: Option<&Path>) -> Result<()> {
    let mut log = ScanLog::new();
    let actions = Scanner::new(db, &config.timeouts).defined_actions(&mut log).await?;
    write_json(
        &serde_json::json!({ "defined_actions": actions, "log": log.into_lines() }),
        output,
    )
}

async fn logs_command(db: &PostgresCatalog, config: &Config, filter: &AuditLogFilter, output: Option<&Path>) -> Result<()> {
    let entries = audit_log(db, config).list(filter).await?;
    write_json(&entries, output)?;
    eprintln!("{} {} entries", "Audit log:".cyan(), entries.len());
    Ok(())
}

fn print_audit_summary(result: &MutationAuditResult) {
    eprintln!();
    match result.status {
        Status::Success => eprintln!("{} {}", "✓".green(), result.message),
        _ => eprintln!("{} {}", "✗".red(), result.message),
    }
    if let Some(key) = result.injected_primary_key {
        eprintln!("  {} id = {}", "Assigned".cyan(), key);
    }
    if let Some(statement) = result.attempted_statement.as_deref() {
        eprintln!("  {} {}", "Attempted:".yellow(), statement);
    }
    if !result.statement_params.is_empty() {
        let params: Vec<&str> = result
            .statement_params
            .iter()
            .map(|p| p.as_deref().unwrap_or("NULL"))
            .collect();
        eprintln!("  {} {}", "Params:".cyan(), params.join(", "));
    }
    for warning in &result.warnings {
        eprintln!("  {} {}", "⚠".yellow(), warning);
    }
}

fn print_scan_summary(report: &ScanReport) {
    eprintln!();
    eprintln!("{}", "═══════════════════════════════════════".cyan());
    eprintln!("{}", "  Referential Integrity Scan".cyan().bold());
    eprintln!("{}", "═══════════════════════════════════════".cyan());

    for (check, outcome) in &report.checks {
        if let Some(error) = &outcome.error {
            eprintln!("  {} {:<24} {}", "⚠".yellow(), check.as_str(), error.yellow());
        } else if outcome.anomalies.is_empty() {
            eprintln!("  {} {}", "✓".green(), check.as_str());
        } else {
            eprintln!("  {} {:<24} {}", "✗".red(), check.as_str(), outcome.anomalies.len());
        }
    }

    eprintln!();
    if report.has_violations() {
        eprintln!("{} {} violation(s) found", "✗".red(), report.total_violations);
        for line in &report.violation_summary {
            eprintln!("  - {}", line);
        }
    } else {
        eprintln!("{} {}", "✓".green(), report.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_win_over_environment() {
        let cli = Cli::parse_from(["refaudit", "--host", "db.internal", "scan", "--check", "isolated_tables"]);
        let mut config = Config::default();
        config.connection.host = "from-file".into();

        apply_overrides(&mut config, &cli, |key| match key {
            "REFAUDIT_HOST" => Some("from-env".into()),
            "REFAUDIT_USER" => Some("auditor".into()),
            "REFAUDIT_TLS" => Some("require".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.user, "auditor");
        assert!(config.connection.tls);
    }

    #[test]
    fn bad_port_in_environment_is_rejected() {
        let cli = Cli::parse_from(["refaudit", "init-log"]);
        let mut config = Config::default();
        let err = apply_overrides(&mut config, &cli, |key| (key == "REFAUDIT_PORT").then(|| "fifty".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn repeated_checks_parse() {
        let cli = Cli::parse_from([
            "refaudit",
            "scan",
            "--check",
            "orphan_records",
            "--check",
            "type-mismatches",
        ]);
        match cli.command {
            Commands::Scan { checks } => {
                assert_eq!(checks, vec![CheckKind::OrphanRecords, CheckKind::TypeMismatches])
            }
            _ => panic!("expected scan"),
        }
    }
}
