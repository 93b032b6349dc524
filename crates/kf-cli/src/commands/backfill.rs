//! Plan and run command implementation

use anyhow::{Context, Result};
use kf_core::{RunMode, RunSummary, TableSummary};
use kf_db::{DuckDbStore, ReferenceStore};
use kf_engine::HybridReferenceCoordinator;

use crate::cli::{BackfillArgs, GlobalArgs, SummaryOutput};
use crate::commands::common::{self, load_project, ExitCode, Project, EXIT_FAILED};

/// Execute `kf plan` (`RunMode::Plan`) or `kf run` (`RunMode::Apply`)
pub(crate) async fn execute(args: &BackfillArgs, global: &GlobalArgs, mode: RunMode) -> Result<()> {
    let project = load_project(global)?;
    let domains: Vec<String> = match &args.domain {
        Some(domain) => {
            project.config.domain(domain)?;
            vec![domain.clone()]
        }
        None => project
            .config
            .domain_names()
            .into_iter()
            .map(String::from)
            .collect(),
    };
    if domains.is_empty() {
        println!("No domains configured.");
        return Ok(());
    }

    let store = project.open_store(global)?;
    let handles = spawn_domains(&project, &store, &domains, args.facts.as_deref(), mode)?;

    let mut summaries = Vec::with_capacity(handles.len());
    let mut domain_errors = 0;
    for (domain, handle) in domains.iter().zip(handles) {
        let outcome = handle
            .await
            .with_context(|| format!("Backfill task for domain '{}' panicked", domain))?;
        match outcome {
            Ok(summary) => summaries.push(summary),
            Err(err) => {
                domain_errors += 1;
                log::error!("Domain '{}' failed: {:#}", domain, err);
            }
        }
    }

    match args.output {
        SummaryOutput::Text => print_text(&summaries, args.show_sql),
        SummaryOutput::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
    }

    if domain_errors > 0 {
        return Err(ExitCode(EXIT_FAILED).into());
    }
    match common::failure_exit_code(&summaries) {
        Some(code) => Err(ExitCode(code).into()),
        None => Ok(()),
    }
}

type DomainTask = tokio::task::JoinHandle<Result<RunSummary>>;

/// One blocking task per domain, each on its own connection
fn spawn_domains(
    project: &Project,
    store: &DuckDbStore,
    domains: &[String],
    facts: Option<&str>,
    mode: RunMode,
) -> Result<Vec<DomainTask>> {
    let mut handles = Vec::with_capacity(domains.len());
    for domain in domains {
        let sql = project.facts_query(domain, facts)?;
        let domain_config = project.config.domain(domain)?.clone();
        let tracking = project.config.tracking.clone();
        let conn = store
            .try_clone()
            .context("Failed to open a connection for a domain pass")?;
        let domain = domain.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            log::debug!("Loading facts for domain '{}': {}", domain, sql);
            let batch = conn
                .load_facts(&sql)
                .with_context(|| format!("Failed to load facts for domain '{}'", domain))?;
            let coordinator = HybridReferenceCoordinator::new(&conn, tracking);
            let summary = coordinator.run(&domain, &domain_config, &batch, mode)?;
            Ok(summary)
        }));
    }
    Ok(handles)
}

fn print_text(summaries: &[RunSummary], show_sql: bool) {
    for summary in summaries {
        println!(
            "Domain '{}' ({}, run {})",
            summary.domain,
            match summary.mode {
                RunMode::Apply => "apply",
                RunMode::Plan => "plan",
            },
            summary.run_id
        );
        let name_width = summary
            .tables
            .iter()
            .map(|t| t.fk.len())
            .max()
            .unwrap_or(0);
        for table in &summary.tables {
            println!("  {}", table_line(table, name_width));
            for error in &table.errors {
                println!(
                    "      ! {} [{}]: {}",
                    error.key, error.column, error.message
                );
            }
            if show_sql {
                if let Some(sql) = &table.statement {
                    for line in sql.lines() {
                        println!("      {}", line);
                    }
                }
            }
        }
        println!(
            "  Total: {} inserted, {} updated, {} skipped, {} row errors{}",
            summary.total_inserted(),
            summary.total_updated(),
            summary.total_skipped(),
            summary.total_row_errors(),
            summary
                .duration_ms()
                .map(|ms| format!(" in {}ms", ms))
                .unwrap_or_default()
        );
        println!();
    }
}

fn table_line(table: &TableSummary, name_width: usize) -> String {
    let mut line = format!(
        "{:<width$}  {:<16} {:<16} +{} ~{} ={}",
        table.fk,
        table.table.to_string(),
        table.status.to_string(),
        table.inserted,
        table.updated,
        table.skipped,
        width = name_width
    );
    if let Some(message) = &table.message {
        line.push_str(&format!("  ({})", message));
    }
    line
}
