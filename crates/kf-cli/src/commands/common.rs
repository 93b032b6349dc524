//! Shared utilities for CLI commands

use anyhow::{bail, Context, Result};
use kf_core::{Config, DbType, FactsSource, RunSummary};
use kf_db::DuckDbStore;
use kf_sql::quote::{quote_qualified, quote_string};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main.rs turns it into the process status.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Some tables failed or were blocked
pub(crate) const EXIT_FAILED: i32 = 1;

/// Every failure was transient; the same invocation may be retried
pub(crate) const EXIT_RETRYABLE: i32 = 3;

/// Loaded configuration plus the directory relative paths resolve against
pub(crate) struct Project {
    pub(crate) config: Config,
    pub(crate) root: PathBuf,
}

/// Load configuration from `--config` or the project directory
pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    let root = PathBuf::from(&global.project_dir);
    let config = match &global.config {
        Some(path) => {
            Config::load(Path::new(path)).context("Failed to load configuration file")?
        }
        None => Config::load_from_dir(&root).context("Failed to load project configuration")?,
    };
    Ok(Project { config, root })
}

impl Project {
    /// Resolve a configured path against the project directory
    pub(crate) fn resolve_path(&self, path: &str) -> String {
        let candidate = Path::new(path);
        if path == ":memory:" || candidate.is_absolute() {
            path.to_string()
        } else {
            self.root.join(candidate).display().to_string()
        }
    }

    /// Open the database selected by `--target` / `KF_TARGET`
    pub(crate) fn open_store(&self, global: &GlobalArgs) -> Result<DuckDbStore> {
        let target = Config::resolve_target(global.target.as_deref());
        let db = self.config.get_database_config(target.as_deref())?;
        match db.db_type {
            DbType::DuckDb => {
                let path = self.resolve_path(&db.path);
                log::debug!("Opening DuckDB database at {}", path);
                DuckDbStore::new(&path)
                    .with_context(|| format!("Failed to connect to database '{}'", path))
            }
            DbType::Postgres => bail!(
                "Target '{}' uses postgres, which has no executing backend; use a duckdb target",
                target.as_deref().unwrap_or("default")
            ),
        }
    }

    /// SELECT statement producing a domain's fact batch.
    ///
    /// `override_source` comes from `--facts` and is relative to the working
    /// directory, unlike configured sources.
    pub(crate) fn facts_query(
        &self,
        domain: &str,
        override_source: Option<&str>,
    ) -> Result<String> {
        if let Some(source) = override_source {
            return Ok(source_query(&cli_facts_source(source), |p| p.to_string()));
        }
        let domain_config = self.config.domain(domain)?;
        let Some(source) = &domain_config.facts else {
            bail!(
                "Domain '{}' has no configured facts source; pass --facts",
                domain
            );
        };
        Ok(source_query(source, |p| self.resolve_path(p)))
    }
}

/// Interpret a `--facts` argument as a CSV file or a table name
pub(crate) fn cli_facts_source(arg: &str) -> FactsSource {
    if arg.to_ascii_lowercase().ends_with(".csv") {
        FactsSource {
            csv: Some(arg.to_string()),
            ..FactsSource::default()
        }
    } else {
        FactsSource {
            table: Some(arg.to_string()),
            ..FactsSource::default()
        }
    }
}

fn source_query(source: &FactsSource, resolve: impl Fn(&str) -> String) -> String {
    if let Some(query) = &source.query {
        query.trim().trim_end_matches(';').to_string()
    } else if let Some(csv) = &source.csv {
        format!("SELECT * FROM read_csv_auto({})", quote_string(&resolve(csv)))
    } else {
        let table = source.table.as_deref().unwrap_or_default();
        format!("SELECT * FROM {}", quote_qualified(table))
    }
}

/// Exit status for a set of finished runs, if any table failed
pub(crate) fn failure_exit_code(summaries: &[RunSummary]) -> Option<i32> {
    let failed: Vec<&RunSummary> = summaries.iter().filter(|s| s.has_failures()).collect();
    if failed.is_empty() {
        return None;
    }
    // Blocked tables only follow a failed one, so retryability of the
    // failed tables decides.
    if failed.iter().all(|s| s.is_retryable()) {
        Some(EXIT_RETRYABLE)
    } else {
        Some(EXIT_FAILED)
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
