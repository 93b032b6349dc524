//! Validate command implementation

use anyhow::Result;
use kf_core::{resolve_order, QualifiedTable};
use kf_db::ReferenceStore;

use crate::cli::GlobalArgs;
use crate::commands::common::{load_project, ExitCode, Project, EXIT_FAILED};

/// Validation result severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single validation issue
struct ValidationIssue {
    severity: Severity,
    message: String,
}

/// Execute the validate command.
///
/// Loading the configuration already rejects malformed aggregations, unknown
/// dependencies and cycles. When the database is reachable this also checks
/// that every reference table exists and every configured facts table can be
/// read.
pub(crate) async fn execute(global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let config = &project.config;

    for name in config.domain_names() {
        let domain = config.domain(name)?;
        let order = resolve_order(name, &domain.foreign_keys)?;
        println!(
            "Domain '{}': {} foreign keys ({})",
            name,
            order.len(),
            order
                .iter()
                .map(|fk| fk.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
    }

    let mut issues = Vec::new();
    match project.open_store(global) {
        Ok(store) => check_relations(&project, &store, &mut issues),
        Err(err) => issues.push(ValidationIssue {
            severity: Severity::Warning,
            message: format!("Skipping database checks: {:#}", err),
        }),
    }

    issues.sort_by(|a, b| b.severity.cmp(&a.severity));
    for issue in &issues {
        println!("[{}] {}", issue.severity, issue.message);
    }

    let errors = issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .count();
    if errors > 0 {
        println!("Validation failed: {} error(s)", errors);
        return Err(ExitCode(EXIT_FAILED).into());
    }
    println!("Configuration is valid.");
    Ok(())
}

fn check_relations(
    project: &Project,
    store: &dyn ReferenceStore,
    issues: &mut Vec<ValidationIssue>,
) {
    for (name, domain) in &project.config.domains {
        for fk in &domain.foreign_keys {
            let table = fk.qualified_table();
            match store.relation_exists(&table) {
                Ok(true) => {}
                Ok(false) => issues.push(ValidationIssue {
                    severity: Severity::Error,
                    message: format!(
                        "Reference table '{}' for '{}.{}' does not exist",
                        table, name, fk.name
                    ),
                }),
                Err(err) => issues.push(ValidationIssue {
                    severity: Severity::Warning,
                    message: format!("Could not check '{}': {}", table, err),
                }),
            }
        }

        if let Some(source) = domain.facts.as_ref().and_then(|f| f.table.as_deref()) {
            let facts = match source.split_once('.') {
                Some((schema, table)) => QualifiedTable::new(Some(schema.to_string()), table),
                None => QualifiedTable::new(None, source),
            };
            if let Ok(false) = store.relation_exists(&facts) {
                issues.push(ValidationIssue {
                    severity: Severity::Error,
                    message: format!(
                        "Facts table '{}' for domain '{}' does not exist",
                        facts, name
                    ),
                });
            }
        }
    }
}
