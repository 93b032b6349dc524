//! Order command implementation

use anyhow::Result;
use kf_core::resolve_order;

use crate::cli::{GlobalArgs, OrderArgs};
use crate::commands::common::load_project;

/// Print a domain's foreign keys in processing order
pub(crate) async fn execute(args: &OrderArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let domain = project.config.domain(&args.domain)?;
    let order = resolve_order(&args.domain, &domain.foreign_keys)?;

    for (i, fk) in order.iter().enumerate() {
        let deps = if fk.depends_on.is_empty() {
            String::new()
        } else {
            format!(
                "  (after {})",
                fk.depends_on
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        println!("{:>3}. {} -> {}{}", i + 1, fk.name, fk.qualified_table(), deps);
    }
    Ok(())
}
