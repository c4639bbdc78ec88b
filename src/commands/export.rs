use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::time::Instant;

use super::context::SyncContext;

/// Full export, or changed-only export with `changed`
pub fn execute(config: Option<&Path>, index: Option<&str>, changed: bool) -> Result<()> {
    let ctx = SyncContext::load(config)?;

    for index in ctx.select(index)? {
        let definition = ctx.loader.index_definition(index.name());

        if changed && index.as_changes_only().is_none() {
            println!(
                "⏭️  Skipping {} {}",
                index.name().bold(),
                "(no changed-only support)".dimmed()
            );
            continue;
        }

        let mode = if changed { "changed rows of " } else { "" };
        println!("📤 Exporting {mode}{}...", index.name().bold());

        if !changed {
            println!("   {} rows in source", index.total_count()?);
        } else if let Some(changes) = index.as_changes_only() {
            println!("   {} changed rows in source", changes.changed_count()?);
        }

        let start = Instant::now();
        let report = if changed {
            ctx.facade.export_changed(index, &definition)?
        } else {
            ctx.facade.export(index, &definition)?
        };

        println!(
            "   {} {} rows in {} batches ({:.1}s)",
            "✓".green(),
            report.exported,
            report.batches,
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
