use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use index_sync::elasticsearch::MigrationOutcome;

use super::context::SyncContext;

pub fn execute(config: Option<&Path>, index: Option<&str>) -> Result<()> {
    let ctx = SyncContext::load(config)?;

    for index in ctx.select(index)? {
        let definition = ctx.loader.index_definition(index.name());
        println!("🔄 Migrating {}...", index.name().bold());

        match ctx.facade.migrate(&definition)? {
            MigrationOutcome::UpToDate { index } => {
                println!("   {} already at {}", "✓".green(), index.dimmed());
            }
            MigrationOutcome::Migrated { from, to } => {
                println!("   {} {} → {}", "✓".green(), from.dimmed(), to);
            }
        }
    }

    Ok(())
}
