use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::context::SyncContext;

pub fn execute(config: Option<&Path>, index: Option<&str>) -> Result<()> {
    let ctx = SyncContext::load(config)?;

    for index in ctx.select(index)? {
        let definition = ctx.loader.index_definition(index.name());
        println!("🗑️  Deleting index {}...", index.name().bold());

        ctx.facade.delete(&definition)?;

        println!("   {} {} removed", "✓".green(), definition.index_alias());
    }

    Ok(())
}
