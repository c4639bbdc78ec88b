use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::context::SyncContext;

/// Create the physical index and alias for one or all registered indexes
pub fn execute(config: Option<&Path>, index: Option<&str>) -> Result<()> {
    let ctx = SyncContext::load(config)?;

    for index in ctx.select(index)? {
        let definition = ctx.loader.index_definition(index.name());
        println!("🏗️  Creating index {}...", index.name().bold());

        ctx.facade.create(&definition)?;

        println!(
            "   {} {} → {}",
            "✓".green(),
            definition.index_alias(),
            definition.versioned_index_name()?
        );
    }

    Ok(())
}
