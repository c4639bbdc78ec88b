use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::context::SyncContext;

/// Show where each alias points and whether the mapping changed since
pub fn execute(config: Option<&Path>, index: Option<&str>) -> Result<()> {
    let ctx = SyncContext::load(config)?;

    println!("🔎 {}", ctx.config.elasticsearch.url.dimmed());

    for index in ctx.select(index)? {
        let definition = ctx.loader.index_definition(index.name());
        let status = ctx.facade.status(&definition)?;

        let state = match &status.current {
            None => "not created".red(),
            Some(_) if status.needs_migration() => "needs migration".yellow(),
            Some(_) => "up to date".green(),
        };
        let changes = match index.as_changes_only() {
            Some(changes) => format!(", {} changed", changes.changed_count()?),
            None => String::new(),
        };

        println!("\n{} [{}]", index.name().bold(), state);
        println!("   alias:    {}", status.alias);
        println!("   current:  {}", status.current.as_deref().unwrap_or("-"));
        println!("   expected: {}", status.expected);
        println!("   rows:     {}{}", index.total_count()?, changes);
    }

    Ok(())
}
