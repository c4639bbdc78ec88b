use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use index_sync::elasticsearch::{ExportScope, RowId};

use super::context::SyncContext;

/// Re-export specific rows of one index.
///
/// Ids go through an [`ExportScope`] the same way writes during a request
/// would, so duplicates collapse and the flush happens once.
pub fn execute(config: Option<&Path>, index: &str, ids: &[RowId]) -> Result<()> {
    let ctx = SyncContext::load(config)?;
    let index = ctx.registry.index_by_name(index)?;

    let mut scope = ExportScope::new();
    scope.scheduler(index.name()).schedule_row_ids(ids.iter().copied());
    let pending = scope.scheduler(index.name()).pending_ids().len();

    println!("📤 Exporting {} ids of {}...", pending, index.name().bold());
    scope.flush(&ctx.facade, &ctx.registry, &ctx.loader)?;
    println!("   {} done", "✓".green());

    Ok(())
}
