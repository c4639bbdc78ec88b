//! SQLite row source driven through the facade

mod support;

use anyhow::Result;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

use index_sync::elasticsearch::{
    ExportScope, Index, IndexExportedEvent, IndexExportedListener, IndexFacade, IndexRegistry,
    InMemoryRepository,
};
use index_sync::source::{ChangedFlagReset, SqliteIndex, TableSpec};
use support::product_definition;

fn seed(path: &Path) -> Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE product (
             id INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             price REAL,
             export_changed INTEGER NOT NULL DEFAULT 0
         );
         INSERT INTO product VALUES
             (1, 'nail', 0.5, 0),
             (2, 'hammer', 12.0, 1),
             (3, 'drill', 80.0, 0),
             (4, 'saw', NULL, 1);",
    )?;
    Ok(())
}

fn spec() -> TableSpec {
    TableSpec::new("product")
        .with_changed_column("export_changed")
        .with_columns(&["name", "price"])
        .with_batch_size(2)
}

fn changed_flags(path: &Path) -> Result<Vec<(i64, i64)>> {
    let conn = Connection::open(path)?;
    let mut stmt = conn.prepare("SELECT id, export_changed FROM product ORDER BY id")?;
    let flags = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(flags)
}

#[test]
fn test_changed_export_resets_flags() -> Result<()> {
    let dir = TempDir::new()?;
    let database = dir.path().join("shop.db");
    seed(&database)?;
    let (_, definition) = product_definition(&dir.path().join("definition"), "shop");

    let index = SqliteIndex::open("product", &database, spec())?;
    let mut flag_reset = ChangedFlagReset::open(&database)?;
    flag_reset.watch("product", &spec())?;
    assert!(flag_reset.is_watching("product"));

    let mut facade = IndexFacade::new(InMemoryRepository::new());
    facade.add_listener(Box::new(flag_reset));
    facade.create(&definition)?;

    let report = facade.export_changed(&index, &definition)?;

    assert_eq!(report.exported, 2);
    assert_eq!(facade.repository().document_ids("shop_product")?, vec![2, 4]);
    let hammer = facade.repository().document("shop_product", 2).unwrap();
    assert_eq!(hammer["name"], Value::from("hammer"));
    assert_eq!(hammer["price"], Value::from(12.0));

    assert_eq!(index.as_changes_only().unwrap().changed_count()?, 0);
    assert_eq!(changed_flags(&database)?, vec![(1, 0), (2, 0), (3, 0), (4, 0)]);
    Ok(())
}

#[test]
fn test_full_export_reads_every_row_and_prunes() -> Result<()> {
    let dir = TempDir::new()?;
    let database = dir.path().join("shop.db");
    seed(&database)?;
    let (_, definition) = product_definition(&dir.path().join("definition"), "shop");

    let index = SqliteIndex::open("product", &database, spec())?;
    let facade = IndexFacade::new(InMemoryRepository::new());
    facade.create(&definition)?;

    let report = facade.export(&index, &definition)?;
    assert_eq!(report.exported, 4);
    assert_eq!(report.batches, 2);

    index.connection().execute("DELETE FROM product WHERE id = 3", [])?;
    facade.export(&index, &definition)?;

    assert_eq!(facade.repository().document_ids("shop_product")?, vec![1, 2, 4]);
    // No listener registered, flags stay as they were.
    assert_eq!(index.as_changes_only().unwrap().changed_count()?, 2);
    Ok(())
}

#[test]
fn test_scope_reexports_updated_and_deleted_rows() -> Result<()> {
    let dir = TempDir::new()?;
    let database = dir.path().join("shop.db");
    seed(&database)?;
    let (loader, definition) = product_definition(&dir.path().join("definition"), "shop");

    let registry = IndexRegistry::new(vec![
        Box::new(SqliteIndex::open("product", &database, spec())?) as Box<dyn Index>,
    ])?;
    let facade = IndexFacade::new(InMemoryRepository::new());
    facade.create(&definition)?;
    facade.export(registry.index_by_name("product")?, &definition)?;

    // A unit of work touching two rows.
    let conn = Connection::open(&database)?;
    let mut scope = ExportScope::new();
    conn.execute("UPDATE product SET name = 'claw hammer' WHERE id = 2", [])?;
    scope.scheduler("product").schedule_row_id(2);
    conn.execute("DELETE FROM product WHERE id = 1", [])?;
    scope.scheduler("product").schedule_row_id(1);

    assert_eq!(scope.flush(&facade, &registry, &loader)?, 1);

    assert_eq!(facade.repository().document_ids("shop_product")?, vec![2, 3, 4]);
    let hammer = facade.repository().document("shop_product", 2).unwrap();
    assert_eq!(hammer["name"], Value::from("claw hammer"));
    Ok(())
}

#[test]
fn test_flag_reset_ignores_other_indexes() -> Result<()> {
    let dir = TempDir::new()?;
    let database = dir.path().join("shop.db");
    seed(&database)?;

    let mut flag_reset = ChangedFlagReset::open(&database)?;
    flag_reset.watch("product", &TableSpec::new("product"))?;
    assert!(!flag_reset.is_watching("product"));

    flag_reset.watch("product", &spec())?;
    flag_reset.on_index_exported(&IndexExportedEvent {
        index_name: "category".to_string(),
    })?;

    assert_eq!(changed_flags(&database)?, vec![(1, 0), (2, 1), (3, 0), (4, 1)]);
    Ok(())
}
