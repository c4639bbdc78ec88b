//! Mapping migration, status and teardown

mod support;

use anyhow::Result;
use std::collections::BTreeMap;
use tempfile::TempDir;

use index_sync::elasticsearch::{
    EngineError, ExportRows, IndexDefinition, IndexFacade, IndexRepository, InMemoryRepository,
    MigrationOutcome, Operation, RowId,
};
use support::{doc, product_definition, product_mapping, write_definition, VecIndex};

/// Engine whose reindex always fails
struct BrokenReindex(InMemoryRepository);

impl IndexRepository for BrokenReindex {
    fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        self.0.create_index(definition)
    }

    fn create_alias(&self, definition: &IndexDefinition) -> Result<()> {
        self.0.create_alias(definition)
    }

    fn find_current_index_name_for_alias(&self, alias: &str) -> Result<String> {
        self.0.find_current_index_name_for_alias(alias)
    }

    fn bulk_update(&self, index_name: &str, rows: &ExportRows) -> Result<()> {
        self.0.bulk_update(index_name, rows)
    }

    fn delete_ids(&self, index_name: &str, ids: &[RowId]) -> Result<()> {
        self.0.delete_ids(index_name, ids)
    }

    fn delete_not_present(&self, definition: &IndexDefinition, present_ids: &[RowId]) -> Result<()> {
        self.0.delete_not_present(definition, present_ids)
    }

    fn reindex(&self, source_index: &str, target_index: &str) -> Result<()> {
        Err(EngineError::ReindexFailure {
            source_index: source_index.to_string(),
            target_index: target_index.to_string(),
            reasons: "shard failure".to_string(),
        }
        .into())
    }

    fn delete_index(&self, index_name: &str) -> Result<()> {
        self.0.delete_index(index_name)
    }
}

#[test]
fn test_migrate_is_noop_when_mapping_unchanged() -> Result<()> {
    let dir = TempDir::new()?;
    let (_, definition) = product_definition(dir.path(), "shop");
    let facade = IndexFacade::new(InMemoryRepository::new());
    facade.create(&definition)?;
    facade.repository().clear_operations();

    let outcome = facade.migrate(&definition)?;

    assert_eq!(
        outcome,
        MigrationOutcome::UpToDate {
            index: definition.versioned_index_name()?
        }
    );
    assert!(facade.repository().operations().is_empty());
    Ok(())
}

#[test]
fn test_migrate_moves_alias_and_documents() -> Result<()> {
    let dir = TempDir::new()?;
    let (loader, definition) = product_definition(dir.path(), "shop");
    let facade = IndexFacade::new(InMemoryRepository::new());
    facade.create(&definition)?;
    facade.export(&VecIndex::new("product", [1, 2], 100), &definition)?;
    let v1 = definition.versioned_index_name()?;

    write_definition(dir.path(), "product", &product_mapping(2));
    let definition = loader.index_definition("product");
    let v2 = definition.versioned_index_name()?;
    assert_ne!(v1, v2);

    let outcome = facade.migrate(&definition)?;

    assert_eq!(
        outcome,
        MigrationOutcome::Migrated {
            from: v1.clone(),
            to: v2.clone()
        }
    );
    let repository = facade.repository();
    assert_eq!(repository.alias_target("shop_product"), Some(v2.clone()));
    assert_eq!(repository.index_names(), vec![v2.clone()]);
    assert_eq!(repository.document_ids("shop_product")?, vec![1, 2]);
    assert_eq!(repository.mapping(&v2), Some(product_mapping(2)));

    // Second run finds nothing to do.
    assert!(matches!(facade.migrate(&definition)?, MigrationOutcome::UpToDate { .. }));
    Ok(())
}

#[test]
fn test_migrate_falls_back_to_legacy_alias() -> Result<()> {
    let dir = TempDir::new()?;
    let (_, definition) = product_definition(dir.path(), "shop");
    let repository = InMemoryRepository::new();
    repository.create_raw_index("shopproduct_old")?;
    repository.put_alias("shopproduct", "shopproduct_old")?;
    let rows: ExportRows = BTreeMap::from([(7, doc("legacy"))]);
    repository.bulk_update("shopproduct", &rows)?;
    let facade = IndexFacade::new(repository);

    let status = facade.status(&definition)?;
    assert_eq!(status.current.as_deref(), Some("shopproduct_old"));
    assert!(status.needs_migration());

    let outcome = facade.migrate(&definition)?;

    let v1 = definition.versioned_index_name()?;
    assert_eq!(
        outcome,
        MigrationOutcome::Migrated {
            from: "shopproduct_old".to_string(),
            to: v1.clone()
        }
    );
    assert_eq!(facade.repository().alias_target("shop_product"), Some(v1));
    assert_eq!(facade.repository().alias_target("shopproduct"), None);
    assert_eq!(facade.repository().document_ids("shop_product")?, vec![7]);
    Ok(())
}

#[test]
fn test_migrate_without_any_alias_fails_before_writing() -> Result<()> {
    let dir = TempDir::new()?;
    let (_, definition) = product_definition(dir.path(), "shop");
    let facade = IndexFacade::new(InMemoryRepository::new());

    let err = facade.migrate(&definition).unwrap_err();

    assert!(EngineError::is_no_alias(&err));
    assert!(facade.repository().index_names().is_empty());
    Ok(())
}

#[test]
fn test_failed_reindex_discards_new_index() -> Result<()> {
    let dir = TempDir::new()?;
    let (loader, definition) = product_definition(dir.path(), "shop");
    let facade = IndexFacade::new(BrokenReindex(InMemoryRepository::new()));
    facade.create(&definition)?;
    let v1 = definition.versioned_index_name()?;

    write_definition(dir.path(), "product", &product_mapping(2));
    let definition = loader.index_definition("product");
    let v2 = definition.versioned_index_name()?;
    facade.repository().0.clear_operations();

    let err = facade.migrate(&definition).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ReindexFailure { .. })
    ));
    let engine = &facade.repository().0;
    assert_eq!(engine.index_names(), vec![v1.clone()]);
    assert_eq!(engine.alias_target("shop_product"), Some(v1));
    assert_eq!(
        engine.operations(),
        vec![Operation::CreateIndex(v2.clone()), Operation::DeleteIndex(v2)]
    );
    Ok(())
}

#[test]
fn test_status_lifecycle() -> Result<()> {
    let dir = TempDir::new()?;
    let (loader, definition) = product_definition(dir.path(), "");
    let facade = IndexFacade::new(InMemoryRepository::new());

    let status = facade.status(&definition)?;
    assert_eq!(status.alias, "product");
    assert!(!status.is_created());
    assert!(!status.needs_migration());

    facade.create(&definition)?;
    let status = facade.status(&definition)?;
    assert!(status.is_created());
    assert!(!status.needs_migration());

    write_definition(dir.path(), "product", &product_mapping(2));
    let status = facade.status(&loader.index_definition("product"))?;
    assert!(status.needs_migration());
    Ok(())
}

#[test]
fn test_create_twice_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let (_, definition) = product_definition(dir.path(), "shop");
    let facade = IndexFacade::new(InMemoryRepository::new());
    facade.create(&definition)?;

    let err = facade.create(&definition).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::IndexAlreadyExists(_))
    ));
    Ok(())
}

#[test]
fn test_delete_removes_index_behind_alias() -> Result<()> {
    let dir = TempDir::new()?;
    let (_, definition) = product_definition(dir.path(), "shop");
    let facade = IndexFacade::new(InMemoryRepository::new());
    facade.create(&definition)?;

    facade.delete(&definition)?;

    assert!(facade.repository().index_names().is_empty());
    assert_eq!(facade.repository().alias_target("shop_product"), None);
    assert!(facade.delete(&definition).is_err());
    Ok(())
}
