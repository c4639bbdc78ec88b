//! "Index exported" notification

/// Emitted after a full or changed export of an index completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexExportedEvent {
    pub index_name: String,
}

/// Observer registered on the facade.
pub trait IndexExportedListener {
    fn on_index_exported(&self, event: &IndexExportedEvent) -> anyhow::Result<()>;
}

impl<F> IndexExportedListener for F
where
    F: Fn(&IndexExportedEvent) -> anyhow::Result<()>,
{
    fn on_index_exported(&self, event: &IndexExportedEvent) -> anyhow::Result<()> {
        self(event)
    }
}
