pub mod context;
pub mod create;
pub mod delete;
pub mod export;
pub mod export_ids;
pub mod migrate;
pub mod status;
