//! Blocking HTTP wire layer for Elasticsearch-compatible engines

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::IndexRepository;
use crate::elasticsearch::definition::IndexDefinition;
use crate::elasticsearch::errors::EngineError;
use crate::elasticsearch::index::{ExportRows, RowId};

/// How many failed bulk items are quoted in an error message
const MAX_REPORTED_FAILURES: usize = 5;

/// Default pause between two `_tasks` polls while a reindex runs
const DEFAULT_REINDEX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Repository talking to the engine's REST API
pub struct ElasticsearchRepository {
    base_url: String,
    client: Client,
    reindex_poll_interval: Duration,
}

/// Response of `_bulk`
#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<BTreeMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Response of `_reindex?wait_for_completion=false`
#[derive(Debug, Deserialize)]
struct ReindexStarted {
    task: String,
}

/// Response of `GET _tasks/{task}`
#[derive(Debug, Deserialize)]
struct TaskStatus {
    completed: bool,
    #[serde(default)]
    response: Option<ReindexResponse>,
    #[serde(default)]
    error: Option<Value>,
}

/// Final result of a reindex task
#[derive(Debug, Default, Deserialize)]
struct ReindexResponse {
    #[serde(default)]
    failures: Vec<Value>,
}

impl ElasticsearchRepository {
    /// Create a repository for the engine at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            client,
            reindex_poll_interval: DEFAULT_REINDEX_POLL_INTERVAL,
        })
    }

    /// Pause between task status polls while waiting for a reindex
    pub fn with_reindex_poll_interval(mut self, interval: Duration) -> Self {
        self.reindex_poll_interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Physical indices the alias points at; empty when the alias is missing
    fn alias_targets(&self, alias: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url(&format!("_alias/{alias}")))
            .send()
            .with_context(|| format!("Failed to look up alias {alias}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let body: BTreeMap<String, Value> = ensure_success(response, "Alias lookup")?
            .json()
            .context("Unexpected alias lookup response")?;
        Ok(body.into_keys().collect())
    }

    /// Poll `_tasks/{task}` until the engine reports completion
    fn wait_for_task(&self, task: &str) -> Result<TaskStatus> {
        loop {
            let response = self
                .client
                .get(self.url(&format!("_tasks/{task}")))
                .send()
                .with_context(|| format!("Failed to poll task {task}"))?;

            let status: TaskStatus = ensure_success(response, "Task status")?
                .json()
                .context("Unexpected task status response")?;
            if status.completed {
                return Ok(status);
            }
            std::thread::sleep(self.reindex_poll_interval);
        }
    }

    fn cancel_task(&self, task: &str) {
        let result = self
            .client
            .post(self.url(&format!("_tasks/{task}/_cancel")))
            .send()
            .map_err(anyhow::Error::from)
            .and_then(|response| ensure_success(response, "Cancel task"));
        if let Err(err) = result {
            warn!(task = %task, error = %format!("{err:#}"), "failed to cancel reindex task");
        }
    }

    fn send_bulk(&self, index_name: &str, body: String) -> Result<BulkResponse> {
        let response = self
            .client
            .post(self.url(&format!("{index_name}/_bulk")))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .with_context(|| format!("Failed to send bulk request to {index_name}"))?;

        ensure_success(response, "Bulk request")?
            .json()
            .context("Unexpected bulk response")
    }
}

impl IndexRepository for ElasticsearchRepository {
    fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        let index_name = definition.versioned_index_name()?;
        let response = self
            .client
            .put(self.url(&index_name))
            .json(&definition.definition()?)
            .send()
            .with_context(|| format!("Failed to create index {index_name}"))?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().unwrap_or_default();
            if body.contains("resource_already_exists_exception") {
                return Err(EngineError::IndexAlreadyExists(index_name).into());
            }
            return Err(EngineError::Request {
                operation: "Create index",
                status: StatusCode::BAD_REQUEST.as_u16(),
                body,
            }
            .into());
        }

        ensure_success(response, "Create index")?;
        Ok(())
    }

    fn create_alias(&self, definition: &IndexDefinition) -> Result<()> {
        let alias = definition.index_alias();
        let target = definition.versioned_index_name()?;

        let mut actions: Vec<Value> = self
            .alias_targets(&alias)?
            .into_iter()
            .filter(|current| *current != target)
            .map(|current| json!({ "remove": { "index": current, "alias": alias } }))
            .collect();
        actions.push(json!({ "add": { "index": target, "alias": alias } }));

        let response = self
            .client
            .post(self.url("_aliases"))
            .json(&json!({ "actions": actions }))
            .send()
            .with_context(|| format!("Failed to point alias {alias} at {target}"))?;

        ensure_success(response, "Update aliases")?;
        Ok(())
    }

    fn find_current_index_name_for_alias(&self, alias: &str) -> Result<String> {
        self.alias_targets(alias)?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NoAlias(alias.to_string()).into())
    }

    fn bulk_update(&self, index_name: &str, rows: &ExportRows) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let response = self.send_bulk(index_name, bulk_index_body(rows)?)?;
        check_bulk_items(index_name, response, false)
    }

    fn delete_ids(&self, index_name: &str, ids: &[RowId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let response = self.send_bulk(index_name, bulk_delete_body(ids)?)?;
        check_bulk_items(index_name, response, true)
    }

    fn delete_not_present(&self, definition: &IndexDefinition, present_ids: &[RowId]) -> Result<()> {
        let alias = definition.index_alias();
        let ids: Vec<String> = present_ids.iter().map(RowId::to_string).collect();
        let query = json!({
            "query": {
                "bool": {
                    "must_not": { "ids": { "values": ids } }
                }
            }
        });

        let response = self
            .client
            .post(self.url(&format!("{alias}/_delete_by_query?conflicts=proceed")))
            .json(&query)
            .send()
            .with_context(|| format!("Failed to prune documents in {alias}"))?;

        ensure_success(response, "Delete by query")?;
        Ok(())
    }

    /// Runs as an engine-side task. Only the short start and status requests
    /// are bound by the client timeout, so a reindex may take arbitrarily long.
    fn reindex(&self, source_index: &str, target_index: &str) -> Result<()> {
        let body = json!({
            "source": { "index": source_index },
            "dest": { "index": target_index }
        });

        let response = self
            .client
            .post(self.url("_reindex?wait_for_completion=false&refresh=true"))
            .json(&body)
            .send()
            .with_context(|| format!("Failed to reindex {source_index} into {target_index}"))?;

        let started: ReindexStarted = ensure_success(response, "Reindex")?
            .json()
            .context("Unexpected reindex response")?;
        debug!(task = %started.task, source = source_index, target = target_index, "reindex started");

        let status = match self.wait_for_task(&started.task) {
            Ok(status) => status,
            Err(err) => {
                // Stop the engine-side task before the caller discards the target index.
                self.cancel_task(&started.task);
                return Err(err.context(format!(
                    "Failed to follow reindex of {source_index} into {target_index}"
                )));
            }
        };

        let mut reasons: Vec<String> = status.error.iter().map(Value::to_string).collect();
        reasons.extend(
            status
                .response
                .unwrap_or_default()
                .failures
                .iter()
                .map(Value::to_string),
        );

        if !reasons.is_empty() {
            return Err(EngineError::ReindexFailure {
                source_index: source_index.to_string(),
                target_index: target_index.to_string(),
                reasons: summarize(reasons.into_iter()),
            }
            .into());
        }
        Ok(())
    }

    fn delete_index(&self, index_name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(index_name))
            .send()
            .with_context(|| format!("Failed to delete index {index_name}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EngineError::IndexNotFound(index_name.to_string()).into());
        }

        ensure_success(response, "Delete index")?;
        Ok(())
    }
}

/// Turn non-2xx responses into [`EngineError::Request`]
fn ensure_success(response: Response, operation: &'static str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(EngineError::Request {
        operation,
        status: status.as_u16(),
        body,
    }
    .into())
}

/// NDJSON body with one `index` action per row
pub(crate) fn bulk_index_body(rows: &ExportRows) -> Result<String> {
    let mut body = String::new();
    for (id, document) in rows {
        body.push_str(&serde_json::to_string(&json!({ "index": { "_id": id.to_string() } }))?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

/// NDJSON body with one `delete` action per id
pub(crate) fn bulk_delete_body(ids: &[RowId]) -> Result<String> {
    let mut body = String::new();
    for id in ids {
        body.push_str(&serde_json::to_string(&json!({ "delete": { "_id": id.to_string() } }))?);
        body.push('\n');
    }
    Ok(body)
}

fn check_bulk_items(index_name: &str, response: BulkResponse, missing_ok: bool) -> Result<()> {
    if !response.errors {
        return Ok(());
    }

    let failures: Vec<String> = response
        .items
        .iter()
        .flat_map(|item| item.values())
        .filter(|item| item.status >= 300)
        .filter(|item| !(missing_ok && item.status == StatusCode::NOT_FOUND.as_u16()))
        .map(|item| {
            let reason = item
                .error
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| format!("status {}", item.status));
            format!("{}: {}", item.id.as_deref().unwrap_or("?"), reason)
        })
        .collect();

    if failures.is_empty() {
        return Ok(());
    }

    Err(EngineError::BulkFailure {
        index: index_name.to_string(),
        failed: failures.len(),
        reasons: summarize(failures.into_iter()),
    }
    .into())
}

fn summarize(reasons: impl Iterator<Item = String>) -> String {
    reasons
        .take(MAX_REPORTED_FAILURES)
        .collect::<Vec<_>>()
        .join("; ")
}
