//! Shared fixtures for integration tests
#![allow(dead_code)]

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;

use index_sync::elasticsearch::{
    Document, ExportRows, Index, IndexDefinition, IndexDefinitionLoader, RowId, SupportsChangesOnly,
};

// ============================================================================
// Definitions on disk
// ============================================================================

/// Write `{dir}/{index_name}/1.json`
pub fn write_definition(dir: &Path, index_name: &str, mapping: &Value) {
    let index_dir = dir.join(index_name);
    std::fs::create_dir_all(&index_dir).unwrap();
    std::fs::write(index_dir.join("1.json"), serde_json::to_string_pretty(mapping).unwrap()).unwrap();
}

pub fn product_mapping(version: u32) -> Value {
    json!({
        "settings": { "number_of_shards": 1 },
        "mappings": {
            "properties": {
                "name": { "type": "text" },
                "version": { "type": "keyword", "meta": { "v": version.to_string() } }
            }
        }
    })
}

/// Loader over a fresh directory holding a `product` definition
pub fn product_definition(dir: &Path, prefix: &str) -> (IndexDefinitionLoader, IndexDefinition) {
    write_definition(dir, "product", &product_mapping(1));
    let loader = IndexDefinitionLoader::new(dir, prefix);
    let definition = loader.index_definition("product");
    (loader, definition)
}

// ============================================================================
// In-memory row source
// ============================================================================

pub fn doc(name: &str) -> Document {
    let mut document = Map::new();
    document.insert("name".to_string(), Value::String(name.to_string()));
    document
}

/// Row source backed by a map, counting how the facade drives it
pub struct VecIndex {
    name: String,
    rows: RefCell<BTreeMap<RowId, Document>>,
    batch_size: usize,
    changed: Option<RefCell<BTreeSet<RowId>>>,
    pub batch_calls: Cell<usize>,
    pub id_calls: RefCell<Vec<Vec<RowId>>>,
    pub cache_clears: Cell<usize>,
    pub logging: RefCell<Vec<bool>>,
    pub query_logging_enabled: Cell<bool>,
}

impl VecIndex {
    pub fn new(name: &str, ids: impl IntoIterator<Item = RowId>, batch_size: usize) -> Self {
        Self {
            name: name.to_string(),
            rows: RefCell::new(ids.into_iter().map(|id| (id, doc(&format!("row {id}")))).collect()),
            batch_size,
            changed: None,
            batch_calls: Cell::new(0),
            id_calls: RefCell::new(Vec::new()),
            cache_clears: Cell::new(0),
            logging: RefCell::new(Vec::new()),
            query_logging_enabled: Cell::new(true),
        }
    }

    /// Enable changed-only export with the given flagged ids
    pub fn with_changed(mut self, ids: impl IntoIterator<Item = RowId>) -> Self {
        self.changed = Some(RefCell::new(ids.into_iter().collect()));
        self
    }

    pub fn remove_row(&self, id: RowId) {
        self.rows.borrow_mut().remove(&id);
    }

    pub fn set_row(&self, id: RowId, name: &str) {
        self.rows.borrow_mut().insert(id, doc(name));
    }
}

impl Index for VecIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_count(&self) -> Result<u64> {
        Ok(self.rows.borrow().len() as u64)
    }

    fn export_data_for_batch(&self, last_processed_id: RowId, batch_size: usize) -> Result<ExportRows> {
        self.batch_calls.set(self.batch_calls.get() + 1);
        Ok(self
            .rows
            .borrow()
            .range(last_processed_id + 1..)
            .take(batch_size)
            .map(|(id, document)| (*id, document.clone()))
            .collect())
    }

    fn export_data_for_ids(&self, ids: &[RowId]) -> Result<ExportRows> {
        self.id_calls.borrow_mut().push(ids.to_vec());
        let rows = self.rows.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|document| (*id, document.clone())))
            .collect())
    }

    fn export_batch_size(&self) -> usize {
        self.batch_size
    }

    fn clear_cache(&self) {
        self.cache_clears.set(self.cache_clears.get() + 1);
    }

    fn set_query_logging(&self, enabled: bool) {
        self.logging.borrow_mut().push(enabled);
        self.query_logging_enabled.set(enabled);
    }

    fn query_logging(&self) -> bool {
        self.query_logging_enabled.get()
    }

    fn as_changes_only(&self) -> Option<&dyn SupportsChangesOnly> {
        self.changed.as_ref().map(|_| self as &dyn SupportsChangesOnly)
    }
}

impl SupportsChangesOnly for VecIndex {
    fn changed_count(&self) -> Result<u64> {
        Ok(self.changed.as_ref().map_or(0, |ids| ids.borrow().len()) as u64)
    }

    fn changed_ids_for_batch(&self, last_processed_id: RowId, batch_size: usize) -> Result<Vec<RowId>> {
        let Some(changed) = &self.changed else {
            return Ok(Vec::new());
        };
        Ok(changed
            .borrow()
            .range(last_processed_id + 1..)
            .take(batch_size)
            .copied()
            .collect())
    }
}

// ============================================================================
// Mock engine (one request per connection)
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    /// Body split into NDJSON lines
    pub fn ndjson(&self) -> Vec<Value> {
        self.body
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

pub struct MockEngine {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockEngine {
    /// Serve every request with `responder`, recording it first
    pub fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, Value) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                recorded.lock().push(request.clone());
                let (status, body) = responder(&request);
                write_response(&mut stream, status, &body.to_string());
            }
        });

        Self { url, requests }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut header_buf = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];
    while !header_buf.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return None,
            Ok(_) => header_buf.push(byte[0]),
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(&header_buf) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return None,
    }

    let content_length = request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("Content-Length"))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).ok()?;

    Some(RecordedRequest {
        method: request.method.unwrap_or("").to_string(),
        path: request.path.unwrap_or("/").to_string(),
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let head = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body.as_bytes());
    let _ = stream.flush();
}
