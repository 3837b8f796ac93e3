//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use addonmatch_core::net::{
    CatalogClient, HttpMethod, HttpRequest, NetworkConfig, NetworkError, Transport,
};

/// Scripted upstream response.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    /// Never completes; the client's timeout has to fire.
    Hang,
}

#[derive(Debug)]
struct Route {
    method: HttpMethod,
    path: String,
    reply: Reply,
}

/// In-memory transport. Routes match on method and URL path suffix; the
/// most recently added route wins. Unrouted requests get a 404.
#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, method: HttpMethod, path: &str, reply: Reply) {
        self.routes.lock().unwrap().push(Route {
            method,
            path: path.to_string(),
            reply,
        });
    }

    /// Delay every response by `delay` (tokio time, so paused clocks apply).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| url_path(&r.url).ends_with(path))
            .count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Bodies of every request sent to `path`, in order.
    pub fn bodies_to(&self, path: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| url_path(&r.url).ends_with(path))
            .filter_map(|r| r.body.clone())
            .collect()
    }

    fn reply_for(&self, request: &HttpRequest) -> Option<Reply> {
        let path = url_path(&request.url);
        self.routes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == request.method && path.ends_with(&r.path))
            .map(|r| r.reply.clone())
    }
}

fn url_path(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<String, NetworkError> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.reply_for(&request) {
            Some(Reply::Json(value)) => Ok(value.to_string()),
            Some(Reply::Status(status)) => Err(NetworkError::Status {
                status,
                url: request.url,
            }),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(NetworkError::Status {
                status: 404,
                url: request.url,
            }),
        }
    }
}

pub fn network_config(failure_threshold: u32) -> NetworkConfig {
    NetworkConfig {
        http_timeout: Duration::from_secs(10),
        reset_timeout: Duration::from_secs(30),
        failure_threshold,
        cache_ttl: Duration::from_secs(30),
    }
}

pub fn client(name: &str, transport: Arc<FakeTransport>, config: NetworkConfig) -> CatalogClient {
    CatalogClient::new(name, transport, config)
}

pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// A catalog file record in wire format.
pub fn wire_file(
    id: u64,
    version: &str,
    release_type: u8,
    flavor: &str,
    date: &str,
    modules: &[(&str, Value)],
) -> Value {
    json!({
        "id": id,
        "displayName": version,
        "releaseType": release_type,
        "gameVersionFlavor": flavor,
        "isAlternate": false,
        "downloadUrl": format!("https://cdn.test/{id}.zip"),
        "fileDate": date,
        "modules": modules
            .iter()
            .map(|(folder, fp)| json!({"foldername": folder, "fingerprint": fp}))
            .collect::<Vec<_>>(),
        "dependencies": [],
    })
}

/// A catalog add-on record in wire format.
pub fn wire_addon(id: u64, name: &str, files: Vec<Value>) -> Value {
    json!({
        "id": id,
        "name": name,
        "summary": format!("{name} summary"),
        "websiteUrl": format!("https://catalog.test/addons/{id}"),
        "downloadCount": 1000.0,
        "authors": [{"name": "author"}],
        "attachments": [{"isDefault": true, "thumbnailUrl": "https://img.test/t.png", "url": "https://img.test/s.png"}],
        "latestFiles": files,
    })
}
