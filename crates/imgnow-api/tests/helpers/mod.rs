//! Test helpers: build the router over in-process backends.
//!
//! Records live in `MemoryFileRepository`, blobs in a temp dir, and videos go through
//! a `MemoryBroker` to an in-process worker pool with a fake transcoder. No external
//! service is needed.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use imgnow_api::constants::API_PREFIX;
use imgnow_api::setup::{routes, services};
use imgnow_broker::{MemoryBroker, MessageBroker, TranscodeRpcClient};
use imgnow_core::{BrokerBackend, Config, RepositoryBackend, StorageBackend};
use imgnow_db::MemoryFileRepository;
use imgnow_processing::Transcoder;
use imgnow_storage::LocalStorage;
use imgnow_worker::TranscodeWorkerPool;
use tempfile::TempDir;
use tokio::time::Instant;

pub const BASE_URL: &str = "http://localhost:8080/media";
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Input that makes [`ReverseTranscoder`] fail.
pub const CORRUPT_VIDEO: &[u8] = b"corrupt";

/// Reverses its input after `delay`; fails on [`CORRUPT_VIDEO`].
pub struct ReverseTranscoder {
    pub delay: Duration,
}

#[async_trait]
impl Transcoder for ReverseTranscoder {
    async fn transcode(&self, mut input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        if input == CORRUPT_VIDEO {
            anyhow::bail!("ffmpeg exited with status 1: invalid data found");
        }
        input.reverse();
        Ok(input)
    }
}

/// Test application: server plus handles on the backends behind it.
pub struct TestApp {
    pub server: TestServer,
    pub repository: Arc<MemoryFileRepository>,
    pub storage: Arc<LocalStorage>,
    _pool: TranscodeWorkerPool,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn test_config() -> Config {
    Config {
        repository_backend: RepositoryBackend::Memory,
        storage_backend: StorageBackend::Local,
        broker_backend: BrokerBackend::Memory,
        local_storage_base_url: Some(BASE_URL.to_string()),
        max_upload_size_bytes: MAX_UPLOAD_BYTES,
        ..Config::default()
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(Duration::ZERO).await
}

/// Setup test app whose transcoder takes `transcode_delay` per job.
pub async fn setup_test_app_with(transcode_delay: Duration) -> TestApp {
    let config = test_config();

    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let storage = Arc::new(
        LocalStorage::new(temp_dir.path(), BASE_URL.to_string())
            .await
            .expect("Failed to create local storage"),
    );
    let repository = Arc::new(MemoryFileRepository::new());

    let broker: Arc<dyn MessageBroker> = Arc::new(MemoryBroker::new());
    let pool = TranscodeWorkerPool::start(
        broker.clone(),
        &config.transcode_queue,
        Arc::new(ReverseTranscoder {
            delay: transcode_delay,
        }),
        2,
    )
    .await
    .expect("Failed to start worker pool");
    let rpc = TranscodeRpcClient::new(
        broker,
        config.transcode_queue.clone(),
        Duration::from_secs(5),
    );

    let (state, _sweeper) =
        services::initialize_services(&config, repository.clone(), storage.clone(), rpc);
    let app = routes::setup_routes(&config, state);

    let server =
        TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        repository,
        storage,
        _pool: pool,
        _temp_dir: temp_dir,
    }
}

/// Path of a file route, e.g. `file_path("abc", "/status")`.
pub fn file_path(identifier: &str, suffix: &str) -> String {
    format!("{}/{}{}", API_PREFIX, identifier, suffix)
}

pub async fn upload(
    client: &TestServer,
    requested_id: Option<&str>,
    file_name: &str,
    mime_type: &str,
    data: Vec<u8>,
) -> TestResponse {
    let part = Part::bytes(bytes::Bytes::from(data))
        .file_name(file_name)
        .mime_type(mime_type);
    let form = MultipartForm::new().add_part("file", part);

    let mut request = client.post(&format!("{}/upload", API_PREFIX));
    if let Some(id) = requested_id {
        request = request.add_query_param("id", id);
    }
    request.multipart(form).await
}

/// Upload and return the assigned identifier, asserting a 202.
pub async fn upload_ok(
    client: &TestServer,
    requested_id: Option<&str>,
    file_name: &str,
    mime_type: &str,
    data: Vec<u8>,
) -> String {
    let response = upload(client, requested_id, file_name, mime_type, data).await;
    assert_eq!(response.status_code(), 202, "{}", response.text());
    let body: serde_json::Value = response.json();
    body["identifier"]
        .as_str()
        .expect("Expected 'identifier' in upload response")
        .to_string()
}

/// How long [`wait_for_status`] keeps polling.
pub const STATUS_WAIT: Duration = Duration::from_secs(60);

/// Poll the status route until it reports `expected`. Returns false once
/// [`STATUS_WAIT`] has passed.
pub async fn wait_for_status(client: &TestServer, identifier: &str, expected: &str) -> bool {
    let deadline = Instant::now() + STATUS_WAIT;
    while Instant::now() < deadline {
        let response = client.get(&file_path(identifier, "/status")).await;
        if response.status_code() == 200 {
            let body: serde_json::Value = response.json();
            if body["status"] == expected {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// Upload a small GIF and wait until it is active.
pub async fn active_image(client: &TestServer, requested_id: Option<&str>) -> String {
    let identifier = upload_ok(
        client,
        requested_id,
        "pixel.gif",
        "image/gif",
        fixtures::create_test_gif(32, 32),
    )
    .await;
    assert!(wait_for_status(client, &identifier, "active").await);
    identifier
}
