//! File API integration tests.
//!
//! Run with: `cargo test -p imgnow-api --test files_test`

mod helpers;

use std::time::Duration;

use chrono::Utc;
use helpers::{
    active_image, file_path, fixtures, setup_test_app, setup_test_app_with, upload, upload_ok,
    wait_for_status, BASE_URL, CORRUPT_VIDEO,
};
use image::GenericImageView;
use imgnow_core::SettingsUpdate;
use imgnow_db::FileRepository;
use imgnow_storage::{storage_key, Storage};
use serde_json::json;

#[tokio::test]
async fn test_upload_responds_pending_with_status_url() {
    let app = setup_test_app().await;
    let client = app.client();

    let response = upload(
        client,
        None,
        "pixel.png",
        "image/png",
        fixtures::create_test_png(8, 8),
    )
    .await;

    assert_eq!(response.status_code(), 202);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "pending");
    let identifier = body["identifier"].as_str().unwrap();
    assert_eq!(identifier.len(), 5);
    assert_eq!(
        body["statusUrl"],
        format!("/api/file/{}/status", identifier)
    );
}

#[tokio::test]
async fn test_image_upload_is_served_after_processing() {
    let app = setup_test_app().await;
    let client = app.client();

    let identifier = active_image(client, None).await;

    let response = client.get(&file_path(&identifier, "")).await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["path"],
        format!("{}/{}", BASE_URL, storage_key(&identifier))
    );

    let info: serde_json::Value = client.get(&file_path(&identifier, "/info")).await.json();
    assert_eq!(info["identifier"], identifier);
    assert_eq!(info["originalName"], "pixel.gif");
    assert_eq!(info["mimeType"], "image/gif");
    assert_eq!(info["mediaKind"], "image");
    assert_eq!(info["status"], "active");
    assert_eq!(info["views"], 1);
    assert_eq!(info["passwordProtected"], false);
    assert!(info.get("path").is_none());
}

#[tokio::test]
async fn test_large_jpeg_is_downscaled() {
    let app = setup_test_app().await;
    let client = app.client();

    let original = fixtures::create_test_jpeg(2400, 1600);
    let original_len = original.len();
    let identifier = upload_ok(client, None, "wide.jpg", "image/jpeg", original).await;
    assert!(wait_for_status(client, &identifier, "active").await);

    let stored = app
        .storage
        .download(&storage_key(&identifier))
        .await
        .unwrap();
    let decoded = image::load_from_memory(&stored).unwrap();
    assert_eq!(decoded.dimensions(), (1920, 1280));

    let info: serde_json::Value = client.get(&file_path(&identifier, "/info")).await.json();
    assert!(stored.len() < original_len);
    // Info reports the upload as received, not the compressed blob.
    assert_eq!(info["mimeType"], "image/jpeg");
    assert_eq!(info["size"], original_len);
}

#[tokio::test]
async fn test_requested_identifier_conflicts_on_second_upload() {
    let app = setup_test_app().await;
    let client = app.client();
    let png = fixtures::create_test_png(8, 8);

    let first = upload(client, Some("abc"), "a.png", "image/png", png.clone()).await;
    assert_eq!(first.status_code(), 202);
    let body: serde_json::Value = first.json();
    assert_eq!(body["identifier"], "abc");

    let second = upload(client, Some("abc"), "b.png", "image/png", png).await;
    assert_eq!(second.status_code(), 409);
    let body: serde_json::Value = second.json();
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(app.repository.len().await, 1);
}

#[tokio::test]
async fn test_invalid_requested_identifiers_rejected() {
    let app = setup_test_app().await;
    let client = app.client();

    for id in ["bad id", "../etc", "upload"] {
        let response = upload(
            client,
            Some(id),
            "a.png",
            "image/png",
            fixtures::create_test_png(8, 8),
        )
        .await;
        assert_eq!(response.status_code(), 400, "identifier {:?}", id);
    }
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_unsupported_media_type_rejected() {
    let app = setup_test_app().await;
    let client = app.client();

    let response = upload(
        client,
        None,
        "doc.pdf",
        "application/pdf",
        b"%PDF-1.4".to_vec(),
    )
    .await;
    assert_eq!(response.status_code(), 415);
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_missing_file_field_rejected() {
    let app = setup_test_app().await;
    let client = app.client();

    let form = axum_test::multipart::MultipartForm::new().add_text("note", "no file here");
    let response = client.post("/api/file/upload").multipart(form).await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let app = setup_test_app().await;
    let client = app.client();

    let response = upload(
        client,
        None,
        "big.mp4",
        "video/mp4",
        vec![0u8; helpers::MAX_UPLOAD_BYTES + 1],
    )
    .await;
    assert_eq!(response.status_code(), 413);
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_video_goes_through_worker_and_is_pending_meanwhile() {
    let app = setup_test_app_with(Duration::from_millis(300)).await;
    let client = app.client();

    let identifier = upload_ok(client, None, "clip.mov", "video/quicktime", b"frames".to_vec()).await;

    let early = client.get(&file_path(&identifier, "")).await;
    assert_eq!(early.status_code(), 425);
    let status: serde_json::Value = client.get(&file_path(&identifier, "/status")).await.json();
    assert_eq!(status["status"], "pending");

    assert!(wait_for_status(client, &identifier, "active").await);

    let info: serde_json::Value = client.get(&file_path(&identifier, "/info")).await.json();
    assert_eq!(info["mimeType"], "video/quicktime");
    assert_eq!(info["size"], b"frames".len());
    assert_eq!(info["mediaKind"], "video");

    let stored = app
        .storage
        .download(&storage_key(&identifier))
        .await
        .unwrap();
    assert_eq!(stored, b"semarf");
}

#[tokio::test]
async fn test_failed_transcode_reports_error() {
    let app = setup_test_app().await;
    let client = app.client();

    let identifier =
        upload_ok(client, None, "broken.mp4", "video/mp4", CORRUPT_VIDEO.to_vec()).await;
    assert!(wait_for_status(client, &identifier, "error").await);

    let response = client.get(&file_path(&identifier, "")).await;
    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn test_password_gate() {
    let app = setup_test_app().await;
    let client = app.client();
    let identifier = active_image(client, None).await;

    let response = client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "password": "s3cret" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["passwordProtected"], true);

    let missing = client.get(&file_path(&identifier, "")).await;
    assert_eq!(missing.status_code(), 403);
    let body: serde_json::Value = missing.json();
    assert_eq!(body["requiresPassword"], true);

    let wrong = client
        .post(&file_path(&identifier, ""))
        .json(&json!({ "password": "guess" }))
        .await;
    assert_eq!(wrong.status_code(), 401);

    let right = client
        .post(&file_path(&identifier, ""))
        .json(&json!({ "password": "s3cret" }))
        .await;
    assert_eq!(right.status_code(), 200);
    let body: serde_json::Value = right.json();
    assert!(body["path"].as_str().unwrap().ends_with(&identifier));

    // Only the successful read counted as a view.
    let info: serde_json::Value = client.get(&file_path(&identifier, "/info")).await.json();
    assert_eq!(info["views"], 1);
}

#[tokio::test]
async fn test_protected_settings_need_current_password() {
    let app = setup_test_app().await;
    let client = app.client();
    let identifier = active_image(client, None).await;

    client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "password": "s3cret" }))
        .await;

    let denied = client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "password": "" }))
        .await;
    assert_eq!(denied.status_code(), 403);

    let cleared = client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "password": "", "currentPassword": "s3cret" }))
        .await;
    assert_eq!(cleared.status_code(), 200);
    let body: serde_json::Value = cleared.json();
    assert_eq!(body["passwordProtected"], false);

    assert_eq!(client.get(&file_path(&identifier, "")).await.status_code(), 200);
}

#[tokio::test]
async fn test_download_threshold_deletes_file() {
    let app = setup_test_app().await;
    let client = app.client();
    let identifier = active_image(client, None).await;

    let response = client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "deletesAfterDownload": true, "downloadsForDeletion": 3 }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["deleteOnDownload"], true);
    assert_eq!(body["downloadThreshold"], 3);

    for expected in 1..=2 {
        let body: serde_json::Value = client
            .put(&file_path(&identifier, "/addDownload"))
            .await
            .json();
        assert_eq!(body["downloads"], expected);
        assert_eq!(body["deleted"], false);
    }

    let third: serde_json::Value = client
        .put(&file_path(&identifier, "/addDownload"))
        .await
        .json();
    assert_eq!(third["downloads"], 3);
    assert_eq!(third["deleted"], true);

    assert_eq!(client.get(&file_path(&identifier, "")).await.status_code(), 404);
    assert_eq!(
        client
            .get(&file_path(&identifier, "/status"))
            .await
            .status_code(),
        404
    );
    assert!(!app
        .storage
        .exists(&storage_key(&identifier))
        .await
        .unwrap());

    // Identifiers are never reused.
    let reuse = upload(
        client,
        Some(&identifier),
        "again.png",
        "image/png",
        fixtures::create_test_png(8, 8),
    )
    .await;
    assert_eq!(reuse.status_code(), 409);
}

#[tokio::test]
async fn test_threshold_without_count_rejected() {
    let app = setup_test_app().await;
    let client = app.client();
    let identifier = active_image(client, None).await;

    let response = client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "deletesAfterVizualizations": true, "vizualizationsForDeletion": 0 }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_expired_file_is_not_found() {
    let app = setup_test_app().await;
    let client = app.client();
    let identifier = active_image(client, None).await;

    app.repository
        .update_settings(
            &identifier,
            &SettingsUpdate {
                expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(client.get(&file_path(&identifier, "")).await.status_code(), 404);

    let record = app.repository.get(&identifier).await.unwrap().unwrap();
    assert!(record.is_deleted());
    assert!(!app
        .storage
        .exists(&storage_key(&identifier))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_expiry_in_the_past_rejected() {
    let app = setup_test_app().await;
    let client = app.client();
    let identifier = active_image(client, None).await;

    let response = client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "expiresIn": -30 }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = client
        .put(&file_path(&identifier, "/settings"))
        .json(&json!({ "expiresIn": 3600 }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn test_unknown_identifier_not_found() {
    let app = setup_test_app().await;
    let client = app.client();

    for suffix in ["", "/status", "/info"] {
        let response = client.get(&file_path("nope1", suffix)).await;
        assert_eq!(response.status_code(), 404, "suffix {:?}", suffix);
    }
    assert_eq!(
        client
            .put(&file_path("nope1", "/addDownload"))
            .await
            .status_code(),
        404
    );
}

#[tokio::test]
async fn test_health() {
    let app = setup_test_app().await;
    let response = app.client().get("/health").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "local");
}
