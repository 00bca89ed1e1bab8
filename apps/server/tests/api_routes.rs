#[allow(unused)]
mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;
use support::*;
use tokio_test::assert_ok;

#[tokio::test]
async fn health_reports_store_status() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _, body) = assert_ok!(app.request(Method::GET, "/health", None).await);
            assert_status(status, StatusCode::OK, "health");
            assert_eq!(body["status"], "ok");
            assert_eq!(body["store"]["backend"], "memory");
            assert!(body["version"].is_string());
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn security_headers_are_present() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (_, headers, _) = app.request(Method::GET, "/api/v1/wards", None).await?;

            for (name, expected) in [
                ("x-content-type-options", "nosniff"),
                ("x-frame-options", "DENY"),
                ("referrer-policy", "no-referrer"),
                ("content-security-policy", "default-src 'none'"),
                ("cache-control", "no-store"),
            ] {
                let got = headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                assert_eq!(got, expected, "missing/incorrect header '{}'", name);
            }
            assert!(headers.get("strict-transport-security").is_none());

            let (_, headers, _) = app
                .request_with_extra_headers(
                    Method::GET,
                    "/health",
                    None,
                    &[("x-forwarded-proto", "https")],
                )
                .await?;
            assert!(headers.get("strict-transport-security").is_some());
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn request_ids_are_echoed_or_generated() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (_, headers, _) = app
                .request_with_extra_headers(
                    Method::GET,
                    "/health",
                    None,
                    &[("x-request-id", "ward-round-17")],
                )
                .await?;
            assert_eq!(
                headers.get("x-request-id").and_then(|v| v.to_str().ok()),
                Some("ward-round-17")
            );

            let (_, headers, _) = app.request(Method::GET, "/health", None).await?;
            let generated = headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            assert_eq!(generated.len(), 36, "expected a uuid, got '{generated}'");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn cors_only_answers_configured_origins() -> anyhow::Result<()> {
    with_test_app_with_config(
        |config| config.server.cors_origins = vec!["https://his.example".to_string()],
        |app| {
            Box::pin(async move {
                let (_, headers, _) = app
                    .request_with_extra_headers(
                        Method::GET,
                        "/health",
                        None,
                        &[("origin", "https://evil.example")],
                    )
                    .await?;
                assert!(headers.get("access-control-allow-origin").is_none());

                let (_, headers, _) = app
                    .request_with_extra_headers(
                        Method::GET,
                        "/health",
                        None,
                        &[("origin", "https://his.example")],
                    )
                    .await?;
                assert_eq!(
                    headers
                        .get("access-control-allow-origin")
                        .and_then(|v| v.to_str().ok()),
                    Some("https://his.example")
                );
                Ok(())
            })
        },
    )
    .await
}

#[tokio::test]
async fn domain_errors_use_the_structured_body() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _, body) = app.request(Method::GET, "/api/v1/admissions/12", None).await?;
            assert_status(status, StatusCode::NOT_FOUND, "missing admission");
            assert_eq!(error_code(&body), "NOT_FOUND");
            assert_eq!(body["error"]["message"], "Admission 12 not found");

            let (status, _, body) = app
                .request(Method::GET, "/api/v1/admissions/12/discharge-summary", None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "missing summary");
            assert_eq!(error_code(&body), "NOT_FOUND");

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/prescriptions",
                    Some(json!({ "patient_id": 1, "medication_id": 3, "quantity": 1 })),
                )
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "prescription for unknown medication");
            assert_eq!(error_code(&body), "NOT_FOUND");

            let (status, _, body) = app
                .request(Method::GET, "/api/v1/medications/3", None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "missing medication");
            assert_eq!(error_code(&body), "NOT_FOUND");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn storage_failures_do_not_leak_details() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let ward = app.seed_ward("Surgery").await?;
            let room = app.seed_room(ward, "201").await?;
            let bed = app.seed_bed(room, "201-A").await?;

            app.store.fail_on(his::db::StoreOp::Commit, 1);
            let (status, body) = app.admit(10, bed).await?;
            assert_status(status, StatusCode::INTERNAL_SERVER_ERROR, "commit fault");
            assert_eq!(error_code(&body), "INTERNAL");
            assert_eq!(body["error"]["message"], "An internal error occurred");
            assert_eq!(app.bed_status(bed).await?, "Available");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn oversized_bodies_are_rejected() -> anyhow::Result<()> {
    with_test_app_with_config(
        |config| config.server.max_request_body_size = 64,
        |app| {
            Box::pin(async move {
                let (status, _, _) = app
                    .request(
                        Method::POST,
                        "/api/v1/wards",
                        Some(json!({ "name": "W".repeat(256) })),
                    )
                    .await?;
                assert_status(status, StatusCode::PAYLOAD_TOO_LARGE, "large body");

                let (status, _, body) = app.request(Method::GET, "/api/v1/wards", None).await?;
                assert_status(status, StatusCode::OK, "list wards");
                assert_eq!(body, json!([]));
                Ok(())
            })
        },
    )
    .await
}

#[tokio::test]
async fn medications_are_listed_by_name() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            app.seed_medication("Zinc sulfate").await?;
            let amoxicillin = app.seed_medication("Amoxicillin").await?;

            let listed = app.get("/api/v1/medications").await?;
            assert_eq!(listed[0]["name"], "Amoxicillin");
            assert_eq!(listed[1]["name"], "Zinc sulfate");

            let fetched = app.get(&format!("/api/v1/medications/{amoxicillin}")).await?;
            assert_eq!(fetched["active"], true);
            Ok(())
        })
    })
    .await
}
