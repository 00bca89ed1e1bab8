//! Test harness: the full router wired against an in-memory store.

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use futures::future::BoxFuture;
use his::{
    api::create_router,
    config::Config,
    db::{HospitalStore, InMemoryStore},
    state::AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: InMemoryStore,
}

pub async fn with_test_app<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(&'a TestApp) -> BoxFuture<'a, anyhow::Result<()>>,
{
    with_test_app_with_config(|_| {}, f).await
}

pub async fn with_test_app_with_config<C, F>(configure: C, f: F) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: for<'a> FnOnce(&'a TestApp) -> BoxFuture<'a, anyhow::Result<()>>,
{
    let mut config = Config::default();
    configure(&mut config);

    let store = InMemoryStore::new();
    let shared: Arc<dyn HospitalStore> = Arc::new(store.clone());
    let state = AppState::with_store(config, shared);
    let router = create_router(state.clone());

    let app = TestApp {
        router,
        state,
        store,
    };
    f(&app).await
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        self.request_with_extra_headers(method, path, body, &[])
            .await
    }

    pub async fn request_with_extra_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, headers, value))
    }

    /// POST and expect 201, returning the created record.
    pub async fn create(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let (status, _, value) = self.request(Method::POST, path, Some(body)).await?;
        assert_status(status, StatusCode::CREATED, path);
        Ok(value)
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let (status, _, value) = self.request(Method::GET, path, None).await?;
        assert_status(status, StatusCode::OK, path);
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub async fn seed_ward(&self, name: &str) -> anyhow::Result<i64> {
        let ward = self
            .create("/api/v1/wards", json!({ "name": name, "department": "Medicine" }))
            .await?;
        Ok(id_of(&ward))
    }

    pub async fn seed_room(&self, ward_id: i64, room_number: &str) -> anyhow::Result<i64> {
        let room = self
            .create(
                "/api/v1/rooms",
                json!({ "ward_id": ward_id, "room_number": room_number }),
            )
            .await?;
        Ok(id_of(&room))
    }

    pub async fn seed_bed(&self, room_id: i64, bed_number: &str) -> anyhow::Result<i64> {
        let bed = self
            .create(
                "/api/v1/beds",
                json!({ "room_id": room_id, "bed_number": bed_number }),
            )
            .await?;
        Ok(id_of(&bed))
    }

    pub async fn admit(&self, patient_id: i64, bed_id: i64) -> anyhow::Result<(StatusCode, Value)> {
        let (status, _, body) = self
            .request(
                Method::POST,
                "/api/v1/admissions",
                Some(json!({
                    "patient_id": patient_id,
                    "bed_id": bed_id,
                    "diagnosis": "Community acquired pneumonia",
                    "admitting_doctor_id": 900,
                })),
            )
            .await?;
        Ok((status, body))
    }

    pub async fn bed_status(&self, bed_id: i64) -> anyhow::Result<String> {
        let bed = self
            .store
            .get_bed(bed_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("bed {bed_id} missing"))?;
        Ok(bed.status.to_string())
    }

    pub async fn seed_medication(&self, name: &str) -> anyhow::Result<i64> {
        let medication = self
            .create(
                "/api/v1/medications",
                json!({ "name": name, "form": "capsule", "strength": "500mg" }),
            )
            .await?;
        Ok(id_of(&medication))
    }

    pub async fn seed_prescription(
        &self,
        patient_id: i64,
        medication_id: i64,
        quantity: i32,
    ) -> anyhow::Result<i64> {
        let prescription = self
            .create(
                "/api/v1/prescriptions",
                json!({
                    "patient_id": patient_id,
                    "medication_id": medication_id,
                    "quantity": quantity,
                }),
            )
            .await?;
        Ok(id_of(&prescription))
    }

    /// Receive a batch expiring `days_from_now` days in the future.
    pub async fn seed_stock(
        &self,
        medication_id: i64,
        batch_number: &str,
        quantity: i32,
        days_from_now: i64,
    ) -> anyhow::Result<i64> {
        let batch = self
            .create(
                "/api/v1/pharmacy/stock",
                json!({
                    "medication_id": medication_id,
                    "quantity": quantity,
                    "batch_number": batch_number,
                    "expiry_date": days_ahead(days_from_now),
                    "cost_price": "1.20",
                    "selling_price": "2.50",
                }),
            )
            .await?;
        Ok(id_of(&batch))
    }

    pub async fn dispense(
        &self,
        prescription_id: i64,
        patient_id: i64,
        medication_id: i64,
        quantity: i32,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let (status, _, body) = self
            .request(
                Method::POST,
                "/api/v1/pharmacy/dispense",
                Some(json!({
                    "prescription_id": prescription_id,
                    "patient_id": patient_id,
                    "medication_id": medication_id,
                    "quantity": quantity,
                    "dispensed_by": 42,
                })),
            )
            .await?;
        Ok((status, body))
    }

    /// Quantity on hand per batch of a medication, by stock id.
    pub async fn batch_quantity(&self, medication_id: i64, stock_id: i64) -> anyhow::Result<i32> {
        let batches = self.store.list_batches(medication_id).await?;
        batches
            .into_iter()
            .find(|b| b.id == stock_id)
            .map(|b| b.quantity)
            .ok_or_else(|| anyhow::anyhow!("stock batch {stock_id} missing"))
    }
}

pub fn id_of(value: &Value) -> i64 {
    value["id"]
        .as_i64()
        .unwrap_or_else(|| panic!("expected an id in {value}"))
}

pub fn error_code(value: &Value) -> &str {
    value["error"]["code"].as_str().unwrap_or("")
}

pub fn days_ahead(days: i64) -> NaiveDate {
    (Utc::now() + Duration::days(days)).date_naive()
}

pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(actual, expected, "unexpected status for {context}");
}
