//! Stock ledger: per-batch inventory
//!
//! Quantities only move through journal postings (`post_movement`), so every
//! change here leaves a matching movement row behind.

use crate::{
    config::PharmacyConfig,
    db::{HospitalStore, StoreTransaction},
    models::{
        AddStockRequest, AdjustStockRequest, MovementEntry, MovementType, PharmacyStock,
        StockBatchRow, StockMovement,
    },
    services::finish,
    Error, Result,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use validator::Validate;

/// Journal reference for goods received.
pub const PURCHASE_REFERENCE: &str = "STOCK-ADD";
pub const ADJUSTMENT_REFERENCE: &str = "STOCK-ADJ";
pub const WRITE_OFF_REFERENCE: &str = "EXPIRY-WRITE-OFF";

pub struct StockService {
    store: Arc<dyn HospitalStore>,
    policy: PharmacyConfig,
}

impl StockService {
    pub fn new(store: Arc<dyn HospitalStore>, policy: PharmacyConfig) -> Self {
        Self { store, policy }
    }

    /// Receive a new batch. The batch row and its purchase movement are
    /// written together.
    pub async fn add_stock(&self, request: AddStockRequest) -> Result<PharmacyStock> {
        request.validate()?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let outcome = self.add_stock_in(tx.as_mut(), &request, now).await;
        let batch = finish(tx, outcome).await?;

        tracing::info!(
            stock_id = batch.id,
            medication_id = batch.medication_id,
            batch_number = %batch.batch_number,
            quantity = batch.quantity,
            expiry_date = %batch.expiry_date,
            "Stock received"
        );
        Ok(batch)
    }

    async fn add_stock_in(
        &self,
        tx: &mut dyn StoreTransaction,
        request: &AddStockRequest,
        now: DateTime<Utc>,
    ) -> Result<PharmacyStock> {
        if tx.find_medication(request.medication_id).await?.is_none() {
            return Err(Error::not_found("Medication", request.medication_id));
        }
        if request.expiry_date < now.date_naive() {
            tracing::warn!(
                medication_id = request.medication_id,
                batch_number = %request.batch_number,
                expiry_date = %request.expiry_date,
                "Rejected expired batch"
            );
            return Err(Error::ExpiredBatch {
                batch_number: request.batch_number.clone(),
                expiry_date: request.expiry_date,
            });
        }

        let batch = tx
            .insert_stock_batch(
                &StockBatchRow {
                    medication_id: request.medication_id,
                    batch_number: request.batch_number.clone(),
                    expiry_date: request.expiry_date,
                    location: request.location.clone(),
                    cost_price: request.cost_price,
                    selling_price: request.selling_price,
                    reorder_level: request
                        .reorder_level
                        .unwrap_or(self.policy.default_reorder_level),
                    notes: request.notes.clone(),
                },
                now,
            )
            .await?;

        let (batch, _) = tx
            .post_movement(
                batch.id,
                &MovementEntry {
                    movement_type: MovementType::Purchase,
                    quantity: request.quantity,
                    reference: PURCHASE_REFERENCE.to_string(),
                    reason: None,
                    performed_by: None,
                    performed_at: now,
                },
            )
            .await?;
        Ok(batch)
    }

    /// Non-empty batches of a medication, earliest expiry first.
    pub async fn get_available_stock(&self, medication_id: i64) -> Result<Vec<PharmacyStock>> {
        self.store.list_available_stock(medication_id).await
    }

    /// Batches at or below their reorder level.
    pub async fn get_low_stock_alerts(&self) -> Result<Vec<PharmacyStock>> {
        self.store.list_low_stock().await
    }

    /// Correct a batch quantity by a signed delta (counting errors, breakage).
    pub async fn adjust_stock(
        &self,
        stock_id: i64,
        request: AdjustStockRequest,
    ) -> Result<StockMovement> {
        request.validate()?;
        if request.quantity_delta == 0 {
            return Err(Error::Validation(
                "adjustment quantity must not be zero".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = adjust_in(tx.as_mut(), stock_id, &request, Utc::now()).await;
        let movement = finish(tx, outcome).await?;

        tracing::info!(
            stock_id,
            medication_id = movement.medication_id,
            batch_number = %movement.batch_number,
            delta = movement.quantity,
            "Stock adjusted"
        );
        Ok(movement)
    }

    /// Zero every non-empty batch that expired before `today`, one `expired`
    /// movement per batch, all in one transaction.
    pub async fn write_off_expired(
        &self,
        today: NaiveDate,
        performed_by: i64,
    ) -> Result<Vec<StockMovement>> {
        let mut tx = self.store.begin().await?;
        let outcome = write_off_in(tx.as_mut(), today, performed_by, Utc::now()).await;
        let movements = finish(tx, outcome).await?;

        for movement in &movements {
            tracing::info!(
                stock_id = movement.stock_id,
                medication_id = movement.medication_id,
                batch_number = %movement.batch_number,
                quantity = movement.quantity,
                "Expired stock written off"
            );
        }
        Ok(movements)
    }
}

async fn adjust_in(
    tx: &mut dyn StoreTransaction,
    stock_id: i64,
    request: &AdjustStockRequest,
    now: DateTime<Utc>,
) -> Result<StockMovement> {
    if tx.lock_stock(stock_id).await?.is_none() {
        return Err(Error::not_found("Stock batch", stock_id));
    }
    let (_, movement) = tx
        .post_movement(
            stock_id,
            &MovementEntry {
                movement_type: MovementType::Adjustment,
                quantity: request.quantity_delta,
                reference: ADJUSTMENT_REFERENCE.to_string(),
                reason: Some(request.reason.clone()),
                performed_by: Some(request.performed_by),
                performed_at: now,
            },
        )
        .await?;
    Ok(movement)
}

async fn write_off_in(
    tx: &mut dyn StoreTransaction,
    today: NaiveDate,
    performed_by: i64,
    now: DateTime<Utc>,
) -> Result<Vec<StockMovement>> {
    let expired = tx.lock_expired_batches(today).await?;
    let mut movements = Vec::with_capacity(expired.len());
    for batch in expired {
        let (_, movement) = tx
            .post_movement(
                batch.id,
                &MovementEntry {
                    movement_type: MovementType::Expired,
                    quantity: -batch.quantity,
                    reference: WRITE_OFF_REFERENCE.to_string(),
                    reason: Some(format!("expired on {}", batch.expiry_date)),
                    performed_by: Some(performed_by),
                    performed_at: now,
                },
            )
            .await?;
        movements.push(movement);
    }
    Ok(movements)
}
