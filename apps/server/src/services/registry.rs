//! Resource registry: wards, rooms, beds and bed occupancy

use crate::{
    db::{HospitalStore, StoreTransaction},
    models::{Bed, BedStatus, NewBed, NewRoom, NewWard, Room, Ward, WardOverview},
    services::finish,
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

pub struct RegistryService {
    store: Arc<dyn HospitalStore>,
}

impl RegistryService {
    pub fn new(store: Arc<dyn HospitalStore>) -> Self {
        Self { store }
    }

    pub async fn create_ward(&self, ward: NewWard) -> Result<Ward> {
        ward.validate()?;
        let mut tx = self.store.begin().await?;
        let outcome = tx.insert_ward(&ward, Utc::now()).await;
        let ward = finish(tx, outcome).await?;
        tracing::info!(ward_id = ward.id, name = %ward.name, "Ward created");
        Ok(ward)
    }

    pub async fn create_room(&self, room: NewRoom) -> Result<Room> {
        room.validate()?;
        let mut tx = self.store.begin().await?;
        let outcome = create_room_in(tx.as_mut(), &room).await;
        let room = finish(tx, outcome).await?;
        tracing::info!(room_id = room.id, ward_id = room.ward_id, "Room created");
        Ok(room)
    }

    pub async fn create_bed(&self, bed: NewBed) -> Result<Bed> {
        bed.validate()?;
        let mut tx = self.store.begin().await?;
        let outcome = create_bed_in(tx.as_mut(), &bed).await;
        let bed = finish(tx, outcome).await?;
        tracing::info!(bed_id = bed.id, room_id = bed.room_id, ward_id = bed.ward_id, "Bed created");
        Ok(bed)
    }

    /// Wards with their rooms and beds.
    pub async fn list_wards(&self) -> Result<Vec<WardOverview>> {
        self.store.list_wards().await
    }

    pub async fn list_beds(&self, status: Option<BedStatus>) -> Result<Vec<Bed>> {
        self.store.list_beds(status).await
    }

    pub async fn available_beds(&self) -> Result<Vec<Bed>> {
        self.store.list_beds(Some(BedStatus::Available)).await
    }

    /// Move an unoccupied bed between Available, Maintenance and Cleaning.
    ///
    /// Occupancy is owned by the admission workflows, so `Occupied` is not a
    /// valid target and an occupied bed cannot be touched here.
    pub async fn set_housekeeping_status(&self, bed_id: i64, status: BedStatus) -> Result<Bed> {
        if status == BedStatus::Occupied {
            return Err(Error::Validation(
                "Occupied is set by admission and transfer only".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = housekeeping_in(tx.as_mut(), bed_id, status).await;
        let bed = finish(tx, outcome).await?;
        tracing::info!(bed_id, status = %bed.status, "Bed housekeeping status changed");
        Ok(bed)
    }
}

async fn create_room_in(tx: &mut dyn StoreTransaction, room: &NewRoom) -> Result<Room> {
    if tx.get_ward(room.ward_id).await?.is_none() {
        return Err(Error::not_found("Ward", room.ward_id));
    }
    tx.insert_room(room, Utc::now()).await
}

async fn create_bed_in(tx: &mut dyn StoreTransaction, bed: &NewBed) -> Result<Bed> {
    let room = tx
        .get_room(bed.room_id)
        .await?
        .ok_or_else(|| Error::not_found("Room", bed.room_id))?;
    tx.insert_bed(bed, room.ward_id, Utc::now()).await
}

async fn housekeeping_in(
    tx: &mut dyn StoreTransaction,
    bed_id: i64,
    status: BedStatus,
) -> Result<Bed> {
    let mut bed = tx
        .lock_bed(bed_id)
        .await?
        .ok_or_else(|| Error::not_found("Bed", bed_id))?;
    if bed.status == BedStatus::Occupied {
        return Err(Error::BedUnavailable {
            bed_id,
            status: bed.status,
        });
    }
    tx.set_bed_status(bed_id, status).await?;
    bed.status = status;
    Ok(bed)
}

/// Lock the bed and mark it Occupied. Fails unless it is Available.
pub(crate) async fn occupy_bed(tx: &mut dyn StoreTransaction, bed_id: i64) -> Result<Bed> {
    let mut bed = tx
        .lock_bed(bed_id)
        .await?
        .ok_or_else(|| Error::not_found("Bed", bed_id))?;
    if bed.status != BedStatus::Available {
        tracing::warn!(bed_id, status = %bed.status, "Bed is not available");
        return Err(Error::BedUnavailable {
            bed_id,
            status: bed.status,
        });
    }
    tx.set_bed_status(bed_id, BedStatus::Occupied).await?;
    bed.status = BedStatus::Occupied;
    Ok(bed)
}

pub(crate) async fn vacate_bed(tx: &mut dyn StoreTransaction, bed_id: i64) -> Result<()> {
    tx.set_bed_status(bed_id, BedStatus::Available).await
}
