//! Booking record store.
//!
//! `PgBookingStore` backs production; `MemoryBookingStore` serves
//! `storage.backend = "memory"` and the test suites.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::booking::{BookingId, BookingRecord, BookingStatus};

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persist a new record. An existing identifier yields `StoreError::Duplicate`.
    async fn insert(&self, record: &BookingRecord) -> Result<(), StoreError>;

    async fn find(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: &BookingId) -> Result<bool, StoreError>;

    async fn health(&self) -> Result<String, StoreError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    booking_id: String,
    name: String,
    email: String,
    phone: String,
    address: String,
    service: String,
    created_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<BookingRow> for BookingRecord {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let booking_id = BookingId::parse(&row.booking_id)
            .ok_or_else(|| StoreError::Corrupt(format!("booking_id {}", row.booking_id)))?;
        let status = BookingStatus::from_str(&row.status).map_err(StoreError::Corrupt)?;
        Ok(BookingRecord {
            booking_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            service: row.service,
            created_at: row.created_at,
            status,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, record: &BookingRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, name, email, phone, address, service, created_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.booking_id.as_str())
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.address)
        .bind(&record.service)
        .bind(record.created_at)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, record.booking_id.as_str()))?;

        tracing::info!(booking_id = %record.booking_id, "Booking persisted");
        Ok(())
    }

    async fn find(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            SELECT booking_id, name, email, phone, address, service, created_at, status
            FROM bookings
            WHERE booking_id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BookingRecord::try_from).transpose()
    }

    async fn delete(&self, id: &BookingId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM bookings WHERE booking_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryBookingStore {
    records: RwLock<HashMap<BookingId, BookingRecord>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, record: &BookingRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.booking_id) {
            return Err(StoreError::Duplicate(record.booking_id.to_string()));
        }
        records.insert(record.booking_id.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, id: &BookingId) -> Result<Option<BookingRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &BookingId) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(format!("memory ({} records)", self.len().await))
    }
}
