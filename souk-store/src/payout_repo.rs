use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use souk_core::{CoreError, CoreResult};
use souk_payout::{
    ClaimKind, Payout, PayoutDetail, PayoutPeriod, PayoutRecipient, PayoutRepository, PayoutStatus,
};
use souk_shared::{Money, RecipientKind};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

const PAYOUT_COLUMNS: &str = "id, recipient_kind, recipient_id, period_start, period_end, \
     gross_amount, net_amount, detail, status, payment_reference, paid_at, attempts, notes, \
     processing_started_at, created_at, updated_at";

pub struct PgPayoutRepository {
    pool: PgPool,
}

impl PgPayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PayoutRow {
    id: Uuid,
    recipient_kind: String,
    recipient_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    gross_amount: Decimal,
    net_amount: Decimal,
    detail: Json<PayoutDetail>,
    status: String,
    payment_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    attempts: i32,
    notes: Option<String>,
    processing_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_recipient_kind(s: &str) -> CoreResult<RecipientKind> {
    match s {
        "SUPPLIER" => Ok(RecipientKind::Supplier),
        "DELIVERY_AGENT" => Ok(RecipientKind::DeliveryAgent),
        "DELIVERY_COMPANY" => Ok(RecipientKind::DeliveryCompany),
        other => Err(CoreError::InternalError(format!("unknown recipient kind {}", other))),
    }
}

impl TryFrom<PayoutRow> for Payout {
    type Error = CoreError;

    fn try_from(row: PayoutRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<PayoutStatus>()
            .map_err(|e| CoreError::InternalError(e.to_string()))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| CoreError::InternalError(format!("negative attempts on payout {}", row.id)))?;

        Ok(Payout {
            id: row.id,
            recipient: PayoutRecipient {
                kind: parse_recipient_kind(&row.recipient_kind)?,
                id: row.recipient_id,
            },
            period_start: row.period_start,
            period_end: row.period_end,
            gross_amount: Money::new(row.gross_amount),
            net_amount: Money::new(row.net_amount),
            detail: row.detail.0,
            status,
            payment_reference: row.payment_reference,
            paid_at: row.paid_at,
            attempts,
            notes: row.notes,
            processing_started_at: row.processing_started_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn store_error(e: sqlx::Error) -> CoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::Conflict(db.message().to_string()),
        _ => CoreError::InternalError(e.to_string()),
    }
}

fn to_payouts(rows: Vec<PayoutRow>) -> CoreResult<Vec<Payout>> {
    rows.into_iter().map(Payout::try_from).collect()
}

fn attempts_column(payout: &Payout) -> CoreResult<i32> {
    i32::try_from(payout.attempts)
        .map_err(|_| CoreError::ValidationError(format!("attempts overflow on payout {}", payout.id)))
}

#[async_trait]
impl PayoutRepository for PgPayoutRepository {
    async fn insert(&self, payout: &Payout) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query(
            r#"
            INSERT INTO payouts (id, recipient_kind, recipient_id, period_start, period_end,
                gross_amount, net_amount, detail, status, payment_reference, paid_at, attempts,
                notes, processing_started_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(payout.id)
        .bind(payout.recipient.kind.as_str())
        .bind(payout.recipient.id)
        .bind(payout.period_start)
        .bind(payout.period_end)
        .bind(payout.gross_amount.amount())
        .bind(payout.net_amount.amount())
        .bind(Json(&payout.detail))
        .bind(payout.status.as_str())
        .bind(payout.payment_reference.as_deref())
        .bind(payout.paid_at)
        .bind(attempts_column(payout)?)
        .bind(payout.notes.as_deref())
        .bind(payout.processing_started_at)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if payout.status.holds_claims() {
            for (kind, item_id) in payout.claims() {
                sqlx::query("INSERT INTO payout_claims (item_kind, item_id, payout_id) VALUES ($1, $2, $3)")
                    .bind(kind.as_str())
                    .bind(item_id)
                    .bind(payout.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(store_error)?;
            }
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Payout>> {
        let row: Option<PayoutRow> =
            sqlx::query_as(&format!("SELECT {} FROM payouts WHERE id = $1", PAYOUT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        row.map(Payout::try_from).transpose()
    }

    async fn find_open(&self, recipient: PayoutRecipient) -> CoreResult<Option<Payout>> {
        let row: Option<PayoutRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payouts WHERE recipient_kind = $1 AND recipient_id = $2 \
             AND status IN ('PENDING', 'PROCESSING')",
            PAYOUT_COLUMNS
        ))
        .bind(recipient.kind.as_str())
        .bind(recipient.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Payout::try_from).transpose()
    }

    async fn list_for_period(
        &self,
        recipient: PayoutRecipient,
        period: PayoutPeriod,
    ) -> CoreResult<Vec<Payout>> {
        let rows: Vec<PayoutRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payouts WHERE recipient_kind = $1 AND recipient_id = $2 \
             AND period_start = $3 AND period_end = $4 ORDER BY created_at, id",
            PAYOUT_COLUMNS
        ))
        .bind(recipient.kind.as_str())
        .bind(recipient.id)
        .bind(period.start)
        .bind(period.end)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        to_payouts(rows)
    }

    async fn list_by_status(&self, status: PayoutStatus) -> CoreResult<Vec<Payout>> {
        let rows: Vec<PayoutRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payouts WHERE status = $1 ORDER BY created_at, id",
            PAYOUT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        to_payouts(rows)
    }

    async fn claimed_item_ids(&self, kind: ClaimKind, ids: &[Uuid]) -> CoreResult<HashSet<Uuid>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let claimed: Vec<Uuid> = sqlx::query_scalar(
            "SELECT item_id FROM payout_claims WHERE item_kind = $1 AND item_id = ANY($2)",
        )
        .bind(kind.as_str())
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(claimed.into_iter().collect())
    }

    async fn update_if_status(&self, payout: &Payout, expected: PayoutStatus) -> CoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = $2, payment_reference = $3, paid_at = $4, attempts = $5, notes = $6,
                processing_started_at = $7, updated_at = $8
            WHERE id = $1 AND status = $9
            "#,
        )
        .bind(payout.id)
        .bind(payout.status.as_str())
        .bind(payout.payment_reference.as_deref())
        .bind(payout.paid_at)
        .bind(attempts_column(payout)?)
        .bind(payout.notes.as_deref())
        .bind(payout.processing_started_at)
        .bind(payout.updated_at)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if !payout.status.holds_claims() {
            sqlx::query("DELETE FROM payout_claims WHERE payout_id = $1")
                .bind(payout.id)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }
}
