//! Releases seats held by abandoned checkouts.

use crate::models::{BookingStatus, PaymentStatus};
use crate::queries::now_ts;
use crate::state::AppState;
use chrono::{Duration, SecondsFormat, Utc};
use std::time::Duration as StdDuration;

const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);
const MAX_TTL_MINUTES: u64 = 60 * 24 * 365;

pub fn cutoff(now: chrono::DateTime<Utc>, ttl_minutes: u64) -> String {
    let ttl = Duration::minutes(ttl_minutes.min(MAX_TTL_MINUTES) as i64);
    (now - ttl).to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Cancels pending bookings created before the cutoff and fails their open payments.
/// Returns the number of bookings cancelled.
pub async fn expire_pending(state: &AppState, ttl_minutes: u64) -> Result<u64, sqlx::Error> {
    let bookings = state.table("bookings");
    let payments = state.table("payments");
    let cutoff = cutoff(Utc::now(), ttl_minutes);
    let now = now_ts();

    let mut tx = state.pool.begin().await?;
    let expired: Vec<String> = sqlx::query_scalar(&format!(
        "UPDATE {bookings} SET status=$1, updated_at=$2 \
         WHERE status=$3 AND created_at < $4 RETURNING id"
    ))
    .bind(BookingStatus::Cancelled.as_str())
    .bind(&now)
    .bind(BookingStatus::Pending.as_str())
    .bind(&cutoff)
    .fetch_all(&mut *tx)
    .await?;
    if !expired.is_empty() {
        sqlx::query(&format!(
            "UPDATE {payments} SET status=$1, updated_at=$2 WHERE booking_id = ANY($3) AND status=$4"
        ))
        .bind(PaymentStatus::Failed.as_str())
        .bind(&now)
        .bind(&expired)
        .bind(PaymentStatus::Created.as_str())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(expired.len() as u64)
}

pub fn spawn(state: AppState, ttl_minutes: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match expire_pending(&state, ttl_minutes).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(expired = n, ttl_minutes, "expired pending bookings"),
                Err(e) => tracing::warn!(error = %e, "pending booking sweep failed"),
            }
        }
    })
}
