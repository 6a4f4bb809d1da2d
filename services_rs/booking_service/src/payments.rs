use crate::auth::CurrentUser;
use crate::bookings::owned_booking;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{self, ExecuteOutcome, OrderRequest};
use crate::models::*;
use crate::queries::now_ts;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use sqlx::Row;
use uuid::Uuid;

const PAYMENT_ALREADY_DONE: &str = "PAYMENT_ALREADY_DONE";

/// What `GET /payments/create/{id}` does with a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPlan {
    NotPayable,
    ConfirmFree,
    GatewayUnavailable,
    Gateway,
}

pub fn plan_checkout(status: BookingStatus, fare_cents: i64, gateway_configured: bool) -> CheckoutPlan {
    if status != BookingStatus::Pending {
        CheckoutPlan::NotPayable
    } else if fare_cents <= 0 {
        CheckoutPlan::ConfirmFree
    } else if !gateway_configured {
        CheckoutPlan::GatewayUnavailable
    } else {
        CheckoutPlan::Gateway
    }
}

fn booking_url(booking_id: &str) -> String {
    format!("/bookings/{booking_id}")
}

async fn confirm_booking<'e>(
    state: &AppState,
    db: impl sqlx::postgres::PgExecutor<'e>,
    booking_id: &str,
) -> ApiResult<bool> {
    let bookings = state.table("bookings");
    let res = sqlx::query(&format!(
        "UPDATE {bookings} SET status=$1, updated_at=$2 WHERE id=$3 AND status=$4"
    ))
    .bind(BookingStatus::Confirmed.as_str())
    .bind(now_ts())
    .bind(booking_id)
    .bind(BookingStatus::Pending.as_str())
    .execute(db)
    .await
    .map_err(|e| ApiError::db("confirm booking", e))?;
    Ok(res.rows_affected() == 1)
}

pub async fn create_payment(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Redirect> {
    let booking = owned_booking(&state, &user, &booking_id).await?;

    match plan_checkout(
        booking.status,
        booking.total_fare_cents,
        state.gateway.is_some(),
    ) {
        CheckoutPlan::NotPayable => Err(ApiError::bad_request("booking is not awaiting payment")),
        CheckoutPlan::ConfirmFree => {
            confirm_booking(&state, &state.pool, &booking.id).await?;
            tracing::info!(booking_id = %booking.id, "free booking confirmed without payment");
            Ok(Redirect::to(&booking_url(&booking.id)))
        }
        CheckoutPlan::GatewayUnavailable => {
            tracing::warn!(booking_id = %booking.id, "payment gateway not configured");
            Ok(Redirect::to(&format!(
                "{}?flash=payment_unavailable",
                booking_url(&booking.id)
            )))
        }
        CheckoutPlan::Gateway => {
            let Some(cfg) = state.gateway.as_ref() else {
                return Err(ApiError::unavailable("payment gateway not configured"));
            };
            let order = OrderRequest {
                booking_id: &booking.id,
                description: format!(
                    "{} to {}, {} seat(s) on {}",
                    booking.from_stop, booking.to_stop, booking.seats_booked, booking.travel_date
                ),
                amount_cents: booking.total_fare_cents,
                currency: &state.payment_currency,
                return_url: state.public_url("/payments/success"),
                cancel_url: state.public_url(&format!(
                    "/payments/cancel?booking_id={}",
                    booking.id
                )),
            };
            let created = gateway::create_payment(&state.http, cfg, &order).await?;

            let payments = state.table("payments");
            let now = now_ts();
            sqlx::query(&format!(
                "INSERT INTO {payments} (id,booking_id,gateway_order_id,amount_cents,currency,status,created_at,updated_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$7)"
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(&booking.id)
            .bind(&created.order_id)
            .bind(booking.total_fare_cents)
            .bind(&state.payment_currency)
            .bind(PaymentStatus::Created.as_str())
            .bind(&now)
            .execute(&state.pool)
            .await
            .map_err(|e| ApiError::db("payment insert", e))?;

            tracing::info!(
                booking_id = %booking.id,
                order_id = %created.order_id,
                amount_cents = booking.total_fare_cents,
                "payment created"
            );
            Ok(Redirect::to(&created.approval_url))
        }
    }
}

pub async fn payment_success(
    State(state): State<AppState>,
    Query(params): Query<PaymentCallbackParams>,
) -> ApiResult<Redirect> {
    let order_id = params
        .payment_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("paymentId required"))?;
    let payer_id = params
        .payer_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("PayerID required"))?;

    let payments = state.table("payments");
    let row = sqlx::query(&format!(
        "SELECT booking_id,status FROM {payments} WHERE gateway_order_id=$1"
    ))
    .bind(order_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| ApiError::db("payment lookup", e))?
    .ok_or_else(|| ApiError::not_found("payment not found"))?;
    let booking_id: String = row
        .try_get("booking_id")
        .map_err(|e| ApiError::db("payment decode", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| ApiError::db("payment decode", e))?;

    match PaymentStatus::parse(&status) {
        Some(PaymentStatus::Success) => return Ok(Redirect::to(&booking_url(&booking_id))),
        Some(PaymentStatus::Failed) => {
            return Err(ApiError::bad_request("payment is no longer valid"));
        }
        _ => {}
    }

    let cfg = state
        .gateway
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("payment gateway not configured"))?;
    let mut outcome = gateway::execute_payment(&state.http, cfg, order_id, payer_id).await?;
    // A repeated callback after a lost response: the gateway already captured it.
    if outcome == ExecuteOutcome::Rejected(PAYMENT_ALREADY_DONE.to_string()) {
        let remote = gateway::find_payment(&state.http, cfg, order_id).await?;
        if remote.state == "approved" {
            outcome = ExecuteOutcome::Approved;
        }
    }

    let now = now_ts();
    match outcome {
        ExecuteOutcome::Approved => {
            let mut tx = state
                .pool
                .begin()
                .await
                .map_err(|e| ApiError::db("payment success begin", e))?;
            let locked: String = sqlx::query(&format!(
                "SELECT status FROM {payments} WHERE gateway_order_id=$1 FOR UPDATE"
            ))
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await
            .and_then(|r| r.try_get("status"))
            .map_err(|e| ApiError::db("payment lock", e))?;
            if PaymentStatus::parse(&locked) != Some(PaymentStatus::Success) {
                sqlx::query(&format!(
                    "UPDATE {payments} SET status=$1, updated_at=$2 WHERE gateway_order_id=$3"
                ))
                .bind(PaymentStatus::Success.as_str())
                .bind(&now)
                .bind(order_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| ApiError::db("payment success update", e))?;
                if !confirm_booking(&state, &mut *tx, &booking_id).await? {
                    tracing::error!(
                        booking_id = %booking_id,
                        order_id,
                        "payment captured for a booking that is no longer pending"
                    );
                }
            }
            tx.commit()
                .await
                .map_err(|e| ApiError::db("payment success commit", e))?;
            tracing::info!(booking_id = %booking_id, order_id, "payment executed");
            Ok(Redirect::to(&booking_url(&booking_id)))
        }
        ExecuteOutcome::Rejected(reason) => {
            sqlx::query(&format!(
                "UPDATE {payments} SET status=$1, updated_at=$2 WHERE gateway_order_id=$3 AND status=$4"
            ))
            .bind(PaymentStatus::Failed.as_str())
            .bind(&now)
            .bind(order_id)
            .bind(PaymentStatus::Created.as_str())
            .execute(&state.pool)
            .await
            .map_err(|e| ApiError::db("payment failed update", e))?;
            tracing::warn!(booking_id = %booking_id, order_id, reason = %reason, "payment rejected by gateway");
            Ok(Redirect::to(&format!(
                "{}?flash=payment_failed",
                booking_url(&booking_id)
            )))
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct PaymentCancelParams {
    pub booking_id: Option<String>,
}

/// The buyer backed out at the gateway. The booking stays pending and can be paid later.
pub async fn payment_cancel(Query(params): Query<PaymentCancelParams>) -> Redirect {
    match params
        .booking_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && Uuid::parse_str(s).is_ok())
    {
        Some(id) => {
            tracing::info!(booking_id = %id, "payment cancelled by buyer");
            Redirect::to(&format!("{}?flash=payment_cancelled", booking_url(id)))
        }
        None => Redirect::to("/bookings"),
    }
}
