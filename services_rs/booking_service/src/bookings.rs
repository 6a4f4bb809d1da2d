use crate::auth::{ensure_owner, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::handlers::seat_status_for;
use crate::models::*;
use crate::queries::{self, booking_from_row, now_ts, trip_from_row, TRIP_COLUMNS};
use crate::state::AppState;
use crate::validation::{
    check_capacity, check_seats_free, clean_booking, precheck_booking, BookingContext,
};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::Json;
use sqlx::Row;
use uuid::Uuid;

type SeeOther<T> = (StatusCode, [(header::HeaderName, String); 1], Json<T>);

fn see_other<T>(location: String, body: T) -> SeeOther<T> {
    (StatusCode::SEE_OTHER, [(header::LOCATION, location)], Json(body))
}

async fn bookable_bus(state: &AppState, bus_id: &str) -> ApiResult<(BusOut, RouteOut)> {
    let bus = queries::fetch_bus(state, &state.pool, bus_id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("bus not found"))?;
    if !bus.is_active {
        return Err(ApiError::bad_request("bus is not accepting bookings"));
    }
    let route = queries::fetch_route(state, &state.pool, &bus.route_id)
        .await?
        .ok_or_else(|| ApiError::not_found("route not found"))?;
    Ok((bus, route))
}

pub async fn booking_form(
    Path(bus_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<BookingFormOut>> {
    let (bus, route) = bookable_bus(&state, &bus_id).await?;
    let travel_date = queries::today().format("%Y-%m-%d").to_string();
    let availability = seat_status_for(&state, &bus, &travel_date).await?;
    Ok(Json(BookingFormOut {
        bus,
        travel_date,
        from_stop: route.origin,
        to_stop: route.destination,
        seats_booked: 1,
        passenger_name: user.name.unwrap_or_default(),
        passenger_email: user.email.unwrap_or_default(),
        passenger_phone: String::new(),
        availability,
    }))
}

pub async fn book_bus(
    Path(bus_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<BookingIn>,
) -> ApiResult<SeeOther<BookingOut>> {
    precheck_booking(&body, queries::today())
        .map_err(|errors| ApiError::invalid_form("invalid booking", errors))?;
    let (bus, route) = bookable_bus(&state, &bus_id).await?;
    let clean = clean_booking(
        &body,
        BookingContext {
            today: queries::today(),
            route_origin: &route.origin,
            route_destination: &route.destination,
            total_seats: bus.total_seats,
        },
    )
    .map_err(|errors| ApiError::invalid_form("invalid booking", errors))?;
    let travel_date = clean.travel_date.format("%Y-%m-%d").to_string();

    let trips = state.table("trips");
    let bookings = state.table("bookings");
    let booking_seats = state.table("booking_seats");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::db("book begin", e))?;

    // Every booking for (bus, date) locks the same trip row, so the capacity check and
    // the insert below cannot interleave with another booking for that trip.
    let now = now_ts();
    sqlx::query(&format!(
        "INSERT INTO {trips} (id,bus_id,travel_date,status,created_at) VALUES ($1,$2,$3,$4,$5) \
         ON CONFLICT (bus_id, travel_date) DO NOTHING"
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(&bus.id)
    .bind(&travel_date)
    .bind(TripStatus::NotStarted.as_str())
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::db("trip upsert", e))?;

    let trip_row = sqlx::query(&format!(
        "SELECT {TRIP_COLUMNS} FROM {trips} WHERE bus_id=$1 AND travel_date=$2 FOR UPDATE"
    ))
    .bind(&bus.id)
    .bind(&travel_date)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::db("trip lock", e))?;
    let trip = trip_from_row(&trip_row).map_err(|e| ApiError::db("trip decode", e))?;
    if !trip.status.accepts_bookings() {
        return Err(ApiError::bad_request("trip is not accepting bookings"));
    }

    let booked = queries::booked_seats(&state, &mut *tx, &bus.id, &travel_date).await?;
    check_capacity(clean.seats_booked, bus.total_seats, booked)
        .map_err(|errors| ApiError::invalid_form("not enough seats", errors))?;

    if !clean.seat_numbers.is_empty() {
        let taken = queries::taken_seat_numbers(&state, &mut *tx, &bus.id, &travel_date).await?;
        check_seats_free(&clean.seat_numbers, &taken)
            .map_err(|errors| ApiError::invalid_form("seats already booked", errors))?;
    }

    let booking_id = Uuid::new_v4().to_string();
    let total_fare_cents = bus.fare_cents.saturating_mul(clean.seats_booked as i64);
    sqlx::query(&format!(
        "INSERT INTO {bookings} (id,user_id,bus_id,trip_id,travel_date,from_stop,to_stop,seats_booked,\
         passenger_name,passenger_phone,passenger_email,status,total_fare_cents,created_at,updated_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$14)"
    ))
    .bind(&booking_id)
    .bind(&user.user_id)
    .bind(&bus.id)
    .bind(&trip.id)
    .bind(&travel_date)
    .bind(&clean.from_stop)
    .bind(&clean.to_stop)
    .bind(clean.seats_booked)
    .bind(&clean.passenger_name)
    .bind(&clean.passenger_phone)
    .bind(&clean.passenger_email)
    .bind(BookingStatus::Pending.as_str())
    .bind(total_fare_cents)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::db("booking insert", e))?;

    for sn in &clean.seat_numbers {
        sqlx::query(&format!(
            "INSERT INTO {booking_seats} (booking_id,bus_id,travel_date,seat_number) VALUES ($1,$2,$3,$4)"
        ))
        .bind(&booking_id)
        .bind(&bus.id)
        .bind(&travel_date)
        .bind(sn)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::db("booking seat insert", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| ApiError::db("book commit", e))?;

    tracing::info!(
        booking_id = %booking_id,
        bus_id = %bus.id,
        travel_date = %travel_date,
        seats = clean.seats_booked,
        total_fare_cents,
        "booking created"
    );

    let booking = BookingOut {
        id: booking_id,
        user_id: user.user_id,
        bus_id: bus.id,
        trip_id: trip.id,
        travel_date,
        from_stop: clean.from_stop,
        to_stop: clean.to_stop,
        seats_booked: clean.seats_booked,
        passenger_name: clean.passenger_name,
        passenger_phone: clean.passenger_phone,
        passenger_email: clean.passenger_email,
        status: BookingStatus::Pending,
        total_fare_cents,
        seat_numbers: clean.seat_numbers,
        created_at: now.clone(),
        updated_at: now,
    };
    Ok(see_other(
        format!("/payments/create/{}", booking.id),
        booking,
    ))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<BookingOut>>> {
    let rows = sqlx::query(&format!(
        "{} WHERE b.user_id=$1 ORDER BY b.created_at DESC",
        queries::booking_select(&state)
    ))
    .bind(&user.user_id)
    .fetch_all(&state.pool)
    .await
    .map_err(|e| ApiError::db("list_bookings", e))?;
    let out = rows
        .iter()
        .map(booking_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::db("list_bookings decode", e))?;
    Ok(Json(out))
}

pub async fn owned_booking(
    state: &AppState,
    user: &busline_common::identity::Identity,
    booking_id: &str,
) -> ApiResult<BookingOut> {
    let booking = queries::fetch_booking(state, &state.pool, booking_id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("booking not found"))?;
    ensure_owner(user, &booking.user_id)?;
    Ok(booking)
}

pub async fn get_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<BookingOut>> {
    Ok(Json(owned_booking(&state, &user, &booking_id).await?))
}

pub async fn cancel_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<BookingOut>> {
    let booking_id = booking_id.trim().to_string();
    let bookings = state.table("bookings");
    let payments = state.table("payments");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::db("cancel begin", e))?;
    let row = sqlx::query(&format!(
        "SELECT user_id,status FROM {bookings} WHERE id=$1 FOR UPDATE"
    ))
    .bind(&booking_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| ApiError::db("cancel lookup", e))?
    .ok_or_else(|| ApiError::not_found("booking not found"))?;
    let owner: String = row
        .try_get("user_id")
        .map_err(|e| ApiError::db("cancel decode", e))?;
    ensure_owner(&user, &owner)?;
    let status: String = row
        .try_get("status")
        .map_err(|e| ApiError::db("cancel decode", e))?;
    if BookingStatus::parse(&status) != Some(BookingStatus::Pending) {
        return Err(ApiError::bad_request("Only pending bookings can be cancelled."));
    }

    let now = now_ts();
    sqlx::query(&format!(
        "UPDATE {bookings} SET status=$1, updated_at=$2 WHERE id=$3"
    ))
    .bind(BookingStatus::Cancelled.as_str())
    .bind(&now)
    .bind(&booking_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::db("cancel update", e))?;
    sqlx::query(&format!(
        "UPDATE {payments} SET status=$1, updated_at=$2 WHERE booking_id=$3 AND status=$4"
    ))
    .bind(PaymentStatus::Failed.as_str())
    .bind(&now)
    .bind(&booking_id)
    .bind(PaymentStatus::Created.as_str())
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::db("cancel payments", e))?;
    tx.commit()
        .await
        .map_err(|e| ApiError::db("cancel commit", e))?;

    tracing::info!(booking_id = %booking_id, user_id = %user.user_id, "booking cancelled");
    let booking = queries::fetch_booking(&state, &state.pool, &booking_id)
        .await?
        .ok_or_else(|| ApiError::not_found("booking not found"))?;
    Ok(Json(booking))
}

pub async fn track_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<BookingTrackOut>> {
    let booking = owned_booking(&state, &user, &booking_id).await?;
    let trips = state.table("trips");
    let trip_row = sqlx::query(&format!("SELECT {TRIP_COLUMNS} FROM {trips} WHERE id=$1"))
        .bind(&booking.trip_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| ApiError::db("track trip", e))?
        .ok_or_else(|| ApiError::not_found("trip not found"))?;
    let trip = trip_from_row(&trip_row).map_err(|e| ApiError::db("track trip decode", e))?;
    let bus = queries::fetch_bus(&state, &state.pool, &booking.bus_id)
        .await?
        .ok_or_else(|| ApiError::not_found("bus not found"))?;
    let route = queries::fetch_route(&state, &state.pool, &bus.route_id)
        .await?
        .ok_or_else(|| ApiError::not_found("route not found"))?;
    let stops = queries::fetch_stops(&state, &state.pool, &route.id).await?;
    Ok(Json(BookingTrackOut {
        booking,
        trip,
        bus,
        route,
        stops,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn booking_redirects_to_checkout_with_body() {
        let resp = see_other(
            "/payments/create/b-1".to_string(),
            serde_json::json!({"id": "b-1"}),
        )
        .into_response();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/payments/create/b-1")
        );
    }

    #[tokio::test]
    async fn booking_form_requires_login() {
        let app = axum::Router::new()
            .route("/buses/:bus_id/book", axum::routing::get(booking_form))
            .with_state(AppState::for_tests());
        let resp = tower::ServiceExt::oneshot(
            app,
            axum::http::Request::builder()
                .uri("/buses/bus-1/book")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
