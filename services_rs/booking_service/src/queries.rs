//! Row mapping and lookups shared by the handlers.

use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::state::AppState;
use chrono::{SecondsFormat, Utc};
use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::Row;
use std::collections::HashSet;

/// Fixed-width UTC timestamp, so stored values compare correctly as text.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}

fn decode_err(col: &str, raw: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unexpected {col} value {raw:?}").into())
}

pub const ROUTE_COLUMNS: &str = "id,name,origin,destination,is_active,created_at";

pub fn route_from_row(row: &PgRow) -> Result<RouteOut, sqlx::Error> {
    Ok(RouteOut {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub const STOP_COLUMNS: &str =
    "id,route_id,name,latitude,longitude,sequence_number,distance_from_previous_km";

pub fn stop_from_row(row: &PgRow) -> Result<StopOut, sqlx::Error> {
    Ok(StopOut {
        id: row.try_get("id")?,
        route_id: row.try_get("route_id")?,
        name: row.try_get("name")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        sequence_number: row.try_get("sequence_number")?,
        distance_from_previous_km: row.try_get("distance_from_previous_km")?,
    })
}

pub const BUS_COLUMNS: &str = "id,route_id,bus_number,name,total_seats,fare_cents,is_active";

pub fn bus_from_row(row: &PgRow) -> Result<BusOut, sqlx::Error> {
    Ok(BusOut {
        id: row.try_get("id")?,
        route_id: row.try_get("route_id")?,
        bus_number: row.try_get("bus_number")?,
        name: row.try_get("name")?,
        total_seats: row.try_get("total_seats")?,
        fare_cents: row.try_get("fare_cents")?,
        is_active: row.try_get("is_active")?,
    })
}

pub const TRIP_COLUMNS: &str = "id,bus_id,travel_date,status";

pub fn trip_from_row(row: &PgRow) -> Result<TripOut, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(TripOut {
        id: row.try_get("id")?,
        bus_id: row.try_get("bus_id")?,
        travel_date: row.try_get("travel_date")?,
        status: TripStatus::parse(&status).ok_or_else(|| decode_err("trip status", &status))?,
    })
}

/// Booking columns plus the selected seats aggregated from `booking_seats`.
pub fn booking_select(state: &AppState) -> String {
    let bookings = state.table("bookings");
    let booking_seats = state.table("booking_seats");
    format!(
        "SELECT b.id,b.user_id,b.bus_id,b.trip_id,b.travel_date,b.from_stop,b.to_stop,\
         b.seats_booked,b.passenger_name,b.passenger_phone,b.passenger_email,b.status,\
         b.total_fare_cents,b.created_at,b.updated_at,\
         COALESCE((SELECT array_agg(bs.seat_number ORDER BY bs.seat_number) \
         FROM {booking_seats} bs WHERE bs.booking_id=b.id), ARRAY[]::INTEGER[]) AS seat_numbers \
         FROM {bookings} b"
    )
}

pub fn booking_from_row(row: &PgRow) -> Result<BookingOut, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(BookingOut {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        bus_id: row.try_get("bus_id")?,
        trip_id: row.try_get("trip_id")?,
        travel_date: row.try_get("travel_date")?,
        from_stop: row.try_get("from_stop")?,
        to_stop: row.try_get("to_stop")?,
        seats_booked: row.try_get("seats_booked")?,
        passenger_name: row.try_get("passenger_name")?,
        passenger_phone: row.try_get("passenger_phone")?,
        passenger_email: row.try_get("passenger_email")?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| decode_err("booking status", &status))?,
        total_fare_cents: row.try_get("total_fare_cents")?,
        seat_numbers: row.try_get("seat_numbers")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn fetch_route<'e>(
    state: &AppState,
    db: impl PgExecutor<'e>,
    route_id: &str,
) -> ApiResult<Option<RouteOut>> {
    let routes = state.table("routes");
    let row = sqlx::query(&format!("SELECT {ROUTE_COLUMNS} FROM {routes} WHERE id=$1"))
        .bind(route_id)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiError::db("route lookup", e))?;
    row.as_ref()
        .map(route_from_row)
        .transpose()
        .map_err(|e| ApiError::db("route decode", e))
}

pub async fn fetch_stops<'e>(
    state: &AppState,
    db: impl PgExecutor<'e>,
    route_id: &str,
) -> ApiResult<Vec<StopOut>> {
    let stops = state.table("stops");
    let rows = sqlx::query(&format!(
        "SELECT {STOP_COLUMNS} FROM {stops} WHERE route_id=$1 ORDER BY sequence_number"
    ))
    .bind(route_id)
    .fetch_all(db)
    .await
    .map_err(|e| ApiError::db("stops lookup", e))?;
    rows.iter()
        .map(stop_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::db("stop decode", e))
}

pub async fn fetch_bus<'e>(
    state: &AppState,
    db: impl PgExecutor<'e>,
    bus_id: &str,
) -> ApiResult<Option<BusOut>> {
    let buses = state.table("buses");
    let row = sqlx::query(&format!("SELECT {BUS_COLUMNS} FROM {buses} WHERE id=$1"))
        .bind(bus_id)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiError::db("bus lookup", e))?;
    row.as_ref()
        .map(bus_from_row)
        .transpose()
        .map_err(|e| ApiError::db("bus decode", e))
}

pub async fn fetch_booking<'e>(
    state: &AppState,
    db: impl PgExecutor<'e>,
    booking_id: &str,
) -> ApiResult<Option<BookingOut>> {
    let row = sqlx::query(&format!("{} WHERE b.id=$1", booking_select(state)))
        .bind(booking_id)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiError::db("booking lookup", e))?;
    row.as_ref()
        .map(booking_from_row)
        .transpose()
        .map_err(|e| ApiError::db("booking decode", e))
}

/// Seats held on (bus, date) by pending and confirmed bookings.
pub async fn booked_seats<'e>(
    state: &AppState,
    db: impl PgExecutor<'e>,
    bus_id: &str,
    travel_date: &str,
) -> ApiResult<i64> {
    let bookings = state.table("bookings");
    let row = sqlx::query(&format!(
        "SELECT COALESCE(SUM(seats_booked),0)::BIGINT AS booked FROM {bookings} \
         WHERE bus_id=$1 AND travel_date=$2 AND status = ANY($3)"
    ))
    .bind(bus_id)
    .bind(travel_date)
    .bind(holding_statuses())
    .fetch_one(db)
    .await
    .map_err(|e| ApiError::db("booked seats", e))?;
    row.try_get::<i64, _>("booked")
        .map_err(|e| ApiError::db("booked seats decode", e))
}

/// Seat numbers picked by pending and confirmed bookings on (bus, date).
pub async fn taken_seat_numbers<'e>(
    state: &AppState,
    db: impl PgExecutor<'e>,
    bus_id: &str,
    travel_date: &str,
) -> ApiResult<HashSet<i32>> {
    let bookings = state.table("bookings");
    let booking_seats = state.table("booking_seats");
    let rows = sqlx::query(&format!(
        "SELECT bs.seat_number FROM {booking_seats} bs \
         JOIN {bookings} b ON b.id=bs.booking_id \
         WHERE bs.bus_id=$1 AND bs.travel_date=$2 AND b.status = ANY($3)"
    ))
    .bind(bus_id)
    .bind(travel_date)
    .bind(holding_statuses())
    .fetch_all(db)
    .await
    .map_err(|e| ApiError::db("taken seats", e))?;
    let mut out = HashSet::with_capacity(rows.len());
    for row in rows {
        let sn: i32 = row
            .try_get("seat_number")
            .map_err(|e| ApiError::db("taken seats decode", e))?;
        out.insert(sn);
    }
    Ok(out)
}

pub fn holding_statuses() -> Vec<String> {
    BookingStatus::HOLDING
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

pub fn total_distance_km(stops: &[StopOut]) -> f64 {
    crate::geo::round_km(stops.iter().map(|s| s.distance_from_previous_km).sum())
}
