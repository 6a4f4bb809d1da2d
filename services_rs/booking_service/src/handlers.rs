use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::queries::{self, bus_from_row, route_from_row, BUS_COLUMNS, ROUTE_COLUMNS};
use crate::state::AppState;
use crate::validation::{available_seats, parse_travel_date};
use axum::extract::{Path, Query, State};
use axum::Json;
use std::collections::HashSet;

pub const SEATS_PER_ROW: usize = 4;

#[derive(Debug, serde::Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub env: String,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        env: state.env_name.clone(),
        service: "Busline Booking API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, serde::Deserialize)]
pub struct ListBusesParams {
    pub route_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SeatDateParams {
    pub date: Option<String>,
}

/// `?date=` or today, normalized to `YYYY-MM-DD`.
pub fn resolve_date(raw: Option<&str>) -> ApiResult<String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(queries::today().format("%Y-%m-%d").to_string()),
        Some(s) => parse_travel_date(s)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .ok_or_else(|| ApiError::bad_request("invalid date; use YYYY-MM-DD")),
    }
}

pub fn seat_layout(total_seats: i32, taken: &HashSet<i32>) -> Vec<Vec<SeatOut>> {
    let seats: Vec<SeatOut> = (1..=total_seats.max(0))
        .map(|n| SeatOut {
            seat_number: n,
            is_booked: taken.contains(&n),
        })
        .collect();
    seats.chunks(SEATS_PER_ROW).map(<[SeatOut]>::to_vec).collect()
}

pub async fn list_routes(State(state): State<AppState>) -> ApiResult<Json<Vec<RouteOut>>> {
    let routes = state.table("routes");
    let rows = sqlx::query(&format!(
        "SELECT {ROUTE_COLUMNS} FROM {routes} WHERE is_active=TRUE ORDER BY name, created_at"
    ))
    .fetch_all(&state.pool)
    .await
    .map_err(|e| ApiError::db("list_routes", e))?;
    let out = rows
        .iter()
        .map(route_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::db("list_routes decode", e))?;
    Ok(Json(out))
}

pub async fn get_route(
    Path(route_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<RouteDetailOut>> {
    let route = queries::fetch_route(&state, &state.pool, route_id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("route not found"))?;
    let stops = queries::fetch_stops(&state, &state.pool, &route.id).await?;
    let total_distance_km = queries::total_distance_km(&stops);
    Ok(Json(RouteDetailOut {
        route,
        stops,
        total_distance_km,
    }))
}

pub async fn list_buses(
    State(state): State<AppState>,
    Query(params): Query<ListBusesParams>,
) -> ApiResult<Json<Vec<BusOut>>> {
    let buses = state.table("buses");
    let route_id = params
        .route_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let rows = match route_id {
        Some(rid) => {
            sqlx::query(&format!(
                "SELECT {BUS_COLUMNS} FROM {buses} WHERE is_active=TRUE AND route_id=$1 ORDER BY bus_number"
            ))
            .bind(rid)
            .fetch_all(&state.pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                "SELECT {BUS_COLUMNS} FROM {buses} WHERE is_active=TRUE ORDER BY bus_number"
            ))
            .fetch_all(&state.pool)
            .await
        }
    }
    .map_err(|e| ApiError::db("list_buses", e))?;
    let out = rows
        .iter()
        .map(bus_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::db("list_buses decode", e))?;
    Ok(Json(out))
}

pub async fn get_bus(
    Path(bus_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<BusDetailOut>> {
    let bus = queries::fetch_bus(&state, &state.pool, bus_id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("bus not found"))?;
    let route = queries::fetch_route(&state, &state.pool, &bus.route_id)
        .await?
        .ok_or_else(|| ApiError::not_found("route not found"))?;
    Ok(Json(BusDetailOut { bus, route }))
}

pub async fn seat_status_for(
    state: &AppState,
    bus: &BusOut,
    travel_date: &str,
) -> ApiResult<SeatStatusOut> {
    let booked = queries::booked_seats(state, &state.pool, &bus.id, travel_date).await?;
    Ok(SeatStatusOut {
        bus_id: bus.id.clone(),
        travel_date: travel_date.to_string(),
        total_seats: bus.total_seats,
        booked_seats: booked,
        available_seats: available_seats(bus.total_seats, booked),
    })
}

pub async fn seat_status(
    Path(bus_id): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<SeatDateParams>,
) -> ApiResult<Json<SeatStatusOut>> {
    let travel_date = resolve_date(params.date.as_deref())?;
    let bus = queries::fetch_bus(&state, &state.pool, bus_id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("bus not found"))?;
    Ok(Json(seat_status_for(&state, &bus, &travel_date).await?))
}

pub async fn seat_layout_view(
    Path(bus_id): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<SeatDateParams>,
) -> ApiResult<Json<SeatLayoutOut>> {
    let travel_date = resolve_date(params.date.as_deref())?;
    let bus = queries::fetch_bus(&state, &state.pool, bus_id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("bus not found"))?;
    let taken = queries::taken_seat_numbers(&state, &state.pool, &bus.id, &travel_date).await?;
    Ok(Json(SeatLayoutOut {
        bus_id: bus.id,
        travel_date,
        seats_per_row: SEATS_PER_ROW,
        rows: seat_layout(bus.total_seats, &taken),
    }))
}
