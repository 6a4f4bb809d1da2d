use crate::auth::AdminUser;
use crate::error::{is_unique_violation, ApiError, ApiResult, FieldErrors};
use crate::extract::ApiJson;
use crate::geo::{parse_stop_list, plan_stops, PlannedStop, StopPoint};
use crate::models::*;
use crate::queries::{self, now_ts, route_from_row, trip_from_row, ROUTE_COLUMNS, TRIP_COLUMNS};
use crate::state::AppState;
use crate::validation::{clean_bus, clean_route, REQUIRED};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

pub async fn list_routes(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<Vec<RouteOut>>> {
    let routes = state.table("routes");
    let result = sqlx::query(&format!(
        "SELECT {ROUTE_COLUMNS} FROM {routes} ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await
    .and_then(|rows| rows.iter().map(route_from_row).collect::<Result<Vec<_>, _>>());
    match result {
        Ok(out) => Ok(Json(out)),
        Err(e) if state.debug_errors() => {
            tracing::error!(error = %e, "db admin list_routes failed");
            Err(ApiError::internal(format!("Error fetching routes: {e}")))
        }
        Err(e) => Err(ApiError::db("admin list_routes", e)),
    }
}

async fn insert_stops(
    state: &AppState,
    conn: &mut PgConnection,
    route_id: &str,
    planned: &[PlannedStop],
) -> ApiResult<Vec<StopOut>> {
    let stops = state.table("stops");
    let mut out = Vec::with_capacity(planned.len());
    for p in planned {
        let id = Uuid::new_v4().to_string();
        sqlx::query(&format!(
            "INSERT INTO {stops} (id,route_id,name,latitude,longitude,sequence_number,distance_from_previous_km) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)"
        ))
        .bind(&id)
        .bind(route_id)
        .bind(&p.name)
        .bind(p.latitude)
        .bind(p.longitude)
        .bind(p.sequence_number)
        .bind(p.distance_from_previous_km)
        .execute(&mut *conn)
        .await
        .map_err(|e| ApiError::db("stop insert", e))?;
        out.push(StopOut {
            id,
            route_id: route_id.to_string(),
            name: p.name.clone(),
            latitude: p.latitude,
            longitude: p.longitude,
            sequence_number: p.sequence_number,
            distance_from_previous_km: p.distance_from_previous_km,
        });
    }
    Ok(out)
}

pub async fn create_route(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(body): ApiJson<RouteIn>,
) -> ApiResult<(StatusCode, Json<RouteDetailOut>)> {
    let clean = clean_route(&body).map_err(|errors| ApiError::invalid_form("invalid route", errors))?;

    // Bad stop data never blocks the route itself.
    let stop_list = body.stops.as_ref().map(parse_stop_list).unwrap_or_default();
    if let Some(reason) = &stop_list.error {
        tracing::warn!(
            reason = %reason,
            route = %clean.name,
            kept = stop_list.points.len(),
            "stop list truncated at malformed entry"
        );
    }
    let points = stop_list.points;

    let route = RouteOut {
        id: Uuid::new_v4().to_string(),
        name: clean.name,
        origin: clean.origin,
        destination: clean.destination,
        is_active: clean.is_active,
        created_at: now_ts(),
    };

    let routes = state.table("routes");
    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::db("create_route begin", e))?;
    sqlx::query(&format!(
        "INSERT INTO {routes} (id,name,origin,destination,is_active,created_at) VALUES ($1,$2,$3,$4,$5,$6)"
    ))
    .bind(&route.id)
    .bind(&route.name)
    .bind(&route.origin)
    .bind(&route.destination)
    .bind(route.is_active)
    .bind(&route.created_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::db("route insert", e))?;
    let stops = insert_stops(&state, &mut tx, &route.id, &plan_stops(&points, None, 1)).await?;
    tx.commit()
        .await
        .map_err(|e| ApiError::db("create_route commit", e))?;

    tracing::info!(route_id = %route.id, stops = stops.len(), admin = %admin.user_id, "route created");
    let total_distance_km = queries::total_distance_km(&stops);
    Ok((
        StatusCode::CREATED,
        Json(RouteDetailOut {
            route,
            stops,
            total_distance_km,
        }),
    ))
}

fn coordinate(errors: &mut FieldErrors, field: &str, value: Option<f64>, limit: f64, label: &str) -> f64 {
    let msg = match value {
        None => REQUIRED.to_string(),
        Some(v) if v.is_finite() && v.abs() <= limit => return v,
        Some(_) => format!("{label} must be between -{limit} and {limit}."),
    };
    errors.entry(field.to_string()).or_default().push(msg);
    0.0
}

fn clean_stop(body: &StopIn) -> Result<StopPoint, FieldErrors> {
    let mut errors = FieldErrors::new();
    let lat = coordinate(&mut errors, "lat", body.lat, 90.0, "Latitude");
    let lng = coordinate(&mut errors, "lng", body.lng, 180.0, "Longitude");
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(StopPoint {
        name: body
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(100).collect()),
        lat,
        lng,
    })
}

pub async fn add_stop(
    Path(route_id): Path<String>,
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiJson(body): ApiJson<StopIn>,
) -> ApiResult<(StatusCode, Json<StopOut>)> {
    let point = clean_stop(&body).map_err(|errors| ApiError::invalid_form("invalid stop", errors))?;
    let route_id = route_id.trim().to_string();
    let routes = state.table("routes");
    let stops = state.table("stops");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::db("add_stop begin", e))?;
    // Locking the route serializes concurrent appends to the same route.
    sqlx::query(&format!("SELECT id FROM {routes} WHERE id=$1 FOR UPDATE"))
        .bind(&route_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| ApiError::db("add_stop route lock", e))?
        .ok_or_else(|| ApiError::not_found("route not found"))?;

    let last = sqlx::query(&format!(
        "SELECT latitude,longitude,sequence_number FROM {stops} WHERE route_id=$1 \
         ORDER BY sequence_number DESC LIMIT 1"
    ))
    .bind(&route_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| ApiError::db("add_stop last stop", e))?;
    let (previous, next_seq) = match last {
        Some(row) => {
            let lat: f64 = row.try_get("latitude").map_err(|e| ApiError::db("add_stop decode", e))?;
            let lng: f64 = row.try_get("longitude").map_err(|e| ApiError::db("add_stop decode", e))?;
            let seq: i32 = row
                .try_get("sequence_number")
                .map_err(|e| ApiError::db("add_stop decode", e))?;
            (Some((lat, lng)), seq + 1)
        }
        None => (None, 1),
    };

    let planned = plan_stops(std::slice::from_ref(&point), previous, next_seq);
    let mut inserted = insert_stops(&state, &mut tx, &route_id, &planned).await?;
    tx.commit()
        .await
        .map_err(|e| ApiError::db("add_stop commit", e))?;

    let stop = inserted
        .pop()
        .ok_or_else(|| ApiError::internal("stop was not created"))?;
    tracing::info!(route_id = %route_id, sequence = stop.sequence_number, "stop added");
    Ok((StatusCode::CREATED, Json(stop)))
}

pub async fn delete_route(
    Path(route_id): Path<String>,
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<StatusCode> {
    let routes = state.table("routes");
    let res = sqlx::query(&format!("DELETE FROM {routes} WHERE id=$1"))
        .bind(route_id.trim())
        .execute(&state.pool)
        .await
        .map_err(|e| ApiError::db("delete_route", e))?;
    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("route not found"));
    }
    tracing::info!(route_id = %route_id.trim(), admin = %admin.user_id, "route deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_bus(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(body): ApiJson<BusIn>,
) -> ApiResult<(StatusCode, Json<BusOut>)> {
    let clean = clean_bus(&body).map_err(|errors| ApiError::invalid_form("invalid bus", errors))?;
    if queries::fetch_route(&state, &state.pool, &clean.route_id)
        .await?
        .is_none()
    {
        let mut errors = FieldErrors::new();
        errors.insert("route_id".to_string(), vec!["Select a valid route.".to_string()]);
        return Err(ApiError::invalid_form("invalid bus", errors));
    }

    let bus = BusOut {
        id: Uuid::new_v4().to_string(),
        route_id: clean.route_id,
        bus_number: clean.bus_number,
        name: clean.name,
        total_seats: clean.total_seats,
        fare_cents: clean.fare_cents,
        is_active: clean.is_active,
    };
    let buses = state.table("buses");
    let seats = state.table("seats");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::db("create_bus begin", e))?;
    sqlx::query(&format!(
        "INSERT INTO {buses} (id,route_id,bus_number,name,total_seats,fare_cents,is_active) \
         VALUES ($1,$2,$3,$4,$5,$6,$7)"
    ))
    .bind(&bus.id)
    .bind(&bus.route_id)
    .bind(&bus.bus_number)
    .bind(&bus.name)
    .bind(bus.total_seats)
    .bind(bus.fare_cents)
    .bind(bus.is_active)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("bus number already exists")
        } else {
            ApiError::db("bus insert", e)
        }
    })?;

    let seat_ids: Vec<String> = (0..bus.total_seats)
        .map(|_| Uuid::new_v4().to_string())
        .collect();
    let seat_numbers: Vec<i32> = (1..=bus.total_seats).collect();
    sqlx::query(&format!(
        "INSERT INTO {seats} (id,bus_id,seat_number) \
         SELECT u.id, $2, u.n FROM UNNEST($1::VARCHAR[], $3::INTEGER[]) AS u(id, n)"
    ))
    .bind(&seat_ids)
    .bind(&bus.id)
    .bind(&seat_numbers)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::db("seat insert", e))?;
    tx.commit()
        .await
        .map_err(|e| ApiError::db("create_bus commit", e))?;

    tracing::info!(bus_id = %bus.id, seats = bus.total_seats, admin = %admin.user_id, "bus created");
    Ok((StatusCode::CREATED, Json(bus)))
}

pub async fn update_trip_status(
    Path(trip_id): Path<String>,
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(body): ApiJson<TripStatusIn>,
) -> ApiResult<Json<TripOut>> {
    let next = TripStatus::parse(&body.status)
        .ok_or_else(|| ApiError::bad_request("unknown trip status"))?;
    let trips = state.table("trips");

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiError::db("trip status begin", e))?;
    let row = sqlx::query(&format!(
        "SELECT {TRIP_COLUMNS} FROM {trips} WHERE id=$1 FOR UPDATE"
    ))
    .bind(trip_id.trim())
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| ApiError::db("trip status lookup", e))?
    .ok_or_else(|| ApiError::not_found("trip not found"))?;
    let mut trip = trip_from_row(&row).map_err(|e| ApiError::db("trip decode", e))?;

    if !trip.status.can_transition_to(next) {
        return Err(ApiError::conflict(format!(
            "cannot move trip from {} to {}",
            trip.status.as_str(),
            next.as_str()
        )));
    }
    sqlx::query(&format!("UPDATE {trips} SET status=$1 WHERE id=$2"))
        .bind(next.as_str())
        .bind(&trip.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::db("trip status update", e))?;
    tx.commit()
        .await
        .map_err(|e| ApiError::db("trip status commit", e))?;

    tracing::info!(
        trip_id = %trip.id,
        from = trip.status.as_str(),
        to = next.as_str(),
        admin = %admin.user_id,
        "trip status changed"
    );
    trip.status = next;
    Ok(Json(trip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_coordinates_are_range_checked() {
        let ok = clean_stop(&StopIn {
            name: Some("  Depot ".into()),
            lat: Some(18.52),
            lng: Some(73.85),
        })
        .expect("valid");
        assert_eq!(ok.name.as_deref(), Some("Depot"));

        let errors = clean_stop(&StopIn {
            name: None,
            lat: Some(95.0),
            lng: Some(-181.0),
        })
        .expect_err("out of range");
        assert_eq!(errors["lat"], vec!["Latitude must be between -90 and 90.".to_string()]);
        assert!(errors.contains_key("lng"));

        let errors = clean_stop(&StopIn {
            name: None,
            lat: None,
            lng: Some(1.0),
        })
        .expect_err("missing lat");
        assert_eq!(errors["lat"], vec![REQUIRED.to_string()]);
    }

    #[test]
    fn blank_stop_name_falls_back_to_default() {
        let point = clean_stop(&StopIn {
            name: Some("   ".into()),
            lat: Some(0.0),
            lng: Some(0.0),
        })
        .expect("valid");
        assert_eq!(point.name, None);
        assert_eq!(plan_stops(&[point], None, 3)[0].name, "Stop 3");
    }
}
