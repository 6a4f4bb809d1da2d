use sqlx::postgres::{PgPool, PgPoolOptions};

fn table_name(schema: &Option<String>, name: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{name}"),
        None => name.to_string(),
    }
}

pub async fn connect(db_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(db_url)
        .await
}

pub async fn ensure_schema(pool: &PgPool, db_schema: &Option<String>) -> Result<(), sqlx::Error> {
    if let Some(schema) = db_schema {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(pool)
            .await?;
    }

    let routes = table_name(db_schema, "routes");
    let stops = table_name(db_schema, "stops");
    let buses = table_name(db_schema, "buses");
    let seats = table_name(db_schema, "seats");
    let trips = table_name(db_schema, "trips");
    let bookings = table_name(db_schema, "bookings");
    let booking_seats = table_name(db_schema, "booking_seats");
    let payments = table_name(db_schema, "payments");

    // Order matters: foreign keys point at tables created earlier.
    let ddls = [
        format!(
            "CREATE TABLE IF NOT EXISTS {routes} (\
             id VARCHAR(36) PRIMARY KEY,\
             name VARCHAR(100) NOT NULL,\
             origin VARCHAR(100) NOT NULL,\
             destination VARCHAR(100) NOT NULL,\
             is_active BOOLEAN NOT NULL DEFAULT TRUE,\
             created_at TEXT NOT NULL\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {stops} (\
             id VARCHAR(36) PRIMARY KEY,\
             route_id VARCHAR(36) NOT NULL REFERENCES {routes}(id) ON DELETE CASCADE,\
             name VARCHAR(100) NOT NULL,\
             latitude DOUBLE PRECISION NOT NULL,\
             longitude DOUBLE PRECISION NOT NULL,\
             sequence_number INTEGER NOT NULL,\
             distance_from_previous_km DOUBLE PRECISION NOT NULL DEFAULT 0,\
             UNIQUE (route_id, sequence_number)\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {buses} (\
             id VARCHAR(36) PRIMARY KEY,\
             route_id VARCHAR(36) NOT NULL REFERENCES {routes}(id) ON DELETE CASCADE,\
             bus_number VARCHAR(32) NOT NULL UNIQUE,\
             name VARCHAR(100) NOT NULL,\
             total_seats INTEGER NOT NULL,\
             fare_cents BIGINT NOT NULL DEFAULT 0,\
             is_active BOOLEAN NOT NULL DEFAULT TRUE\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {seats} (\
             id VARCHAR(36) PRIMARY KEY,\
             bus_id VARCHAR(36) NOT NULL REFERENCES {buses}(id) ON DELETE CASCADE,\
             seat_number INTEGER NOT NULL,\
             UNIQUE (bus_id, seat_number)\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {trips} (\
             id VARCHAR(36) PRIMARY KEY,\
             bus_id VARCHAR(36) NOT NULL REFERENCES {buses}(id) ON DELETE CASCADE,\
             travel_date VARCHAR(10) NOT NULL,\
             status VARCHAR(16) NOT NULL DEFAULT 'not_started',\
             created_at TEXT NOT NULL,\
             UNIQUE (bus_id, travel_date)\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {bookings} (\
             id VARCHAR(36) PRIMARY KEY,\
             user_id VARCHAR(64) NOT NULL,\
             bus_id VARCHAR(36) NOT NULL REFERENCES {buses}(id) ON DELETE CASCADE,\
             trip_id VARCHAR(36) NOT NULL REFERENCES {trips}(id) ON DELETE CASCADE,\
             travel_date VARCHAR(10) NOT NULL,\
             from_stop VARCHAR(100) NOT NULL,\
             to_stop VARCHAR(100) NOT NULL,\
             seats_booked INTEGER NOT NULL,\
             passenger_name VARCHAR(100) NOT NULL,\
             passenger_phone VARCHAR(20) NOT NULL,\
             passenger_email VARCHAR(254) NOT NULL,\
             status VARCHAR(16) NOT NULL DEFAULT 'pending',\
             total_fare_cents BIGINT NOT NULL DEFAULT 0,\
             created_at TEXT NOT NULL,\
             updated_at TEXT NOT NULL\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {booking_seats} (\
             booking_id VARCHAR(36) NOT NULL REFERENCES {bookings}(id) ON DELETE CASCADE,\
             bus_id VARCHAR(36) NOT NULL,\
             travel_date VARCHAR(10) NOT NULL,\
             seat_number INTEGER NOT NULL,\
             PRIMARY KEY (booking_id, seat_number)\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {payments} (\
             id VARCHAR(36) PRIMARY KEY,\
             booking_id VARCHAR(36) NOT NULL REFERENCES {bookings}(id) ON DELETE CASCADE,\
             gateway_order_id VARCHAR(64) NOT NULL UNIQUE,\
             amount_cents BIGINT NOT NULL,\
             currency VARCHAR(3) NOT NULL,\
             status VARCHAR(16) NOT NULL DEFAULT 'created',\
             created_at TEXT NOT NULL,\
             updated_at TEXT NOT NULL\
             )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_stops_route ON {stops}(route_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_buses_route ON {buses}(route_id)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_bookings_bus_date ON {bookings}(bus_id, travel_date)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_bookings_user ON {bookings}(user_id)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_bookings_status_created ON {bookings}(status, created_at)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_booking_seats_bus_date ON {booking_seats}(bus_id, travel_date)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_payments_booking ON {payments}(booking_id)"),
    ];

    for ddl in ddls {
        sqlx::query(&ddl).execute(pool).await?;
    }

    Ok(())
}
