use crate::error::{FieldErrors, NON_FIELD_ERRORS};
use crate::models::{BookingIn, BusIn, RouteIn};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

pub const MIN_SEATS_PER_BOOKING: i32 = 1;
pub const MAX_SEATS_PER_BOOKING: i32 = 10;
pub const MAX_SEATS_PER_BUS: i32 = 100;

const MAX_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;
const MAX_EMAIL_LEN: usize = 254;
const MAX_BUS_NUMBER_LEN: usize = 32;

pub const REQUIRED: &str = "This field is required.";

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9][0-9 ()-]{5,}$").expect("valid regex"))
}

fn push(errors: &mut FieldErrors, field: &str, msg: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(msg.into());
}

fn required_text(errors: &mut FieldErrors, field: &str, raw: &str, max_len: usize) -> String {
    let v = raw.trim();
    if v.is_empty() {
        push(errors, field, REQUIRED);
    } else if v.chars().count() > max_len {
        push(
            errors,
            field,
            format!("Ensure this value has at most {max_len} characters."),
        );
    }
    v.to_string()
}

pub fn parse_travel_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// What the bus being booked contributes to validation.
#[derive(Debug, Clone, Copy)]
pub struct BookingContext<'a> {
    pub today: NaiveDate,
    pub route_origin: &'a str,
    pub route_destination: &'a str,
    pub total_seats: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanBooking {
    pub travel_date: NaiveDate,
    pub from_stop: String,
    pub to_stop: String,
    pub seats_booked: i32,
    pub passenger_name: String,
    pub passenger_phone: String,
    pub passenger_email: String,
    pub seat_numbers: Vec<i32>,
}

struct PassengerFields {
    travel_date: Option<NaiveDate>,
    seats: i32,
    passenger_name: String,
    passenger_phone: String,
    passenger_email: String,
}

fn check_passenger_fields(body: &BookingIn, today: NaiveDate, errors: &mut FieldErrors) -> PassengerFields {
    let travel_date = match parse_travel_date(&body.travel_date) {
        None if body.travel_date.trim().is_empty() => {
            push(errors, "travel_date", REQUIRED);
            None
        }
        None => {
            push(errors, "travel_date", "Enter a valid date.");
            None
        }
        Some(d) if d < today => {
            push(errors, "travel_date", "Travel date cannot be in the past.");
            None
        }
        Some(d) => Some(d),
    };

    let seats = match body.seats_booked {
        None => {
            push(errors, "seats_booked", REQUIRED);
            0
        }
        Some(n) if n < MIN_SEATS_PER_BOOKING => {
            push(errors, "seats_booked", "At least 1 seat must be booked.");
            n
        }
        Some(n) if n > MAX_SEATS_PER_BOOKING => {
            push(errors, "seats_booked", "Maximum 10 seats allowed.");
            n
        }
        Some(n) => n,
    };

    let passenger_name = required_text(errors, "passenger_name", &body.passenger_name, MAX_NAME_LEN);
    let passenger_phone =
        required_text(errors, "passenger_phone", &body.passenger_phone, MAX_PHONE_LEN);
    if !passenger_phone.is_empty()
        && passenger_phone.len() <= MAX_PHONE_LEN
        && !phone_re().is_match(&passenger_phone)
    {
        push(errors, "passenger_phone", "Enter a valid phone number.");
    }
    let passenger_email =
        required_text(errors, "passenger_email", &body.passenger_email, MAX_EMAIL_LEN);
    if !passenger_email.is_empty()
        && passenger_email.len() <= MAX_EMAIL_LEN
        && !email_re().is_match(&passenger_email)
    {
        push(errors, "passenger_email", "Enter a valid email address.");
    }

    PassengerFields {
        travel_date,
        seats,
        passenger_name,
        passenger_phone,
        passenger_email,
    }
}

/// Checks that need neither the bus nor the database: date, seat count, passenger.
pub fn precheck_booking(body: &BookingIn, today: NaiveDate) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_passenger_fields(body, today, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Full form check against the bus being booked. Capacity is checked separately.
pub fn clean_booking(body: &BookingIn, ctx: BookingContext<'_>) -> Result<CleanBooking, FieldErrors> {
    let mut errors = FieldErrors::new();
    let PassengerFields {
        travel_date,
        seats,
        passenger_name,
        passenger_phone,
        passenger_email,
    } = check_passenger_fields(body, ctx.today, &mut errors);

    let from_stop = body
        .from_stop
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ctx.route_origin);
    let from_stop = required_text(&mut errors, "from_stop", from_stop, MAX_NAME_LEN);
    let to_stop = body
        .to_stop
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ctx.route_destination);
    let to_stop = required_text(&mut errors, "to_stop", to_stop, MAX_NAME_LEN);

    let mut seat_numbers: Vec<i32> = Vec::new();
    if let Some(selected) = body.seat_numbers.as_deref() {
        let mut seen = HashSet::new();
        for &sn in selected {
            if sn < 1 || sn > ctx.total_seats {
                push(
                    &mut errors,
                    "seat_numbers",
                    format!("Seat {sn} does not exist on this bus."),
                );
            } else if !seen.insert(sn) {
                push(&mut errors, "seat_numbers", format!("Seat {sn} is listed twice."));
            }
        }
        if body.seats_booked.is_some() && selected.len() != seats.max(0) as usize {
            push(
                &mut errors,
                "seat_numbers",
                "Select exactly as many seats as you are booking.",
            );
        }
        seat_numbers = selected.to_vec();
        seat_numbers.sort_unstable();
    }

    match travel_date {
        Some(travel_date) if errors.is_empty() => Ok(CleanBooking {
            travel_date,
            from_stop,
            to_stop,
            seats_booked: seats,
            passenger_name,
            passenger_phone,
            passenger_email,
            seat_numbers,
        }),
        _ => Err(errors),
    }
}

pub fn available_seats(total_seats: i32, booked: i64) -> i64 {
    (total_seats as i64 - booked).max(0)
}

/// `booked` is the sum of seats held by pending and confirmed bookings on the same
/// bus and date.
pub fn check_capacity(requested: i32, total_seats: i32, booked: i64) -> Result<(), FieldErrors> {
    let available = available_seats(total_seats, booked);
    if requested as i64 > available {
        let mut errors = FieldErrors::new();
        push(
            &mut errors,
            NON_FIELD_ERRORS,
            format!("Only {available} seat(s) available for this bus."),
        );
        return Err(errors);
    }
    Ok(())
}

pub fn check_seats_free(selected: &[i32], taken: &HashSet<i32>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    for sn in selected {
        if taken.contains(sn) {
            push(&mut errors, "seat_numbers", format!("Seat {sn} is already booked."));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanRoute {
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub is_active: bool,
}

pub fn clean_route(body: &RouteIn) -> Result<CleanRoute, FieldErrors> {
    let mut errors = FieldErrors::new();
    let name = required_text(&mut errors, "name", &body.name, MAX_NAME_LEN);
    let origin = required_text(&mut errors, "origin", &body.origin, MAX_NAME_LEN);
    let destination = required_text(&mut errors, "destination", &body.destination, MAX_NAME_LEN);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(CleanRoute {
        name,
        origin,
        destination,
        is_active: body.is_active.unwrap_or(true),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanBus {
    pub route_id: String,
    pub bus_number: String,
    pub name: String,
    pub total_seats: i32,
    pub fare_cents: i64,
    pub is_active: bool,
}

pub fn clean_bus(body: &BusIn) -> Result<CleanBus, FieldErrors> {
    let mut errors = FieldErrors::new();
    let route_id = required_text(&mut errors, "route_id", &body.route_id, 36);
    let bus_number = required_text(&mut errors, "bus_number", &body.bus_number, MAX_BUS_NUMBER_LEN);
    let name = required_text(&mut errors, "name", &body.name, MAX_NAME_LEN);
    let total_seats = body.total_seats.unwrap_or(0);
    if body.total_seats.is_none() {
        push(&mut errors, "total_seats", REQUIRED);
    } else if !(1..=MAX_SEATS_PER_BUS).contains(&total_seats) {
        push(
            &mut errors,
            "total_seats",
            format!("Total seats must be between 1 and {MAX_SEATS_PER_BUS}."),
        );
    }
    if body.fare_cents < 0 {
        push(&mut errors, "fare_cents", "Fare cannot be negative.");
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(CleanBus {
        route_id,
        bus_number: bus_number.to_ascii_uppercase(),
        name,
        total_seats,
        fare_cents: body.fare_cents,
        is_active: body.is_active.unwrap_or(true),
    })
}
