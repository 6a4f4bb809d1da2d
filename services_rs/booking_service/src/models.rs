use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Statuses that hold seats on a (bus, date).
    pub const HOLDING: [BookingStatus; 2] = [Self::Pending, Self::Confirmed];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (InProgress, Completed)
                | (NotStarted, Cancelled)
                | (InProgress, Cancelled)
        )
    }

    pub fn accepts_bookings(self) -> bool {
        self == Self::NotStarted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "created" => Some(Self::Created),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// --- routes & stops ---

#[derive(Debug, Deserialize)]
pub struct RouteIn {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    pub is_active: Option<bool>,
    /// JSON array of `{name, lat, lng}` or a string holding one.
    pub stops: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Clone)]
pub struct RouteOut {
    pub id: String,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct StopIn {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Serialize, Clone)]
pub struct StopOut {
    pub id: String,
    pub route_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub sequence_number: i32,
    pub distance_from_previous_km: f64,
}

#[derive(Debug, Serialize)]
pub struct RouteDetailOut {
    pub route: RouteOut,
    pub stops: Vec<StopOut>,
    pub total_distance_km: f64,
}

// --- buses & seats ---

#[derive(Debug, Deserialize)]
pub struct BusIn {
    #[serde(default)]
    pub route_id: String,
    #[serde(default)]
    pub bus_number: String,
    #[serde(default)]
    pub name: String,
    pub total_seats: Option<i32>,
    #[serde(default)]
    pub fare_cents: i64,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Clone)]
pub struct BusOut {
    pub id: String,
    pub route_id: String,
    pub bus_number: String,
    pub name: String,
    pub total_seats: i32,
    pub fare_cents: i64,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct BusDetailOut {
    pub bus: BusOut,
    pub route: RouteOut,
}

#[derive(Debug, Serialize)]
pub struct SeatStatusOut {
    pub bus_id: String,
    pub travel_date: String,
    pub total_seats: i32,
    pub booked_seats: i64,
    pub available_seats: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SeatOut {
    pub seat_number: i32,
    pub is_booked: bool,
}

#[derive(Debug, Serialize)]
pub struct SeatLayoutOut {
    pub bus_id: String,
    pub travel_date: String,
    pub seats_per_row: usize,
    pub rows: Vec<Vec<SeatOut>>,
}

// --- trips ---

#[derive(Debug, Serialize, Clone)]
pub struct TripOut {
    pub id: String,
    pub bus_id: String,
    pub travel_date: String,
    pub status: TripStatus,
}

#[derive(Debug, Deserialize)]
pub struct TripStatusIn {
    pub status: String,
}

// --- bookings ---

#[derive(Debug, Deserialize)]
pub struct BookingIn {
    #[serde(default)]
    pub travel_date: String,
    pub from_stop: Option<String>,
    pub to_stop: Option<String>,
    pub seats_booked: Option<i32>,
    #[serde(default)]
    pub passenger_name: String,
    #[serde(default)]
    pub passenger_phone: String,
    #[serde(default)]
    pub passenger_email: String,
    pub seat_numbers: Option<Vec<i32>>,
}

#[derive(Debug, Serialize)]
pub struct BookingFormOut {
    pub bus: BusOut,
    pub travel_date: String,
    pub from_stop: String,
    pub to_stop: String,
    pub seats_booked: i32,
    pub passenger_name: String,
    pub passenger_email: String,
    pub passenger_phone: String,
    pub availability: SeatStatusOut,
}

#[derive(Debug, Serialize, Clone)]
pub struct BookingOut {
    pub id: String,
    pub user_id: String,
    pub bus_id: String,
    pub trip_id: String,
    pub travel_date: String,
    pub from_stop: String,
    pub to_stop: String,
    pub seats_booked: i32,
    pub passenger_name: String,
    pub passenger_phone: String,
    pub passenger_email: String,
    pub status: BookingStatus,
    pub total_fare_cents: i64,
    pub seat_numbers: Vec<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct BookingTrackOut {
    pub booking: BookingOut,
    pub trip: TripOut,
    pub bus: BusOut,
    pub route: RouteOut,
    pub stops: Vec<StopOut>,
}

// --- payments ---

#[derive(Debug, Deserialize)]
pub struct PaymentCallbackParams {
    #[serde(rename = "paymentId")]
    pub payment_id: Option<String>,
    #[serde(rename = "PayerID")]
    pub payer_id: Option<String>,
}

// --- chat ---

#[derive(Debug, Deserialize)]
pub struct ChatIn {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ChatOut {
    Reply { reply: String, status: &'static str },
    Error { error: String, status: &'static str },
}

impl ChatOut {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            reply: text.into(),
            status: "success",
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error {
            error: text.into(),
            status: "error",
        }
    }
}
