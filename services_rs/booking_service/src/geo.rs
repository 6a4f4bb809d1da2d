//! Great-circle distances between route stops and parsing of submitted stop lists.

use serde_json::Value;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
const MAX_STOP_NAME_LEN: usize = 100;

/// Haversine distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Stored distances keep two decimals (10 m resolution).
pub fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopPoint {
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStop {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub sequence_number: i32,
    pub distance_from_previous_km: f64,
}

/// Assigns sequence numbers starting at `first_sequence` and distances from the
/// preceding point. `previous` is the last stop already on the route, if any.
pub fn plan_stops(
    points: &[StopPoint],
    previous: Option<(f64, f64)>,
    first_sequence: i32,
) -> Vec<PlannedStop> {
    let mut prev = previous;
    let mut out = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let sequence_number = first_sequence + i as i32;
        let distance = match prev {
            Some((plat, plng)) => round_km(haversine_km(plat, plng, p.lat, p.lng)),
            None => 0.0,
        };
        out.push(PlannedStop {
            name: p
                .name
                .clone()
                .unwrap_or_else(|| format!("Stop {sequence_number}")),
            latitude: p.lat,
            longitude: p.lng,
            sequence_number,
            distance_from_previous_km: distance,
        });
        prev = Some((p.lat, p.lng));
    }
    out
}

fn coordinate(v: Option<&Value>, field: &str) -> Result<f64, String> {
    let x = match v {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("{field} is not a number"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("{field} is not a number"))?,
        Some(_) => return Err(format!("{field} is not a number")),
    };
    if !x.is_finite() {
        return Err(format!("{field} is not finite"));
    }
    Ok(x)
}

fn stop_name(v: Option<&Value>) -> Option<String> {
    let raw = match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        return None;
    }
    Some(raw.chars().take(MAX_STOP_NAME_LEN).collect())
}

/// Result of reading a submitted stop list. `points` holds every entry before
/// the first malformed one; `error` describes that entry.
#[derive(Debug, Default, PartialEq)]
pub struct StopList {
    pub points: Vec<StopPoint>,
    pub error: Option<String>,
}

impl StopList {
    fn failed(error: impl Into<String>) -> Self {
        Self { points: Vec::new(), error: Some(error.into()) }
    }
}

/// Accepts a JSON array of `{name, lat, lng}` objects, or a string containing one.
/// Coordinates may be numbers or numeric strings; a missing coordinate counts as 0.
/// Reading stops at the first malformed entry.
pub fn parse_stop_list(raw: &Value) -> StopList {
    let parsed;
    let items = match raw {
        Value::Null => return StopList::default(),
        Value::String(s) if s.trim().is_empty() => return StopList::default(),
        Value::String(s) => {
            parsed = match serde_json::from_str::<Value>(s) {
                Ok(v) => v,
                Err(e) => return StopList::failed(e.to_string()),
            };
            match &parsed {
                Value::Array(items) => items,
                _ => return StopList::failed("stops must be a JSON array"),
            }
        }
        Value::Array(items) => items,
        _ => return StopList::failed("stops must be a JSON array"),
    };

    let mut list = StopList { points: Vec::with_capacity(items.len()), error: None };
    for (i, item) in items.iter().enumerate() {
        let point = match item {
            Value::Object(obj) => coordinate(obj.get("lat"), "lat").and_then(|lat| {
                Ok(StopPoint {
                    name: stop_name(obj.get("name")),
                    lat,
                    lng: coordinate(obj.get("lng"), "lng")?,
                })
            }),
            _ => Err("not an object".to_string()),
        };
        match point {
            Ok(p) => list.points.push(p),
            Err(reason) => {
                list.error = Some(format!("stop {}: {reason}", i + 1));
                break;
            }
        }
    }
    list
}
