use serde::{Deserialize, Serialize};

/// The primary quantum of the system: a single vehicle position sample.
///
/// `timestamp_ms` is monotone per `vehicle_id` within the hot cache (§3
/// invariant 1) — callers must not assume it is monotone across vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub vehicle_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: f64,
    pub timestamp_ms: u64,
}

/// Field-level validation failure, collected (not short-circuited) so the
/// caller can report every offending field at once per spec §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    MissingVehicleId,
    LatOutOfRange,
    LngOutOfRange,
    NegativeSpeed,
    HeadingOutOfRange,
}

impl FieldError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldError::MissingVehicleId => "vehicleId must be a non-empty string",
            FieldError::LatOutOfRange => "lat must be within [-90, 90]",
            FieldError::LngOutOfRange => "lng must be within [-180, 180]",
            FieldError::NegativeSpeed => "speed must be >= 0",
            FieldError::HeadingOutOfRange => "heading must be within [0, 360)",
        }
    }
}

/// Raw shape accepted over the wire, before validation. Missing numeric
/// fields default to 0 and a missing timestamp defaults to receive time
/// (§4.G validation rules).
#[derive(Debug, Clone, Deserialize)]
pub struct RawPositionUpdate {
    #[serde(alias = "vehicle_id")]
    pub vehicle_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default, alias = "timestamp_ms")]
    pub timestamp_ms: Option<u64>,
}

/// Validate a raw update, collecting every offending field rather than
/// stopping at the first one (§7 "Validation failures return all offending
/// fields at once").
pub fn validate(raw: &RawPositionUpdate) -> Result<(), Vec<FieldError>> {
    let mut errs = Vec::new();
    if raw.vehicle_id.trim().is_empty() {
        errs.push(FieldError::MissingVehicleId);
    }
    if !(-90.0..=90.0).contains(&raw.lat) {
        errs.push(FieldError::LatOutOfRange);
    }
    if !(-180.0..=180.0).contains(&raw.lng) {
        errs.push(FieldError::LngOutOfRange);
    }
    if raw.speed < 0.0 {
        errs.push(FieldError::NegativeSpeed);
    }
    if !(0.0..360.0).contains(&raw.heading) {
        errs.push(FieldError::HeadingOutOfRange);
    }
    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

/// Turn a validated raw update into a canonical `Position`, defaulting the
/// timestamp to `now_ms` when absent.
pub fn into_position(raw: RawPositionUpdate, now_ms: u64) -> Position {
    Position {
        vehicle_id: raw.vehicle_id,
        lat: raw.lat,
        lng: raw.lng,
        speed: raw.speed,
        heading: raw.heading,
        accuracy: raw.accuracy,
        altitude: raw.altitude,
        timestamp_ms: raw.timestamp_ms.unwrap_or(now_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(lat: f64, lng: f64) -> RawPositionUpdate {
        RawPositionUpdate {
            vehicle_id: "veh_abc".into(),
            lat,
            lng,
            speed: 10.0,
            heading: 0.0,
            accuracy: 0.0,
            altitude: 0.0,
            timestamp_ms: None,
        }
    }

    #[test]
    fn accepts_in_range_fields() {
        assert!(validate(&raw(12.97, 77.59)).is_ok());
    }

    #[test]
    fn rejects_out_of_range_lat_and_lng_together() {
        let r = raw(999.0, 999.0);
        let errs = validate(&r).unwrap_err();
        assert!(errs.contains(&FieldError::LatOutOfRange));
        assert!(errs.contains(&FieldError::LngOutOfRange));
        assert_eq!(errs.len(), 2, "both offending fields must be reported at once");
    }

    #[test]
    fn rejects_empty_vehicle_id() {
        let mut r = raw(0.0, 0.0);
        r.vehicle_id = "  ".into();
        let errs = validate(&r).unwrap_err();
        assert_eq!(errs, vec![FieldError::MissingVehicleId]);
    }

    #[test]
    fn rejects_negative_speed_and_heading_360() {
        let mut r = raw(0.0, 0.0);
        r.speed = -1.0;
        r.heading = 360.0;
        let errs = validate(&r).unwrap_err();
        assert!(errs.contains(&FieldError::NegativeSpeed));
        assert!(errs.contains(&FieldError::HeadingOutOfRange));
    }

    #[test]
    fn missing_timestamp_defaults_to_receive_time() {
        let r = raw(1.0, 1.0);
        let pos = into_position(r, 42_000);
        assert_eq!(pos.timestamp_ms, 42_000);
    }
}
