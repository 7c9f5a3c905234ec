//! Travel-time tool (§4.7). Grounded on `world::LocationConnection`'s
//! `travel_time_minutes` field and the connection lookup-by-name pattern
//! now lives in [`crate::campaign::Location::resolve_connection`].

use crate::campaign::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelMode {
    Walk,
    Hike,
    Run,
    Horse,
    Wagon,
    Boat,
    Ship,
    Swim,
}

impl TravelMode {
    pub fn mph(&self) -> f32 {
        match self {
            TravelMode::Walk => 3.0,
            TravelMode::Hike => 2.0,
            TravelMode::Run => 6.0,
            TravelMode::Horse => 8.0,
            TravelMode::Wagon => 4.0,
            TravelMode::Boat => 5.0,
            TravelMode::Ship => 10.0,
            TravelMode::Swim => 1.0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "walk" => Some(TravelMode::Walk),
            "hike" => Some(TravelMode::Hike),
            "run" => Some(TravelMode::Run),
            "horse" => Some(TravelMode::Horse),
            "wagon" => Some(TravelMode::Wagon),
            "boat" => Some(TravelMode::Boat),
            "ship" => Some(TravelMode::Ship),
            "swim" => Some(TravelMode::Swim),
            _ => None,
        }
    }
}

/// Travel duration in minutes for `distance` miles at `mode` (§4.7).
pub fn travel_time_minutes(distance_miles: f32, mode: TravelMode) -> u32 {
    ((distance_miles / mode.mph()) * 60.0).round() as u32
}

/// Result of resolving a destination named in prose against the current
/// location's known connections.
pub struct TravelResolution {
    pub destination_id: Option<String>,
    pub minutes: u32,
}

/// Resolve a destination mentioned in prose and compute travel time.
/// If the destination cannot be resolved, time still advances per the
/// default rule in the caller, but `destination_id` is `None` and
/// `current_location_id` is left unchanged (§8 boundary case).
pub fn resolve_travel(current: &Location, destination_name: &str, mode: TravelMode) -> TravelResolution {
    match current.resolve_connection(destination_name) {
        Some(conn) => TravelResolution {
            destination_id: Some(conn.destination_id.clone()),
            minutes: travel_time_minutes(conn.distance_miles, mode),
        },
        None => TravelResolution {
            destination_id: None,
            minutes: 5,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::LocationConnection;

    #[test]
    fn travel_time_matches_mph_table() {
        assert_eq!(travel_time_minutes(3.0, TravelMode::Walk), 60);
        assert_eq!(travel_time_minutes(8.0, TravelMode::Horse), 60);
    }

    #[test]
    fn unresolved_destination_still_advances_default_time() {
        let loc = Location {
            id: "a".into(),
            name: "A".into(),
            description: String::new(),
            connections: vec![LocationConnection {
                destination_id: "b".into(),
                destination_name: "Market".into(),
                distance_miles: 1.0,
            }],
            npc_ids: Vec::new(),
            area_flags: Vec::new(),
        };
        let resolution = resolve_travel(&loc, "the dungeon", TravelMode::Walk);
        assert!(resolution.destination_id.is_none());
        assert_eq!(resolution.minutes, 5);
    }

    #[test]
    fn resolved_destination_returns_connection_id() {
        let loc = Location {
            id: "a".into(),
            name: "A".into(),
            description: String::new(),
            connections: vec![LocationConnection {
                destination_id: "b".into(),
                destination_name: "Market".into(),
                distance_miles: 3.0,
            }],
            npc_ids: Vec::new(),
            area_flags: Vec::new(),
        };
        let resolution = resolve_travel(&loc, "market", TravelMode::Walk);
        assert_eq!(resolution.destination_id.as_deref(), Some("b"));
        assert_eq!(resolution.minutes, 60);
    }
}
