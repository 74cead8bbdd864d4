//! Derived cache-key helpers.
//!
//! Viewport queries arrive with continuous coordinates; keys round them to a
//! fixed precision so near-identical viewports collapse onto the same cache
//! entry. Chat zone ids use a much coarser grid - one decimal place, roughly
//! an 11 km cell - which doubles as the chat room identifier.

/// Key for a viewport-bounded query. Four decimal places is about 11 m, so
/// panning the map by less than that reuses the cached entry.
pub fn viewport_key(
    category: &str,
    south: f64,
    north: f64,
    west: f64,
    east: f64,
    limit: i64,
) -> String {
    format!("{category}:bounds:{south:.4}:{north:.4}:{west:.4}:{east:.4}:{limit}")
}

/// Key for a "top N" query; a function of the limit alone.
pub fn top_n_key(category: &str, limit: i64) -> String {
    format!("{category}:top:{limit}")
}

/// Grid-cell chat zone id for a coordinate, rounded to one decimal place.
/// Users straddling a cell boundary land in different zones; that coarse
/// partitioning is part of the zone contract.
pub fn zone_id(lat: f64, lng: f64) -> String {
    format!("{lat:.1}_{lng:.1}")
}

/// Parses a grid-cell zone id back into coordinates. Returns `None` for ids
/// that are not coordinate-shaped (private room visibility entries).
pub fn parse_zone_id(zone_id: &str) -> Option<(f64, f64)> {
    let (lat, lng) = zone_id.split_once('_')?;
    Some((lat.parse().ok()?, lng.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_identical_viewports_collapse_to_one_key() {
        let a = viewport_key("notes", -34.60001, -34.50002, -58.50001, -58.40002, 50);
        let b = viewport_key("notes", -34.60004, -34.49999, -58.49998, -58.40001, 50);

        assert_eq!(a, b);
        assert_eq!(a, "notes:bounds:-34.6000:-34.5000:-58.5000:-58.4000:50");
    }

    #[test]
    fn distinct_viewports_get_distinct_keys() {
        let a = viewport_key("notes", -34.6, -34.5, -58.5, -58.4, 50);
        let b = viewport_key("notes", -34.6, -34.5, -58.5, -58.4, 100);
        let c = viewport_key("notes", -34.7, -34.5, -58.5, -58.4, 50);

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn top_n_key_depends_on_limit_alone() {
        assert_eq!(top_n_key("notes", 10), "notes:top:10");
        assert_ne!(top_n_key("notes", 10), top_n_key("notes", 20));
    }

    #[test]
    fn zone_id_rounds_to_one_decimal() {
        assert_eq!(zone_id(-34.6037, -58.3816), "-34.6_-58.4");
        assert_eq!(zone_id(-34.649, -58.351), "-34.6_-58.4");
    }

    #[test]
    fn zone_id_round_trips_through_parse() {
        let id = zone_id(40.4168, -3.7038);
        assert_eq!(parse_zone_id(&id), Some((40.4, -3.7)));
    }

    #[test]
    fn non_coordinate_zone_ids_do_not_parse() {
        assert_eq!(parse_zone_id("room_1a2b3c"), None);
        assert_eq!(parse_zone_id("garbage"), None);
    }
}
