//! Scan arc geometry: a pure predicate shared by the per-tick action
//! applicator (scan completion) and snapshot construction (the live scan
//! hint accompanying state broadcasts).

/// `((x mod 360) + 360) mod 360`, i.e. degrees normalized into `[0, 360)`.
pub fn normalize_deg(x: f64) -> f64 {
    ((x % 360.0) + 360.0) % 360.0
}

/// Is `target_pos` within `range` of `scanner_pos` and inside the clockwise
/// arc from `a_deg` to `b_deg`, measured relative to `scanner_heading_deg`?
///
/// `a_deg`/`b_deg` are clockwise-relative to heading; `a_deg == b_deg` (after
/// normalization) is the full-circle case.
pub fn is_in_scan_arc(
    scanner_pos: [f64; 2],
    scanner_heading_deg: f64,
    target_pos: [f64; 2],
    a_deg: f64,
    b_deg: f64,
    range: f64,
) -> bool {
    let dx = target_pos[0] - scanner_pos[0];
    let dy = target_pos[1] - scanner_pos[1];
    let dist_sq = dx * dx + dy * dy;
    if dist_sq > range * range {
        return false;
    }
    if dx == 0.0 && dy == 0.0 {
        return true;
    }

    let bearing = normalize_deg(dy.atan2(dx).to_degrees());
    let rel_bearing = normalize_deg(bearing - scanner_heading_deg);

    let a = normalize_deg(a_deg);
    let b = normalize_deg(b_deg);
    if a == b {
        return true;
    }

    let arc_span = normalize_deg(b - a);
    let offset = normalize_deg(rel_bearing - a);
    offset <= arc_span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_negative_and_large_values() {
        assert_eq!(normalize_deg(0.0), 0.0);
        assert_eq!(normalize_deg(360.0), 0.0);
        assert_eq!(normalize_deg(-90.0), 270.0);
        assert_eq!(normalize_deg(720.0 + 10.0), 10.0);
        assert_eq!(normalize_deg(-730.0), 350.0);
    }

    #[test]
    fn directly_ahead_is_detected() {
        let found = is_in_scan_arc([100.0, 100.0], 0.0, [200.0, 100.0], -30.0, 30.0, 700.0);
        assert!(found);
    }

    #[test]
    fn wrap_around_rear_arc_detects_due_west() {
        // heading 0, opponent due west: bearing is 180, relative bearing 180.
        // scan(170, -170) normalizes to (170, 190), which spans the rear.
        let found = is_in_scan_arc([100.0, 100.0], 0.0, [0.0, 100.0], 170.0, -170.0, 700.0);
        assert!(found);

        // The forward arc should not catch the same opponent.
        let not_found = is_in_scan_arc([100.0, 100.0], 0.0, [0.0, 100.0], -30.0, 30.0, 700.0);
        assert!(!not_found);
    }

    #[test]
    fn out_of_range_rejects_even_inside_arc() {
        let found = is_in_scan_arc([0.0, 0.0], 90.0, [0.0, 800.0], -45.0, 45.0, 700.0);
        assert!(!found);
    }

    #[test]
    fn full_circle_when_a_equals_b() {
        let found = is_in_scan_arc([0.0, 0.0], 37.0, [10.0, 10.0], 12.0, 12.0, 50.0);
        assert!(found);
    }

    #[test]
    fn coincident_points_always_accept() {
        let found = is_in_scan_arc([5.0, 5.0], 200.0, [5.0, 5.0], 10.0, 20.0, 1.0);
        assert!(found);
    }

    #[test]
    fn range_symmetry_property() {
        // P6: true-by-distance implies within range; false-by-distance implies beyond range.
        let scanner = [0.0, 0.0];
        let heading = 0.0;
        let range = 100.0;
        for target in [[50.0, 0.0], [150.0, 0.0], [0.0, 99.0], [0.0, 101.0]] {
            let dist = (target[0] * target[0] + target[1] * target[1]).sqrt();
            let found = is_in_scan_arc(scanner, heading, target, 0.0, 0.0, range);
            if dist <= range {
                assert!(found, "expected in-range target {target:?} to be found");
            } else {
                assert!(!found, "expected out-of-range target {target:?} to be rejected");
            }
        }
    }
}
