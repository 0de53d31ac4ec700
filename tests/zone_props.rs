//! Property tests for polygon containment

use geofence_gateway::domain::{membership, Point, Rgb, Zone};
use proptest::prelude::*;

fn rect(x0: f64, y0: f64, w: f64, h: f64) -> Zone {
    let pts = [[x0, y0], [x0 + w, y0], [x0 + w, y0 + h], [x0, y0 + h]];
    Zone::new("rect", pts.into_iter().map(Point::from).collect(), Rgb::new(1, 2, 3)).unwrap()
}

fn polygon() -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec((-1_000.0f64..1_000.0, -1_000.0f64..1_000.0), 3..12)
        .prop_map(|pts| pts.into_iter().map(|(x, y)| Point::new(x, y)).collect())
}

proptest! {
    #[test]
    fn prop_points_outside_bounding_box_are_outside(
        vertices in polygon(),
        x in -5_000.0f64..5_000.0,
        y in -5_000.0f64..5_000.0,
    ) {
        let zone = Zone::new("poly", vertices, Rgb::new(0, 0, 0)).unwrap();
        let p = Point::new(x, y);
        if !zone.bounding_box().contains(p) {
            prop_assert!(!zone.contains(p));
        }
    }

    #[test]
    fn prop_rectangle_interior_matches_bounds(
        x0 in -100.0f64..100.0,
        y0 in -100.0f64..100.0,
        w in 1.0f64..50.0,
        h in 1.0f64..50.0,
        fx in 0.01f64..0.99,
        fy in 0.01f64..0.99,
    ) {
        let zone = rect(x0, y0, w, h);
        prop_assert!(zone.contains(Point::new(x0 + fx * w, y0 + fy * h)));
        prop_assert!(!zone.contains(Point::new(x0 + w + 1.0, y0 + fy * h)));
        prop_assert!(!zone.contains(Point::new(x0 + fx * w, y0 - 1.0)));
    }

    #[test]
    fn prop_membership_is_ascending(x in -10.0f64..30.0, y in -10.0f64..30.0) {
        let zones = vec![rect(0.0, 0.0, 20.0, 20.0), rect(5.0, 5.0, 10.0, 10.0), rect(-5.0, -5.0, 40.0, 40.0)];
        let inside = membership(&zones, Point::new(x, y));
        prop_assert!(inside.windows(2).all(|w| w[0] < w[1]));
        for (index, zone) in zones.iter().enumerate() {
            prop_assert_eq!(inside.contains(&index), zone.contains(Point::new(x, y)));
        }
    }
}
