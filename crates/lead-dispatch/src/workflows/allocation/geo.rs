use super::domain::Coordinates;

/// Earth's mean radius in miles; every distance in the engine uses this unit.
pub const EARTH_MEAN_RADIUS_MILES: f64 = 3958.8;

/// Great-circle distance in miles using the haversine formula.
///
/// The intermediate haversine term is clamped to `[0, 1]` so rounding near
/// antipodal points can never push the inverse step outside its domain.
pub fn haversine_miles(from: Coordinates, to: Coordinates) -> f64 {
    if from == to {
        return 0.0;
    }

    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let lat_from = from.lat.to_radians();
    let lat_to = to.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (d_lng / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_MEAN_RADIUS_MILES * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero_miles_apart() {
        let sydney = Coordinates::new(-33.87, 151.21);
        assert_eq!(haversine_miles(sydney, sydney), 0.0);
    }

    #[test]
    fn sydney_to_melbourne_matches_reference_distance() {
        let sydney = Coordinates::new(-33.8688, 151.2093);
        let melbourne = Coordinates::new(-37.8136, 144.9631);
        let distance = haversine_miles(sydney, melbourne);
        assert!((distance - 443.0).abs() < 5.0, "got {distance}");
        assert_eq!(distance, haversine_miles(melbourne, sydney));
    }

    #[test]
    fn antipodal_points_stay_finite() {
        let origin = Coordinates::new(0.0, 0.0);
        let antipode = Coordinates::new(0.0, 180.0);
        let distance = haversine_miles(origin, antipode);
        assert!(distance.is_finite());
        let half_circumference = std::f64::consts::PI * EARTH_MEAN_RADIUS_MILES;
        assert!((distance - half_circumference).abs() < 1e-6);

        let pole = Coordinates::new(90.0, 0.0);
        let other_pole = Coordinates::new(-90.0, 37.5);
        assert!(haversine_miles(pole, other_pole).is_finite());
    }

    #[test]
    fn one_degree_of_latitude_is_about_sixty_nine_miles() {
        let a = Coordinates::new(10.0, 20.0);
        let b = Coordinates::new(11.0, 20.0);
        let distance = haversine_miles(a, b);
        assert!((distance - 69.09).abs() < 0.05, "got {distance}");
    }
}
