//! WGS84 ellipsoid conversions between geodetic and Earth-fixed
//! Cartesian (ECEF) coordinates.

use crate::types::GeodeticPoint;
use nalgebra::Vector3;

/// WGS84 semi-major axis (m)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = 0.006_694_379_990_14;

/// Convert a geodetic point to ECEF coordinates (meters).
pub fn geodetic_to_ecef(pt: &GeodeticPoint) -> Vector3<f64> {
    let lat = pt.lat.to_radians();
    let lon = pt.lon.to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();

    // Prime vertical radius of curvature
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + pt.height) * cos_lat * lon.cos(),
        (n + pt.height) * cos_lat * lon.sin(),
        (n * (1.0 - WGS84_E2) + pt.height) * sin_lat,
    )
}

/// Convert ECEF coordinates to a geodetic point.
///
/// Iterative latitude refinement; converges to sub-millimeter in a handful
/// of passes for any point between the geocenter exclusion zone and orbit
/// altitudes.
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> GeodeticPoint {
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);

    // Start from the spherical latitude
    let mut lat = ecef.z.atan2(p * (1.0 - WGS84_E2));
    let mut height = 0.0;

    for _ in 0..8 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        height = if lat.cos().abs() > 1e-12 {
            p / lat.cos() - n
        } else {
            ecef.z.abs() / sin_lat.abs() - n * (1.0 - WGS84_E2)
        };
        let new_lat = ecef.z.atan2(p * (1.0 - WGS84_E2 * n / (n + height)));
        if (new_lat - lat).abs() < 1e-13 {
            lat = new_lat;
            break;
        }
        lat = new_lat;
    }

    GeodeticPoint::new(lat.to_degrees(), lon.to_degrees(), height)
}

/// Rotation from ECEF deltas to the local east/north/up frame at `origin`.
pub fn enu_rotation(origin: &GeodeticPoint) -> nalgebra::Matrix3<f64> {
    let lat = origin.lat.to_radians();
    let lon = origin.lon.to_radians();

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    nalgebra::Matrix3::new(
        -sin_lon,
        cos_lon,
        0.0,
        -sin_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lat,
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_geodetic_ecef_roundtrip() {
        let pts = [
            GeodeticPoint::new(0.0, 0.0, 0.0),
            GeodeticPoint::new(45.0, 10.0, 500.0),
            GeodeticPoint::new(-33.5, -70.6, 1200.0),
            GeodeticPoint::new(78.2, 15.6, -30.0),
        ];
        for pt in &pts {
            let ecef = geodetic_to_ecef(pt);
            let back = ecef_to_geodetic(&ecef);
            assert_abs_diff_eq!(back.lat, pt.lat, epsilon = 1e-9);
            assert_abs_diff_eq!(back.lon, pt.lon, epsilon = 1e-9);
            assert_abs_diff_eq!(back.height, pt.height, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_equator_prime_meridian() {
        let ecef = geodetic_to_ecef(&GeodeticPoint::new(0.0, 0.0, 0.0));
        assert_abs_diff_eq!(ecef.x, WGS84_A, epsilon = 1e-6);
        assert_abs_diff_eq!(ecef.y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ecef.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_enu_rotation_at_equator() {
        // At (0, 0) east is +Y, north is +Z, up is +X
        let rot = enu_rotation(&GeodeticPoint::new(0.0, 0.0, 0.0));
        let enu = rot * nalgebra::Vector3::new(0.0, 1.0, 0.0);
        assert_abs_diff_eq!(enu.x, 1.0, epsilon = 1e-12);
        let enu = rot * nalgebra::Vector3::new(0.0, 0.0, 1.0);
        assert_abs_diff_eq!(enu.y, 1.0, epsilon = 1e-12);
        let enu = rot * nalgebra::Vector3::new(1.0, 0.0, 0.0);
        assert_abs_diff_eq!(enu.z, 1.0, epsilon = 1e-12);
    }
}
