//! CF-convention vocabulary shared by both metadata paths.
//!
//! The kerchunk parser and the NetCDF extractor must classify variables and
//! locate grid-mapping/coordinate entries with identical rules, so the name
//! tables live in one place.

/// standard_name substrings that mark a variable as a coordinate.
pub const COORDINATE_STANDARD_NAMES: [&str; 5] = [
    "latitude",
    "longitude",
    "time",
    "projection_x_coordinate",
    "projection_y_coordinate",
];

/// Grid-mapping variable names that may carry EPSG info, probed in order.
pub const GRID_MAPPING_NAMES: [&str; 7] = [
    "polar_stereographic",
    "crs",
    "spatial_ref",
    "transverse_mercator",
    "lambert_conformal_conic",
    "albers_conical_equal_area",
    "mercator",
];

/// Attribute names that may carry an EPSG code, probed in order.
pub const EPSG_ATTRIBUTE_NAMES: [&str; 3] = ["epsg_code", "epsg", "crs_epsg"];

/// Projection x-axis coordinate array names, probed in order.
pub const X_COORDINATE_NAMES: [&str; 3] = ["xc", "x", "X"];

/// Projection y-axis coordinate array names, probed in order.
pub const Y_COORDINATE_NAMES: [&str; 3] = ["yc", "y", "Y"];

/// Bounds variables are excluded from every variable listing.
pub fn is_bounds_name(name: &str) -> bool {
    name.ends_with("_bnds") || name.ends_with("_bounds")
}

/// True when a standard_name value marks a coordinate variable.
pub fn is_coordinate_standard_name(standard_name: &str) -> bool {
    let lowered = standard_name.to_lowercase();
    COORDINATE_STANDARD_NAMES
        .iter()
        .any(|csn| lowered.contains(csn))
}

/// Canonical string form of an EPSG attribute value.
///
/// Grid-mapping attributes store the code as an int, a float or a string
/// depending on the producer; both metadata paths must agree on the
/// result, so integral floats collapse to their integer form here.
pub fn normalize_epsg(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        if value.fract() == 0.0 && value.is_finite() {
            return format!("{}", value as i64);
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_suffixes_are_recognized() {
        assert!(is_bounds_name("time_bnds"));
        assert!(is_bounds_name("lat_bounds"));
        assert!(!is_bounds_name("boundary_layer_height"));
    }

    #[test]
    fn coordinate_standard_names_match_as_substrings() {
        assert!(is_coordinate_standard_name("grid_latitude"));
        assert!(is_coordinate_standard_name("Projection_X_Coordinate"));
        assert!(!is_coordinate_standard_name("sea_ice_thickness"));
    }
}
