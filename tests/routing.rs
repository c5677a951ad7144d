//! Legacy API version routing: path parsing, the deprecation enumeration and
//! the port rules.

use decap::service::{
    debug_port, infer_deprecated_apis, version_from_path, DEFAULT_PORT, MIN_API, NEXT_API,
};

#[test]
fn supported_versions_route_to_the_handler() {
    for version in [MIN_API, NEXT_API] {
        let path = format!("/api/browse/{}/foo", version);
        let parsed = version_from_path(&path).unwrap();
        assert_eq!(parsed, version);
        assert!(!infer_deprecated_apis().contains(&parsed));
    }
}

#[test]
fn old_versions_are_enumerated_as_deprecated() {
    let deprecated = infer_deprecated_apis();
    for version in ["v0.0", "v0.1", "v0.5", "v0.7"] {
        assert!(deprecated.contains(&version.to_string()), "{version}");
    }
    // The deprecation answer is keyed on the parsed path segment.
    assert_eq!(version_from_path("/api/browse/v0.1/foo").unwrap(), "v0.1");
}

#[test]
fn unknown_versions_are_not_deprecated() {
    let deprecated = infer_deprecated_apis();
    for version in ["v1.0", "v2.3", "weird"] {
        assert!(!deprecated.contains(&version.to_string()), "{version}");
    }
}

#[test]
fn version_segment_is_required() {
    assert!(version_from_path("/api/browse/").is_err());
    assert!(version_from_path("/api/browse").is_err());
}

#[test]
fn ports() {
    assert_eq!(DEFAULT_PORT, 4531);
    assert_eq!(debug_port(0), 4100);
    assert_eq!(debug_port(507), 4107);
    assert!((4100..4200).contains(&debug_port(u32::MAX)));
}
