//! Access-level sanitization of brokered records.
//!
//! Sanitizers are total: every record passes through and comes out as a
//! projection of itself. Disclosure is monotone in access level - anything
//! visible at level L is visible at every level above L.

use serde_json::Value;

use aether_types::{AccessLevel, InformationCategory};

/// Sanitize one record in place for the caller's access level. Returns
/// whether any field was coarsened or removed.
pub fn sanitize_record(
    category: InformationCategory,
    record: &mut Value,
    level: AccessLevel,
) -> bool {
    match category {
        InformationCategory::ThreatData => sanitize_threat(record, level),
        InformationCategory::MissionPlan => sanitize_mission(record, level),
        _ => false,
    }
}

/// Below SENSITIVE: source/collection fields drop and coordinates coarsen to
/// one decimal (~11 km), keeping every other field byte-identical.
fn sanitize_threat(record: &mut Value, level: AccessLevel) -> bool {
    if level >= AccessLevel::Sensitive {
        return false;
    }
    let Some(map) = record.as_object_mut() else {
        return false;
    };

    let mut changed = false;
    for field in ["sources", "collection_methods"] {
        changed |= map.remove(field).is_some();
    }
    if let Some(location) = map.get_mut("location").and_then(Value::as_object_mut) {
        for axis in ["lat", "lon"] {
            if let Some(value) = location.get(axis).and_then(Value::as_f64) {
                location.insert(axis.to_string(), coarsen(value).into());
                changed = true;
            }
        }
    }
    changed
}

/// Below CRITICAL: assigned asset IDs, exact target coordinates, and weapon
/// specifics drop.
fn sanitize_mission(record: &mut Value, level: AccessLevel) -> bool {
    if level >= AccessLevel::Critical {
        return false;
    }
    let Some(map) = record.as_object_mut() else {
        return false;
    };

    let mut changed = false;
    for field in [
        "assigned_asset_ids",
        "full_target_coordinates",
        "weapon_specifics",
    ] {
        changed |= map.remove(field).is_some();
    }
    changed
}

fn coarsen(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
