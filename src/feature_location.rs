//! Coordinate helpers over GenBank feature locations.

use gb_io::seq::{Feature, Location};

/// Collects 0-based half-open spans of every range part of `location`.
pub fn collect_location_ranges_i64(location: &Location, ranges: &mut Vec<(i64, i64)>) {
    match location {
        Location::Range((from, _), (to, _)) | Location::Between(from, to) => {
            if *from < 0 || *to < 0 {
                return;
            }
            let mut start = *from;
            let mut end = *to;
            if end < start {
                std::mem::swap(&mut start, &mut end);
            }
            ranges.push((start, end));
        }
        Location::Complement(inner) => collect_location_ranges_i64(inner, ranges),
        Location::Join(parts)
        | Location::Order(parts)
        | Location::Bond(parts)
        | Location::OneOf(parts) => {
            for part in parts {
                collect_location_ranges_i64(part, ranges);
            }
        }
        Location::External(_, maybe_loc) => {
            if let Some(loc) = maybe_loc {
                collect_location_ranges_i64(loc, ranges);
            }
        }
        Location::Gap(_) => {}
    }
}

pub fn feature_ranges_sorted_i64(feature: &Feature) -> Vec<(i64, i64)> {
    let mut ranges = Vec::new();
    collect_location_ranges_i64(&feature.location, &mut ranges);
    if ranges.is_empty() {
        if let Ok((from, to)) = feature.location.find_bounds() {
            if from >= 0 && to >= 0 {
                ranges.push((from.min(to), from.max(to)));
            }
        }
    }
    ranges.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    ranges
}

/// True if any part of `feature` shares at least one base with `[start, end)`.
pub fn feature_overlaps(feature: &Feature, start: i64, end: i64) -> bool {
    feature_ranges_sorted_i64(feature)
        .iter()
        .any(|(from, to)| *from < end && start < *to)
}
