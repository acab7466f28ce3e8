//! Nearest-neighbour matching of a probe against the registry.

/// Best registry candidate for a probe encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Index into the known-encodings list the distances were computed against.
    pub index: usize,
    pub distance: f32,
}

/// Pick the registry entry with the minimum distance, accepted only when it is
/// within `tolerance` (inclusive).
///
/// Ties resolve to the lowest index: a later candidate must be strictly closer
/// to replace the current best. NaN distances never match.
pub fn nearest_match(distances: &[f32], tolerance: f32) -> Option<Match> {
    let mut best: Option<Match> = None;

    for (index, &distance) in distances.iter().enumerate() {
        if distance.is_nan() {
            continue;
        }
        let closer = match best {
            None => true,
            Some(b) => distance < b.distance,
        };
        if closer {
            best = Some(Match { index, distance });
        }
    }

    best.filter(|m| m.distance <= tolerance)
}
