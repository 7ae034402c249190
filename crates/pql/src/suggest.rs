//! Edit-distance "did you mean" suggestions.

/// Maximum edit distance for a suggestion to be offered.
pub const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Levenshtein distance over chars, ignoring ASCII case.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().map(|c| c.to_ascii_lowercase()).collect();
    let b: Vec<char> = b.chars().map(|c| c.to_ascii_lowercase()).collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest candidate within [`MAX_SUGGESTION_DISTANCE`]. Ties go to the
/// earliest candidate, so callers control precedence through ordering.
pub fn closest<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, &str)> = None;
    for candidate in candidates {
        let distance = edit_distance(name, candidate);
        if distance > MAX_SUGGESTION_DISTANCE {
            continue;
        }
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, c)| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("lease", "lease"), 0);
        assert_eq!(edit_distance("leas", "lease"), 1);
        assert_eq!(edit_distance("LEASE", "lease"), 0);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_closest_respects_cutoff() {
        let names = ["lease", "tenant", "property"];
        assert_eq!(closest("lese", names), Some("lease".to_string()));
        assert_eq!(closest("tenent", names), Some("tenant".to_string()));
        assert_eq!(closest("unicorn", names), None);
        // distance exactly 3 still suggests, 4 does not
        assert_eq!(closest("lxxxe", ["lease"]), Some("lease".to_string()));
        assert_eq!(closest("xxxxe", ["lease"]), None);
    }

    #[test]
    fn test_closest_prefers_smallest_distance() {
        assert_eq!(
            closest("stat", ["start_date", "status", "state"]),
            Some("state".to_string())
        );
    }
}
