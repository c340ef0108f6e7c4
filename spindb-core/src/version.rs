//! Engine-native version string handling.
//!
//! Versions are dotted numeric components (`17.5`, `8.0.2`,
//! `25.5.2.47`). Comparison is numeric per component; "major match" is
//! the first component, except for date-style engines (ClickHouse's
//! `YY.M.patch.build`) where it is the first two.

use std::cmp::Ordering;

use spindb_model::Engine;

/// Parse the numeric components of a version string. Non-numeric trailing
/// parts (e.g. `-rc1`) are ignored from the first unparsable component on.
pub fn components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map_while(|part| {
            let digits: String =
                part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        })
        .collect()
}

/// Numeric component-wise comparison; shorter versions compare as if
/// padded with zeros (`17` == `17.0`).
pub fn compare(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (components(a), components(b));
    let len = ca.len().max(cb.len());
    for i in 0..len {
        let va = ca.get(i).copied().unwrap_or(0);
        let vb = cb.get(i).copied().unwrap_or(0);
        match va.cmp(&vb) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// The "major" prefix used for compatibility checks.
pub fn major(engine: Engine, version: &str) -> Vec<u64> {
    let take = if engine.has_date_style_versions() { 2 } else { 1 };
    components(version).into_iter().take(take).collect()
}

/// Whether `actual` satisfies a request for `requested`: exact match, or
/// matching major.
pub fn matches(engine: Engine, requested: &str, actual: &str) -> bool {
    if compare(requested, actual) == Ordering::Equal {
        return true;
    }
    let requested_major = major(engine, requested);
    !requested_major.is_empty() && requested_major == major(engine, actual)
}

/// Whether `requested` names only a major (e.g. `18`, or `25.5` for
/// date-style engines).
pub fn is_major_only(engine: Engine, requested: &str) -> bool {
    let take = if engine.has_date_style_versions() { 2 } else { 1 };
    components(requested).len() <= take
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_comparison() {
        assert_eq!(compare("17.5", "17.5"), Ordering::Equal);
        assert_eq!(compare("17.10", "17.9"), Ordering::Greater);
        assert_eq!(compare("17", "17.0"), Ordering::Equal);
        assert_eq!(compare("8.4.5", "9"), Ordering::Less);
    }

    #[test]
    fn major_match_standard() {
        assert!(matches(Engine::PostgreSql, "18", "18.0"));
        assert!(matches(Engine::PostgreSql, "17.5", "17.9"));
        assert!(!matches(Engine::PostgreSql, "17", "18.0"));
    }

    #[test]
    fn major_match_date_style_uses_two_components() {
        assert!(matches(Engine::ClickHouse, "25.5", "25.5.2.47"));
        assert!(!matches(Engine::ClickHouse, "25.4", "25.5.2.47"));
    }

    #[test]
    fn trailing_garbage_is_ignored() {
        assert_eq!(components("1.3.1-rc1"), vec![1, 3, 1]);
        assert_eq!(components("8.0.2"), vec![8, 0, 2]);
    }

    #[test]
    fn major_only_detection() {
        assert!(is_major_only(Engine::PostgreSql, "18"));
        assert!(!is_major_only(Engine::PostgreSql, "18.0"));
        assert!(is_major_only(Engine::ClickHouse, "25.5"));
        assert!(!is_major_only(Engine::ClickHouse, "25.5.2"));
    }
}
