//! Go-style semantic version ordering.
//!
//! Module versions are `v`-prefixed semantic versions (`v1.2.3`,
//! `v1.2.3-pre.1`, pseudo-versions like `v0.0.0-20230101000000-abcdef123456`).
//! Comparison follows semver precedence: numeric core, then pre-release
//! identifiers; build metadata is ignored. An invalid version orders below
//! every valid one so that selection never prefers garbage.

use std::cmp::Ordering;

/// A parsed version, retained only long enough to compare.
#[derive(Debug, PartialEq, Eq)]
struct Parsed {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Vec<Identifier>,
}

/// One dot-separated pre-release identifier.
#[derive(Debug, PartialEq, Eq)]
enum Identifier {
    Numeric(u64),
    Alpha(String),
}

impl Identifier {
    fn cmp_semver(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            // Numeric identifiers always have lower precedence.
            (Identifier::Numeric(_), Identifier::Alpha(_)) => Ordering::Less,
            (Identifier::Alpha(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::Alpha(a), Identifier::Alpha(b)) => a.cmp(b),
        }
    }
}

/// Whether `v` is a well-formed Go module version.
pub fn is_valid(v: &str) -> bool {
    parse(v).is_some()
}

/// Compare two versions by semantic-version precedence.
///
/// Invalid versions order below valid ones; two invalid versions compare
/// equal.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(pa), Some(pb)) => cmp_parsed(&pa, &pb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// The larger of two versions by [`compare`]; `a` wins ties.
pub fn max<'a>(a: &'a str, b: &'a str) -> &'a str {
    if compare(b, a) == Ordering::Greater {
        b
    } else {
        a
    }
}

fn cmp_parsed(a: &Parsed, b: &Parsed) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| cmp_pre(&a.pre, &b.pre))
}

fn cmp_pre(a: &[Identifier], b: &[Identifier]) -> Ordering {
    // A release compares greater than any of its pre-releases.
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    for (ia, ib) in a.iter().zip(b.iter()) {
        let ord = ia.cmp_semver(ib);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // All shared identifiers equal; the longer set has higher precedence.
    a.len().cmp(&b.len())
}

fn parse(v: &str) -> Option<Parsed> {
    let rest = v.strip_prefix('v')?;

    // Build metadata does not participate in precedence.
    let rest = rest.split_once('+').map(|(r, _)| r).unwrap_or(rest);

    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let mut nums = core.split('.');
    let major = parse_num(nums.next()?)?;
    // Go tolerates shortened forms (v1, v1.2); missing parts are zero.
    let minor = match nums.next() {
        Some(n) => parse_num(n)?,
        None => 0,
    };
    let patch = match nums.next() {
        Some(n) => parse_num(n)?,
        None => 0,
    };
    if nums.next().is_some() {
        return None;
    }

    let pre = match pre {
        Some(p) => p
            .split('.')
            .map(parse_identifier)
            .collect::<Option<Vec<_>>>()?,
        None => Vec::new(),
    };

    Some(Parsed {
        major,
        minor,
        patch,
        pre,
    })
}

fn parse_num(s: &str) -> Option<u64> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    s.parse().ok()
}

fn parse_identifier(s: &str) -> Option<Identifier> {
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        // Leading zeroes make a numeric identifier invalid per semver, but
        // pseudo-version timestamps carry them; treat those as alphanumeric.
        if s.len() > 1 && s.starts_with('0') {
            return Some(Identifier::Alpha(s.to_string()));
        }
        return s.parse().ok().map(Identifier::Numeric);
    }
    if s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        return Some(Identifier::Alpha(s.to_string()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_versions() {
        assert!(is_valid("v1.2.3"));
        assert!(is_valid("v0.0.1"));
        assert!(is_valid("v1"));
        assert!(is_valid("v1.2"));
        assert!(is_valid("v1.2.3-rc.1"));
        assert!(is_valid("v1.2.3+meta"));
        assert!(is_valid("v0.0.0-20230101000000-abcdef123456"));
    }

    #[test]
    fn test_invalid_versions() {
        assert!(!is_valid("1.2.3"));
        assert!(!is_valid("v1.2.3.4"));
        assert!(!is_valid("v01.2.3"));
        assert!(!is_valid("vx"));
        assert!(!is_valid(""));
    }

    #[test]
    fn test_numeric_core_ordering() {
        assert_eq!(compare("v1.2.3", "v1.2.3"), Ordering::Equal);
        assert_eq!(compare("v1.2.3", "v1.2.4"), Ordering::Less);
        assert_eq!(compare("v1.10.0", "v1.9.0"), Ordering::Greater);
        assert_eq!(compare("v2.0.0", "v1.99.99"), Ordering::Greater);
        assert_eq!(compare("v1", "v1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_prerelease_ordering() {
        assert_eq!(compare("v1.0.0-rc.1", "v1.0.0"), Ordering::Less);
        assert_eq!(compare("v1.0.0-rc.1", "v1.0.0-rc.2"), Ordering::Less);
        assert_eq!(compare("v1.0.0-alpha", "v1.0.0-beta"), Ordering::Less);
        // Numeric identifiers order below alphanumeric ones.
        assert_eq!(compare("v1.0.0-1", "v1.0.0-alpha"), Ordering::Less);
        // A longer identifier list has higher precedence.
        assert_eq!(compare("v1.0.0-rc", "v1.0.0-rc.1"), Ordering::Less);
    }

    #[test]
    fn test_pseudo_version_ordering() {
        assert_eq!(
            compare(
                "v0.0.0-20220101000000-aaaaaaaaaaaa",
                "v0.0.0-20230101000000-bbbbbbbbbbbb",
            ),
            Ordering::Less
        );
        assert_eq!(
            compare("v0.0.0-20230101000000-abcdef123456", "v0.1.0"),
            Ordering::Less
        );
    }

    #[test]
    fn test_build_metadata_ignored() {
        assert_eq!(compare("v1.2.3+linux", "v1.2.3+darwin"), Ordering::Equal);
    }

    #[test]
    fn test_invalid_orders_below_valid() {
        assert_eq!(compare("garbage", "v0.0.1"), Ordering::Less);
        assert_eq!(compare("v0.0.1", "garbage"), Ordering::Greater);
    }

    #[test]
    fn test_max() {
        assert_eq!(max("v1.1.0", "v1.2.0"), "v1.2.0");
        assert_eq!(max("v1.2.0", "v1.1.0"), "v1.2.0");
        assert_eq!(max("v1.2.0", "v1.2.0"), "v1.2.0");
    }
}
