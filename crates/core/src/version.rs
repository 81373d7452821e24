//! Version literals with RubyGems ordering
//!
//! A version is a sequence of numeric and alphabetic segments. Alphabetic
//! segments mark a prerelease and sort below any number in the same
//! position, so `6.1.0.rc1 < 6.1.0` and `5.x < 5.0`. Trailing zeros carry no
//! weight (`2.7 == 2.7.0`) and a `-` reads as `.pre.`.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One segment of a version. Declaration order makes text sort below numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Segment {
    Text(String),
    Number(u64),
}

const ZERO: Segment = Segment::Number(0);

/// A parsed version literal with a total order
#[derive(Debug, Clone)]
pub struct VersionSpec {
    text: String,
    canonical: Vec<Segment>,
}

impl VersionSpec {
    /// Parse a version literal such as `7.1.0.alpha` or `6.1.0.rc1`.
    ///
    /// # Errors
    /// Returns `Error::InvalidVersion` if the literal is empty, does not start
    /// with a digit, or contains characters other than ASCII alphanumerics,
    /// `.` and `-`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let valid_chars = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !valid_chars || !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::invalid_version(input));
        }

        let normalized = trimmed.replace('-', ".pre.");
        if normalized.split('.').any(str::is_empty) {
            return Err(Error::invalid_version(input));
        }

        let segments = scan_segments(&normalized).ok_or_else(|| Error::invalid_version(input))?;
        Ok(Self {
            text: trimmed.to_string(),
            canonical: canonicalize(segments),
        })
    }

    /// Build a final release version from numeric parts, e.g. `[6, 1]`.
    #[must_use]
    pub fn release(parts: &[u64]) -> Self {
        let text = parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        let segments = parts.iter().copied().map(Segment::Number).collect();
        Self {
            text,
            canonical: canonicalize(segments),
        }
    }

    /// Build a prerelease version from numeric parts and an alphabetic tag,
    /// e.g. `([7, 1, 0], "alpha")` for `7.1.0.alpha`.
    #[must_use]
    pub fn prerelease(parts: &[u64], tag: &str) -> Self {
        let mut version = Self::release(parts);
        version.text = format!("{}.{tag}", version.text);
        version.canonical.push(Segment::Text(tag.to_string()));
        version
    }

    /// Whether any segment is alphabetic
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.canonical
            .iter()
            .any(|segment| matches!(segment, Segment::Text(_)))
    }

    /// The literal as written, minus surrounding whitespace
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Split on `.` and on every digit/letter boundary.
fn scan_segments(text: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        let boundary = c == '.'
            || current
                .chars()
                .next_back()
                .is_some_and(|last| last.is_ascii_digit() != c.is_ascii_digit());
        if boundary && !current.is_empty() {
            segments.push(to_segment(&current)?);
            current.clear();
        }
        if c != '.' {
            current.push(c);
        }
    }
    if !current.is_empty() {
        segments.push(to_segment(&current)?);
    }

    Some(segments)
}

fn to_segment(run: &str) -> Option<Segment> {
    if run.starts_with(|c: char| c.is_ascii_digit()) {
        run.parse().ok().map(Segment::Number)
    } else {
        Some(Segment::Text(run.to_string()))
    }
}

/// Drop trailing zeros from the release part and from the prerelease part.
fn canonicalize(mut segments: Vec<Segment>) -> Vec<Segment> {
    let split = segments
        .iter()
        .position(|segment| matches!(segment, Segment::Text(_)))
        .unwrap_or(segments.len());
    let mut prerelease = segments.split_off(split);

    trim_zeros(&mut segments);
    trim_zeros(&mut prerelease);
    segments.extend(prerelease);
    segments
}

fn trim_zeros(segments: &mut Vec<Segment>) {
    while segments.last() == Some(&ZERO) {
        segments.pop();
    }
}

impl Ord for VersionSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.canonical.len().max(other.canonical.len());
        (0..len)
            .map(|i| {
                let lhs = self.canonical.get(i).unwrap_or(&ZERO);
                let rhs = other.canonical.get(i).unwrap_or(&ZERO);
                lhs.cmp(rhs)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for VersionSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Canonical segments never end in a zero, so equal canonical forms are
// exactly the versions that compare `Equal`.
impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for VersionSpec {}

impl Hash for VersionSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl FromStr for VersionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for VersionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
