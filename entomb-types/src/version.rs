//! Domain-specific version ordering (`spec.md` §4.1).
//!
//! A version compares as the tuple `(numeric/alphabetic runs, pre-release suffix,
//! revision)`. Revision and tag are handled by [`crate::atom::Atom`] comparison, which
//! assembles the full `(version, tag, revision)` lattice.

use std::cmp::Ordering;
use std::fmt;

use crate::error::Error;

/// One run of a parsed version: either a numeric component or an alphabetic one.
///
/// `1.2a3` splits into `[Num(1), Num(2), Alpha("a"), Num(3)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Run {
    Num(u64),
    Alpha(String),
}

impl Run {
    fn rank(&self) -> u8 {
        match self {
            Run::Num(_) => 0,
            Run::Alpha(_) => 1,
        }
    }
}

impl PartialOrd for Run {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Run {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Run::Num(a), Run::Num(b)) => a.cmp(b),
            (Run::Alpha(a), Run::Alpha(b)) => a.cmp(b),
            // A numeric run and an alphabetic run never compare equal: order by kind so
            // the comparison is total (numeric sorts before alphabetic at the same
            // position, matching a missing trailing component sorting lowest).
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// The recognised pre-release suffix kinds, ordered from least to most mature.
///
/// Per `spec.md` §4.1, any of these orders before the un-suffixed release; within the
/// suffixed group this crate orders `beta < pre < rc < p` (common packaging convention),
/// then by the numeric marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SuffixKind {
    Beta,
    Pre,
    Rc,
    P,
}

impl SuffixKind {
    const ALL: [(&'static str, SuffixKind); 4] = [
        ("_beta", SuffixKind::Beta),
        ("_pre", SuffixKind::Pre),
        ("_rc", SuffixKind::Rc),
        ("_p", SuffixKind::P),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Suffix {
    kind: SuffixKind,
    n: u64,
}

/// A parsed package version, ordered per `spec.md` §4.1.
///
/// Ordering is `(base runs, suffix-or-release, )`; revision is tracked separately by
/// [`crate::atom::Atom`] since it is compared only after version and tag tie.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    raw: String,
    runs: Vec<Run>,
    suffix: Option<Suffix>,
}

impl Version {
    /// Parses a version string (without any `-r<n>` revision or `#tag` suffix).
    pub fn parse(input: &str) -> Result<Self, Error> {
        if input.is_empty() {
            return Err(Error::InvalidVersion(input.to_string()));
        }

        let (base, suffix) = split_suffix(input);
        let runs = split_runs(base);
        if runs.is_empty() || !runs.iter().any(|r| matches!(r, Run::Num(_))) {
            return Err(Error::InvalidVersion(input.to_string()));
        }

        Ok(Version {
            raw: input.to_string(),
            runs,
            suffix,
        })
    }

    /// Returns the original, unparsed version string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` if `self`'s printable form starts with `prefix`, used by the `=V*`
    /// operator.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.raw.starts_with(prefix)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.runs.len().max(other.runs.len());
        for i in 0..len {
            let a = self.runs.get(i);
            let b = other.runs.get(i);
            let ord = match (a, b) {
                (Some(a), Some(b)) => a.cmp(b),
                // A missing trailing run sorts lowest: "1.2" < "1.2.1".
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        match (&self.suffix, &other.suffix) {
            (None, None) => Ordering::Equal,
            // A suffix (pre-release marker) always orders before the un-suffixed release.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.kind.cmp(&b.kind).then(a.n.cmp(&b.n)),
        }
    }
}

fn split_suffix(input: &str) -> (&str, Option<Suffix>) {
    for (marker, kind) in SuffixKind::ALL {
        if let Some(idx) = input.rfind(marker) {
            let digits = &input[idx + marker.len()..];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(n) = digits.parse::<u64>() {
                    return (&input[..idx], Some(Suffix { kind, n }));
                }
            }
        }
    }
    (input, None)
}

fn split_runs(input: &str) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            // Numeric runs compare as integers; leading zeros don't change magnitude.
            if let Ok(n) = s.parse::<u64>() {
                runs.push(Run::Num(n));
            }
        } else if c == '.' || c == '_' || c == '-' {
            chars.next();
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if !c.is_ascii_digit() && c != '.' && c != '_' && c != '-' {
                    s.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            runs.push(Run::Alpha(s));
        }
    }
    runs
}

/// A non-negative Entropy revision (`-r<n>`); `-r0` is equivalent to an absent revision
/// per `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Revision(pub u32);

impl Revision {
    /// Parses a bare `-r<n>` suffix (without the leading `-r`).
    pub fn parse(digits: &str) -> Result<Self, Error> {
        digits
            .parse::<u32>()
            .map(Revision)
            .map_err(|_| Error::InvalidRevision(digits.to_string()))
    }

    /// The absent/zero revision.
    pub fn zero() -> Self {
        Revision(0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An opaque tag (`#tag`) used to distinguish otherwise-equal versions.
///
/// An empty tag compares less than any non-empty tag, and (per §4.5's tie-break) is
/// preferred over any non-empty tag when no tag is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// The empty/absent tag.
    pub fn empty() -> Self {
        Tag(String::new())
    }

    /// Returns `true` if no tag is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
