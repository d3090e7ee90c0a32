//! The atom grammar: parsing dependency strings into structured predicates
//! (`spec.md` §4.1, component 1 of §2).

use std::cmp::Ordering;
use std::fmt;

use crate::error::{AtomSyntaxError, Error};
use crate::record::{Key, PackageRecord, Slot};
use crate::version::{Revision, Tag, Version};

/// A version-comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`: exact match including revision.
    Eq,
    /// `=V*`: prefix match on the printable version.
    EqPrefix,
    /// `~`: match ignoring revision, candidate revision must be >= the stated one.
    Approx,
    Gt,
    Ge,
    Lt,
    Le,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::EqPrefix => "=*",
            Operator::Approx => "~",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        };
        f.write_str(s)
    }
}

/// A `+flag`/`-flag` use-flag dependency requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseFlagDep {
    pub flag: String,
    /// `true` for `+flag` (must be enabled), `false` for `-flag` (must be disabled).
    pub enabled: bool,
}

/// A single structured dependency predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub key: Key,
    pub op: Option<Operator>,
    pub version: Option<Version>,
    pub tag: Option<Tag>,
    pub slot: Option<Slot>,
    /// Revision stated via a separate `~rev` modifier (distinct from a revision folded
    /// into an `=`/`~` version operator's own string).
    pub revision: Option<Revision>,
    pub use_flags: Vec<UseFlagDep>,
    /// `true` if this atom was prefixed with `!` (a conflict, `spec.md` §4.5).
    pub conflict: bool,
}

impl Atom {
    /// Returns `true` if `candidate` satisfies this atom under `spec.md` §4.1's operator
    /// semantics.
    pub fn matches(&self, candidate: &PackageRecord) -> bool {
        if candidate.scope.key != self.key {
            return false;
        }
        if let Some(slot) = &self.slot {
            if &candidate.scope.slot != slot {
                return false;
            }
        }
        if let Some(rev) = self.revision {
            if candidate.scope.revision != rev {
                return false;
            }
        }
        if !self.use_flags_satisfied(candidate) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if &candidate.scope.tag != tag {
                return false;
            }
        }

        match (&self.op, &self.version) {
            (None, _) => true,
            (Some(op), Some(version)) => self.version_matches(*op, version, candidate),
            // A bare operator with no version cannot occur (rejected at parse time).
            (Some(_), None) => false,
        }
    }

    fn use_flags_satisfied(&self, candidate: &PackageRecord) -> bool {
        self.use_flags.iter().all(|dep| {
            let has = candidate.metadata.use_enabled.contains(&dep.flag);
            has == dep.enabled
        })
    }

    fn version_matches(&self, op: Operator, requested: &Version, candidate: &PackageRecord) -> bool {
        let candidate_version = &candidate.scope.version;
        let candidate_revision = candidate.scope.revision;

        match op {
            Operator::Eq => {
                candidate_version == requested
                    && self.revision.unwrap_or(Revision::zero()) == candidate_revision
            }
            Operator::EqPrefix => candidate_version.has_prefix(requested.as_str()),
            Operator::Approx => {
                candidate_version == requested
                    && candidate_revision >= self.revision.unwrap_or(Revision::zero())
            }
            Operator::Gt => candidate_version.cmp(requested) == Ordering::Greater,
            Operator::Ge => candidate_version.cmp(requested) != Ordering::Less,
            Operator::Lt => candidate_version.cmp(requested) == Ordering::Less,
            Operator::Le => candidate_version.cmp(requested) != Ordering::Greater,
        }
    }
}

/// An `"or"-group` (`a;b;c?`): succeeds if any member atom resolves successfully.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomExpr {
    Single(Atom),
    Or(Vec<Atom>),
}

/// Parses a dependency string into structured form, per `spec.md` §4.1.
pub fn parse(input: &str) -> Result<AtomExpr, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAtom(
            input.to_string(),
            AtomSyntaxError::EmptyKey,
        ));
    }

    if trimmed.contains(';') {
        let members = trimmed
            .trim_end_matches('?')
            .split(';')
            .map(|part| parse_single(part.trim(), input))
            .collect::<Result<Vec<_>, _>>()?;
        if members.is_empty() {
            return Err(Error::InvalidAtom(
                input.to_string(),
                AtomSyntaxError::MalformedOrGroup,
            ));
        }
        return Ok(AtomExpr::Or(members));
    }

    Ok(AtomExpr::Single(parse_single(trimmed, input)?))
}

fn parse_single(input: &str, original: &str) -> Result<Atom, Error> {
    let mut s = input;
    let conflict = if let Some(rest) = s.strip_prefix('!') {
        s = rest;
        true
    } else {
        false
    };

    let (op, rest) = take_operator(s);
    s = rest;

    let mut use_flags = Vec::new();
    let mut tag = None;
    let mut slot = None;
    let mut revision = None;

    // The key (and version, if an operator was given) occupy the prefix up to the first
    // modifier marker.
    let modifier_start = s
        .find([':', '~', '#', '['])
        .unwrap_or(s.len());
    let (head, mut modifiers) = s.split_at(modifier_start);

    while !modifiers.is_empty() {
        match modifiers.as_bytes()[0] {
            b':' => {
                let end = modifiers[1..]
                    .find([':', '~', '#', '['])
                    .map(|i| i + 1)
                    .unwrap_or(modifiers.len());
                let raw = &modifiers[1..end];
                if raw.is_empty() {
                    return Err(Error::InvalidAtom(
                        original.to_string(),
                        AtomSyntaxError::DanglingModifier,
                    ));
                }
                slot = Some(Slot(raw.to_string()));
                modifiers = &modifiers[end..];
            }
            b'~' => {
                let end = modifiers[1..]
                    .find([':', '~', '#', '['])
                    .map(|i| i + 1)
                    .unwrap_or(modifiers.len());
                let raw = &modifiers[1..end];
                revision = Some(Revision::parse(raw).map_err(|_| {
                    Error::InvalidAtom(original.to_string(), AtomSyntaxError::DanglingModifier)
                })?);
                modifiers = &modifiers[end..];
            }
            b'#' => {
                let end = modifiers[1..]
                    .find([':', '~', '#', '['])
                    .map(|i| i + 1)
                    .unwrap_or(modifiers.len());
                let raw = &modifiers[1..end];
                if raw.is_empty() {
                    return Err(Error::InvalidAtom(
                        original.to_string(),
                        AtomSyntaxError::DanglingModifier,
                    ));
                }
                tag = Some(Tag(raw.to_string()));
                modifiers = &modifiers[end..];
            }
            b'[' => {
                let end = modifiers.find(']').ok_or_else(|| {
                    Error::InvalidAtom(original.to_string(), AtomSyntaxError::UnterminatedUseFlags)
                })?;
                let body = &modifiers[1..end];
                for token in body.split(',').filter(|t| !t.is_empty()) {
                    use_flags.push(parse_use_flag(token, original)?);
                }
                modifiers = &modifiers[end + 1..];
            }
            _ => unreachable!(),
        }
    }

    // When an operator was given, the version is whatever trails the last `-` that
    // begins a digit, so that names containing hyphens (`app-editors/vim`) still split
    // correctly from a trailing `-8.2`.
    let (key_str, version_str) = match op {
        Some(_) => split_key_version(head),
        None => (head, None),
    };

    let key = Key::parse(key_str)
        .map_err(|_| Error::InvalidAtom(original.to_string(), AtomSyntaxError::EmptyKey))?;

    let (op, version) = match (op, version_str) {
        (Some(op), Some(v)) => {
            let mut v = v.to_string();
            let op = if op == Operator::Eq && v.ends_with('*') {
                v.pop();
                Operator::EqPrefix
            } else {
                op
            };
            (Some(op), Some(Version::parse(&v).map_err(|_| {
                Error::InvalidAtom(original.to_string(), AtomSyntaxError::MissingVersionAfterOperator)
            })?))
        }
        (Some(_), None) => {
            return Err(Error::InvalidAtom(
                original.to_string(),
                AtomSyntaxError::MissingVersionAfterOperator,
            ))
        }
        (None, _) => (None, None),
    };

    Ok(Atom {
        key,
        op,
        version,
        tag,
        slot,
        revision,
        use_flags,
        conflict,
    })
}

fn take_operator(s: &str) -> (Option<Operator>, &str) {
    for (token, op) in [
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        (">", Operator::Gt),
        ("<", Operator::Lt),
        ("=", Operator::Eq),
        ("~", Operator::Approx),
    ] {
        if let Some(rest) = s.strip_prefix(token) {
            return (Some(op), rest);
        }
    }
    (None, s)
}

/// Splits `category/name-version` into `(category/name, version)` by finding the last
/// `-` that is immediately followed by a digit (a version always starts with a digit).
fn split_key_version(s: &str) -> (&str, Option<&str>) {
    let bytes = s.as_bytes();
    for i in (0..bytes.len()).rev() {
        if bytes[i] == b'-' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
            return (&s[..i], Some(&s[i + 1..]));
        }
    }
    (s, None)
}

fn parse_use_flag(token: &str, original: &str) -> Result<UseFlagDep, Error> {
    if let Some(flag) = token.strip_prefix('+') {
        Ok(UseFlagDep {
            flag: flag.to_string(),
            enabled: true,
        })
    } else if let Some(flag) = token.strip_prefix('-') {
        Ok(UseFlagDep {
            flag: flag.to_string(),
            enabled: false,
        })
    } else {
        Err(Error::InvalidUseFlag(format!("{token} in {original}")))
    }
}
