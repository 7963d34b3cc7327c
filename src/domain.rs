//! Canonical domain keys for the name table.
//!
//! Two key shapes exist:
//!
//! - exact: `host.ona.im.`
//! - wildcard: `.host.ona.im.`, which answers for names one label below
//!   `host.ona.im`
//!
//! User input such as `*.host.ona.im`, `.host.ona.im` or `HOST.ona.im.` is
//! normalized into one of these forms.

use std::fmt;

use crate::error::DnsError;

/// A normalized name table key.
///
/// `base` is stored lower-case with a trailing dot and no leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainKey {
    base: String,
    wildcard: bool,
}

impl DomainKey {
    /// Parse user input. A leading `*.` or `.` marks the key as a wildcard.
    pub fn parse(input: &str) -> Result<Self, DnsError> {
        let trimmed = input.trim();
        let wildcard = trimmed.starts_with("*.") || trimmed.starts_with('.');
        let base = normalize_base(trimmed)?;
        Ok(Self { base, wildcard })
    }

    /// Build an exact key for `name`, ignoring any wildcard marker.
    pub fn exact(name: &str) -> Result<Self, DnsError> {
        Ok(Self {
            base: normalize_base(name)?,
            wildcard: false,
        })
    }

    /// Build a wildcard key for `name`.
    pub fn wildcard(name: &str) -> Result<Self, DnsError> {
        Ok(Self {
            base: normalize_base(name)?,
            wildcard: true,
        })
    }

    /// Whether this is a wildcard (`.name.`) key.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// The base name in FQDN form (`host.ona.im.`).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The base name without the trailing dot (`host.ona.im`).
    pub fn base_name(&self) -> &str {
        self.base.trim_end_matches('.')
    }

    /// The wildcard key covering the same base name.
    pub fn to_wildcard(&self) -> Self {
        Self {
            base: self.base.clone(),
            wildcard: true,
        }
    }

    /// The exact key for the same base name.
    pub fn to_exact(&self) -> Self {
        Self {
            base: self.base.clone(),
            wildcard: false,
        }
    }

    /// The wildcard key that may answer for this exact name: drop the leftmost
    /// label once. `data.ona.im.` yields `.ona.im.`.
    ///
    /// Only one label is dropped. `x.y.host.ona.im.` yields `.y.host.ona.im.`,
    /// never `.host.ona.im.`. Returns `None` for single-label names.
    pub fn parent_wildcard(&self) -> Option<Self> {
        let (_, rest) = self.base.split_once('.')?;
        if rest.is_empty() {
            return None;
        }
        Some(Self {
            base: rest.to_string(),
            wildcard: true,
        })
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            write!(f, ".{}", self.base)
        } else {
            f.write_str(&self.base)
        }
    }
}

/// Letters, digits, hyphen and underscore, plus the label separator.
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Lower-case, strip `*.` and surrounding dots, then re-apply the trailing dot.
///
/// Only letters, digits, `-` and `_` are accepted inside labels; base names
/// end up as file names and resolver directives.
fn normalize_base(input: &str) -> Result<String, DnsError> {
    let mut name = input.trim();
    if let Some(rest) = name.strip_prefix("*.") {
        name = rest;
    }
    let name = name.trim_matches('.');

    if name.is_empty() || name.contains("..") || !name.chars().all(is_name_char) {
        return Err(DnsError::InvalidName(input.to_string()));
    }

    Ok(format!("{}.", name.to_ascii_lowercase()))
}

/// Join a host label and a zone into a base name.
///
/// A hostname that already contains an internal dot is used as-is and the zone
/// is ignored. Otherwise the zone (with or without a leading dot) is appended.
pub fn join_zone(hostname: &str, zone: &str) -> String {
    let host = hostname.trim().trim_start_matches("*.").trim_matches('.');
    let zone = zone.trim().trim_matches('.');

    if host.contains('.') || zone.is_empty() {
        host.to_string()
    } else {
        format!("{host}.{zone}")
    }
}
