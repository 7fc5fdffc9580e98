//! Utility functions for brickwork

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Parse duration string (e.g., "30s", "5m", "1h", "7d")
pub fn parse_duration(s: &str) -> crate::Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else {
        let split = s.len() - s.chars().last().map(char::len_utf8).unwrap_or(0);
        (&s[..split], &s[split..])
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let overflow = || crate::Error::InvalidConfig(format!("duration too large: {}", s));
    let duration = match unit {
        "ms" => std::time::Duration::from_millis(num),
        "s" => std::time::Duration::from_secs(num),
        "m" => std::time::Duration::from_secs(num.checked_mul(60).ok_or_else(overflow)?),
        "h" => std::time::Duration::from_secs(num.checked_mul(3600).ok_or_else(overflow)?),
        "d" => std::time::Duration::from_secs(num.checked_mul(86400).ok_or_else(overflow)?),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Seconds since the Unix epoch with millisecond precision, the encoding
/// used for marker timestamps.
pub fn to_unix_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

/// Inverse of [`to_unix_seconds`]. `None` for non-finite or out of range values.
pub fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionToken<'a> {
    Tilde,
    Alpha(&'a str),
    Num(u64),
}

fn split_epoch(version: &str) -> (u64, &str) {
    match version.split_once(':') {
        Some((epoch, rest)) => match epoch.parse::<u64>() {
            Ok(epoch) => (epoch, rest),
            Err(_) => (0, version),
        },
        None => (0, version),
    }
}

fn version_tokens(version: &str) -> Vec<VersionToken<'_>> {
    let bytes = version.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let value = version[start..i].parse::<u64>().unwrap_or(u64::MAX);
            tokens.push(VersionToken::Num(value));
        } else if c.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            tokens.push(VersionToken::Alpha(&version[start..i]));
        } else {
            if c == b'~' {
                tokens.push(VersionToken::Tilde);
            }
            i += 1;
        }
    }
    tokens
}

fn token_rank(token: Option<&VersionToken<'_>>) -> u8 {
    match token {
        Some(VersionToken::Tilde) => 0,
        None => 1,
        Some(VersionToken::Alpha(_)) => 2,
        Some(VersionToken::Num(_)) => 3,
    }
}

/// `upstream-revision`, split at the last `-`. No `-` means no revision.
fn split_revision(version: &str) -> (&str, &str) {
    version.rsplit_once('-').unwrap_or((version, ""))
}

/// Compare two package versions the way dpkg orders them.
///
/// An optional `epoch:` prefix dominates, then the upstream part, then the
/// revision after the last `-`. Within each part numeric runs compare as
/// integers (`10 > 9`), alphabetic runs compare lexically, and a `~` sorts
/// before the end of the string (`3.10~rc1 < 3.10`). Separators other than
/// `~` only delimit runs: `3.10+1` and `3.10.1` compare equal.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (epoch_a, rest_a) = split_epoch(a.trim());
    let (epoch_b, rest_b) = split_epoch(b.trim());
    if epoch_a != epoch_b {
        return epoch_a.cmp(&epoch_b);
    }

    let (upstream_a, revision_a) = split_revision(rest_a);
    let (upstream_b, revision_b) = split_revision(rest_b);
    compare_part(upstream_a, upstream_b).then_with(|| compare_part(revision_a, revision_b))
}

fn compare_part(a: &str, b: &str) -> Ordering {
    let tokens_a = version_tokens(a);
    let tokens_b = version_tokens(b);
    let len = tokens_a.len().max(tokens_b.len());
    for idx in 0..len {
        let ta = tokens_a.get(idx);
        let tb = tokens_b.get(idx);
        let ordering = match (ta, tb) {
            (Some(VersionToken::Num(x)), Some(VersionToken::Num(y))) => x.cmp(y),
            (Some(VersionToken::Alpha(x)), Some(VersionToken::Alpha(y))) => x.cmp(y),
            _ => token_rank(ta).cmp(&token_rank(tb)),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// The upgrade gate: true iff `candidate` is strictly newer than `installed`.
pub fn is_upgrade(candidate: &str, installed: &str) -> bool {
    compare_versions(candidate, installed) == Ordering::Greater
}
