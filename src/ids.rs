//! Short record ids and prefix resolution.
//!
//! Ids look like `task-7kq` / `rem-x2c`: a namespace prefix plus a suffix cut
//! from the random section of a fresh ULID. The suffix starts at
//! [`MIN_SUFFIX_LEN`] characters and only grows once every id of that length
//! is taken.

use std::collections::{HashMap, HashSet};

use ulid::Ulid;

use crate::error::{Error, Result};

pub const TASK_ID_PREFIX: &str = "task";
pub const REMINDER_ID_PREFIX: &str = "rem";
pub const MIN_SUFFIX_LEN: usize = 3;

const ID_DELIM: char = '-';
const ULID_TIME_LEN: usize = 10;
const ULID_RANDOM_LEN: usize = 16;
const ULID_CHARSET: &str = "0123456789abcdefghjkmnpqrstvwxyz";
const ULID_CHARSET_LEN: u128 = 32;

/// Generate an id under `prefix` that collides with none of `existing`.
pub fn generate_id<'a, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut taken = HashSet::new();
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for id in existing {
        let suffix = suffix_of(&normalize(id)).to_string();
        if suffix.is_empty() {
            continue;
        }
        if is_ulid_suffix(&suffix) {
            *counts.entry(suffix.len()).or_insert(0) += 1;
        }
        taken.insert(suffix);
    }

    let len = select_suffix_len(MIN_SUFFIX_LEN, &counts);
    loop {
        let base = Ulid::new().to_string();
        if let Some(suffix) = suffix_from_base(&base, len, &taken) {
            return format!("{prefix}{ID_DELIM}{suffix}");
        }
    }
}

/// Resolve user input (full id, bare suffix, or unique suffix prefix) to one
/// of `candidates`. Matching is case-insensitive.
pub fn resolve_id<'a, I>(input: &str, candidates: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let trimmed = input.trim();
    let input_norm = normalize(trimmed);
    let wanted = suffix_of(&input_norm).to_string();
    if wanted.is_empty() {
        return Err(Error::InvalidArgument("id cannot be empty".to_string()));
    }

    let mut exact = Vec::new();
    let mut partial = Vec::new();
    for id in candidates {
        let id_norm = normalize(id);
        let suffix = suffix_of(&id_norm);
        if id_norm == input_norm || suffix == input_norm {
            exact.push(id.to_string());
        } else if suffix.starts_with(&wanted) {
            partial.push(id.to_string());
        }
    }

    let mut matches = if exact.is_empty() { partial } else { exact };
    matches.sort();
    matches.dedup();
    match matches.len() {
        0 => Err(Error::InvalidArgument(format!("no record matches '{trimmed}'"))),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::InvalidArgument(format!(
            "ambiguous id '{}': {}",
            trimmed,
            matches.join(", ")
        ))),
    }
}

fn suffix_from_base(base: &str, len: usize, taken: &HashSet<String>) -> Option<String> {
    let base = base.to_lowercase();
    let random_end = ULID_TIME_LEN + ULID_RANDOM_LEN;
    if base.len() < random_end || len == 0 || len > ULID_RANDOM_LEN {
        return None;
    }
    let candidate = &base[ULID_TIME_LEN..ULID_TIME_LEN + len];
    if taken.contains(candidate) {
        return None;
    }
    Some(candidate.to_string())
}

fn select_suffix_len(min_len: usize, counts: &HashMap<usize, usize>) -> usize {
    let mut len = min_len;
    while len < ULID_RANDOM_LEN {
        let used = counts.get(&len).copied().unwrap_or(0) as u128;
        if used < space_for_len(len) {
            break;
        }
        len += 1;
    }
    len
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn suffix_of(id_norm: &str) -> &str {
    match id_norm.find(ID_DELIM) {
        Some(idx) => &id_norm[idx + 1..],
        None => id_norm,
    }
}

fn is_ulid_suffix(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ULID_CHARSET.contains(ch))
}

fn space_for_len(len: usize) -> u128 {
    ULID_CHARSET_LEN.saturating_pow(len as u32)
}
