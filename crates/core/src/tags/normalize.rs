#![forbid(unsafe_code)]

use std::collections::BTreeSet;

/// Separator that replaces each run of internal whitespace.
pub const TAG_WORD_SEPARATOR: char = '_';

/// Longest accepted tag, in characters, after normalization.
pub const MAX_TAG_CHARS: usize = 64;

/// Canonical form used for tag equality: trimmed, internal whitespace runs
/// collapsed to a single `_`, lowercased.
///
/// Returns `Ok(None)` for a tag that is empty after trimming.
pub fn normalize_tag(tag: &str) -> Result<Option<String>, TagError> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut in_whitespace = false;
    for ch in trimmed.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(TAG_WORD_SEPARATOR);
            }
            in_whitespace = true;
            continue;
        }
        if ch.is_control() {
            return Err(TagError::ContainsControl);
        }
        in_whitespace = false;
        out.extend(ch.to_lowercase());
    }

    if out.chars().count() > MAX_TAG_CHARS {
        return Err(TagError::TooLong);
    }
    Ok(Some(out))
}

/// Normalizes, deduplicates and sorts a caller-supplied tag list.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Result<Vec<String>, TagError> {
    let mut out = BTreeSet::new();
    for tag in tags {
        if let Some(tag) = normalize_tag(tag.as_ref())? {
            out.insert(tag);
        }
    }
    Ok(out.into_iter().collect())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagError {
    ContainsControl,
    TooLong,
}

impl TagError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ContainsControl => "tag contains control characters",
            Self::TooLong => "tag is too long",
        }
    }
}
