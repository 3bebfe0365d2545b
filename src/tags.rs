//! Tag and name normalization.
//!
//! Tags are trimmed and case-folded so that equality comparisons are stable
//! across backends. A normalized set never holds empties or duplicates.

use crate::error::{ArchiveError, Result};
use std::collections::BTreeSet;

pub const MAX_TAG_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_AUTHOR_LEN: usize = 100;

/// Separator accepted when several tags are typed as one argument.
pub const TAG_SEPARATOR: char = ';';

/// Trim and case-fold one tag. May return an empty string.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn check_len(tag: &str) -> Result<()> {
    if tag.chars().count() > MAX_TAG_LEN {
        return Err(ArchiveError::InvalidTag(format!(
            "'{}' is longer than {} characters",
            tag, MAX_TAG_LEN
        )));
    }
    Ok(())
}

/// Normalize a tag set, dropping entries that end up empty.
pub fn normalize_tags<I, S>(raw: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = BTreeSet::new();
    for tag in raw {
        let tag = normalize_tag(tag.as_ref());
        if tag.is_empty() {
            continue;
        }
        check_len(&tag)?;
        tags.insert(tag);
    }
    Ok(tags)
}

/// Like `normalize_tags`, but every entry must survive normalization.
pub fn normalize_required_tags<I, S>(raw: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = BTreeSet::new();
    for tag in raw {
        let original = tag.as_ref();
        let tag = normalize_tag(original);
        if tag.is_empty() {
            return Err(ArchiveError::InvalidTag(format!(
                "'{}' is empty after normalization",
                original
            )));
        }
        check_len(&tag)?;
        tags.insert(tag);
    }
    Ok(tags)
}

/// Split `"jazz; live"` style arguments into individual tags.
pub fn split_tag_list<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .flat_map(|arg| {
            arg.as_ref()
                .split(TAG_SEPARATOR)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn validate_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ArchiveError::InvalidName("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ArchiveError::InvalidName(format!(
            "'{}' is longer than {} characters",
            name, MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

pub fn validate_author(raw: Option<&str>) -> Result<Option<String>> {
    let Some(author) = raw.map(str::trim).filter(|a| !a.is_empty()) else {
        return Ok(None);
    };
    if author.chars().count() > MAX_AUTHOR_LEN {
        return Err(ArchiveError::InvalidName(format!(
            "author '{}' is longer than {} characters",
            author, MAX_AUTHOR_LEN
        )));
    }
    Ok(Some(author.to_string()))
}
