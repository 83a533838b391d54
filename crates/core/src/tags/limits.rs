#![forbid(unsafe_code)]

/// Ceiling on tags attached to a branch header.
pub const MAX_BRANCH_TAGS: usize = 40;

/// Ceiling on tags attached to a single quip.
pub const MAX_QUIP_TAGS: usize = 20;

pub fn check_tag_count(tags: &[String], limit: usize) -> Result<(), TagLimitError> {
    if tags.len() > limit {
        return Err(TagLimitError {
            count: tags.len(),
            limit,
        });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagLimitError {
    pub count: usize,
    pub limit: usize,
}

impl TagLimitError {
    pub fn message(&self) -> &'static str {
        "too many tags"
    }
}
