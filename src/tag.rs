//! Resource tags.
//!
//! Reads *provide* tags describing what their cached data contains; writes
//! *invalidate* tags describing what they changed. A tag is either
//! category-wide (`Content`) or instance-qualified (`Content:42`).
//!
//! Matching follows one rule: an invalidated tag without an id matches every
//! provided tag of the same category, an instance tag matches only the same
//! instance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The resource categories known to the content platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceCategory {
    Content,
    Category,
    Comment,
    Notification,
    User,
    Profile,
    Stats,
}

impl ResourceCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "Content",
            Self::Category => "Category",
            Self::Comment => "Comment",
            Self::Notification => "Notification",
            Self::User => "User",
            Self::Profile => "Profile",
            Self::Stats => "Stats",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource category, optionally narrowed to one instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub category: ResourceCategory,
    pub id: Option<String>,
}

impl Tag {
    /// A tag covering the whole category.
    pub const fn category(category: ResourceCategory) -> Self {
        Self { category, id: None }
    }

    /// A tag for a single instance of a category.
    pub fn instance(category: ResourceCategory, id: impl ToString) -> Self {
        Self {
            category,
            id: Some(id.to_string()),
        }
    }

    /// Returns `true` if invalidating `self` stales an entry that provided `provided`.
    pub fn invalidates(&self, provided: &Tag) -> bool {
        if self.category != provided.category {
            return false;
        }
        match &self.id {
            None => true,
            Some(id) => provided.id.as_deref() == Some(id.as_str()),
        }
    }

    /// Returns `true` if any tag in `invalidated` stales this provided tag.
    pub fn is_invalidated_by(&self, invalidated: &[Tag]) -> bool {
        invalidated.iter().any(|tag| tag.invalidates(self))
    }
}

impl From<ResourceCategory> for Tag {
    fn from(category: ResourceCategory) -> Self {
        Self::category(category)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{id}", self.category),
            None => write!(f, "{}", self.category),
        }
    }
}

/// Sorts and removes duplicate tags so each one is processed once.
pub fn dedup_tags(mut tags: Vec<Tag>) -> Vec<Tag> {
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_tag_matches_every_instance() {
        let invalidated = Tag::category(ResourceCategory::Content);
        assert!(invalidated.invalidates(&Tag::category(ResourceCategory::Content)));
        assert!(invalidated.invalidates(&Tag::instance(ResourceCategory::Content, 42)));
        assert!(!invalidated.invalidates(&Tag::category(ResourceCategory::Comment)));
    }

    #[test]
    fn test_instance_tag_matches_only_itself() {
        let invalidated = Tag::instance(ResourceCategory::Content, "42");
        assert!(invalidated.invalidates(&Tag::instance(ResourceCategory::Content, 42)));
        assert!(!invalidated.invalidates(&Tag::instance(ResourceCategory::Content, 7)));
        assert!(!invalidated.invalidates(&Tag::category(ResourceCategory::Content)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Tag::category(ResourceCategory::Stats).to_string(), "Stats");
        assert_eq!(
            Tag::instance(ResourceCategory::Content, 42).to_string(),
            "Content:42"
        );
    }

    #[test]
    fn test_dedup_tags() {
        let tags = dedup_tags(vec![
            Tag::category(ResourceCategory::Content),
            Tag::category(ResourceCategory::Comment),
            Tag::category(ResourceCategory::Content),
        ]);
        assert_eq!(tags.len(), 2);
    }
}
