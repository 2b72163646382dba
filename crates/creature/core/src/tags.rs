//! Tag targeting: selecting properties by the tags they carry.
//!
//! A targeting rule is a base tag set plus `OR` / `NOT` clauses:
//!
//! 1. The base set is every property carrying *all* `target_tags`. With no
//!    target tags the base is unconstrained (every candidate).
//! 2. Each `OR` clause unions in the properties carrying all of its tags, or
//!    every candidate when its tag list is empty.
//! 3. Each non-empty `NOT` clause removes the properties carrying all of its tags.

use std::collections::{BTreeMap, BTreeSet};

use crate::property::PropertyId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagOperation {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "OR"))]
    Or,
    #[cfg_attr(feature = "serde", serde(rename = "NOT"))]
    Not,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct ExtraTags {
    pub operation: TagOperation,
    pub tags: Vec<String>,
}

impl ExtraTags {
    pub fn or<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation: TagOperation::Or,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation: TagOperation::Not,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct TagTargeting {
    pub target_tags: Vec<String>,
    pub extra_tags: Vec<ExtraTags>,
}

impl TagTargeting {
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_tags: tags.into_iter().map(Into::into).collect(),
            extra_tags: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: ExtraTags) -> Self {
        self.extra_tags.push(extra);
        self
    }

    /// Whether one property with `tags` is selected.
    pub fn matches(&self, tags: &BTreeSet<String>) -> bool {
        let carries_all = |wanted: &[String]| wanted.iter().all(|tag| tags.contains(tag));
        let mut selected = carries_all(&self.target_tags);
        for extra in &self.extra_tags {
            if extra.operation == TagOperation::Or && carries_all(&extra.tags) {
                selected = true;
            }
        }
        for extra in &self.extra_tags {
            if extra.operation == TagOperation::Not
                && !extra.tags.is_empty()
                && carries_all(&extra.tags)
            {
                selected = false;
            }
        }
        selected
    }
}

/// Multimap from tag to the properties carrying it, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct TagIndex {
    by_tag: BTreeMap<String, BTreeSet<PropertyId>>,
    all: Vec<PropertyId>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<'a>(&mut self, id: &PropertyId, tags: impl IntoIterator<Item = &'a String>) {
        self.all.push(id.clone());
        for tag in tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id.clone());
        }
    }

    fn carrying_all(&self, tags: &[String]) -> Option<BTreeSet<PropertyId>> {
        let mut sets = tags.iter().map(|tag| self.by_tag.get(tag));
        let first = sets.next()?.cloned().unwrap_or_default();
        Some(sets.fold(first, |acc, set| match set {
            Some(set) => acc.intersection(set).cloned().collect(),
            None => BTreeSet::new(),
        }))
    }

    /// Ids selected by `targeting`, in insertion order.
    pub fn select(&self, targeting: &TagTargeting) -> Vec<PropertyId> {
        let everything = || self.all.iter().cloned().collect::<BTreeSet<_>>();
        let mut selected = self
            .carrying_all(&targeting.target_tags)
            .unwrap_or_else(everything);
        for extra in &targeting.extra_tags {
            if extra.operation == TagOperation::Or {
                let matched = self.carrying_all(&extra.tags).unwrap_or_else(everything);
                selected.extend(matched);
            }
        }
        for extra in &targeting.extra_tags {
            if extra.operation == TagOperation::Not
                && let Some(excluded) = self.carrying_all(&extra.tags)
            {
                selected.retain(|id| !excluded.contains(id));
            }
        }
        self.all
            .iter()
            .filter(|id| selected.contains(*id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TagIndex {
        let mut index = TagIndex::new();
        let entries: [(&str, &[&str]); 4] = [
            ("a", &["weapon", "melee"]),
            ("b", &["weapon", "ranged"]),
            ("c", &["armor"]),
            ("d", &["weapon", "melee", "magic"]),
        ];
        for (id, tags) in entries {
            let tags: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();
            index.insert(&id.to_string(), &tags);
        }
        index
    }

    #[test]
    fn base_tags_intersect() {
        let selected = index().select(&TagTargeting::tags(["weapon", "melee"]));
        assert_eq!(selected, vec!["a", "d"]);
    }

    #[test]
    fn or_clauses_union_and_not_clauses_exclude() {
        let targeting = TagTargeting::tags(["melee"])
            .with_extra(ExtraTags::or(["armor"]))
            .with_extra(ExtraTags::not(["magic"]));
        assert_eq!(index().select(&targeting), vec!["a", "c"]);
    }

    #[test]
    fn not_requires_every_listed_tag() {
        let targeting =
            TagTargeting::tags(["weapon"]).with_extra(ExtraTags::not(["ranged", "magic"]));
        assert_eq!(index().select(&targeting), vec!["a", "b", "d"]);
    }

    #[test]
    fn empty_targeting_selects_everything() {
        assert_eq!(index().select(&TagTargeting::default()).len(), 4);
        assert!(TagTargeting::default().matches(&BTreeSet::new()));
    }

    #[test]
    fn not_only_targeting_starts_from_everything() {
        let targeting = TagTargeting::default().with_extra(ExtraTags::not(["melee"]));
        assert_eq!(index().select(&targeting), vec!["b", "c"]);
        let melee: BTreeSet<String> = ["weapon", "melee"].iter().map(|t| t.to_string()).collect();
        assert!(!targeting.matches(&melee));
        assert!(targeting.matches(&BTreeSet::new()));
    }

    #[test]
    fn matches_agrees_with_select() {
        let targeting = TagTargeting::tags(["weapon"]).with_extra(ExtraTags::not(["magic"]));
        let tags: BTreeSet<String> = ["weapon", "melee"].iter().map(|t| t.to_string()).collect();
        assert!(targeting.matches(&tags));
        let tags: BTreeSet<String> = ["weapon", "magic"].iter().map(|t| t.to_string()).collect();
        assert!(!targeting.matches(&tags));
    }
}
