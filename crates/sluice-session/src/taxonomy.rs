//! Category tree and tag set.
//!
//! # Design
//! - Categories form a tree through `/` separated names; the tree is implicit
//!   in the name so the map stays flat.
//! - Validation lives here; cascading changes to member torrents is the
//!   control task's job because it owns the registry.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{SessionError, SessionResult};

const CATEGORY_NAME_PATTERN: &str = r"^[^\\/]+(/[^\\/]+)*$";

static CATEGORY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(CATEGORY_NAME_PATTERN).expect("category name pattern is valid"));

/// Whether `name` is a usable category name.
///
/// Names are non-empty, contain no `\`, and have no leading, trailing or
/// doubled `/`.
#[must_use]
pub fn is_valid_category_name(name: &str) -> bool {
    CATEGORY_NAME.is_match(name)
}

/// Every ancestor of `name` followed by `name` itself.
///
/// `expand_category("A/B/C")` yields `["A", "A/B", "A/B/C"]`.
#[must_use]
pub fn expand_category(name: &str) -> Vec<String> {
    let mut expanded = Vec::new();
    let mut end = 0;
    for segment in name.split('/') {
        end += segment.len();
        expanded.push(name[..end].to_string());
        end += 1;
    }
    expanded
}

/// Whether `tag` is a usable tag.
#[must_use]
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.trim().is_empty() && !tag.contains(',')
}

/// Categories (name to explicit save path) and the global tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Taxonomy {
    categories: BTreeMap<String, String>,
    tags: BTreeSet<String>,
}

impl Taxonomy {
    /// Rebuild from persisted values, dropping entries that no longer validate.
    pub(crate) fn from_persisted(
        categories: BTreeMap<String, String>,
        tags: BTreeSet<String>,
    ) -> Self {
        Self {
            categories: categories
                .into_iter()
                .filter(|(name, _)| is_valid_category_name(name))
                .collect(),
            tags: tags
                .into_iter()
                .filter(|tag| is_valid_tag(tag))
                .map(|tag| tag.trim().to_string())
                .collect(),
        }
    }

    pub(crate) const fn categories(&self) -> &BTreeMap<String, String> {
        &self.categories
    }

    pub(crate) const fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub(crate) fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub(crate) fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Fails unless `name` is empty (uncategorized) or an existing category.
    pub(crate) fn require_category(&self, name: &str) -> SessionResult<()> {
        if name.is_empty() || self.has_category(name) {
            Ok(())
        } else {
            Err(SessionError::CategoryNotFound {
                name: name.to_string(),
            })
        }
    }

    /// Fails unless `tag` exists.
    pub(crate) fn require_tag(&self, tag: &str) -> SessionResult<()> {
        if self.has_tag(tag) {
            Ok(())
        } else {
            Err(SessionError::TagNotFound {
                tag: tag.to_string(),
            })
        }
    }

    /// Save path used for automatic-mode torrents in `category`.
    pub(crate) fn category_save_path(&self, category: &str, default_save_path: &str) -> String {
        if category.is_empty() {
            return default_save_path.to_string();
        }
        match self.categories.get(category) {
            Some(explicit) if !explicit.is_empty() => explicit.clone(),
            _ => join_path(default_save_path, category),
        }
    }

    /// Create a category; returns every name created, ancestors first.
    pub(crate) fn add_category(
        &mut self,
        name: &str,
        save_path: &str,
        subcategories: bool,
    ) -> SessionResult<Vec<String>> {
        if !is_valid_category_name(name) {
            return Err(SessionError::InvalidCategoryName {
                name: name.to_string(),
            });
        }
        if self.has_category(name) {
            return Err(SessionError::CategoryExists {
                name: name.to_string(),
            });
        }

        let mut created = Vec::new();
        if subcategories {
            for parent in expand_category(name) {
                if parent != name && !self.has_category(&parent) {
                    self.categories.insert(parent.clone(), String::new());
                    created.push(parent);
                }
            }
        }
        self.categories
            .insert(name.to_string(), save_path.trim().to_string());
        created.push(name.to_string());
        Ok(created)
    }

    /// Create missing ancestors of every category; returns the names created.
    pub(crate) fn add_missing_parents(&mut self) -> Vec<String> {
        let missing: BTreeSet<String> = self
            .categories
            .keys()
            .flat_map(|name| expand_category(name))
            .filter(|name| !self.has_category(name))
            .collect();
        for name in &missing {
            self.categories.insert(name.clone(), String::new());
        }
        missing.into_iter().collect()
    }

    /// Replace a category's explicit save path; `false` when unchanged.
    pub(crate) fn edit_category(&mut self, name: &str, save_path: &str) -> SessionResult<bool> {
        let Some(current) = self.categories.get_mut(name) else {
            return Err(SessionError::CategoryNotFound {
                name: name.to_string(),
            });
        };
        let save_path = save_path.trim();
        if current == save_path {
            return Ok(false);
        }
        *current = save_path.to_string();
        Ok(true)
    }

    /// Delete a category and its descendants; returns the removed names.
    pub(crate) fn remove_category(&mut self, name: &str) -> SessionResult<Vec<String>> {
        if !self.has_category(name) {
            return Err(SessionError::CategoryNotFound {
                name: name.to_string(),
            });
        }
        let prefix = format!("{name}/");
        let removed: Vec<String> = self
            .categories
            .keys()
            .filter(|candidate| *candidate == name || candidate.starts_with(&prefix))
            .cloned()
            .collect();
        for category in &removed {
            self.categories.remove(category);
        }
        Ok(removed)
    }

    /// Create a tag; returns the normalised tag.
    pub(crate) fn add_tag(&mut self, tag: &str) -> SessionResult<String> {
        if !is_valid_tag(tag) {
            return Err(SessionError::InvalidTag {
                tag: tag.to_string(),
            });
        }
        let tag = tag.trim().to_string();
        if !self.tags.insert(tag.clone()) {
            return Err(SessionError::TagExists { tag });
        }
        Ok(tag)
    }

    pub(crate) fn remove_tag(&mut self, tag: &str) -> SessionResult<()> {
        if self.tags.remove(tag) {
            Ok(())
        } else {
            Err(SessionError::TagNotFound {
                tag: tag.to_string(),
            })
        }
    }
}

fn join_path(base: &str, child: &str) -> String {
    if base.is_empty() {
        return child.to_string();
    }
    format!("{}/{child}", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_are_validated() {
        for valid in ["Movies", "Linux/Ubuntu", "a b/c d"] {
            assert!(is_valid_category_name(valid), "{valid}");
        }
        for invalid in ["", "/Movies", "Movies/", "a//b", "a\\b"] {
            assert!(!is_valid_category_name(invalid), "{invalid}");
        }
    }

    #[test]
    fn category_pattern_compiles_and_anchors() {
        let pattern = Regex::new(CATEGORY_NAME_PATTERN).expect("pattern compiles");
        assert_eq!(pattern.as_str(), CATEGORY_NAME.as_str());
        assert!(CATEGORY_NAME.is_match("A/B/C"));
        assert!(!CATEGORY_NAME.is_match("prefix\\A/B"));
        assert!(!CATEGORY_NAME.is_match("A/B/"));
    }

    #[test]
    fn expand_category_lists_ancestors_first() {
        assert_eq!(expand_category("A/B/C"), vec!["A", "A/B", "A/B/C"]);
        assert_eq!(expand_category("Solo"), vec!["Solo"]);
    }

    #[test]
    fn tags_reject_commas_and_blank_input() {
        assert!(is_valid_tag("linux"));
        assert!(!is_valid_tag("   "));
        assert!(!is_valid_tag("a,b"));
    }

    #[test]
    fn subcategories_create_missing_parents() -> SessionResult<()> {
        let mut taxonomy = Taxonomy::default();
        let created = taxonomy.add_category("Linux/Ubuntu", "", true)?;
        assert_eq!(created, vec!["Linux", "Linux/Ubuntu"]);

        let created = taxonomy.add_category("Linux/Debian", "/srv/debian", true)?;
        assert_eq!(created, vec!["Linux/Debian"]);

        let flat = taxonomy.add_category("Books/Fiction", "", false)?;
        assert_eq!(flat, vec!["Books/Fiction"]);
        assert_eq!(taxonomy.add_missing_parents(), vec!["Books"]);
        Ok(())
    }

    #[test]
    fn duplicate_and_unknown_categories_are_rejected() -> SessionResult<()> {
        let mut taxonomy = Taxonomy::default();
        taxonomy.add_category("Movies", "/data/movies", false)?;
        assert!(matches!(
            taxonomy.add_category("Movies", "", false),
            Err(SessionError::CategoryExists { .. })
        ));
        assert!(matches!(
            taxonomy.edit_category("Music", "/x"),
            Err(SessionError::CategoryNotFound { .. })
        ));
        assert!(!taxonomy.edit_category("Movies", "/data/movies")?);
        assert!(taxonomy.edit_category("Movies", "/mnt/movies")?);
        Ok(())
    }

    #[test]
    fn save_path_falls_back_to_default_join() -> SessionResult<()> {
        let mut taxonomy = Taxonomy::default();
        taxonomy.add_category("Movies", "/data/movies", false)?;
        taxonomy.add_category("Shows", "", false)?;
        assert_eq!(taxonomy.category_save_path("Movies", "/dl"), "/data/movies");
        assert_eq!(taxonomy.category_save_path("Shows", "/dl/"), "/dl/Shows");
        assert_eq!(taxonomy.category_save_path("", "/dl"), "/dl");
        Ok(())
    }

    #[test]
    fn removal_cascades_to_descendants_only() -> SessionResult<()> {
        let mut taxonomy = Taxonomy::default();
        taxonomy.add_category("Linux/Ubuntu/Server", "", true)?;
        taxonomy.add_category("LinuxExtras", "", true)?;
        let removed = taxonomy.remove_category("Linux")?;
        assert_eq!(removed, vec!["Linux", "Linux/Ubuntu", "Linux/Ubuntu/Server"]);
        assert!(taxonomy.has_category("LinuxExtras"));
        Ok(())
    }

    #[test]
    fn tags_are_trimmed_and_unique() -> SessionResult<()> {
        let mut taxonomy = Taxonomy::default();
        assert_eq!(taxonomy.add_tag(" linux ")?, "linux");
        assert!(matches!(
            taxonomy.add_tag("linux"),
            Err(SessionError::TagExists { .. })
        ));
        taxonomy.remove_tag("linux")?;
        assert!(matches!(
            taxonomy.remove_tag("linux"),
            Err(SessionError::TagNotFound { .. })
        ));
        Ok(())
    }
}
