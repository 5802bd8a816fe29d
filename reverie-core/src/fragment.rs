//! Memory fragments and the read-only registry that holds them.
//!
//! The registry is loaded once at startup from a TOML catalog and shared
//! behind an `Arc`. Fragments are stored in `(category, order)` order, which
//! is also the deterministic tie-break used wherever several fragments
//! compete for a position.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::condition::UnlockConditions;
use crate::error::{ReverieError, Result};
use crate::types::FragmentId;

/// The catalog compiled into the crate.
pub const BUILTIN_CATALOG: &str = include_str!("../catalog/fragments.toml");

/// The five fragment categories. Declaration order is alphabetical, so the
/// derived `Ord` agrees with ordering by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentCategory {
    /// The companion becoming aware of themself.
    Awakening,
    /// The bond between companion and user.
    Bond,
    /// The companion's fall.
    Corruption,
    /// Where the companion came from.
    Origin,
    /// The companion's redemption.
    Purity,
}

impl FragmentCategory {
    /// Every category in canonical order.
    pub const ALL: [Self; 5] = [
        Self::Awakening,
        Self::Bond,
        Self::Corruption,
        Self::Origin,
        Self::Purity,
    ];

    /// Wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Awakening => "awakening",
            Self::Bond => "bond",
            Self::Corruption => "corruption",
            Self::Origin => "origin",
            Self::Purity => "purity",
        }
    }
}

impl fmt::Display for FragmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How rare a fragment is meant to feel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    /// Unlocked by most users.
    #[default]
    Common,
    /// Needs some commitment.
    Uncommon,
    /// Needs a clear path.
    Rare,
    /// Needs an extreme path.
    Epic,
    /// Needs a specific sequence of choices.
    Legendary,
}

/// One narrative unlockable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentDefinition {
    /// Unique catalog key.
    pub id: FragmentId,
    /// Category it belongs to.
    pub category: FragmentCategory,
    /// Position within its category (unique per category).
    pub order: u32,
    /// Rarity tier.
    #[serde(default)]
    pub rarity: Rarity,
    /// Display title.
    pub title: String,
    /// Teaser shown before and after unlock.
    #[serde(default)]
    pub description: String,
    /// Full text revealed on unlock.
    pub content: String,
    /// What it takes to unlock.
    #[serde(default)]
    pub conditions: UnlockConditions,
}

impl FragmentDefinition {
    /// Deterministic ordering key.
    #[must_use]
    pub fn sort_key(&self) -> (FragmentCategory, u32) {
        (self.category, self.order)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    fragments: Vec<FragmentDefinition>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable catalog of every fragment definition.
#[derive(Debug, Clone, Default)]
pub struct FragmentRegistry {
    fragments: Vec<FragmentDefinition>,
    index: HashMap<FragmentId, usize>,
}

impl FragmentRegistry {
    /// Build a registry, enforcing id and `(category, order)` uniqueness.
    ///
    /// # Errors
    /// Returns `ReverieError::Catalog` on a blank id, a duplicate id, or a
    /// duplicate order within a category.
    pub fn new(mut fragments: Vec<FragmentDefinition>) -> Result<Self> {
        fragments.sort_by_key(FragmentDefinition::sort_key);

        let mut index = HashMap::with_capacity(fragments.len());
        let mut slots = HashSet::with_capacity(fragments.len());
        for (i, fragment) in fragments.iter().enumerate() {
            if fragment.id.as_str().trim().is_empty() {
                return Err(ReverieError::Catalog("fragment id must not be blank".to_string()));
            }
            if index.insert(fragment.id.clone(), i).is_some() {
                return Err(ReverieError::Catalog(format!(
                    "duplicate fragment id '{}'",
                    fragment.id
                )));
            }
            if !slots.insert(fragment.sort_key()) {
                return Err(ReverieError::Catalog(format!(
                    "order {} is used twice in category '{}'",
                    fragment.order, fragment.category
                )));
            }
        }

        Ok(Self { fragments, index })
    }

    /// Parse a catalog from TOML (`[[fragments]]` array of tables).
    ///
    /// # Errors
    /// Returns `ReverieError::Catalog` if the TOML or any definition is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(toml_str).map_err(|e| ReverieError::Catalog(e.to_string()))?;
        Self::new(file.fragments)
    }

    /// Load a catalog file from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            fragments = registry.len(),
            "Fragment catalog loaded"
        );
        Ok(registry)
    }

    /// The catalog shipped with the crate.
    ///
    /// # Errors
    /// Returns `ReverieError::Catalog` if the embedded catalog is invalid.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    /// Load from `path` when given, the built-in catalog otherwise.
    ///
    /// # Errors
    /// See [`Self::from_file`] and [`Self::builtin`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Look up a fragment by id.
    #[must_use]
    pub fn get(&self, id: &FragmentId) -> Option<&FragmentDefinition> {
        self.index.get(id).map(|&i| &self.fragments[i])
    }

    /// Look up a fragment by id, failing with `NotFound`.
    ///
    /// # Errors
    /// Returns `ReverieError::NotFound` for an unknown id.
    pub fn require(&self, id: &FragmentId) -> Result<&FragmentDefinition> {
        self.get(id)
            .ok_or_else(|| ReverieError::not_found("fragment", id))
    }

    /// All fragments in `(category, order)` order.
    pub fn iter(&self) -> std::slice::Iter<'_, FragmentDefinition> {
        self.fragments.iter()
    }

    /// Fragments of one category, in order.
    pub fn in_category(
        &self,
        category: FragmentCategory,
    ) -> impl Iterator<Item = &FragmentDefinition> + '_ {
        self.fragments.iter().filter(move |f| f.category == category)
    }

    /// Total number of fragments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the registry holds no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
