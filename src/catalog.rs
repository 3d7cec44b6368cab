// Hero catalog: the data-driven set of heroes a draft may ban or pick.
//
// The catalog is injected at startup (from a TOML file in production, from
// a literal list in tests). The engine never assumes anything about the id
// range, so new heroes only require a catalog file change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque hero identifier. Ids come from the catalog file and are never
/// interpreted beyond equality and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeroId(pub u32);

impl std::fmt::Display for HeroId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse catalog file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("catalog contains no heroes")]
    Empty,

    #[error("duplicate hero id {0} in catalog")]
    DuplicateId(HeroId),
}

/// One `[[hero]]` entry in the catalog file.
#[derive(Debug, Clone, Deserialize)]
struct HeroEntry {
    id: u32,
    name: String,
}

/// Wrapper for the top-level `[[hero]]` array in heroes.toml.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    hero: Vec<HeroEntry>,
}

/// Immutable hero catalog: id membership plus display names.
#[derive(Debug, Clone)]
pub struct HeroCatalog {
    heroes: BTreeMap<HeroId, String>,
}

impl HeroCatalog {
    /// Build a catalog from `(id, name)` pairs. Fails on duplicates or an
    /// empty list.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut heroes = BTreeMap::new();
        for (id, name) in entries {
            let id = HeroId(id);
            if heroes.insert(id, name.into()).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
        }
        if heroes.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(HeroCatalog { heroes })
    }

    /// Load the catalog from a TOML file with `[[hero]]` entries.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|_| CatalogError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let file: CatalogFile =
            toml::from_str(&contents).map_err(|source| CatalogError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_entries(file.hero.into_iter().map(|h| (h.id, h.name)))
    }

    /// Whether `id` names a hero in this catalog.
    pub fn is_valid(&self, id: HeroId) -> bool {
        self.heroes.contains_key(&id)
    }

    /// Display name for a hero, falling back to the numeric id for unknown
    /// heroes (only reachable from log formatting, never from the engine).
    pub fn name_of(&self, id: HeroId) -> String {
        self.heroes
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// All hero ids, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = HeroId> + '_ {
        self.heroes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.heroes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heroes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_catalog() -> HeroCatalog {
        HeroCatalog::from_entries([
            (1, "Axe"),
            (2, "Crystal Maiden"),
            (3, "Pudge"),
            (145, "Ringmaster"),
        ])
        .unwrap()
    }

    #[test]
    fn membership_is_data_driven() {
        let catalog = small_catalog();
        assert!(catalog.is_valid(HeroId(1)));
        assert!(catalog.is_valid(HeroId(145)));
        assert!(!catalog.is_valid(HeroId(4)));
        assert!(!catalog.is_valid(HeroId(0)));
    }

    #[test]
    fn high_numbered_hero_is_not_special() {
        // A newly released hero with a large id must be pickable as long as
        // the catalog file lists it.
        let catalog = HeroCatalog::from_entries([(1, "Axe"), (9001, "Future Hero")]).unwrap();
        assert!(catalog.is_valid(HeroId(9001)));
    }

    #[test]
    fn ids_are_sorted_ascending() {
        let catalog = HeroCatalog::from_entries([(3, "C"), (1, "A"), (2, "B")]).unwrap();
        let ids: Vec<HeroId> = catalog.ids().collect();
        assert_eq!(ids, vec![HeroId(1), HeroId(2), HeroId(3)]);
    }

    #[test]
    fn name_lookup() {
        let catalog = small_catalog();
        assert_eq!(catalog.name_of(HeroId(3)), "Pudge");
        assert_eq!(catalog.name_of(HeroId(42)), "#42");
    }

    #[test]
    fn empty_catalog_rejected() {
        let result = HeroCatalog::from_entries(Vec::<(u32, String)>::new());
        assert!(matches!(result, Err(CatalogError::Empty)));
    }

    #[test]
    fn duplicate_id_rejected() {
        let result = HeroCatalog::from_entries([(1, "Axe"), (1, "Also Axe")]);
        assert!(matches!(result, Err(CatalogError::DuplicateId(HeroId(1)))));
    }

    #[test]
    fn parse_from_toml() {
        let toml_src = r#"
            [[hero]]
            id = 1
            name = "Axe"

            [[hero]]
            id = 2
            name = "Crystal Maiden"
        "#;
        let file: CatalogFile = toml::from_str(toml_src).unwrap();
        let catalog =
            HeroCatalog::from_entries(file.hero.into_iter().map(|h| (h.id, h.name))).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.name_of(HeroId(2)), "Crystal Maiden");
    }
}
