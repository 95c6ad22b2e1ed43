//! # Catalog — Teams, Equipment, and Checklist Items
//!
//! The static tables the inspection screens are built from, kept in TOML:
//!
//! ```toml
//! primary_scope = "1-A"
//!
//! [items]
//! default = ["일반점검", "정기점검", "외관확인", "소음확인"]
//! monthly = ["일반점검", "벨트장력"]        # optional per-type override
//!
//! [[teams]]
//! scope = "1-A"
//! name = "제조팀"
//! equipment = ["진공펌프", "스크러바"]
//! ```
//!
//! A default catalog is compiled in. Lookups for a scope that has no team
//! entry fall back to the primary scope's equipment list.
//!
//! ## Limits
//!
//! | Limit | Value |
//! |-------|-------|
//! | equipment per team | 100 |
//! | items per inspection type | 50 |
//!
//! Names are unique within their list.

use crate::inspection::{InspectionType, SiteScope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MAX_EQUIPMENT_PER_TEAM: usize = 100;
pub const MAX_ITEMS_PER_TYPE: usize = 50;

const EMBEDDED: &str = include_str!("../config/catalog.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serializing catalog: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("primary scope {0} has no team entry")]
    UnknownPrimary(SiteScope),
    #[error("scope {0} is listed more than once")]
    DuplicateScope(SiteScope),
    #[error("scope {0} has no team entry")]
    UnknownScope(SiteScope),
    #[error("{scope} already has equipment {name:?}")]
    DuplicateEquipment { scope: SiteScope, name: String },
    #[error("{scope} has no equipment {name:?}")]
    MissingEquipment { scope: SiteScope, name: String },
    #[error("{scope} has {count} equipment, limit is 100")]
    TooManyEquipment { scope: SiteScope, count: usize },
    #[error("{kind} already has item {item:?}")]
    DuplicateItem { kind: String, item: String },
    #[error("{kind} has no item {item:?}")]
    MissingItem { kind: String, item: String },
    #[error("{kind} has {count} items, limit is 50")]
    TooManyItems { kind: String, count: usize },
    #[error("names must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub scope: SiteScope,
    pub name: String,
    #[serde(default)]
    pub equipment: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTable {
    #[serde(default)]
    pub default: Vec<String>,
    #[serde(flatten)]
    pub by_type: BTreeMap<InspectionType, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    primary_scope: SiteScope,
    #[serde(default)]
    items: ItemTable,
    #[serde(default)]
    teams: Vec<Team>,
}

impl Catalog {
    /// The compiled-in default catalog.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_toml_str(EMBEDDED)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = toml::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load from `path`, or the embedded catalog when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)
            }
            None => Self::embedded(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let raw = toml::to_string_pretty(self)?;
        let io_err = |source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, raw).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut scopes = HashSet::new();
        for team in &self.teams {
            if !scopes.insert(&team.scope) {
                return Err(CatalogError::DuplicateScope(team.scope.clone()));
            }
            if team.equipment.len() > MAX_EQUIPMENT_PER_TEAM {
                return Err(CatalogError::TooManyEquipment {
                    scope: team.scope.clone(),
                    count: team.equipment.len(),
                });
            }
            if let Some(name) = first_duplicate(&team.equipment) {
                return Err(CatalogError::DuplicateEquipment {
                    scope: team.scope.clone(),
                    name,
                });
            }
        }
        if !scopes.contains(&self.primary_scope) {
            return Err(CatalogError::UnknownPrimary(self.primary_scope.clone()));
        }

        let lists = std::iter::once(("default".to_string(), &self.items.default))
            .chain(self.items.by_type.iter().map(|(k, v)| (k.to_string(), v)));
        for (kind, items) in lists {
            if items.len() > MAX_ITEMS_PER_TYPE {
                return Err(CatalogError::TooManyItems {
                    kind,
                    count: items.len(),
                });
            }
            if let Some(item) = first_duplicate(items) {
                return Err(CatalogError::DuplicateItem { kind, item });
            }
        }
        Ok(())
    }

    pub fn primary_scope(&self) -> &SiteScope {
        &self.primary_scope
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, scope: &SiteScope) -> Option<&Team> {
        self.teams.iter().find(|t| &t.scope == scope)
    }

    /// Equipment for `scope`, or the primary scope's list for unknown scopes.
    pub fn equipment_for(&self, scope: &SiteScope) -> &[String] {
        self.team(scope)
            .or_else(|| self.team(&self.primary_scope))
            .map(|t| t.equipment.as_slice())
            .unwrap_or(&[])
    }

    pub fn items_for(&self, kind: InspectionType) -> &[String] {
        self.items
            .by_type
            .get(&kind)
            .unwrap_or(&self.items.default)
    }

    pub fn add_equipment(&mut self, scope: &SiteScope, name: &str) -> Result<(), CatalogError> {
        let name = non_empty(name)?;
        let team = self.team_mut(scope)?;
        if team.equipment.iter().any(|e| e == name) {
            return Err(CatalogError::DuplicateEquipment {
                scope: scope.clone(),
                name: name.to_string(),
            });
        }
        if team.equipment.len() >= MAX_EQUIPMENT_PER_TEAM {
            return Err(CatalogError::TooManyEquipment {
                scope: scope.clone(),
                count: team.equipment.len() + 1,
            });
        }
        team.equipment.push(name.to_string());
        Ok(())
    }

    pub fn remove_equipment(&mut self, scope: &SiteScope, name: &str) -> Result<(), CatalogError> {
        let team = self.team_mut(scope)?;
        let before = team.equipment.len();
        team.equipment.retain(|e| e != name.trim());
        if team.equipment.len() == before {
            return Err(CatalogError::MissingEquipment {
                scope: scope.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Add an item to `kind`'s list. A type without its own list starts
    /// from a copy of the default.
    pub fn add_item(&mut self, kind: InspectionType, item: &str) -> Result<(), CatalogError> {
        let item = non_empty(item)?;
        let list = self.items_mut(kind);
        if list.iter().any(|i| i == item) {
            return Err(CatalogError::DuplicateItem {
                kind: kind.to_string(),
                item: item.to_string(),
            });
        }
        if list.len() >= MAX_ITEMS_PER_TYPE {
            return Err(CatalogError::TooManyItems {
                kind: kind.to_string(),
                count: list.len() + 1,
            });
        }
        list.push(item.to_string());
        Ok(())
    }

    pub fn remove_item(&mut self, kind: InspectionType, item: &str) -> Result<(), CatalogError> {
        let list = self.items_mut(kind);
        let before = list.len();
        list.retain(|i| i != item.trim());
        if list.len() == before {
            return Err(CatalogError::MissingItem {
                kind: kind.to_string(),
                item: item.to_string(),
            });
        }
        Ok(())
    }

    fn team_mut(&mut self, scope: &SiteScope) -> Result<&mut Team, CatalogError> {
        self.teams
            .iter_mut()
            .find(|t| &t.scope == scope)
            .ok_or_else(|| CatalogError::UnknownScope(scope.clone()))
    }

    fn items_mut(&mut self, kind: InspectionType) -> &mut Vec<String> {
        let default = &self.items.default;
        self.items
            .by_type
            .entry(kind)
            .or_insert_with(|| default.clone())
    }
}

fn non_empty(name: &str) -> Result<&str, CatalogError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(CatalogError::EmptyName)
    } else {
        Ok(trimmed)
    }
}

fn first_duplicate(names: &[String]) -> Option<String> {
    let mut seen = HashSet::new();
    names.iter().find(|n| !seen.insert(n.as_str())).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(s: &str) -> SiteScope {
        SiteScope::new(s).unwrap()
    }

    #[test]
    fn embedded_catalog_has_five_teams() {
        let catalog = Catalog::embedded().unwrap();
        let scopes: Vec<_> = catalog.teams().iter().map(|t| t.scope.as_str()).collect();
        assert_eq!(scopes, vec!["1-A", "1-B", "1-C", "1-D", "1-E"]);
        assert_eq!(catalog.primary_scope().as_str(), "1-A");
        assert_eq!(catalog.team(&scope("1-B")).unwrap().name, "정제팀");
        assert_eq!(catalog.equipment_for(&scope("1-A")).len(), 14);
        assert_eq!(
            catalog.items_for(InspectionType::Weekly),
            ["일반점검", "정기점검", "외관확인", "소음확인"]
        );
    }

    #[test]
    fn unknown_scope_falls_back_to_primary_equipment() {
        let catalog = Catalog::embedded().unwrap();
        assert_eq!(
            catalog.equipment_for(&scope("9-Z")),
            catalog.equipment_for(&scope("1-A"))
        );
    }

    #[test]
    fn per_type_items_override_default() {
        let catalog = Catalog::from_toml_str(
            r#"
            primary_scope = "1-A"
            [items]
            default = ["Look"]
            annual = ["Look", "Certify"]
            [[teams]]
            scope = "1-A"
            name = "Plant"
            "#,
        )
        .unwrap();
        assert_eq!(catalog.items_for(InspectionType::Annual), ["Look", "Certify"]);
        assert_eq!(catalog.items_for(InspectionType::Daily), ["Look"]);
    }

    #[test]
    fn validation_rejects_bad_catalogs() {
        let missing_primary = "primary_scope = \"1-X\"\n[[teams]]\nscope = \"1-A\"\nname = \"A\"\n";
        assert!(matches!(
            Catalog::from_toml_str(missing_primary),
            Err(CatalogError::UnknownPrimary(_))
        ));

        let dup_equipment =
            "primary_scope = \"1-A\"\n[[teams]]\nscope = \"1-A\"\nname = \"A\"\nequipment = [\"P\", \"P\"]\n";
        assert!(matches!(
            Catalog::from_toml_str(dup_equipment),
            Err(CatalogError::DuplicateEquipment { .. })
        ));

        let dup_scope = "primary_scope = \"1-A\"\n[[teams]]\nscope = \"1-A\"\nname = \"A\"\n[[teams]]\nscope = \"1-A\"\nname = \"B\"\n";
        assert!(matches!(
            Catalog::from_toml_str(dup_scope),
            Err(CatalogError::DuplicateScope(_))
        ));
    }

    #[test]
    fn equipment_limit_is_enforced() {
        let mut catalog = Catalog::embedded().unwrap();
        let a = scope("1-E");
        let existing = catalog.equipment_for(&a).len();
        for i in existing..MAX_EQUIPMENT_PER_TEAM {
            catalog.add_equipment(&a, &format!("unit-{i}")).unwrap();
        }
        assert!(matches!(
            catalog.add_equipment(&a, "one too many"),
            Err(CatalogError::TooManyEquipment { count: 101, .. })
        ));
    }

    #[test]
    fn add_item_copies_default_then_extends() {
        let mut catalog = Catalog::embedded().unwrap();
        catalog.add_item(InspectionType::Monthly, "벨트장력").unwrap();
        assert_eq!(catalog.items_for(InspectionType::Monthly).len(), 5);
        assert_eq!(catalog.items_for(InspectionType::Weekly).len(), 4);
        assert!(matches!(
            catalog.add_item(InspectionType::Monthly, "벨트장력"),
            Err(CatalogError::DuplicateItem { .. })
        ));
        catalog.remove_item(InspectionType::Monthly, "벨트장력").unwrap();
        assert!(catalog.remove_item(InspectionType::Monthly, "벨트장력").is_err());
    }

    #[test]
    fn mutations_reject_unknown_scope_and_blank_names() {
        let mut catalog = Catalog::embedded().unwrap();
        assert!(matches!(
            catalog.add_equipment(&scope("9-Z"), "Pump"),
            Err(CatalogError::UnknownScope(_))
        ));
        assert!(matches!(
            catalog.add_equipment(&scope("1-A"), "  "),
            Err(CatalogError::EmptyName)
        ));
        assert!(matches!(
            catalog.remove_equipment(&scope("1-A"), "nope"),
            Err(CatalogError::MissingEquipment { .. })
        ));
    }

    #[test]
    fn save_and_load_preserve_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.toml");
        let mut catalog = Catalog::embedded().unwrap();
        catalog.add_equipment(&scope("1-C"), "Forklift").unwrap();
        catalog.add_item(InspectionType::Annual, "Certify").unwrap();
        catalog.save(&path).unwrap();

        let loaded = Catalog::load(Some(&path)).unwrap();
        assert_eq!(loaded, catalog);
    }
}
