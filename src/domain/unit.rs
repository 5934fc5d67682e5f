// Unit and preset catalog domain model
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: i64,
    pub name: String,
}

impl Unit {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub unit_ids: Vec<i64>,
}

/// What changed when a fresh catalog replaced the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
    pub renamed: Vec<i64>,
    pub presets_changed: bool,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
            && !self.presets_changed
    }
}

/// Authoritative set of known units and presets.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    units: BTreeMap<i64, Unit>,
    presets: BTreeMap<i64, Preset>,
    loaded: bool,
}

impl Catalog {
    pub fn new(units: Vec<Unit>, presets: Vec<Preset>) -> Self {
        Self {
            units: units.into_iter().map(|u| (u.id, u)).collect(),
            presets: presets.into_iter().map(|p| (p.id, p)).collect(),
            loaded: true,
        }
    }

    /// True once at least one authoritative listing has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether records for `unit_id` may be stored.
    ///
    /// Until the first load nothing is known, so every unit is admitted.
    pub fn admits(&self, unit_id: i64) -> bool {
        !self.loaded || self.units.contains_key(&unit_id)
    }

    pub fn contains_unit(&self, unit_id: i64) -> bool {
        self.units.contains_key(&unit_id)
    }

    pub fn unit_name(&self, unit_id: i64) -> Option<&str> {
        self.units.get(&unit_id).map(|u| u.name.as_str())
    }

    pub fn preset_name(&self, preset_id: i64) -> Option<&str> {
        self.presets.get(&preset_id).map(|p| p.name.as_str())
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.units.keys().copied()
    }

    pub fn presets_for_unit(&self, unit_id: i64) -> impl Iterator<Item = &Preset> {
        self.presets
            .values()
            .filter(move |p| p.unit_ids.contains(&unit_id))
    }

    /// Replace the contents with `next`, reporting what changed.
    pub fn replace(&mut self, next: Catalog) -> CatalogDiff {
        let before: BTreeSet<i64> = self.units.keys().copied().collect();
        let after: BTreeSet<i64> = next.units.keys().copied().collect();

        let renamed = next
            .units
            .values()
            .filter(|u| {
                self.units
                    .get(&u.id)
                    .is_some_and(|old| old.name != u.name)
            })
            .map(|u| u.id)
            .collect();

        let diff = CatalogDiff {
            added: after.difference(&before).copied().collect(),
            removed: before.difference(&after).copied().collect(),
            renamed,
            presets_changed: self.presets != next.presets,
        };

        self.units = next.units;
        self.presets = next.presets;
        self.loaded = true;
        diff
    }
}
