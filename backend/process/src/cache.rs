//! # Identity Cache
//!
//! In-memory picture of what the store already holds, loaded once per run.
//!
//! - Natural key to surrogate id per entity kind, O(1) lookups
//! - Highest id seen per kind; the next mint is always one above it
//! - Link pairs already stored, so repeated menu appearances are not re-linked
//!
//! Everything resolved during the run is registered here immediately, so a food that shows up
//! on several days of the same window is only minted once.
use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    hash::Hash,
};

use bank::{FoodOnAllergen, FoodOnMenu, MenuKey, Snapshot, Store, SurrogateId};
use tracing::info;

use crate::{
    error::IngestError,
    utils::{sanitize, sanitize_allergen},
};

/// Natural keys of one entity kind and the id counter that goes with them.
#[derive(Debug)]
pub struct Registry<K> {
    ids: HashMap<K, SurrogateId>,
    last_id: SurrogateId,
}

impl<K> Default for Registry<K> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            last_id: 0,
        }
    }
}

impl<K: Eq + Hash> Registry<K> {
    /// Duplicate keys in legacy data resolve to their lowest id.
    pub fn hydrate(rows: impl IntoIterator<Item = (K, SurrogateId)>) -> Self {
        let mut registry = Self::default();

        for (key, id) in rows {
            registry.last_id = registry.last_id.max(id);
            registry
                .ids
                .entry(key)
                .and_modify(|existing| *existing = (*existing).min(id))
                .or_insert(id);
        }

        registry
    }

    pub fn lookup<Q>(&self, key: &Q) -> Option<SurrogateId>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.ids.get(key).copied()
    }

    /// Mints the next id. Only call once the fact is known to be new.
    pub fn allocate(&mut self) -> SurrogateId {
        self.last_id += 1;
        self.last_id
    }

    pub fn register(&mut self, key: K, id: SurrogateId) {
        self.last_id = self.last_id.max(id);
        self.ids.insert(key, id);
    }

    /// Existing id for `key`, or a freshly minted and registered one flagged `true`.
    pub fn resolve(&mut self, key: K) -> (SurrogateId, bool) {
        if let Some(id) = self.lookup(&key) {
            return (id, false);
        }

        let id = self.allocate();
        self.register(key, id);

        (id, true)
    }

    pub fn last_id(&self) -> SurrogateId {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct IdentityCache {
    pub foods: Registry<String>,
    pub menus: Registry<MenuKey>,
    pub allergens: Registry<String>,
    pub food_menus: HashSet<FoodOnMenu>,
    pub food_allergens: HashSet<FoodOnAllergen>,
}

impl IdentityCache {
    /// Any store failure aborts here, before a single fact is resolved.
    pub async fn hydrate<S: Store>(store: &S) -> Result<Self, IngestError> {
        let snapshot = store.snapshot().await.map_err(IngestError::CacheLoad)?;
        let cache = Self::from_snapshot(snapshot);

        info!(
            foods = cache.foods.len(),
            menus = cache.menus.len(),
            allergens = cache.allergens.len(),
            food_menus = cache.food_menus.len(),
            food_allergens = cache.food_allergens.len(),
            "Loaded identity cache"
        );
        info!(
            food_id = cache.foods.last_id(),
            menu_id = cache.menus.last_id(),
            allergen_id = cache.allergens.last_id(),
            "Last known ids"
        );

        Ok(cache)
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            foods: Registry::hydrate(
                snapshot
                    .foods
                    .into_iter()
                    .map(|food| (sanitize(&food.name), food.id)),
            ),
            menus: Registry::hydrate(snapshot.menus.into_iter().map(|menu| (menu.key(), menu.id))),
            allergens: Registry::hydrate(
                snapshot
                    .allergens
                    .into_iter()
                    .map(|allergen| (sanitize_allergen(&allergen.name), allergen.id)),
            ),
            food_menus: snapshot.food_menus.into_iter().collect(),
            food_allergens: snapshot.food_allergens.into_iter().collect(),
        }
    }
}
