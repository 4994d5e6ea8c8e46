//! # Fact Resolver
//!
//! Turns one raw item into the rows it adds to the store, if any.
//!
//! ## Order
//! 1. Menu by (meal, location, date), minted on first sight
//! 2. Every allergen badge by name, minted on first sight
//! 3. Food by name
//!    - new: full nutrient snapshot and dietary flags, linked to the menu and to every allergen
//!    - known: only linked to the menu, and only if that pair is not linked yet
//!
//! A known food is never refreshed. Flags and allergen links are captured once, when the food
//! is first seen, even if a later menu reports different badges.
use bank::{Allergen, Food, FoodOnAllergen, FoodOnMenu, Menu, MenuKey, Nutrients, SurrogateId};
use tracing::debug;

use crate::{
    cache::IdentityCache,
    feed::{BadgeKind, RawItem},
    utils::{clean_nutrient_name, sanitize, sanitize_allergen, strip_nutrient},
};

pub const VEGETARIAN: &str = "Vegetarian";
pub const VEGAN: &str = "Vegan";
pub const BALANCED: &str = "Balanced U";

/// New rows produced by a single raw item.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResolvedFact {
    pub menu: Option<Menu>,
    pub food: Option<Food>,
    pub allergens: Vec<Allergen>,
    pub food_menus: Vec<FoodOnMenu>,
    pub food_allergens: Vec<FoodOnAllergen>,
}

impl ResolvedFact {
    pub fn is_empty(&self) -> bool {
        self.menu.is_none()
            && self.food.is_none()
            && self.allergens.is_empty()
            && self.food_menus.is_empty()
            && self.food_allergens.is_empty()
    }
}

pub struct FactResolver<'c> {
    cache: &'c mut IdentityCache,
}

impl<'c> FactResolver<'c> {
    pub fn new(cache: &'c mut IdentityCache) -> Self {
        Self { cache }
    }

    pub fn resolve(&mut self, raw: &RawItem) -> ResolvedFact {
        let mut fact = ResolvedFact::default();

        let name = sanitize(&raw.name);
        if name.is_empty() {
            debug!(location = %raw.location, date = %raw.date, "Skipping unnamed item");
            return fact;
        }

        let menu_id = self.resolve_menu(raw, &mut fact);
        let allergen_ids = self.resolve_allergens(raw, &mut fact);

        let food_id = match self.cache.foods.lookup(name.as_str()) {
            Some(food_id) => food_id,
            None => {
                let food_id = self.cache.foods.allocate();

                #[cfg(feature = "verbose")]
                println!("New item! {} ({})", name, food_id);

                fact.food = Some(new_food(food_id, name.clone(), raw));
                self.cache.foods.register(name, food_id);

                for allergen_id in allergen_ids {
                    let link = FoodOnAllergen {
                        food_id,
                        allergen_id,
                    };

                    if self.cache.food_allergens.insert(link) {
                        fact.food_allergens.push(link);
                    }
                }

                food_id
            }
        };

        let link = FoodOnMenu { menu_id, food_id };
        if self.cache.food_menus.insert(link) {
            fact.food_menus.push(link);
        }

        fact
    }

    fn resolve_menu(&mut self, raw: &RawItem, fact: &mut ResolvedFact) -> SurrogateId {
        let key = MenuKey {
            meal: raw.meal,
            location: raw.location,
            date: raw.date,
        };

        let (menu_id, is_new) = self.cache.menus.resolve(key);
        if is_new {
            debug!(
                menu_id,
                meal = %key.meal,
                location = %key.location,
                date = %key.date,
                "New menu"
            );

            fact.menu = Some(Menu {
                id: menu_id,
                meal: key.meal,
                location: key.location,
                date: key.date,
            });
        }

        menu_id
    }

    /// Ids of every distinct allergen on the item, in badge order.
    fn resolve_allergens(&mut self, raw: &RawItem, fact: &mut ResolvedFact) -> Vec<SurrogateId> {
        let mut ids = Vec::new();

        for badge in raw.badges.iter().filter(|b| b.kind == BadgeKind::Allergen) {
            let name = sanitize_allergen(&badge.name);
            if name.is_empty() {
                continue;
            }

            let (allergen_id, is_new) = self.cache.allergens.resolve(name.clone());
            if is_new {
                debug!(allergen_id, allergen = %name, "New allergen");
                fact.allergens.push(Allergen {
                    id: allergen_id,
                    name,
                });
            }

            if !ids.contains(&allergen_id) {
                ids.push(allergen_id);
            }
        }

        ids
    }
}

fn new_food(id: SurrogateId, name: String, raw: &RawItem) -> Food {
    let mut nutrients = Nutrients::default();

    for (label, value) in &raw.nutrients {
        match clean_nutrient_name(label) {
            Some(nutrient) => nutrients.set(nutrient, strip_nutrient(value)),
            None => debug!(label = %label, "Ignoring nutrient outside vocabulary"),
        }
    }

    let has_badge = |label: &str| raw.badges.iter().any(|b| b.name.trim() == label);

    Food {
        id,
        name,
        serving: sanitize(&raw.serving),
        description: raw
            .description
            .as_deref()
            .map(sanitize)
            .filter(|d| !d.is_empty()),
        nutrients,
        vegetarian: has_badge(VEGETARIAN),
        vegan: has_badge(VEGAN),
        balanced: has_badge(BALANCED),
    }
}
