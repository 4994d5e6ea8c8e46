//! # Batch Writer
//!
//! Everything a run resolves is held here until the end of the run, then written with one
//! insert per table. Tables go in [`Table::WRITE_ORDER`] so no link is written before its
//! parents. A failed table stops the flush; tables before it stay committed.
use bank::{Allergen, Food, FoodOnAllergen, FoodOnMenu, Menu, Store, Table, TableCounts};
use tracing::{debug, error, info};

use crate::{error::IngestError, resolver::ResolvedFact};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Batch {
    pub allergens: Vec<Allergen>,
    pub foods: Vec<Food>,
    pub menus: Vec<Menu>,
    pub food_allergens: Vec<FoodOnAllergen>,
    pub food_menus: Vec<FoodOnMenu>,
}

impl Batch {
    pub fn absorb(&mut self, fact: ResolvedFact) {
        self.menus.extend(fact.menu);
        self.foods.extend(fact.food);
        self.allergens.extend(fact.allergens);
        self.food_menus.extend(fact.food_menus);
        self.food_allergens.extend(fact.food_allergens);
    }

    pub fn rows(&self, table: Table) -> usize {
        match table {
            Table::Allergen => self.allergens.len(),
            Table::Food => self.foods.len(),
            Table::Menu => self.menus.len(),
            Table::FoodOnAllergen => self.food_allergens.len(),
            Table::FoodOnMenu => self.food_menus.len(),
        }
    }

    pub fn counts(&self) -> TableCounts {
        Table::WRITE_ORDER
            .into_iter()
            .map(|table| (table, self.rows(table) as u64))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        Table::WRITE_ORDER.into_iter().all(|table| self.rows(table) == 0)
    }
}

/// Writes the batch, skipping empty tables. Returns rows written per table.
pub async fn flush<S: Store>(store: &S, batch: &Batch) -> Result<TableCounts, IngestError> {
    let mut committed = TableCounts::new();

    for table in Table::WRITE_ORDER {
        if batch.rows(table) == 0 {
            debug!(%table, "Nothing to write");
            continue;
        }

        let result = match table {
            Table::Allergen => store.insert_allergens(&batch.allergens).await,
            Table::Food => store.insert_foods(&batch.foods).await,
            Table::Menu => store.insert_menus(&batch.menus).await,
            Table::FoodOnAllergen => store.insert_food_allergens(&batch.food_allergens).await,
            Table::FoodOnMenu => store.insert_food_menus(&batch.food_menus).await,
        };

        match result {
            Ok(written) => {
                info!(%table, written, "Flushed");
                committed.insert(table, written);
            }
            Err(source) => {
                error!(%table, rows = batch.rows(table), error = %source, "Flush failed");

                return Err(IngestError::Write {
                    table,
                    committed,
                    source,
                });
            }
        }
    }

    Ok(committed)
}

#[cfg(test)]
mod tests {
    use bank::{Location, MealType, memory::MemoryStore};
    use chrono::NaiveDate;

    use super::*;

    fn batch() -> Batch {
        Batch {
            allergens: vec![Allergen {
                id: 1,
                name: "Soy".to_string(),
            }],
            foods: vec![Food {
                id: 1,
                name: "Tofu".to_string(),
                serving: String::new(),
                description: None,
                nutrients: Default::default(),
                vegetarian: true,
                vegan: true,
                balanced: false,
            }],
            menus: vec![Menu {
                id: 1,
                meal: MealType::Dinner,
                location: Location::Steast,
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            }],
            food_allergens: vec![FoodOnAllergen {
                food_id: 1,
                allergen_id: 1,
            }],
            food_menus: vec![FoodOnMenu {
                menu_id: 1,
                food_id: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_write_order() {
        let store = MemoryStore::new();
        let committed = flush(&store, &batch()).await.unwrap();

        assert_eq!(store.write_log(), Table::WRITE_ORDER.to_vec());
        assert!(committed.values().all(|rows| *rows == 1));
    }

    #[tokio::test]
    async fn test_empty_tables_skipped() {
        let store = MemoryStore::new();
        let mut batch = batch();
        batch.allergens.clear();
        batch.food_allergens.clear();

        let committed = flush(&store, &batch).await.unwrap();
        assert_eq!(
            store.write_log(),
            vec![Table::Food, Table::Menu, Table::FoodOnMenu]
        );
        assert!(!committed.contains_key(&Table::Allergen));

        let empty = MemoryStore::new();
        assert!(flush(&empty, &Batch::default()).await.unwrap().is_empty());
        assert!(empty.write_log().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_tables() {
        let store = MemoryStore::new();
        store.fail_writes_to(Table::Menu, true);

        let err = flush(&store, &batch()).await.unwrap_err();
        let IngestError::Write {
            table, committed, ..
        } = &err
        else {
            panic!("expected write failure, got {err:?}");
        };

        assert_eq!(*table, Table::Menu);
        assert_eq!(committed.get(&Table::Allergen), Some(&1));
        assert_eq!(committed.get(&Table::Food), Some(&1));
        assert_eq!(
            store.write_log(),
            vec![Table::Allergen, Table::Food, Table::Menu]
        );

        let tables = store.tables();
        assert_eq!(tables.foods.len(), 1);
        assert!(tables.menus.is_empty() && tables.food_menus.is_empty());
    }

    #[test]
    fn test_counts() {
        let batch = batch();
        assert!(!batch.is_empty());
        assert_eq!(batch.counts().values().sum::<u64>(), 5);
        assert!(Batch::default().is_empty());
    }
}
