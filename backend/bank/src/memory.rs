//! In-memory store with the same constraints as the Postgres schema: unique natural keys,
//! unique primary keys and link rows that must reference existing parents.
use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    foods::{Allergen, Food, FoodName, FoodOnAllergen, FoodOnMenu, Menu},
    store::{Snapshot, Store, StoreError, Table},
};

#[derive(Debug, Default, Clone)]
pub struct Tables {
    pub foods: Vec<Food>,
    pub menus: Vec<Menu>,
    pub allergens: Vec<Allergen>,
    pub food_menus: Vec<FoodOnMenu>,
    pub food_allergens: Vec<FoodOnAllergen>,
}

#[derive(Debug, Default)]
struct Faults {
    snapshot: bool,
    tables: HashSet<Table>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    writes: Mutex<Vec<Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
            ..Self::default()
        }
    }

    /// Makes the next snapshots fail until cleared.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_snapshot(&self, fail: bool) {
        lock(&self.faults).snapshot = fail;
    }

    /// Makes every insert into `table` fail until cleared.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_writes_to(&self, table: Table, fail: bool) {
        let mut faults = lock(&self.faults);

        if fail {
            faults.tables.insert(table);
        } else {
            faults.tables.remove(&table);
        }
    }

    pub fn tables(&self) -> Tables {
        lock(&self.tables).clone()
    }

    /// Tables in the order insert statements reached the store, failed ones included.
    #[cfg(any(test, feature = "testing"))]
    pub fn write_log(&self) -> Vec<Table> {
        lock(&self.writes).clone()
    }

    fn begin(&self, table: Table) -> Result<MutexGuard<'_, Tables>, StoreError> {
        lock(&self.writes).push(table);

        if lock(&self.faults).tables.contains(&table) {
            return Err(StoreError::Unavailable(format!("writes to {table} rejected")));
        }

        Ok(lock(&self.tables))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn duplicate(table: Table, key: impl ToString) -> StoreError {
    StoreError::DuplicateKey {
        table,
        key: key.to_string(),
    }
}

fn orphan(table: Table, key: impl ToString) -> StoreError {
    StoreError::MissingParent {
        table,
        key: key.to_string(),
    }
}

/// Rejects the batch if any id or natural key collides with a stored row or another batch row.
fn check_unique<T, K, I>(
    table: Table,
    existing: &[T],
    rows: &[T],
    id: impl Fn(&T) -> I,
    key: impl Fn(&T) -> K,
) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq + std::fmt::Debug,
    I: std::hash::Hash + Eq + std::fmt::Debug,
{
    let mut ids: HashSet<I> = existing.iter().map(&id).collect();
    let mut keys: HashSet<K> = existing.iter().map(&key).collect();

    for row in rows {
        let row_id = id(row);
        if !ids.insert(row_id) {
            return Err(duplicate(table, format!("{:?}", id(row))));
        }

        let row_key = key(row);
        if !keys.insert(row_key) {
            return Err(duplicate(table, format!("{:?}", key(row))));
        }
    }

    Ok(())
}

impl Store for MemoryStore {
    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        if lock(&self.faults).snapshot {
            return Err(StoreError::Unavailable("snapshot rejected".to_string()));
        }

        let tables = lock(&self.tables);

        Ok(Snapshot {
            foods: tables.foods.iter().map(FoodName::from).collect(),
            menus: tables.menus.clone(),
            allergens: tables.allergens.clone(),
            food_menus: tables.food_menus.clone(),
            food_allergens: tables.food_allergens.clone(),
        })
    }

    async fn insert_allergens(&self, rows: &[Allergen]) -> Result<u64, StoreError> {
        let mut tables = self.begin(Table::Allergen)?;

        check_unique(
            Table::Allergen,
            &tables.allergens,
            rows,
            |a| a.id,
            |a| a.name.clone(),
        )?;
        tables.allergens.extend_from_slice(rows);

        Ok(rows.len() as u64)
    }

    async fn insert_foods(&self, rows: &[Food]) -> Result<u64, StoreError> {
        let mut tables = self.begin(Table::Food)?;

        check_unique(Table::Food, &tables.foods, rows, |f| f.id, |f| f.name.clone())?;
        tables.foods.extend_from_slice(rows);

        Ok(rows.len() as u64)
    }

    async fn insert_menus(&self, rows: &[Menu]) -> Result<u64, StoreError> {
        let mut tables = self.begin(Table::Menu)?;

        check_unique(Table::Menu, &tables.menus, rows, |m| m.id, Menu::key)?;
        tables.menus.extend_from_slice(rows);

        Ok(rows.len() as u64)
    }

    async fn insert_food_allergens(&self, rows: &[FoodOnAllergen]) -> Result<u64, StoreError> {
        let mut tables = self.begin(Table::FoodOnAllergen)?;

        let foods: HashSet<_> = tables.foods.iter().map(|f| f.id).collect();
        let allergens: HashSet<_> = tables.allergens.iter().map(|a| a.id).collect();
        if let Some(link) = rows
            .iter()
            .find(|l| !foods.contains(&l.food_id) || !allergens.contains(&l.allergen_id))
        {
            return Err(orphan(Table::FoodOnAllergen, format!("{link:?}")));
        }

        check_unique(Table::FoodOnAllergen, &tables.food_allergens, rows, |l| *l, |l| *l)?;
        tables.food_allergens.extend_from_slice(rows);

        Ok(rows.len() as u64)
    }

    async fn insert_food_menus(&self, rows: &[FoodOnMenu]) -> Result<u64, StoreError> {
        let mut tables = self.begin(Table::FoodOnMenu)?;

        let foods: HashSet<_> = tables.foods.iter().map(|f| f.id).collect();
        let menus: HashSet<_> = tables.menus.iter().map(|m| m.id).collect();
        if let Some(link) = rows
            .iter()
            .find(|l| !foods.contains(&l.food_id) || !menus.contains(&l.menu_id))
        {
            return Err(orphan(Table::FoodOnMenu, format!("{link:?}")));
        }

        check_unique(Table::FoodOnMenu, &tables.food_menus, rows, |l| *l, |l| *l)?;
        tables.food_menus.extend_from_slice(rows);

        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::foods::{Location, MealType};

    fn menu(id: i32, day: u32) -> Menu {
        Menu {
            id,
            meal: MealType::Lunch,
            location: Location::Iv,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_rejects_duplicate_natural_key() {
        let store = MemoryStore::new();
        store.insert_menus(&[menu(1, 1)]).await.unwrap();

        let err = store.insert_menus(&[menu(2, 1)]).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { table: Table::Menu, .. }));
        assert_eq!(store.tables().menus.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = MemoryStore::new();

        let err = store
            .insert_menus(&[menu(1, 1), menu(2, 2), menu(1, 3)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert!(store.tables().menus.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_orphan_link() {
        let store = MemoryStore::new();
        store.insert_menus(&[menu(1, 1)]).await.unwrap();

        let err = store
            .insert_food_menus(&[FoodOnMenu {
                menu_id: 1,
                food_id: 7,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingParent { .. }));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new();
        store.fail_snapshot(true);
        assert!(store.snapshot().await.is_err());

        store.fail_snapshot(false);
        store.fail_writes_to(Table::Menu, true);
        assert!(store.insert_menus(&[menu(1, 1)]).await.is_err());
        assert_eq!(store.write_log(), vec![Table::Menu]);

        store.fail_writes_to(Table::Menu, false);
        assert_eq!(store.insert_menus(&[menu(1, 1)]).await.unwrap(), 1);
        assert_eq!(store.snapshot().await.unwrap().menus, vec![menu(1, 1)]);
    }
}
