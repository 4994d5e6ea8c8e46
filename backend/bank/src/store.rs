use std::{collections::BTreeMap, fmt};

use thiserror::Error;

use crate::foods::{Allergen, Food, FoodName, FoodOnAllergen, FoodOnMenu, Menu};

/// Tables in flush order: parents before the links that reference them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Allergen,
    Food,
    Menu,
    FoodOnAllergen,
    FoodOnMenu,
}

impl Table {
    pub const WRITE_ORDER: [Table; 5] = [
        Table::Allergen,
        Table::Food,
        Table::Menu,
        Table::FoodOnAllergen,
        Table::FoodOnMenu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Allergen => "allergen",
            Table::Food => "food",
            Table::Menu => "menu",
            Table::FoodOnAllergen => "food_on_allergen",
            Table::FoodOnMenu => "food_on_menu",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type TableCounts = BTreeMap<Table, u64>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: Table, reason: String },

    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey { table: Table, key: String },

    #[error("Row in {table} references missing parent: {key}")]
    MissingParent { table: Table, key: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Full dump of every table's identity columns.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub foods: Vec<FoodName>,
    pub menus: Vec<Menu>,
    pub allergens: Vec<Allergen>,
    pub food_menus: Vec<FoodOnMenu>,
    pub food_allergens: Vec<FoodOnAllergen>,
}

/// Read and append access to the five menu tables.
///
/// Each insert call is one atomic unit: either every row lands or none do. Nothing spans
/// calls, so a failure on one table leaves previously inserted tables committed.
#[allow(async_fn_in_trait)]
pub trait Store {
    async fn snapshot(&self) -> Result<Snapshot, StoreError>;

    async fn insert_allergens(&self, rows: &[Allergen]) -> Result<u64, StoreError>;

    async fn insert_foods(&self, rows: &[Food]) -> Result<u64, StoreError>;

    async fn insert_menus(&self, rows: &[Menu]) -> Result<u64, StoreError>;

    async fn insert_food_allergens(&self, rows: &[FoodOnAllergen]) -> Result<u64, StoreError>;

    async fn insert_food_menus(&self, rows: &[FoodOnMenu]) -> Result<u64, StoreError>;
}
