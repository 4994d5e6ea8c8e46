//! # Postgres
//!
//! Durable store behind the ingestion process.
//!
//! ## Writes
//!
//! - One transaction per table, so a table's rows land together or not at all
//! - Rows are bound as parameters through [`QueryBuilder::push_values`], never spliced into SQL
//! - Postgres caps a statement at 65,535 bind parameters, so a large table is split into
//!   several statements inside the same transaction
//!
//! ## Reads
//!
//! Hydration pulls only identity columns: names, menu keys and link pairs.
use std::ops::Range;

use chrono::NaiveDate;
use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query_builder::Separated,
};
use tracing::{debug, info};

use crate::{
    foods::{Allergen, Food, FoodName, FoodOnAllergen, FoodOnMenu, Menu, Nutrient, SurrogateId},
    store::{Snapshot, Store, StoreError, Table},
};

const BIND_LIMIT: usize = 65_535;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS food (
    food_id INTEGER PRIMARY KEY,
    food_name TEXT NOT NULL UNIQUE,
    serving TEXT NOT NULL DEFAULT '',
    description TEXT,
    calories DOUBLE PRECISION,
    calories_from_fat DOUBLE PRECISION,
    cholesterol DOUBLE PRECISION,
    dietary_fiber DOUBLE PRECISION,
    protein DOUBLE PRECISION,
    saturated_fat DOUBLE PRECISION,
    sodium DOUBLE PRECISION,
    sugar DOUBLE PRECISION,
    total_carbs DOUBLE PRECISION,
    total_fat DOUBLE PRECISION,
    trans_fat DOUBLE PRECISION,
    vitamin_d DOUBLE PRECISION,
    vegetarian BOOLEAN NOT NULL,
    vegan BOOLEAN NOT NULL,
    balanced BOOLEAN NOT NULL
);

CREATE TABLE IF NOT EXISTS menu (
    menu_id INTEGER PRIMARY KEY,
    meal_type TEXT NOT NULL CHECK (meal_type IN ('breakfast', 'lunch', 'dinner')),
    location TEXT NOT NULL CHECK (location IN ('Stwest', 'IV', 'Steast')),
    menu_date DATE NOT NULL,
    UNIQUE (meal_type, location, menu_date)
);

CREATE TABLE IF NOT EXISTS allergen (
    allergen_id INTEGER PRIMARY KEY,
    allergen_name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS food_on_menu (
    menu_id INTEGER NOT NULL REFERENCES menu (menu_id),
    food_id INTEGER NOT NULL REFERENCES food (food_id),
    PRIMARY KEY (menu_id, food_id)
);

CREATE TABLE IF NOT EXISTS food_on_allergen (
    food_id INTEGER NOT NULL REFERENCES food (food_id),
    allergen_id INTEGER NOT NULL REFERENCES allergen (allergen_id),
    PRIMARY KEY (food_id, allergen_id)
);
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("Schema up to date");

        Ok(())
    }

    async fn insert_rows<'r, T>(
        &self,
        table: Table,
        columns: &[&str],
        rows: &'r [T],
        mut bind_row: impl FnMut(Separated<'_, 'r, Postgres, &'static str>, &'r T),
    ) -> Result<u64, StoreError> {
        let prefix = format!("INSERT INTO {} ({}) ", table.name(), columns.join(", "));

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for range in plan_statements(rows.len(), columns.len()) {
            let mut builder: QueryBuilder<'r, Postgres> = QueryBuilder::new(prefix.as_str());
            builder.push_values(&rows[range], |separated, row| bind_row(separated, row));

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(%table, inserted, "Committed");

        Ok(inserted)
    }
}

/// Splits `rows` rows of `columns` binds each into statements that stay under [`BIND_LIMIT`].
fn plan_statements(rows: usize, columns: usize) -> Vec<Range<usize>> {
    let rows_per_statement = (BIND_LIMIT / columns.max(1)).max(1);

    (0..rows)
        .step_by(rows_per_statement)
        .map(|start| start..(start + rows_per_statement).min(rows))
        .collect()
}

fn food_columns() -> Vec<&'static str> {
    let mut columns = vec!["food_id", "food_name", "serving", "description"];
    columns.extend(Nutrient::ALL.into_iter().map(Nutrient::column));
    columns.extend(["vegetarian", "vegan", "balanced"]);

    columns
}

impl Store for PgStore {
    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let foods = sqlx::query_as::<_, (SurrogateId, String)>(
            "SELECT food_id, food_name FROM food ORDER BY food_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, name)| FoodName { id, name })
        .collect();

        let menus = sqlx::query_as::<_, (SurrogateId, String, String, NaiveDate)>(
            "SELECT menu_id, meal_type, location, menu_date FROM menu ORDER BY menu_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, meal, location, date)| {
            let corrupt = |reason: String| StoreError::CorruptRow {
                table: Table::Menu,
                reason: format!("menu {id}: {reason}"),
            };

            Ok(Menu {
                id,
                meal: meal.parse().map_err(|e| corrupt(format!("{e}")))?,
                location: location.parse().map_err(|e| corrupt(format!("{e}")))?,
                date,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let allergens = sqlx::query_as::<_, (SurrogateId, String)>(
            "SELECT allergen_id, allergen_name FROM allergen ORDER BY allergen_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, name)| Allergen { id, name })
        .collect();

        let food_menus = sqlx::query_as::<_, (SurrogateId, SurrogateId)>(
            "SELECT menu_id, food_id FROM food_on_menu",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(menu_id, food_id)| FoodOnMenu { menu_id, food_id })
        .collect();

        let food_allergens = sqlx::query_as::<_, (SurrogateId, SurrogateId)>(
            "SELECT food_id, allergen_id FROM food_on_allergen",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(food_id, allergen_id)| FoodOnAllergen {
            food_id,
            allergen_id,
        })
        .collect();

        Ok(Snapshot {
            foods,
            menus,
            allergens,
            food_menus,
            food_allergens,
        })
    }

    async fn insert_allergens(&self, rows: &[Allergen]) -> Result<u64, StoreError> {
        self.insert_rows(
            Table::Allergen,
            &["allergen_id", "allergen_name"],
            rows,
            |mut b, allergen| {
                b.push_bind(allergen.id).push_bind(allergen.name.as_str());
            },
        )
        .await
    }

    async fn insert_foods(&self, rows: &[Food]) -> Result<u64, StoreError> {
        self.insert_rows(Table::Food, &food_columns(), rows, |mut b, food| {
            b.push_bind(food.id)
                .push_bind(food.name.as_str())
                .push_bind(food.serving.as_str())
                .push_bind(food.description.as_deref());

            for (_, value) in food.nutrients.iter() {
                b.push_bind(value);
            }

            b.push_bind(food.vegetarian)
                .push_bind(food.vegan)
                .push_bind(food.balanced);
        })
        .await
    }

    async fn insert_menus(&self, rows: &[Menu]) -> Result<u64, StoreError> {
        self.insert_rows(
            Table::Menu,
            &["menu_id", "meal_type", "location", "menu_date"],
            rows,
            |mut b, menu| {
                b.push_bind(menu.id)
                    .push_bind(menu.meal.as_str())
                    .push_bind(menu.location.as_str())
                    .push_bind(menu.date);
            },
        )
        .await
    }

    async fn insert_food_allergens(&self, rows: &[FoodOnAllergen]) -> Result<u64, StoreError> {
        self.insert_rows(
            Table::FoodOnAllergen,
            &["food_id", "allergen_id"],
            rows,
            |mut b, link| {
                b.push_bind(link.food_id).push_bind(link.allergen_id);
            },
        )
        .await
    }

    async fn insert_food_menus(&self, rows: &[FoodOnMenu]) -> Result<u64, StoreError> {
        self.insert_rows(
            Table::FoodOnMenu,
            &["menu_id", "food_id"],
            rows,
            |mut b, link| {
                b.push_bind(link.menu_id).push_bind(link.food_id);
            },
        )
        .await
    }
}
