//! # Bank
//!
//! Relational model of everything scraped from the dining-hall menus.
//!
//! ## Tables
//!
//! - `food`: one row per unique food name, nutrients and dietary flags frozen at creation
//! - `menu`: one row per (meal type, location, date)
//! - `food_on_menu`: which foods were served on which menu
//! - `allergen`: one row per unique allergen name
//! - `food_on_allergen`: which allergens a food carries
//!
//! Every table is append only. Surrogate ids are minted by the ingestion process, never by the
//! database, so the process must be the only writer.
//!
//! ## Stores
//!
//! - [`postgres::PgStore`]: the durable store, parameterized bulk inserts through `sqlx`
//! - [`memory::MemoryStore`]: same contract held in RAM for tests. The `testing` feature exposes
//!   its fault injection and write log to other crates
pub mod foods;
pub mod memory;
pub mod postgres;
pub mod store;

pub use foods::{
    Allergen, Food, FoodName, FoodOnAllergen, FoodOnMenu, Location, MealType, Menu, MenuKey,
    Nutrient, Nutrients, SurrogateId,
};
pub use store::{Snapshot, Store, StoreError, Table, TableCounts};
