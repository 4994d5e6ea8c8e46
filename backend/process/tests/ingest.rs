use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use bank::{
    Allergen, Food, FoodOnAllergen, FoodOnMenu, Location, MealType, Nutrient, Nutrients, Table,
    memory::{MemoryStore, Tables},
};
use chrono::NaiveDate;
use process::{
    PairStatus, RunOptions,
    error::IngestError,
    feed::{Badge, Feed, FeedError, RawItem},
    ingest,
    utils::DateWindow,
};

enum Script {
    Items(Vec<RawItem>),
    NoData,
    /// Fails this many times, then serves the items.
    Flaky(u32, Vec<RawItem>),
}

#[derive(Default)]
struct ScriptedFeed {
    scripts: HashMap<(Location, NaiveDate), Script>,
    calls: Mutex<Vec<(Location, NaiveDate)>>,
}

impl ScriptedFeed {
    fn with(mut self, location: Location, date: NaiveDate, script: Script) -> Self {
        self.scripts.insert((location, date), script);
        self
    }

    fn calls(&self) -> Vec<(Location, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Feed for ScriptedFeed {
    async fn fetch(&self, location: Location, date: NaiveDate) -> Result<Vec<RawItem>, FeedError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((location, date));
        let attempt = calls.iter().filter(|c| **c == (location, date)).count() as u32;

        match self.scripts.get(&(location, date)) {
            Some(Script::Items(items)) => Ok(items.clone()),
            Some(Script::Flaky(failures, items)) if attempt > *failures => Ok(items.clone()),
            Some(Script::Flaky(..)) => Err(FeedError::Unavailable {
                location,
                date,
                reason: "connection reset".to_string(),
            }),
            Some(Script::NoData) | None => Err(FeedError::NoData { location, date }),
        }
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn item(location: Location, date: NaiveDate, meal: MealType, name: &str) -> RawItem {
    RawItem {
        location,
        date,
        meal,
        name: name.to_string(),
        description: None,
        serving: "1 bowl".to_string(),
        nutrients: vec![("Calories".to_string(), "150 cal".to_string())],
        badges: vec![],
    }
}

fn oatmeal(date: NaiveDate) -> RawItem {
    item(Location::Iv, date, MealType::Breakfast, "Oatmeal")
}

fn options() -> RunOptions {
    RunOptions {
        retries: 2,
        retry_delay: Duration::ZERO,
        dry_run: false,
        progress: false,
    }
}

fn window(start: u32, end: u32) -> DateWindow {
    DateWindow::new(day(start), day(end)).unwrap()
}

fn assert_no_duplicates(tables: &Tables) {
    let foods: HashSet<_> = tables.foods.iter().map(|f| f.name.clone()).collect();
    assert_eq!(foods.len(), tables.foods.len());

    let menus: HashSet<_> = tables.menus.iter().map(|m| m.key()).collect();
    assert_eq!(menus.len(), tables.menus.len());

    let allergens: HashSet<_> = tables.allergens.iter().map(|a| a.name.clone()).collect();
    assert_eq!(allergens.len(), tables.allergens.len());

    let food_menus: HashSet<_> = tables.food_menus.iter().collect();
    assert_eq!(food_menus.len(), tables.food_menus.len());

    let food_allergens: HashSet<_> = tables.food_allergens.iter().collect();
    assert_eq!(food_allergens.len(), tables.food_allergens.len());
}

#[tokio::test]
async fn scenario_new_food_on_empty_store() {
    let feed = ScriptedFeed::default().with(
        Location::Iv,
        day(1),
        Script::Items(vec![oatmeal(day(1))]),
    );
    let store = MemoryStore::new();

    let report = ingest(&feed, &store, &[Location::Iv], window(1, 1), &options())
        .await
        .unwrap();

    let tables = store.tables();
    assert_eq!(tables.menus.len(), 1);
    assert_eq!(tables.menus[0].id, 1);
    assert_eq!(tables.menus[0].meal, MealType::Breakfast);

    assert_eq!(tables.foods.len(), 1);
    let food = &tables.foods[0];
    assert_eq!((food.id, food.name.as_str()), (1, "Oatmeal"));
    assert_eq!(food.nutrients.get(Nutrient::Calories), Some(150.0));
    assert!(!food.vegetarian && !food.vegan && !food.balanced);

    assert_eq!(
        tables.food_menus,
        vec![FoodOnMenu {
            menu_id: 1,
            food_id: 1
        }]
    );
    assert!(tables.allergens.is_empty() && tables.food_allergens.is_empty());
    assert_eq!(report.flushed.unwrap().values().sum::<u64>(), 3);
}

#[tokio::test]
async fn scenario_known_food_on_new_menu() {
    let store = MemoryStore::with_tables(Tables {
        foods: vec![Food {
            id: 1,
            name: "Oatmeal".to_string(),
            serving: "1 bowl".to_string(),
            description: None,
            nutrients: Nutrients::default(),
            vegetarian: false,
            vegan: false,
            balanced: false,
        }],
        ..Tables::default()
    });
    let feed = ScriptedFeed::default().with(
        Location::Iv,
        day(2),
        Script::Items(vec![oatmeal(day(2))]),
    );

    let report = ingest(&feed, &store, &[Location::Iv], window(2, 2), &options())
        .await
        .unwrap();

    let flushed = report.flushed.unwrap();
    assert_eq!(flushed.get(&Table::Food), None);
    assert_eq!(flushed.get(&Table::Menu), Some(&1));
    assert_eq!(flushed.get(&Table::FoodOnMenu), Some(&1));

    let tables = store.tables();
    assert_eq!(tables.foods.len(), 1);
    assert_eq!(
        tables.food_menus,
        vec![FoodOnMenu {
            menu_id: tables.menus[0].id,
            food_id: 1
        }]
    );
}

#[tokio::test]
async fn scenario_vegan_food_with_allergen() {
    let store = MemoryStore::with_tables(Tables {
        allergens: vec![Allergen {
            id: 4,
            name: "Milk".to_string(),
        }],
        ..Tables::default()
    });

    let mut tofu = item(Location::Stwest, day(1), MealType::Dinner, "Tofu Stir Fry");
    tofu.badges = vec![Badge::dietary("Vegan"), Badge::allergen("Soy*")];
    let feed = ScriptedFeed::default().with(Location::Stwest, day(1), Script::Items(vec![tofu]));

    ingest(&feed, &store, &[Location::Stwest], window(1, 1), &options())
        .await
        .unwrap();

    let tables = store.tables();
    let soy = tables.allergens.iter().find(|a| a.name == "Soy").unwrap();
    assert_eq!(soy.id, 5);

    let food = &tables.foods[0];
    assert!(food.vegan && !food.vegetarian && !food.balanced);
    assert_eq!(
        tables.food_allergens,
        vec![FoodOnAllergen {
            food_id: food.id,
            allergen_id: 5
        }]
    );
}

#[tokio::test]
async fn scenario_duplicate_record_in_one_run() {
    let feed = ScriptedFeed::default().with(
        Location::Iv,
        day(1),
        Script::Items(vec![oatmeal(day(1)), oatmeal(day(1))]),
    );
    let store = MemoryStore::new();

    ingest(&feed, &store, &[Location::Iv], window(1, 1), &options())
        .await
        .unwrap();

    let tables = store.tables();
    assert_eq!(tables.foods.len(), 1);
    assert_eq!(tables.food_menus.len(), 1);
}

#[tokio::test]
async fn second_run_writes_nothing() {
    let mut lunch = item(Location::Steast, day(2), MealType::Lunch, "Grilled Cheese");
    lunch.badges = vec![
        Badge::dietary("Vegetarian"),
        Badge::allergen("Milk"),
        Badge::allergen("Wheat"),
    ];

    let feed = ScriptedFeed::default()
        .with(Location::Iv, day(1), Script::Items(vec![oatmeal(day(1))]))
        .with(Location::Iv, day(2), Script::Items(vec![oatmeal(day(2))]))
        .with(Location::Steast, day(2), Script::Items(vec![lunch]));
    let store = MemoryStore::new();

    let first = ingest(&feed, &store, &Location::ALL, window(1, 2), &options())
        .await
        .unwrap();
    assert!(first.pending_rows() > 0);
    let after_first = store.tables();
    let writes_after_first = store.write_log().len();

    let second = ingest(&feed, &store, &Location::ALL, window(1, 2), &options())
        .await
        .unwrap();

    assert_eq!(second.pending_rows(), 0);
    assert!(second.flushed.unwrap().is_empty());
    assert_eq!(store.write_log().len(), writes_after_first);

    let after_second = store.tables();
    assert_eq!(after_second.foods, after_first.foods);
    assert_eq!(after_second.menus, after_first.menus);
    assert_eq!(after_second.food_menus, after_first.food_menus);
    assert_eq!(after_second.food_allergens, after_first.food_allergens);
    assert_no_duplicates(&after_second);
}

#[tokio::test]
async fn overlapping_windows_never_duplicate() {
    let feed = ScriptedFeed::default()
        .with(Location::Iv, day(1), Script::Items(vec![oatmeal(day(1))]))
        .with(Location::Iv, day(2), Script::Items(vec![oatmeal(day(2))]))
        .with(Location::Iv, day(3), Script::Items(vec![oatmeal(day(3))]));
    let store = MemoryStore::new();

    ingest(&feed, &store, &[Location::Iv], window(1, 2), &options())
        .await
        .unwrap();
    ingest(&feed, &store, &[Location::Iv], window(2, 3), &options())
        .await
        .unwrap();

    let tables = store.tables();
    assert_no_duplicates(&tables);
    assert_eq!(tables.foods.len(), 1);
    assert_eq!(tables.menus.len(), 3);
    assert_eq!(tables.food_menus.len(), 3);

    let ids: Vec<_> = tables.menus.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn known_food_is_never_rewritten() {
    let feed = ScriptedFeed::default().with(
        Location::Iv,
        day(1),
        Script::Items(vec![oatmeal(day(1))]),
    );
    let store = MemoryStore::new();
    ingest(&feed, &store, &[Location::Iv], window(1, 1), &options())
        .await
        .unwrap();

    let mut changed = oatmeal(day(5));
    changed.nutrients = vec![("Calories".to_string(), "999".to_string())];
    changed.badges = vec![Badge::dietary("Vegan"), Badge::allergen("Oats")];
    let feed = ScriptedFeed::default().with(Location::Iv, day(5), Script::Items(vec![changed]));
    ingest(&feed, &store, &[Location::Iv], window(5, 5), &options())
        .await
        .unwrap();

    let tables = store.tables();
    assert_eq!(tables.foods.len(), 1);
    assert_eq!(tables.foods[0].nutrients.get(Nutrient::Calories), Some(150.0));
    assert!(!tables.foods[0].vegan);
    assert!(tables.food_allergens.is_empty());
}

#[tokio::test]
async fn walks_days_then_locations_in_order() {
    let feed = ScriptedFeed::default();
    let store = MemoryStore::new();

    let report = ingest(
        &feed,
        &store,
        &[Location::Steast, Location::Stwest, Location::Iv, Location::Steast],
        window(1, 2),
        &options(),
    )
    .await
    .unwrap();

    let expected = vec![
        (Location::Stwest, day(1)),
        (Location::Iv, day(1)),
        (Location::Steast, day(1)),
        (Location::Stwest, day(2)),
        (Location::Iv, day(2)),
        (Location::Steast, day(2)),
    ];
    assert_eq!(feed.calls(), expected);
    assert!(report.pairs.iter().all(|p| p.status == PairStatus::NoData));
    assert!(store.write_log().is_empty());
}

#[tokio::test]
async fn unavailable_pair_is_retried_then_skipped() {
    let feed = ScriptedFeed::default()
        .with(Location::Iv, day(1), Script::Flaky(2, vec![oatmeal(day(1))]))
        .with(Location::Iv, day(2), Script::Flaky(10, vec![oatmeal(day(2))]))
        .with(Location::Iv, day(3), Script::NoData);
    let store = MemoryStore::new();

    let report = ingest(&feed, &store, &[Location::Iv], window(1, 3), &options())
        .await
        .unwrap();

    assert_eq!(report.pairs[0].status, PairStatus::Fetched { records: 1 });
    assert!(matches!(
        report.pairs[1].status,
        PairStatus::Unavailable { attempts: 3, .. }
    ));
    assert_eq!(report.pairs[2].status, PairStatus::NoData);
    assert_eq!(report.unavailable().count(), 1);

    let tables = store.tables();
    assert_eq!(tables.menus.len(), 1);
    assert_eq!(tables.menus[0].date, day(1));
}

#[tokio::test]
async fn cache_load_failure_aborts_before_fetching() {
    let feed = ScriptedFeed::default().with(
        Location::Iv,
        day(1),
        Script::Items(vec![oatmeal(day(1))]),
    );
    let store = MemoryStore::new();
    store.fail_snapshot(true);

    let err = ingest(&feed, &store, &[Location::Iv], window(1, 1), &options())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::CacheLoad(_)));
    assert!(feed.calls().is_empty());
    assert!(store.write_log().is_empty());
}

#[tokio::test]
async fn write_failure_reports_table() {
    let feed = ScriptedFeed::default().with(
        Location::Iv,
        day(1),
        Script::Items(vec![oatmeal(day(1))]),
    );
    let store = MemoryStore::new();
    store.fail_writes_to(Table::FoodOnMenu, true);

    let err = ingest(&feed, &store, &[Location::Iv], window(1, 1), &options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Write {
            table: Table::FoodOnMenu,
            ..
        }
    ));

    let tables = store.tables();
    assert_eq!(tables.foods.len(), 1);
    assert_eq!(tables.menus.len(), 1);
    assert!(tables.food_menus.is_empty());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let feed = ScriptedFeed::default().with(
        Location::Iv,
        day(1),
        Script::Items(vec![oatmeal(day(1))]),
    );
    let store = MemoryStore::new();

    let report = ingest(
        &feed,
        &store,
        &[Location::Iv],
        window(1, 1),
        &RunOptions {
            dry_run: true,
            ..options()
        },
    )
    .await
    .unwrap();

    assert_eq!(report.pending_rows(), 3);
    assert!(report.flushed.is_none());
    assert!(store.write_log().is_empty());
}

#[tokio::test]
async fn links_never_orphaned() {
    let mut pasta = item(Location::Stwest, day(1), MealType::Dinner, "Pasta");
    pasta.badges = vec![Badge::allergen("Wheat"), Badge::allergen("Egg")];
    let mut salad = item(Location::Stwest, day(1), MealType::Lunch, "Salad");
    salad.badges = vec![Badge::dietary("Vegan"), Badge::allergen("Egg")];

    let feed = ScriptedFeed::default()
        .with(Location::Stwest, day(1), Script::Items(vec![pasta, salad]))
        .with(Location::Iv, day(2), Script::Items(vec![oatmeal(day(2))]));
    let store = MemoryStore::new();

    ingest(&feed, &store, &Location::ALL, window(1, 2), &options())
        .await
        .unwrap();

    let tables = store.tables();
    let foods: HashSet<_> = tables.foods.iter().map(|f| f.id).collect();
    let menus: HashSet<_> = tables.menus.iter().map(|m| m.id).collect();
    let allergens: HashSet<_> = tables.allergens.iter().map(|a| a.id).collect();

    assert!(tables
        .food_menus
        .iter()
        .all(|l| foods.contains(&l.food_id) && menus.contains(&l.menu_id)));
    assert!(tables
        .food_allergens
        .iter()
        .all(|l| foods.contains(&l.food_id) && allergens.contains(&l.allergen_id)));
    assert_eq!(tables.allergens.len(), 2);
    assert_eq!(tables.food_allergens.len(), 3);
    assert_no_duplicates(&tables);
}
