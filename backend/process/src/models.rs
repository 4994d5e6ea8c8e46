use bank::Location;
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.dineoncampus.com/v1";

pub const SITE_ID: &str = "5751fd2b90975b60e048929a";

pub const SUCCESS: &str = "success";

pub const ALLERGEN_FILTER: &str = "allergen";

pub fn location_id(location: Location) -> &'static str {
    match location {
        Location::Stwest => "5b9bd1c41178e90d4774210e",
        Location::Iv => "586d17503191a27120e60dec",
        Location::Steast => "586d05e4ee596f6e6c04b527",
    }
}

#[derive(Deserialize)]
pub struct Response {
    pub status: String,
    #[serde(default)]
    pub menu: Option<MenuBody>,
}

#[derive(Deserialize)]
pub struct MenuBody {
    #[serde(default)]
    pub periods: Vec<Period>,
}

#[derive(Deserialize)]
pub struct Period {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Deserialize)]
pub struct Category {
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub calories: Value,
    #[serde(default)]
    pub portion: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub nutrients: Vec<Nutrient>,
}

#[derive(Deserialize)]
pub struct Filter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Deserialize)]
pub struct Nutrient {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// Nutrient values come back as strings, numbers or null depending on the item.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
