//! # Source Feed
//!
//! Raw menu records for one location on one day. The feed knows nothing about what is already
//! stored; every item it sees is reported, repeats included.
use std::time::Duration;

use bank::{Location, MealType, Nutrient};
use chrono::NaiveDate;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::{
    models::{ALLERGEN_FILTER, Response, SUCCESS, location_id, value_text},
    utils::{clean_nutrient_name, format},
};

const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed unavailable for {location} on {date}: {reason}")]
    Unavailable {
        location: Location,
        date: NaiveDate,
        reason: String,
    },

    #[error("No menu published for {location} on {date}")]
    NoData { location: Location, date: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeKind {
    Allergen,
    Dietary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub name: String,
    pub kind: BadgeKind,
}

impl Badge {
    pub fn allergen(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: BadgeKind::Allergen,
        }
    }

    pub fn dietary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: BadgeKind::Dietary,
        }
    }
}

/// One observed menu item, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub location: Location,
    pub date: NaiveDate,
    pub meal: MealType,
    pub name: String,
    pub description: Option<String>,
    pub serving: String,
    /// Source label paired with its raw text value.
    pub nutrients: Vec<(String, String)>,
    pub badges: Vec<Badge>,
}

#[allow(async_fn_in_trait)]
pub trait Feed {
    async fn fetch(&self, location: Location, date: NaiveDate) -> Result<Vec<RawItem>, FeedError>;
}

/// JSON menu API behind the campus dining site.
pub struct DineOnCampusFeed {
    client: Client,
    base_url: String,
    site_id: String,
}

impl DineOnCampusFeed {
    pub fn new(base_url: &str, site_id: &str) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            site_id: site_id.to_string(),
        })
    }
}

impl Feed for DineOnCampusFeed {
    async fn fetch(&self, location: Location, date: NaiveDate) -> Result<Vec<RawItem>, FeedError> {
        let unavailable = |e: reqwest::Error| FeedError::Unavailable {
            location,
            date,
            reason: e.to_string(),
        };

        let res = self
            .client
            .get(format!("{}/location/menu", self.base_url))
            .query(&[
                ("site_id", self.site_id.as_str()),
                ("platform", "0"),
                ("location_id", location_id(location)),
                ("date", format(date).as_str()),
            ])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(unavailable)?;

        debug!(%location, %date, status = %res.status(), "Feed responded");

        let response: Response = res.json().await.map_err(unavailable)?;

        items_from_response(response, location, date)
    }
}

pub fn items_from_response(
    response: Response,
    location: Location,
    date: NaiveDate,
) -> Result<Vec<RawItem>, FeedError> {
    let menu = match response.menu {
        Some(menu) if response.status == SUCCESS => menu,
        _ => return Err(FeedError::NoData { location, date }),
    };

    let mut items = Vec::new();

    for period in menu.periods {
        let Ok(meal) = period.name.parse::<MealType>() else {
            debug!(%location, %date, period = %period.name, "Skipping period");
            continue;
        };

        for category in period.categories {
            for item in category.items {
                let mut nutrients: Vec<(String, String)> = item
                    .nutrients
                    .iter()
                    .map(|n| (n.name.clone(), value_text(&n.value)))
                    .collect();

                // Item-level calories only fill in for a missing label, and go first so any
                // labelled value still wins.
                if !nutrients
                    .iter()
                    .any(|(name, _)| clean_nutrient_name(name) == Some(Nutrient::Calories))
                {
                    nutrients.insert(0, ("Calories".to_string(), value_text(&item.calories)));
                }

                let badges = item
                    .filters
                    .into_iter()
                    .map(|filter| Badge {
                        kind: if filter.kind == ALLERGEN_FILTER {
                            BadgeKind::Allergen
                        } else {
                            BadgeKind::Dietary
                        },
                        name: filter.name,
                    })
                    .collect();

                items.push(RawItem {
                    location,
                    date,
                    meal,
                    name: item.name,
                    description: item.desc,
                    serving: item.portion.unwrap_or_default(),
                    nutrients,
                    badges,
                });
            }
        }
    }

    Ok(items)
}
