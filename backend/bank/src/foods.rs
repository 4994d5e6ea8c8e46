use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use thiserror::Error;

pub type SurrogateId = i32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown location: {0}")]
    Location(String),

    #[error("Unknown meal type: {0}")]
    MealType(String),
}

/// Dining locations, in the order every run walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Stwest,
    Iv,
    Steast,
}

impl Location {
    pub const ALL: [Location; 3] = [Location::Stwest, Location::Iv, Location::Steast];

    pub fn as_str(self) -> &'static str {
        match self {
            Location::Stwest => "Stwest",
            Location::Iv => "IV",
            Location::Steast => "Steast",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        Location::ALL
            .into_iter()
            .find(|location| location.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseError::Location(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealType {
    pub const ALL: [MealType; 3] = [MealType::Breakfast, MealType::Lunch, MealType::Dinner];

    pub fn as_str(self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        MealType::ALL
            .into_iter()
            .find(|meal| meal.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseError::MealType(s.to_string()))
    }
}

/// Fixed nutrient vocabulary. The column name doubles as the normalized label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nutrient {
    Calories,
    CaloriesFromFat,
    Cholesterol,
    DietaryFiber,
    Protein,
    SaturatedFat,
    Sodium,
    Sugar,
    TotalCarbs,
    TotalFat,
    TransFat,
    VitaminD,
}

impl Nutrient {
    pub const ALL: [Nutrient; 12] = [
        Nutrient::Calories,
        Nutrient::CaloriesFromFat,
        Nutrient::Cholesterol,
        Nutrient::DietaryFiber,
        Nutrient::Protein,
        Nutrient::SaturatedFat,
        Nutrient::Sodium,
        Nutrient::Sugar,
        Nutrient::TotalCarbs,
        Nutrient::TotalFat,
        Nutrient::TransFat,
        Nutrient::VitaminD,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Nutrient::Calories => "calories",
            Nutrient::CaloriesFromFat => "calories_from_fat",
            Nutrient::Cholesterol => "cholesterol",
            Nutrient::DietaryFiber => "dietary_fiber",
            Nutrient::Protein => "protein",
            Nutrient::SaturatedFat => "saturated_fat",
            Nutrient::Sodium => "sodium",
            Nutrient::Sugar => "sugar",
            Nutrient::TotalCarbs => "total_carbs",
            Nutrient::TotalFat => "total_fat",
            Nutrient::TransFat => "trans_fat",
            Nutrient::VitaminD => "vitamin_d",
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        Nutrient::ALL
            .into_iter()
            .find(|nutrient| nutrient.column() == column)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// `None` means the source did not report the nutrient, which is not the same as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Nutrients([Option<f64>; 12]);

impl Nutrients {
    pub fn get(&self, nutrient: Nutrient) -> Option<f64> {
        self.0[nutrient.index()]
    }

    pub fn set(&mut self, nutrient: Nutrient, value: Option<f64>) {
        self.0[nutrient.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Nutrient, Option<f64>)> + '_ {
        Nutrient::ALL
            .into_iter()
            .map(|nutrient| (nutrient, self.get(nutrient)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub id: SurrogateId,
    pub name: String,
    pub serving: String,
    pub description: Option<String>,
    pub nutrients: Nutrients,
    pub vegetarian: bool,
    pub vegan: bool,
    pub balanced: bool,
}

/// Identity half of a food row, all that hydration needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoodName {
    pub id: SurrogateId,
    pub name: String,
}

impl From<&Food> for FoodName {
    fn from(food: &Food) -> Self {
        Self {
            id: food.id,
            name: food.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuKey {
    pub meal: MealType,
    pub location: Location,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Menu {
    pub id: SurrogateId,
    pub meal: MealType,
    pub location: Location,
    pub date: NaiveDate,
}

impl Menu {
    pub fn key(&self) -> MenuKey {
        MenuKey {
            meal: self.meal,
            location: self.location,
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allergen {
    pub id: SurrogateId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FoodOnMenu {
    pub menu_id: SurrogateId,
    pub food_id: SurrogateId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FoodOnAllergen {
    pub food_id: SurrogateId,
    pub allergen_id: SurrogateId,
}
