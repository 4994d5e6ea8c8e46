use std::sync::LazyLock;

use bank::Nutrient;
use chrono::{Days, Local, NaiveDate};
use regex::Regex;

use crate::error::IngestError;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn format(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Natural key of a food: trimmed, inner whitespace collapsed, case kept for display.
pub fn sanitize(input: &str) -> String {
    WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

/// Allergen badges arrive decorated with asterisks, e.g. `*Soy*`.
pub fn sanitize_allergen(input: &str) -> String {
    sanitize(input.trim().trim_matches('*'))
}

/// Maps a source label like `Total Carbohydrates (g)` onto the nutrient vocabulary.
pub fn clean_nutrient_name(label: &str) -> Option<Nutrient> {
    let head = label.split('(').next().unwrap_or_default();
    let column = sanitize(head).to_lowercase().replace(' ', "_");

    let column = match column.as_str() {
        "total_carbohydrates" | "total_carbohydrate" | "carbohydrates" => "total_carbs",
        "sugars" => "sugar",
        "fiber" => "dietary_fiber",
        other => other,
    };

    Nutrient::from_column(column)
}

/// Keeps only digits and decimal points. Nothing left means the value is unknown.
pub fn strip_nutrient(raw: &str) -> Option<f64> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if digits.is_empty() {
        return None;
    }

    digits.parse().ok()
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, IngestError> {
        if start > end {
            return Err(IngestError::InvalidWindow { start, end });
        }

        Ok(Self { start, end })
    }

    /// Fails when either edge falls outside the calendar chrono can represent.
    pub fn around(
        anchor: NaiveDate,
        days_before: u32,
        days_after: u32,
    ) -> Result<Self, IngestError> {
        let out_of_range = || IngestError::WindowOutOfRange {
            anchor,
            days_before,
            days_after,
        };

        let start = anchor
            .checked_sub_days(Days::new(days_before.into()))
            .ok_or_else(out_of_range)?;
        let end = anchor
            .checked_add_days(Days::new(days_after.into()))
            .ok_or_else(out_of_range)?;

        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn len(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}
