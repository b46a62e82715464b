//! Tour catalogue reports: the cheap-tours alias, per-difficulty statistics
//! and the monthly start plan.

use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::query::{Document, ParameterMap};
use crate::resources::number;
use crate::resources::schema::parse_date;

/// Tours rated at least this well count towards the statistics.
pub const STATS_MIN_RATING: f64 = 4.5;

/// The five cheapest tours with a compact field set. Overrides whatever paging,
/// sorting and field selection the client sent; filters are kept.
pub fn top_cheap_params(params: &ParameterMap) -> ParameterMap {
    let mut params = params.clone();
    params.insert("limit", "5");
    params.insert("sort", "price");
    params.insert("fields", "name,price,ratingsAverage,summary,difficulty");
    params
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: u64,
    pub num_ratings: f64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Default)]
struct Accumulator {
    tours: u64,
    ratings: f64,
    rating_sum: f64,
    price_sum: f64,
    priced: u64,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

/// Well-rated tours grouped by difficulty, cheapest group first.
pub fn tour_stats(tours: &[Document]) -> Vec<DifficultyStats> {
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();

    for tour in tours {
        let Some(rating) = number(tour, "ratingsAverage").filter(|rating| *rating >= STATS_MIN_RATING)
        else {
            continue;
        };
        let difficulty = tour
            .get("difficulty")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let group = groups.entry(difficulty).or_default();
        group.tours += 1;
        group.rating_sum += rating;
        group.ratings += number(tour, "ratingsQuantity").unwrap_or(0.0);
        if let Some(price) = number(tour, "price") {
            group.price_sum += price;
            group.priced += 1;
            group.min_price = Some(group.min_price.map_or(price, |min| min.min(price)));
            group.max_price = Some(group.max_price.map_or(price, |max| max.max(price)));
        }
    }

    let mut stats: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, group)| DifficultyStats {
            difficulty,
            num_tours: group.tours,
            num_ratings: group.ratings,
            avg_rating: group.rating_sum / group.tours as f64,
            avg_price: if group.priced == 0 {
                0.0
            } else {
                group.price_sum / group.priced as f64
            },
            min_price: group.min_price.unwrap_or(0.0),
            max_price: group.max_price.unwrap_or(0.0),
        })
        .collect();
    stats.sort_by(|a, b| a.avg_price.partial_cmp(&b.avg_price).unwrap_or(Ordering::Equal));
    stats
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    pub month: u32,
    pub num_tours: u64,
    pub tours: Vec<String>,
}

/// Tour starts within `year` grouped by calendar month, busiest month first.
pub fn monthly_plan(tours: &[Document], year: i32) -> Vec<MonthPlan> {
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    for tour in tours {
        let name = tour
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(dates) = tour.get("startDates").and_then(Value::as_array) else {
            continue;
        };
        for date in dates.iter().filter_map(Value::as_str).filter_map(parse_date) {
            if date.year() == year {
                months.entry(date.month()).or_default().push(name.to_string());
            }
        }
    }

    let mut plan: Vec<MonthPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthPlan {
            month,
            num_tours: tours.len() as u64,
            tours,
        })
        .collect();
    plan.sort_by(|a, b| b.num_tours.cmp(&a.num_tours).then(a.month.cmp(&b.month)));
    plan
}

/// Accepts four-digit years that chrono can represent.
pub fn parse_year(raw: &str) -> Option<i32> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|year| NaiveDate::from_ymd_opt(*year, 1, 1).is_some() && (1000..=9999).contains(year))
}
