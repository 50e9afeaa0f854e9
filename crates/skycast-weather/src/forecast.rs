//! Reshapes the 3-hourly forecast list into per-day summaries.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::types::{Condition, Forecast, ForecastEntry};

/// Number of days the forecast panel shows.
pub const FORECAST_DAYS: usize = 5;

/// One 3-hour forecast step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyPoint {
    /// Local "HH:MM" label
    pub hour: String,
    pub temp: i32,
    /// Rain volume over the 3-hour window, 0 when absent
    pub precipitation: f64,
    pub wind_speed: i32,
    pub wind_direction: Option<f64>,
    pub humidity: u8,
    pub condition: Option<Condition>,
}

/// A calendar day of forecast steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    /// The 12:00 step, or the first step of the day when there is none
    pub representative: HourlyPoint,
    pub hours: Vec<HourlyPoint>,
    pub temp_min: i32,
    pub temp_max: i32,
    pub total_precipitation: f64,
    pub avg_wind_speed: f64,
    pub avg_humidity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastView {
    pub city_name: String,
    pub days: Vec<DaySummary>,
}

impl ForecastView {
    pub fn from_forecast(forecast: &Forecast) -> Self {
        let offset = forecast.city.timezone.unwrap_or(0);
        let mut days: Vec<(NaiveDate, Vec<HourlyPoint>, Option<usize>)> = Vec::new();

        for entry in &forecast.list {
            let Some(at) = entry_time(entry, offset) else {
                tracing::debug!("Skipping forecast entry with bad timestamp: {}", entry.dt);
                continue;
            };
            let date = at.date();
            let point = hourly_point(entry, &at);
            let is_noon = point.hour == "12:00";

            // The list is chronological, so a new date always starts a new group
            match days.last_mut() {
                Some((last, hours, noon)) if *last == date => {
                    if is_noon && noon.is_none() {
                        *noon = Some(hours.len());
                    }
                    hours.push(point);
                }
                _ => days.push((date, vec![point], is_noon.then_some(0))),
            }
        }

        let days = days
            .into_iter()
            .map(|(date, hours, noon)| summarize(date, hours, noon.unwrap_or(0)))
            .collect();

        Self {
            city_name: forecast.city.name.clone(),
            days,
        }
    }

    /// The first `n` days.
    pub fn days(&self, n: usize) -> &[DaySummary] {
        &self.days[..n.min(self.days.len())]
    }

    /// Drop everything past the first `n` days.
    pub fn truncate(mut self, n: usize) -> Self {
        self.days.truncate(n);
        self
    }
}

fn entry_time(entry: &ForecastEntry, offset: i32) -> Option<NaiveDateTime> {
    entry
        .dt_txt
        .as_deref()
        .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| {
            DateTime::from_timestamp(entry.dt + i64::from(offset), 0).map(|dt| dt.naive_utc())
        })
}

fn hourly_point(entry: &ForecastEntry, at: &NaiveDateTime) -> HourlyPoint {
    HourlyPoint {
        hour: at.format("%H:%M").to_string(),
        temp: entry.main.temp.round() as i32,
        precipitation: entry
            .rain
            .as_ref()
            .and_then(|r| r.three_hours)
            .unwrap_or(0.0),
        wind_speed: entry.wind.speed.round() as i32,
        wind_direction: entry.wind.deg,
        humidity: entry.main.humidity,
        condition: entry.weather.first().cloned(),
    }
}

fn summarize(date: NaiveDate, hours: Vec<HourlyPoint>, representative: usize) -> DaySummary {
    let count = hours.len() as f64;
    let temp_min = hours.iter().map(|h| h.temp).min().unwrap_or_default();
    let temp_max = hours.iter().map(|h| h.temp).max().unwrap_or_default();
    let total_precipitation = hours.iter().map(|h| h.precipitation).sum();
    let avg_wind_speed = hours.iter().map(|h| f64::from(h.wind_speed)).sum::<f64>() / count;
    let avg_humidity = hours.iter().map(|h| f64::from(h.humidity)).sum::<f64>() / count;

    DaySummary {
        date,
        representative: hours[representative].clone(),
        hours,
        temp_min,
        temp_max,
        total_precipitation,
        avg_wind_speed,
        avg_humidity,
    }
}
