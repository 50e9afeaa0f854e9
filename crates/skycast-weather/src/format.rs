//! Display helpers for weather values.

use chrono::{DateTime, FixedOffset};

const FLAG_BASE: &str = "https://flagcdn.com/w80/";

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

const ARROWS: [&str; 8] = ["↑", "↗", "→", "↘", "↓", "↙", "←", "↖"];

/// Capital cities keyed by the name the provider reports, with alternate spellings.
const CAPITALS: &[(&str, &str)] = &[
    ("London", "GB"),
    ("Paris", "FR"),
    ("Berlin", "DE"),
    ("Washington D.C.", "US"),
    ("Washington", "US"),
    ("Beijing", "CN"),
    ("Tokyo", "JP"),
    ("Moscow", "RU"),
    ("Rome", "IT"),
    ("Madrid", "ES"),
    ("Ottawa", "CA"),
    ("Brasília", "BR"),
    ("Brasilia", "BR"),
    ("Canberra", "AU"),
    ("New Delhi", "IN"),
    ("Wellington", "NZ"),
    ("Cairo", "EG"),
    ("Dublin", "IE"),
    ("Oslo", "NO"),
    ("Stockholm", "SE"),
    ("Helsinki", "FI"),
    ("Athens", "GR"),
    ("Vienna", "AT"),
    ("Brussels", "BE"),
    ("Jakarta", "ID"),
    ("Bangkok", "TH"),
    ("Manila", "PH"),
    ("Seoul", "KR"),
    ("Amsterdam", "NL"),
    ("Copenhagen", "DK"),
    ("Lisbon", "PT"),
    ("Ankara", "TR"),
    ("Budapest", "HU"),
    ("Warsaw", "PL"),
    ("Prague", "CZ"),
    ("Bern", "CH"),
    ("Kiev", "UA"),
    ("Kyiv", "UA"),
    ("Mexico", "MX"),
    ("Mexico City", "MX"),
    ("Bogotá", "CO"),
    ("Bogota", "CO"),
    ("Lima", "PE"),
    ("Santiago", "CL"),
    ("Buenos Aires", "AR"),
    ("Caracas", "VE"),
    ("Nairobi", "KE"),
    ("Pretoria", "ZA"),
    ("Addis Ababa", "ET"),
    ("Riyadh", "SA"),
    ("Tehran", "IR"),
    ("Islamabad", "PK"),
    ("Hanoi", "VN"),
    ("Kuala Lumpur", "MY"),
];

/// Air quality index (1-5) as text.
pub fn aqi_text(aqi: u8) -> &'static str {
    match aqi {
        1 => "Good",
        2 => "Fair",
        3 => "Moderate",
        4 => "Poor",
        5 => "Very Poor",
        _ => "Unknown",
    }
}

/// One of 16 compass points for a bearing in degrees.
pub fn wind_compass(degrees: f64) -> &'static str {
    COMPASS[sector(degrees, 16)]
}

/// One of 8 arrows for a bearing in degrees.
pub fn wind_arrow(degrees: f64) -> &'static str {
    ARROWS[sector(degrees, 8)]
}

fn sector(degrees: f64, sectors: usize) -> usize {
    let width = 360.0 / sectors as f64;
    let index = (degrees.rem_euclid(360.0) / width).round() as usize;
    index % sectors
}

pub fn format_precipitation(mm: f64) -> String {
    if mm == 0.0 {
        "0 mm".to_string()
    } else if mm < 0.1 {
        "< 0.1 mm".to_string()
    } else {
        format!("{} mm", round_to_tenth(mm))
    }
}

/// Metres below 1000, otherwise kilometres to one decimal.
pub fn format_visibility(metres: u32) -> String {
    if metres >= 1000 {
        format!("{} km", (f64::from(metres) / 100.0).round() / 10.0)
    } else {
        format!("{} m", metres)
    }
}

/// Distance in km (or miles when `imperial`), dropping to m/ft below one unit.
pub fn format_distance(distance: f64, imperial: bool) -> String {
    match (imperial, distance >= 1.0) {
        (false, true) => format!("{} km", distance.round()),
        (false, false) => format!("{} m", (distance * 1000.0).round()),
        (true, true) => format!("{} mi", distance.round()),
        (true, false) => format!("{} ft", (distance * 5280.0).round()),
    }
}

pub fn format_wind_speed(speed: f64, unit: &str) -> String {
    format!("{} {}", round_to_tenth(speed), unit)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Icon name for a provider icon code such as "10d".
pub fn icon_for_code(code: &str) -> &'static str {
    match code {
        "" => "cloud",
        "01d" => "sun",
        "01n" => "moon",
        "02d" => "cloud-sun",
        "02n" => "cloud-moon",
        "03d" | "03n" => "cloud",
        "04d" | "04n" => "clouds",
        "09d" | "09n" => "cloud-showers-heavy",
        "10d" => "cloud-sun-rain",
        "10n" => "cloud-moon-rain",
        "11d" | "11n" => "bolt",
        "13d" | "13n" => "snowflake",
        "50d" | "50n" => "smog",
        _ => "cloud-question",
    }
}

/// "07:05 AM" style time at a UTC timestamp shifted by `offset_secs`.
///
/// Offsets outside +/-24h are treated as UTC.
pub fn format_local_time(timestamp: i64, offset_secs: i32) -> Option<String> {
    let offset = FixedOffset::east_opt(offset_secs).or_else(|| FixedOffset::east_opt(0))?;
    let utc = DateTime::from_timestamp(timestamp, 0)?;
    Some(utc.with_timezone(&offset).format("%I:%M %p").to_string())
}

/// Flag image for an ISO 3166 alpha-2 country code.
pub fn flag_url(country_code: &str) -> String {
    format!("{}{}.svg", FLAG_BASE, country_code.to_lowercase())
}

pub fn map_url(lat: f64, lon: f64) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={lat}&mlon={lon}#map=13/{lat}/{lon}"
    )
}

pub fn is_capital_city(name: &str, country_code: &str) -> bool {
    CAPITALS
        .iter()
        .any(|(city, cc)| *city == name && cc.eq_ignore_ascii_case(country_code))
}

/// Upper-case the first letter of a provider description.
pub fn capitalize(description: &str) -> String {
    let mut chars = description.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
