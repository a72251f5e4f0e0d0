use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::AppState;
use crate::config::WeatherConfig;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct Forecast {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: f64,
    wind_speed_10m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temp: i64,
    pub condition: String,
    pub humidity: u32,
    pub wind: f64,
    pub location: String,
}

impl Weather {
    fn fallback(location: &str) -> Self {
        Self {
            temp: 72,
            condition: "Sunny".to_string(),
            humidity: 25,
            wind: 8.0,
            location: location.to_string(),
        }
    }
}

/// WMO weather interpretation codes, grouped coarsely.
pub fn wmo_condition(code: u16) -> &'static str {
    match code {
        0 => "Clear",
        1 => "Mainly Clear",
        2 => "Partly Cloudy",
        3 => "Overcast",
        45 | 48 => "Foggy",
        51 | 53 | 55 => "Drizzle",
        61 | 63 | 65 => "Rain",
        71 | 73 | 75 => "Snow",
        80..=82 => "Rain Showers",
        95 | 96 | 99 => "Thunderstorm",
        _ => "Unknown",
    }
}

async fn fetch(
    client: &reqwest::Client,
    config: &WeatherConfig,
    lat: f64,
    lon: f64,
) -> Result<Weather> {
    let url = format!("{}/v1/forecast", config.base_url.trim_end_matches('/'));
    let forecast: Forecast = client
        .get(url)
        .query(&[
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            (
                "current",
                "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m".to_string(),
            ),
            ("temperature_unit", "fahrenheit".to_string()),
            ("wind_speed_unit", "mph".to_string()),
            ("precipitation_unit", "inch".to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let current = forecast.current;
    Ok(Weather {
        temp: current.temperature_2m.round() as i64,
        condition: wmo_condition(current.weather_code as u16).to_string(),
        humidity: current.relative_humidity_2m.round() as u32,
        wind: current.wind_speed_10m,
        location: config.location.clone(),
    })
}

/// Current conditions; a fixed fair-weather payload if the upstream fails.
pub async fn current(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Weather> {
    let config = &state.config.weather;
    let coord = |name: &str| params.get(name).and_then(|v| v.trim().parse::<f64>().ok());
    let lat = coord("lat").unwrap_or(config.latitude);
    let lon = coord("lon").unwrap_or(config.longitude);

    match fetch(&state.http, config, lat, lon).await {
        Ok(weather) => Json(weather),
        Err(e) => {
            warn!("Weather lookup failed, using fallback: {}", e);
            Json(Weather::fallback(&config.location))
        }
    }
}
