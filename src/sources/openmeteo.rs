//! Race-day weather from the Open-Meteo forecast and archive APIs.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::{SourceResult, WeatherProvider};
use crate::retry::RetryPolicy;
use crate::types::{CircuitInfo, WeatherFeatures};
use crate::weather::{extract_features, HourlySamples};

const HOURLY_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,surface_pressure,wind_speed_10m,wind_direction_10m,precipitation";

#[derive(Deserialize)]
struct Response {
    hourly: Option<Hourly>,
}

#[derive(Deserialize, Default)]
struct Hourly {
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    surface_pressure: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    wind_direction_10m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}

fn present(v: Vec<Option<f64>>) -> Vec<f64> {
    v.into_iter().flatten().filter(|x| x.is_finite()).collect()
}

impl From<Hourly> for HourlySamples {
    fn from(h: Hourly) -> Self {
        HourlySamples {
            air_temp: present(h.temperature_2m),
            humidity: present(h.relative_humidity_2m),
            pressure: present(h.surface_pressure),
            wind_speed: present(h.wind_speed_10m),
            wind_direction_deg: present(h.wind_direction_10m),
            rainfall: present(h.precipitation),
        }
    }
}

pub struct OpenMeteoClient {
    client: reqwest::Client,
    forecast_url: String,
    archive_url: String,
    retry: RetryPolicy,
}

impl OpenMeteoClient {
    pub fn new(
        forecast_url: impl Into<String>,
        archive_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> SourceResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            forecast_url: forecast_url.into(),
            archive_url: archive_url.into(),
            retry,
        })
    }

    fn endpoint_for(&self, date: NaiveDate, today: NaiveDate) -> &str {
        if date < today {
            &self.archive_url
        } else {
            &self.forecast_url
        }
    }

    async fn fetch(&self, url: &str, circuit: &CircuitInfo, date: NaiveDate) -> SourceResult<Response> {
        let day = date.format("%Y-%m-%d").to_string();
        let resp = self
            .client
            .get(url)
            .query(&[
                ("latitude", circuit.latitude.to_string()),
                ("longitude", circuit.longitude.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("start_date", day.clone()),
                ("end_date", day),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn forecast_or_historical(
        &self,
        circuit: &CircuitInfo,
        date: NaiveDate,
    ) -> SourceResult<Option<WeatherFeatures>> {
        let url = self.endpoint_for(date, Utc::now().date_naive()).to_string();
        tracing::debug!("weather for {} on {} via {}", circuit.name, date, url);

        let resp = self
            .retry
            .run("weather", || self.fetch(&url, circuit, date))
            .await?;
        let samples: HourlySamples = resp.hourly.unwrap_or_default().into();
        Ok(extract_features(&samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_nulls_are_dropped() {
        let json = r#"{"hourly": {
            "time": ["2024-03-24T00:00", "2024-03-24T01:00", "2024-03-24T02:00"],
            "temperature_2m": [18.0, null, 22.0],
            "precipitation": [0.0, 0.0, 0.0]
        }}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        let samples: HourlySamples = resp.hourly.unwrap().into();
        assert_eq!(samples.air_temp, vec![18.0, 22.0]);
        assert!(samples.humidity.is_empty());

        let f = extract_features(&samples).unwrap();
        assert_eq!(f["mean_temp"], 20.0);
        assert_eq!(f["wet_track"], 0.0);
    }

    #[test]
    fn past_dates_use_archive() {
        let c = OpenMeteoClient::new(
            "https://forecast.test",
            "https://archive.test",
            Duration::from_secs(1),
            RetryPolicy::none(),
        )
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(
            c.endpoint_for(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(), today),
            "https://archive.test"
        );
        assert_eq!(c.endpoint_for(today, today), "https://forecast.test");
    }
}
