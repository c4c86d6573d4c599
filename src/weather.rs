//! Aggregation of hourly weather samples into race-wide features.

use crate::types::WeatherFeatures;

/// Hourly samples for one race day; any series may be empty or contain gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlySamples {
    pub air_temp: Vec<f64>,
    pub humidity: Vec<f64>,
    pub pressure: Vec<f64>,
    pub wind_speed: Vec<f64>,
    pub wind_direction_deg: Vec<f64>,
    pub rainfall: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WeatherCondition {
    DryModerate = 0,
    HotDry = 1,
    ColdDry = 2,
    LightRain = 3,
    HeavyRain = 4,
    Windy = 5,
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

fn max(v: &[f64]) -> f64 {
    v.iter().cloned().fold(f64::MIN, f64::max)
}

fn min(v: &[f64]) -> f64 {
    v.iter().cloned().fold(f64::MAX, f64::min)
}

/// Rain beats calm, wind beats rain, temperature only splits dry days.
pub fn classify(features: &WeatherFeatures) -> WeatherCondition {
    let mut condition = WeatherCondition::DryModerate;

    if let Some(&total) = features.get("total_rainfall") {
        if total > 2.0 {
            condition = WeatherCondition::HeavyRain;
        } else if total > 0.0 {
            condition = WeatherCondition::LightRain;
        }
    }
    if features.get("mean_wind_speed").is_some_and(|w| *w > 20.0) {
        condition = WeatherCondition::Windy;
    }
    if condition == WeatherCondition::DryModerate {
        if let Some(&t) = features.get("mean_temp") {
            if t > 30.0 {
                condition = WeatherCondition::HotDry;
            } else if t < 15.0 {
                condition = WeatherCondition::ColdDry;
            }
        }
    }
    condition
}

/// `None` when no series carries data.
pub fn extract_features(samples: &HourlySamples) -> Option<WeatherFeatures> {
    let mut f = WeatherFeatures::new();

    if !samples.air_temp.is_empty() {
        let t = &samples.air_temp;
        f.insert("mean_temp".into(), mean(t));
        f.insert("max_temp".into(), max(t));
        f.insert("min_temp".into(), min(t));
        f.insert("temp_range".into(), max(t) - min(t));
    }
    if !samples.humidity.is_empty() {
        f.insert("mean_humidity".into(), mean(&samples.humidity));
        f.insert("max_humidity".into(), max(&samples.humidity));
    }
    if !samples.pressure.is_empty() {
        let p = &samples.pressure;
        f.insert("mean_pressure".into(), mean(p));
        f.insert("pressure_change".into(), max(p) - min(p));
    }
    if !samples.wind_speed.is_empty() {
        f.insert("mean_wind_speed".into(), mean(&samples.wind_speed));
        f.insert("max_wind_speed".into(), max(&samples.wind_speed));
    }
    if !samples.wind_direction_deg.is_empty() {
        // circular mean
        let rad: Vec<f64> = samples
            .wind_direction_deg
            .iter()
            .map(|d| d.to_radians())
            .collect();
        f.insert("wind_dir_sin".into(), mean(&rad.iter().map(|r| r.sin()).collect::<Vec<_>>()));
        f.insert("wind_dir_cos".into(), mean(&rad.iter().map(|r| r.cos()).collect::<Vec<_>>()));
    }
    if !samples.rainfall.is_empty() {
        let total: f64 = samples.rainfall.iter().sum();
        f.insert("total_rainfall".into(), total);
        f.insert("max_rainfall".into(), max(&samples.rainfall));
        f.insert("rainy_condition".into(), if total > 0.0 { 1.0 } else { 0.0 });
    }

    if f.is_empty() {
        return None;
    }

    let wet = f.get("total_rainfall").is_some_and(|t| *t > 0.0);
    f.insert("wet_track".into(), if wet { 1.0 } else { 0.0 });
    let condition = classify(&f);
    f.insert("weather_condition".into(), condition as u8 as f64);
    Some(f)
}

/// Neutral race day used to fill missing weather fields.
pub fn default_features() -> WeatherFeatures {
    [
        ("mean_temp", 22.0),
        ("max_temp", 25.0),
        ("min_temp", 20.0),
        ("temp_range", 5.0),
        ("mean_humidity", 50.0),
        ("max_humidity", 60.0),
        ("mean_pressure", 1013.0),
        ("pressure_change", 2.0),
        ("mean_wind_speed", 10.0),
        ("max_wind_speed", 15.0),
        ("wind_dir_sin", 0.0),
        ("wind_dir_cos", 1.0),
        ("total_rainfall", 0.0),
        ("max_rainfall", 0.0),
        ("rainy_condition", 0.0),
        ("wet_track", 0.0),
        ("weather_condition", 0.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
