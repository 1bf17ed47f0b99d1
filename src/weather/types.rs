use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One day's weather summary as the provider sent it.
///
/// Field names vary between upstream conventions (`tempMax` vs `temp_max`),
/// so the record keeps the raw object and callers look fields up through
/// an alias list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyRecord(pub Map<String, Value>);

impl DailyRecord {
    /// First non-empty value among `aliases`, rendered as a string.
    pub fn field(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|name| match self.0.get(*name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Like [`DailyRecord::field`], degrading to an empty string.
    pub fn text(&self, aliases: &[&str]) -> String {
        self.field(aliases).unwrap_or_default()
    }

    pub fn has_any(&self, aliases: &[&str]) -> bool {
        self.field(aliases).is_some()
    }
}

impl From<Map<String, Value>> for DailyRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Accepts a string, a number, or anything else (as `""`).
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NowObservation {
    #[serde(deserialize_with = "lenient_string")]
    pub obs_time: String,
    #[serde(deserialize_with = "lenient_string")]
    pub temp: String,
    #[serde(deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(deserialize_with = "lenient_string")]
    pub wind_dir: String,
    #[serde(deserialize_with = "lenient_string")]
    pub wind_scale: String,
    #[serde(deserialize_with = "lenient_string")]
    pub wind_speed: String,
    #[serde(deserialize_with = "lenient_string")]
    pub humidity: String,
}

/// A `null` or non-object `now` degrades to an empty observation.
fn lenient_now<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NowObservation, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherNowResponse {
    pub code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub update_time: String,
    #[serde(default, deserialize_with = "lenient_now")]
    pub now: NowObservation,
}

/// Keeps the object entries of a `daily` array; anything else is dropped.
fn lenient_daily<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<DailyRecord>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(DailyRecord(map)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherDailyResponse {
    pub code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub update_time: String,
    #[serde(default, deserialize_with = "lenient_daily")]
    pub daily: Vec<DailyRecord>,
}

/// One fetched bundle of current conditions and forecast.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSnapshot {
    pub city: String,
    pub update_time: String,
    pub now: NowObservation,
    pub today: Option<DailyRecord>,
    pub daily: Vec<DailyRecord>,
    pub indices: Vec<LifeIndex>,
}

// Downstream document. Field names are fixed by the display client.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDocument {
    pub ok: bool,
    pub data: WeatherData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherData {
    pub city: String,
    pub updatetime: String,
    pub wendu: String,
    pub fengli: String,
    pub shidu: String,
    pub fengxiang: String,
    pub sunrise_1: String,
    pub sunset_1: String,
    pub sunrise_2: EmptyObject,
    pub sunset_2: EmptyObject,
    pub yesterday: YesterdayBlock,
    pub forecast: ForecastBlock,
    pub zhishus: LifeIndexBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyObject {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YesterdayBlock {
    pub date_1: String,
    pub high_1: String,
    pub low_1: String,
    pub day_1: YesterdayHalf,
    pub night_1: YesterdayHalf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YesterdayHalf {
    pub type_1: String,
    pub fx_1: String,
    pub fl_1: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastBlock {
    pub weather: Vec<ForecastDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: String,
    pub high: String,
    pub low: String,
    pub day: ForecastHalf,
    pub night: ForecastHalf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastHalf {
    #[serde(rename = "type")]
    pub kind: String,
    pub fengxiang: String,
    pub fengli: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifeIndexBlock {
    pub zhishu: Vec<LifeIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeIndex {
    pub name: String,
    pub value: String,
    pub detail: String,
}
