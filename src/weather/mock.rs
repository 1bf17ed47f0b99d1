use super::types::*;
use crate::clock::Clock;
use crate::utils::format_key;
use chrono::Duration;
use serde_json::json;
use std::sync::Arc;

const CONDITIONS: [&str; 5] = ["晴", "多云", "阴", "小雨", "阵雨"];
const WIND_DIRS: [&str; 4] = ["东风", "南风", "西风", "北风"];

/// Offline stand-in for the provider, used when no credentials are configured.
pub struct MockWeatherClient {
    clock: Arc<dyn Clock>,
    city: String,
}

impl MockWeatherClient {
    pub fn new(clock: Arc<dyn Clock>, city: impl Into<String>) -> Self {
        Self {
            clock,
            city: city.into(),
        }
    }

    pub async fn fetch_snapshot(&self) -> UpstreamSnapshot {
        let now = self.clock.now();
        let stamp = now.format("%Y-%m-%dT%H:%M%:z").to_string();

        let daily: Vec<DailyRecord> = (0..3)
            .map(|day| mock_daily(now.date_naive() + Duration::days(day)))
            .collect();

        UpstreamSnapshot {
            city: format!("{} (测试数据)", self.city),
            update_time: stamp.clone(),
            now: NowObservation {
                obs_time: stamp,
                temp: format!("{}", 18 + fastrand::i32(0..10)),
                text: pick(&CONDITIONS).to_string(),
                wind_dir: pick(&WIND_DIRS).to_string(),
                wind_scale: format!("{}", 1 + fastrand::i32(0..4)),
                wind_speed: format!("{}", 3 + fastrand::i32(0..15)),
                humidity: format!("{}", 40 + fastrand::i32(0..50)),
            },
            today: daily.first().cloned(),
            daily,
            indices: vec![
                LifeIndex {
                    name: "紫外线强度".to_string(),
                    value: "极低".to_string(),
                    detail: String::new(),
                },
                LifeIndex {
                    name: "感冒指数".to_string(),
                    value: "易发".to_string(),
                    detail: "注意增减衣物".to_string(),
                },
            ],
        }
    }
}

fn pick<'a>(options: &[&'a str]) -> &'a str {
    options[fastrand::usize(..options.len())]
}

fn mock_daily(date: chrono::NaiveDate) -> DailyRecord {
    let low = 15 + fastrand::i32(0..6);
    let high = low + 5 + fastrand::i32(0..6);

    let value = json!({
        "fxDate": format_key(date),
        "sunrise": format!("05:{:02}", fastrand::u32(0..10)),
        "sunset": format!("18:{:02}", 10 + fastrand::u32(0..20)),
        "tempMax": high.to_string(),
        "tempMin": low.to_string(),
        "textDay": pick(&CONDITIONS),
        "textNight": pick(&CONDITIONS),
        "windDirDay": pick(&WIND_DIRS),
        "windScaleDay": "1-3",
        "windDirNight": pick(&WIND_DIRS),
        "windScaleNight": "1-3",
    });

    serde_json::from_value(value).unwrap_or_default()
}
