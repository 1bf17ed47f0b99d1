use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::{compact, CacheState, DailyStore, PersistenceError, RETAINED_DAYS};
use crate::clock::Clock;
use crate::utils::{extract_clock_time, format_key, parse_key, shift_key, temp_label, weekday_label};
use crate::weather::types::*;

/// Upstream spellings of each logical field, checked in order.
pub mod aliases {
    pub const DATE: &[&str] = &["fxDate", "date"];
    pub const TEMP_MAX: &[&str] = &["tempMax", "temp_max"];
    pub const TEMP_MIN: &[&str] = &["tempMin", "temp_min"];
    pub const TEXT_DAY: &[&str] = &["textDay", "text_day"];
    pub const TEXT_NIGHT: &[&str] = &["textNight", "text_night"];
    pub const WIND_DIR_DAY: &[&str] = &["windDirDay", "wind_dir_day"];
    pub const WIND_SCALE_DAY: &[&str] = &["windScaleDay", "wind_scale_day"];
    pub const WIND_DIR_NIGHT: &[&str] = &["windDirNight", "wind_dir_night"];
    pub const WIND_SCALE_NIGHT: &[&str] = &["windScaleNight", "wind_scale_night"];
    pub const SUNRISE: &[&str] = &["sunrise"];
    pub const SUNSET: &[&str] = &["sunset"];
}

/// Which rule produced the reported "yesterday".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesterdaySource {
    /// The cache holds the day before today.
    PreviousDay,
    /// Today was already cached by an earlier cycle; the entry before it is used.
    SameDayRerun,
    /// A gap in the history; the newest entry older than today is used.
    LatestEarlier,
    /// Cold cache.
    Unresolved,
}

/// Today's record: `snapshot.today` when it looks like a day record,
/// else the first forecast entry.
pub fn pick_today_daily(snapshot: &UpstreamSnapshot) -> Option<DailyRecord> {
    snapshot
        .today
        .as_ref()
        .filter(|t| t.has_any(aliases::DATE) || t.has_any(aliases::TEMP_MAX))
        .or_else(|| snapshot.daily.first())
        .cloned()
}

pub fn resolve_yesterday<'a>(
    cache: &'a CacheState,
    today_key: &str,
    yesterday_key: &str,
) -> (Option<&'a DailyRecord>, YesterdaySource) {
    if let Some(record) = cache.get(yesterday_key) {
        return (Some(record), YesterdaySource::PreviousDay);
    }

    // With today cached, "the entry preceding today" and "the newest entry
    // older than today" are the same entry; only the reason differs.
    let source = if cache.contains_key(today_key) {
        YesterdaySource::SameDayRerun
    } else {
        YesterdaySource::LatestEarlier
    };

    let earlier = cache
        .range::<str, _>((Bound::Unbounded, Bound::Excluded(today_key)))
        .next_back();
    match earlier {
        Some((_, record)) => (Some(record), source),
        None => (None, YesterdaySource::Unresolved),
    }
}

/// Turns upstream snapshots into the display document while maintaining
/// the two-day rolling cache that supplies "yesterday".
pub struct WeatherReshaper<S> {
    store: S,
    clock: Arc<dyn Clock>,
    cycle: Mutex<()>,
}

impl<S: DailyStore> WeatherReshaper<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cycle: Mutex::new(()),
        }
    }

    /// Run one reshape cycle: resolve yesterday, upsert today, compact, persist, render.
    ///
    /// Partial upstream data never fails the cycle; only a failed cache
    /// write does.
    pub async fn reshape(&self, snapshot: &UpstreamSnapshot) -> Result<OutputDocument, PersistenceError> {
        // Load-modify-save must not interleave between requests.
        let _cycle = self.cycle.lock().await;

        let mut cache = self.store.load().await;
        let today = self.clock.today();
        let today_daily = pick_today_daily(snapshot);

        let today_key = today_daily
            .as_ref()
            .and_then(|d| d.field(aliases::DATE))
            .map(|raw| parse_key(&raw).map(format_key).unwrap_or(raw))
            .unwrap_or_else(|| format_key(today));
        let yesterday_key = shift_key(&today_key, -1, today);

        let (yesterday, source) = resolve_yesterday(&cache, &today_key, &yesterday_key);
        let yesterday = yesterday.cloned();
        tracing::debug!(
            today = %today_key,
            cached = cache.len(),
            source = ?source,
            "Resolved yesterday"
        );

        if let Some(record) = &today_daily {
            cache.insert(today_key.clone(), stored_record(record, &today_key));
        }
        let cache = compact(cache, RETAINED_DAYS);
        self.store.save(&cache).await?;

        Ok(render(snapshot, today_daily.as_ref(), yesterday.as_ref()))
    }
}

/// The record as cached: its date field rewritten to the normalized key, so a
/// later cycle reports the same `date_1` the entry is filed under.
fn stored_record(record: &DailyRecord, today_key: &str) -> DailyRecord {
    let mut stored = record.clone();
    let date_field = aliases::DATE
        .iter()
        .find(|name| stored.has_any(std::slice::from_ref(*name)));
    if let Some(name) = date_field {
        stored.0.insert(name.to_string(), serde_json::Value::String(today_key.to_string()));
    }
    stored
}

fn render(
    snapshot: &UpstreamSnapshot,
    today: Option<&DailyRecord>,
    yesterday: Option<&DailyRecord>,
) -> OutputDocument {
    let now = &snapshot.now;
    let first_day = snapshot.daily.first();
    let today_or_first = |names: &'static [&'static str]| {
        today
            .and_then(|d| d.field(names))
            .or_else(|| first_day.and_then(|d| d.field(names)))
            .unwrap_or_default()
    };

    let update_time = if snapshot.update_time.is_empty() {
        &now.obs_time
    } else {
        &snapshot.update_time
    };
    let wind_force = if now.wind_scale.is_empty() {
        &now.wind_speed
    } else {
        &now.wind_scale
    };

    OutputDocument {
        ok: true,
        data: WeatherData {
            city: snapshot.city.clone(),
            updatetime: extract_clock_time(update_time),
            wendu: now.temp.clone(),
            fengli: wind_force.clone(),
            shidu: now.humidity.clone(),
            fengxiang: now.wind_dir.clone(),
            sunrise_1: today_or_first(aliases::SUNRISE),
            sunset_1: today_or_first(aliases::SUNSET),
            sunrise_2: EmptyObject::default(),
            sunset_2: EmptyObject::default(),
            yesterday: yesterday.map(yesterday_block).unwrap_or_default(),
            forecast: ForecastBlock {
                weather: snapshot.daily.iter().map(forecast_day).collect(),
            },
            zhishus: LifeIndexBlock {
                zhishu: snapshot.indices.clone(),
            },
        },
    }
}

fn yesterday_block(daily: &DailyRecord) -> YesterdayBlock {
    YesterdayBlock {
        date_1: daily.text(aliases::DATE),
        high_1: daily.text(aliases::TEMP_MAX),
        low_1: daily.text(aliases::TEMP_MIN),
        day_1: YesterdayHalf {
            type_1: daily.text(aliases::TEXT_DAY),
            fx_1: daily.text(aliases::WIND_DIR_DAY),
            fl_1: daily.text(aliases::WIND_SCALE_DAY),
        },
        night_1: YesterdayHalf {
            type_1: daily.text(aliases::TEXT_NIGHT),
            fx_1: daily.text(aliases::WIND_DIR_NIGHT),
            fl_1: daily.text(aliases::WIND_SCALE_NIGHT),
        },
    }
}

fn forecast_day(daily: &DailyRecord) -> ForecastDay {
    ForecastDay {
        date: weekday_label(&daily.text(aliases::DATE)),
        high: temp_label(&daily.text(aliases::TEMP_MAX), true),
        low: temp_label(&daily.text(aliases::TEMP_MIN), false),
        day: ForecastHalf {
            kind: daily.text(aliases::TEXT_DAY),
            fengxiang: daily.text(aliases::WIND_DIR_DAY),
            fengli: daily.text(aliases::WIND_SCALE_DAY),
        },
        night: ForecastHalf {
            kind: daily.text(aliases::TEXT_NIGHT),
            fengxiang: daily.text(aliases::WIND_DIR_NIGHT),
            fengli: daily.text(aliases::WIND_SCALE_NIGHT),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{MemoryDailyStore, ReadOnlyStore, SlowDailyStore};
    use crate::clock::FixedClock;
    use serde_json::{json, Value};

    fn day(date: &str, high: &str) -> DailyRecord {
        serde_json::from_value(json!({
            "fxDate": date,
            "sunrise": "05:00",
            "sunset": "18:21",
            "tempMax": high,
            "tempMin": "18",
            "textDay": "多云",
            "textNight": "阴",
            "windDirDay": "西南风",
            "windScaleDay": "1-3",
            "windDirNight": "东南风",
            "windScaleNight": "1-3"
        }))
        .unwrap()
    }

    fn snapshot(days: Vec<DailyRecord>) -> UpstreamSnapshot {
        let mut snapshot: UpstreamSnapshot = serde_json::from_value(json!({
            "city": "朝阳区",
            "updateTime": "2025-08-30T11:26+08:00",
            "now": {
                "obsTime": "2025-08-30T11:22+08:00",
                "temp": "25",
                "windDir": "西风",
                "windScale": "3",
                "windSpeed": "15",
                "humidity": "74"
            }
        }))
        .unwrap();
        snapshot.today = days.first().cloned();
        snapshot.daily = days;
        snapshot
    }

    fn cache_of(entries: &[(&str, DailyRecord)]) -> CacheState {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn reshaper(state: CacheState) -> WeatherReshaper<MemoryDailyStore> {
        WeatherReshaper::new(
            MemoryDailyStore::with_state(state),
            Arc::new(FixedClock::on(2025, 8, 30)),
        )
    }

    #[tokio::test]
    async fn test_cold_start() {
        let reshaper = reshaper(CacheState::new());
        let today = day("2025-08-30", "26");

        let doc = reshaper.reshape(&snapshot(vec![today.clone()])).await.unwrap();

        assert_eq!(doc.data.yesterday, YesterdayBlock::default());
        let cache = reshaper.store.contents().await;
        assert_eq!(cache, cache_of(&[("2025-08-30", today)]));
    }

    #[tokio::test]
    async fn test_cold_start_yesterday_is_all_empty_strings() {
        let reshaper = reshaper(CacheState::new());
        let doc = reshaper.reshape(&snapshot(vec![day("2025-08-30", "26")])).await.unwrap();

        let yesterday = serde_json::to_value(&doc.data.yesterday).unwrap();
        assert_eq!(
            yesterday,
            json!({
                "date_1": "", "high_1": "", "low_1": "",
                "day_1": {"type_1": "", "fx_1": "", "fl_1": ""},
                "night_1": {"type_1": "", "fx_1": "", "fl_1": ""}
            })
        );
    }

    #[tokio::test]
    async fn test_steady_state() {
        let a = day("2025-08-29", "24");
        let today = day("2025-08-30", "26");
        let reshaper = reshaper(cache_of(&[("2025-08-29", a.clone())]));

        let doc = reshaper.reshape(&snapshot(vec![today.clone()])).await.unwrap();

        assert_eq!(doc.data.yesterday.date_1, "2025-08-29");
        assert_eq!(doc.data.yesterday.high_1, "24");
        assert_eq!(doc.data.yesterday.day_1.fx_1, "西南风");
        let cache = reshaper.store.contents().await;
        assert_eq!(cache, cache_of(&[("2025-08-29", a), ("2025-08-30", today)]));
    }

    #[tokio::test]
    async fn test_double_invocation_same_day() {
        let a = day("2025-08-29", "24");
        let b = day("2025-08-30", "26");
        let c = day("2025-08-30", "27");
        let reshaper = reshaper(cache_of(&[("2025-08-29", a.clone()), ("2025-08-30", b)]));

        let doc = reshaper.reshape(&snapshot(vec![c.clone()])).await.unwrap();

        assert_eq!(doc.data.yesterday.high_1, "24");
        let cache = reshaper.store.contents().await;
        assert_eq!(cache, cache_of(&[("2025-08-29", a), ("2025-08-30", c)]));
    }

    #[test]
    fn test_rerun_with_gap_uses_entry_before_today() {
        let a = day("2025-08-27", "22");
        let b = day("2025-08-30", "26");
        let cache = cache_of(&[("2025-08-27", a.clone()), ("2025-08-30", b)]);

        let (resolved, source) = resolve_yesterday(&cache, "2025-08-30", "2025-08-29");
        assert_eq!(resolved, Some(&a));
        assert_eq!(source, YesterdaySource::SameDayRerun);
    }

    #[tokio::test]
    async fn test_gap_after_downtime() {
        let a = day("2025-08-20", "30");
        let today = day("2025-08-30", "26");
        let reshaper = reshaper(cache_of(&[("2025-08-20", a.clone())]));

        let doc = reshaper.reshape(&snapshot(vec![today.clone()])).await.unwrap();

        assert_eq!(doc.data.yesterday.date_1, "2025-08-20");
        let cache = reshaper.store.contents().await;
        assert_eq!(cache, cache_of(&[("2025-08-20", a), ("2025-08-30", today)]));
    }

    #[test]
    fn test_resolve_ignores_future_entries() {
        let cache = cache_of(&[("2025-09-02", day("2025-09-02", "20"))]);
        let (resolved, source) = resolve_yesterday(&cache, "2025-08-30", "2025-08-29");
        assert!(resolved.is_none());
        assert_eq!(source, YesterdaySource::Unresolved);
    }

    #[tokio::test]
    async fn test_cache_compacted_to_two_latest() {
        let reshaper = reshaper(cache_of(&[
            ("2025-08-27", day("2025-08-27", "21")),
            ("2025-08-28", day("2025-08-28", "22")),
            ("2025-08-29", day("2025-08-29", "23")),
        ]));

        let doc = reshaper.reshape(&snapshot(vec![day("2025-08-30", "26")])).await.unwrap();

        assert_eq!(doc.data.yesterday.date_1, "2025-08-29");
        let cache = reshaper.store.contents().await;
        let keys: Vec<&str> = cache.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2025-08-29", "2025-08-30"]);
    }

    #[tokio::test]
    async fn test_alias_fallback_in_forecast_labels() {
        let legacy: DailyRecord = serde_json::from_value(json!({
            "date": "2025-08-31",
            "temp_max": "27",
            "temp_min": "17",
            "text_day": "阴",
            "wind_dir_night": "南风"
        }))
        .unwrap();
        let reshaper = reshaper(CacheState::new());

        let doc = reshaper
            .reshape(&snapshot(vec![day("2025-08-30", "26"), legacy]))
            .await
            .unwrap();

        let second = &doc.data.forecast.weather[1];
        assert_eq!(second.date, "31日星期日");
        assert_eq!(second.high, "高温 27℃");
        assert_eq!(second.low, "低温 17℃");
        assert_eq!(second.day.kind, "阴");
        assert_eq!(second.night.fengxiang, "南风");
        assert_eq!(second.night.fengli, "");
    }

    #[tokio::test]
    async fn test_renders_current_conditions() {
        let reshaper = reshaper(CacheState::new());
        let doc = reshaper
            .reshape(&snapshot(vec![day("2025-08-30", "26"), day("2025-08-31", "27")]))
            .await
            .unwrap();

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["ok"], Value::Bool(true));
        assert_eq!(value["data"]["city"], "朝阳区");
        assert_eq!(value["data"]["updatetime"], "11:26");
        assert_eq!(value["data"]["wendu"], "25");
        assert_eq!(value["data"]["fengli"], "3");
        assert_eq!(value["data"]["shidu"], "74");
        assert_eq!(value["data"]["fengxiang"], "西风");
        assert_eq!(value["data"]["sunrise_1"], "05:00");
        assert_eq!(value["data"]["sunset_1"], "18:21");
        assert_eq!(value["data"]["sunrise_2"], json!({}));
        assert_eq!(value["data"]["zhishus"], json!({"zhishu": []}));
        assert_eq!(value["data"]["forecast"]["weather"][0]["date"], "30日星期六");
        assert_eq!(value["data"]["forecast"]["weather"][0]["high"], "高温 26℃");
    }

    #[test]
    fn test_today_prefers_snapshot_today() {
        let mut snap = snapshot(vec![day("2025-08-30", "26")]);
        snap.today = Some(serde_json::from_value(json!({"date": "2025-08-31", "sunrise": "05:02"})).unwrap());
        assert_eq!(pick_today_daily(&snap).unwrap().text(aliases::DATE), "2025-08-31");

        // Without a date or temperature the forecast head wins.
        snap.today = Some(serde_json::from_value(json!({"sunrise": "05:02"})).unwrap());
        assert_eq!(pick_today_daily(&snap).unwrap().text(aliases::DATE), "2025-08-30");
    }

    #[tokio::test]
    async fn test_empty_snapshot_keys_today_from_clock() {
        let a = day("2025-08-29", "24");
        let reshaper = reshaper(cache_of(&[("2025-08-29", a.clone())]));

        let doc = reshaper.reshape(&UpstreamSnapshot::default()).await.unwrap();

        assert_eq!(doc.data.yesterday.date_1, "2025-08-29");
        assert_eq!(doc.data.updatetime, "");
        assert_eq!(doc.data.sunrise_1, "");
        assert!(doc.data.forecast.weather.is_empty());
        // Nothing to upsert; the cache is left as it was.
        assert_eq!(reshaper.store.contents().await, cache_of(&[("2025-08-29", a)]));
    }

    #[tokio::test]
    async fn test_unpadded_upstream_date_is_normalized() {
        let reshaper = reshaper(CacheState::new());
        reshaper.reshape(&snapshot(vec![day("2025-8-30", "26")])).await.unwrap();

        let cache = reshaper.store.contents().await;
        assert_eq!(cache["2025-08-30"].text(aliases::DATE), "2025-08-30");
    }

    #[tokio::test]
    async fn test_unpadded_date_reported_normalized_next_day() {
        let store = MemoryDailyStore::default();
        let first = WeatherReshaper::new(store, Arc::new(FixedClock::on(2025, 8, 30)));
        first.reshape(&snapshot(vec![day("2025-8-30", "26")])).await.unwrap();

        let next = WeatherReshaper::new(
            MemoryDailyStore::with_state(first.store.contents().await),
            Arc::new(FixedClock::on(2025, 8, 31)),
        );
        let doc = next.reshape(&snapshot(vec![day("2025-8-31", "27")])).await.unwrap();

        assert_eq!(doc.data.yesterday.date_1, "2025-08-30");
        assert_eq!(doc.data.yesterday.high_1, "26");
    }

    #[tokio::test]
    async fn test_persistence_error_propagates() {
        let reshaper = WeatherReshaper::new(ReadOnlyStore, Arc::new(FixedClock::on(2025, 8, 30)));
        let result = reshaper.reshape(&snapshot(vec![day("2025-08-30", "26")])).await;
        assert!(matches!(result, Err(PersistenceError::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cycles_do_not_lose_updates() {
        let reshaper = Arc::new(WeatherReshaper::new(
            SlowDailyStore::default(),
            Arc::new(FixedClock::on(2025, 8, 30)),
        ));

        let handles: Vec<_> = ["2025-08-28", "2025-08-29", "2025-08-30"]
            .into_iter()
            .map(|date| {
                let reshaper = reshaper.clone();
                let snap = snapshot(vec![day(date, "20")]);
                tokio::spawn(async move { reshaper.reshape(&snap).await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let cache = reshaper.store.contents().await;
        let keys: Vec<&str> = cache.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2025-08-29", "2025-08-30"]);
    }
}
