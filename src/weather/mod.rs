pub mod auth;
pub mod mock;
pub mod qweather;
pub mod types;

use mock::MockWeatherClient;
use qweather::{QWeatherClient, UpstreamError};
use types::UpstreamSnapshot;

/// Where snapshots come from for this process.
pub enum WeatherSource {
    QWeather(QWeatherClient),
    Mock(MockWeatherClient),
}

impl WeatherSource {
    pub async fn fetch_snapshot(&self) -> Result<UpstreamSnapshot, UpstreamError> {
        match self {
            WeatherSource::QWeather(client) => client.fetch_snapshot().await,
            WeatherSource::Mock(client) => Ok(client.fetch_snapshot().await),
        }
    }
}
