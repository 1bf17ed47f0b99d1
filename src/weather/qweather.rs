use super::auth::{AuthError, TokenSigner};
use super::types::*;
use crate::config::Config;
use reqwest::{header::AUTHORIZATION, Client};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

const NOW_PATH: &str = "/v7/weather/now";
const FORECAST_PATH: &str = "/v7/weather/3d";
const API_OK: &str = "200";

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("API error code {code}")]
    ApiCode { code: String },
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("Rate limited, retry after: {0}s")]
    RateLimited(u64),
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
}

pub struct QWeatherClient {
    client: Client,
    signer: TokenSigner,
    base_url: String,
    location_id: String,
    city: String,
}

impl QWeatherClient {
    pub fn new(config: &Config, signer: TokenSigner) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent("WeatherRelay/1.0")
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            signer,
            base_url: config.api_base_url(),
            location_id: config.qweather_location_id.clone(),
            city: config.city.clone(),
        })
    }

    /// Current conditions plus the 3-day forecast for the configured location.
    pub async fn fetch_snapshot(&self) -> Result<UpstreamSnapshot, UpstreamError> {
        let now: QWeatherNowResponse = self.get_checked(NOW_PATH).await?;
        let forecast: QWeatherDailyResponse = self.get_checked(FORECAST_PATH).await?;

        let update_time = if now.update_time.is_empty() {
            forecast.update_time
        } else {
            now.update_time
        };

        Ok(UpstreamSnapshot {
            city: self.city.clone(),
            update_time,
            now: now.now,
            today: forecast.daily.first().cloned(),
            daily: forecast.daily,
            indices: Vec::new(),
        })
    }

    async fn get_checked<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        let json = self
            .make_request_with_retry(&url, &[("location", self.location_id.as_str())])
            .await?;

        let code = json.get("code").and_then(Value::as_str).unwrap_or_default();
        if code != API_OK {
            return Err(UpstreamError::ApiCode {
                code: code.to_string(),
            });
        }

        Ok(serde_json::from_value(json)?)
    }

    async fn make_request_with_retry(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, UpstreamError> {
        let mut retry_count = 0;
        let max_retries = 3;
        let mut delay = Duration::from_millis(1000);

        loop {
            let bearer = self.signer.bearer().await?;
            let response = self
                .client
                .get(url)
                .query(params)
                .header(AUTHORIZATION, bearer)
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => {
                    let json: Value = response.json().await?;
                    return Ok(json);
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if retry_count >= max_retries {
                        return Err(UpstreamError::RateLimited(delay.as_secs()));
                    }

                    tracing::warn!(
                        "Rate limited by QWeather API, retrying in {}ms",
                        delay.as_millis()
                    );

                    sleep(delay).await;
                    delay = delay.mul_f32(2.0 + fastrand::f32() * 0.5); // Exponential backoff with jitter
                    retry_count += 1;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(UpstreamError::Http {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }
    }
}
