use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub qweather_api_host: String,
    pub qweather_location_id: String,
    pub qweather_jwt_kid: String,
    pub qweather_jwt_sub: String,
    pub qweather_jwt_private_key_path: PathBuf,
    pub use_mock: bool,
    pub city: String,
    pub cache_file: PathBuf,
    pub app_timezone: String,
    pub port: u16,
    pub upstream_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let use_mock = env::var("QWEATHER_MOCK")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        // Credentials are only needed when talking to the real provider.
        let required = |name: &str| -> anyhow::Result<String> {
            match env::var(name) {
                Ok(value) => Ok(value),
                Err(_) if use_mock => Ok(String::new()),
                Err(_) => Err(anyhow::anyhow!("{} not set", name)),
            }
        };

        let config = Config {
            qweather_api_host: required("QWEATHER_API_HOST")?,
            qweather_location_id: required("QWEATHER_LOCATION_ID")?,
            qweather_jwt_kid: required("QWEATHER_JWT_KID")?,
            qweather_jwt_sub: required("QWEATHER_JWT_SUB")?,
            qweather_jwt_private_key_path: required("QWEATHER_JWT_PRIVATE_KEY_PATH")?.into(),
            use_mock,
            city: env::var("WEATHER_CITY").unwrap_or_else(|_| "朝阳区".to_string()),
            cache_file: env::var("WEATHER_CACHE_FILE")
                .unwrap_or_else(|_| "./yesterday.json".to_string())
                .into(),
            app_timezone: env::var("APP_TIMEZONE")
                .unwrap_or_else(|_| "Asia/Shanghai".to_string()),
            port: env::var("PORT")
                .ok()
                .map(|p| p.parse())
                .transpose()
                .map_err(|e| anyhow::anyhow!("PORT is not a valid port number: {}", e))?
                .unwrap_or(3456),
            upstream_timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
        };

        parse_timezone(&config.app_timezone).map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    /// Base URL for provider requests. A bare host gets `https://`.
    pub fn api_base_url(&self) -> String {
        let host = self.qweather_api_host.trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }
}

/// Parse timezone string to chrono_tz::Tz
pub fn parse_timezone(tz_str: &str) -> Result<chrono_tz::Tz, String> {
    tz_str
        .parse::<chrono_tz::Tz>()
        .map_err(|_| format!("Invalid timezone: {}", tz_str))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        qweather_api_host: "api.example.com".to_string(),
        qweather_location_id: "101060110".to_string(),
        qweather_jwt_kid: "TESTKID".to_string(),
        qweather_jwt_sub: "TESTSUB".to_string(),
        qweather_jwt_private_key_path: PathBuf::from("/nonexistent/key.pem"),
        use_mock: false,
        city: "朝阳区".to_string(),
        cache_file: PathBuf::from("./yesterday.json"),
        app_timezone: "Asia/Shanghai".to_string(),
        port: 3456,
        upstream_timeout_secs: 5,
    }
}
