use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod clock;
mod config;
mod reshape;
mod routes;
mod utils;
mod weather;

use cache::FileDailyStore;
use clock::{Clock, SystemClock};
use config::{parse_timezone, Config};
use reshape::WeatherReshaper;
use routes::{create_router, AppState};
use weather::{auth::TokenSigner, mock::MockWeatherClient, qweather::QWeatherClient, WeatherSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_relay_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(parse_timezone(&config.app_timezone)?));

    let weather = if config.use_mock {
        tracing::warn!("QWEATHER_MOCK set, serving synthetic weather");
        WeatherSource::Mock(MockWeatherClient::new(clock.clone(), config.city.clone()))
    } else {
        let signer = TokenSigner::from_config(&config, clock.clone()).await?;
        WeatherSource::QWeather(QWeatherClient::new(&config, signer)?)
    };

    let store = FileDailyStore::new(config.cache_file.clone());
    tracing::info!("Daily cache at {:?}", store.path());
    let reshaper = Arc::new(WeatherReshaper::new(store, clock));

    let addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        config: Arc::new(config),
        weather: Arc::new(weather),
        reshaper,
    };

    let app = create_router(state)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server starting on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
