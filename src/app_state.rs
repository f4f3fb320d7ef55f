use sqlx::PgPool;
use std::sync::Arc;

use crate::services::queue::MatchQueue;
use crate::services::weather::WeatherClient;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<MatchQueue>,
    /// Absent when no weather feed is configured; pricing then assumes
    /// conditions are not extreme.
    pub weather: Option<Arc<WeatherClient>>,
}

impl AppState {
    pub fn new(db: PgPool, queue: MatchQueue, weather: Option<WeatherClient>) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            weather: weather.map(Arc::new),
        }
    }
}
