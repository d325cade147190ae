use actix_web::{middleware, web, App, HttpServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod handlers;

use handlers::{health, predict};
use tripredict::data::{ArtifactSource, FsArtifactSource, ModelKind, ModelRepository};
use tripredict::models::DistanceCategory;
use tripredict::predictor::{EngineConfig, RacePredictor};

/// Application state shared across handlers
pub struct AppState {
    pub predictor: RacePredictor,
}

#[cfg(feature = "remote")]
fn remote_source() -> Option<Arc<dyn ArtifactSource>> {
    use tripredict::data::{HttpArtifactSource, HttpSourceConfig};

    let base_url = std::env::var("MODEL_BASE_URL").ok()?;
    match HttpArtifactSource::new(base_url, HttpSourceConfig::default()) {
        Ok(source) => Some(Arc::new(source)),
        Err(e) => {
            warn!("Remote artifact source unavailable: {}. Using MODEL_DIR.", e);
            None
        }
    }
}

#[cfg(not(feature = "remote"))]
fn remote_source() -> Option<Arc<dyn ArtifactSource>> {
    None
}

fn artifact_source() -> Arc<dyn ArtifactSource> {
    if let Some(source) = remote_source() {
        return source;
    }

    let model_dir = std::env::var("MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("artifacts"));
    Arc::new(FsArtifactSource::new(model_dir))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{}:{}", host, port);

    let source = artifact_source();
    info!("Loading artifacts from {}", source.describe());
    let repository = Arc::new(ModelRepository::new(source));

    // Warm the cache; a missing artifact is reported per request, not fatal here
    for distance in DistanceCategory::ALL {
        match repository.preload(distance) {
            Ok(()) => info!("Artifacts for {} ready", distance),
            Err(e) => warn!("Artifacts for {} incomplete: {}", distance, e),
        }
    }
    info!(
        "{} of {} ensembles cached",
        repository.cached_ensembles(),
        ModelKind::ALL.len() * DistanceCategory::ALL.len()
    );

    let predictor = RacePredictor::new(repository, EngineConfig::default())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let app_state = Arc::new(AppState { predictor });

    info!("Starting Tripredict API server at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/predict", web::post().to(predict::predict_race))
            .route("/tier", web::post().to(predict::classify_tier))
    })
    .bind(&addr)?
    .run()
    .await
}
