use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::AppState;
use tripredict::error::{validate_user_input, AppError};
use tripredict::models::{Confidence, PredictRequest, PredictResponse, TierResponse, UserInput};
use tripredict::core::classify;

/// Predict a full race
pub async fn predict_race(
    state: web::Data<Arc<AppState>>,
    req: web::Json<PredictRequest>,
) -> Result<HttpResponse, AppError> {
    let PredictRequest { distance, input } = req.into_inner();
    validate_user_input(&input)?;

    // artifact loads may block on disk or network
    let state = Arc::clone(state.get_ref());
    let (prediction, validation) =
        web::block(move || state.predictor.predict_with_validation(&input, distance))
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))??;

    Ok(HttpResponse::Ok().json(PredictResponse {
        prediction,
        validation,
    }))
}

/// Classify an athlete profile without running any model
pub async fn classify_tier(req: web::Json<UserInput>) -> Result<HttpResponse, AppError> {
    validate_user_input(&req)?;

    let tier = classify(&req);
    Ok(HttpResponse::Ok().json(TierResponse {
        tier,
        confidence: Confidence::from_tier(tier),
    }))
}
