use crate::dtos::{FluxImageResponse, PromptResponse, QuestionPayload, UidRequest};
use crate::startup::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

/// Generate and store a fresh counting image for the user.
///
/// The question payload is not filled from the generated image yet; the
/// response carries empty placeholders the app knows how to render.
#[tracing::instrument(skip(state, body))]
pub async fn count_1(
    State(state): State<AppState>,
    body: Option<Json<UidRequest>>,
) -> Result<Json<QuestionPayload>, AppError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let question = state.pipeline.generate_question_image(request.uid()).await?;
    tracing::info!(
        uid = %request.uid(),
        index = question.image.index,
        "count_1 image generated"
    );

    Ok(Json(QuestionPayload::default()))
}

#[tracing::instrument(skip(state))]
pub async fn prompt_generation(
    State(state): State<AppState>,
) -> Result<Json<PromptResponse>, AppError> {
    let prompt = state.pipeline.generate_prompt().await?;
    Ok(Json(PromptResponse::from(prompt)))
}

/// Run the full pipeline and return the vision model's count.
#[tracing::instrument(skip(state, body))]
pub async fn flux_image(
    State(state): State<AppState>,
    body: Option<Json<UidRequest>>,
) -> Result<Json<FluxImageResponse>, AppError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let question = state.pipeline.generate_question_image(request.uid()).await?;

    Ok(Json(FluxImageResponse::from(question)))
}

/// Latest stored image for the user as `image/jpeg`.
#[tracing::instrument(skip(state, body))]
pub async fn get_image(
    State(state): State<AppState>,
    body: Option<Json<UidRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let jpeg = state.pipeline.latest_image_jpeg(request.uid()).await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}
