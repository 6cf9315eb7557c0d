use std::{convert::Infallible, sync::Arc};

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response, Sse, sse::Event},
};
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::{
    auth::extract_credential,
    dto::{ChatCompletionRequest, ModelObject, ModelsListResponse},
    error::AppError,
};
use crate::engine::ImageCompletionEngine;
use crate::runtime::SUPPORTED_MODELS;

/// `POST /v1/chat/completions`. Dispatches on `stream`: either one JSON
/// completion object, or an SSE stream whose records come straight off the
/// engine's channel.
pub async fn chat_completions(
    headers: HeaderMap,
    State(engine): State<Arc<ImageCompletionEngine>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, AppError> {
    let credential = extract_credential(&headers).map_err(AppError::BadRequest)?;
    if request.stream.unwrap_or(false) {
        let rx = engine.create_completion_stream(&request, &credential).await?;
        let stream = ReceiverStream::new(rx)
            .map(|payload| Ok::<_, Infallible>(Event::default().data(payload)));
        Ok(Sse::new(stream).into_response())
    } else {
        let response = engine.create_completion(&request, &credential).await?;
        Ok(Json(response).into_response())
    }
}

/// `GET /v1/models`. Informational only; base names are not validated
/// against this list on the completion path.
pub async fn models_list() -> Json<ModelsListResponse> {
    Json(ModelsListResponse {
        object: "list".to_string(),
        data: SUPPORTED_MODELS
            .iter()
            .map(|id| ModelObject {
                id: id.to_string(),
                object: "model".to_string(),
                owned_by: "imagegen".to_string(),
            })
            .collect(),
    })
}
