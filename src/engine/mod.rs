use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::{
    api::dto::{
        ChatCompletionChoice, ChatCompletionChunk, ChatCompletionChunkChoice,
        ChatCompletionRequest, ChatCompletionResponse, Delta, ResponseMessage, Usage,
    },
    runtime::{GenerationOptions, ImageGenRuntime, ReferenceOptions, dummy_image::DummyImageRuntime},
};

pub mod error;
pub mod model_id;
pub mod reference;

pub use error::PipelineError;

use model_id::ModelSpec;
use reference::{HttpFetcher, ReferenceParse, RemoteFetcher, extract_reference};

/// Payload of the terminal sentinel record; every stream ends with it.
pub const DONE_PAYLOAD: &str = "[DONE]";

const STREAM_BUFFER: usize = 100;
const ANNOUNCEMENT_TEXT: &str = "Generating images, please wait...\n";
const COMPLETED_TEXT: &str = "Image generation finished.";

/// Retry bounds for the whole pipeline, data-driven. The observed production
/// configuration disables retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Reads `MAX_RETRY_COUNT` and `RETRY_DELAY_MS` from the environment,
    /// defaulting to 0 retries and 5000 ms.
    pub fn from_env() -> Self {
        let max_retries = std::env::var("MAX_RETRY_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let delay_ms = std::env::var("RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000);
        Self {
            max_retries,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// Adapts chat-completion requests onto the image-generation backend: the
/// last message's text becomes the prompt (optionally led by a reference
/// image URL), and generated image URLs come back as markdown in assistant
/// content.
pub struct ImageCompletionEngine {
    runtime: Arc<dyn ImageGenRuntime>,
    fetcher: Arc<dyn RemoteFetcher>,
    retry: RetryPolicy,
}

impl ImageCompletionEngine {
    /// Engine wired for standalone use: dummy backend, live HTTP fetcher,
    /// retry bounds from the environment.
    pub fn new() -> Self {
        Self::with_components(
            Arc::new(DummyImageRuntime::new()),
            Arc::new(HttpFetcher::new()),
            RetryPolicy::from_env(),
        )
    }

    pub fn with_components(
        runtime: Arc<dyn ImageGenRuntime>,
        fetcher: Arc<dyn RemoteFetcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            runtime,
            fetcher,
            retry,
        }
    }

    /// Runs the pipeline once per retry attempt and returns a single
    /// completion object.
    #[instrument(skip(self, request, credential), fields(model = %request.model))]
    pub async fn create_completion(
        &self,
        request: &ChatCompletionRequest,
        credential: &str,
    ) -> Result<ChatCompletionResponse, PipelineError> {
        counter!("requests_total", 1, "endpoint" => "chat");
        let start = Instant::now();
        let result = self
            .with_retries("chat.completion", || self.completion_once(request, credential))
            .await;
        histogram!(
            "request_latency_ms",
            start.elapsed().as_millis() as f64,
            "endpoint" => "chat"
        );
        result
    }

    /// Returns a receiver of stream records and fills it from a spawned
    /// producer task. Once the receiver is handed back, every failure is
    /// rendered into the stream itself; the channel never errors out.
    #[instrument(skip(self, request, credential), fields(model = %request.model))]
    pub async fn create_completion_stream(
        &self,
        request: &ChatCompletionRequest,
        credential: &str,
    ) -> Result<mpsc::Receiver<String>, PipelineError> {
        counter!("requests_total", 1, "endpoint" => "chat");
        self.with_retries("chat.completion.stream", || self.stream_once(request, credential))
            .await
    }

    /// Bounded retry loop around one pipeline attempt. Deterministic
    /// failures pass through the same policy; with `max_retries` 0 this is a
    /// pure pass-through.
    async fn with_retries<T, F, Fut>(&self, operation: &str, mut run: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match run().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retry.max_retries => {
                    warn!(%err, attempt, operation, "pipeline failed, retrying after delay");
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(%err, attempt, operation, "pipeline failed");
                    return Err(err);
                }
            }
        }
    }

    async fn completion_once(
        &self,
        request: &ChatCompletionRequest,
        credential: &str,
    ) -> Result<ChatCompletionResponse, PipelineError> {
        let Some(last) = request.messages.last() else {
            return Err(PipelineError::InvalidParams(
                "messages must not be empty".to_string(),
            ));
        };
        let spec = ModelSpec::parse(&request.model);
        let parsed = extract_reference(&last.content, self.fetcher.as_ref()).await?;
        let urls = dispatch_generation(self.runtime.as_ref(), &spec, &parsed, credential).await?;
        info!(model = %spec.model, images = urls.len(), "image generation complete");
        Ok(build_completion(&request.model, &spec, &urls))
    }

    async fn stream_once(
        &self,
        request: &ChatCompletionRequest,
        credential: &str,
    ) -> Result<mpsc::Receiver<String>, PipelineError> {
        let (tx, rx) = mpsc::channel::<String>(STREAM_BUFFER);
        let Some(last) = request.messages.last() else {
            warn!("empty message sequence, closing stream with the sentinel only");
            let _ = tx.try_send(DONE_PAYLOAD.to_string());
            return Ok(rx);
        };
        let spec = ModelSpec::parse(&request.model);
        let producer = StreamProducer {
            runtime: self.runtime.clone(),
            fetcher: self.fetcher.clone(),
            tx,
            id: unique_id(),
            model: echo_model(&request.model, &spec),
            created: unix_timestamp(),
            started: Instant::now(),
        };
        tokio::spawn(producer.run(spec, last.content.clone(), credential.to_string()));
        Ok(rx)
    }
}

/// Invokes exactly one generation strategy, chosen by reference presence.
async fn dispatch_generation(
    runtime: &dyn ImageGenRuntime,
    spec: &ModelSpec,
    parsed: &ReferenceParse,
    credential: &str,
) -> Result<Vec<String>, PipelineError> {
    match &parsed.image {
        Some(image) => {
            let handle = runtime
                .upload_reference_image(&image.blob, credential)
                .await
                .map_err(PipelineError::Generation)?;
            let options = ReferenceOptions::from_dimensions(spec.width, spec.height);
            runtime
                .generate_images_with_reference(
                    &spec.model,
                    &parsed.prompt,
                    &handle,
                    &options,
                    credential,
                )
                .await
                .map_err(PipelineError::Generation)
        }
        None => {
            let options = GenerationOptions {
                width: spec.width,
                height: spec.height,
            };
            runtime
                .generate_images(&spec.model, &parsed.prompt, &options, credential)
                .await
                .map_err(PipelineError::Generation)
        }
    }
}

/// Single producer behind one stream: announcement, then generation, then
/// result or error chunks, then the sentinel. Chunk `index` values are
/// strictly increasing; the sentinel is always the last record.
struct StreamProducer {
    runtime: Arc<dyn ImageGenRuntime>,
    fetcher: Arc<dyn RemoteFetcher>,
    tx: mpsc::Sender<String>,
    id: String,
    model: String,
    created: u64,
    started: Instant,
}

impl StreamProducer {
    async fn run(self, spec: ModelSpec, text: String, credential: String) {
        self.send_chunk(0, Some("assistant"), ANNOUNCEMENT_TEXT, None)
            .await;
        match self.generate(&spec, &text, &credential).await {
            Ok(urls) => {
                for (i, url) in urls.iter().enumerate() {
                    let finish = if i + 1 == urls.len() { Some("stop") } else { None };
                    self.send_chunk((i + 1) as u32, None, &format!("![image_{i}]({url})\n"), finish)
                        .await;
                }
                self.send_chunk(urls.len() as u32 + 1, None, COMPLETED_TEXT, Some("stop"))
                    .await;
            }
            Err(err) => {
                error!(%err, "stream pipeline failed after announcement");
                self.send_chunk(1, None, &err.to_string(), Some("stop")).await;
            }
        }
        let _ = self.tx.send(DONE_PAYLOAD.to_string()).await;
        histogram!(
            "request_latency_ms",
            self.started.elapsed().as_millis() as f64,
            "endpoint" => "chat"
        );
    }

    async fn generate(
        &self,
        spec: &ModelSpec,
        text: &str,
        credential: &str,
    ) -> Result<Vec<String>, PipelineError> {
        let parsed = extract_reference(text, self.fetcher.as_ref()).await?;
        dispatch_generation(self.runtime.as_ref(), spec, &parsed, credential).await
    }

    async fn send_chunk(
        &self,
        index: u32,
        role: Option<&str>,
        content: &str,
        finish_reason: Option<&str>,
    ) {
        let chunk = ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChatCompletionChunkChoice {
                index,
                delta: Delta {
                    role: role.map(str::to_string),
                    content: Some(content.to_string()),
                },
                finish_reason: finish_reason.map(str::to_string),
            }],
        };
        let _ = self.tx.send(serde_json::to_string(&chunk).unwrap()).await;
    }
}

fn unique_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// Caller-supplied identifier wins when non-empty; otherwise the parsed base
// name, which has already applied the default.
fn echo_model(requested: &str, spec: &ModelSpec) -> String {
    if requested.is_empty() {
        spec.model.clone()
    } else {
        requested.to_string()
    }
}

fn markdown_images(urls: &[String]) -> String {
    urls.iter()
        .enumerate()
        .map(|(i, url)| format!("![image_{i}]({url})\n"))
        .collect()
}

fn build_completion(
    requested_model: &str,
    spec: &ModelSpec,
    urls: &[String],
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: unique_id(),
        object: "chat.completion".to_string(),
        created: unix_timestamp(),
        model: echo_model(requested_model, spec),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: markdown_images(urls),
            },
            finish_reason: "stop".to_string(),
        }],
        // Fixed placeholder; the backend exposes no token accounting.
        usage: Usage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        },
    }
}
