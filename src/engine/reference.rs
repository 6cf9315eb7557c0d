use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::engine::error::PipelineError;

// Leading image URL: scheme, no whitespace, one of the recognized raster
// extensions. Anchored so mid-text URLs stay part of the prompt.
static IMAGE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://\S+\.(?:jpg|jpeg|png|webp)").unwrap());

/// Outcome of scanning the trailing message for a visual reference. The URL
/// and fetched blob travel together or not at all.
#[derive(Debug, Clone)]
pub struct ReferenceParse {
    pub prompt: String,
    pub image: Option<ReferenceImage>,
}

#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub url: String,
    pub blob: Vec<u8>,
}

/// Generic HTTP GET collaborator behind the extractor.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// `reqwest`-backed fetcher used by the server.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {status}"));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("body read failed: {e}"))?;
        Ok(body.to_vec())
    }
}

/// Splits a leading image URL off `text` and fetches its bytes. Without a
/// leading URL the original text comes back untouched and no fetch is issued.
pub async fn extract_reference(
    text: &str,
    fetcher: &dyn RemoteFetcher,
) -> Result<ReferenceParse, PipelineError> {
    let Some(m) = IMAGE_URL_RE.find(text) else {
        return Ok(ReferenceParse {
            prompt: text.to_string(),
            image: None,
        });
    };
    let url = m.as_str().to_string();
    let prompt = text[m.end()..].trim().to_string();
    debug!(url = %url, "fetching reference image");
    let blob = fetcher
        .fetch(&url)
        .await
        .map_err(|reason| PipelineError::RemoteResource {
            url: url.clone(),
            reason,
        })?;
    Ok(ReferenceParse {
        prompt,
        image: Some(ReferenceImage { url, blob }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingFetcher {
        calls: Mutex<Vec<String>>,
        response: Result<Vec<u8>, String>,
    }

    impl RecordingFetcher {
        fn returning(response: Result<Vec<u8>, String>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                response,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteFetcher for RecordingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
            self.calls.lock().unwrap().push(url.to_string());
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn plain_text_passes_through_without_fetching() {
        let fetcher = RecordingFetcher::returning(Ok(vec![]));
        let parsed = extract_reference("a cat in the rain", &fetcher).await.unwrap();
        assert_eq!(parsed.prompt, "a cat in the rain");
        assert!(parsed.image.is_none());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn mid_text_url_is_not_a_reference() {
        let text = "painted like https://example.com/ref.png please";
        let fetcher = RecordingFetcher::returning(Ok(vec![]));
        let parsed = extract_reference(text, &fetcher).await.unwrap();
        assert_eq!(parsed.prompt, text);
        assert!(parsed.image.is_none());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn leading_url_is_stripped_and_fetched_once() {
        let fetcher = RecordingFetcher::returning(Ok(vec![1, 2, 3]));
        let parsed = extract_reference("https://example.com/ref.png  a cat ", &fetcher)
            .await
            .unwrap();
        assert_eq!(parsed.prompt, "a cat");
        let image = parsed.image.unwrap();
        assert_eq!(image.url, "https://example.com/ref.png");
        assert_eq!(image.blob, vec![1, 2, 3]);
        assert_eq!(fetcher.calls(), vec!["https://example.com/ref.png".to_string()]);
    }

    #[tokio::test]
    async fn extension_match_is_case_insensitive() {
        let fetcher = RecordingFetcher::returning(Ok(vec![0]));
        let parsed = extract_reference("HTTPS://example.com/REF.JPEG castle", &fetcher)
            .await
            .unwrap();
        assert_eq!(parsed.prompt, "castle");
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn url_only_input_leaves_an_empty_prompt() {
        let fetcher = RecordingFetcher::returning(Ok(vec![0]));
        let parsed = extract_reference("https://example.com/ref.webp", &fetcher)
            .await
            .unwrap();
        assert_eq!(parsed.prompt, "");
        assert!(parsed.image.is_some());
    }

    #[tokio::test]
    async fn failed_fetch_carries_the_offending_url() {
        let fetcher = RecordingFetcher::returning(Err("status 404 Not Found".to_string()));
        let err = extract_reference("https://example.com/gone.jpg a cat", &fetcher)
            .await
            .unwrap_err();
        match &err {
            PipelineError::RemoteResource { url, .. } => {
                assert_eq!(url, "https://example.com/gone.jpg");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("https://example.com/gone.jpg"));
    }
}
