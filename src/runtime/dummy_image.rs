use async_trait::async_trait;

use crate::runtime::{GenerationOptions, ImageGenRuntime, ReferenceOptions};

/// Offline stand-in for the image backend. Produces deterministic URLs so the
/// server and tests run without the external service.
pub struct DummyImageRuntime {
    images_per_prompt: usize,
}

impl DummyImageRuntime {
    pub fn new() -> Self {
        Self {
            images_per_prompt: 4,
        }
    }

    pub fn with_count(images_per_prompt: usize) -> Self {
        Self { images_per_prompt }
    }

    fn urls(&self, model: &str, width: u32, height: u32) -> Vec<String> {
        (0..self.images_per_prompt)
            .map(|i| format!("https://dummy-cdn.local/{}/{}x{}/{}.png", model, width, height, i))
            .collect()
    }
}

impl Default for DummyImageRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenRuntime for DummyImageRuntime {
    async fn generate_images(
        &self,
        model: &str,
        _prompt: &str,
        options: &GenerationOptions,
        _credential: &str,
    ) -> Result<Vec<String>, String> {
        Ok(self.urls(model, options.width, options.height))
    }

    async fn upload_reference_image(
        &self,
        blob: &[u8],
        _credential: &str,
    ) -> Result<String, String> {
        Ok(format!("dummy-ref-{}", blob.len()))
    }

    async fn generate_images_with_reference(
        &self,
        model: &str,
        _prompt: &str,
        _reference: &str,
        options: &ReferenceOptions,
        _credential: &str,
    ) -> Result<Vec<String>, String> {
        Ok(self.urls(model, options.width, options.height))
    }
}
