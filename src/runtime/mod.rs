use async_trait::async_trait;

pub mod dummy_image;

/// Base model applied when the caller supplies no identifier.
pub const DEFAULT_MODEL: &str = "imagegen-2.1";

/// Base model identifiers the backend accepts, newest first.
pub const SUPPORTED_MODELS: &[&str] = &[
    "imagegen-2.1",
    "imagegen-2.0-pro",
    "imagegen-2.0",
    "imagegen-1.4",
    "imagegen-xl-pro",
];

/// Sampling diversity for reference-guided generation. Fixed; not exposed
/// per-request.
pub const SAMPLE_STRENGTH: f32 = 0.5;

/// Influence of the uploaded reference image on the result. Fixed; not
/// exposed per-request.
pub const REFERENCE_STRENGTH: f32 = 0.5;

/// Image-generation backend. Calls are opaque and potentially long-running;
/// error strings carry backend-defined text.
#[async_trait]
pub trait ImageGenRuntime: Send + Sync {
    async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
        credential: &str,
    ) -> Result<Vec<String>, String>;

    async fn upload_reference_image(
        &self,
        blob: &[u8],
        credential: &str,
    ) -> Result<String, String>;

    async fn generate_images_with_reference(
        &self,
        model: &str,
        prompt: &str,
        reference: &str,
        options: &ReferenceOptions,
        credential: &str,
    ) -> Result<Vec<String>, String>;
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ReferenceOptions {
    pub width: u32,
    pub height: u32,
    pub sample_strength: f32,
    pub reference_strength: f32,
}

impl ReferenceOptions {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sample_strength: SAMPLE_STRENGTH,
            reference_strength: REFERENCE_STRENGTH,
        }
    }
}
