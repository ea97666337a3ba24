//! Image catalog / generation service (spec.md §1 excluded collaborator):
//! a pure function `(mood, genre, region, forceGenerate, prompt?) -> url|null`.
//!
//! Treated as a black box here: the real implementation is an external
//! service this engine calls over HTTP, so only the port and its failure
//! mode (swallowed to `None`, per spec.md §4.7.6) belong to this core.

use async_trait::async_trait;

use taleforge_domain::{Genre, Mood, Region};

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn background_for(
        &self,
        mood: Mood,
        genre: Genre,
        region: Region,
        force_generate: bool,
        prompt: Option<&str>,
    ) -> Option<String>;
}

/// Real implementation: calls the external catalog/generation service over
/// HTTP. Any failure (network, non-2xx, malformed body) is swallowed to
/// `None` rather than propagated, per the theme handler's contract.
pub struct HttpImageService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpImageService {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(serde::Serialize)]
struct CatalogRequest<'a> {
    mood: &'a str,
    genre: &'a str,
    region: &'a str,
    force_generate: bool,
    prompt: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct CatalogResponse {
    url: Option<String>,
}

#[async_trait]
impl ImageService for HttpImageService {
    async fn background_for(
        &self,
        mood: Mood,
        genre: Genre,
        region: Region,
        force_generate: bool,
        prompt: Option<&str>,
    ) -> Option<String> {
        let request = CatalogRequest {
            mood: &mood.to_string(),
            genre: &genre.to_string(),
            region: &region.to_string(),
            force_generate,
            prompt,
        };

        let response = self
            .client
            .post(format!("{}/v1/backgrounds", self.base_url))
            .json(&request)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        response.json::<CatalogResponse>().await.ok()?.url
    }
}

/// Deterministic stand-in for tests and `MOCK_SDK=true`: returns a
/// synthetic URL built from the request unless configured to fail.
pub struct MockImageService {
    pub should_fail: bool,
}

impl MockImageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn failing() -> Self {
        Self { should_fail: true }
    }
}

impl Default for MockImageService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageService {
    async fn background_for(
        &self,
        mood: Mood,
        genre: Genre,
        region: Region,
        _force_generate: bool,
        _prompt: Option<&str>,
    ) -> Option<String> {
        if self.should_fail {
            return None;
        }
        Some(format!("https://backgrounds.example/{mood}-{genre}-{region}.png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_image_service_produces_deterministic_url() {
        let service = MockImageService::new();
        let url = service
            .background_for(Mood::Ominous, Genre::HighFantasy, Region::Forest, false, None)
            .await;
        assert_eq!(url.unwrap(), "https://backgrounds.example/ominous-high-fantasy-forest.png");
    }

    #[tokio::test]
    async fn failing_mock_returns_none() {
        let service = MockImageService::failing();
        let url = service
            .background_for(Mood::Calm, Genre::Modern, Region::City, false, None)
            .await;
        assert!(url.is_none());
    }
}
