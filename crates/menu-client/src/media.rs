use crate::api::ApiClient;
use crate::cache::BoundedCache;
use crate::config::CacheSettings;
use crate::error::{ClientError, ClientResult};
use futures::future::join_all;
use menu_proto::MenuDocument;
use reqwest::StatusCode;
use std::collections::HashMap;
use tracing::debug;

/// Shown instead of an item image that failed to load.
pub const PLACEHOLDER_IMAGE: &str = "/fallback-image.png";
/// Shown instead of a restaurant logo that failed to load.
pub const PLACEHOLDER_LOGO: &str = "/fallback-logo.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Available,
    Absent,
}

/// Checks media URLs with `HEAD` and remembers the answer per URL.
pub struct MediaProbe {
    api: ApiClient,
    cache: BoundedCache<String, MediaStatus>,
}

impl MediaProbe {
    pub fn new(api: ApiClient, settings: &CacheSettings) -> Self {
        Self {
            api,
            cache: BoundedCache::new(settings.media_capacity, settings.media_ttl()),
        }
    }

    pub fn cached(&self, url: &str) -> Option<MediaStatus> {
        self.cache.get(&url.to_string())
    }

    /// Never fails: any error while probing means the media is absent.
    pub async fn probe(&self, url: &str) -> MediaStatus {
        if let Some(status) = self.cached(url) {
            return status;
        }
        let status = match self.request(url).await {
            Ok(true) => MediaStatus::Available,
            Ok(false) => MediaStatus::Absent,
            Err(e) => {
                debug!(url, error = %e, "Media probe failed");
                MediaStatus::Absent
            }
        };
        self.cache.insert(url.to_string(), status);
        status
    }

    /// Probes the logo and every item's media concurrently.
    pub async fn probe_document(&self, document: &MenuDocument) -> HashMap<String, MediaStatus> {
        let mut urls: Vec<&str> = document
            .items()
            .filter_map(|item| item.media_url.as_deref())
            .collect();
        if let Some(logo) = document.logo_url.as_deref() {
            urls.push(logo);
        }
        urls.sort_unstable();
        urls.dedup();

        let statuses = join_all(urls.iter().map(|url| self.probe(url))).await;
        urls.into_iter()
            .map(str::to_string)
            .zip(statuses)
            .collect()
    }

    /// Absolute URL to render, or `MediaUnavailable` once a probe found
    /// nothing there. URLs not probed yet are assumed present.
    pub fn resolve(&self, url: &str) -> ClientResult<String> {
        match self.cached(url) {
            Some(MediaStatus::Absent) => Err(ClientError::MediaUnavailable {
                url: url.to_string(),
            }),
            _ => Ok(self.api.resolve_url(url)),
        }
    }

    /// What a viewer should display for `url` given what is known so far.
    pub fn display_url(&self, url: Option<&str>, placeholder: &str) -> String {
        url.and_then(|url| self.resolve(url).ok())
            .unwrap_or_else(|| self.api.resolve_url(placeholder))
    }

    async fn request(&self, url: &str) -> ClientResult<bool> {
        let resolved = self.api.resolve_url(url);
        let response = self.api.http().head(&resolved).send().await?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            let response = self.api.http().get(&resolved).send().await?;
            return Ok(response.status().is_success());
        }
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiSettings;
    use crate::session::MemorySessionStore;
    use menu_proto::{MenuItem, Price};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_for(server: &MockServer) -> MediaProbe {
        let api = ApiClient::new(
            &ApiSettings {
                base_url: server.uri(),
                timeout_ms: 2000,
            },
            Arc::new(MemorySessionStore::new()),
        )
        .unwrap();
        MediaProbe::new(
            api,
            &CacheSettings {
                media_capacity: 16,
                media_ttl_secs: 60,
            },
        )
    }

    #[tokio::test]
    async fn test_probe_caches_by_url() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/uploads/flan.png"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let probe = probe_for(&server).await;
        assert_eq!(probe.probe("/uploads/flan.png").await, MediaStatus::Available);
        assert_eq!(probe.probe("/uploads/flan.png").await, MediaStatus::Available);
        assert_eq!(probe.cached("/uploads/flan.png"), Some(MediaStatus::Available));
    }

    #[tokio::test]
    async fn test_missing_media_uses_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/uploads/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let probe = probe_for(&server).await;
        let mut doc = MenuDocument::new("r1", "Casa");
        doc.add_item(
            MenuItem::new("Flan", Price::from_cents(400), "Postres").with_media("/uploads/gone.png"),
        )
        .unwrap();

        let statuses = probe.probe_document(&doc).await;
        assert_eq!(statuses["/uploads/gone.png"], MediaStatus::Absent);
        assert_eq!(
            probe.display_url(Some("/uploads/gone.png"), PLACEHOLDER_IMAGE),
            format!("{}{}", server.uri(), PLACEHOLDER_IMAGE)
        );
        assert_eq!(
            probe.resolve("/uploads/gone.png"),
            Err(ClientError::MediaUnavailable {
                url: "/uploads/gone.png".into()
            })
        );
        assert_eq!(
            probe.resolve("/uploads/unseen.png"),
            Ok(format!("{}/uploads/unseen.png", server.uri()))
        );
    }
}
