use crate::bounds::Aabb;
use crate::error::{PreviewError, PreviewResult};
use crate::glb;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// A model whose bounds have been read; vertex data is not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub url: String,
    pub bytes_len: u64,
    pub bounds: Aabb,
}

/// Fetches glTF/GLB models over HTTP(S) or from the local filesystem,
/// refusing anything above `max_bytes`.
#[derive(Clone)]
pub struct ModelLoader {
    http: Client,
    max_bytes: u64,
}

impl ModelLoader {
    pub fn new(max_bytes: u64, timeout: Duration) -> PreviewResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PreviewError::ModelLoadFailed(format!("HTTP client: {e}")))?;
        Ok(Self { http, max_bytes })
    }

    pub async fn load(&self, url: &str) -> PreviewResult<LoadedModel> {
        let bytes = if url.starts_with("http://") || url.starts_with("https://") {
            self.download(url).await?
        } else {
            self.read_file(url.strip_prefix("file://").unwrap_or(url)).await?
        };

        let bounds = glb::scene_bounds(&bytes)?;
        debug!(url, size = bytes.len(), ?bounds, "Model loaded");
        Ok(LoadedModel {
            url: url.to_string(),
            bytes_len: bytes.len() as u64,
            bounds,
        })
    }

    async fn download(&self, url: &str) -> PreviewResult<Bytes> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::ModelLoadFailed(format!(
                "{url} returned {status}"
            )));
        }
        if let Some(size) = response.content_length() {
            self.check_size(size)?;
        }

        // Content-Length may be absent or wrong; enforce the limit as bytes arrive.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            self.check_size((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }

    async fn read_file(&self, path: &str) -> PreviewResult<Bytes> {
        let path = Path::new(path);
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| PreviewError::ModelLoadFailed(format!("{}: {e}", path.display())))?;
        self.check_size(meta.len())?;
        Ok(Bytes::from(tokio::fs::read(path).await?))
    }

    fn check_size(&self, size: u64) -> PreviewResult<()> {
        if size > self.max_bytes {
            return Err(PreviewError::ModelTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glb::pack_glb;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = r#"{
        "scenes": [{"nodes": [0]}],
        "nodes": [{"mesh": 0}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "accessors": [{"min": [0, 0, 0], "max": [4, 2, 1]}]
    }"#;

    fn loader(max_bytes: u64) -> ModelLoader {
        ModelLoader::new(max_bytes, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_load_glb_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/dish.glb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(pack_glb(MODEL)))
            .mount(&server)
            .await;

        let url = format!("{}/models/dish.glb", server.uri());
        let model = loader(1024 * 1024).load(&url).await.unwrap();
        assert_eq!(model.url, url);
        assert_eq!(model.bounds, Aabb::new([0.0; 3], [4.0, 2.0, 1.0]));
    }

    #[tokio::test]
    async fn test_oversized_download_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let err = loader(1024).load(&server.uri()).await.unwrap_err();
        assert!(matches!(err, PreviewError::ModelTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_http_error_is_load_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = loader(1024).load(&server.uri()).await.unwrap_err();
        assert!(matches!(err, PreviewError::ModelLoadFailed(_)));
    }

    #[tokio::test]
    async fn test_load_local_gltf() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dish.gltf");
        std::fs::write(&file, MODEL).unwrap();

        let model = loader(1024 * 1024)
            .load(&format!("file://{}", file.display()))
            .await
            .unwrap();
        assert_eq!(model.bytes_len, MODEL.len() as u64);

        let missing = loader(1024).load("/no/such/model.glb").await.unwrap_err();
        assert!(matches!(missing, PreviewError::ModelLoadFailed(_)));
    }
}
