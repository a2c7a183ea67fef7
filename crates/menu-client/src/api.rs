//! HTTP client for the menu backend.
//!
//! Every call goes through [`ApiClient::send`], which attaches the bearer
//! token and maps failures onto [`ClientError`]. A 401 from any endpoint
//! clears the session store and publishes [`AuthState::SignedOut`].

use crate::config::ApiSettings;
use crate::error::{ClientError, ClientResult};
use crate::session::{AuthState, SessionStore};
use menu_proto::{
    validate_templates, validate_user, DashboardStats, ItemId, ItemPayload, LoginRequest, Plan,
    RawLoginResponse, RawMenuResponse, RawRestaurant, RawTemplate, RawUploadResponse,
    RegisterRequest, RestaurantPayload, SchemaError, Session, Template, UserProfile,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

pub const MAX_LOGO_BYTES: u64 = 5 * 1024 * 1024;
pub const MAX_MEDIA_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    origin: String,
    base: String,
    session: Arc<dyn SessionStore>,
    auth_tx: Arc<watch::Sender<AuthState>>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings, session: Arc<dyn SessionStore>) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("HTTP client: {e}")))?;

        let origin = settings.base_url.trim_end_matches('/').to_string();
        let (auth_tx, _) = watch::channel(AuthState::from_session(session.get().as_ref()));

        Ok(Self {
            http,
            base: format!("{origin}/api"),
            origin,
            session,
            auth_tx: Arc::new(auth_tx),
        })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    /// Startup hook: loads the persisted session and publishes it.
    pub fn rehydrate(&self) -> ClientResult<Option<Session>> {
        let session = self.session.rehydrate()?;
        self.auth_tx
            .send_replace(AuthState::from_session(session.as_ref()));
        Ok(session)
    }

    pub fn auth_state(&self) -> watch::Receiver<AuthState> {
        self.auth_tx.subscribe()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.get()
    }

    /// Server-relative media paths (`/uploads/...`) resolve against the origin.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.origin, url.trim_start_matches('/'))
        }
    }

    // --- Auth ---

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Session> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::ValidationFailed {
                fields: vec![menu_proto::FieldError::new(
                    "credentials",
                    "email and password are required",
                )],
            });
        }

        let req = self.http.post(self.url("/auth/login")).json(&LoginRequest {
            email: email.trim(),
            password,
        });
        let raw: RawLoginResponse = match self.send_json(req, "auth/login").await {
            Err(ClientError::AuthExpired) => {
                return Err(ClientError::ServerError {
                    status: 401,
                    message: "Invalid credentials".into(),
                })
            }
            other => other?,
        };
        let session = raw.validate()?;

        self.session.set(session.clone())?;
        self.auth_tx
            .send_replace(AuthState::SignedIn(session.user.clone()));
        info!(user = %session.user.email, "Signed in");
        Ok(session)
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, name: &str, email: &str, password: &str) -> ClientResult<()> {
        let req = self.http.post(self.url("/auth/register")).json(&RegisterRequest {
            name,
            email,
            password,
        });
        self.send(req, "auth/register").await?;
        info!(email, "Account registered");
        Ok(())
    }

    /// Checks the stored token. Returns the refreshed profile when the
    /// backend includes one.
    pub async fn verify(&self) -> ClientResult<Option<UserProfile>> {
        let req = self.http.get(self.url("/auth/verify"));
        let body: Value = self.send_json(req, "auth/verify").await?;
        let user = body.get("user").unwrap_or(&body);
        Ok(validate_user(user).ok())
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.session.clear()?;
        self.auth_tx.send_replace(AuthState::SignedOut);
        info!("Signed out");
        Ok(())
    }

    pub async fn update_plan(&self, plan: Plan) -> ClientResult<String> {
        let req = self
            .http
            .put(self.url("/auth/update-plan"))
            .json(&json!({ "plan": plan.as_str() }));
        let body: Value = self.send_json(req, "auth/update-plan").await?;
        Ok(body
            .get("plan")
            .and_then(Value::as_str)
            .unwrap_or(plan.as_str())
            .to_string())
    }

    // --- Restaurants & templates ---

    pub async fn templates(&self) -> ClientResult<Vec<Template>> {
        let req = self.http.get(self.url("/templates"));
        let raw: Vec<RawTemplate> = self.send_json(req, "templates").await?;
        Ok(validate_templates(&raw)?)
    }

    /// Restaurant configuration without items. The endpoint answers with a
    /// one-element list.
    pub async fn restaurant(&self, id: &str) -> ClientResult<menu_proto::MenuDocument> {
        let resource = format!("restaurantes/{id}");
        let req = self.http.get(self.url(&format!("/{resource}")));
        let rows: Vec<RawRestaurant> = self.send_json(req, &resource).await?;
        let restaurant = rows
            .into_iter()
            .next()
            .ok_or(ClientError::NotFound(resource))?;
        let raw = RawMenuResponse {
            restaurant: Some(restaurant),
            items: Vec::new(),
        };
        Ok(raw.validate(id)?)
    }

    pub async fn update_restaurant(&self, id: &str, payload: &RestaurantPayload) -> ClientResult<()> {
        let resource = format!("restaurantes/{id}");
        let req = self.http.put(self.url(&format!("/{resource}"))).json(payload);
        self.send(req, &resource).await?;
        Ok(())
    }

    pub async fn upload_logo(&self, id: &str, file: &Path) -> ClientResult<String> {
        let mime = mime_guess::from_path(file).first_or_octet_stream();
        if !matches!(mime.essence_str(), "image/jpeg" | "image/png") {
            return Err(ClientError::Upload(format!(
                "logo must be a JPEG or PNG image, got {mime}"
            )));
        }
        let resource = format!("restaurantes/{id}/upload-logo");
        let form = self.multipart("logo", file, MAX_LOGO_BYTES).await?;
        let req = self.http.post(self.url(&format!("/{resource}"))).multipart(form);
        let body: RawUploadResponse = self.send_json(req, &resource).await?;
        body.logo_url
            .ok_or_else(|| SchemaError::single("logoUrl", "missing").into())
    }

    // --- Menu items ---

    pub async fn menu(&self, id: &str) -> ClientResult<RawMenuResponse> {
        let resource = format!("menu/{id}");
        let req = self.http.get(self.url(&format!("/{resource}")));
        self.send_json(req, &resource).await
    }

    /// Returns the id the backend assigned, when it echoes the created row.
    pub async fn create_item(&self, id: &str, item: &ItemPayload) -> ClientResult<Option<ItemId>> {
        let resource = format!("menu/{id}");
        let req = self.http.post(self.url(&format!("/{resource}"))).json(item);
        let bytes = self.send(req, &resource).await?.bytes().await?;
        // Some deployments answer 201 with an empty body.
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        let row = body.get("item").unwrap_or(&body);
        Ok(row.get("id").and_then(menu_proto::restaurant_id_of))
    }

    pub async fn update_item(&self, id: &str, item_id: &str, item: &ItemPayload) -> ClientResult<()> {
        let resource = format!("menu/{id}/{item_id}");
        let req = self.http.put(self.url(&format!("/{resource}"))).json(item);
        self.send(req, &resource).await?;
        Ok(())
    }

    pub async fn delete_item(&self, id: &str, item_id: &str) -> ClientResult<()> {
        let resource = format!("menu/{id}/{item_id}");
        let req = self.http.delete(self.url(&format!("/{resource}")));
        self.send(req, &resource).await?;
        Ok(())
    }

    /// Item image or `.glb` model.
    pub async fn upload_media(&self, id: &str, file: &Path) -> ClientResult<String> {
        let resource = format!("menu/{id}/upload");
        let form = self.multipart("file", file, MAX_MEDIA_BYTES).await?;
        let req = self.http.post(self.url(&format!("/{resource}"))).multipart(form);
        let body: RawUploadResponse = self.send_json(req, &resource).await?;
        body.file_url
            .ok_or_else(|| SchemaError::single("fileUrl", "missing").into())
    }

    pub async fn dashboard_stats(&self) -> ClientResult<DashboardStats> {
        let req = self.http.get(self.url("/dashboard/stats"));
        self.send_json(req, "dashboard/stats").await
    }

    // --- Helpers ---

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn multipart(&self, field: &'static str, file: &Path, limit: u64) -> ClientResult<Form> {
        let meta = tokio::fs::metadata(file)
            .await
            .map_err(|e| ClientError::Upload(format!("{}: {e}", file.display())))?;
        if meta.len() > limit {
            return Err(ClientError::Upload(format!(
                "{} is {} bytes (max {limit})",
                file.display(),
                meta.len()
            )));
        }
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| ClientError::Upload(format!("{}: {e}", file.display())))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| field.to_string());
        let mime = mime_guess::from_path(file).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())
            .map_err(|e| ClientError::Upload(e.to_string()))?;
        Ok(Form::new().part(field, part))
    }

    async fn send(&self, req: RequestBuilder, resource: &str) -> ClientResult<Response> {
        let req = match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(resource, status = status.as_u16(), "Request ok");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ClientError::from_status(status, &body, resource);
        if err == ClientError::AuthExpired {
            self.expire_session();
        } else {
            warn!(resource, status = status.as_u16(), error = %err, "Request failed");
        }
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        resource: &str,
    ) -> ClientResult<T> {
        let bytes = self.send(req, resource).await?.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SchemaError::single(resource, e.to_string()).into())
    }

    fn expire_session(&self) {
        warn!("Session rejected by backend, signing out");
        if let Err(e) = self.session.clear() {
            warn!(error = %e, "Failed to clear session store");
        }
        self.auth_tx.send_replace(AuthState::SignedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> ApiSettings {
        ApiSettings {
            base_url: server.uri(),
            timeout_ms: 2000,
        }
    }

    fn signed_in() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_session(Session {
            token: "tok-1".into(),
            user: UserProfile {
                id: "1".into(),
                email: "ana@example.com".into(),
                name: None,
                role: Some(menu_proto::Role("oro".into())),
                restaurant_id: Some("7".into()),
            },
        }))
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"email": "ana@example.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-9",
                "user": {"id": 1, "email": "ana@example.com", "role": "plata", "restaurantId": 7}
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let api = ApiClient::new(&settings(&server), store.clone()).unwrap();
        let mut auth = api.auth_state();

        let session = api.login("ana@example.com", "pw").await.unwrap();
        assert_eq!(session.token, "tok-9");
        assert_eq!(store.token().as_deref(), Some("tok-9"));
        assert!(matches!(&*auth.borrow_and_update(), AuthState::SignedIn(u) if u.id == "1"));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dashboard/stats"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "expired"})))
            .mount(&server)
            .await;

        let store = signed_in();
        let api = ApiClient::new(&settings(&server), store.clone()).unwrap();
        let auth = api.auth_state();
        assert!(matches!(&*auth.borrow(), AuthState::SignedIn(_)));

        let err = api.dashboard_stats().await.unwrap_err();
        assert_eq!(err, ClientError::AuthExpired);
        assert_eq!(store.get(), None);
        assert_eq!(*auth.borrow(), AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_restaurant_empty_list_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/restaurantes/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let api = ApiClient::new(&settings(&server), signed_in()).unwrap();
        assert_eq!(
            api.restaurant("9").await.unwrap_err(),
            ClientError::NotFound("restaurantes/9".into())
        );
    }

    #[tokio::test]
    async fn test_stats_and_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dashboard/stats"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"totalPlatos": 12, "totalRestaurantes": 1})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/menu/7/3"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let api = ApiClient::new(&settings(&server), signed_in()).unwrap();
        let stats = api.dashboard_stats().await.unwrap();
        assert_eq!(stats.total_items, 12);

        assert_eq!(
            api.delete_item("7", "3").await.unwrap_err(),
            ClientError::ServerError {
                status: 500,
                message: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_maps_to_network_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/templates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(
            &ApiSettings {
                base_url: server.uri(),
                timeout_ms: 50,
            },
            signed_in(),
        )
        .unwrap();
        assert_eq!(api.templates().await.unwrap_err(), ClientError::NetworkTimeout);
    }

    #[tokio::test]
    async fn test_upload_rejects_before_sending() {
        let server = MockServer::start().await;
        let api = ApiClient::new(&settings(&server), signed_in()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let gif = dir.path().join("logo.gif");
        std::fs::write(&gif, b"GIF89a").unwrap();
        assert!(matches!(
            api.upload_logo("7", &gif).await,
            Err(ClientError::Upload(_))
        ));

        let big = dir.path().join("dish.glb");
        std::fs::write(&big, vec![0u8; (MAX_MEDIA_BYTES + 1) as usize]).unwrap();
        assert!(matches!(
            api.upload_media("7", &big).await,
            Err(ClientError::Upload(_))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_media_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/menu/7/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"fileUrl": "/uploads/dish.glb"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(&settings(&server), signed_in()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dish.glb");
        std::fs::write(&file, b"glTF").unwrap();

        assert_eq!(api.upload_media("7", &file).await.unwrap(), "/uploads/dish.glb");
        assert_eq!(
            api.resolve_url("/uploads/dish.glb"),
            format!("{}/uploads/dish.glb", server.uri())
        );
    }
}
