use crate::commands::{preview_options, Context};
use menu_client::media::{MediaStatus, PLACEHOLDER_IMAGE};
use menu_client::{
    ConnectionState, EventStreamTransport, MediaProbe, PushChannel, ReconnectPolicy,
    Subscription, Synchronizer,
};
use menu_preview::{HeadlessSurfaceFactory, PreviewHandle, PreviewStatus, Previewer};
use menu_proto::{MediaKind, MenuDocument, MenuItem};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Viewer state. Data comes from the synchronizer slot; the app never edits
/// the document.
pub struct App {
    pub should_quit: bool,
    pub restaurant_id: String,
    pub viewer_url: String,

    pub document: Option<Arc<MenuDocument>>,
    pub last_error: Option<String>,
    pub last_refresh: Option<String>,
    pub is_loading: bool,
    pub remote_refreshes: u64,

    // Navigation
    pub section_index: usize,
    pub item_index: usize,

    pub connection: ConnectionState,
    pub preview_status: Option<PreviewStatus>,
    /// Set when the selected item's model was probed and found missing.
    pub media_error: Option<String>,

    sync: Synchronizer,
    media: Arc<MediaProbe>,
    channel: Option<PushChannel>,
    invalidations: mpsc::UnboundedReceiver<()>,
    _subscription: Subscription,
    previewer: Previewer,
    preview: Option<PreviewHandle>,
    preview_url: Option<String>,
}

impl App {
    /// Wires the viewer: push channel (when configured) feeding the
    /// synchronizer, and an invalidation callback that wakes the UI loop.
    pub fn start(ctx: &Context, restaurant_id: String) -> anyhow::Result<Self> {
        let channel = if ctx.settings.push.enabled() {
            let transport = EventStreamTransport::new(
                ctx.settings.push.url.clone(),
                ReconnectPolicy::from(&ctx.settings.push).handshake_timeout,
                ctx.api.session_store().clone(),
            )?;
            let channel = PushChannel::spawn(
                Arc::new(transport),
                ReconnectPolicy::from(&ctx.settings.push),
            );
            ctx.sync.attach(&channel);
            Some(channel)
        } else {
            info!("Push URL not configured, live updates disabled");
            None
        };

        let previewer = Previewer::new(
            Arc::new(HeadlessSurfaceFactory::new()),
            preview_options(&ctx.settings.preview),
        )?;

        Ok(Self::new(
            ctx.settings.viewer.menu_url(&restaurant_id),
            restaurant_id,
            ctx.sync.clone(),
            ctx.media.clone(),
            channel,
            previewer,
        ))
    }

    fn new(
        viewer_url: String,
        restaurant_id: String,
        sync: Synchronizer,
        media: Arc<MediaProbe>,
        channel: Option<PushChannel>,
        previewer: Previewer,
    ) -> Self {
        let (tx, invalidations) = mpsc::unbounded_channel();
        let subscription = sync.on_invalidate(&restaurant_id, move |_, _| {
            let _ = tx.send(());
        });

        Self {
            should_quit: false,
            viewer_url,
            restaurant_id,
            document: None,
            last_error: None,
            last_refresh: None,
            is_loading: false,
            remote_refreshes: 0,
            section_index: 0,
            item_index: 0,
            connection: ConnectionState::Disconnected,
            preview_status: None,
            media_error: None,
            sync,
            media,
            channel,
            invalidations,
            _subscription: subscription,
            previewer,
            preview: None,
            preview_url: None,
        }
    }

    /// Manual reload (`r`).
    pub async fn reload(&mut self) {
        self.is_loading = true;
        if let Err(e) = self.sync.load(&self.restaurant_id).await {
            warn!(restaurant_id = %self.restaurant_id, error = %e, "Reload failed");
        }
        self.is_loading = false;
        self.apply_snapshot();
    }

    pub fn reconnect(&self) {
        if let Some(channel) = &self.channel {
            channel.restart();
        }
    }

    /// Per-frame bookkeeping: remote invalidations, connection and preview
    /// status.
    pub fn tick(&mut self) {
        let mut invalidated = false;
        while self.invalidations.try_recv().is_ok() {
            invalidated = true;
        }
        if invalidated {
            // The synchronizer already reloaded; only read the slot.
            self.remote_refreshes += 1;
            self.apply_snapshot();
        }

        if let Some(channel) = &self.channel {
            self.connection = channel.connection_state();
        }
        // Media probes settle in the background after a load.
        self.sync_preview();
    }

    fn apply_snapshot(&mut self) {
        let snapshot = self.sync.snapshot(&self.restaurant_id);
        self.last_error = snapshot.last_error.map(|e| e.to_string());
        if let Some(at) = snapshot.loaded_at {
            self.last_refresh = Some(at.format("%H:%M:%S").to_string());
        }
        if snapshot.document.is_some() {
            self.document = snapshot.document;
        }
        self.clamp_selection();
        self.sync_preview();
    }

    pub fn section_names(&self) -> Vec<String> {
        self.document
            .as_ref()
            .map(|doc| doc.sections.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn current_items(&self) -> &[MenuItem] {
        self.document
            .as_ref()
            .and_then(|doc| doc.sections.get_index(self.section_index))
            .map(|(_, items)| items.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_item(&self) -> Option<&MenuItem> {
        self.current_items().get(self.item_index)
    }

    /// Media line for the detail pane: the URL to show, or the placeholder
    /// when the probe found nothing there.
    pub fn media_display(&self, item: &MenuItem) -> Option<(String, Option<MediaStatus>)> {
        let url = item.media_url.as_deref()?;
        let status = self.media.cached(url);
        Some((self.media.display_url(Some(url), PLACEHOLDER_IMAGE), status))
    }

    // Navigation helpers
    pub fn next_section(&mut self) {
        let count = self.section_names().len();
        if count > 0 {
            self.section_index = (self.section_index + 1) % count;
            self.item_index = 0;
            self.sync_preview();
        }
    }

    pub fn prev_section(&mut self) {
        let count = self.section_names().len();
        if count > 0 {
            self.section_index = (self.section_index + count - 1) % count;
            self.item_index = 0;
            self.sync_preview();
        }
    }

    pub fn item_up(&mut self) {
        if self.item_index > 0 {
            self.item_index -= 1;
            self.sync_preview();
        }
    }

    pub fn item_down(&mut self) {
        if self.item_index < self.current_items().len().saturating_sub(1) {
            self.item_index += 1;
            self.sync_preview();
        }
    }

    fn clamp_selection(&mut self) {
        let sections = self.section_names().len();
        if self.section_index >= sections {
            self.section_index = sections.saturating_sub(1);
        }
        let items = self.current_items().len();
        if self.item_index >= items {
            self.item_index = items.saturating_sub(1);
        }
    }

    /// Keeps exactly one preview mounted, for the selected item when it has
    /// a reachable 3D model, and none otherwise.
    fn sync_preview(&mut self) {
        let model = self
            .selected_item()
            .and_then(|item| item.media_url.as_deref())
            .filter(|url| MediaKind::classify(url) == MediaKind::Model)
            .map(|url| self.media.resolve(url));
        let model_url = match model {
            Some(Err(e)) => {
                if self.media_error.is_none() {
                    warn!(error = %e, "Selected model is unavailable");
                }
                self.media_error = Some(e.to_string());
                None
            }
            other => {
                self.media_error = None;
                other.and_then(Result::ok)
            }
        };

        match model_url {
            Some(url) if self.preview_url.as_deref() == Some(url.as_str()) => {}
            Some(url) => {
                if let Some(handle) = &self.preview {
                    handle.set_model_url(&url);
                } else {
                    self.preview = Some(self.previewer.mount("item-detail", &url));
                }
                self.preview_url = Some(url);
            }
            None => {
                if let Some(handle) = self.preview.take() {
                    handle.unmount();
                }
                self.preview_url = None;
            }
        }
        self.preview_status = self.preview.as_ref().map(PreviewHandle::status);
    }

    /// Unmounts the preview, revokes callbacks, closes the push channel.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.preview.take() {
            handle.unmount();
        }
        self.preview_url = None;
        self.sync.shutdown();
        if let Some(channel) = self.channel.take() {
            channel.teardown().await;
        }
    }
}
