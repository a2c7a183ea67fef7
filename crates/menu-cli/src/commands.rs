use crate::{ConfigCommand, ItemCommand, SectionCommand, UploadCommand};
use anyhow::{anyhow, bail, Result};
use menu_client::config::PreviewSettings;
use menu_client::media::{MediaStatus, PLACEHOLDER_IMAGE, PLACEHOLDER_LOGO};
use menu_client::{
    ApiClient, FileSessionStore, HttpDocumentStore, MediaProbe, SessionStore, Settings,
    Synchronizer,
};
use menu_preview::{HeadlessSurfaceFactory, PreviewOptions, PreviewStatus, Previewer};
use menu_proto::{Color, MediaKind, MenuDocument, MenuItem, Plan, Price, Template};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything a command needs: settings, the API client with the persisted
/// session loaded, and a synchronizer over the HTTP document store.
pub struct Context {
    pub settings: Settings,
    pub api: ApiClient,
    pub media: Arc<MediaProbe>,
    pub sync: Synchronizer,
    restaurant: Option<String>,
}

impl Context {
    pub fn new(settings: Settings, restaurant: Option<String>) -> Result<Self> {
        let session: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::new(settings.session.path.clone()));
        let api = ApiClient::new(&settings.api, session)?;
        api.rehydrate()?;

        let media = Arc::new(MediaProbe::new(api.clone(), &settings.cache));
        let store = Arc::new(HttpDocumentStore::new(api.clone()));
        let sync = Synchronizer::new(store, Some(media.clone()));

        Ok(Self {
            settings,
            api,
            media,
            sync,
            restaurant,
        })
    }

    /// `--restaurant` wins; otherwise the signed-in account's restaurant.
    pub fn restaurant_id(&self) -> Result<String> {
        if let Some(id) = &self.restaurant {
            return Ok(id.clone());
        }
        self.api
            .current_session()
            .and_then(|s| s.user.restaurant_id)
            .ok_or_else(|| {
                anyhow!("No restaurant selected. Pass --restaurant or sign in with an account that owns one.")
            })
    }

    fn require_manager(&self) -> Result<()> {
        let Some(session) = self.api.current_session() else {
            bail!("Not signed in. Run `menu-cli login <email>` first.");
        };
        if let Some(role) = &session.user.role {
            if !role.can_manage_menu() {
                bail!("Role '{}' cannot edit menus. Upgrade the plan first.", role.0);
            }
        }
        Ok(())
    }

    /// Load, apply `edit` to a copy, save, and return the reloaded document.
    async fn edit<F>(&self, edit: F) -> Result<Arc<MenuDocument>>
    where
        F: FnOnce(&mut MenuDocument) -> Result<()>,
    {
        self.require_manager()?;
        let id = self.restaurant_id()?;
        let current = self.sync.load(&id).await?;
        let mut next = (*current).clone();
        edit(&mut next)?;
        Ok(self.sync.save_and_reload(&id, &next).await?)
    }
}

// --- Account ---

pub async fn login(ctx: &Context, email: &str, password: &str) -> Result<()> {
    let session = ctx.api.login(email, password).await?;
    println!("Signed in as {}", session.user.email);
    if let Some(id) = &session.user.restaurant_id {
        println!("Restaurant: {id}");
    }
    Ok(())
}

pub async fn register(ctx: &Context, name: &str, email: &str, password: &str) -> Result<()> {
    ctx.api.register(name, email, password).await?;
    println!("Account created for {email}. Sign in with `menu-cli login {email}`.");
    Ok(())
}

pub fn logout(ctx: &Context) -> Result<()> {
    ctx.api.logout()?;
    println!("Signed out.");
    Ok(())
}

pub async fn whoami(ctx: &Context) -> Result<()> {
    let Some(session) = ctx.api.current_session() else {
        println!("Not signed in.");
        return Ok(());
    };
    // A 401 here clears the stored session.
    let user = ctx.api.verify().await?.unwrap_or(session.user);
    println!("Email:      {}", user.email);
    if let Some(name) = &user.name {
        println!("Name:       {name}");
    }
    if let Some(role) = &user.role {
        println!("Role:       {}", role.0);
    }
    if let Some(id) = &user.restaurant_id {
        println!("Restaurant: {id}");
    }
    Ok(())
}

pub async fn plan(ctx: &Context, plan: Plan) -> Result<()> {
    let active = ctx.api.update_plan(plan).await?;
    println!("Plan is now {active}.");
    Ok(())
}

// --- Menu ---

pub async fn templates(ctx: &Context) -> Result<()> {
    let templates = ctx.api.templates().await?;
    if templates.is_empty() {
        println!("(No templates)");
    }
    for template in templates {
        let sections: Vec<&str> = template.sections.keys().map(String::as_str).collect();
        println!(
            "{:<10} {:<24} {} / {}  [{}]",
            template.id,
            template.name,
            template.default_palette.primary,
            template.default_palette.secondary,
            sections.join(", ")
        );
    }
    Ok(())
}

pub async fn show(ctx: &Context, json: bool) -> Result<()> {
    let id = ctx.restaurant_id()?;
    let document = ctx.sync.load(&id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&*document)?);
        return Ok(());
    }
    let media = ctx.media.probe_document(&document).await;
    print!("{}", render_document(&document, &media));
    Ok(())
}

pub async fn stats(ctx: &Context) -> Result<()> {
    let stats = ctx.api.dashboard_stats().await?;
    println!("Menu items:  {}", stats.total_items);
    println!("Restaurants: {}", stats.total_restaurants);
    Ok(())
}

pub async fn section(ctx: &Context, action: SectionCommand) -> Result<()> {
    let document = ctx
        .edit(|doc| {
            match &action {
                SectionCommand::Add { name } => doc.add_section(name)?,
                SectionCommand::Rename { old, new } => doc.rename_section(old, new)?,
                SectionCommand::Remove { name } => {
                    let dropped = doc.remove_section(name)?;
                    if !dropped.is_empty() {
                        info!(section = %name, items = dropped.len(), "Removing section with items");
                    }
                }
            }
            Ok(())
        })
        .await?;
    println!(
        "Sections: {}",
        document.section_names().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

pub async fn item(ctx: &Context, action: ItemCommand) -> Result<()> {
    let document = match action {
        ItemCommand::Add {
            section,
            name,
            price,
            description,
            media,
        } => {
            let mut item = MenuItem::new(name, price, section);
            item.description = description;
            item.media_url = media;
            ctx.edit(|doc| Ok(doc.add_item(item)?)).await?
        }
        ItemCommand::Update {
            id,
            name,
            price,
            description,
            media,
            section,
        } => {
            let changes = ItemChanges {
                name,
                price,
                description,
                media,
                section,
            };
            ctx.edit(|doc| apply_item_changes(doc, &id, changes)).await?
        }
        ItemCommand::Remove { id } => {
            ctx.edit(|doc| {
                doc.remove_item(&id)?;
                Ok(())
            })
            .await?
        }
    };
    println!("{} items in {}.", document.item_count(), document.name);
    Ok(())
}

pub async fn config(ctx: &Context, action: ConfigCommand) -> Result<()> {
    let ConfigCommand::Set {
        name,
        primary,
        secondary,
        template,
    } = action;

    let template = match template {
        Some(id) => Some(
            ctx.api
                .templates()
                .await?
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("Unknown template: {id}"))?,
        ),
        None => None,
    };
    let changes = ConfigChanges {
        name,
        primary,
        secondary,
        template,
    };
    let document = ctx.edit(|doc| apply_config_changes(doc, changes)).await?;
    println!(
        "{}: {} / {}",
        document.name, document.palette.primary, document.palette.secondary
    );
    Ok(())
}

pub async fn upload(ctx: &Context, target: UploadCommand) -> Result<()> {
    ctx.require_manager()?;
    let id = ctx.restaurant_id()?;
    match target {
        UploadCommand::Logo { file } => {
            let url = ctx.api.upload_logo(&id, &file).await?;
            ctx.edit(|doc| {
                doc.logo_url = Some(url.clone());
                Ok(())
            })
            .await?;
            println!("Logo uploaded: {}", ctx.api.resolve_url(&url));
        }
        UploadCommand::Media { file, item } => {
            let url = ctx.api.upload_media(&id, &file).await?;
            if let Some(item_id) = item {
                let changes = ItemChanges {
                    media: Some(url.clone()),
                    ..ItemChanges::default()
                };
                ctx.edit(|doc| apply_item_changes(doc, &item_id, changes))
                    .await?;
            }
            println!("Uploaded: {}", ctx.api.resolve_url(&url));
        }
    }
    Ok(())
}

pub fn qr(ctx: &Context) -> Result<()> {
    let id = ctx.restaurant_id()?;
    println!("{}", ctx.settings.viewer.menu_url(&id));
    Ok(())
}

pub async fn preview(ctx: &Context, url: &str) -> Result<()> {
    let url = if Path::new(url).exists() || url.starts_with("file://") {
        url.to_string()
    } else {
        ctx.api.resolve_url(url)
    };

    let factory = HeadlessSurfaceFactory::new();
    let options = preview_options(&ctx.settings.preview);
    let frame_interval = options.frame_interval;
    let previewer = Previewer::new(Arc::new(factory.clone()), options)?;

    let handle = previewer.mount("cli-preview", &url);
    match handle.wait_settled().await {
        PreviewStatus::Ready {
            bounds,
            normalization,
        } => {
            let framed = normalization.apply_bounds(&bounds);
            println!("Model:       {url}");
            println!("Bounds:      {:?} .. {:?}", bounds.min, bounds.max);
            println!("Scale:       {:.4}", normalization.scale);
            println!("Translation: {:?}", normalization.translation);
            println!("Framed size: {:.3}", framed.max_dimension());
            // Let the rotation loop run for a few frames.
            tokio::time::sleep(frame_interval * 10).await;
        }
        PreviewStatus::Failed(reason) => println!("Preview failed: {reason}"),
        other => println!("Preview ended early: {other:?}"),
    }

    let live = factory.ledger().snapshot();
    println!(
        "Mounted:     surfaces={} models={} animations={} frames={}",
        live.live_surfaces, live.live_models, live.live_animations, live.frames_rendered
    );
    handle.unmount();
    let after = factory.ledger().snapshot();
    println!(
        "Unmounted:   surfaces={} models={} animations={}",
        after.live_surfaces, after.live_models, after.live_animations
    );
    Ok(())
}

pub fn preview_options(settings: &PreviewSettings) -> PreviewOptions {
    PreviewOptions {
        target_size: settings.target_size,
        auto_rotate: settings.auto_rotate,
        rotation_step: settings.rotation_step,
        frame_interval: Duration::from_millis(settings.frame_interval_ms.max(1)),
        max_model_bytes: settings.max_model_bytes,
    }
}

// --- Pure helpers ---

#[derive(Debug, Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub price: Option<Price>,
    pub description: Option<String>,
    pub media: Option<String>,
    pub section: Option<String>,
}

/// Empty strings clear optional fields.
pub fn apply_item_changes(doc: &mut MenuDocument, id: &str, changes: ItemChanges) -> Result<()> {
    let mut item = doc
        .find_item(id)
        .cloned()
        .ok_or_else(|| anyhow!("Menu item not found: {id}"))?;
    if let Some(name) = changes.name {
        item.name = name;
    }
    if let Some(price) = changes.price {
        item.price = price;
    }
    if let Some(description) = changes.description {
        item.description = Some(description).filter(|d| !d.is_empty());
    }
    if let Some(media) = changes.media {
        item.media_url = Some(media).filter(|m| !m.is_empty());
    }
    if let Some(section) = changes.section {
        item.category = section;
    }
    doc.update_item(id, item)?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct ConfigChanges {
    pub name: Option<String>,
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub template: Option<Template>,
}

/// The template goes first so explicit colors override its palette.
pub fn apply_config_changes(doc: &mut MenuDocument, changes: ConfigChanges) -> Result<()> {
    if let Some(template) = &changes.template {
        doc.apply_template(template);
    }
    if let Some(name) = changes.name {
        if name.trim().is_empty() {
            bail!("Restaurant name must not be empty");
        }
        doc.name = name;
    }
    if let Some(primary) = changes.primary {
        doc.palette.primary = Color::parse(&primary)?;
    }
    if let Some(secondary) = changes.secondary {
        doc.palette.secondary = Color::parse(&secondary)?;
    }
    Ok(())
}

pub fn render_document(doc: &MenuDocument, media: &HashMap<String, MediaStatus>) -> String {
    let mut out = format!(
        "{} ({})  {} / {}\n",
        doc.name, doc.restaurant_id, doc.palette.primary, doc.palette.secondary
    );
    if let Some(template) = &doc.template_id {
        out.push_str(&format!("Template: {template}\n"));
    }
    if let Some(logo) = &doc.logo_url {
        match media.get(logo) {
            Some(MediaStatus::Absent) => {
                out.push_str(&format!("Logo: {logo} (missing, showing {PLACEHOLDER_LOGO})\n"))
            }
            _ => out.push_str(&format!("Logo: {logo}\n")),
        }
    }
    for (section, items) in &doc.sections {
        out.push_str(&format!("\n== {section} ==\n"));
        if items.is_empty() {
            out.push_str("  (empty)\n");
        }
        for item in items {
            let id = item.id.as_deref().unwrap_or("-");
            out.push_str(&format!("  [{id}] {:<28} {:>9}\n", item.name, item.price));
            if let Some(description) = &item.description {
                out.push_str(&format!("        {description}\n"));
            }
            if let Some(url) = &item.media_url {
                out.push_str(&format!("        {}\n", media_line(url, media.get(url))));
            }
        }
    }
    out
}

fn media_line(url: &str, status: Option<&MediaStatus>) -> String {
    let kind = match MediaKind::classify(url) {
        MediaKind::Model => "3D",
        MediaKind::Image => "image",
    };
    match status {
        Some(MediaStatus::Absent) => format!("{kind}: {url} (missing, showing {PLACEHOLDER_IMAGE})"),
        _ => format!("{kind}: {url}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> MenuDocument {
        let mut doc = MenuDocument::new("7", "La Esquina");
        let mut soup = MenuItem::new("Sopa", Price::from_cents(450), "Platos Principales");
        soup.id = Some("1".into());
        let mut flan = MenuItem::new("Flan", Price::from_cents(300), "Postres")
            .with_media("/uploads/flan.glb");
        flan.id = Some("2".into());
        doc.add_item(soup).unwrap();
        doc.add_item(flan).unwrap();
        doc
    }

    #[test]
    fn test_item_changes_move_and_clear() {
        let mut doc = document();
        let changes = ItemChanges {
            price: Some(Price::from_cents(500)),
            media: Some(String::new()),
            section: Some("Bebidas".into()),
            ..ItemChanges::default()
        };
        apply_item_changes(&mut doc, "2", changes).unwrap();

        let flan = doc.find_item("2").unwrap();
        assert_eq!(flan.category, "Bebidas");
        assert_eq!(flan.price, Price::from_cents(500));
        assert_eq!(flan.media_url, None);
        assert!(doc.sections["Postres"].is_empty());
        assert_eq!(doc.sections["Bebidas"].len(), 1);

        assert!(apply_item_changes(&mut doc, "99", ItemChanges::default()).is_err());
    }

    #[test]
    fn test_config_changes_override_template_palette() {
        let mut doc = document();
        let template = Template {
            id: "t1".into(),
            name: "Cafe".into(),
            kind: None,
            default_palette: Default::default(),
            sections: [("Cafés".to_string(), Vec::new())].into_iter().collect(),
        };
        let changes = ConfigChanges {
            name: Some("El Rincón".into()),
            primary: Some("#112233".into()),
            template: Some(template),
            ..ConfigChanges::default()
        };
        apply_config_changes(&mut doc, changes).unwrap();

        assert_eq!(doc.name, "El Rincón");
        assert_eq!(doc.template_id.as_deref(), Some("t1"));
        assert_eq!(doc.palette.primary.as_str(), "#112233");
        assert_eq!(
            doc.section_names().collect::<Vec<_>>(),
            vec!["Cafés", "Platos Principales", "Postres"]
        );
        assert_eq!(doc.item_count(), 2);

        let bad = ConfigChanges {
            secondary: Some("green".into()),
            ..ConfigChanges::default()
        };
        assert!(apply_config_changes(&mut doc, bad).is_err());
    }

    #[tokio::test]
    async fn test_template_switch_keeps_remote_items() {
        use menu_client::config::ApiSettings;
        use menu_client::{DocumentStore, MemorySessionStore};
        use serde_json::json;
        use wiremock::matchers::{method, path, path_regex};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/menu/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "restaurant": {"name": "La Esquina", "sections": {"Platos Principales": [], "Postres": []}},
                "items": [
                    {"id": 1, "name": "Sopa", "price": 4.5, "category": "Platos Principales"},
                    {"id": 2, "name": "Flan", "price": 3, "category": "Postres"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/restaurantes/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;
        for verb in ["POST", "PUT", "DELETE"] {
            Mock::given(method(verb))
                .and(path_regex(r"^/api/menu/7(/.*)?$"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;
        }

        let api = ApiClient::new(
            &ApiSettings {
                base_url: server.uri(),
                timeout_ms: 2000,
            },
            Arc::new(MemorySessionStore::new()),
        )
        .unwrap();
        let store = HttpDocumentStore::new(api);
        let mut doc = store.fetch("7").await.unwrap();
        let changes = ConfigChanges {
            template: Some(Template {
                id: "t1".into(),
                name: "Cafe".into(),
                kind: None,
                default_palette: Default::default(),
                sections: [("Cafés".to_string(), Vec::new())].into_iter().collect(),
            }),
            ..ConfigChanges::default()
        };
        apply_config_changes(&mut doc, changes).unwrap();
        assert_eq!(doc.item_count(), 2);

        store.store("7", &doc).await.unwrap();
    }

    #[test]
    fn test_render_document_marks_missing_media() {
        let mut doc = document();
        doc.logo_url = Some("/uploads/logo.png".into());
        let media = HashMap::from([
            ("/uploads/flan.glb".to_string(), MediaStatus::Absent),
            ("/uploads/logo.png".to_string(), MediaStatus::Absent),
        ]);
        let text = render_document(&doc, &media);
        assert!(text.contains("Logo: /uploads/logo.png (missing, showing /fallback-logo.png)"));

        assert!(text.starts_with("La Esquina (7)"));
        assert!(text.contains("== Postres =="));
        assert!(text.contains("[1] Sopa"));
        assert!(text.contains("4.50"));
        assert!(text.contains("3D: /uploads/flan.glb (missing"));
        assert!(text.contains("== Bebidas ==\n  (empty)"));
    }

    #[test]
    fn test_preview_options_from_settings() {
        let settings = Settings::defaults().unwrap();
        let options = preview_options(&settings.preview);
        assert_eq!(options.target_size, 30.0);
        assert_eq!(options.frame_interval, Duration::from_millis(16));
        assert_eq!(options.max_model_bytes, 10 * 1024 * 1024);
    }
}
