//! Raw backend records and their validated conversion into the model.
//!
//! Everything the backend sends is deserialized into a `Raw*` record first.
//! `validate()` then checks the record field by field and either yields the
//! model type or a [`SchemaError`] naming every offending field.

use crate::error::FieldErrors;
use crate::{
    Color, MenuDocument, MenuItem, Palette, Price, RestaurantId, SchemaError, Session,
    Template, UserProfile,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ids arrive as strings or numbers depending on the backend table.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPalette {
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

impl RawPalette {
    pub fn validate(&self, path: &str) -> Result<Palette, SchemaError> {
        let mut errors = FieldErrors::default();
        let mut color = |field: &str, raw: &Option<String>| match raw.as_deref() {
            Some(raw) => match Color::parse(raw) {
                Ok(c) => Some(c),
                Err(e) => {
                    for f in e.fields {
                        errors.push(format!("{path}.{field}"), f.message);
                    }
                    None
                }
            },
            None => {
                errors.push(format!("{path}.{field}"), "missing");
                None
            }
        };
        let primary = color("primary", &self.primary);
        let secondary = color("secondary", &self.secondary);
        match (primary, secondary) {
            (Some(primary), Some(secondary)) => Ok(Palette { primary, secondary }),
            _ => Err(errors.into_error()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
}

impl RawItem {
    /// `category_override` is used for template layouts where the section
    /// key is implied by where the item sits.
    pub fn validate(
        &self,
        path: &str,
        category_override: Option<&str>,
    ) -> Result<MenuItem, SchemaError> {
        let mut errors = FieldErrors::default();

        let name = non_empty(self.name.clone());
        if name.is_none() {
            errors.push(format!("{path}.name"), "missing or empty");
        }

        let price = match self.price.as_ref() {
            Some(raw) => match Price::try_from(raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    errors.push(format!("{path}.price"), e.to_string());
                    None
                }
            },
            None => {
                errors.push(format!("{path}.price"), "missing");
                None
            }
        };

        let category = category_override
            .map(str::to_string)
            .or_else(|| non_empty(self.category.clone()));
        if category.is_none() {
            errors.push(format!("{path}.category"), "missing or empty");
        }

        match (name, price, category) {
            (Some(name), Some(price), Some(category)) => Ok(MenuItem {
                id: self.id.as_ref().and_then(id_string),
                name,
                price,
                description: non_empty(self.description.clone()),
                category,
                media_url: non_empty(self.image_url.clone()),
            }),
            _ => Err(errors.into_error()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRestaurant {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub colors: Option<RawPalette>,
    #[serde(default, alias = "logo")]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub sections: Option<IndexMap<String, Value>>,
    #[serde(default)]
    pub plan_id: Option<Value>,
    #[serde(default)]
    pub template_id: Option<Value>,
}

/// `GET /menu/{id}` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMenuResponse {
    #[serde(default)]
    pub restaurant: Option<RawRestaurant>,
    #[serde(default)]
    pub items: Vec<RawItem>,
}

impl RawMenuResponse {
    /// Builds the document for `restaurant_id`.
    ///
    /// A missing palette or section layout falls back to the product
    /// defaults a new restaurant starts with; everything else is strict.
    pub fn validate(&self, restaurant_id: &str) -> Result<MenuDocument, SchemaError> {
        let mut errors = FieldErrors::default();
        let Some(restaurant) = self.restaurant.as_ref() else {
            return Err(SchemaError::single("restaurant", "missing"));
        };

        let name = non_empty(restaurant.name.clone());
        if name.is_none() {
            errors.push("restaurant.name", "missing or empty");
        }

        let palette = match restaurant.colors.as_ref() {
            Some(raw) => match raw.validate("restaurant.colors") {
                Ok(p) => p,
                Err(e) => {
                    errors.extend(e);
                    Palette::default()
                }
            },
            None => Palette::default(),
        };

        let mut sections: IndexMap<String, Vec<MenuItem>> = match restaurant.sections.as_ref() {
            Some(raw) => {
                let mut sections = IndexMap::with_capacity(raw.len());
                for key in raw.keys() {
                    let key = key.trim();
                    if key.is_empty() {
                        errors.push("restaurant.sections", "empty section name");
                        continue;
                    }
                    sections.insert(key.to_string(), Vec::new());
                }
                sections
            }
            None => MenuDocument::new(restaurant_id, "").sections,
        };

        for (i, raw) in self.items.iter().enumerate() {
            let path = format!("items[{i}]");
            match raw.validate(&path, None) {
                Ok(item) => match sections.get_mut(&item.category) {
                    Some(bucket) => bucket.push(item),
                    None => errors.push(
                        format!("{path}.category"),
                        format!("unknown section {:?}", item.category),
                    ),
                },
                Err(e) => errors.extend(e),
            }
        }

        errors.finish(MenuDocument {
            restaurant_id: restaurant_id.to_string(),
            name: name.unwrap_or_default(),
            palette,
            logo_url: non_empty(restaurant.logo_url.clone()),
            template_id: restaurant.template_id.as_ref().and_then(id_string),
            plan_id: restaurant.plan_id.as_ref().and_then(id_string),
            sections,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTemplate {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub default_colors: Option<RawPalette>,
    #[serde(default)]
    pub fields: Option<IndexMap<String, Value>>,
}

impl RawTemplate {
    pub fn validate(&self, path: &str) -> Result<Template, SchemaError> {
        let mut errors = FieldErrors::default();

        let id = self.id.as_ref().and_then(id_string);
        if id.is_none() {
            errors.push(format!("{path}.id"), "missing");
        }
        let name = non_empty(self.name.clone());
        if name.is_none() {
            errors.push(format!("{path}.name"), "missing or empty");
        }
        let default_palette = match self.default_colors.as_ref() {
            Some(raw) => raw
                .validate(&format!("{path}.default_colors"))
                .unwrap_or_else(|e| {
                    errors.extend(e);
                    Palette::default()
                }),
            None => Palette::default(),
        };

        let mut sections = IndexMap::new();
        for (key, value) in self.fields.iter().flatten() {
            let field_path = format!("{path}.fields.{key}");
            let mut items = Vec::new();
            match value {
                Value::Array(raw_items) => {
                    for (i, raw) in raw_items.iter().enumerate() {
                        let item_path = format!("{field_path}[{i}]");
                        let parsed = serde_json::from_value::<RawItem>(raw.clone())
                            .map_err(|e| SchemaError::single(&item_path, e.to_string()))
                            .and_then(|raw| raw.validate(&item_path, Some(key.as_str())));
                        match parsed {
                            Ok(item) => items.push(item),
                            Err(e) => errors.extend(e),
                        }
                    }
                }
                Value::Null => {}
                _ => errors.push(field_path, "expected a list of items"),
            }
            sections.insert(key.clone(), items);
        }

        errors.finish(Template {
            id: id.unwrap_or_default(),
            name: name.unwrap_or_default(),
            kind: non_empty(self.kind.clone()),
            default_palette,
            sections,
        })
    }
}

pub fn validate_templates(raw: &[RawTemplate]) -> Result<Vec<Template>, SchemaError> {
    let mut errors = FieldErrors::default();
    let mut templates = Vec::with_capacity(raw.len());
    for (i, t) in raw.iter().enumerate() {
        match t.validate(&format!("templates[{i}]")) {
            Ok(t) => templates.push(t),
            Err(e) => errors.extend(e),
        }
    }
    errors.finish(templates)
}

/// `POST /auth/login` body.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl RawLoginResponse {
    pub fn validate(&self) -> Result<Session, SchemaError> {
        let token = non_empty(self.token.clone())
            .ok_or_else(|| SchemaError::single("token", "missing or empty"))?;
        let user = self
            .user
            .as_ref()
            .ok_or_else(|| SchemaError::single("user", "missing"))
            .and_then(validate_user)?;
        Ok(Session { token, user })
    }
}

pub fn validate_user(value: &Value) -> Result<UserProfile, SchemaError> {
    let mut normalized = value.clone();
    // Profile ids follow the same string-or-number rule as everything else.
    if let Some(obj) = normalized.as_object_mut() {
        for key in ["id", "restaurantId", "restaurant_id"] {
            if let Some(id) = obj.get(key).and_then(id_string) {
                obj.insert(key.to_string(), Value::String(id));
            }
        }
    }
    serde_json::from_value::<UserProfile>(normalized)
        .map_err(|e| SchemaError::single("user", e.to_string()))
}

/// Body of `PUT /restaurantes/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct RestaurantPayload {
    pub name: String,
    pub colors: Palette,
    pub logo: Option<String>,
    pub sections: IndexMap<String, Vec<Value>>,
    pub plan_id: Option<String>,
    pub template_id: Option<String>,
}

impl From<&MenuDocument> for RestaurantPayload {
    /// Items travel through the item endpoints, so sections carry only keys.
    fn from(doc: &MenuDocument) -> Self {
        Self {
            name: doc.name.clone(),
            colors: doc.palette.clone(),
            logo: doc.logo_url.clone(),
            sections: doc
                .sections
                .keys()
                .map(|k| (k.clone(), Vec::new()))
                .collect(),
            plan_id: doc.plan_id.clone(),
            template_id: doc.template_id.clone(),
        }
    }
}

/// Body of `POST /menu/{id}` and `PUT /menu/{id}/{itemId}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemPayload {
    pub name: String,
    pub price: Price,
    pub description: Option<String>,
    pub category: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

impl From<&MenuItem> for ItemPayload {
    fn from(item: &MenuItem) -> Self {
        Self {
            name: item.name.clone(),
            price: item.price,
            description: item.description.clone(),
            category: item.category.clone(),
            image_url: item.media_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUploadResponse {
    #[serde(default, rename = "logoUrl")]
    pub logo_url: Option<String>,
    #[serde(default, rename = "fileUrl")]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Server-reported errors: `{"error": "..."}` and/or field level `errors`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawErrorBody {
    #[serde(default, alias = "message")]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Option<Value>,
}

impl RawErrorBody {
    pub fn field_errors(&self) -> Vec<crate::FieldError> {
        let mut fields = Vec::new();
        match self.errors.as_ref() {
            Some(Value::Object(map)) => {
                for (field, message) in map {
                    let message = message
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| message.to_string());
                    fields.push(crate::FieldError::new(field.clone(), message));
                }
            }
            Some(Value::Array(list)) => {
                for entry in list {
                    let field = entry
                        .get("field")
                        .or_else(|| entry.get("path"))
                        .and_then(Value::as_str)
                        .unwrap_or("request");
                    let message = entry
                        .get("message")
                        .or_else(|| entry.get("msg"))
                        .and_then(Value::as_str)
                        .unwrap_or("invalid");
                    fields.push(crate::FieldError::new(field, message));
                }
            }
            _ => {}
        }
        if fields.is_empty() {
            if let Some(message) = self.error.as_deref() {
                fields.push(crate::FieldError::new("request", message));
            }
        }
        fields
    }
}

pub fn restaurant_id_of(value: &Value) -> Option<RestaurantId> {
    id_string(value)
}
