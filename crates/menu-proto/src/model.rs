use crate::price::Price;
use crate::SchemaError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RestaurantId = String;
pub type ItemId = String;

/// Sections every new restaurant starts with.
pub const DEFAULT_SECTIONS: [&str; 3] = ["Platos Principales", "Postres", "Bebidas"];

pub const DEFAULT_PRIMARY: &str = "#FF9800";
pub const DEFAULT_SECONDARY: &str = "#4CAF50";

/// Hex color, `#RGB` or `#RRGGBB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        let hex = raw
            .strip_prefix('#')
            .ok_or_else(|| SchemaError::single("color", format!("{raw:?} must start with '#'")))?;
        if !(hex.len() == 3 || hex.len() == 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SchemaError::single(
                "color",
                format!("{raw:?} is not a #RGB or #RRGGBB color"),
            ));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expands to 8-bit RGB channels.
    pub fn rgb(&self) -> (u8, u8, u8) {
        let hex = &self.0[1..];
        let channel = |s: &str| u8::from_str_radix(s, 16).unwrap_or(0);
        if hex.len() == 3 {
            let expand = |i: usize| {
                let c = &hex[i..i + 1];
                channel(&format!("{c}{c}"))
            };
            (expand(0), expand(1), expand(2))
        } else {
            (channel(&hex[0..2]), channel(&hex[2..4]), channel(&hex[4..6]))
        }
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Color::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub primary: Color,
    pub secondary: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            primary: Color(DEFAULT_PRIMARY.to_string()),
            secondary: Color(DEFAULT_SECONDARY.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Model,
}

impl MediaKind {
    /// 3D assets are recognised by extension, query string ignored.
    pub fn classify(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".glb") || path.ends_with(".gltf") {
            MediaKind::Model
        } else {
            MediaKind::Image
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Option<ItemId>,
    pub name: String,
    pub price: Price,
    pub description: Option<String>,
    pub category: String,
    pub media_url: Option<String>,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, price: Price, category: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            price,
            description: None,
            category: category.into(),
            media_url: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media_url.as_deref().map(MediaKind::classify)
    }
}

/// One tenant's menu: configuration plus items grouped by section.
///
/// Section order is display order. Every item's `category` equals the key of
/// the section holding it; the editing operations in [`crate::document`]
/// keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuDocument {
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub palette: Palette,
    pub logo_url: Option<String>,
    pub template_id: Option<String>,
    pub plan_id: Option<String>,
    pub sections: IndexMap<String, Vec<MenuItem>>,
}

impl MenuDocument {
    /// Fresh document with the default sections.
    pub fn new(restaurant_id: impl Into<RestaurantId>, name: impl Into<String>) -> Self {
        Self {
            restaurant_id: restaurant_id.into(),
            name: name.into(),
            palette: Palette::default(),
            logo_url: None,
            template_id: None,
            plan_id: None,
            sections: DEFAULT_SECTIONS
                .iter()
                .map(|s| (s.to_string(), Vec::new()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub kind: Option<String>,
    pub default_palette: Palette,
    pub sections: IndexMap<String, Vec<MenuItem>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Plata,
    Oro,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Plata => "plata",
            Plan::Oro => "oro",
            Plan::Premium => "premium",
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plata" => Ok(Plan::Plata),
            "oro" => Ok(Plan::Oro),
            "premium" => Ok(Plan::Premium),
            other => Err(format!("unknown plan: {other}")),
        }
    }
}

/// Account role as reported by the backend (a plan name or `admin`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    fn is_any(&self, allowed: &[&str]) -> bool {
        allowed.iter().any(|r| self.0.eq_ignore_ascii_case(r))
    }

    pub fn can_manage_menu(&self) -> bool {
        self.is_any(&["plata", "oro", "premium", "admin"])
    }

    pub fn can_view_analytics(&self) -> bool {
        self.is_any(&["oro", "premium", "admin"])
    }

    pub fn is_admin(&self) -> bool {
        self.is_any(&["admin"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, rename = "restaurantId", alias = "restaurant_id")]
    pub restaurant_id: Option<RestaurantId>,
}

impl UserProfile {
    pub fn can_manage_menu(&self) -> bool {
        self.role.as_ref().is_some_and(Role::can_manage_menu)
    }
}

/// Persisted authentication state: bearer token plus the profile it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default, rename = "totalPlatos")]
    pub total_items: u64,
    #[serde(default, rename = "totalRestaurantes")]
    pub total_restaurants: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("#ff9800").unwrap().as_str(), "#FF9800");
        assert_eq!(Color::parse("#abc").unwrap().rgb(), (0xAA, 0xBB, 0xCC));
        assert_eq!(Color::parse("#4CAF50").unwrap().rgb(), (0x4C, 0xAF, 0x50));
        assert!(Color::parse("FF9800").is_err());
        assert!(Color::parse("#GG0000").is_err());
        assert!(Color::parse("#12345").is_err());
    }

    #[test]
    fn test_media_kind() {
        assert_eq!(MediaKind::classify("/uploads/dish.glb"), MediaKind::Model);
        assert_eq!(MediaKind::classify("/uploads/DISH.GLTF?v=2"), MediaKind::Model);
        assert_eq!(MediaKind::classify("/uploads/dish.png"), MediaKind::Image);
    }

    #[test]
    fn test_role_access() {
        assert!(Role("oro".into()).can_view_analytics());
        assert!(!Role("plata".into()).can_view_analytics());
        assert!(Role("plata".into()).can_manage_menu());
        assert!(!Role("guest".into()).can_manage_menu());
        assert!(Role("ADMIN".into()).is_admin());
    }

    #[test]
    fn test_new_document_has_default_sections() {
        let doc = MenuDocument::new("r1", "Casa");
        let keys: Vec<_> = doc.sections.keys().cloned().collect();
        assert_eq!(keys, DEFAULT_SECTIONS.to_vec());
        assert_eq!(doc.palette, Palette::default());
    }
}
