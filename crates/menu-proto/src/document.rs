//! Local edits on a [`MenuDocument`].
//!
//! Edits only ever produce the next desired state; nothing here talks to the
//! backend. Callers hand the edited document to the synchronizer's `save`.

use crate::{DocumentError, MenuDocument, MenuItem, Template};

impl MenuDocument {
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Items in display order: section order, then position within section.
    pub fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.sections.values().flatten()
    }

    pub fn item_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn find_item(&self, id: &str) -> Option<&MenuItem> {
        self.items().find(|item| item.id.as_deref() == Some(id))
    }

    pub fn add_section(&mut self, name: &str) -> Result<(), DocumentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DocumentError::EmptySectionName);
        }
        if self.has_section(name) {
            return Err(DocumentError::DuplicateSection(name.to_string()));
        }
        self.sections.insert(name.to_string(), Vec::new());
        Ok(())
    }

    /// Renames in place, keeping the section's position and moving its items.
    pub fn rename_section(&mut self, old: &str, new: &str) -> Result<(), DocumentError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(DocumentError::EmptySectionName);
        }
        let index = self
            .sections
            .get_index_of(old)
            .ok_or_else(|| DocumentError::UnknownSection(old.to_string()))?;
        if old == new {
            return Ok(());
        }
        if self.has_section(new) {
            return Err(DocumentError::DuplicateSection(new.to_string()));
        }

        let (_, mut items) = self
            .sections
            .shift_remove_index(index)
            .ok_or_else(|| DocumentError::UnknownSection(old.to_string()))?;
        for item in &mut items {
            item.category = new.to_string();
        }
        self.sections.shift_insert(index, new.to_string(), items);
        Ok(())
    }

    /// Removes the section together with the items it holds.
    pub fn remove_section(&mut self, name: &str) -> Result<Vec<MenuItem>, DocumentError> {
        self.sections
            .shift_remove(name)
            .ok_or_else(|| DocumentError::UnknownSection(name.to_string()))
    }

    pub fn add_item(&mut self, item: MenuItem) -> Result<(), DocumentError> {
        validate_item(&item)?;
        if let Some(id) = item.id.as_deref() {
            if self.find_item(id).is_some() {
                return Err(DocumentError::InvalidItem(format!("duplicate id {id}")));
            }
        }
        let section = self
            .sections
            .get_mut(&item.category)
            .ok_or_else(|| DocumentError::UnknownSection(item.category.clone()))?;
        section.push(item);
        Ok(())
    }

    /// Replaces the item with `id`; a changed category moves it to the end
    /// of the target section.
    pub fn update_item(&mut self, id: &str, mut item: MenuItem) -> Result<(), DocumentError> {
        validate_item(&item)?;
        if !self.has_section(&item.category) {
            return Err(DocumentError::UnknownSection(item.category.clone()));
        }
        let (section, index) = self
            .locate(id)
            .ok_or_else(|| DocumentError::ItemNotFound(id.to_string()))?;
        item.id = Some(id.to_string());

        if section == item.category {
            if let Some(slot) = self
                .sections
                .get_mut(&section)
                .and_then(|items| items.get_mut(index))
            {
                *slot = item;
            }
            return Ok(());
        }

        if let Some(items) = self.sections.get_mut(&section) {
            items.remove(index);
        }
        if let Some(items) = self.sections.get_mut(&item.category) {
            items.push(item);
        }
        Ok(())
    }

    pub fn remove_item(&mut self, id: &str) -> Result<MenuItem, DocumentError> {
        let (section, index) = self
            .locate(id)
            .ok_or_else(|| DocumentError::ItemNotFound(id.to_string()))?;
        self.sections
            .get_mut(&section)
            .map(|items| items.remove(index))
            .ok_or_else(|| DocumentError::ItemNotFound(id.to_string()))
    }

    /// Takes over the template's palette and section layout. Existing items
    /// are never dropped: a section the template also names keeps its items,
    /// and sections outside the template stay after the template's ones while
    /// they still hold items. Template default items only seed sections that
    /// did not exist before.
    pub fn apply_template(&mut self, template: &Template) {
        self.palette = template.default_palette.clone();
        self.template_id = Some(template.id.clone());

        let mut previous = std::mem::take(&mut self.sections);
        for (name, defaults) in &template.sections {
            let items = previous
                .shift_remove(name)
                .unwrap_or_else(|| defaults.clone());
            self.sections.insert(name.clone(), items);
        }
        for (name, items) in previous {
            if !items.is_empty() {
                self.sections.insert(name, items);
            }
        }
    }

    fn locate(&self, id: &str) -> Option<(String, usize)> {
        self.sections.iter().find_map(|(name, items)| {
            items
                .iter()
                .position(|item| item.id.as_deref() == Some(id))
                .map(|index| (name.clone(), index))
        })
    }
}

fn validate_item(item: &MenuItem) -> Result<(), DocumentError> {
    if item.name.trim().is_empty() {
        return Err(DocumentError::InvalidItem("name must not be empty".into()));
    }
    if item.category.trim().is_empty() {
        return Err(DocumentError::InvalidItem("category must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Palette, Price};
    use indexmap::IndexMap;

    fn doc() -> MenuDocument {
        MenuDocument::new("r1", "Casa Lola")
    }

    fn item(id: &str, name: &str, category: &str) -> MenuItem {
        let mut item = MenuItem::new(name, Price::from_cents(1000), category);
        item.id = Some(id.to_string());
        item
    }

    #[test]
    fn test_section_lifecycle() {
        let mut d = doc();
        d.add_section("Entradas").unwrap();
        assert_eq!(
            d.add_section("Entradas"),
            Err(DocumentError::DuplicateSection("Entradas".into()))
        );
        assert_eq!(d.add_section("   "), Err(DocumentError::EmptySectionName));

        d.add_item(item("1", "Ceviche", "Entradas")).unwrap();
        d.rename_section("Entradas", "Para Empezar").unwrap();

        let names: Vec<_> = d.section_names().collect();
        assert_eq!(
            names,
            vec!["Platos Principales", "Postres", "Bebidas", "Para Empezar"]
        );
        assert_eq!(d.find_item("1").unwrap().category, "Para Empezar");

        let removed = d.remove_section("Para Empezar").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(d.item_count(), 0);
    }

    #[test]
    fn test_rename_keeps_position() {
        let mut d = doc();
        d.rename_section("Postres", "Dulces").unwrap();
        let names: Vec<_> = d.section_names().collect();
        assert_eq!(names, vec!["Platos Principales", "Dulces", "Bebidas"]);
        assert_eq!(
            d.rename_section("Dulces", "Bebidas"),
            Err(DocumentError::DuplicateSection("Bebidas".into()))
        );
    }

    #[test]
    fn test_item_requires_existing_section() {
        let mut d = doc();
        assert_eq!(
            d.add_item(item("1", "Flan", "Helados")),
            Err(DocumentError::UnknownSection("Helados".into()))
        );
        assert!(matches!(
            d.add_item(item("1", " ", "Postres")),
            Err(DocumentError::InvalidItem(_))
        ));
    }

    #[test]
    fn test_update_moves_between_sections() {
        let mut d = doc();
        d.add_item(item("1", "Flan", "Postres")).unwrap();
        d.add_item(item("2", "Lomo", "Platos Principales")).unwrap();

        let mut moved = item("ignored", "Flan de coco", "Bebidas");
        moved.price = Price::from_cents(450);
        d.update_item("1", moved).unwrap();

        assert!(d.sections["Postres"].is_empty());
        let updated = d.find_item("1").unwrap();
        assert_eq!(updated.category, "Bebidas");
        assert_eq!(updated.name, "Flan de coco");
        assert_eq!(d.item_count(), 2);

        assert_eq!(
            d.update_item("404", item("404", "x", "Postres")),
            Err(DocumentError::ItemNotFound("404".into()))
        );
    }

    #[test]
    fn test_remove_item() {
        let mut d = doc();
        d.add_item(item("1", "Flan", "Postres")).unwrap();
        assert_eq!(d.remove_item("1").unwrap().name, "Flan");
        assert!(d.remove_item("1").is_err());
    }

    #[test]
    fn test_apply_template() {
        let mut d = doc();
        d.add_item(item("1", "Flan", "Postres")).unwrap();
        let mut sections = IndexMap::new();
        sections.insert("Pizzas".to_string(), Vec::new());
        let template = Template {
            id: "t2".into(),
            name: "Pizzeria".into(),
            kind: Some("pizzeria".into()),
            default_palette: Palette {
                primary: crate::Color::parse("#D32F2F").unwrap(),
                secondary: crate::Color::parse("#FFC107").unwrap(),
            },
            sections,
        };

        d.apply_template(&template);
        assert_eq!(d.template_id.as_deref(), Some("t2"));
        assert_eq!(d.palette.primary.as_str(), "#D32F2F");
        assert_eq!(d.section_names().collect::<Vec<_>>(), vec!["Pizzas", "Postres"]);
        assert_eq!(d.find_item("1").unwrap().category, "Postres");
        assert_eq!(d.item_count(), 1);
    }

    #[test]
    fn test_apply_template_keeps_items_in_shared_sections() {
        let mut d = doc();
        d.add_item(item("1", "Flan", "Postres")).unwrap();
        let mut sections = IndexMap::new();
        sections.insert("Entradas".to_string(), vec![MenuItem::new("Pan", Price::from_cents(200), "Entradas")]);
        sections.insert(
            "Postres".to_string(),
            vec![MenuItem::new("Helado", Price::from_cents(350), "Postres")],
        );
        let template = Template {
            id: "t3".into(),
            name: "Bistro".into(),
            kind: None,
            default_palette: Palette::default(),
            sections,
        };

        d.apply_template(&template);
        assert_eq!(d.section_names().collect::<Vec<_>>(), vec!["Entradas", "Postres"]);
        assert_eq!(d.sections["Entradas"][0].name, "Pan");
        let desserts: Vec<_> = d.sections["Postres"].iter().map(|i| i.name.as_str()).collect();
        assert_eq!(desserts, vec!["Flan"]);
    }
}
