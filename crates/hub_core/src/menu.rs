use shared::hub::HubDocument;

pub const DEFAULT_PLACEHOLDER: &str = "Select";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: String,
    pub address: String,
}

/// One dropdown per hub category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub id: String,
    pub placeholder: String,
    pub entries: Vec<MenuEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuModel {
    menus: Vec<Menu>,
}

impl MenuModel {
    pub fn from_document(document: &HubDocument) -> Self {
        let menus = document
            .categories
            .iter()
            .map(|category| Menu {
                id: category.id.clone(),
                placeholder: category
                    .label
                    .as_deref()
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .unwrap_or(DEFAULT_PLACEHOLDER)
                    .to_string(),
                entries: category
                    .links
                    .iter()
                    .filter(|link| link.is_usable())
                    .map(|link| MenuEntry {
                        label: link.display_name.trim().to_string(),
                        address: link.target_address.trim().to_string(),
                    })
                    .collect(),
            })
            .collect();
        Self { menus }
    }

    pub fn menus(&self) -> &[Menu] {
        &self.menus
    }

    pub fn menu(&self, id: &str) -> Option<&Menu> {
        self.menus.iter().find(|menu| menu.id == id)
    }

    /// The entry at `index` (zero-based, placeholder excluded).
    pub fn select(&self, id: &str, index: usize) -> Option<&MenuEntry> {
        self.menu(id)?.entries.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::hub::{Category, Link};

    fn link(name: &str, url: &str) -> Link {
        Link {
            display_name: name.to_string(),
            target_address: url.to_string(),
        }
    }

    #[test]
    fn builds_menus_with_placeholders() {
        let document = HubDocument {
            categories: vec![
                Category {
                    id: "news".into(),
                    label: Some("News".into()),
                    links: vec![link("Archive", " https://archive.org "), link("", "https://x.test")],
                },
                Category {
                    id: "misc".into(),
                    label: Some("  ".into()),
                    links: Vec::new(),
                },
            ],
            ..HubDocument::default()
        };

        let model = MenuModel::from_document(&document);
        assert_eq!(model.menus().len(), 2);
        assert_eq!(model.menu("news").map(|m| m.placeholder.as_str()), Some("News"));
        assert_eq!(model.menu("misc").map(|m| m.placeholder.as_str()), Some("Select"));
        assert_eq!(
            model.select("news", 0),
            Some(&MenuEntry {
                label: "Archive".into(),
                address: "https://archive.org".into(),
            })
        );
        assert_eq!(model.select("news", 1), None);
        assert_eq!(model.select("nope", 0), None);
    }

    #[test]
    fn empty_document_yields_empty_model() {
        assert!(MenuModel::from_document(&HubDocument::default()).is_empty());
    }
}
