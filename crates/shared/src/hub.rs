use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The hub configuration document: link categories plus an optional home.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubDocument {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklisted_domains: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default, rename = "name")]
    pub display_name: String,
    #[serde(default, rename = "url")]
    pub target_address: String,
}

impl Link {
    pub fn is_usable(&self) -> bool {
        !self.display_name.trim().is_empty() && !self.target_address.trim().is_empty()
    }
}

impl HubDocument {
    /// Parses a document and drops links that lack a name or an address.
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let mut document: Self = serde_json::from_slice(bytes)?;
        for category in &mut document.categories {
            category.links.retain(Link::is_usable);
        }
        document.default_home = document
            .default_home
            .take()
            .map(|home| home.trim().to_string())
            .filter(|home| !home.is_empty());
        Ok(document)
    }

    pub fn link_count(&self) -> usize {
        self.categories.iter().map(|category| category.links.len()).sum()
    }
}

/// Last good hub document, kept on disk so a failed fetch can fall back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHubDocument {
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    pub document: HubDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedPreferences {
    pub mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_document_and_drops_incomplete_links() {
        let raw = br#"{
            "categories": [
                {
                    "id": "news",
                    "label": "News",
                    "links": [
                        { "name": "Archive", "url": "https://archive.org" },
                        { "name": "", "url": "https://example.org" },
                        { "name": "No url" }
                    ]
                },
                { "id": "empty" }
            ],
            "defaultHome": "  https://archive.org  "
        }"#;

        let document = HubDocument::from_json_slice(raw).expect("parse");
        assert_eq!(document.categories.len(), 2);
        assert_eq!(document.categories[0].links.len(), 1);
        assert_eq!(document.categories[0].links[0].display_name, "Archive");
        assert!(document.categories[1].links.is_empty());
        assert_eq!(document.default_home.as_deref(), Some("https://archive.org"));
        assert_eq!(document.link_count(), 1);
    }

    #[test]
    fn blank_default_home_is_treated_as_absent() {
        let document =
            HubDocument::from_json_slice(br#"{"categories":[],"defaultHome":"   "}"#).expect("parse");
        assert_eq!(document.default_home, None);
    }

    #[test]
    fn rejects_malformed_document() {
        assert!(HubDocument::from_json_slice(b"{\"categories\": 3}").is_err());
        assert!(HubDocument::from_json_slice(b"not json").is_err());
    }
}
