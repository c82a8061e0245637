use serde::{Deserialize, Serialize};

/// Text shown in both console languages.
///
/// Older documents store a single plain string; it is read into both slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocalizedTextRepr")]
pub struct LocalizedText {
    pub ar: String,
    pub he: String,
}

impl LocalizedText {
    pub fn new(ar: impl Into<String>, he: impl Into<String>) -> Self {
        Self {
            ar: ar.into(),
            he: he.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.ar.trim().is_empty() && !self.he.trim().is_empty()
    }

    /// Arabic first, Hebrew when Arabic is missing.
    pub fn primary(&self) -> &str {
        if self.ar.is_empty() { &self.he } else { &self.ar }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocalizedTextRepr {
    Plain(String),
    Map {
        #[serde(default)]
        ar: String,
        #[serde(default)]
        he: String,
    },
}

impl From<LocalizedTextRepr> for LocalizedText {
    fn from(value: LocalizedTextRepr) -> Self {
        match value {
            LocalizedTextRepr::Plain(text) => Self {
                ar: text.clone(),
                he: text,
            },
            LocalizedTextRepr::Map { ar, he } => Self { ar, he },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::LocalizedText;

    #[test]
    fn plain_string_fills_both_languages() {
        let text: LocalizedText = serde_json::from_value(json!("Falafel")).unwrap();
        assert_eq!(text, LocalizedText::new("Falafel", "Falafel"));
    }

    #[test]
    fn partial_map_defaults_missing_language() {
        let text: LocalizedText = serde_json::from_value(json!({ "he": "פלאפל" })).unwrap();
        assert_eq!(text.ar, "");
        assert_eq!(text.primary(), "פלאפל");
        assert!(!text.is_complete());
    }
}
