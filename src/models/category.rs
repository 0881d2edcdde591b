use serde::{Deserialize, Serialize};

/// Which category receives files whose classification is missing or unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCategory {
    #[default]
    Last,
    Label(String),
}

pub const DEFAULT_FALLBACK_CATEGORY: FallbackCategory = FallbackCategory::Last;

impl FallbackCategory {
    pub fn from_setting(label: Option<&str>) -> Self {
        match label.map(str::trim).filter(|l| !l.is_empty()) {
            Some(label) => Self::Label(label.to_string()),
            None => DEFAULT_FALLBACK_CATEGORY,
        }
    }

    /// Index of the fallback category, or `None` when the list is empty or the label is unknown.
    pub fn resolve(&self, categories: &[String]) -> Option<usize> {
        match self {
            Self::Last => categories.len().checked_sub(1),
            Self::Label(label) => categories.iter().position(|c| c == label),
        }
    }
}

/// Splits the comma-separated category setting into trimmed, non-empty labels.
pub fn parse_category_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
