use serde::{ Serialize, Deserialize };
use serde_json::Value;

/// Normalized vaccination payload. Upstream shapes vary too much to type any
/// deeper than the three top-level fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaccinationStats {
    pub totals: Value,
    pub states: Value,
    pub timeseries: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HealthAlert {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl HealthAlert {
    /// Notification body, `"{title} - {date}\nSource: {source}"` with absent
    /// fields rendered empty.
    pub fn notification_body(&self) -> String {
        format!(
            "{} - {}\nSource: {}",
            self.title,
            self.date.as_deref().unwrap_or(""),
            self.source.as_deref().unwrap_or("")
        )
    }
}

/// NewsAPI article shape; every field is optional upstream.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct NewsArticle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_to_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
