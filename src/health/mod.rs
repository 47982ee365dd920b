use async_trait::async_trait;
use log::warn;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::error::Error;
use url::Url;

use crate::cache::MemoryCache;
use crate::cli::Args;
use crate::models::health::{HealthAlert, NewsArticle, VaccinationStats};
use crate::notify::poller::AlertSource;

const VACCINATION_CACHE_KEY: &str = "vaccination_latest";
const ALERTS_CACHE_KEY: &str = "alerts_latest";
const NEWS_CACHE_KEY: &str = "news_latest";

const VACCINATION_TTL_SECS: i64 = 600;
const ALERTS_TTL_SECS: i64 = 300;
const NEWS_TTL_SECS: i64 = 300;

const NEWSAPI_TOP_HEADLINES: &str = "https://newsapi.org/v2/top-headlines";

/// Fetches, normalizes, and caches the public health feeds. Each feed serves
/// a bundled fallback when its upstream is not configured, so the API stays
/// usable in development without any keys.
pub struct HealthDataService {
    http: HttpClient,
    cache: MemoryCache,
    vaccination_source: Option<String>,
    alerts_source: Option<String>,
    newsapi_key: Option<String>,
}

impl HealthDataService {
    pub fn new(
        cache: MemoryCache,
        vaccination_source: Option<String>,
        alerts_source: Option<String>,
        newsapi_key: Option<String>,
    ) -> Self {
        Self {
            http: HttpClient::new(),
            cache,
            vaccination_source,
            alerts_source,
            newsapi_key,
        }
    }

    pub fn from_args(cache: MemoryCache, args: &Args) -> Self {
        Self::new(
            cache,
            args.vaccination_source.clone(),
            args.alerts_source.clone(),
            args.newsapi_key.clone(),
        )
    }

    /// Vaccination statistics, cached for ten minutes. Upstream payloads are
    /// normalized into `{totals, states, timeseries}`; without an upstream a
    /// bundled sample is served as-is.
    pub async fn vaccination(&self) -> Result<Value, Box<dyn Error + Send + Sync>> {
        if let Some(cached) = self.cache.get(VACCINATION_CACHE_KEY).await {
            return Ok(cached);
        }

        let payload = match &self.vaccination_source {
            Some(source) => {
                let data = self
                    .http
                    .get(source)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await?;
                serde_json::to_value(normalize_vaccination(source, &data))?
            }
            None => sample_vaccination(),
        };

        self.cache.set(VACCINATION_CACHE_KEY, payload.clone(), VACCINATION_TTL_SECS).await;
        Ok(payload)
    }

    /// Current health alerts, cached for five minutes. Without an upstream a
    /// single bundled advisory is served.
    pub async fn alerts(&self) -> Result<Vec<HealthAlert>, Box<dyn Error + Send + Sync>> {
        if let Some(cached) = self.cache.get(ALERTS_CACHE_KEY).await {
            return Ok(serde_json::from_value(cached)?);
        }

        let alerts = match &self.alerts_source {
            Some(source) => {
                let data = self
                    .http
                    .get(source)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await?;
                extract_alert_items(&data)
            }
            None => sample_alerts(),
        };

        self.cache.set(ALERTS_CACHE_KEY, serde_json::to_value(&alerts)?, ALERTS_TTL_SECS).await;
        Ok(alerts)
    }

    /// Health news headlines via NewsAPI, cached for five minutes. The feed
    /// is empty without an API key.
    pub async fn news(&self) -> Result<Vec<NewsArticle>, Box<dyn Error + Send + Sync>> {
        if let Some(cached) = self.cache.get(NEWS_CACHE_KEY).await {
            return Ok(serde_json::from_value(cached)?);
        }

        let articles = match &self.newsapi_key {
            Some(key) => {
                let url = Url::parse_with_params(
                    NEWSAPI_TOP_HEADLINES,
                    &[("category", "health"), ("country", "in"), ("apiKey", key.as_str())],
                )?;
                let data = self
                    .http
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await?;
                extract_articles(&data)
            }
            None => Vec::new(),
        };

        self.cache.set(NEWS_CACHE_KEY, serde_json::to_value(&articles)?, NEWS_TTL_SECS).await;
        Ok(articles)
    }
}

#[async_trait]
impl AlertSource for HealthDataService {
    async fn latest_alerts(&self) -> Result<Vec<HealthAlert>, Box<dyn Error + Send + Sync>> {
        self.alerts().await
    }
}

/// First non-null value under `key`, treating JSON null the same as absent.
fn field<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    data.get(key).filter(|v| !v.is_null())
}

/// Best-effort normalization of known vaccination payload shapes into
/// `{totals, states, timeseries}`. The branch is picked from the source URL.
pub fn normalize_vaccination(source_url: &str, data: &Value) -> VaccinationStats {
    let src = source_url.to_lowercase();
    if src.contains("cowin") || src.contains("vaccine") {
        // CoWIN-like payloads sometimes carry per-region rows instead of a
        // statewise array.
        VaccinationStats {
            totals: field(data, "top_level_totals")
                .or_else(|| field(data, "totals"))
                .cloned()
                .unwrap_or_else(|| json!({})),
            states: field(data, "statewise")
                .or_else(|| field(data, "states"))
                .cloned()
                .or_else(|| map_regional(data))
                .unwrap_or_else(|| json!([])),
            timeseries: field(data, "timeseries")
                .or_else(|| field(data, "daily"))
                .cloned()
                .unwrap_or_else(|| json!([])),
        }
    } else if src.contains("mohfw") || src.contains("gov.in") {
        VaccinationStats {
            totals: field(data, "totals")
                .or_else(|| field(data, "summary"))
                .cloned()
                .unwrap_or_else(|| json!({})),
            states: field(data, "states")
                .or_else(|| field(data, "region"))
                .cloned()
                .unwrap_or_else(|| json!([])),
            timeseries: field(data, "timeseries").cloned().unwrap_or_else(|| json!([])),
        }
    } else {
        VaccinationStats {
            totals: field(data, "totals").cloned().unwrap_or_else(|| json!({})),
            // Unknown shapes keep the whole payload so nothing is lost.
            states: field(data, "states").cloned().unwrap_or_else(|| data.clone()),
            timeseries: field(data, "timeseries").cloned().unwrap_or_else(|| json!([])),
        }
    }
}

fn map_regional(data: &Value) -> Option<Value> {
    let regions = field(data, "regional")?.as_array()?;
    let mapped: Vec<Value> = regions
        .iter()
        .map(|region| {
            json!({
                "state": field(region, "name")
                    .or_else(|| field(region, "state"))
                    .cloned()
                    .unwrap_or(Value::Null),
                "doses": field(region, "doses")
                    .or_else(|| field(region, "count"))
                    .cloned()
                    .unwrap_or(Value::Null),
            })
        })
        .collect();
    Some(Value::Array(mapped))
}

/// Pulls the alert array out of an upstream payload, trying the common
/// wrapper keys in order. Items that do not parse are skipped.
pub fn extract_alert_items(data: &Value) -> Vec<HealthAlert> {
    let items = match field(data, "records")
        .or_else(|| field(data, "items"))
        .or_else(|| field(data, "alerts"))
        .and_then(Value::as_array)
    {
        Some(items) => items,
        None => return Vec::new(),
    };

    let mut alerts = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<HealthAlert>(item.clone()) {
            Ok(alert) => alerts.push(alert),
            Err(e) => warn!("Skipping malformed alert item: {}", e),
        }
    }
    alerts
}

fn extract_articles(data: &Value) -> Vec<NewsArticle> {
    let items = match field(data, "articles").and_then(Value::as_array) {
        Some(items) => items,
        None => return Vec::new(),
    };

    let mut articles = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<NewsArticle>(item.clone()) {
            Ok(article) => articles.push(article),
            Err(e) => warn!("Skipping malformed news article: {}", e),
        }
    }
    articles
}

fn sample_vaccination() -> Value {
    json!({
        "totals": { "doses_administered": 1_000_000_000u64 },
        "states": [
            { "state": "Maharashtra", "doses": 120_000_000u64 },
            { "state": "Karnataka", "doses": 50_000_000u64 },
        ],
    })
}

fn sample_alerts() -> Vec<HealthAlert> {
    vec![HealthAlert {
        id: "a1".to_string(),
        title: "Dengue advisory issued".to_string(),
        date: Some("2025-10-17".to_string()),
        severity: Some("moderate".to_string()),
        source: Some("MoHFW".to_string()),
    }]
}
