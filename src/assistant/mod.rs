use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::info;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::cli::Args;
use crate::models::chat::Conversation;

pub type ReplyStream =
    Pin<Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>>;

/// Produces streamed assistant replies for the chat channel.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn reply_stream(
        &self,
        prompt: &str,
    ) -> Result<ReplyStream, Box<dyn StdError + Send + Sync>>;
}

/// Relays prompts to an Ollama-compatible `/api/generate` endpoint and
/// forwards its newline-delimited JSON fragments as they arrive.
pub struct UpstreamAssistant {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamFragment {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl UpstreamAssistant {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url,
            model,
        }
    }
}

#[async_trait]
impl AssistantClient for UpstreamAssistant {
    async fn reply_stream(
        &self,
        prompt: &str,
    ) -> Result<ReplyStream, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let req = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: true,
        };

        let (tx, rx) = mpsc::channel(32);
        let client = self.http.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&req).send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let err_msg = format!("HTTP error: {}", response.status());
                        let _ = tx
                            .send(Err(Box::new(std::io::Error::new(
                                std::io::ErrorKind::Other,
                                err_msg,
                            )) as _))
                            .await;
                        return;
                    }
                    let mut stream = response.bytes_stream();

                    while let Some(chunk_result) = stream.next().await {
                        match chunk_result {
                            Ok(chunk) => {
                                if let Ok(text) = String::from_utf8(chunk.to_vec()) {
                                    for line in text.lines() {
                                        if line.is_empty() {
                                            continue;
                                        }

                                        match serde_json::from_str::<StreamFragment>(line) {
                                            Ok(fragment) => {
                                                if !fragment.response.is_empty() {
                                                    if tx.send(Ok(fragment.response)).await.is_err() {
                                                        return;
                                                    }
                                                }

                                                if fragment.done {
                                                    return;
                                                }
                                            }
                                            Err(e) => {
                                                info!("JSON parse error: {} for line: {}", e, line);
                                                continue;
                                            }
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                let _ = tx
                                    .send(Err(Box::new(e) as Box<dyn StdError + Send + Sync>))
                                    .await;
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(Err(Box::new(e) as Box<dyn StdError + Send + Sync>))
                        .await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Fallback used when no assistant backend is configured. Replies with a
/// single fixed chunk so the chat channel still completes the round trip.
pub struct OfflineAssistant;

const OFFLINE_REPLY: &str = "The assistant backend is not configured. Set ASSISTANT_BASE_URL \
to enable live replies; health data and alert notifications keep working without it.";

#[async_trait]
impl AssistantClient for OfflineAssistant {
    async fn reply_stream(
        &self,
        _prompt: &str,
    ) -> Result<ReplyStream, Box<dyn StdError + Send + Sync>> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let _ = tx.send(Ok(OFFLINE_REPLY.to_string())).await;
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

pub fn new_client(args: &Args) -> Arc<dyn AssistantClient> {
    match &args.assistant_base_url {
        Some(base_url) => {
            info!("Assistant backend: {} (model: {})", base_url, args.assistant_model);
            Arc::new(UpstreamAssistant::new(base_url.clone(), args.assistant_model.clone()))
        }
        None => {
            info!("No assistant backend configured; chat replies use a static fallback");
            Arc::new(OfflineAssistant)
        }
    }
}

/// Number of transcript messages included ahead of a new prompt.
const CONTEXT_MESSAGES: usize = 6;

/// Builds the prompt for a new user message, prefixed with the tail of the
/// conversation so the backend sees recent context.
pub fn context_prompt(conversation: &Conversation, latest: &str) -> String {
    if conversation.messages.is_empty() {
        return latest.to_string();
    }

    let mut prompt = String::from("Previous conversation:\n");
    let skip = conversation.messages.len().saturating_sub(CONTEXT_MESSAGES);
    for msg in &conversation.messages[skip..] {
        let role_display = match msg.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            other => other,
        };
        prompt.push_str(&format!("{}: {}\n", role_display, msg.content));
    }
    prompt.push_str(&format!("User: {}\nAssistant:", latest));
    prompt
}
