pub mod api;
pub mod websocket;

use crate::assistant::AssistantClient;
use crate::cli::Args;
use api::AppState;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    state: AppState,
    assistant: Arc<dyn AssistantClient>,
    args: Args,
}

impl Server {
    pub fn new(
        addr: String,
        state: AppState,
        assistant: Arc<dyn AssistantClient>,
        args: Args,
    ) -> Self {
        Self {
            addr,
            state,
            assistant,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.start_http_server(self.args.http_port).await?;

        self.start_ws_server().await?;

        Ok(())
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(
            http_port,
            self.state.clone(),
            self.args.clone(),
        ).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.addr,
            self.assistant.clone(),
            self.args.clone(),
        ).await
    }
}
