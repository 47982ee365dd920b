use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::{NotifyError, WhatsAppSender};
use crate::cli::Args;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// REST client for Twilio's WhatsApp messaging API.
#[derive(Debug)]
pub struct TwilioClient {
    http: HttpClient,
    account_sid: String,
    auth_token: String,
    from: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

impl TwilioClient {
    pub fn new(account_sid: String, auth_token: String, from: String) -> Self {
        Self {
            http: HttpClient::new(),
            account_sid,
            auth_token,
            from,
        }
    }

    /// Builds a client only when all three Twilio settings are present.
    pub fn from_args(args: &Args) -> Option<Self> {
        match (
            &args.twilio_account_sid,
            &args.twilio_auth_token,
            &args.twilio_whatsapp_from,
        ) {
            (Some(sid), Some(token), Some(from)) => {
                Some(Self::new(sid.clone(), token.clone(), from.clone()))
            }
            _ => None,
        }
    }

    /// Sends a WhatsApp message and returns the Twilio message SID.
    pub async fn send_whatsapp(&self, to: &str, body: &str) -> Result<String, NotifyError> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            TWILIO_API_BASE, self.account_sid
        );
        let to_field = format!("whatsapp:{}", to);
        let form = [
            ("From", self.from.as_str()),
            ("To", to_field.as_str()),
            ("Body", body),
        ];

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }

        let data = resp.json::<MessageResponse>().await?;
        Ok(data.sid.unwrap_or_default())
    }
}

#[async_trait]
impl WhatsAppSender for TwilioClient {
    async fn send(&self, to: &str, body: &str) -> Result<String, NotifyError> {
        self.send_whatsapp(to, body).await
    }
}
