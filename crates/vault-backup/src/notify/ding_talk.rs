use core::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use super::{Notifier, NotifyError};

type HmacSha256 = Hmac<Sha256>;

/// The DingTalk robot webhook.
pub const DING_TALK_WEBHOOK: &str = "https://oapi.dingtalk.com/robot/send";

/// DingTalk robot settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DingTalkConfig {
    /// The robot's access token.
    pub robot_token: String,

    /// The robot's signing secret, requests are not signed when empty.
    pub secret: String,

    /// A keyword the robot requires in every message.
    pub key_word: String,

    /// The webhook to post to.
    pub webhook_url: String,
}

impl Default for DingTalkConfig {
    fn default() -> Self {
        Self {
            robot_token: String::new(),
            secret: String::new(),
            key_word: String::new(),
            webhook_url: DING_TALK_WEBHOOK.to_string(),
        }
    }
}

/// Sends markdown messages through a DingTalk robot.
pub struct DingTalk {
    config: DingTalkConfig,
    client: Client,
}

impl DingTalk {
    /// Create a notifier with a client that gives up after 30 seconds.
    pub fn new(config: DingTalkConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotifyError::Http(e, "build the webhook client"))?;

        Ok(Self { config, client })
    }

    fn text_with_key_word(&self, body: &str) -> String {
        if self.config.key_word.is_empty() || body.contains(&self.config.key_word) {
            body.to_string()
        } else {
            format!("{body}\n\n{}", self.config.key_word)
        }
    }
}

impl Notifier for DingTalk {
    fn send_message(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let timestamp = Utc::now().timestamp_millis().to_string();

        let mut query = vec![
            ("access_token", self.config.robot_token.clone()),
            ("timestamp", timestamp.clone()),
        ];
        if !self.config.secret.is_empty() {
            query.push(("sign", compute_sign(&self.config.secret, &timestamp)?));
        }

        let message = json!({
            "msgtype": "markdown",
            "markdown": {
                "title": title,
                "text": self.text_with_key_word(body),
            },
        });

        let response: DingTalkResponse = self
            .client
            .post(&self.config.webhook_url)
            .query(&query)
            .json(&message)
            .send()
            .map_err(|e| NotifyError::Http(e, "send the webhook request"))?
            .error_for_status()
            .map_err(|e| NotifyError::Http(e, "deliver the message"))?
            .json()
            .map_err(|e| NotifyError::Http(e, "read the webhook response"))?;

        if response.errcode != 0 {
            return Err(NotifyError::Rejected {
                code: response.errcode,
                message: response.errmsg,
            });
        }

        debug!("Delivered '{title}' to DingTalk");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DingTalkResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// The DingTalk request signature: `base64(HMAC-SHA256(secret, "{timestamp}\n{secret}"))`.
pub fn compute_sign(secret: &str, timestamp: &str) -> Result<String, NotifyError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(NotifyError::Signing)?;
    mac.update(format!("{timestamp}\n{secret}").as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
