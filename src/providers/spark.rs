//! iFlytek Spark provider: HMAC-signed WebSocket URL, one request frame,
//! streamed answer fragments

use super::{ChatProvider, ProviderKind};
use crate::error::ChatError;
use crate::models::Message;
use crate::store::{load_record, SettingsStore};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio_tungstenite::tungstenite::Message as WsMessage;

type HmacSha256 = Hmac<Sha256>;

pub const SPARK_URL: &str = "wss://spark-api.xf-yun.com/v1.1/chat";
const SPARK_DOMAIN: &str = "lite";
const SPARK_MAX_TOKENS: u32 = 512;
const SPARK_UID: &str = "123";

/// `payload.choices.status` value carried by the last fragment
const STATUS_FINAL: i64 = 2;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SparkConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub app_id: String,
}

/// Formats a timestamp as an RFC 1123 HTTP date, e.g. `Mon, 02 Jan 2006 15:04:05 GMT`
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Signs the canonical `host`/`date`/request-line string with HMAC-SHA256 and
/// returns the base64 digest.
pub fn sign(secret: &str, host: &str, date: &str, path: &str) -> Result<String, ChatError> {
    let origin = format!("host: {}\ndate: {}\nGET {} HTTP/1.1", host, date, path);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ChatError::ConfigInvalid)?;
    mac.update(origin.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Builds the one-shot authenticated WebSocket URL for `endpoint`.
pub fn authorization_url(endpoint: &str, config: &SparkConfig, date: &str) -> Result<String, ChatError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| ChatError::Protocol(format!("invalid endpoint {}: {}", endpoint, e)))?;
    let host_name = url
        .host_str()
        .ok_or_else(|| ChatError::Protocol(format!("endpoint {} has no host", endpoint)))?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host_name, port),
        None => host_name.to_string(),
    };

    let signature = sign(&config.api_secret, &host, date, url.path())?;
    let authorization_origin = format!(
        "api_key=\"{}\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{}\"",
        config.api_key, signature
    );
    let authorization = STANDARD.encode(authorization_origin);

    Ok(format!(
        "{}?authorization={}&date={}&host={}",
        endpoint,
        urlencoding::encode(&authorization),
        urlencoding::encode(date),
        urlencoding::encode(&host)
    ))
}

#[derive(Debug, Deserialize)]
struct Frame {
    header: FrameHeader,
    #[serde(default)]
    payload: Option<FramePayload>,
}

#[derive(Debug, Deserialize)]
struct FrameHeader {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    choices: FrameChoices,
}

#[derive(Debug, Deserialize)]
struct FrameChoices {
    status: i64,
    #[serde(default)]
    text: Vec<FrameText>,
}

#[derive(Debug, Deserialize)]
struct FrameText {
    #[serde(default)]
    content: String,
}

/// What the connection should do after a frame
#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// More fragments follow; keep reading.
    Pending,
    /// Terminal fragment received; close the socket and return the answer.
    Complete(String),
}

/// Collects streamed answer fragments until the terminal status arrives
#[derive(Debug, Default)]
pub struct AnswerAccumulator {
    answer: String,
}

impl AnswerAccumulator {
    /// Feeds one inbound text frame.
    ///
    /// A non-zero `header.code` is returned as `Protocol` carrying the
    /// provider's message; the caller must close the socket.
    pub fn accept(&mut self, raw: &str) -> Result<FrameOutcome, ChatError> {
        let frame: Frame = serde_json::from_str(raw)
            .map_err(|e| ChatError::Protocol(format!("malformed frame: {}", e)))?;

        if frame.header.code != 0 {
            let message = if frame.header.message.is_empty() {
                format!("error code {}", frame.header.code)
            } else {
                frame.header.message
            };
            return Err(ChatError::Protocol(message));
        }

        let choices = frame
            .payload
            .ok_or_else(|| ChatError::Protocol("frame without payload".to_string()))?
            .choices;
        if let Some(fragment) = choices.text.first() {
            self.answer.push_str(&fragment.content);
        }

        if choices.status == STATUS_FINAL {
            Ok(FrameOutcome::Complete(std::mem::take(&mut self.answer)))
        } else {
            Ok(FrameOutcome::Pending)
        }
    }
}

pub struct SparkProvider {
    config: SparkConfig,
    endpoint: String,
}

impl SparkProvider {
    pub fn new(config: SparkConfig) -> Self {
        Self {
            config,
            endpoint: SPARK_URL.to_string(),
        }
    }

    /// Loads settings from the store; a broken record leaves them empty.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let key = ProviderKind::Spark.config_key();
        let config = load_record::<SparkConfig>(store, key).unwrap_or_else(|e| {
            warn!("[spark] {}", e);
            SparkConfig::default()
        });
        Self::new(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn config(&self) -> &SparkConfig {
        &self.config
    }

    fn request_frame(&self, history: &[Message]) -> Value {
        json!({
            "header": { "app_id": self.config.app_id, "uid": SPARK_UID },
            "parameter": { "chat": { "domain": SPARK_DOMAIN, "max_tokens": SPARK_MAX_TOKENS } },
            "payload": { "message": { "text": history } }
        })
    }
}

#[async_trait]
impl ChatProvider for SparkProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spark
    }

    fn validate(&self) -> bool {
        !self.config.api_key.is_empty()
            && !self.config.api_secret.is_empty()
            && !self.config.app_id.is_empty()
    }

    async fn complete(&self, history: &[Message]) -> Result<String, ChatError> {
        let url = authorization_url(&self.endpoint, &self.config, &http_date(Utc::now()))?;
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ChatError::Network(format!("Failed to connect: {}", e)))?;
        info!("[spark] Connected to {}", self.endpoint);

        ws.send(WsMessage::Text(self.request_frame(history).to_string()))
            .await
            .map_err(|e| ChatError::Network(format!("Failed to send request: {}", e)))?;

        let mut accumulator = AnswerAccumulator::default();
        while let Some(frame) = ws.next().await {
            let frame = frame.map_err(|e| ChatError::Network(format!("Stream error: {}", e)))?;
            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => break,
                _ => continue,
            };
            debug!("[spark] Frame: {}", text);

            match accumulator.accept(&text) {
                Ok(FrameOutcome::Pending) => continue,
                Ok(FrameOutcome::Complete(answer)) => {
                    let _ = ws.close(None).await;
                    if answer.is_empty() {
                        return Err(ChatError::Protocol("empty response".to_string()));
                    }
                    info!("[spark] Answer complete: {} chars", answer.len());
                    return Ok(answer);
                }
                Err(e) => {
                    let _ = ws.close(None).await;
                    warn!("[spark] Provider error: {}", e);
                    return Err(e);
                }
            }
        }

        Err(ChatError::Network(
            "connection closed before the answer completed".to_string(),
        ))
    }

    fn config_record(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> SparkConfig {
        SparkConfig {
            api_key: "key".into(),
            api_secret: "secret".into(),
            app_id: "app".into(),
        }
    }

    #[test]
    fn http_date_is_rfc1123() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(http_date(at), "Tue, 05 Mar 2024 07:08:09 GMT");
    }

    #[test]
    fn signature_is_deterministic_and_input_sensitive() {
        let base = ("secret", "spark-api.xf-yun.com", "Tue, 05 Mar 2024 07:08:09 GMT", "/v1.1/chat");
        let first = sign(base.0, base.1, base.2, base.3).unwrap();
        assert_eq!(first, sign(base.0, base.1, base.2, base.3).unwrap());

        let variants = [
            sign("secret2", base.1, base.2, base.3).unwrap(),
            sign(base.0, "other.host", base.2, base.3).unwrap(),
            sign(base.0, base.1, "Wed, 06 Mar 2024 07:08:09 GMT", base.3).unwrap(),
            sign(base.0, base.1, base.2, "/v2/chat").unwrap(),
        ];
        for variant in &variants {
            assert_ne!(&first, variant);
        }
    }

    #[test]
    fn randomized_inputs_do_not_collide() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let secret: u64 = rng.gen();
            let path: u32 = rng.gen();
            let signature = sign(&secret.to_string(), "h", "d", &format!("/{}", path)).unwrap();
            seen.insert((secret, path, signature));
        }
        let distinct: std::collections::HashSet<_> = seen.iter().map(|(_, _, s)| s.clone()).collect();
        assert_eq!(distinct.len(), seen.len());
    }

    #[test]
    fn authorization_url_embeds_signed_header() {
        let date = "Tue, 05 Mar 2024 07:08:09 GMT";
        let url = authorization_url(SPARK_URL, &config(), date).unwrap();
        let parsed = reqwest::Url::parse(&url).unwrap();
        let query: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(query["date"], date);
        assert_eq!(query["host"], "spark-api.xf-yun.com");
        let decoded = String::from_utf8(STANDARD.decode(&query["authorization"]).unwrap()).unwrap();
        let signature = sign("secret", "spark-api.xf-yun.com", date, "/v1.1/chat").unwrap();
        assert_eq!(
            decoded,
            format!(
                "api_key=\"key\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{}\"",
                signature
            )
        );
    }

    #[test]
    fn fragments_accumulate_until_final_status() {
        let mut acc = AnswerAccumulator::default();
        let first = r#"{"header":{"code":0,"message":""},"payload":{"choices":{"status":1,"text":[{"content":"Hel"}]}}}"#;
        let last = r#"{"header":{"code":0},"payload":{"choices":{"status":2,"text":[{"content":"lo"}]}}}"#;

        assert_eq!(acc.accept(first).unwrap(), FrameOutcome::Pending);
        assert_eq!(acc.accept(last).unwrap(), FrameOutcome::Complete("Hello".into()));
    }

    #[test]
    fn error_code_surfaces_provider_message() {
        let mut acc = AnswerAccumulator::default();
        let frame = r#"{"header":{"code":1,"message":"AppIdNoAuthError"}}"#;
        assert_eq!(acc.accept(frame), Err(ChatError::Protocol("AppIdNoAuthError".into())));
    }

    #[test]
    fn malformed_frame_is_a_protocol_error() {
        let mut acc = AnswerAccumulator::default();
        assert!(matches!(acc.accept("not json"), Err(ChatError::Protocol(_))));
    }

    #[test]
    fn validation_requires_every_field() {
        assert!(SparkProvider::new(config()).validate());
        for blank in 0..3 {
            let mut c = config();
            match blank {
                0 => c.api_key.clear(),
                1 => c.api_secret.clear(),
                _ => c.app_id.clear(),
            }
            assert!(!SparkProvider::new(c).validate());
        }
    }

    #[test]
    fn request_frame_carries_history() {
        let provider = SparkProvider::new(config());
        let frame = provider.request_frame(&[Message::system("sys"), Message::user("hi")]);
        assert_eq!(frame["header"]["app_id"], "app");
        assert_eq!(frame["parameter"]["chat"]["domain"], "lite");
        assert_eq!(frame["parameter"]["chat"]["max_tokens"], 512);
        assert_eq!(frame["payload"]["message"]["text"][1]["content"], "hi");
    }
}
