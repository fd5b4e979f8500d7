//! Home Assistant REST client.

use crate::audio::buffer::AudioBuffer;
use crate::audio::decoder;
use crate::audio::timeline::{RenderError, SegmentRenderer};
use crate::device::api::{DeviceControl, DeviceError};
use crate::device::models::{local_media_path, DeviceState};
use crate::device::platform::PlatformFamily;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task;
use tracing::{debug, error, instrument, trace, warn};
use url::Url;

const LOG_TARGET: &str = "r_chimetts::device::home_assistant";

const MEDIA_PLAYER_DOMAIN: &str = "media_player";
/// Alexa Media Player plays audio through its notify service rather than `play_media`.
const ALEXA_NOTIFY_DOMAIN: &str = "notify";
const ALEXA_NOTIFY_SERVICE: &str = "alexa_media";
/// URL prefix Home Assistant serves local media from.
const LOCAL_MEDIA_URL_PATH: &str = "/media/local/";
/// Segment options sent as top-level `tts_get_url` fields rather than engine options.
const TTS_TOP_LEVEL_OPTIONS: [&str; 2] = ["language", "cache"];
/// Segment option that picks a different TTS platform for one segment.
const TTS_PLATFORM_OPTION: &str = "tts_platform";

/// One Home Assistant service call: `<domain>.<service>` with its data.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub domain: &'static str,
    pub service: &'static str,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct TtsUrlResponse {
    url: String,
}

/// Device control and TTS rendering through the Home Assistant REST API.
#[derive(Clone)]
pub struct HomeAssistantClient {
    client: Client,
    server_url: String,
    access_token: Option<String>,
    tts_platform: Option<String>,
    platforms: BTreeMap<String, String>,
}

impl HomeAssistantClient {
    pub fn new(server_url: &str) -> Self {
        let client = match Client::builder().timeout(Duration::from_secs(30)).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(target: LOG_TARGET, "Error creating HTTP client with timeout: {:?}. Falling back to default.", e);
                Client::new()
            }
        };
        let server_url = server_url.trim_end_matches('/').to_string();
        debug!(target: LOG_TARGET, "Created Home Assistant client for {}", server_url);
        Self {
            client,
            server_url,
            access_token: None,
            tts_platform: None,
            platforms: BTreeMap::new(),
        }
    }

    pub fn with_access_token(mut self, access_token: &str) -> Self {
        self.access_token = Some(access_token.to_string());
        self
    }

    /// TTS platform (or `tts.*` engine entity) used when a segment names none.
    pub fn with_tts_platform(mut self, tts_platform: Option<String>) -> Self {
        self.tts_platform = tts_platform;
        self
    }

    /// Entity id to integration name, standing in for the entity registry.
    pub fn with_platforms(mut self, platforms: BTreeMap<String, String>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    fn token(&self) -> Result<&str, DeviceError> {
        self.access_token
            .as_deref()
            .ok_or_else(|| DeviceError::Authentication("Access token not set".to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeviceError> {
        let url = self.build_url(path);
        debug!(target: LOG_TARGET, "Sending GET request to: {}", url);
        let response = self.client.get(&url).bearer_auth(self.token()?).send().await?;
        Self::handle_response(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, DeviceError> {
        let url = self.build_url(path);
        debug!(target: LOG_TARGET, "Sending POST request to: {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token()?)
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Calls `media_player.<service>`.
    async fn call_service(&self, service: &'static str, entity_id: &str, data: Value) -> Result<(), DeviceError> {
        let request = ServiceRequest {
            domain: MEDIA_PLAYER_DOMAIN,
            service,
            data,
        };
        self.send_service(request, entity_id).await
    }

    /// Posts a service call; a failure names the service and entity.
    #[instrument(skip(self, request), fields(domain = request.domain, service = request.service))]
    async fn send_service(&self, request: ServiceRequest, entity_id: &str) -> Result<(), DeviceError> {
        let path = format!("/api/services/{}/{}", request.domain, request.service);
        match self.post_json::<Value>(&path, &request.data).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(
                    target: LOG_TARGET,
                    "Service {}.{} failed for {}: {}", request.domain, request.service, entity_id, e
                );
                Err(DeviceError::ServiceCall {
                    service: format!("{}.{}", request.domain, request.service),
                    entity_id: entity_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, DeviceError> {
        let status = response.status();
        trace!(target: LOG_TARGET, "Response status: {}", status);
        if status.is_success() {
            let response_text = response.text().await?;
            if response_text.is_empty() {
                error!(target: LOG_TARGET, "Received empty response body with success status {}", status);
                return Err(DeviceError::InvalidResponse("Empty response body received".to_string()));
            }
            serde_json::from_str::<T>(&response_text).map_err(|e| {
                error!(target: LOG_TARGET, "JSON parsing error: {}. Full response text:\n{}", e, response_text);
                DeviceError::InvalidResponse(format!("Failed to parse JSON response: {}", e))
            })
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DeviceError::Authentication(format!(
                    "Authentication failed ({}): {}",
                    status, error_text
                ))),
                StatusCode::NOT_FOUND => Err(DeviceError::NotFound(format!(
                    "Resource not found ({}): {}",
                    status, error_text
                ))),
                _ => Err(DeviceError::InvalidResponse(format!(
                    "Request failed with status {}: {}",
                    status, error_text
                ))),
            }
        }
    }

    /// Absolute URL Home Assistant serves a local media-source id from.
    pub fn media_url(&self, media_content_id: &str) -> String {
        match local_media_path(media_content_id) {
            Some(path) => format!("{}{}{}", self.server_url, LOCAL_MEDIA_URL_PATH, path),
            None => media_content_id.to_string(),
        }
    }

    /// Service call that plays `media_content_id` on players of one family.
    pub fn play_media_request(
        &self,
        family: PlatformFamily,
        entity_ids: &[String],
        media_content_id: &str,
        announce: bool,
    ) -> ServiceRequest {
        let play_media = |announce: Option<bool>| {
            let mut data = json!({
                "entity_id": entity_ids,
                "media_content_id": media_content_id,
                "media_content_type": "music",
            });
            if let Some(announce) = announce {
                data["announce"] = json!(announce);
            }
            ServiceRequest {
                domain: MEDIA_PLAYER_DOMAIN,
                service: "play_media",
                data,
            }
        };
        match family {
            PlatformFamily::Standard => play_media(announce.then_some(true)),
            // Grouped speakers duck and restore around announcements themselves.
            PlatformFamily::MultiRoom => play_media(Some(announce)),
            PlatformFamily::Streaming => {
                if announce {
                    debug!(target: LOG_TARGET, "Streaming players cannot announce; playing normally");
                }
                play_media(None)
            }
            PlatformFamily::VoiceAssistant => ServiceRequest {
                domain: ALEXA_NOTIFY_DOMAIN,
                service: ALEXA_NOTIFY_SERVICE,
                data: json!({
                    "message": format!("<audio src=\"{}\"/>", self.media_url(media_content_id)),
                    "target": entity_ids,
                    "data": { "type": "tts" },
                }),
            },
        }
    }

    /// Request body for `/api/tts_get_url`.
    pub fn tts_request_body(&self, message: &str, options: &BTreeMap<String, String>) -> Value {
        let platform = options
            .get(TTS_PLATFORM_OPTION)
            .cloned()
            .or_else(|| self.tts_platform.clone());

        let mut body = Map::new();
        body.insert("message".to_string(), json!(message));
        match platform {
            Some(engine) if engine.starts_with("tts.") => {
                body.insert("engine_id".to_string(), json!(engine));
            }
            Some(platform) => {
                body.insert("platform".to_string(), json!(platform));
            }
            None => {}
        }

        let mut engine_options = Map::new();
        for (key, value) in options {
            if key == TTS_PLATFORM_OPTION {
                continue;
            }
            if TTS_TOP_LEVEL_OPTIONS.contains(&key.as_str()) {
                body.insert(key.clone(), json!(value));
            } else {
                engine_options.insert(key.clone(), json!(value));
            }
        }
        if !engine_options.is_empty() {
            body.insert("options".to_string(), Value::Object(engine_options));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl DeviceControl for HomeAssistantClient {
    async fn get_state(&self, entity_id: &str) -> Result<Option<DeviceState>, DeviceError> {
        match self.get_json::<DeviceState>(&format!("/api/states/{}", entity_id)).await {
            Ok(state) => Ok(Some(state)),
            Err(DeviceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn turn_on(&self, entity_id: &str) -> Result<(), DeviceError> {
        self.call_service("turn_on", entity_id, json!({ "entity_id": entity_id }))
            .await
    }

    async fn set_volume(&self, entity_id: &str, level: f64) -> Result<(), DeviceError> {
        self.call_service(
            "volume_set",
            entity_id,
            json!({ "entity_id": entity_id, "volume_level": level }),
        )
        .await
    }

    async fn join(&self, primary: &str, members: &[String]) -> Result<(), DeviceError> {
        self.call_service(
            "join",
            primary,
            json!({ "entity_id": primary, "group_members": members }),
        )
        .await
    }

    async fn play_media(
        &self,
        family: PlatformFamily,
        entity_ids: &[String],
        media_content_id: &str,
        announce: bool,
    ) -> Result<(), DeviceError> {
        let request = self.play_media_request(family, entity_ids, media_content_id, announce);
        debug!(
            target: LOG_TARGET,
            "Dispatching to {} player(s) via {}.{}", family, request.domain, request.service
        );
        self.send_service(request, &entity_ids.join(",")).await
    }

    fn platform(&self, entity_id: &str) -> Option<String> {
        self.platforms.get(entity_id).cloned()
    }
}

#[async_trait]
impl SegmentRenderer for HomeAssistantClient {
    #[instrument(skip(self, options))]
    async fn render_tts(
        &self,
        message: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<AudioBuffer, RenderError> {
        let body = self.tts_request_body(message, options);
        let response: TtsUrlResponse = self.post_json("/api/tts_get_url", &body).await?;
        debug!(target: LOG_TARGET, "Fetching TTS audio from {}", response.url);

        let url = Url::parse(&response.url).or_else(|_| Url::parse(&self.build_url(&response.url)))?;
        let extension = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string());

        let bytes = self
            .client
            .get(url)
            .bearer_auth(self.token()?)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let audio = task::spawn_blocking(move || decoder::decode_bytes(bytes, extension.as_deref())).await??;
        Ok(audio)
    }
}
