use crate::config::OdioConfig;
use crate::error::{OdioError, Result};
use crate::host::{EventStream, HostApi, HostEvent, ServiceAction};
use crate::types::{AudioClient, PowerCapabilities, ServerInfo, Service, ServiceScope, Volume};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

const ENDPOINT_SERVER: &str = "/server";
const ENDPOINT_CLIENTS: &str = "/audio/clients";
const ENDPOINT_SERVICES: &str = "/services";
const ENDPOINT_SERVER_VOLUME: &str = "/audio/server/volume";
const ENDPOINT_SERVER_MUTE: &str = "/audio/server/mute";
const ENDPOINT_POWER: &str = "/power";
const ENDPOINT_POWER_OFF: &str = "/power/power_off";
const ENDPOINT_POWER_REBOOT: &str = "/power/reboot";
const ENDPOINT_EVENTS: &str = "/events";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the Odio host API
///
/// Thin JSON REST wrapper plus the SSE event-stream subscription. The
/// client is stateless; all caching and state synthesis happens above it.
///
/// Timeouts are applied per request, never on the whole client: the event
/// stream must be able to stay open indefinitely.
#[derive(Debug, Clone)]
pub struct OdioClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    service_timeout: Duration,
}

impl OdioClient {
    /// Create a client for the given base URL with default timeouts
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeouts(base_url, DEFAULT_REQUEST_TIMEOUT, Duration::from_secs(15))
    }

    /// Create a client from a connection configuration
    pub fn from_config(config: &OdioConfig) -> Result<Self> {
        Self::with_timeouts(
            config.base_url.clone(),
            config.audio_timeout,
            config.service_timeout,
        )
    }

    fn with_timeouts(
        base_url: impl Into<String>,
        request_timeout: Duration,
        service_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url.into()),
            request_timeout,
            service_timeout,
        })
    }

    /// Create a client over an existing `reqwest::Client`
    ///
    /// Useful for sharing connection pools or proxy settings.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url.into()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            service_timeout: Duration::from_secs(15),
        }
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let url = self.url(endpoint);
        tracing::debug!("GET {}", url);

        let request = self
            .http
            .get(&url)
            .timeout(timeout.unwrap_or(self.request_timeout));

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("GET {} failed ({}): {}", url, status, detail);
            return Err(OdioError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if bytes.is_empty() {
            // 204 or an empty body decodes as null
            return Ok(serde_json::from_slice::<T>(b"null")?);
        }
        Ok(serde_json::from_slice::<T>(&bytes)?)
    }

    async fn post(&self, endpoint: &str, body: Option<serde_json::Value>) -> Result<()> {
        let url = self.url(endpoint);
        tracing::debug!("POST {}", url);

        let mut request = self.http.post(&url).timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("POST {} failed ({}): {}", url, status, detail);
            return Err(OdioError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(())
    }

    /// Fetch a list endpoint leniently: records that fail to decode are
    /// skipped with a diagnostic instead of aborting the whole snapshot.
    async fn get_records<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<T>> {
        let raw: serde_json::Value = self.get_json(endpoint, timeout).await?;
        let items = match raw {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(OdioError::InvalidResponse(format!(
                    "expected a list from {}",
                    endpoint
                )))
            }
        };

        let mut records = Vec::with_capacity(items.len());
        for value in items {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed record from {}: {} ({})", endpoint, e, value);
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl HostApi for OdioClient {
    async fn server_info(&self) -> Result<ServerInfo> {
        self.get_json(ENDPOINT_SERVER, None).await
    }

    async fn audio_clients(&self) -> Result<Vec<AudioClient>> {
        self.get_records(ENDPOINT_CLIENTS, None).await
    }

    async fn services(&self) -> Result<Vec<Service>> {
        self.get_records(ENDPOINT_SERVICES, Some(self.service_timeout))
            .await
    }

    async fn set_server_volume(&self, volume: Volume) -> Result<()> {
        self.post(ENDPOINT_SERVER_VOLUME, Some(json!({ "volume": volume })))
            .await
    }

    async fn set_server_muted(&self, muted: bool) -> Result<()> {
        self.post(ENDPOINT_SERVER_MUTE, Some(json!({ "muted": muted })))
            .await
    }

    async fn set_client_volume(&self, name: &str, volume: Volume) -> Result<()> {
        let endpoint = format!("/audio/clients/{}/volume", urlencoding::encode(name));
        self.post(&endpoint, Some(json!({ "volume": volume }))).await
    }

    async fn set_client_muted(&self, name: &str, muted: bool) -> Result<()> {
        let endpoint = format!("/audio/clients/{}/mute", urlencoding::encode(name));
        self.post(&endpoint, Some(json!({ "muted": muted }))).await
    }

    async fn control_service(
        &self,
        action: ServiceAction,
        scope: ServiceScope,
        unit: &str,
    ) -> Result<()> {
        let endpoint = format!(
            "/services/{}/{}/{}",
            scope,
            urlencoding::encode(unit),
            action
        );
        self.post(&endpoint, None).await
    }

    async fn power_capabilities(&self) -> Result<PowerCapabilities> {
        self.get_json(ENDPOINT_POWER, None).await
    }

    async fn power_off(&self) -> Result<()> {
        self.post(ENDPOINT_POWER_OFF, None).await
    }

    async fn reboot(&self) -> Result<()> {
        self.post(ENDPOINT_POWER_REBOOT, None).await
    }

    async fn events(&self, backends: &[&str]) -> Result<EventStream> {
        let url = format!(
            "{}?backends={}&exclude=player.position",
            self.url(ENDPOINT_EVENTS),
            backends.join(",")
        );
        tracing::debug!("GET {} (event stream)", url);

        // No request timeout: the stream stays open indefinitely and
        // keepalive windows are enforced by the consumer.
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OdioError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let mut body = response.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut buf = String::new();
            let mut event_type = String::new();
            let mut data = String::new();

            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(map_transport_error)?;
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim_end_matches('\r').to_string();
                    buf.drain(..=pos);

                    if line.is_empty() {
                        // Blank line terminates one SSE frame
                        if let Some(event) = HostEvent::from_wire(&event_type, &data) {
                            yield event;
                        } else if !event_type.is_empty() {
                            tracing::debug!("Ignoring unhandled event: {}", event_type);
                        }
                        event_type.clear();
                        data.clear();
                    } else if let Some(value) = line.strip_prefix("event:") {
                        event_type = value.trim().to_string();
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data = value.trim().to_string();
                    }
                    // Lines starting with ':' are comments, skipped
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn normalize_base_url(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn map_transport_error(e: reqwest::Error) -> OdioError {
    if e.is_timeout() {
        OdioError::Timeout
    } else {
        OdioError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> OdioClient {
        OdioClient::new(server.uri()).unwrap()
    }

    #[tokio::test]
    async fn fetches_server_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hostname": "server1",
                "backends": {"pulseaudio": true, "systemd": true}
            })))
            .mount(&server)
            .await;

        let info = client_for(&server).await.server_info().await.unwrap();
        assert_eq!(info.hostname, "server1");
        assert!(info.backends.pulseaudio);
        assert!(info.backends.systemd);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/audio/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "mpd", "host": "server1", "corked": false},
                {"id": 2},
                {"id": 3, "name": "Tunnel for bobby@desktop", "host": "desktop"}
            ])))
            .mount(&server)
            .await;

        let clients = client_for(&server).await.audio_clients().await.unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].name, "mpd");
        assert_eq!(clients[1].name, "Tunnel for bobby@desktop");
    }

    #[tokio::test]
    async fn null_list_bodies_decode_as_no_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let services = client_for(&server).await.services().await.unwrap();
        assert!(services.is_empty());
    }

    #[tokio::test]
    async fn non_list_payloads_are_invalid_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/audio/clients"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"oops": true})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).await.audio_clients().await.unwrap_err();
        assert!(matches!(err, OdioError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn client_commands_use_percent_encoded_names() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/clients/Tunnel%20for%20bobby%40desktop/volume"))
            .and(body_json(serde_json::json!({"volume": 0.5})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .set_client_volume("Tunnel for bobby@desktop", 0.5)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn service_control_builds_scoped_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/user/mpd.service/restart"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .control_service(ServiceAction::Restart, ServiceScope::User, "mpd.service")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/server/mute"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .set_server_muted(true)
            .await
            .unwrap_err();
        match err {
            OdioError::Api { status, detail } => {
                assert_eq!(status, 503);
                assert_eq!(detail, "backend down");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn event_stream_parses_sse_frames() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: server.info\ndata: \"connected\"\n\n",
            ": comment line\n",
            "event: audio.updated\ndata: []\n\n",
            "event: player.position\ndata: 3.2\n\n",
            "event: service.updated\ndata: {\"name\": \"mpd.service\"}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("backends", "audio,systemd"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let mut stream = client_for(&server)
            .await
            .events(&["audio", "systemd"])
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }
        assert_eq!(
            events,
            vec![
                HostEvent::Control("connected".to_string()),
                HostEvent::AudioUpdated,
                HostEvent::ServiceUpdated,
            ]
        );
    }
}
