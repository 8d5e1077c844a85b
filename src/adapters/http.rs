//! Plain-HTTP GET client for the name service and the firmware server.
//!
//! Implements [`HttpPort`].  Every request uses a fresh connection with a
//! timeout of `connect + data` from [`NodeConfig`], so a dead server costs
//! at most one watchdog-safe interval.
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::http::client::EspHttpConnection`.
//! - **all other targets**: offline simulation: every request fails to connect.

use log::{debug, warn};

use crate::app::ports::{HttpError, HttpPort, HttpResponse, StreamHead};
use crate::config::NodeConfig;

#[cfg(target_os = "espidf")]
use esp_idf_svc::http::Method;
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

/// Parse a `Content-Length` header value.
pub fn parse_content_length(value: Option<&str>) -> Option<usize> {
    value?.trim().parse().ok()
}

pub struct HttpAdapter {
    timeout_ms: u32,
    #[cfg(target_os = "espidf")]
    stream: Option<EspHttpConnection>,
}

impl HttpAdapter {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            timeout_ms: config.http_connect_timeout_ms + config.http_data_timeout_ms,
            #[cfg(target_os = "espidf")]
            stream: None,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Connect, send the GET and read the response headers.
    #[cfg(target_os = "espidf")]
    fn request(&self, url: &str) -> Result<EspHttpConnection, HttpError> {
        let mut conn = EspHttpConnection::new(&Configuration {
            timeout: Some(std::time::Duration::from_millis(u64::from(self.timeout_ms))),
            ..Default::default()
        })
        .map_err(|e| {
            warn!("Http: client init failed: {}", e);
            HttpError::Connect
        })?;
        conn.initiate_request(Method::Get, url, &[]).map_err(|e| {
            debug!("Http: GET {} failed: {}", url, e);
            HttpError::Connect
        })?;
        conn.initiate_response().map_err(|e| {
            debug!("Http: no response from {}: {}", url, e);
            HttpError::Timeout
        })?;
        Ok(conn)
    }
}

#[cfg(target_os = "espidf")]
impl HttpPort for HttpAdapter {
    fn get(&mut self, url: &str, max_body: usize) -> Result<HttpResponse, HttpError> {
        let mut conn = self.request(url)?;
        let status = conn.status();
        let mut body = vec![0u8; max_body];
        let mut filled = 0;
        while filled < max_body {
            match conn.read(&mut body[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    warn!("Http: body read from {} failed: {}", url, e);
                    return Err(HttpError::Read);
                }
            }
        }
        body.truncate(filled);
        debug!("Http: GET {} -> {} ({} bytes)", url, status, filled);
        Ok(HttpResponse { status, body })
    }

    fn open_stream(&mut self, url: &str) -> Result<StreamHead, HttpError> {
        self.stream = None;
        let conn = self.request(url)?;
        let head = StreamHead {
            status: conn.status(),
            content_length: parse_content_length(conn.header("Content-Length")),
        };
        debug!("Http: stream {} -> {:?}", url, head);
        self.stream = Some(conn);
        Ok(head)
    }

    fn read_stream(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let conn = self.stream.as_mut().ok_or(HttpError::NoStream)?;
        conn.read(buf).map_err(|e| {
            warn!("Http: stream read failed: {}", e);
            HttpError::Read
        })
    }

    fn close_stream(&mut self) {
        self.stream = None;
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpPort for HttpAdapter {
    fn get(&mut self, url: &str, _max_body: usize) -> Result<HttpResponse, HttpError> {
        debug!("Http(sim): GET {} ({} ms timeout): offline", url, self.timeout_ms);
        Err(HttpError::Connect)
    }

    fn open_stream(&mut self, url: &str) -> Result<StreamHead, HttpError> {
        debug!("Http(sim): stream {}: offline", url);
        Err(HttpError::Connect)
    }

    fn read_stream(&mut self, _buf: &mut [u8]) -> Result<usize, HttpError> {
        Err(HttpError::NoStream)
    }

    fn close_stream(&mut self) {}
}
