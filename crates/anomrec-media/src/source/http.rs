//! Network cameras over HTTP.
//!
//! The response to the camera URL decides the mode. A
//! `multipart/x-mixed-replace` body is an MJPEG stream: the connection stays
//! open and each read decodes the newest buffered part. Anything else is
//! treated as a still snapshot and re-requested on every read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anomrec_models::Credentials;
use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, info, warn};
use url::Url;

use super::mjpeg::{decode_jpeg, multipart_boundary, MultipartParser};
use super::FrameSource;
use crate::clock::Clock;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

enum Connection {
    Snapshot(Client),
    Stream {
        response: Response,
        parser: MultipartParser,
    },
}

impl Connection {
    fn mode(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Stream { .. } => "mjpeg",
        }
    }
}

/// HTTP camera serving either MJPEG streams or JPEG snapshots.
pub struct HttpCameraSource {
    url: String,
    credentials: Option<Credentials>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    connection: Option<Connection>,
}

impl HttpCameraSource {
    pub fn new(url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
            timeout: Duration::from_secs(5),
            clock,
            connection: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Limit for connecting and for waiting on each frame.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the open connection is a multipart stream.
    pub fn is_streaming(&self) -> bool {
        matches!(self.connection, Some(Connection::Stream { .. }))
    }

    async fn next_image(&mut self) -> MediaResult<RgbImage> {
        let label = self.label();
        let timeout = self.timeout;
        match &mut self.connection {
            None => Err(MediaError::source_unavailable(label, "not open")),
            Some(Connection::Snapshot(http)) => {
                let request = build_request(http, &self.url, self.credentials.as_ref());
                fetch_snapshot(&label, request.timeout(timeout)).await
            }
            Some(Connection::Stream { response, parser }) => loop {
                if let Some(part) = parser.latest_part()? {
                    return decode_jpeg(&label, &part);
                }
                match within(&label, timeout, response.chunk()).await? {
                    Some(chunk) => parser.push(&chunk),
                    None => return Err(MediaError::source_unavailable(label, "stream ended")),
                }
            },
        }
    }
}

fn build_request(http: &Client, url: &str, credentials: Option<&Credentials>) -> RequestBuilder {
    let request = http.get(url);
    match credentials {
        Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
        None => request,
    }
}

async fn within<T>(
    label: &str,
    timeout: Duration,
    fut: impl Future<Output = reqwest::Result<T>>,
) -> MediaResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(MediaError::source_unavailable(
            label,
            format!("no data within {}ms", timeout.as_millis()),
        )),
    }
}

fn check_status(label: &str, response: &Response) -> MediaResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(MediaError::source_unavailable(
            label,
            format!("camera returned {status}"),
        ))
    }
}

async fn fetch_snapshot(label: &str, request: RequestBuilder) -> MediaResult<RgbImage> {
    let response = request.send().await?;
    check_status(label, &response)?;
    let body = response.bytes().await?;
    decode_jpeg(label, &body)
}

#[async_trait]
impl FrameSource for HttpCameraSource {
    fn label(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    async fn open(&mut self) -> MediaResult<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let label = self.label();
        // No total request timeout: a stream body never completes.
        let http = Client::builder().connect_timeout(self.timeout).build()?;
        let request = build_request(&http, &self.url, self.credentials.as_ref());
        let response = within(&label, self.timeout, request.send()).await?;
        check_status(&label, &response)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let image = match multipart_boundary(&content_type) {
            Some(boundary) => {
                self.connection = Some(Connection::Stream {
                    response,
                    parser: MultipartParser::new(&boundary),
                });
                match self.next_image().await {
                    Ok(image) => image,
                    Err(e) => {
                        self.connection = None;
                        return Err(e);
                    }
                }
            }
            None => {
                let body = within(&label, self.timeout, response.bytes()).await?;
                let image = decode_jpeg(&label, &body)?;
                self.connection = Some(Connection::Snapshot(http));
                image
            }
        };

        info!(
            camera = %label,
            mode = self.connection.as_ref().map_or("", Connection::mode),
            width = image.width(),
            height = image.height(),
            "Network camera opened"
        );
        Ok(())
    }

    async fn read(&mut self) -> MediaResult<Frame> {
        match self.next_image().await {
            Ok(image) => Ok(Frame::new(image, self.clock.now(), Utc::now())),
            Err(e) => {
                warn!(camera = %self.label(), error = %e, "Network camera read failed");
                Err(e)
            }
        }
    }

    async fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(camera = %self.label(), mode = connection.mode(), "Network camera released");
        }
    }
}
