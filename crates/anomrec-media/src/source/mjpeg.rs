//! Splitting continuous JPEG byte streams into single frames.
//!
//! Network cameras deliver motion JPEG either as an HTTP
//! `multipart/x-mixed-replace` body or, when ffmpeg decodes an RTSP stream,
//! as back-to-back JPEG images on a pipe. Both parsers are fed raw chunks
//! and hand back complete JPEG payloads.

use image::{ImageFormat, RgbImage};

use crate::error::{MediaError, MediaResult};

/// Upper bound on unparsed bytes held for one frame.
pub const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Boundary parameter of a `multipart/*` content type, without quotes.
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Incremental parser for a `multipart/x-mixed-replace` body.
///
/// Parts are located by their boundary line; `Content-Length` is honoured
/// when a part carries one, otherwise the part runs to the next boundary.
/// Cameras disagree on whether the declared boundary already includes the
/// leading `--`, so the bare token is searched for.
#[derive(Debug)]
pub struct MultipartParser {
    boundary: Vec<u8>,
    buf: Vec<u8>,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: boundary.as_bytes().to_vec(),
            buf: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete part body, or `None` until more bytes arrive.
    pub fn next_part(&mut self) -> MediaResult<Option<Vec<u8>>> {
        let Some(start) = find(&self.buf, &self.boundary, 0) else {
            // Keep a tail long enough to hold a split boundary.
            let keep = self.boundary.len();
            if self.buf.len() > keep {
                self.buf.drain(..self.buf.len() - keep);
            }
            return Ok(None);
        };

        let Some(line_end) = find(&self.buf, b"\n", start + self.boundary.len()) else {
            return self.check_pending();
        };

        let mut cursor = line_end + 1;
        let mut content_length = None;
        loop {
            let Some(end) = find(&self.buf, b"\n", cursor) else {
                return self.check_pending();
            };
            let line = trim_cr(&self.buf[cursor..end]);
            cursor = end + 1;
            if line.is_empty() {
                break;
            }
            content_length = content_length.or_else(|| parse_content_length(line));
        }
        let body_start = cursor;

        let (body_end, consumed) = match content_length {
            Some(len) => {
                let end = body_start + len;
                if self.buf.len() < end {
                    return self.check_pending();
                }
                (end, end)
            }
            None => {
                let Some(next) = find(&self.buf, &self.boundary, body_start) else {
                    return self.check_pending();
                };
                let mut end = next;
                let body = &self.buf[body_start..end];
                if body.ends_with(b"--") {
                    end -= 2;
                }
                if self.buf[body_start..end].ends_with(b"\n") {
                    end -= 1;
                }
                if self.buf[body_start..end].ends_with(b"\r") {
                    end -= 1;
                }
                (end, next)
            }
        };

        let part = self.buf[body_start..body_end].to_vec();
        self.buf.drain(..consumed);
        Ok(Some(part))
    }

    /// Newest complete part currently buffered, skipping older ones.
    pub fn latest_part(&mut self) -> MediaResult<Option<Vec<u8>>> {
        let mut latest = None;
        while let Some(part) = self.next_part()? {
            latest = Some(part);
        }
        Ok(latest)
    }

    fn check_pending(&self) -> MediaResult<Option<Vec<u8>>> {
        if self.buf.len() > MAX_PENDING_BYTES {
            return Err(MediaError::InvalidMedia(format!(
                "multipart part exceeds {MAX_PENDING_BYTES} bytes"
            )));
        }
        Ok(None)
    }
}

/// Splits concatenated JPEG images on their start and end markers.
#[derive(Debug, Default)]
pub struct JpegStreamParser {
    buf: Vec<u8>,
}

impl JpegStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn next_image(&mut self) -> MediaResult<Option<Vec<u8>>> {
        let Some(start) = find(&self.buf, &SOI, 0) else {
            // A lone 0xFF may be the first half of a marker.
            let keep = usize::from(self.buf.last() == Some(&0xFF));
            let drop = self.buf.len() - keep;
            self.buf.drain(..drop);
            return Ok(None);
        };
        let Some(end) = find(&self.buf, &EOI, start + SOI.len()) else {
            if self.buf.len() - start > MAX_PENDING_BYTES {
                return Err(MediaError::InvalidMedia(format!(
                    "jpeg frame exceeds {MAX_PENDING_BYTES} bytes"
                )));
            }
            return Ok(None);
        };
        let end = end + EOI.len();
        let image = self.buf[start..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(image))
    }

    /// Newest complete image currently buffered, skipping older ones.
    pub fn latest_image(&mut self) -> MediaResult<Option<Vec<u8>>> {
        let mut latest = None;
        while let Some(image) = self.next_image()? {
            latest = Some(image);
        }
        Ok(latest)
    }
}

/// Decode one JPEG payload received from camera `label`.
pub fn decode_jpeg(label: &str, data: &[u8]) -> MediaResult<RgbImage> {
    image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map(|image| image.to_rgb8())
        .map_err(|e| MediaError::source_unavailable(label, format!("bad jpeg frame: {e}")))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_content_length(line: &[u8]) -> Option<usize> {
    let line = std::str::from_utf8(line).ok()?;
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    value.trim().parse().ok()
}
