//! Motion-JPEG AVI muxer.
//!
//! File layout (AVI 1.0, single video stream):
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     'avih'            main header
//!     LIST 'strl'
//!       'strh'          stream header (vids / MJPG)
//!       'strf'          BITMAPINFOHEADER
//!   LIST 'movi'
//!     '00dc' ...        one JPEG per frame, padded to even length
//!   'idx1'              keyframe index, offsets relative to 'movi'
//! ```
//!
//! Frame counts and sizes are placeholders until [`MjpegAviWriter::close`]
//! appends the index and patches the headers.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::MediaWriter;
use crate::error::{MediaError, MediaResult};

const HEADER_LEN: usize = 224;

// Byte offsets of the fields patched on close.
const RIFF_SIZE_OFFSET: u64 = 4;
const AVIH_MAX_BYTES_PER_SEC_OFFSET: u64 = 36;
const AVIH_TOTAL_FRAMES_OFFSET: u64 = 48;
const AVIH_SUGGESTED_BUFFER_OFFSET: u64 = 60;
const STRH_LENGTH_OFFSET: u64 = 140;
const STRH_SUGGESTED_BUFFER_OFFSET: u64 = 144;
const MOVI_SIZE_OFFSET: u64 = 216;

const HDRL_SIZE: u32 = 192;
const STRL_SIZE: u32 = 116;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

/// Largest file AVI 1.0 can describe.
const MAX_FILE_LEN: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u32,
    size: u32,
}

/// Writes RGB frames as motion-JPEG into an AVI container.
pub struct MjpegAviWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    width: u32,
    height: u32,
    fps: u32,
    quality: u8,
    index: Vec<IndexEntry>,
    /// Bytes of frame chunks after the 'movi' fourcc
    movi_len: u64,
    max_chunk: u32,
    jpeg: Vec<u8>,
}

impl MjpegAviWriter {
    /// Create the file and write provisional headers.
    pub fn create(path: &Path, width: u32, height: u32, fps: u32, quality: u8) -> MediaResult<Self> {
        if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(MediaError::writer_open_failed(
                path,
                format!("unsupported frame size {}x{}", width, height),
            ));
        }
        if fps == 0 {
            return Err(MediaError::writer_open_failed(path, "fps must be positive"));
        }

        let file =
            File::create(path).map_err(|e| MediaError::writer_open_failed(path, e.to_string()))?;
        let mut out = BufWriter::new(file);
        out.write_all(&header(width, height, fps))
            .map_err(|e| MediaError::writer_open_failed(path, e.to_string()))?;

        debug!(path = %path.display(), width, height, fps, quality, "Opened MJPEG writer");

        Ok(Self {
            path: path.to_path_buf(),
            out: Some(out),
            width,
            height,
            fps,
            quality: quality.clamp(1, 100),
            index: Vec::new(),
            movi_len: 0,
            max_chunk: 0,
            jpeg: Vec::new(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.out.is_some()
    }

    fn encode(&mut self, image: &RgbImage) -> MediaResult<()> {
        // Cameras may change resolution mid-event; the stream keeps its size.
        let frame: Cow<'_, RgbImage> = if image.dimensions() == (self.width, self.height) {
            Cow::Borrowed(image)
        } else {
            Cow::Owned(imageops::resize(image, self.width, self.height, FilterType::Triangle))
        };

        self.jpeg.clear();
        JpegEncoder::new_with_quality(&mut self.jpeg, self.quality)
            .encode(frame.as_raw(), self.width, self.height, ColorType::Rgb8)
            .map_err(|e| MediaError::EncodeFailed(e.to_string()))
    }

    fn finish(&mut self, mut out: BufWriter<File>) -> std::io::Result<()> {
        let frames = self.index.len() as u32;
        let idx_len = self.index.len() as u64 * 16;

        out.write_all(b"idx1")?;
        out.write_all(&(idx_len as u32).to_le_bytes())?;
        for entry in &self.index {
            out.write_all(b"00dc")?;
            out.write_all(&AVIIF_KEYFRAME.to_le_bytes())?;
            out.write_all(&entry.offset.to_le_bytes())?;
            out.write_all(&entry.size.to_le_bytes())?;
        }

        let file_len = HEADER_LEN as u64 + self.movi_len + 8 + idx_len;
        let max_bytes_per_sec = (self.max_chunk as u64 * self.fps as u64).min(u32::MAX as u64);

        patch_u32(&mut out, RIFF_SIZE_OFFSET, (file_len - 8) as u32)?;
        patch_u32(&mut out, AVIH_MAX_BYTES_PER_SEC_OFFSET, max_bytes_per_sec as u32)?;
        patch_u32(&mut out, AVIH_TOTAL_FRAMES_OFFSET, frames)?;
        patch_u32(&mut out, AVIH_SUGGESTED_BUFFER_OFFSET, self.max_chunk)?;
        patch_u32(&mut out, STRH_LENGTH_OFFSET, frames)?;
        patch_u32(&mut out, STRH_SUGGESTED_BUFFER_OFFSET, self.max_chunk)?;
        patch_u32(&mut out, MOVI_SIZE_OFFSET, (4 + self.movi_len) as u32)?;

        out.flush()?;
        out.get_ref().sync_all()
    }
}

impl MediaWriter for MjpegAviWriter {
    fn write(&mut self, image: &RgbImage) -> MediaResult<()> {
        if self.out.is_none() {
            return Err(MediaError::WriterClosed);
        }
        self.encode(image)?;

        let size = self.jpeg.len() as u32;
        let padded = size as u64 + (size as u64 & 1);
        let projected = HEADER_LEN as u64
            + self.movi_len
            + 8
            + padded
            + 8
            + (self.index.len() as u64 + 1) * 16;
        if projected > MAX_FILE_LEN {
            return Err(MediaError::write_failed(&self.path, "AVI size limit reached"));
        }

        let offset = (4 + self.movi_len) as u32;
        let Some(out) = self.out.as_mut() else {
            return Err(MediaError::WriterClosed);
        };
        let result = (|| {
            out.write_all(b"00dc")?;
            out.write_all(&size.to_le_bytes())?;
            out.write_all(&self.jpeg)?;
            if size & 1 == 1 {
                out.write_all(&[0])?;
            }
            Ok::<(), std::io::Error>(())
        })();
        result.map_err(|e| MediaError::write_failed(&self.path, e.to_string()))?;

        self.movi_len += 8 + padded;
        self.max_chunk = self.max_chunk.max(size);
        self.index.push(IndexEntry { offset, size });
        Ok(())
    }

    fn close(&mut self) -> MediaResult<()> {
        let Some(out) = self.out.take() else {
            return Ok(());
        };
        self.finish(out)
            .map_err(|e| MediaError::write_failed(&self.path, e.to_string()))?;
        debug!(path = %self.path.display(), frames = self.index.len(), "Closed MJPEG writer");
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn frames_written(&self) -> u64 {
        self.index.len() as u64
    }
}

impl Drop for MjpegAviWriter {
    fn drop(&mut self) {
        if self.out.is_some() {
            if let Err(e) = self.close() {
                warn!(path = %self.path.display(), error = %e, "Failed to finalize recording on drop");
            }
        }
    }
}

fn patch_u32(out: &mut BufWriter<File>, pos: u64, value: u32) -> std::io::Result<()> {
    out.seek(SeekFrom::Start(pos))?;
    out.write_all(&value.to_le_bytes())
}

/// Provisional file header; totals are patched on close.
fn header(width: u32, height: u32, fps: u32) -> Vec<u8> {
    let mut h = Vec::with_capacity(HEADER_LEN);
    let u32le = |h: &mut Vec<u8>, v: u32| h.extend_from_slice(&v.to_le_bytes());
    let u16le = |h: &mut Vec<u8>, v: u16| h.extend_from_slice(&v.to_le_bytes());

    h.extend_from_slice(b"RIFF");
    u32le(&mut h, 0);
    h.extend_from_slice(b"AVI ");

    h.extend_from_slice(b"LIST");
    u32le(&mut h, HDRL_SIZE);
    h.extend_from_slice(b"hdrl");

    h.extend_from_slice(b"avih");
    u32le(&mut h, 56);
    u32le(&mut h, 1_000_000 / fps); // microseconds per frame
    u32le(&mut h, 0); // max bytes per second
    u32le(&mut h, 0); // padding granularity
    u32le(&mut h, AVIF_HASINDEX);
    u32le(&mut h, 0); // total frames
    u32le(&mut h, 0); // initial frames
    u32le(&mut h, 1); // streams
    u32le(&mut h, 0); // suggested buffer size
    u32le(&mut h, width);
    u32le(&mut h, height);
    for _ in 0..4 {
        u32le(&mut h, 0);
    }

    h.extend_from_slice(b"LIST");
    u32le(&mut h, STRL_SIZE);
    h.extend_from_slice(b"strl");

    h.extend_from_slice(b"strh");
    u32le(&mut h, 56);
    h.extend_from_slice(b"vids");
    h.extend_from_slice(b"MJPG");
    u32le(&mut h, 0); // flags
    u16le(&mut h, 0); // priority
    u16le(&mut h, 0); // language
    u32le(&mut h, 0); // initial frames
    u32le(&mut h, 1); // scale
    u32le(&mut h, fps); // rate
    u32le(&mut h, 0); // start
    u32le(&mut h, 0); // length
    u32le(&mut h, 0); // suggested buffer size
    u32le(&mut h, u32::MAX); // quality: default
    u32le(&mut h, 0); // sample size
    u16le(&mut h, 0);
    u16le(&mut h, 0);
    u16le(&mut h, width as u16);
    u16le(&mut h, height as u16);

    h.extend_from_slice(b"strf");
    u32le(&mut h, 40);
    u32le(&mut h, 40); // biSize
    u32le(&mut h, width);
    u32le(&mut h, height);
    u16le(&mut h, 1); // planes
    u16le(&mut h, 24); // bit count
    h.extend_from_slice(b"MJPG");
    u32le(&mut h, width * height * 3);
    for _ in 0..4 {
        u32le(&mut h, 0);
    }

    h.extend_from_slice(b"LIST");
    u32le(&mut h, 4); // movi size
    h.extend_from_slice(b"movi");

    debug_assert_eq!(h.len(), HEADER_LEN);
    h
}

/// Summary of an AVI file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AviInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u32,
    /// `frame_count / fps`
    pub duration: f64,
    /// Stream handler fourcc, e.g. `MJPG`
    pub codec: String,
    pub size: u64,
}

#[derive(Default)]
struct Scan {
    width: Option<u32>,
    height: Option<u32>,
    total_frames: Option<u32>,
    scale: Option<u32>,
    rate: Option<u32>,
    codec: Option<String>,
    movi_start: Option<usize>,
    index: Vec<IndexEntry>,
}

/// Read the headers and index of an AVI file.
pub fn probe_avi(path: impl AsRef<Path>) -> MediaResult<AviInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let data = std::fs::read(path)?;
    let scan = scan(&data)?;

    let invalid = |what: &str| MediaError::InvalidMedia(format!("{}: missing {}", path.display(), what));
    let width = scan.width.ok_or_else(|| invalid("avih"))?;
    let height = scan.height.ok_or_else(|| invalid("avih"))?;
    let rate = scan.rate.ok_or_else(|| invalid("strh"))?;
    let scale = scan.scale.unwrap_or(1).max(1);
    let fps = rate as f64 / scale as f64;
    let frame_count = if scan.index.is_empty() {
        scan.total_frames.unwrap_or(0)
    } else {
        scan.index.len() as u32
    };

    Ok(AviInfo {
        width,
        height,
        fps,
        frame_count,
        duration: if fps > 0.0 { frame_count as f64 / fps } else { 0.0 },
        codec: scan.codec.unwrap_or_default(),
        size: data.len() as u64,
    })
}

/// Read every frame payload (JPEG bytes) listed in the index.
pub fn read_avi_frames(path: impl AsRef<Path>) -> MediaResult<Vec<Vec<u8>>> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let scan = scan(&data)?;
    let movi = scan
        .movi_start
        .ok_or_else(|| MediaError::InvalidMedia(format!("{}: missing movi", path.display())))?;

    scan.index
        .iter()
        .map(|entry| {
            let start = movi + entry.offset as usize + 8;
            data.get(start..start + entry.size as usize)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| {
                    MediaError::InvalidMedia(format!("{}: index points past end", path.display()))
                })
        })
        .collect()
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn scan(data: &[u8]) -> MediaResult<Scan> {
    if data.get(0..4) != Some(&b"RIFF"[..]) || data.get(8..12) != Some(&b"AVI "[..]) {
        return Err(MediaError::InvalidMedia("not a RIFF/AVI file".into()));
    }
    let mut scan = Scan::default();
    walk(data, 12, data.len(), &mut scan);
    Ok(scan)
}

/// Visit the chunks in `data[pos..end]`, descending into header lists.
fn walk(data: &[u8], mut pos: usize, end: usize, scan: &mut Scan) {
    while pos + 8 <= end {
        let Some(id) = data.get(pos..pos + 4) else {
            return;
        };
        let Some(size) = read_u32(data, pos + 4) else {
            return;
        };
        let body = pos + 8;
        // Unfinished files carry placeholder sizes; clamp to what exists.
        let body_end = (body + size as usize).min(end);

        match id {
            b"LIST" => {
                if data.get(body..body + 4) == Some(&b"movi"[..]) {
                    scan.movi_start = Some(body);
                } else {
                    walk(data, body + 4, body_end, scan);
                }
            }
            b"avih" => {
                scan.total_frames = read_u32(data, body + 16);
                scan.width = read_u32(data, body + 32);
                scan.height = read_u32(data, body + 36);
            }
            b"strh" => {
                scan.codec = data
                    .get(body + 4..body + 8)
                    .map(|c| String::from_utf8_lossy(c).into_owned());
                scan.scale = read_u32(data, body + 20);
                scan.rate = read_u32(data, body + 24);
            }
            b"idx1" => {
                let mut at = body;
                while at + 16 <= body_end {
                    if let (Some(offset), Some(size)) =
                        (read_u32(data, at + 8), read_u32(data, at + 12))
                    {
                        scan.index.push(IndexEntry { offset, size });
                    }
                    at += 16;
                }
            }
            _ => {}
        }

        pos = body + size as usize + (size as usize & 1);
    }
}
