//! Still snapshots of the current frame.

use std::path::{Path, PathBuf};

use anomrec_models::snapshot_file_name;
use chrono::Local;
use image::ImageFormat;
use tracing::info;

use crate::error::MediaResult;
use crate::frame::Frame;

/// Save `frame` as `snapshot_cam{slot}_{stamp}.png` in `dir` and return the path.
pub fn save_snapshot(dir: &Path, slot: u32, frame: &Frame) -> MediaResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let local = frame.captured_at.with_timezone(&Local).naive_local();
    let path = dir.join(snapshot_file_name(slot, &local));

    frame.image.save_with_format(&path, ImageFormat::Png)?;
    info!(slot, path = %path.display(), "Snapshot saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_save_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let image = RgbImage::from_pixel(6, 4, Rgb([10, 200, 30]));
        let frame = Frame::new(image.clone(), 0.0, Utc::now());

        let path = save_snapshot(&dir.path().join("shots"), 1, &frame).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("snapshot_cam1_"));
        assert!(name.ends_with(".png"));

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded, image);
    }
}
