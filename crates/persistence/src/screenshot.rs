// ---------------------------------------------------------------------------
// screenshot – Save thumbnail pipeline
// ---------------------------------------------------------------------------
//
// A save with a screenshot parks its context here until the host reports the
// captured frame. The frame is center-cropped to the thumbnail aspect ratio,
// scaled and PNG encoded before being attached to the save.

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::host::{CaptureHandle, CapturedFrame};
use crate::persist_error::PersistError;
use crate::save_info::CustomSaveInfo;

/// An in-flight save waiting for its frame capture.
#[derive(Debug, Clone)]
pub(crate) struct SaveOperationContext {
    pub slot: String,
    pub title: String,
    pub custom: Option<CustomSaveInfo>,
    pub capture: CaptureHandle,
}

/// Center crop to the `width:height` aspect ratio, then scale to exactly
/// `width` x `height`.
pub fn crop_and_scale(frame: &CapturedFrame, width: u32, height: u32) -> Result<RgbaImage, PersistError> {
    if width == 0 || height == 0 {
        return Err(PersistError::Serialization(
            "thumbnail size must be non-zero".to_string(),
        ));
    }
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.pixels.clone()).ok_or_else(
        || {
            PersistError::Serialization(format!(
                "captured frame is {} bytes, expected {}x{} RGBA",
                frame.pixels.len(),
                frame.width,
                frame.height
            ))
        },
    )?;
    if frame.width == 0 || frame.height == 0 {
        return Err(PersistError::Serialization("captured frame is empty".to_string()));
    }

    // Compare frame.width / frame.height against width / height without floats.
    let frame_wide = u64::from(frame.width) * u64::from(height);
    let target_wide = u64::from(width) * u64::from(frame.height);
    let (crop_w, crop_h) = if frame_wide > target_wide {
        let w = (u64::from(frame.height) * u64::from(width) / u64::from(height)) as u32;
        (w.max(1), frame.height)
    } else {
        let h = (u64::from(frame.width) * u64::from(height) / u64::from(width)) as u32;
        (frame.width, h.max(1))
    };
    let x = (frame.width - crop_w) / 2;
    let y = (frame.height - crop_h) / 2;

    let cropped = imageops::crop_imm(&image, x, y, crop_w, crop_h).to_image();
    Ok(imageops::resize(&cropped, width, height, FilterType::Triangle))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PersistError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| PersistError::Serialization(format!("PNG encoding failed: {e}")))?;
    Ok(out)
}

/// Full pipeline from captured frame to thumbnail bytes.
pub fn make_thumbnail(frame: &CapturedFrame, width: u32, height: u32) -> Result<Vec<u8>, PersistError> {
    encode_png(&crop_and_scale(frame, width, height)?)
}
