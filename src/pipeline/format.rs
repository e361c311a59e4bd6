//! Output format descriptors and the per-unit format set.

use crate::pipeline::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest pixel count that contributes to a format's score.
const MAX_SCORE_AREA: u64 = 100_000_000;

/// Pixel encoding of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Wildcard, only meaningful in a [`FormatPreference`].
    Any,
    Gray8,
    Gray16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Yuyv,
    Uyvy,
    I420,
    Nv12,
    BayerRggb8,
    BayerBggr8,
    BayerGbrg8,
    BayerGrbg8,
    Mjpeg,
}

impl PixelFormat {
    /// Short label used in default format names.
    pub fn nickname(self) -> &'static str {
        match self {
            PixelFormat::Any => "any",
            PixelFormat::Gray8 => "Gray",
            PixelFormat::Gray16 => "Gray16",
            PixelFormat::Rgb8 => "RGB",
            PixelFormat::Bgr8 => "BGR",
            PixelFormat::Rgba8 => "RGBA",
            PixelFormat::Bgra8 => "BGRA",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Uyvy => "UYVY",
            PixelFormat::I420 => "I420",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::BayerRggb8 => "BayerRGGB",
            PixelFormat::BayerBggr8 => "BayerBGGR",
            PixelFormat::BayerGbrg8 => "BayerGBRG",
            PixelFormat::BayerGrbg8 => "BayerGRBG",
            PixelFormat::Mjpeg => "MJPEG",
        }
    }

    /// Bits per pixel of uncompressed encodings.
    pub fn bits_per_pixel(self) -> Option<u32> {
        match self {
            PixelFormat::Gray8
            | PixelFormat::BayerRggb8
            | PixelFormat::BayerBggr8
            | PixelFormat::BayerGbrg8
            | PixelFormat::BayerGrbg8 => Some(8),
            PixelFormat::I420 | PixelFormat::Nv12 => Some(12),
            PixelFormat::Gray16 | PixelFormat::Yuyv | PixelFormat::Uyvy => Some(16),
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => Some(24),
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(32),
            PixelFormat::Any | PixelFormat::Mjpeg => None,
        }
    }

    /// Planar encodings store chroma after the full-resolution luma plane.
    pub fn is_planar(self) -> bool {
        matches!(self, PixelFormat::I420 | PixelFormat::Nv12)
    }

    /// Stable numeric tag, used in on-disk records.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Inverse of [`PixelFormat::tag`].
    pub fn from_tag(tag: u32) -> Option<Self> {
        const ALL: [PixelFormat; 16] = [
            PixelFormat::Any,
            PixelFormat::Gray8,
            PixelFormat::Gray16,
            PixelFormat::Rgb8,
            PixelFormat::Bgr8,
            PixelFormat::Rgba8,
            PixelFormat::Bgra8,
            PixelFormat::Yuyv,
            PixelFormat::Uyvy,
            PixelFormat::I420,
            PixelFormat::Nv12,
            PixelFormat::BayerRggb8,
            PixelFormat::BayerBggr8,
            PixelFormat::BayerGbrg8,
            PixelFormat::BayerGrbg8,
            PixelFormat::Mjpeg,
        ];
        ALL.into_iter().find(|pf| pf.tag() == tag)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nickname())
    }
}

/// Shape of the frames a unit emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFormat {
    pub pixel_format: PixelFormat,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Bytes per row; zero for compressed encodings.
    pub row_stride: u32,
    pub max_data_size: usize,
}

impl UnitFormat {
    /// Format with the default name, stride and payload size for `pixel_format`.
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Result<Self, FormatError> {
        let (row_stride, max_data_size) = default_layout(pixel_format, width, height)?;
        Self::with_layout(pixel_format, None, width, height, row_stride, max_data_size)
    }

    /// Fully specified format. `name` defaults to `"<w>x<h> <nickname>"`.
    pub fn with_layout(
        pixel_format: PixelFormat,
        name: Option<&str>,
        width: u32,
        height: u32,
        row_stride: u32,
        max_data_size: usize,
    ) -> Result<Self, FormatError> {
        if width == 0 || height == 0 {
            return Err(FormatError::ZeroDimension { width, height });
        }
        if row_stride as usize * height as usize > max_data_size {
            return Err(FormatError::PayloadTooSmall {
                stride: row_stride,
                height,
                max_data_size,
            });
        }
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("{}x{} {}", width, height, pixel_format.nickname()),
        };
        Ok(Self {
            pixel_format,
            name,
            width,
            height,
            row_stride,
            max_data_size,
        })
    }

    /// Bytes a tightly packed frame of this format occupies.
    pub fn frame_size(&self) -> usize {
        if self.row_stride == 0 {
            self.max_data_size
        } else if self.pixel_format.is_planar() {
            self.row_stride as usize * self.height as usize * 3 / 2
        } else {
            self.row_stride as usize * self.height as usize
        }
    }
}

impl PartialEq for UnitFormat {
    fn eq(&self, other: &Self) -> bool {
        self.pixel_format == other.pixel_format
            && self.name == other.name
            && self.width == other.width
            && self.height == other.height
            && self.row_stride == other.row_stride
    }
}

impl Eq for UnitFormat {}

impl fmt::Display for UnitFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn default_layout(pixel_format: PixelFormat, width: u32, height: u32) -> Result<(u32, usize), FormatError> {
    let overflow = || FormatError::LayoutOverflow { width, height };
    let pixels = (width as usize).checked_mul(height as usize).ok_or_else(overflow)?;
    match pixel_format.bits_per_pixel() {
        Some(_) if pixel_format.is_planar() => {
            let size = pixels.checked_mul(3).ok_or_else(overflow)? / 2;
            Ok((width, size))
        }
        Some(bpp) => {
            let stride = u32::try_from(u64::from(width) * u64::from(bpp) / 8).map_err(|_| overflow())?;
            let size = (stride as usize).checked_mul(height as usize).ok_or_else(overflow)?;
            Ok((stride, size))
        }
        // Compressed payloads get a generous upper bound.
        None => Ok((0, pixels.checked_mul(3).ok_or_else(overflow)?)),
    }
}

/// Hints used to pick a format when `stream_init` is called without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPreference {
    pub pixel_format: PixelFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub name: Option<String>,
}

impl Default for FormatPreference {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Any,
            width: None,
            height: None,
            name: None,
        }
    }
}

impl FormatPreference {
    /// Larger formats score higher; every matching preference outweighs any size.
    pub fn score(&self, format: &UnitFormat) -> u64 {
        let area = u64::from(format.width) * u64::from(format.height);
        let mut score = area.min(MAX_SCORE_AREA);
        if self.pixel_format != PixelFormat::Any && self.pixel_format == format.pixel_format {
            score += 3 * MAX_SCORE_AREA;
        }
        if self.width == Some(format.width) {
            score += MAX_SCORE_AREA;
        }
        if self.height == Some(format.height) {
            score += MAX_SCORE_AREA;
        }
        if self.name.as_deref() == Some(format.name.as_str()) {
            score += MAX_SCORE_AREA;
        }
        score
    }
}

/// Ordered list of the formats a unit currently advertises.
#[derive(Debug, Clone, Default)]
pub struct FormatSet {
    formats: Vec<UnitFormat>,
    changed: bool,
}

impl FormatSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `format`. Duplicates are ignored.
    pub fn add(&mut self, format: UnitFormat) {
        if !self.formats.contains(&format) {
            self.formats.push(format);
            self.changed = true;
        }
    }

    pub fn remove(&mut self, format: &UnitFormat) -> bool {
        let before = self.formats.len();
        self.formats.retain(|f| f != format);
        let removed = self.formats.len() != before;
        self.changed |= removed;
        removed
    }

    pub fn clear(&mut self) {
        if !self.formats.is_empty() {
            self.formats.clear();
            self.changed = true;
        }
    }

    pub fn contains(&self, format: &UnitFormat) -> bool {
        self.formats.contains(format)
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn get(&self, index: usize) -> Option<&UnitFormat> {
        self.formats.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitFormat> {
        self.formats.iter()
    }

    pub fn to_vec(&self) -> Vec<UnitFormat> {
        self.formats.clone()
    }

    /// Highest scoring format; ties keep the earliest.
    pub fn best_match(&self, preference: &FormatPreference) -> Option<&UnitFormat> {
        let mut best: Option<(&UnitFormat, u64)> = None;
        for format in &self.formats {
            let score = preference.score(format);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((format, score));
            }
        }
        best.map(|(f, _)| f)
    }

    /// Report and reset whether the set was modified.
    pub(crate) fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}
