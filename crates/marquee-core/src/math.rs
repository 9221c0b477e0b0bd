//! Math utilities
//!
//! Integer picture sizes and the fitting rules used when an image is decoded for a
//! display box smaller than the image itself.

use serde::{Deserialize, Serialize};

/// Integer width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size2 {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Size2 {
    /// The zero size, used as "not recorded"
    pub const ZERO: Self = Self {
        width: 0,
        height: 0,
    };

    /// Create a size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes needed to hold this size as 32-bit RGBA
    pub fn rgba_bytes(&self) -> usize {
        self.area() * 4
    }

    /// True when this size exceeds `other` on either axis
    pub fn exceeds(&self, other: Size2) -> bool {
        self.width > other.width || self.height > other.height
    }
}

/// The largest size a texture will be displayed at
///
/// With `external_zoom` the picture is expected to cover the box (and be cropped),
/// otherwise it must fit inside it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MaxSizeInfo {
    /// Box width
    pub width: f32,
    /// Box height
    pub height: f32,
    /// Fill the box instead of fitting inside it
    pub external_zoom: bool,
}

impl MaxSizeInfo {
    /// Create a max size box
    pub fn new(width: f32, height: f32, external_zoom: bool) -> Self {
        Self {
            width,
            height,
            external_zoom,
        }
    }

    /// True when the box does not constrain anything
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Box dimensions truncated to whole pixels
    pub fn size(&self) -> Size2 {
        Size2::new(self.width.max(0.0) as u32, self.height.max(0.0) as u32)
    }
}

/// Scale `image` so it fits inside `max`, preserving aspect ratio
///
/// The image is first scaled by the larger of the two axis ratios and then clamped on
/// each axis, which yields the largest size that fits. With `external_zoom` the
/// smallest covering size is returned instead (see [`picture_min_size`]).
pub fn adjust_picture_size(image: Size2, max: Size2, external_zoom: bool) -> Size2 {
    if external_zoom {
        let (w, h) = picture_min_size(
            (image.width as f32, image.height as f32),
            (max.width as f32, max.height as f32),
        );
        return Size2::new(w as u32, h as u32);
    }

    if image.is_empty() {
        return image;
    }

    let max_x = max.width as f64;
    let max_y = max.height as f64;
    let x_coef = max_x / image.width as f64;
    let y_coef = max_y / image.height as f64;
    let coef = x_coef.max(y_coef);

    let mut cx = (image.width as f64 * coef) as u32;
    let mut cy = (image.height as f64 * coef) as u32;

    if cx > max.width {
        cy = (cy as f64 * max_x / cx as f64) as u32;
        cx = max.width;
    }

    if cy > max.height {
        cx = (cx as f64 * max_y / cy as f64) as u32;
        cy = max.height;
    }

    Size2::new(cx, cy)
}

/// Smallest size preserving the aspect ratio of `image` that covers `max`
pub fn picture_min_size(image: (f32, f32), max: (f32, f32)) -> (f32, f32) {
    let (image_w, image_h) = image;
    if image_w == 0.0 || image_h == 0.0 {
        return image;
    }

    let (mut cx, mut cy) = max;
    let x_coef = max.0 / image_w;
    let y_coef = max.1 / image_h;

    if image_w * y_coef < max.0 {
        cy = image_h * x_coef;
    } else {
        cx = image_w * y_coef;
    }

    (cx, cy)
}
