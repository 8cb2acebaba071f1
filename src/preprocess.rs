//! Image preprocessing for detection model inference.
//!
//! Turns a decoded image into the NCHW float tensor the exported graph
//! expects, and remembers the letterbox transform so boxes can be mapped
//! back onto the original image.

use crate::types::detection::BoundingBox;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

/// Grey value used for letterbox padding
pub const PAD_VALUE: u8 = 114;

/// Letterbox transform applied to one image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale factor from original to network pixels
    pub gain: f32,
    /// Left padding in network pixels
    pub pad_x: f32,
    /// Top padding in network pixels
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    /// Compute the transform fitting `width x height` into `target` (height, width)
    pub fn compute(width: u32, height: u32, target: (u32, u32)) -> Self {
        let (th, tw) = target;
        let gain = (th as f32 / height as f32).min(tw as f32 / width as f32);

        let new_w = (width as f32 * gain).round();
        let new_h = (height as f32 * gain).round();
        let dw = (tw as f32 - new_w) / 2.0;
        let dh = (th as f32 - new_h) / 2.0;

        Self {
            gain,
            pad_x: (dw - 0.1).round().max(0.0),
            pad_y: (dh - 0.1).round().max(0.0),
            orig_width: width,
            orig_height: height,
        }
    }

    /// Resized (unpadded) size in network pixels
    pub fn scaled_size(&self) -> (u32, u32) {
        (
            ((self.orig_width as f32 * self.gain).round() as u32).max(1),
            ((self.orig_height as f32 * self.gain).round() as u32).max(1),
        )
    }

    /// Map a box from network space back onto the original image, clipped
    pub fn restore(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            (bbox.x1 - self.pad_x) / self.gain,
            (bbox.y1 - self.pad_y) / self.gain,
            (bbox.x2 - self.pad_x) / self.gain,
            (bbox.y2 - self.pad_y) / self.gain,
        )
        .clip(self.orig_width as f32, self.orig_height as f32)
    }
}

/// Model input tensor plus the transform that produced it
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// NCHW data, RGB, scaled to [0, 1]
    pub data: Vec<f32>,
    /// Tensor shape `[1, 3, height, width]`
    pub shape: [usize; 4],
    pub letterbox: Letterbox,
}

/// Letterbox an image to `target` (height, width) and lay it out as NCHW f32
pub fn prepare(image: &DynamicImage, target: (u32, u32)) -> PreparedInput {
    let (width, height) = image.dimensions();
    let letterbox = Letterbox::compute(width, height, target);
    let (new_w, new_h) = letterbox.scaled_size();

    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

    let (th, tw) = (target.0 as usize, target.1 as usize);
    let mut tensor = Array4::<f32>::from_elem((1, 3, th, tw), PAD_VALUE as f32 / 255.0);

    let (left, top) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (left + x as usize, top + y as usize);
        if tx >= tw || ty >= th {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
        }
    }

    let (data, _) = tensor.into_raw_vec_and_offset();
    PreparedInput {
        data,
        shape: [1, 3, th, tw],
        letterbox,
    }
}
