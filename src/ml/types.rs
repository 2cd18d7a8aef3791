use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

use crate::ml::error::{MlError, MlResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Channel order of an interleaved 3-channel pixel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorOrder {
    Rgb,
    Bgr,
}

/// A decoded video frame. Pixels are interleaved, row-major, three bytes per
/// pixel in `order`.
#[derive(Clone, Debug)]
pub struct Frame {
    pub dimensions: Dimensions,
    pub order: ColorOrder,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, order: ColorOrder, pixels: Vec<u8>) -> MlResult<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(MlError::Decode(format!(
                "frame buffer length {} does not match {width}x{height}x3",
                pixels.len()
            )));
        }
        Ok(Self {
            dimensions: Dimensions { width, height },
            order,
            pixels,
        })
    }

    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> MlResult<Self> {
        Self::new(width, height, ColorOrder::Rgb, pixels)
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Returns the frame in the requested channel order, borrowing when no
    /// conversion is needed.
    pub fn to_order(&self, order: ColorOrder) -> Cow<'_, Frame> {
        if self.order == order {
            return Cow::Borrowed(self);
        }
        let mut pixels = self.pixels.clone();
        for pixel in pixels.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        Cow::Owned(Frame {
            dimensions: self.dimensions.clone(),
            order,
            pixels,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.dimensions.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }
}

/// Face bounding box in pixel coordinates of its source frame. `right` and
/// `bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceBox {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn clamp_to(&self, dimensions: &Dimensions) -> FaceBox {
        FaceBox {
            top: self.top.min(dimensions.height),
            right: self.right.min(dimensions.width),
            bottom: self.bottom.min(dimensions.height),
            left: self.left.min(dimensions.width),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceDetection {
    pub bounds: FaceBox,
    pub frame_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "REAL")]
    Real = 0,
    #[serde(rename = "FAKE")]
    Fake = 1,
}

impl Label {
    pub fn from_index(index: usize) -> Option<Label> {
        match index {
            0 => Some(Label::Real),
            1 => Some(Label::Fake),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Real => "REAL",
            Label::Fake => "FAKE",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video-level verdict.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub probability: f32,
}

impl Prediction {
    pub const NO_FACE_PROBABILITY: f32 = 0.5;

    /// Verdict used when no face was found in any sampled frame.
    pub fn no_faces() -> Self {
        Self {
            label: Label::Real,
            probability: Self::NO_FACE_PROBABILITY,
        }
    }
}
