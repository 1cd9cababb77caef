//! Frame buffers
//!
//! A [`Frame`] is one captured RGB image. It lives for a single tick: it is
//! captured, mirrored, fed to the detector, annotated and finally converted
//! into a [`DisplayFrame`] for the video surface.

use image::{imageops, Rgb, RgbImage};

/// Captured camera frame (3-channel RGB8)
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap an RGB image
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build a frame from tightly packed RGB bytes.
    ///
    /// Returns `None` if `data` does not hold exactly `width * height * 3` bytes.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(Self::new)
    }

    /// Solid-color frame
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Flip the frame around its vertical axis so on-screen motion matches
    /// the user's own motion.
    pub fn mirror(&mut self) {
        imageops::flip_horizontal_in_place(&mut self.image);
    }

    /// Convert into the RGBA layout the video surface uploads
    pub fn to_display(&self) -> DisplayFrame {
        let mut rgba = Vec::with_capacity(self.image.as_raw().len() / 3 * 4);
        for px in self.image.pixels() {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        DisplayFrame {
            width: self.width(),
            height: self.height(),
            rgba,
        }
    }
}

/// Annotated frame ready for the display surface
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixel data
    pub rgba: Vec<u8>,
}

impl DisplayFrame {
    /// Size as `[width, height]` in pixels, as egui expects it
    pub fn size(&self) -> [usize; 2] {
        [self.width as usize, self.height as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 40) as u8, (y * 60) as u8, ((x + y) * 10) as u8])
        });
        Frame::new(image)
    }

    #[test]
    fn test_mirror_swaps_columns() {
        let mut frame = gradient(4, 2);
        let original = frame.clone();
        frame.mirror();

        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(
                    frame.image().get_pixel(x, y),
                    original.image().get_pixel(3 - x, y)
                );
            }
        }
    }

    #[test]
    fn test_mirror_twice_is_identity() {
        let mut frame = gradient(7, 5);
        let original = frame.clone();
        frame.mirror();
        assert_ne!(frame, original);
        frame.mirror();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_from_rgb_rejects_wrong_length() {
        assert!(Frame::from_rgb(2, 2, vec![0; 11]).is_none());
        assert!(Frame::from_rgb(2, 2, vec![0; 12]).is_some());
    }

    #[test]
    fn test_to_display_adds_opaque_alpha() {
        let frame = Frame::filled(2, 1, [10, 20, 30]);
        let display = frame.to_display();
        assert_eq!(display.size(), [2, 1]);
        assert_eq!(display.rgba, vec![10, 20, 30, 255, 10, 20, 30, 255]);
    }
}
