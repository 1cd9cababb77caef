//! Detection overlay
//!
//! Draws a box around every detection and its label just above the box's
//! top-left corner, directly into the frame's pixels.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use image::{Rgb, RgbImage};

use crate::frame::Frame;
use crate::ml::{BoundingBox, Detection};

/// Visual style of the overlay
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    /// RGB color for boxes and labels
    pub color: [u8; 3],
    /// Box line width in pixels
    pub stroke_width: u32,
    /// Distance between the label's baseline and the top of the box
    pub label_offset: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: [0, 255, 0],
            stroke_width: 2,
            label_offset: 10,
        }
    }
}

impl OverlayStyle {
    fn rgb(&self) -> Rgb888 {
        Rgb888::new(self.color[0], self.color[1], self.color[2])
    }
}

/// Draw every detection onto the frame
pub fn annotate(frame: &mut Frame, detections: &[Detection], style: &OverlayStyle) {
    for detection in detections {
        draw_box(frame, &detection.bbox, style);
        draw_label(
            frame,
            detection.bbox.x1,
            detection.bbox.y1 - style.label_offset,
            &detection.label,
            style,
        );
    }
}

/// Draw a stroked rectangle; the stroke lies inside the box
pub fn draw_box(frame: &mut Frame, bbox: &BoundingBox, style: &OverlayStyle) {
    let rect = Rectangle::with_corners(Point::new(bbox.x1, bbox.y1), Point::new(bbox.x2, bbox.y2));
    match rect
        .into_styled(PrimitiveStyle::with_stroke(style.rgb(), style.stroke_width))
        .draw(&mut Target(frame.image_mut()))
    {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

/// Draw `text` with its baseline starting at (`x`, `y`)
pub fn draw_label(frame: &mut Frame, x: i32, y: i32, text: &str, style: &OverlayStyle) {
    let character_style = MonoTextStyle::new(&FONT_10X20, style.rgb());
    match Text::with_baseline(text, Point::new(x, y), character_style, Baseline::Alphabetic)
        .draw(&mut Target(frame.image_mut()))
    {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

/// Adapter that lets embedded-graphics draw into an RGB image, discarding
/// pixels outside of it
struct Target<'a>(&'a mut RgbImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size {
                width: self.0.width(),
                height: self.0.height(),
            },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && (point.x as u32) < self.0.width()
                && point.y >= 0
                && (point.y as u32) < self.0.height()
            {
                self.0
                    .put_pixel(point.x as u32, point.y as u32, Rgb([color.r(), color.g(), color.b()]));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 3] = [0, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];

    fn detection(label: &str, bbox: BoundingBox) -> Detection {
        Detection {
            label: label.to_string(),
            confidence: 0.9,
            bbox,
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        frame.image().get_pixel(x, y).0
    }

    #[test]
    fn test_draw_box_outline_only() {
        let mut frame = Frame::filled(100, 100, BLACK);
        draw_box(&mut frame, &BoundingBox::new(20, 30, 60, 80), &OverlayStyle::default());

        assert_eq!(pixel(&frame, 20, 30), GREEN);
        assert_eq!(pixel(&frame, 21, 50), GREEN);
        assert_eq!(pixel(&frame, 60, 80), GREEN);
        assert_eq!(pixel(&frame, 40, 55), BLACK);
        assert_eq!(pixel(&frame, 10, 10), BLACK);
    }

    #[test]
    fn test_label_drawn_above_box() {
        let mut frame = Frame::filled(200, 200, BLACK);
        annotate(
            &mut frame,
            &[detection("A", BoundingBox::new(50, 100, 150, 180))],
            &OverlayStyle::default(),
        );

        // Glyph cells span 10x20 pixels ending near the baseline at y = 90
        let label_pixels = (50..60)
            .flat_map(|x| (70..95).map(move |y| (x, y)))
            .filter(|&(x, y)| pixel(&frame, x, y) == GREEN)
            .count();
        assert!(label_pixels > 0);
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut frame = Frame::filled(20, 20, BLACK);
        annotate(
            &mut frame,
            &[detection("Z", BoundingBox::new(-10, -10, 50, 50))],
            &OverlayStyle::default(),
        );
        assert_eq!(pixel(&frame, 10, 10), BLACK);
    }

    #[test]
    fn test_custom_style() {
        let mut frame = Frame::filled(50, 50, BLACK);
        let style = OverlayStyle {
            color: [255, 0, 0],
            stroke_width: 1,
            label_offset: 10,
        };
        draw_box(&mut frame, &BoundingBox::new(10, 10, 40, 40), &style);
        assert_eq!(pixel(&frame, 10, 10), [255, 0, 0]);
        assert_eq!(pixel(&frame, 11, 11), BLACK);
    }
}
