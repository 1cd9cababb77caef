//! YOLO detector on ONNX Runtime
//!
//! Works with ultralytics YOLOv8/YOLO11 ONNX exports. The model output is
//! `[1, 4 + classes, anchors]` where every anchor holds a center-format box
//! followed by one score per class.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use super::{BoundingBox, Detector, LabelTable, RawDetection};
use crate::error::{AppError, DetectionError};
use crate::frame::Frame;

/// Gray used by ultralytics for letterbox padding
const PAD_VALUE: u8 = 114;

/// Post-processing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoloParams {
    /// Square model input size in pixels
    pub input_size: u32,
    /// Boxes of the same class overlapping more than this are suppressed
    pub iou_threshold: f32,
    /// Upper bound on detections returned per frame
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Transform between frame coordinates and the letterboxed model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Compute the letterbox for a `width`x`height` frame fitted into a
    /// `size`x`size` square.
    pub fn fit(width: u32, height: u32, size: u32) -> (Self, u32, u32) {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, size);
        let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, size);

        let pad_x = ((size - scaled_w) as f32 / 2.0 - 0.1).round().max(0.0);
        let pad_y = ((size - scaled_h) as f32 / 2.0 - 0.1).round().max(0.0);

        (Self { scale, pad_x, pad_y }, scaled_w, scaled_h)
    }

    /// Map a point from model input space back into the frame
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resize `frame` into a padded `size`x`size` RGB square and convert it to a
/// normalized NCHW tensor.
pub fn preprocess(frame: &Frame, size: u32) -> (Array4<f32>, Letterbox) {
    let (letterbox, scaled_w, scaled_h) = Letterbox::fit(frame.width(), frame.height(), size);

    let resized = imageops::resize(frame.image(), scaled_w, scaled_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    let side = size as usize;
    let input = Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });

    (input, letterbox)
}

/// Candidate box in frame coordinates before clipping
#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    bbox: [f32; 4],
}

/// Decode a raw output tensor into detections in frame coordinates.
///
/// Accepts both `[1, attrs, anchors]` and the transposed `[1, anchors, attrs]`
/// layout; the smaller axis is taken to be the attribute axis.
pub fn decode_output(
    output: &[f32],
    dims: &[usize],
    letterbox: &Letterbox,
    frame_width: u32,
    frame_height: u32,
    confidence_threshold: f32,
    params: &YoloParams,
) -> Result<Vec<RawDetection>, DetectionError> {
    let [batch, a, b] = dims else {
        return Err(DetectionError::Model(format!(
            "expected a rank-3 output, got shape {:?}",
            dims
        )));
    };
    if *batch != 1 {
        return Err(DetectionError::Model(format!("expected batch size 1, got {}", batch)));
    }

    let attribute_major = a <= b;
    let (attrs, anchors) = if attribute_major { (*a, *b) } else { (*b, *a) };
    if attrs <= 4 {
        return Err(DetectionError::Model(format!(
            "output has {} attributes per anchor, need at least 5",
            attrs
        )));
    }
    if output.len() != attrs * anchors {
        return Err(DetectionError::Model(format!(
            "output holds {} values, shape {:?} needs {}",
            output.len(),
            dims,
            attrs * anchors
        )));
    }

    let value = |anchor: usize, attr: usize| -> f32 {
        if attribute_major {
            output[attr * anchors + anchor]
        } else {
            output[anchor * attrs + attr]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..attrs - 4 {
            let score = value(anchor, 4 + class);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }

        if best_score <= confidence_threshold {
            continue;
        }

        let cx = value(anchor, 0);
        let cy = value(anchor, 1);
        let w = value(anchor, 2);
        let h = value(anchor, 3);

        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            bbox: [x1, y1, x2, y2],
        });
    }

    let kept = nms(candidates, params.iou_threshold, params.max_detections);

    let max_x = frame_width as f32;
    let max_y = frame_height as f32;
    Ok(kept
        .into_iter()
        .map(|c| RawDetection {
            class_id: c.class_id,
            confidence: c.confidence,
            bbox: BoundingBox::new(
                c.bbox[0].clamp(0.0, max_x) as i32,
                c.bbox[1].clamp(0.0, max_y) as i32,
                c.bbox[2].clamp(0.0, max_x) as i32,
                c.bbox[3].clamp(0.0, max_y) as i32,
            ),
        })
        .collect())
}

/// Greedy per-class non-maximum suppression, highest confidence first
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.len() >= max_detections {
            break;
        }
        let suppressed = keep.iter().any(|k| {
            k.class_id == candidate.class_id && calculate_iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// YOLO model loaded into an ONNX Runtime session
pub struct OnnxDetector {
    session: ort::session::Session,
    labels: LabelTable,
    params: YoloParams,
}

impl OnnxDetector {
    /// Load the model and read its label table from the ONNX metadata
    pub fn load(model_path: &Path, params: YoloParams) -> Result<Self, AppError> {
        if !model_path.exists() {
            return Err(AppError::ModelNotFound(model_path.to_path_buf()));
        }
        let load_err = |reason: String| AppError::ModelLoad {
            path: model_path.to_path_buf(),
            reason,
        };

        ort::init()
            .with_name("AslDetector")
            .commit()
            .map_err(|e| load_err(format!("Failed to initialize ORT: {}", e)))?;

        let session = ort::session::Session::builder()
            .map_err(|e| load_err(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| load_err(format!("Failed to set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| load_err(e.to_string()))?;

        log::info!("Loaded detection model from {:?}", model_path);

        let labels = match session.metadata().and_then(|meta| meta.custom("names")) {
            Ok(Some(raw)) => LabelTable::parse_metadata(&raw).unwrap_or_else(|| {
                log::warn!("Could not parse model class names: {}", raw);
                LabelTable::default()
            }),
            Ok(None) => {
                log::warn!("Model has no class names in its metadata");
                LabelTable::default()
            }
            Err(e) => {
                log::warn!("Failed to read model metadata: {}", e);
                LabelTable::default()
            }
        };
        log::info!("Model provides {} class labels", labels.len());

        Ok(Self {
            session,
            labels,
            params,
        })
    }

    /// Replace the label table read from the model
    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = labels;
        self
    }
}

impl Detector for OnnxDetector {
    fn predict(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        if frame.is_empty() {
            return Err(DetectionError::MalformedFrame(format!(
                "frame has zero size ({}x{})",
                frame.width(),
                frame.height()
            )));
        }

        let (input, letterbox) = preprocess(frame, self.params.input_size);
        let input_tensor = ort::value::Tensor::from_array(input)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        decode_output(
            data,
            &dims,
            &letterbox,
            frame.width(),
            frame.height(),
            confidence_threshold,
            &self.params,
        )
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }
}

/// Find the model file.
///
/// Absolute paths are used as-is. Relative paths are looked up next to the
/// executable (and up to two parent directories, for `cargo run` from
/// `target/<profile>`) and then in the working directory.
pub fn find_model(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }

    if let Ok(exe_path) = std::env::current_exe() {
        let mut dir = exe_path.parent().map(Path::to_path_buf);
        for _ in 0..3 {
            let Some(current) = dir else { break };
            let candidate = current.join(path);
            if candidate.exists() {
                return Some(candidate);
            }
            dir = current.parent().map(Path::to_path_buf);
        }
    }

    let cwd = std::env::current_dir().ok()?;
    let candidate = cwd.join(path);
    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an attribute-major `[1, 4 + classes, anchors]` tensor
    fn tensor(anchors: &[([f32; 4], Vec<f32>)]) -> (Vec<f32>, Vec<usize>) {
        let classes = anchors[0].1.len();
        let attrs = 4 + classes;
        let n = anchors.len();
        let mut out = vec![0.0; attrs * n];
        for (i, (bbox, scores)) in anchors.iter().enumerate() {
            for k in 0..4 {
                out[k * n + i] = bbox[k];
            }
            for (c, s) in scores.iter().enumerate() {
                out[(4 + c) * n + i] = *s;
            }
        }
        (out, vec![1, attrs, n])
    }

    fn identity() -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    #[test]
    fn test_letterbox_fit_landscape() {
        let (lb, w, h) = Letterbox::fit(1280, 720, 640);
        assert_eq!((w, h), (640, 360));
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);
    }

    #[test]
    fn test_letterbox_inverse_maps_back_to_frame() {
        let (lb, _, _) = Letterbox::fit(1280, 720, 640);
        let (x, y) = lb.to_frame(320.0, 140.0 + 180.0);
        assert!((x - 640.0).abs() < 1e-3);
        assert!((y - 360.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let frame = Frame::filled(64, 32, [255, 0, 0]);
        let (input, lb) = preprocess(&frame, 32);
        assert_eq!(input.shape(), &[1, 3, 32, 32]);
        assert_eq!(lb.pad_y, 8.0);

        let pad = PAD_VALUE as f32 / 255.0;
        assert!((input[[0, 0, 0, 0]] - pad).abs() < 1e-6);
        assert!((input[[0, 0, 16, 16]] - 1.0).abs() < 1e-6);
        assert!(input[[0, 1, 16, 16]].abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_by_threshold() {
        let (out, dims) = tensor(&[
            ([50.0, 50.0, 20.0, 20.0], vec![0.9, 0.1]),
            ([150.0, 150.0, 20.0, 20.0], vec![0.2, 0.22]),
        ]);
        let dets = decode_output(&out, &dims, &identity(), 640, 640, 0.25, &YoloParams::default())
            .unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[0].bbox, BoundingBox::new(40, 40, 60, 60));

        let dets = decode_output(&out, &dims, &identity(), 640, 640, 0.05, &YoloParams::default())
            .unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[1].class_id, 1);
    }

    #[test]
    fn test_decode_nms_is_per_class() {
        let (out, dims) = tensor(&[
            ([50.0, 50.0, 20.0, 20.0], vec![0.9, 0.0]),
            ([51.0, 50.0, 20.0, 20.0], vec![0.8, 0.0]),
            ([50.0, 51.0, 20.0, 20.0], vec![0.0, 0.7]),
        ]);
        let dets = decode_output(&out, &dims, &identity(), 640, 640, 0.25, &YoloParams::default())
            .unwrap();
        assert_eq!(dets.len(), 2);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(dets[1].class_id, 1);
    }

    #[test]
    fn test_decode_respects_max_detections() {
        let (out, dims) = tensor(&[
            ([50.0, 50.0, 10.0, 10.0], vec![0.9]),
            ([200.0, 200.0, 10.0, 10.0], vec![0.8]),
            ([400.0, 400.0, 10.0, 10.0], vec![0.7]),
        ]);
        let params = YoloParams {
            max_detections: 2,
            ..Default::default()
        };
        let dets = decode_output(&out, &dims, &identity(), 640, 640, 0.25, &params).unwrap();
        assert_eq!(dets.len(), 2);
    }

    #[test]
    fn test_decode_clips_to_frame() {
        let (out, dims) = tensor(&[([5.0, 5.0, 20.0, 20.0], vec![0.9])]);
        let dets = decode_output(&out, &dims, &identity(), 100, 100, 0.25, &YoloParams::default())
            .unwrap();
        assert_eq!(dets[0].bbox, BoundingBox::new(0, 0, 15, 15));
    }

    #[test]
    fn test_decode_transposed_layout() {
        // [1, anchors, attrs] with 6 anchors of 5 attributes
        let mut out = vec![0.0; 6 * 5];
        out[2 * 5..3 * 5].copy_from_slice(&[100.0, 100.0, 10.0, 10.0, 0.95]);
        let dets = decode_output(&out, &[1, 6, 5], &identity(), 640, 640, 0.5, &YoloParams::default())
            .unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(95, 95, 105, 105));
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let params = YoloParams::default();
        assert!(decode_output(&[0.0; 8], &[1, 8], &identity(), 10, 10, 0.5, &params).is_err());
        assert!(decode_output(&[0.0; 8], &[1, 4, 2], &identity(), 10, 10, 0.5, &params).is_err());
        assert!(decode_output(&[0.0; 9], &[1, 5, 2], &identity(), 10, 10, 0.5, &params).is_err());
        assert!(decode_output(&[0.0; 20], &[2, 5, 2], &identity(), 10, 10, 0.5, &params).is_err());
    }

    #[test]
    fn test_iou() {
        assert_eq!(calculate_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
        assert!((calculate_iou(&[0.0, 0.0, 10.0, 10.0], &[0.0, 0.0, 10.0, 10.0]) - 1.0).abs() < 1e-6);
        let iou = calculate_iou(&[0.0, 0.0, 10.0, 10.0], &[5.0, 0.0, 15.0, 10.0]);
        assert!((iou - 50.0 / 150.0).abs() < 1e-6);
    }
}
