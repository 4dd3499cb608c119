//! SCRFD Face Detector
//!
//! Face detection with InsightFace SCRFD models.
//! Outputs bounding boxes and 5-point landmarks.

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use openvino::InferRequest;
use tracing::{debug, info, warn};

use super::preprocess::{
    image_to_nchw, letterbox, ChannelOrder, PixelScale, ResizeInfo, DETECTOR_INPUT_SIZE,
};
use super::runtime::{output_count, read_tensor_f32, InferenceRuntime, LoadedModel};

/// Face detection result
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub landmarks: [(f32, f32); 5],
}

/// Anything that can find landmark-annotated faces in an RGB image.
/// Results are returned in detection order.
pub trait FaceDetection {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>>;
}

/// Output layout of an SCRFD export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrfdLayout {
    strides: &'static [i32],
    use_kps: bool,
    num_anchors: usize,
}

impl ScrfdLayout {
    fn from_output_count(count: usize) -> Self {
        const THREE: &[i32] = &[8, 16, 32];
        const FIVE: &[i32] = &[8, 16, 32, 64, 128];

        match count {
            6 => Self { strides: THREE, use_kps: false, num_anchors: 2 },
            9 => Self { strides: THREE, use_kps: true, num_anchors: 2 },
            10 => Self { strides: FIVE, use_kps: false, num_anchors: 1 },
            15 => Self { strides: FIVE, use_kps: true, num_anchors: 1 },
            _ => {
                warn!("Unknown SCRFD output count: {}, trying default", count);
                Self { strides: THREE, use_kps: true, num_anchors: 2 }
            }
        }
    }

    /// Layout for `count` outputs, which must include keypoints
    fn with_keypoints(count: usize) -> Result<Self> {
        let layout = Self::from_output_count(count);
        anyhow::ensure!(
            layout.use_kps,
            "detector exports no keypoints ({} outputs); alignment needs 5-point landmarks",
            count
        );
        Ok(layout)
    }
}

/// SCRFD Face Detector
pub struct FaceDetector {
    model: LoadedModel,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    pub fn load(
        runtime: &mut InferenceRuntime,
        path: &Path,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Self> {
        let model = runtime.load("detector", path)?;
        Ok(Self {
            model,
            confidence_threshold,
            nms_threshold,
        })
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Decode SCRFD outputs into boxes in original image coordinates
    fn parse_outputs(&self, request: &InferRequest, resize_info: &ResizeInfo) -> Result<Vec<FaceBox>> {
        let layout = ScrfdLayout::with_keypoints(output_count(request))?;
        let fmc = layout.strides.len();
        let (input_w, input_h) = (DETECTOR_INPUT_SIZE.0 as i32, DETECTOR_INPUT_SIZE.1 as i32);

        let mut all_boxes = Vec::new();

        for (idx, &stride) in layout.strides.iter().enumerate() {
            let scores = read_tensor_f32(&request.get_output_tensor_by_index(idx)?)?;
            let bboxes = read_tensor_f32(&request.get_output_tensor_by_index(idx + fmc)?)?;
            let kps = read_tensor_f32(&request.get_output_tensor_by_index(idx + fmc * 2)?)?;

            let stride_f = stride as f32;
            let anchors = (0..input_h / stride).flat_map(move |y| {
                (0..input_w / stride).flat_map(move |x| {
                    std::iter::repeat((x as f32 * stride_f, y as f32 * stride_f))
                        .take(layout.num_anchors)
                })
            });

            let before = all_boxes.len();
            for (i, (cx, cy)) in anchors.enumerate() {
                let Some(&score) = scores.get(i) else { break };
                if score < self.confidence_threshold {
                    continue;
                }

                // Distance format: left, top, right, bottom
                let Some(d) = bboxes.get(i * 4..i * 4 + 4) else { continue };
                let (x1, y1) = resize_info.to_original(cx - d[0] * stride_f, cy - d[1] * stride_f);
                let (x2, y2) = resize_info.to_original(cx + d[2] * stride_f, cy + d[3] * stride_f);

                let Some(k) = kps.get(i * 10..i * 10 + 10) else {
                    anyhow::bail!("keypoint output too short for anchor {} at stride {}", i, stride);
                };
                let landmarks: [(f32, f32); 5] = std::array::from_fn(|j| {
                    resize_info.to_original(cx + k[j * 2] * stride_f, cy + k[j * 2 + 1] * stride_f)
                });

                let max_w = resize_info.original_width as f32;
                let max_h = resize_info.original_height as f32;
                all_boxes.push(FaceBox {
                    x1: x1.clamp(0.0, max_w),
                    y1: y1.clamp(0.0, max_h),
                    x2: x2.clamp(0.0, max_w),
                    y2: y2.clamp(0.0, max_h),
                    confidence: score,
                    landmarks,
                });
            }

            debug!("Stride {} found {} faces", stride, all_boxes.len() - before);
        }

        Ok(all_boxes)
    }
}

impl FaceDetection for FaceDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let resize_info = ResizeInfo::new(image.dimensions(), DETECTOR_INPUT_SIZE);
        let input = image_to_nchw(
            &letterbox(image, DETECTOR_INPUT_SIZE),
            ChannelOrder::Rgb,
            PixelScale::Symmetric,
        );

        let detections = self
            .model
            .run(&input, |request| self.parse_outputs(request, &resize_info))?;
        debug!("{} candidate faces before NMS", detections.len());

        let faces = nms(detections, self.nms_threshold);
        info!("Detected {} faces after NMS", faces.len());

        Ok(faces)
    }
}

/// Non-maximum suppression. Output is sorted by confidence, highest first.
pub fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection over union
pub fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);

    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
