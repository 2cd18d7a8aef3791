use ort::Session;

use crate::ml::{
    error::{MlError, MlResult},
    onnx, preprocess,
    runtime::ExecutionProviderPolicy,
    types::{FaceBox, Frame},
};

const INPUT_WIDTH: f32 = 640.0;
const INPUT_HEIGHT: f32 = 640.0;
const IOU_THRESHOLD: f32 = 0.4;
const MIN_SCORE_THRESHOLD: f32 = 0.5;
const ROW_LEN: usize = 16;

/// Pluggable face detection backend.
pub trait FaceDetector {
    /// Detect faces in `frame`, returning pixel boxes in frame coordinates.
    fn detect(&mut self, frame: &Frame) -> MlResult<Vec<FaceBox>>;
}

/// YOLOv5-face detector running through ONNX Runtime.
pub struct YoloFaceDetector {
    session: Session,
}

impl YoloFaceDetector {
    pub fn new(model_path: &str, policy: &ExecutionProviderPolicy) -> MlResult<Self> {
        Ok(Self {
            session: onnx::build_session(model_path, policy)?,
        })
    }
}

impl FaceDetector for YoloFaceDetector {
    fn detect(&mut self, frame: &Frame) -> MlResult<Vec<FaceBox>> {
        let (input, scaled_width, scaled_height) = preprocess::preprocess_yolo(frame)?;
        let (_, output_data) = onnx::run_f32(
            &mut self.session,
            input,
            vec![1, 3, INPUT_HEIGHT as i64, INPUT_WIDTH as i64],
        )?;
        let detections = decode_yolo_rows(&output_data, scaled_width, scaled_height)?;
        Ok(detections
            .iter()
            .map(|d| d.to_face_box(frame.width(), frame.height()))
            .filter(|b| !b.is_empty())
            .collect())
    }
}

#[derive(Clone, Debug)]
struct ScoredBox {
    score: f32,
    box_xyxy: [f32; 4],
}

impl ScoredBox {
    fn to_face_box(&self, width: u32, height: u32) -> FaceBox {
        let w = width as f32;
        let h = height as f32;
        FaceBox {
            left: (self.box_xyxy[0] * w).round().clamp(0.0, w) as u32,
            top: (self.box_xyxy[1] * h).round().clamp(0.0, h) as u32,
            right: (self.box_xyxy[2] * w).round().clamp(0.0, w) as u32,
            bottom: (self.box_xyxy[3] * h).round().clamp(0.0, h) as u32,
        }
    }
}

fn decode_yolo_rows(
    output_data: &[f32],
    scaled_width: usize,
    scaled_height: usize,
) -> MlResult<Vec<ScoredBox>> {
    if output_data.len() < ROW_LEN {
        return Err(MlError::Postprocess(
            "unexpected face detector output size".to_string(),
        ));
    }

    let mut detections = Vec::new();
    for row in output_data.chunks_exact(ROW_LEN) {
        let score = row[4];
        if score < MIN_SCORE_THRESHOLD {
            continue;
        }

        let mut box_xyxy = [
            (row[0] - row[2] / 2.0) / INPUT_WIDTH,
            (row[1] - row[3] / 2.0) / INPUT_HEIGHT,
            (row[0] + row[2] / 2.0) / INPUT_WIDTH,
            (row[1] + row[3] / 2.0) / INPUT_HEIGHT,
        ];
        correct_for_maintained_aspect_ratio(&mut box_xyxy, scaled_width, scaled_height);
        detections.push(ScoredBox { score, box_xyxy });
    }

    Ok(naive_non_max_suppression(detections, IOU_THRESHOLD))
}

fn correct_for_maintained_aspect_ratio(
    box_xyxy: &mut [f32; 4],
    scaled_width: usize,
    scaled_height: usize,
) {
    if scaled_width == INPUT_WIDTH as usize && scaled_height == INPUT_HEIGHT as usize {
        return;
    }

    let scale_x = INPUT_WIDTH / scaled_width as f32;
    let scale_y = INPUT_HEIGHT / scaled_height as f32;

    box_xyxy[0] = (box_xyxy[0] * scale_x).clamp(0.0, 1.0);
    box_xyxy[1] = (box_xyxy[1] * scale_y).clamp(0.0, 1.0);
    box_xyxy[2] = (box_xyxy[2] * scale_x).clamp(0.0, 1.0);
    box_xyxy[3] = (box_xyxy[3] * scale_y).clamp(0.0, 1.0);
}

fn naive_non_max_suppression(mut detections: Vec<ScoredBox>, iou_threshold: f32) -> Vec<ScoredBox> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut i = 0usize;
    while i + 1 < detections.len() {
        let mut j = i + 1;
        while j < detections.len() {
            if calculate_iou(&detections[i], &detections[j]) >= iou_threshold {
                detections.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    detections
}

fn calculate_iou(a: &ScoredBox, b: &ScoredBox) -> f32 {
    let area_a =
        (a.box_xyxy[2] - a.box_xyxy[0]).max(0.0) * (a.box_xyxy[3] - a.box_xyxy[1]).max(0.0);
    let area_b =
        (b.box_xyxy[2] - b.box_xyxy[0]).max(0.0) * (b.box_xyxy[3] - b.box_xyxy[1]).max(0.0);

    let intersection_width = a.box_xyxy[2].min(b.box_xyxy[2]) - a.box_xyxy[0].max(b.box_xyxy[0]);
    let intersection_height = a.box_xyxy[3].min(b.box_xyxy[3]) - a.box_xyxy[1].max(b.box_xyxy[1]);
    if intersection_width < 0.0 || intersection_height < 0.0 {
        return 0.0;
    }

    let intersection_area = intersection_width * intersection_height;
    let union_area = area_a + area_b - intersection_area;
    if union_area <= 0.0 {
        return 0.0;
    }
    intersection_area / union_area
}
