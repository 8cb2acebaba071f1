//! Detection result data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis-aligned box in original image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from centre / size form as emitted by the detection head
    pub fn from_xywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Clip to `[0, width] x [0, height]`
    pub fn clip(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }
}

/// One predicted object instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Wall-clock time spent in each inference phase, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedStats {
    pub preprocess_ms: f64,
    pub inference_ms: f64,
    pub postprocess_ms: f64,
}

impl SpeedStats {
    pub fn total_ms(&self) -> f64 {
        self.preprocess_ms + self.inference_ms + self.postprocess_ms
    }
}

/// Detections for one input image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub image_width: u32,
    pub image_height: u32,
    pub detections: Vec<Detection>,
    pub speed: SpeedStats,
    /// Class-name table of the model that produced the result
    pub names: Vec<String>,
}

impl InferenceResult {
    pub fn new(image_width: u32, image_height: u32, detections: Vec<Detection>) -> Self {
        Self {
            image_width,
            image_height,
            detections,
            speed: SpeedStats::default(),
            names: Vec::new(),
        }
    }

    pub fn with_speed(mut self, speed: SpeedStats) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Detection count per label, ordered by class id
    pub fn counts_by_label(&self) -> Vec<(String, usize)> {
        let mut by_class: BTreeMap<usize, (String, usize)> = BTreeMap::new();
        for det in &self.detections {
            by_class
                .entry(det.class_id)
                .or_insert_with(|| (det.label.clone(), 0))
                .1 += 1;
        }
        by_class.into_values().collect()
    }

    /// One-line human summary, e.g. `810x1080 4 persons, 1 bus, 38.2ms`
    pub fn summary(&self) -> String {
        let counts = self.counts_by_label();
        let body = if counts.is_empty() {
            "(no detections)".to_string()
        } else {
            counts
                .iter()
                .map(|(label, n)| {
                    if *n > 1 {
                        format!("{} {}s", n, label)
                    } else {
                        format!("{} {}", n, label)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "{}x{} {}, {:.1}ms",
            self.image_width,
            self.image_height,
            body,
            self.speed.inference_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, label: &str, confidence: f32) -> Detection {
        Detection {
            class_id,
            label: label.to_string(),
            confidence,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_xywh_and_clip() {
        let b = BoundingBox::from_xywh(5.0, 5.0, 20.0, 4.0);
        assert_eq!(b, BoundingBox::new(-5.0, 3.0, 15.0, 7.0));
        assert_eq!(b.clip(10.0, 10.0), BoundingBox::new(0.0, 3.0, 10.0, 7.0));
    }

    #[test]
    fn test_summary_counts_and_plurals() {
        let result = InferenceResult::new(
            810,
            1080,
            vec![det(0, "person", 0.9), det(5, "bus", 0.8), det(0, "person", 0.7)],
        )
        .with_speed(SpeedStats {
            preprocess_ms: 1.0,
            inference_ms: 38.24,
            postprocess_ms: 0.5,
        });

        assert_eq!(result.summary(), "810x1080 2 persons, 1 bus, 38.2ms");
        assert!((result.speed.total_ms() - 39.74).abs() < 1e-9);
        assert_eq!(
            result.counts_by_label(),
            vec![("person".to_string(), 2), ("bus".to_string(), 1)]
        );
    }

    #[test]
    fn test_summary_empty() {
        let result = InferenceResult::new(640, 480, Vec::new());
        assert!(result.is_empty());
        assert_eq!(result.summary(), "640x480 (no detections), 0.0ms");
    }

    #[test]
    fn test_result_serialization() {
        let result = InferenceResult::new(100, 50, vec![det(2, "car", 0.55)]);
        let json = serde_json::to_string(&result).unwrap();
        let deserialized: InferenceResult = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.detections, result.detections);
        assert_eq!(deserialized.image_width, 100);
    }
}
