//! Detection head decoding and non-maximum suppression

use crate::error::{Result, RunnerError};
use crate::models::loader::ModelMetadata;
use crate::preprocess::Letterbox;
use crate::types::detection::{BoundingBox, Detection};
use ndarray::ArrayView2;
use std::cmp::Ordering;
use tracing::debug;

/// Thresholds applied while decoding
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Layout of the detection output tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[1, 4 + nc (+ extra), anchors]`: cx, cy, w, h, then per-class scores
    ChannelsFirst { channels: usize, anchors: usize },
    /// `[1, rows, 6]`: x1, y1, x2, y2, score, class, already suppressed
    EndToEnd { rows: usize },
}

impl OutputLayout {
    pub fn from_dims(dims: &[i64]) -> Result<Self> {
        let (batch, d1, d2) = match dims {
            [b, d1, d2] if *b >= 1 && *d1 > 0 && *d2 > 0 => (*b, *d1 as usize, *d2 as usize),
            _ => {
                return Err(RunnerError::inference(format!(
                    "unexpected detection output shape {:?}",
                    dims
                )))
            }
        };
        if batch != 1 {
            debug!(batch, "Only the first batch entry is decoded");
        }

        if d2 == 6 && d1 > d2 {
            Ok(OutputLayout::EndToEnd { rows: d1 })
        } else if d1 > 4 {
            Ok(OutputLayout::ChannelsFirst {
                channels: d1,
                anchors: d2,
            })
        } else {
            Err(RunnerError::inference(format!(
                "detection output {:?} has no class channels",
                dims
            )))
        }
    }
}

/// Candidate box in network pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub score: f32,
    pub bbox: BoundingBox,
}

/// Decode a raw detection output into detections on the original image
pub fn decode(
    dims: &[i64],
    data: &[f32],
    options: &DecodeOptions,
    letterbox: &Letterbox,
    metadata: &ModelMetadata,
) -> Result<Vec<Detection>> {
    let layout = OutputLayout::from_dims(dims)?;

    let candidates = match layout {
        OutputLayout::ChannelsFirst { channels, anchors } => {
            let plane = take_first_batch(data, channels * anchors)?;
            let view = ArrayView2::from_shape((channels, anchors), plane)
                .map_err(|e| RunnerError::inference(e))?;
            let num_classes = class_count(channels, metadata);
            let candidates = candidates_channels_first(view, num_classes, options.conf_threshold);
            non_max_suppression(candidates, options.iou_threshold, options.max_detections)
        }
        OutputLayout::EndToEnd { rows } => {
            let plane = take_first_batch(data, rows * 6)?;
            let view = ArrayView2::from_shape((rows, 6), plane)
                .map_err(|e| RunnerError::inference(e))?;
            let mut candidates = candidates_end_to_end(view, options.conf_threshold);
            sort_by_score(&mut candidates);
            candidates.truncate(options.max_detections);
            candidates
        }
    };

    debug!(layout = ?layout, kept = candidates.len(), "Decoded detection output");

    Ok(candidates
        .into_iter()
        .map(|c| Detection {
            class_id: c.class_id,
            label: metadata.label(c.class_id),
            confidence: c.score.clamp(0.0, 1.0),
            bbox: letterbox.restore(&c.bbox),
        })
        .collect())
}

fn take_first_batch(data: &[f32], len: usize) -> Result<&[f32]> {
    data.get(..len).ok_or_else(|| {
        RunnerError::inference(format!(
            "detection output holds {} values, expected at least {}",
            data.len(),
            len
        ))
    })
}

/// Class channels follow the 4 box channels; trailing channels (mask or
/// keypoint coefficients) are ignored when the class table says so
fn class_count(channels: usize, metadata: &ModelMetadata) -> usize {
    let available = channels - 4;
    if metadata.names.is_empty() {
        available
    } else {
        metadata.names.len().min(available)
    }
}

/// Best class per anchor above the confidence threshold
pub fn candidates_channels_first(
    view: ArrayView2<'_, f32>,
    num_classes: usize,
    conf_threshold: f32,
) -> Vec<Candidate> {
    let anchors = view.ncols();
    let mut candidates = Vec::new();

    for a in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for c in 0..num_classes {
            let score = view[[4 + c, a]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < conf_threshold {
            continue;
        }

        candidates.push(Candidate {
            class_id: best_class,
            score: best_score,
            bbox: BoundingBox::from_xywh(view[[0, a]], view[[1, a]], view[[2, a]], view[[3, a]]),
        });
    }

    candidates
}

/// Rows of an end-to-end head above the confidence threshold
pub fn candidates_end_to_end(view: ArrayView2<'_, f32>, conf_threshold: f32) -> Vec<Candidate> {
    view.rows()
        .into_iter()
        .filter(|row| row[4] >= conf_threshold)
        .map(|row| Candidate {
            class_id: row[5].max(0.0) as usize,
            score: row[4],
            bbox: BoundingBox::new(row[0], row[1], row[2], row[3]),
        })
        .collect()
}

fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Greedy class-aware NMS: a box is dropped when a higher-scoring box of the
/// same class overlaps it by more than `iou_threshold`
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    sort_by_score(&mut candidates);

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
