//! 集成测试共用的假帧源与假推理后端
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ndarray::{Array4, ArrayD, IxDyn};

use yolov8_edge::input::{CaptureError, Frame, FrameSource};
use yolov8_edge::models::InferenceEngine;
use yolov8_edge::DetectorConfig;

/// 按脚本返回帧或失败, 脚本用完后一直超时
pub struct ScriptedSource {
    pub script: VecDeque<Option<Frame>>,
    pub width: u32,
    pub height: u32,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<Frame>>) -> Self {
        Self {
            script: script.into(),
            width: 640,
            height: 480,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        match self.script.pop_front() {
            Some(Some(frame)) => Ok(frame),
            Some(None) => Err(CaptureError::Empty),
            None => Err(CaptureError::EndOfStream),
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        30.0
    }
}

/// 每次推理返回同一份输出
pub struct FixedEngine {
    pub output: ArrayD<f32>,
    pub calls: Arc<AtomicUsize>,
}

impl FixedEngine {
    pub fn new(output: ArrayD<f32>) -> Self {
        Self {
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InferenceEngine for FixedEngine {
    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        assert_eq!(input.shape()[..2], [1, 3]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// `[1, 4+nc, N]` 输出, 每个候选框 (cx, cy, w, h, class, score)
pub fn proposals(nc: usize, items: &[(f32, f32, f32, f32, usize, f32)]) -> ArrayD<f32> {
    let mut out = ArrayD::<f32>::zeros(IxDyn(&[1, 4 + nc, items.len()]));
    for (i, &(cx, cy, w, h, class, score)) in items.iter().enumerate() {
        out[[0, 0, i]] = cx;
        out[[0, 1, i]] = cy;
        out[[0, 2, i]] = w;
        out[[0, 3, i]] = h;
        out[[0, 4 + class, i]] = score;
    }
    out
}

pub fn detector_config(labels_path: &str) -> DetectorConfig {
    DetectorConfig {
        input_width: 640,
        input_height: 480,
        conf_threshold: 0.5,
        nms_threshold: 0.5,
        iou_threshold: 0.5,
        labels_path: labels_path.to_string(),
        font_path: None,
    }
}
