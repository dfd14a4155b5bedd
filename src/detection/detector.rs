//! 检测器 (Detector)
//! 职责: Frame → 预处理 → 推理 → YOLOv8解码 → NMS → Vec<Detection>

use std::time::Instant;

use ab_glyph::FontVec;

use super::overlay;
use crate::input::Frame;
use crate::models::yolov8::{self, DecodeParams};
use crate::models::{non_max_suppression, Detection, InferenceEngine};

/// 检测参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub conf_threshold: f32,
    /// 只读入并打印, NMS 用 `iou_threshold`
    pub nms_threshold: f32,
    pub iou_threshold: f32,
    pub labels_path: String,
    pub font_path: Option<String>,
}

pub struct Detector {
    engine: Box<dyn InferenceEngine>,
    config: DetectorConfig,
    labels: Vec<String>,
    font: Option<FontVec>,
    last_inference_ms: f64,

    // 统计
    count: u64,
}

impl Detector {
    pub fn new(engine: Box<dyn InferenceEngine>, config: DetectorConfig) -> Self {
        tracing::info!("🔍 检测器初始化 (后端: {})", engine.name());
        tracing::info!("  输入尺寸: {}x{}", config.input_width, config.input_height);
        tracing::info!("  Confidence: {}", config.conf_threshold);
        tracing::info!("  NMS: {} (保留, 未使用)", config.nms_threshold);
        tracing::info!("  IoU: {}", config.iou_threshold);

        let labels = load_labels(&config.labels_path);
        let font = overlay::load_font(config.font_path.as_deref());

        Self {
            engine,
            config,
            labels,
            font,
            last_inference_ms: 0.0,
            count: 0,
        }
    }

    /// 最近一次 detect 的耗时 (预处理 + 推理 + 解码 + NMS)
    pub fn last_inference_ms(&self) -> f64 {
        self.last_inference_ms
    }

    /// 检测一帧; 空帧或推理失败返回空列表
    pub fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        if frame.is_empty() {
            return Vec::new();
        }
        let start = Instant::now();

        let detections = match self.run(frame) {
            Ok(ys) => ys,
            Err(e) => {
                tracing::warn!("⚠️ 推理失败: {:#}", e);
                Vec::new()
            }
        };

        self.last_inference_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.count += 1;
        if self.count % 30 == 0 {
            tracing::debug!(
                "🔍 [Detector] 第{}帧: {} 个目标, {:.1}ms",
                self.count,
                detections.len(),
                self.last_inference_ms
            );
        }
        detections
    }

    fn run(&mut self, frame: &Frame) -> anyhow::Result<Vec<Detection>> {
        let (w_in, h_in) = (self.config.input_width, self.config.input_height);
        let input = yolov8::preprocess(frame, w_in, h_in)?;
        let raw = self.engine.infer(&input)?;

        let shape = raw.shape().to_vec();
        let Some(matrix) = yolov8::output_matrix(raw) else {
            tracing::warn!("⚠️ 输出形状 {:?} 不是 (4+C)×N, 忽略本帧", shape);
            return Ok(Vec::new());
        };

        let params = DecodeParams {
            input_width: w_in,
            input_height: h_in,
            image_width: frame.width(),
            image_height: frame.height(),
            conf_threshold: self.config.conf_threshold,
        };
        let mut ys = yolov8::decode(matrix.view(), &params, &self.labels);
        non_max_suppression(&mut ys, self.config.iou_threshold);
        Ok(ys)
    }

    /// 在帧上画框和标签 (原地修改)
    pub fn draw(&self, frame: &mut Frame, detections: &[Detection]) {
        overlay::draw(frame, detections, self.font.as_ref());
    }
}

/// 按行读取类别名, 跳过空行; 文件不存在时返回空表
pub fn load_labels(path: &str) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let labels: Vec<String> = text
                .lines()
                .map(|l| l.trim_end_matches('\r'))
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            tracing::info!("✅ 加载 {} 个类别标签: {}", labels.len(), path);
            labels
        }
        Err(e) => {
            tracing::warn!("⚠️ 标签文件 {} 不可用 ({}), 使用数字类别", path, e);
            Vec::new()
        }
    }
}
