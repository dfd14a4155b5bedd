// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行与配置文件
pub mod detection; // 检测器与画框
pub mod input; // 视频输入系统
pub mod models; // 检测结果类型, NMS, YOLOv8 编解码
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod pipeline; // 实时检测主循环
pub mod server; // HTTP: MJPEG 推流与 JSON 接口

pub use crate::config::{Args, ConfigDocument, Settings};
pub use crate::detection::{Detector, DetectorConfig};
pub use crate::input::{CameraSource, CaptureError, Frame, FrameSource, VideoFileSource};
pub use crate::models::{iou, non_max_suppression, BoxRect, Detection, InferenceEngine};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{Pipeline, PipelineConfig, StepOutcome};
pub use crate::server::{HttpServer, ServerConfig, SharedState};
