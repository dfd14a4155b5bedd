/// 检测系统 (Detection System)
///
/// - Detector: 推理 + 解码 + NMS, 记录单帧耗时
/// - overlay:  检测框/标签叠加, 供 MJPEG 推流使用
pub mod detector;
pub mod overlay;

pub use detector::{load_labels, Detector, DetectorConfig};
