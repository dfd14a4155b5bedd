/// 视频输入系统 (Video Input System)
///
/// 帧源统一接口 `FrameSource`, 两种实现:
/// - CameraSource: 本地摄像头, 按优先级探测采集后端
/// - VideoFileSource: 视频文件, 播完自动回到第0帧 (开发/测试用)
///
/// 底层解码走 ez-ffmpeg: DecodeFilter → 有界通道 → FfmpegStream
pub mod camera;
pub mod decode_filter;
pub mod decoder;
pub mod frame;
pub mod video_file;

use std::time::Duration;

pub use camera::{CameraConfig, CameraSource, CaptureBackend};
pub use decode_filter::{DecodeFilter, Delivery};
pub use decoder::{FfmpegOpener, FfmpegStream, FrameStream, InputSpec, StreamOpener};
pub use frame::Frame;
pub use video_file::VideoFileSource;

/// 读帧失败 (可恢复, 由流水线计入丢帧)
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("end of stream")]
    EndOfStream,
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("empty frame")]
    Empty,
    #[error("decoder stopped: {0}")]
    Stopped(String),
}

/// 帧源: 单消费者, `read` 同步阻塞
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// 实际协商到的宽度
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn fps(&self) -> f64;
}
