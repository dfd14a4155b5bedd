//! 视频文件输入 - 开发/测试时代替摄像头
//!
//! 播放到结尾时回到第0帧重读一次, 仍失败才算读帧失败;
//! 中途的超时或空帧直接报读帧失败, 不会跳回开头

use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use super::decoder::{FfmpegOpener, FrameStream, InputSpec, StreamOpener};
use super::frame::Frame;
use super::{CaptureError, FrameSource};

/// 打开时等待首帧的时长
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub struct VideoFileSource {
    path: String,
    stream: Box<dyn FrameStream>,
    // 打开时读出的首帧, 第一次 read 原样返回
    pending: Option<Frame>,
    width: u32,
    height: u32,
    fps: f64,
    read_timeout: Duration,
}

impl VideoFileSource {
    pub fn open(path: &str, read_timeout: Duration) -> Result<Self> {
        Self::open_with(&FfmpegOpener, path, read_timeout)
    }

    pub fn open_with(
        opener: &dyn StreamOpener,
        path: &str,
        read_timeout: Duration,
    ) -> Result<Self> {
        tracing::info!("🎞️ 打开视频文件: {}", path);
        let mut stream = opener
            .open(&InputSpec::file(path))
            .with_context(|| format!("cannot open video file {}", path))?;

        let first = stream
            .next_frame(FIRST_FRAME_TIMEOUT)
            .map_err(|e| anyhow!("video file {} produced no frames: {}", path, e))?;

        tracing::info!("✅ 视频文件: {}x{}", first.width(), first.height());
        Ok(Self {
            path: path.to_string(),
            width: first.width(),
            height: first.height(),
            // 解码器不上报帧率, 按常见的 30fps 记
            fps: 30.0,
            pending: Some(first),
            stream,
            read_timeout,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        match self.stream.next_frame(self.read_timeout) {
            Err(CaptureError::EndOfStream) => {}
            other => return other,
        }

        tracing::debug!("🔁 {} 播放结束, 回到第0帧", self.path);
        self.stream
            .rewind()
            .map_err(|e| CaptureError::Stopped(e.to_string()))?;
        self.stream.next_frame(self.read_timeout)
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}
