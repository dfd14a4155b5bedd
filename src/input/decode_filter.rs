/// FFmpeg解码过滤器: 解码帧 → BGR24 Frame → 通道
///
/// 解码线程里运行, 读端是 `FfmpegStream::next_frame`
use super::frame::Frame;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame as AvFrame};

/// 通道满时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 阻塞等待读端 (视频文件: 逐帧不丢)
    Blocking,
    /// 丢弃最旧的帧, 只保留最新 (摄像头: 低延迟)
    LatestOnly,
}

#[derive(Clone)]
pub struct DecodeFilter {
    tx: Sender<Frame>,
    // LatestOnly 模式下用于丢弃旧帧
    drain: Receiver<Frame>,
    delivery: Delivery,
    // 读端关闭标志, 置位后下一帧即终止解码
    closed: Arc<AtomicBool>,
    total_frames: usize,
    dropped_frames: usize,
}

impl DecodeFilter {
    pub fn new(
        tx: Sender<Frame>,
        drain: Receiver<Frame>,
        delivery: Delivery,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tx,
            drain,
            delivery,
            closed,
            total_frames: 0,
            dropped_frames: 0,
        }
    }

    fn deliver(&mut self, frame: Frame) -> Result<(), String> {
        match self.delivery {
            Delivery::Blocking => {
                let mut pending = frame;
                loop {
                    match self.tx.send_timeout(pending, Duration::from_millis(100)) {
                        Ok(()) => return Ok(()),
                        Err(SendTimeoutError::Timeout(f)) => {
                            if self.closed.load(Ordering::SeqCst) {
                                return Err("frame receiver closed".to_string());
                            }
                            pending = f;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return Err("frame receiver closed".to_string())
                        }
                    }
                }
            }
            Delivery::LatestOnly => {
                let mut pending = frame;
                loop {
                    match self.tx.try_send(pending) {
                        Ok(()) => return Ok(()),
                        Err(TrySendError::Full(f)) => {
                            // 队列已满: 丢掉最旧的一帧再试
                            let _ = self.drain.try_recv();
                            self.dropped_frames += 1;
                            pending = f;
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            return Err("frame receiver closed".to_string())
                        }
                    }
                }
            }
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        tracing::debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<AvFrame>, String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("frame receiver closed".to_string());
        }
        self.total_frames += 1;

        unsafe {
            // 空帧或损坏帧
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width;
            let h = (*frame.as_ptr()).height;
            if w <= 0 || h <= 0 || w > 8192 || h > 8192 {
                self.dropped_frames += 1;
                return Ok(None);
            }

            // 上游 filter_desc 已转换为 bgr24: 单平面, 每像素3字节
            let plane = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0];
            let (w, h) = (w as usize, h as usize);
            let row_bytes = w * 3;
            if plane.is_null() || stride < row_bytes as i32 {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let mut bgr = Vec::with_capacity(row_bytes * h);
            for y in 0..h {
                let row = std::slice::from_raw_parts(plane.add(y * stride as usize), row_bytes);
                bgr.extend_from_slice(row);
            }

            if let Some(decoded) = Frame::from_bgr(w as u32, h as u32, bgr) {
                self.deliver(decoded)?;
            }
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        tracing::debug!(
            "✅ 解码线程退出: 共 {} 帧, 丢弃 {} 帧",
            self.total_frames,
            self.dropped_frames
        );
    }
}
