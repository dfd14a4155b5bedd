/// FFmpeg 拉流解码器
///
/// 把 ez-ffmpeg 的回调式解码包装成阻塞式的逐帧读取:
/// 解码线程 → DecodeFilter → 有界通道 → `FfmpegStream::next_frame`
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};

use super::decode_filter::{DecodeFilter, Delivery};
use super::frame::Frame;
use super::CaptureError;

/// 解码线程检查停止标志的间隔
const WORKER_POLL: Duration = Duration::from_millis(20);

/// 输入描述: 地址 + 可选的 demuxer 格式 + 输入参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub url: String,
    pub format: Option<String>,
    pub options: Vec<(String, String)>,
    pub delivery: Delivery,
    /// 通道容量 (对应摄像头 bufferSize)
    pub queue: usize,
}

impl InputSpec {
    pub fn file(path: &str) -> Self {
        Self {
            url: path.to_string(),
            format: None,
            options: Vec::new(),
            delivery: Delivery::Blocking,
            queue: 4,
        }
    }
}

/// 可逐帧读取的视频流
pub trait FrameStream: Send {
    /// 在 `timeout` 内取下一帧
    ///
    /// 超时为 `Timeout`, 空帧为 `Empty`, 只有解码已结束且队列取空才是 `EndOfStream`
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame, CaptureError>;

    /// 回到第0帧
    fn rewind(&mut self) -> Result<()>;
}

/// 打开视频流 (摄像头探测与文件循环都通过它, 测试中可替换)
pub trait StreamOpener: Send {
    fn open(&self, spec: &InputSpec) -> Result<Box<dyn FrameStream>>;
}

/// 基于 ez-ffmpeg 的实现
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl StreamOpener for FfmpegOpener {
    fn open(&self, spec: &InputSpec) -> Result<Box<dyn FrameStream>> {
        Ok(Box::new(FfmpegStream::start(spec.clone())?))
    }
}

pub struct FfmpegStream {
    spec: InputSpec,
    rx: Receiver<Frame>,
    ended: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FfmpegStream {
    pub fn start(spec: InputSpec) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(spec.queue.max(1));
        let ended = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let filter = DecodeFilter::new(tx, rx.clone(), spec.delivery, Arc::clone(&closed));
        let worker_spec = spec.clone();
        let worker_ended = Arc::clone(&ended);
        let worker_closed = Arc::clone(&closed);

        // FFmpeg 上下文在解码线程内构建/启动/等待
        let worker = std::thread::Builder::new()
            .name("ffmpeg-decode".into())
            .spawn(move || {
                let started = build_context(&worker_spec, filter).and_then(|ctx| {
                    ctx.start().map_err(|e| format!("启动失败: {}", e))
                });
                match started {
                    Ok(sch) => {
                        let _ = ready_tx.send(Ok(()));
                        // 没有帧到达时过滤器不会被调用, 停止请求在这里转成 abort 以释放设备
                        loop {
                            if sch.is_ended() {
                                if let Err(e) = sch.wait() {
                                    tracing::debug!("📹 解码循环结束: {}", e);
                                }
                                break;
                            }
                            if worker_closed.load(Ordering::SeqCst) {
                                tracing::debug!("📹 停止解码: {}", worker_spec.url);
                                sch.abort();
                                break;
                            }
                            std::thread::sleep(WORKER_POLL);
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                worker_ended.store(true, Ordering::SeqCst);
            })
            .context("failed to spawn ffmpeg decode thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                spec,
                rx,
                ended,
                closed,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(anyhow!("{}: {}", spec.url, e))
            }
            Err(_) => {
                let _ = worker.join();
                Err(anyhow!("{}: decode thread exited before start", spec.url))
            }
        }
    }

    /// 停止解码并等待解码线程退出, 返回后设备已可被重新打开
    fn stop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        // 唤醒可能阻塞在满队列上的发送端
        while self.rx.try_recv().is_ok() {}
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("⚠️ 解码线程异常退出: {}", self.spec.url);
            }
        }
    }
}

fn build_context(spec: &InputSpec, filter: DecodeFilter) -> Result<FfmpegContext, String> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let mut input = Input::new(spec.url.as_str());
    if let Some(format) = &spec.format {
        input = input.set_format(format.as_str());
    }
    if !spec.options.is_empty() {
        input = input.set_input_opts(spec.options.clone());
    }

    FfmpegContext::builder()
        .input(input)
        .filter_desc("format=bgr24")
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))
}

impl FrameStream for FfmpegStream {
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame, CaptureError> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(CaptureError::Timeout(timeout));
            }
            let slice = (deadline - now).min(Duration::from_millis(50));
            match self.rx.recv_timeout(slice) {
                Ok(frame) if frame.is_empty() => return Err(CaptureError::Empty),
                Ok(frame) => return Ok(frame),
                Err(RecvTimeoutError::Timeout) => {
                    if self.ended.load(Ordering::SeqCst) && self.rx.is_empty() {
                        return Err(CaptureError::EndOfStream);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::EndOfStream),
            }
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.stop();
        let fresh = FfmpegStream::start(self.spec.clone())?;
        *self = fresh;
        Ok(())
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}
