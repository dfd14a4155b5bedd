//! 摄像头输入模块
//!
//! 按优先级依次探测采集后端, 第一个能打开且在重试内读到非空测试帧的后端胜出:
//! libcamera 加速管线 → 自动协商 → V4L2 → 平台默认 (DirectShow/AVFoundation/V4L2)

use std::time::Duration;

use anyhow::{bail, Result};

use super::decode_filter::Delivery;
use super::decoder::{FfmpegOpener, FrameStream, InputSpec, StreamOpener};
use super::frame::Frame;
use super::{CaptureError, FrameSource};

/// 每个后端的测试帧尝试次数
const PROBE_ATTEMPTS: usize = 5;
/// 两次尝试之间的间隔 (摄像头预热)
const PROBE_SPACING: Duration = Duration::from_millis(200);

/// 摄像头参数
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffer_size: usize,
    pub read_timeout: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_device().to_string(),
            width: 640,
            height: 480,
            fps: 30,
            buffer_size: 1,
            read_timeout: Duration::from_millis(2000),
        }
    }
}

/// 默认设备 - 根据平台选择
pub fn default_device() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "/dev/video0"
    }
    #[cfg(target_os = "windows")]
    {
        "video=0"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        "0"
    }
}

/// 采集后端 (按探测优先级排列)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBackend {
    /// 厂商相机栈 (libcamera) 的 YUV420 加速输出
    Libcamera,
    /// 不指定像素格式, 让驱动自动协商
    AutoSource,
    /// 纯 V4L2, 不带任何参数
    V4l2,
    /// 平台默认 demuxer
    PlatformDefault,
}

impl CaptureBackend {
    pub const PREFERENCE: [CaptureBackend; 4] = [
        CaptureBackend::Libcamera,
        CaptureBackend::AutoSource,
        CaptureBackend::V4l2,
        CaptureBackend::PlatformDefault,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CaptureBackend::Libcamera => "libcamera",
            CaptureBackend::AutoSource => "autovideosrc",
            CaptureBackend::V4l2 => "v4l2",
            CaptureBackend::PlatformDefault => "default",
        }
    }

    /// 该后端对应的 FFmpeg 输入描述
    pub fn input_spec(&self, config: &CameraConfig) -> InputSpec {
        let size = format!("{}x{}", config.width, config.height);
        let rate = config.fps.to_string();
        let (format, options): (Option<&str>, Vec<(&str, String)>) = match self {
            CaptureBackend::Libcamera => (
                Some("v4l2"),
                vec![
                    ("input_format", "yuv420p".to_string()),
                    ("video_size", size),
                    ("framerate", rate),
                ],
            ),
            CaptureBackend::AutoSource => (None, vec![("video_size", size), ("framerate", rate)]),
            CaptureBackend::V4l2 => (Some("v4l2"), Vec::new()),
            CaptureBackend::PlatformDefault => (platform_format(), Vec::new()),
        };

        InputSpec {
            url: config.device.clone(),
            format: format.map(str::to_string),
            options: options
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            // 摄像头只要最新帧, 队列长度即 bufferSize
            delivery: Delivery::LatestOnly,
            queue: config.buffer_size.max(1),
        }
    }
}

/// Linux 上 V4L2 已单独探测过, 这里交给 FFmpeg 按设备地址自行选择 demuxer
fn platform_format() -> Option<&'static str> {
    #[cfg(target_os = "windows")]
    {
        Some("dshow") // DirectShow
    }
    #[cfg(target_os = "macos")]
    {
        Some("avfoundation") // AVFoundation
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        None
    }
}

/// 摄像头帧源
pub struct CameraSource {
    stream: Box<dyn FrameStream>,
    backend: CaptureBackend,
    width: u32,
    height: u32,
    fps: f64,
    read_timeout: Duration,
    reads: u64,
}

impl CameraSource {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        Self::open_with(&FfmpegOpener, config)
    }

    pub fn open_with(opener: &dyn StreamOpener, config: &CameraConfig) -> Result<Self> {
        tracing::info!(
            "📷 打开摄像头 {} (请求 {}x{} @ {}fps, buffer {})",
            config.device,
            config.width,
            config.height,
            config.fps,
            config.buffer_size
        );

        for backend in CaptureBackend::PREFERENCE {
            let spec = backend.input_spec(config);
            tracing::info!("🔍 尝试后端: {}", backend.name());

            let mut stream = match opener.open(&spec) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("⚠️ 后端 {} 打开失败: {:#}", backend.name(), e);
                    continue;
                }
            };

            match probe(stream.as_mut()) {
                Some(test) => {
                    // 实际几何尺寸以测试帧为准, 帧率无法从解码器得到, 沿用请求值
                    tracing::info!(
                        "✅ 摄像头就绪: 后端 {}, {}x{} @ {}fps",
                        backend.name(),
                        test.width(),
                        test.height(),
                        config.fps
                    );
                    return Ok(Self {
                        stream,
                        backend,
                        width: test.width(),
                        height: test.height(),
                        fps: config.fps as f64,
                        read_timeout: config.read_timeout,
                        reads: 0,
                    });
                }
                None => {
                    tracing::warn!(
                        "⚠️ 后端 {} 已打开但 {} 次尝试内没有读到画面",
                        backend.name(),
                        PROBE_ATTEMPTS
                    );
                }
            }
        }

        bail!(
            "failed to open camera {} with any capture backend",
            config.device
        )
    }

    pub fn backend(&self) -> CaptureBackend {
        self.backend
    }
}

/// 读测试帧, 容忍摄像头预热
fn probe(stream: &mut dyn FrameStream) -> Option<Frame> {
    for attempt in 1..=PROBE_ATTEMPTS {
        match stream.next_frame(PROBE_SPACING) {
            Ok(frame) => return Some(frame),
            Err(CaptureError::EndOfStream) => return None,
            Err(e) => tracing::debug!("📷 测试帧 {}/{} 未就绪: {}", attempt, PROBE_ATTEMPTS, e),
        }
    }
    None
}

impl FrameSource for CameraSource {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let frame = self.stream.next_frame(self.read_timeout)?;

        self.reads += 1;
        if self.reads % 100 == 0 {
            tracing::debug!(
                "📷 已读取 {} 帧 ({}x{})",
                self.reads,
                frame.width(),
                frame.height()
            );
        }
        Ok(frame)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::testing::ScriptedOpener;
    use std::sync::atomic::Ordering;

    fn config() -> CameraConfig {
        CameraConfig {
            device: "/dev/video9".into(),
            width: 320,
            height: 240,
            fps: 15,
            buffer_size: 2,
            read_timeout: Duration::from_millis(5),
        }
    }

    fn script_for(
        backend: CaptureBackend,
        frames: Vec<Option<Frame>>,
    ) -> (Option<String>, Vec<(String, String)>, Vec<Option<Frame>>) {
        let spec = backend.input_spec(&config());
        (spec.format, spec.options, frames)
    }

    #[test]
    fn prefers_libcamera_when_it_delivers() {
        let opener = ScriptedOpener {
            scripts: vec![script_for(
                CaptureBackend::Libcamera,
                vec![Some(Frame::black(320, 240)), Some(Frame::black(320, 240))],
            )],
            ..Default::default()
        };
        let camera = CameraSource::open_with(&opener, &config()).unwrap();
        assert_eq!(camera.backend(), CaptureBackend::Libcamera);
        assert_eq!((camera.width(), camera.height()), (320, 240));
        assert_eq!(camera.fps(), 15.0);
    }

    #[test]
    fn tolerates_warm_up_frames() {
        let opener = ScriptedOpener {
            scripts: vec![script_for(
                CaptureBackend::Libcamera,
                vec![None, Some(Frame::default()), None, Some(Frame::black(8, 6))],
            )],
            ..Default::default()
        };
        let camera = CameraSource::open_with(&opener, &config()).unwrap();
        assert_eq!(camera.backend(), CaptureBackend::Libcamera);
        assert_eq!((camera.width(), camera.height()), (8, 6));
    }

    #[test]
    fn falls_back_past_silent_backend() {
        // libcamera 打不开, 自动协商能打开但一直没有画面, 退到 V4L2
        let opener = ScriptedOpener {
            scripts: vec![
                script_for(CaptureBackend::AutoSource, vec![None; 10]),
                script_for(CaptureBackend::V4l2, vec![Some(Frame::black(640, 360))]),
            ],
            ..Default::default()
        };
        let camera = CameraSource::open_with(&opener, &config()).unwrap();
        assert_eq!(camera.backend(), CaptureBackend::V4l2);
        assert_eq!((camera.width(), camera.height()), (640, 360));

        // 没有画面的后端在打开下一个后端之前已释放
        assert_eq!(opener.max_overlap.load(Ordering::SeqCst), 0);
        assert_eq!(opener.live.load(Ordering::SeqCst), 1);

        let opened = opener.opened.lock().unwrap();
        let formats: Vec<_> = opened.iter().map(|s| s.format.clone()).collect();
        assert_eq!(formats.len(), 3);
        assert_eq!(opened[0].options.len(), 3);
        assert!(opened[1].format.is_none());
    }

    #[test]
    fn fails_when_no_backend_works() {
        let opener = ScriptedOpener::default();
        assert!(CameraSource::open_with(&opener, &config()).is_err());
        assert_eq!(opener.opened.lock().unwrap().len(), 4);
    }

    #[test]
    fn read_reports_timeout_and_empty_frames() {
        let opener = ScriptedOpener {
            scripts: vec![script_for(
                CaptureBackend::Libcamera,
                vec![Some(Frame::black(4, 4)), Some(Frame::default()), None],
            )],
            ..Default::default()
        };
        let mut camera = CameraSource::open_with(&opener, &config()).unwrap();
        assert!(matches!(camera.read(), Err(CaptureError::Empty)));
        assert!(matches!(camera.read(), Err(CaptureError::Timeout(_))));
    }

    #[test]
    fn every_backend_probes_a_distinct_input() {
        let specs: Vec<_> = CaptureBackend::PREFERENCE
            .iter()
            .map(|b| {
                let spec = b.input_spec(&config());
                (spec.format, spec.options)
            })
            .collect();
        for (i, a) in specs.iter().enumerate() {
            for b in &specs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn camera_uses_latest_only_delivery() {
        let spec = CaptureBackend::V4l2.input_spec(&config());
        assert_eq!(spec.delivery, Delivery::LatestOnly);
        assert_eq!(spec.queue, 2);
        assert_eq!(spec.url, "/dev/video9");
    }
}
