/// 实时检测流水线 (Pipeline)
///
/// 单线程主循环: 读帧 → 检测 → 叠加 → JPEG编码计时 → 发布到共享状态 → 按间隔记录指标
pub mod metrics;
pub mod perf_log;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use metrics::{FpsCounter, FrameMetrics, Geometry, Status, SystemMonitor};
pub use perf_log::PerfLogger;

use crate::detection::Detector;
use crate::input::FrameSource;
use crate::models::Detection;
use crate::server::SharedState;

/// 读帧失败后的退避
const DROP_BACKOFF: Duration = Duration::from_millis(10);
/// 每轮循环后的让步
const LOOP_YIELD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub jpeg_quality: u8,
    pub metrics_interval: Duration,
}

/// 单轮结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 没拿到帧, 计入丢帧
    Dropped,
    /// 帧/检测/状态已发布
    Published,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    /// None 表示 --no-ml
    detector: Option<Detector>,
    state: Arc<SharedState>,
    logger: PerfLogger,
    config: PipelineConfig,

    metrics: FrameMetrics,
    fps: FpsCounter,
    monitor: SystemMonitor,
    last_log: Instant,
    frames: u64,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Option<Detector>,
        state: Arc<SharedState>,
        logger: PerfLogger,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            detector,
            state,
            logger,
            config,
            metrics: FrameMetrics::default(),
            fps: FpsCounter::new(),
            monitor: SystemMonitor::new(),
            last_log: Instant::now(),
            frames: 0,
        }
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    pub fn ml_enabled(&self) -> bool {
        self.detector.is_some()
    }

    fn geometry(&self) -> Geometry {
        Geometry {
            width: self.source.width(),
            height: self.source.height(),
            fps: self.source.fps(),
        }
    }

    /// 跑一轮 (不含循环间的 sleep)
    pub fn step(&mut self) -> StepOutcome {
        let t0 = Instant::now();

        let mut frame = match self.source.read() {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.dropped_frames += 1;
                if self.metrics.dropped_frames % 10 == 1 {
                    tracing::debug!(
                        "📷 [CAMERA] 读帧失败: {} (累计丢帧 {})",
                        e,
                        self.metrics.dropped_frames
                    );
                }
                return StepOutcome::Dropped;
            }
        };
        let t1 = Instant::now();
        self.metrics.camera_ms = ms(t1 - t0);

        self.frames += 1;
        if self.frames % 30 == 0 {
            tracing::debug!(
                "🔄 [MAIN] 第{}帧 ({}x{})",
                self.frames,
                frame.width(),
                frame.height()
            );
        }

        let detections: Vec<Detection> = match self.detector.as_mut() {
            Some(detector) => {
                let ys = detector.detect(&frame);
                self.metrics.inference_ms = detector.last_inference_ms();
                self.metrics.detection_count = ys.len();
                self.metrics.total_detections += ys.len() as u64;
                detector.draw(&mut frame, &ys);
                ys
            }
            None => {
                self.metrics.inference_ms = 0.0;
                self.metrics.detection_count = 0;
                Vec::new()
            }
        };

        // 只为计时, 推流端各自编码
        let t2 = Instant::now();
        if let Err(e) = frame.encode_jpeg(self.config.jpeg_quality) {
            tracing::warn!("⚠️ JPEG 编码失败: {:#}", e);
        }
        self.metrics.encode_ms = ms(t2.elapsed());

        self.state.update_frame(&frame);
        self.state.update_detections(&detections);

        let now = Instant::now();
        self.metrics.fps = self.fps.tick(now);
        let (cpu, ram) = self.monitor.sample();
        self.metrics.cpu_pct = cpu;
        self.metrics.ram_mb = ram;
        self.metrics.queue_size = 0;

        let status = Status::from_metrics(&self.metrics, self.geometry(), self.ml_enabled(), true);
        self.state.update_status(&status);

        if now.duration_since(self.last_log) >= self.config.metrics_interval {
            self.log_metrics();
            self.last_log = now;
        }

        StepOutcome::Published
    }

    fn log_metrics(&self) {
        if let Err(e) = self.logger.log(&self.metrics) {
            tracing::warn!("⚠️ 性能日志写入失败: {}", e);
        }
        let m = &self.metrics;
        tracing::info!(
            "FPS: {:.1} | Inference: {:.1}ms | Detections: {} | CPU: {:.0}% | RAM: {:.0}MB | Dropped: {}",
            m.fps,
            m.inference_ms,
            m.detection_count,
            m.cpu_pct,
            m.ram_mb,
            m.dropped_frames
        );
    }

    /// 主循环, `running` 清除后收尾返回
    pub fn run(&mut self, running: &AtomicBool) {
        tracing::info!("▶️ 流水线启动 (ML: {})", if self.ml_enabled() { "on" } else { "off" });
        while running.load(Ordering::SeqCst) {
            match self.step() {
                StepOutcome::Dropped => std::thread::sleep(DROP_BACKOFF),
                StepOutcome::Published => std::thread::sleep(LOOP_YIELD),
            }
        }
        self.finish();
    }

    /// 发布 running:false 的最终状态, 写最后一行日志并关闭
    pub fn finish(&mut self) {
        let status = Status::from_metrics(&self.metrics, self.geometry(), self.ml_enabled(), false);
        self.state.update_status(&status);
        if let Err(e) = self.logger.log(&self.metrics) {
            tracing::warn!("⚠️ 性能日志写入失败: {}", e);
        }
        self.logger.close();
        tracing::info!(
            "⏹️ 流水线停止: 共处理 {} 帧, 丢帧 {}, 检测 {} 个目标",
            self.frames,
            self.metrics.dropped_frames,
            self.metrics.total_detections
        );
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
