//! 运行指标: 单帧耗时 / FPS 窗口 / CPU 与内存占用 / 对外状态

use std::time::{Duration, Instant};

use serde::Serialize;
use sysinfo::System;

/// 每次循环覆盖写入, 按日志间隔采样
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetrics {
    pub fps: f64,
    pub inference_ms: f64,
    pub camera_ms: f64,
    pub encode_ms: f64,
    pub detection_count: usize,
    /// 进程生命周期内只增不减
    pub total_detections: u64,
    /// 进程生命周期内只增不减
    pub dropped_frames: u64,
    pub cpu_pct: f64,
    pub ram_mb: f64,
    pub queue_size: usize,
}

/// 滚动 FPS: 每满 1 秒结算一次并清零
#[derive(Debug, Clone)]
pub struct FpsCounter {
    count: u32,
    window_start: Instant,
    fps: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            fps: 0.0,
        }
    }

    /// 记一帧, 返回当前 FPS (窗口未满时保持上次结算值)
    pub fn tick(&mut self, now: Instant) -> f64 {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.count as f64 / elapsed;
            self.count = 0;
            self.window_start = now;
        }
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 系统占用采样 (sysinfo); 平台不支持时读数为 0
pub struct SystemMonitor {
    sys: System,
    last_sample: Option<Instant>,
    cpu_pct: f64,
    ram_mb: f64,
}

impl SystemMonitor {
    /// 两次 CPU 刷新之间至少间隔这么久, 读数才有意义
    const MIN_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        Self {
            sys: System::new(),
            last_sample: None,
            cpu_pct: 0.0,
            ram_mb: 0.0,
        }
    }

    /// (cpu %, 已用内存 MB); 采样间隔内返回缓存值
    pub fn sample(&mut self) -> (f64, f64) {
        let now = Instant::now();
        let due = self
            .last_sample
            .map_or(true, |t| now.duration_since(t) >= Self::MIN_INTERVAL);
        if due {
            self.sys.refresh_cpu();
            self.sys.refresh_memory();

            let cpus = self.sys.cpus();
            self.cpu_pct = if cpus.is_empty() {
                0.0
            } else {
                cpus.iter().map(|c| c.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
            };
            self.ram_mb = self.sys.used_memory() as f64 / 1024.0 / 1024.0;
            self.last_sample = Some(now);
        }
        (self.cpu_pct, self.ram_mb)
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// `/api/status` 返回的状态记录 (字段顺序即 JSON 键顺序)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    pub fps: f64,
    pub inference_time_ms: f64,
    pub detections_count: usize,
    pub total_detections: u64,
    pub cpu_usage_percent: f64,
    pub ram_usage_mb: f64,
    pub camera_frame_time_ms: f64,
    pub jpeg_encode_time_ms: f64,
    pub dropped_frames: u64,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_fps: f64,
    pub ml_enabled: bool,
    pub running: bool,
}

/// 帧源几何信息
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Status {
    pub fn from_metrics(m: &FrameMetrics, geometry: Geometry, ml_enabled: bool, running: bool) -> Self {
        Self {
            fps: m.fps,
            inference_time_ms: m.inference_ms,
            detections_count: m.detection_count,
            total_detections: m.total_detections,
            cpu_usage_percent: m.cpu_pct,
            ram_usage_mb: m.ram_mb,
            camera_frame_time_ms: m.camera_ms,
            jpeg_encode_time_ms: m.encode_ms,
            dropped_frames: m.dropped_frames,
            camera_width: geometry.width,
            camera_height: geometry.height,
            camera_fps: geometry.fps,
            ml_enabled,
            running,
        }
    }
}
