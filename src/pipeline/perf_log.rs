//! CSV 性能日志
//!
//! 启动时在日志目录下新建 `performance_YYYYMMDD_HHMMSS.csv`, 每个指标间隔写一行并立即落盘

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

use super::metrics::FrameMetrics;

pub const CSV_HEADER: &str = "timestamp,fps,inference_time_ms,detections_count,\
cpu_usage_percent,ram_usage_mb,camera_frame_time_ms,jpeg_encode_time_ms,\
total_detections,dropped_frames,queue_size";

pub struct PerfLogger {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl PerfLogger {
    /// 创建日志目录与文件并写表头
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;

        let name = format!(
            "performance_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let is_new = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{}", CSV_HEADER)?;
            writer.flush()?;
        }

        tracing::info!("✅ 性能日志: {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一行; 已关闭时忽略
    pub fn log(&self, m: &FrameMetrics) -> io::Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(writer) = guard.as_mut() else {
            return Ok(());
        };
        writeln!(writer, "{}", format_row(&timestamp(), m))?;
        writer.flush()
    }

    pub fn close(&self) {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.flush() {
                tracing::warn!("⚠️ 性能日志刷新失败: {}", e);
            }
            tracing::info!("✅ 性能日志已关闭");
        }
    }
}

impl Drop for PerfLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// 本地时间, 毫秒精度
fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.3f")
        .to_string()
}

fn format_row(timestamp: &str, m: &FrameMetrics) -> String {
    format!(
        "{},{:.2},{:.2},{},{:.2},{:.2},{:.2},{:.2},{},{},{}",
        timestamp,
        m.fps,
        m.inference_ms,
        m.detection_count,
        m.cpu_pct,
        m.ram_mb,
        m.camera_ms,
        m.encode_ms,
        m.total_detections,
        m.dropped_frames,
        m.queue_size
    )
}
