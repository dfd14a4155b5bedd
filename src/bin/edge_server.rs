/// 边缘实时检测服务
///
/// 摄像头/视频文件 → YOLO 检测 → 画框 → MJPEG 推流 + JSON 接口
/// Ctrl+C / SIGTERM 优雅退出, 初始化失败返回 1
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use yolov8_edge::input::{CameraSource, FrameSource, VideoFileSource};
use yolov8_edge::pipeline::{PerfLogger, Pipeline};
use yolov8_edge::{Args, Detector, HttpServer, OrtBackend, Settings, SharedState};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ 启动失败: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// 默认 info; --verbose 时本 crate 输出 debug; RUST_LOG 优先
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,yolov8_edge=debug,edge_server=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn banner(settings: &Settings) {
    info!("╔════════════════════════════════════════════════╗");
    info!("║        🚀 YOLO 边缘实时检测服务                ║");
    info!("╚════════════════════════════════════════════════╝");
    info!(
        "📷 输入: {}",
        settings
            .video_file
            .as_deref()
            .unwrap_or(settings.camera.device.as_str())
    );
    info!("🎯 检测: {}", if settings.ml_enabled { "开启" } else { "关闭 (--no-ml)" });
    info!("⚡ 加速: {}", if settings.use_accelerator { "开启" } else { "关闭" });
    if settings.verbose {
        info!("🔍 详细日志:");
        info!("  [CAMERA]   - 摄像头读帧");
        info!("  [Detector] - 推理与检测数量");
        info!("  [HTTP]     - 连接与推流");
        info!("  [API]      - 检测结果/状态接口");
        info!("  [MAIN]     - 主循环进度");
    }
}

fn run(args: Args) -> Result<()> {
    let settings = Settings::load(&args).with_context(|| {
        format!(
            "配置加载失败 (默认位置 {}, 可用 --config 指定)",
            yolov8_edge::config::DEFAULT_CONFIG_PATH
        )
    })?;
    banner(&settings);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        }) {
            warn!("⚠️ 无法注册 Ctrl+C 处理: {err}");
        }
    }

    let logger = PerfLogger::create(&settings.logging.path).context("性能日志初始化失败")?;

    let source: Box<dyn FrameSource> = match &settings.video_file {
        Some(path) => Box::new(VideoFileSource::open(path, settings.camera.read_timeout)?),
        None => Box::new(CameraSource::open(&settings.camera).context("摄像头初始化失败")?),
    };

    let detector = if settings.ml_enabled {
        let engine = OrtBackend::build(settings.ort()?).context("模型加载失败")?;
        Some(Detector::new(Box::new(engine), settings.detector()?))
    } else {
        warn!("⚠️ 检测已关闭 (--no-ml), 只推送摄像头画面");
        None
    };

    let state = Arc::new(SharedState::new());
    let mut server =
        HttpServer::start(&settings.server(), Arc::clone(&state)).context("HTTP 服务启动失败")?;

    let mut pipeline = Pipeline::new(source, detector, state, logger, settings.pipeline());
    info!("✅ 系统就绪, 按 Ctrl+C 退出");

    let worker = {
        let running = running.clone();
        std::thread::Builder::new()
            .name("pipeline".into())
            .spawn(move || pipeline.run(&running))
            .context("failed to spawn pipeline thread")?
    };
    if worker.join().is_err() {
        error!("❌ 流水线线程异常退出");
    }

    info!("🛑 正在退出...");
    server.stop();
    info!("✓ 退出完成");
    Ok(())
}
