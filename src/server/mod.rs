/// HTTP 服务 (HTTP Server)
///
/// 接收线程轮询非阻塞监听套接字, 每个连接一个线程:
/// - /video_feed       MJPEG 长连接推流
/// - /api/detections   最新检测结果 JSON
/// - /api/status       最新状态 JSON
/// - /health           健康检查
pub mod mjpeg;
pub mod routes;
pub mod shared;

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

pub use routes::Route;
pub use shared::SharedState;

use crate::input::Frame;
use crate::models::Detection;
use crate::pipeline::metrics::Status;

/// 接收循环的轮询间隔
const ACCEPT_POLL: Duration = Duration::from_millis(50);
/// 读请求超时
const REQUEST_READ_TIMEOUT: Duration = Duration::from_millis(500);
/// 单次写超时, 客户端不读时推流在此时间内放弃
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub jpeg_quality: u8,
}

/// 连接线程共享的上下文
struct ConnectionContext {
    state: Arc<SharedState>,
    running: Arc<AtomicBool>,
    port: u16,
    jpeg_quality: u8,
}

pub struct HttpServer {
    state: Arc<SharedState>,
    running: Arc<AtomicBool>,
    port: u16,
    accept: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// 绑定端口并启动接收线程; 绑定失败返回错误
    pub fn start(config: &ServerConfig, state: Arc<SharedState>) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
        listener
            .set_nonblocking(true)
            .context("failed to set listener non-blocking")?;
        let port = listener.local_addr().context("listener has no address")?.port();

        let running = Arc::new(AtomicBool::new(true));
        let ctx = Arc::new(ConnectionContext {
            state: Arc::clone(&state),
            running: Arc::clone(&running),
            port,
            jpeg_quality: config.jpeg_quality,
        });

        let accept = std::thread::Builder::new()
            .name("http-accept".into())
            .spawn(move || accept_loop(listener, ctx))
            .context("failed to spawn accept thread")?;

        tracing::info!("🌐 HTTP 服务启动: http://{}:{}", config.host, port);
        tracing::info!("  📺 视频流:   /video_feed");
        tracing::info!("  🎯 检测结果: /api/detections");
        tracing::info!("  📊 状态:     /api/status");
        tracing::info!("  💓 健康检查: /health");

        Ok(Self {
            state,
            running,
            port,
            accept: Some(accept),
        })
    }

    /// 实际绑定的端口
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn update_frame(&self, frame: &Frame) {
        self.state.update_frame(frame);
    }

    pub fn update_detections(&self, detections: &[Detection]) {
        self.state.update_detections(detections);
    }

    pub fn update_status(&self, status: &Status) {
        self.state.update_status(status);
    }

    /// 停止接收并等待所有连接线程退出
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(accept) = self.accept.take() {
            if accept.join().is_err() {
                tracing::error!("❌ 接收线程异常退出");
            }
            tracing::info!("🛑 HTTP 服务已停止");
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 连接线程 + 用于停止时强制关闭的套接字副本
struct Connection {
    handle: JoinHandle<()>,
    socket: Option<TcpStream>,
}

fn accept_loop(listener: TcpListener, ctx: Arc<ConnectionContext>) {
    let mut connections: Vec<Connection> = Vec::new();

    while ctx.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let socket = stream.try_clone().ok();
                let ctx = Arc::clone(&ctx);
                let spawned = std::thread::Builder::new()
                    .name(format!("http-{}", peer))
                    .spawn(move || {
                        if let Err(e) = handle_connection(stream, peer, &ctx) {
                            tracing::debug!("🌐 [HTTP] {} 连接错误: {}", peer, e);
                        }
                    });
                match spawned {
                    Ok(handle) => connections.push(Connection { handle, socket }),
                    Err(e) => tracing::warn!("⚠️ 无法创建连接线程: {}", e),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                tracing::debug!("🌐 [HTTP] accept 失败: {}", e);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
        connections.retain(|c| !c.handle.is_finished());
    }

    // 关闭仍在读请求或推流的套接字, 阻塞中的 read/write 立即返回
    for conn in &connections {
        if let Some(socket) = &conn.socket {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }
    for conn in connections {
        let _ = conn.handle.join();
    }
}

fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let _ = stream.set_nodelay(true);

    let mut buf = [0u8; routes::MAX_REQUEST_BYTES];
    let n = stream.read(&mut buf)?;
    if n == 0 {
        return Ok(());
    }
    let Some(line) = routes::request_line(&buf[..n]) else {
        return Ok(());
    };
    tracing::debug!("🌐 [HTTP] {} -> {}", peer, line);

    match Route::from_request_line(line) {
        Route::VideoFeed => {
            tracing::debug!("🌐 [HTTP] 开始向 {} 推流", peer);
            let sent = mjpeg::stream(
                &mut stream,
                &ctx.state,
                &ctx.running,
                ctx.jpeg_quality,
                mjpeg::FRAME_PACING,
            )?;
            tracing::debug!("🌐 [HTTP] {} 推流结束, 共 {} 帧", peer, sent);
        }
        Route::Detections => {
            let detections = ctx.state.latest_detections();
            let body = routes::detections_body(&detections);
            tracing::debug!("🎯 [API] 检测结果 -> {}: {} 个", peer, detections.len());
            stream.write_all(routes::json_response(&body).as_bytes())?;
        }
        Route::Status => {
            let body = routes::status_body(ctx.state.latest_status().as_ref());
            tracing::debug!("📊 [API] 状态 -> {}", peer);
            stream.write_all(routes::json_response(&body).as_bytes())?;
        }
        Route::Health => {
            stream.write_all(routes::json_response(&routes::health_body(ctx.port)).as_bytes())?;
        }
        Route::NotFound => {
            tracing::debug!("🌐 [HTTP] 404 {}: {}", peer, line);
            stream.write_all(routes::not_found_response().as_bytes())?;
        }
    }
    stream.flush()
}
