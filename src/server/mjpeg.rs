//! MJPEG 推流 (multipart/x-mixed-replace)
//!
//! 每次发送快照时刻的最新帧, 中间帧直接跳过

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::shared::SharedState;

pub const STREAM_HEADER: &str = "HTTP/1.1 200 OK\r\n\
     Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
     Cache-Control: no-cache\r\n\
     Connection: close\r\n\r\n";

/// 约 30fps
pub const FRAME_PACING: Duration = Duration::from_millis(33);

/// 单帧分段: 边界 + 头 + JPEG + CRLF
pub fn part(jpeg: &[u8]) -> Vec<u8> {
    let head = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut out = Vec::with_capacity(head.len() + jpeg.len() + 2);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(jpeg);
    out.extend_from_slice(b"\r\n");
    out
}

/// 推流直到 `running` 被清除或对端断开, 返回已发送帧数
///
/// 响应头写入失败返回 Err; 推流中途写失败视为客户端断开, 正常返回
pub fn stream<W: Write>(
    out: &mut W,
    state: &SharedState,
    running: &AtomicBool,
    quality: u8,
    pacing: Duration,
) -> io::Result<u64> {
    out.write_all(STREAM_HEADER.as_bytes())?;
    out.flush()?;

    let mut sent = 0u64;
    while running.load(Ordering::SeqCst) {
        match state.latest_frame() {
            Some(frame) if !frame.is_empty() => match frame.encode_jpeg(quality) {
                Ok(jpeg) => {
                    if let Err(e) = out.write_all(&part(&jpeg)).and_then(|_| out.flush()) {
                        tracing::debug!("🌐 [HTTP] 客户端断开 ({} 帧后): {}", sent, e);
                        break;
                    }
                    sent += 1;
                    if sent % 100 == 0 {
                        tracing::debug!("🌐 [HTTP] 已推送 {} 帧", sent);
                    }
                }
                Err(e) => tracing::warn!("⚠️ JPEG 编码失败: {:#}", e),
            },
            _ => tracing::trace!("🌐 [HTTP] 暂无画面, 等待..."),
        }
        std::thread::sleep(pacing);
    }
    Ok(sent)
}
