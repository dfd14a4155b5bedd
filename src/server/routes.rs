//! 请求行路由与响应报文
//!
//! 只解析请求的第一行, 在 "GET " 之后做前缀匹配

use serde::Serialize;

use crate::models::Detection;
use crate::pipeline::metrics::Status;

/// 单次读取请求的上限
pub const MAX_REQUEST_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    VideoFeed,
    Detections,
    Status,
    Health,
    NotFound,
}

impl Route {
    const TABLE: [(&'static str, Route); 4] = [
        ("/video_feed", Route::VideoFeed),
        ("/api/detections", Route::Detections),
        ("/api/status", Route::Status),
        ("/health", Route::Health),
    ];

    pub fn from_request_line(line: &str) -> Route {
        let Some(target) = line.strip_prefix("GET ") else {
            return Route::NotFound;
        };
        Self::TABLE
            .iter()
            .find(|(prefix, _)| target.starts_with(prefix))
            .map(|(_, route)| *route)
            .unwrap_or(Route::NotFound)
    }
}

/// 取出以 CRLF 结尾的第一行; 没有 CRLF 时返回 None (不响应)
pub fn request_line(buf: &[u8]) -> Option<&str> {
    let end = buf.windows(2).position(|w| w == b"\r\n")?;
    std::str::from_utf8(&buf[..end]).ok()
}

#[derive(Serialize)]
struct DetectionJson<'a> {
    class: &'a str,
    confidence: f32,
    bbox: [i32; 4],
}

#[derive(Serialize)]
struct DetectionsBody<'a> {
    success: bool,
    detections: Vec<DetectionJson<'a>>,
    count: usize,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    server: &'static str,
    port: u16,
}

pub fn detections_body(detections: &[Detection]) -> String {
    let body = DetectionsBody {
        success: true,
        detections: detections
            .iter()
            .map(|d| DetectionJson {
                class: &d.class_name,
                confidence: d.confidence,
                bbox: d.bbox.as_array(),
            })
            .collect(),
        count: detections.len(),
    };
    serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string())
}

pub fn status_body(status: Option<&Status>) -> String {
    status
        .and_then(|s| serde_json::to_string(s).ok())
        .unwrap_or_else(|| "{}".to_string())
}

pub fn health_body(port: u16) -> String {
    let body = HealthBody {
        status: "ok",
        server: "cpp",
        port,
    };
    serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string())
}

pub fn json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

pub fn not_found_response() -> &'static str {
    "HTTP/1.1 404 Not Found\r\n\
     Content-Type: text/plain\r\n\
     Connection: close\r\n\r\n\
     404 Not Found"
}
