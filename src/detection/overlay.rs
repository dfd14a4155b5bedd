//! 检测框叠加绘制 (只用于 MJPEG 推流画面)
//!
//! 2 像素绿色边框 + 框上方绿色标签条, 标签 "<类别>: <百分比>%" 黑字

use ab_glyph::{FontVec, PxScale};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::input::Frame;
use crate::models::Detection;

/// 画布按 BGR 解释, 绿色两种顺序相同
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_SCALE: f32 = 15.0;
/// 没有字体时按字符数估算标签尺寸
const FALLBACK_CHAR_WIDTH: u32 = 8;
const FALLBACK_TEXT_HEIGHT: u32 = 12;

/// 默认字体查找位置
const FONT_CANDIDATES: [&str; 4] = [
    "assets/fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

/// 加载标签字体: 先用配置路径, 再找常见系统位置; 都没有时返回 None
pub fn load_font(path: Option<&str>) -> Option<FontVec> {
    for candidate in path.into_iter().chain(FONT_CANDIDATES) {
        let Ok(bytes) = std::fs::read(candidate) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                tracing::debug!("🔤 标签字体: {}", candidate);
                return Some(font);
            }
            Err(e) => tracing::warn!("⚠️ 字体 {} 无法解析: {}", candidate, e),
        }
    }
    tracing::warn!("⚠️ 未找到标签字体, 标签条不显示文字");
    None
}

/// 标签文字
pub fn label_text(det: &Detection) -> String {
    format!("{}: {}%", det.class_name, (det.confidence * 100.0) as i32)
}

/// 原地绘制所有检测框
pub fn draw(frame: &mut Frame, detections: &[Detection], font: Option<&FontVec>) {
    if frame.is_empty() {
        return;
    }
    let Some(mut canvas) = frame.canvas_mut() else {
        return;
    };

    for det in detections {
        let b = det.bbox;

        // 边框: 外圈 + 内圈
        if b.w > 0 && b.h > 0 {
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(b.x, b.y).of_size(b.w as u32, b.h as u32),
                BOX_COLOR,
            );
        }
        if b.w > 2 && b.h > 2 {
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(b.x + 1, b.y + 1).of_size(b.w as u32 - 2, b.h as u32 - 2),
                BOX_COLOR,
            );
        }

        // 标签条
        let text = label_text(det);
        let scale = PxScale::from(LABEL_SCALE);
        let (tw, th) = match font {
            Some(f) => text_size(scale, f, &text),
            None => (
                FALLBACK_CHAR_WIDTH * text.chars().count() as u32,
                FALLBACK_TEXT_HEIGHT,
            ),
        };
        let bar_top = b.y - th as i32 - 5;
        if tw > 0 {
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(b.x, bar_top).of_size(tw, th + 5),
                BOX_COLOR,
            );
        }
        if let Some(f) = font {
            draw_text_mut(&mut canvas, TEXT_COLOR, b.x, bar_top + 2, scale, f, &text);
        }
    }
}
