// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 预处理与后处理
// 预处理: 拉伸缩放 (不保持长宽比) → BGR→RGB → NCHW /255
// 后处理: (4+C)×N 矩阵 → 置信度过滤 → 映射回源图坐标并裁剪

use anyhow::{Context, Result};
use fast_image_resize as fr;
use ndarray::{Array2, Array4, ArrayD, ArrayView2, Axis, Ix2};

use super::{class_name, BoxRect, Detection};
use crate::input::Frame;

/// 解码参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub input_width: u32,
    pub input_height: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub conf_threshold: f32,
}

/// 缩放到模型输入尺寸并转成 `[1, 3, H, W]` 的 RGB 浮点张量
pub fn preprocess(frame: &Frame, input_width: u32, input_height: u32) -> Result<Array4<f32>> {
    let (w, h) = (input_width as usize, input_height as usize);

    let resized;
    let bgr: &[u8] = if frame.width() == input_width && frame.height() == input_height {
        frame.as_bgr()
    } else {
        let src = fr::images::ImageRef::new(
            frame.width(),
            frame.height(),
            frame.as_bgr(),
            fr::PixelType::U8x3,
        )
        .context("invalid source frame for resize")?;
        let mut dst = fr::images::Image::new(input_width, input_height, fr::PixelType::U8x3);
        let mut resizer = fr::Resizer::new();
        resizer
            .resize(
                &src,
                &mut dst,
                Some(
                    &fr::ResizeOptions::new()
                        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
                ),
            )
            .context("resize to model input failed")?;
        resized = dst.buffer().to_vec();
        &resized
    };

    let mut ys = Array4::<f32>::zeros((1, 3, h, w));
    for (i, px) in bgr.chunks_exact(3).enumerate() {
        let (y, x) = (i / w, i % w);
        ys[[0, 0, y, x]] = px[2] as f32 / 255.0;
        ys[[0, 1, y, x]] = px[1] as f32 / 255.0;
        ys[[0, 2, y, x]] = px[0] as f32 / 255.0;
    }
    Ok(ys)
}

/// 统一输出为 (4+C)×N 矩阵; `[1, 4+C, N]` 会去掉 batch 维
///
/// 形状不符合 YOLOv8 布局时返回 None
pub fn output_matrix(raw: ArrayD<f32>) -> Option<Array2<f32>> {
    let raw = match raw.ndim() {
        2 => raw,
        3 if raw.shape()[0] == 1 => raw.index_axis_move(Axis(0), 0),
        _ => return None,
    };
    let m = raw.into_dimensionality::<Ix2>().ok()?;
    // 至少 4 个坐标 + 1 个类别
    if m.nrows() < 5 {
        return None;
    }
    Some(m)
}

/// 逐列解码候选框
pub fn decode(matrix: ArrayView2<f32>, params: &DecodeParams, labels: &[String]) -> Vec<Detection> {
    let num_classes = matrix.nrows().saturating_sub(4);
    if num_classes == 0 || params.input_width == 0 || params.input_height == 0 {
        return Vec::new();
    }

    let scale_x = params.image_width as f32 / params.input_width as f32;
    let scale_y = params.image_height as f32 / params.input_height as f32;
    let max_x = (params.image_width as i32 - 1).max(0);
    let max_y = (params.image_height as i32 - 1).max(0);

    let mut ys = Vec::new();
    for col in matrix.axis_iter(Axis(1)) {
        let (cx, cy, w, h) = (col[0], col[1], col[2], col[3]);

        let mut best_class = 0;
        let mut best_conf = col[4];
        for c in 1..num_classes {
            if col[4 + c] > best_conf {
                best_conf = col[4 + c];
                best_class = c;
            }
        }
        // NaN 同样被过滤
        if !(best_conf >= params.conf_threshold) {
            continue;
        }

        let x1 = (((cx - w / 2.0) * scale_x) as i32).clamp(0, max_x);
        let y1 = (((cy - h / 2.0) * scale_y) as i32).clamp(0, max_y);
        let x2 = (((cx + w / 2.0) * scale_x) as i32).clamp(0, max_x);
        let y2 = (((cy + h / 2.0) * scale_y) as i32).clamp(0, max_y);

        ys.push(Detection {
            class_id: best_class,
            class_name: class_name(labels, best_class),
            confidence: best_conf,
            bbox: BoxRect::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0)),
        });
    }
    ys
}
