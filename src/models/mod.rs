// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测结果类型与模型接口
///
/// # 架构说明
/// - `Detection` / `BoxRect`: 源图像素坐标下的检测框
/// - `iou` / `non_max_suppression`: 按类别的贪心 NMS
/// - `InferenceEngine`: 推理后端接口, 输入 NCHW 张量, 输出原始矩阵
/// - `yolov8`: 预处理 (缩放 + BGR→RGB + 归一化) 与输出解码
///
/// ## 使用示例
/// ```rust,ignore
/// let tensor = yolov8::preprocess(&frame, 640, 480)?;
/// let raw = engine.infer(&tensor)?;
/// let mut dets = yolov8::decode(raw.view(), &params, &labels);
/// non_max_suppression(&mut dets, 0.5);
/// ```
pub mod yolov8;

use anyhow::Result;
use ndarray::{Array4, ArrayD};

/// 整数坐标的轴对齐矩形 (x, y, w, h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoxRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoxRect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    pub fn area(&self) -> i64 {
        self.w.max(0) as i64 * self.h.max(0) as i64
    }

    /// 交集面积
    pub fn intersect(&self, other: &BoxRect) -> i64 {
        let l = self.x.max(other.x);
        let t = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        (r - l).max(0) as i64 * (b - t).max(0) as i64
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.x, self.y, self.w, self.h]
    }
}

/// 单个检测目标
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoxRect,
}

/// 交并比, 并集为0时定义为0
pub fn iou(a: &BoxRect, b: &BoxRect) -> f32 {
    let inter = a.intersect(b);
    let union = a.area() + b.area() - inter;
    if union <= 0 {
        return 0.0;
    }
    inter as f32 / union as f32
}

/// 按置信度降序排序后贪心抑制, 只比较同类别的框
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; xs.len()];
    for i in 0..xs.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..xs.len() {
            if suppressed[j] || xs[i].class_id != xs[j].class_id {
                continue;
            }
            if iou(&xs[i].bbox, &xs[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    let mut keep = suppressed.iter().map(|s| !s);
    xs.retain(|_| keep.next().unwrap_or(false));
}

/// 类别名: 有标签用标签, 否则用十进制编号
pub fn class_name(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| class_id.to_string())
}

/// 推理后端
pub trait InferenceEngine: Send {
    /// 输入 `[1, 3, H, W]`, 返回模型原始输出 (形状由模型决定)
    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>>;

    fn name(&self) -> &str {
        "engine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn det(class_id: usize, confidence: f32, x: i32, y: i32, w: i32, h: i32) -> Detection {
        Detection {
            class_id,
            class_name: class_id.to_string(),
            confidence,
            bbox: BoxRect::new(x, y, w, h),
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoxRect::new(10, 10, 100, 100);
        assert_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &BoxRect::new(200, 200, 10, 10)), 0.0);
        // 边相接不算重叠
        assert_eq!(iou(&a, &BoxRect::new(110, 10, 10, 10)), 0.0);
    }

    #[test]
    fn iou_of_degenerate_boxes_is_zero() {
        let a = BoxRect::new(5, 5, 0, 0);
        assert_eq!(iou(&a, &a), 0.0);
    }

    #[test]
    fn suppresses_same_class_overlap() {
        let mut xs = vec![det(0, 0.8, 15, 15, 100, 100), det(0, 0.9, 10, 10, 100, 100)];
        non_max_suppression(&mut xs, 0.5);
        assert_eq!(xs.len(), 1);
        assert_eq!(xs[0].confidence, 0.9);
        assert_eq!(xs[0].bbox, BoxRect::new(10, 10, 100, 100));
    }

    #[test]
    fn keeps_cross_class_overlap() {
        let mut xs = vec![det(0, 0.9, 10, 10, 100, 100), det(1, 0.8, 15, 15, 100, 100)];
        non_max_suppression(&mut xs, 0.5);
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn suppressed_box_does_not_suppress_others() {
        // a 抑制 b; b 与 c 重叠但 b 已被抑制, c 与 a 不重叠, 保留
        let mut xs = vec![
            det(0, 0.9, 0, 0, 100, 100),
            det(0, 0.8, 30, 0, 100, 100),
            det(0, 0.7, 110, 0, 100, 100),
        ];
        non_max_suppression(&mut xs, 0.5);
        let kept: Vec<f32> = xs.iter().map(|d| d.confidence).collect();
        assert_eq!(kept, vec![0.9, 0.7]);
    }

    #[test]
    fn falls_back_to_numeric_class_name() {
        let labels = vec!["stop".to_string(), "yield".to_string()];
        assert_eq!(class_name(&labels, 1), "yield");
        assert_eq!(class_name(&labels, 7), "7");
        assert_eq!(class_name(&[], 0), "0");
    }

    fn arb_box() -> impl Strategy<Value = BoxRect> {
        (0i32..200, 0i32..200, 0i32..120, 0i32..120).prop_map(|(x, y, w, h)| BoxRect::new(x, y, w, h))
    }

    fn arb_detection() -> impl Strategy<Value = Detection> {
        (0usize..3, 0.0f32..1.0, arb_box()).prop_map(|(c, conf, b)| Detection {
            class_id: c,
            class_name: c.to_string(),
            confidence: conf,
            bbox: b,
        })
    }

    proptest! {
        #[test]
        fn iou_is_symmetric_and_bounded(a in arb_box(), b in arb_box()) {
            let ab = iou(&a, &b);
            prop_assert_eq!(ab, iou(&b, &a));
            prop_assert!((0.0..=1.0).contains(&ab));
        }

        #[test]
        fn iou_of_box_with_itself(a in arb_box()) {
            prop_assume!(a.area() > 0);
            prop_assert_eq!(iou(&a, &a), 1.0);
        }

        #[test]
        fn nms_output_is_subset_without_same_class_overlap(
            input in proptest::collection::vec(arb_detection(), 0..40),
            thr in 0.1f32..0.9,
        ) {
            let mut out = input.clone();
            non_max_suppression(&mut out, thr);
            prop_assert!(out.len() <= input.len());
            for d in &out {
                prop_assert!(input.contains(d));
            }
            for (i, a) in out.iter().enumerate() {
                for b in &out[i + 1..] {
                    if a.class_id == b.class_id {
                        prop_assert!(iou(&a.bbox, &b.bbox) <= thr);
                    }
                }
            }
        }

        #[test]
        fn nms_is_identity_for_distinct_classes(
            boxes in proptest::collection::vec((arb_box(), 0.0f32..1.0), 0..12),
            thr in 0.0f32..1.0,
        ) {
            let input: Vec<Detection> = boxes
                .into_iter()
                .enumerate()
                .map(|(i, (b, conf))| Detection {
                    class_id: i,
                    class_name: i.to_string(),
                    confidence: conf,
                    bbox: b,
                })
                .collect();
            let mut out = input.clone();
            non_max_suppression(&mut out, thr);
            prop_assert_eq!(out.len(), input.len());
            for d in &input {
                prop_assert!(out.contains(d));
            }
        }
    }
}
