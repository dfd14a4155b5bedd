//! 共享状态: 最新帧 / 最新检测结果 / 最新状态
//!
//! 单写 (流水线) 多读 (HTTP 连接), 三个槽位各自加锁, 互不阻塞。
//! 写入先在锁外深拷贝再整体替换; 读取在锁内拷出后立即释放。
//! 三个槽位之间没有一致性保证, 读者可能看到相差一帧的帧与检测结果。

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::input::Frame;
use crate::models::Detection;
use crate::pipeline::metrics::Status;

#[derive(Default)]
pub struct SharedState {
    frame: Mutex<Option<Frame>>,
    detections: Mutex<Vec<Detection>>,
    status: Mutex<Option<Status>>,
}

/// 每次写入都是整体替换, 持锁线程 panic 也不会留下半成品
fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_frame(&self, frame: &Frame) {
        let copy = frame.clone();
        *lock(&self.frame) = Some(copy);
    }

    /// 还没有帧时返回 None
    pub fn latest_frame(&self) -> Option<Frame> {
        lock(&self.frame).clone()
    }

    pub fn update_detections(&self, detections: &[Detection]) {
        let copy = detections.to_vec();
        *lock(&self.detections) = copy;
    }

    pub fn latest_detections(&self) -> Vec<Detection> {
        lock(&self.detections).clone()
    }

    pub fn update_status(&self, status: &Status) {
        let copy = status.clone();
        *lock(&self.status) = Some(copy);
    }

    /// 还没有状态时返回 None (接口返回 `{}`)
    pub fn latest_status(&self) -> Option<Status> {
        lock(&self.status).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoxRect;
    use std::sync::Arc;

    #[test]
    fn empty_slots_read_as_empty() {
        let state = SharedState::new();
        assert!(state.latest_frame().is_none());
        assert!(state.latest_detections().is_empty());
        assert!(state.latest_status().is_none());
    }

    #[test]
    fn published_frame_is_independent_copy() {
        let state = SharedState::new();
        let mut frame = Frame::filled(8, 8, [1, 2, 3]);
        state.update_frame(&frame);

        // 生产者继续修改自己的缓冲区
        if let Some(mut canvas) = frame.canvas_mut() {
            canvas.put_pixel(0, 0, image::Rgb([9, 9, 9]));
        }

        let seen = state.latest_frame().unwrap();
        assert_eq!(seen, Frame::filled(8, 8, [1, 2, 3]));
        assert_ne!(seen, frame);
    }

    #[test]
    fn detections_are_replaced_wholesale() {
        let state = SharedState::new();
        let det = Detection {
            class_id: 1,
            class_name: "yield".into(),
            confidence: 0.7,
            bbox: BoxRect::new(1, 2, 3, 4),
        };
        state.update_detections(&[det.clone(), det.clone()]);
        state.update_detections(&[det.clone()]);
        assert_eq!(state.latest_detections(), vec![det]);
    }

    #[test]
    fn frame_reader_is_not_blocked_by_status_lock() {
        let state = Arc::new(SharedState::new());
        state.update_frame(&Frame::black(2, 2));

        let _status_guard = lock(&state.status);
        let reader = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || state.latest_frame().is_some())
        };
        assert!(reader.join().unwrap());
    }
}
