mod common;

use std::io::Write;
use std::sync::atomic::Ordering;

use ndarray::{ArrayD, IxDyn};

use common::{detector_config, proposals, FixedEngine};
use yolov8_edge::input::Frame;
use yolov8_edge::models::BoxRect;
use yolov8_edge::Detector;

fn detector_with(output: ArrayD<f32>, labels: &str) -> Detector {
    Detector::new(Box::new(FixedEngine::new(output)), detector_config(labels))
}

#[test]
fn decodes_single_proposal_with_label() {
    let mut labels = tempfile::NamedTempFile::new().unwrap();
    writeln!(labels, "stop\nyield\nspeed_limit").unwrap();

    let mut detector = detector_with(
        proposals(3, &[(320.0, 240.0, 100.0, 50.0, 2, 0.9)]),
        labels.path().to_str().unwrap(),
    );
    let dets = detector.detect(&Frame::black(640, 480));

    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].class_id, 2);
    assert_eq!(dets[0].class_name, "speed_limit");
    assert_eq!(dets[0].confidence, 0.9);
    assert_eq!(dets[0].bbox, BoxRect::new(270, 215, 100, 50));
    assert!(detector.last_inference_ms() >= 0.0);
}

#[test]
fn unknown_labels_fall_back_to_class_number() {
    let mut detector = detector_with(
        proposals(3, &[(320.0, 240.0, 100.0, 50.0, 2, 0.9)]),
        "/nonexistent/labels.txt",
    );
    let dets = detector.detect(&Frame::black(640, 480));
    assert_eq!(dets[0].class_name, "2");
}

#[test]
fn same_class_overlap_is_suppressed() {
    let mut detector = detector_with(
        proposals(
            2,
            &[(65.0, 65.0, 100.0, 100.0, 0, 0.8), (60.0, 60.0, 100.0, 100.0, 0, 0.9)],
        ),
        "",
    );
    let dets = detector.detect(&Frame::black(640, 480));
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].confidence, 0.9);
    assert_eq!(dets[0].bbox, BoxRect::new(10, 10, 100, 100));
}

#[test]
fn cross_class_overlap_survives() {
    let mut detector = detector_with(
        proposals(
            2,
            &[(60.0, 60.0, 100.0, 100.0, 0, 0.9), (65.0, 65.0, 100.0, 100.0, 1, 0.8)],
        ),
        "",
    );
    let dets = detector.detect(&Frame::black(640, 480));
    assert_eq!(dets.len(), 2);
    assert_eq!(dets[0].bbox, BoxRect::new(10, 10, 100, 100));
    assert_eq!(dets[1].bbox, BoxRect::new(15, 15, 100, 100));
}

#[test]
fn boxes_scale_to_larger_source_frame() {
    // 输入 640x480, 源图 1280x960: 坐标放大 2 倍
    let mut detector = detector_with(proposals(1, &[(100.0, 100.0, 40.0, 20.0, 0, 0.6)]), "");
    let dets = detector.detect(&Frame::black(1280, 960));
    assert_eq!(dets[0].bbox, BoxRect::new(160, 180, 80, 40));
}

#[test]
fn empty_frame_skips_inference() {
    let engine = FixedEngine::new(proposals(1, &[(1.0, 1.0, 1.0, 1.0, 0, 0.9)]));
    let calls = engine.calls.clone();
    let mut detector = Detector::new(Box::new(engine), detector_config(""));

    assert!(detector.detect(&Frame::default()).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unexpected_output_shape_yields_nothing() {
    let mut detector = detector_with(ArrayD::<f32>::zeros(IxDyn(&[3, 7, 2])), "");
    assert!(detector.detect(&Frame::black(640, 480)).is_empty());

    let mut detector = detector_with(ArrayD::<f32>::zeros(IxDyn(&[1, 4, 10])), "");
    assert!(detector.detect(&Frame::black(640, 480)).is_empty());
}

#[test]
fn draw_marks_the_frame() {
    let mut detector = detector_with(proposals(1, &[(320.0, 240.0, 100.0, 50.0, 0, 0.9)]), "");
    let mut frame = Frame::black(640, 480);
    let dets = detector.detect(&frame);
    detector.draw(&mut frame, &dets);
    assert_eq!(frame.pixel(270, 240), Some([0, 255, 0]));
    assert_eq!(frame.pixel(320, 240), Some([0, 0, 0]));
}
