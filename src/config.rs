//! 配置: 命令行参数 + JSON 配置文件
//!
//! - `Args`: 命令行 (clap)
//! - `ConfigDocument`: JSON 文档, 按 "a.b.c" 点路径取值, 缺失或类型不符时用默认值
//! - `Settings`: 启动时一次性构建的强类型配置, 传给各模块

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::detection::DetectorConfig;
use crate::input::camera::{default_device, CameraConfig};
use crate::ort_backend::{OrtConfig, OrtEP};
use crate::pipeline::PipelineConfig;
use crate::server::ServerConfig;

pub const DEFAULT_CONFIG_PATH: &str = "shared/config.json";

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "YOLO 边缘实时检测服务 (摄像头 → 检测 → MJPEG/JSON)", long_about = None)]
pub struct Args {
    /// 启用 GPU 加速 (可用时)
    #[arg(short = 'v', long)]
    pub vulkan: bool,

    /// 输出各模块详细日志
    #[arg(long)]
    pub verbose: bool,

    /// 关闭检测, 只推摄像头画面
    #[arg(long = "no-ml")]
    pub no_ml: bool,

    /// 用视频文件代替摄像头 (循环播放)
    #[arg(short = 'f', long = "file")]
    pub file: Option<String>,

    /// 配置文件路径
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

/// JSON 配置文档
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text).context("config is not valid JSON")?;
        if !root.is_object() {
            bail!("config root must be a JSON object");
        }
        Ok(Self { root })
    }

    /// 按点路径查找原始值
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.root, |node, part| node.as_object()?.get(part))
    }

    /// 取值, 缺失或类型不符时返回默认值
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.lookup(key)
            .and_then(|v| <T as serde::Deserialize>::deserialize(v).ok())
            .unwrap_or(default)
    }

    /// 取数组, 缺失或类型不符时返回空数组
    pub fn get_array<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.get(key, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    /// `[network]` 或 `[network, weights]`
    pub model_paths: Vec<String>,
    pub labels_path: String,
    /// (W_in, H_in)
    pub input_size: Option<(u32, u32)>,
    pub conf_threshold: f32,
    /// 保留字段, 未参与计算
    pub nms_threshold: f32,
    pub iou_threshold: f32,
    pub jpeg_quality: u8,
    pub input_name: String,
    pub output_name: String,
    pub font_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub path: String,
    pub metrics_interval: Duration,
}

/// 启动配置
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_host: String,
    pub server_port: u16,
    pub camera: CameraConfig,
    pub detection: DetectionSettings,
    pub logging: LoggingSettings,
    pub use_accelerator: bool,
    pub ml_enabled: bool,
    pub video_file: Option<String>,
    pub verbose: bool,
}

impl Settings {
    pub fn from_document(doc: &ConfigDocument, args: &Args) -> Self {
        let input_size = match doc.get_array::<u32>("detection.inputSize").as_slice() {
            [w, h, ..] if *w > 0 && *h > 0 => Some((*w, *h)),
            _ => None,
        };
        let jpeg_quality = doc.get::<i64>("detection.jpegQuality", 80).clamp(1, 100) as u8;

        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: doc.get("cppServerPort", 5100u16),
            camera: CameraConfig {
                device: doc.get("camera.device", default_device().to_string()),
                width: doc.get("camera.width", 640),
                height: doc.get("camera.height", 480),
                fps: doc.get("camera.fps", 30),
                buffer_size: doc.get("camera.bufferSize", 1),
                read_timeout: Duration::from_millis(doc.get("camera.readTimeoutMs", 2000)),
            },
            detection: DetectionSettings {
                model_paths: doc.get_array("detection.modelPath"),
                labels_path: doc.get(
                    "detection.labelsPath",
                    "backend/model/labels.txt".to_string(),
                ),
                input_size,
                conf_threshold: doc.get("detection.confidenceThreshold", 0.5),
                nms_threshold: doc.get("detection.nmsThreshold", 0.5),
                iou_threshold: doc.get("detection.iouThreshold", 0.5),
                jpeg_quality,
                input_name: doc.get("detection.inputName", "in0".to_string()),
                output_name: doc.get("detection.outputName", "out0".to_string()),
                font_path: doc.get("detection.fontPath", None),
            },
            logging: LoggingSettings {
                path: doc.get("logging.path", "logs/".to_string()),
                metrics_interval: Duration::from_millis(doc.get("logging.metricsInterval", 1000)),
            },
            use_accelerator: args.vulkan || doc.get("performance.useVulkan", false),
            ml_enabled: !args.no_ml,
            video_file: args.file.clone(),
            verbose: args.verbose,
        }
    }

    /// 读取并解析配置文件
    pub fn load(args: &Args) -> Result<Self> {
        let doc = ConfigDocument::load(&args.config)?;
        Ok(Self::from_document(&doc, args))
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            host: self.server_host.clone(),
            port: self.server_port,
            jpeg_quality: self.detection.jpeg_quality,
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            jpeg_quality: self.detection.jpeg_quality,
            metrics_interval: self.logging.metrics_interval,
        }
    }

    /// 检测器参数; 缺少 inputSize 时报错
    pub fn detector(&self) -> Result<DetectorConfig> {
        let d = &self.detection;
        let Some((input_width, input_height)) = d.input_size else {
            bail!("detection.inputSize must be [width, height]");
        };
        Ok(DetectorConfig {
            input_width,
            input_height,
            conf_threshold: d.conf_threshold,
            nms_threshold: d.nms_threshold,
            iou_threshold: d.iou_threshold,
            labels_path: d.labels_path.clone(),
            font_path: d.font_path.clone(),
        })
    }

    /// ONNX Runtime 参数; modelPath 为空时报错
    pub fn ort(&self) -> Result<OrtConfig> {
        let paths = &self.detection.model_paths;
        if paths.is_empty() || paths.len() > 2 {
            bail!("detection.modelPath must list the network file (and optionally a weights file)");
        }
        Ok(OrtConfig {
            model_paths: paths.clone(),
            ep: if self.use_accelerator {
                OrtEP::CUDA(0)
            } else {
                OrtEP::CPU
            },
            input_name: self.detection.input_name.clone(),
            output_name: self.detection.output_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "cppServerPort": 5200,
        "camera": { "width": 1280, "height": 720, "fps": "fast" },
        "detection": {
            "modelPath": ["model.onnx"],
            "inputSize": [640, 480],
            "confidenceThreshold": 0.35,
            "jpegQuality": 250
        },
        "logging": { "path": "/tmp/perf", "metricsInterval": 500 }
    }"#;

    fn args() -> Args {
        Args {
            config: DEFAULT_CONFIG_PATH.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn dotted_lookup_with_fallback() {
        let doc = ConfigDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.get("camera.width", 0u32), 1280);
        // 类型不符 → 默认值
        assert_eq!(doc.get("camera.fps", 30u32), 30);
        // 中间节点不是对象 → 默认值
        assert_eq!(doc.get("cppServerPort.x", 7u32), 7);
        assert_eq!(doc.get("missing.key", "d".to_string()), "d");
        assert_eq!(doc.get_array::<u32>("detection.inputSize"), vec![640, 480]);
        assert!(doc.get_array::<u32>("detection.nothing").is_empty());
    }

    #[test]
    fn settings_from_document() {
        let doc = ConfigDocument::parse(SAMPLE).unwrap();
        let s = Settings::from_document(&doc, &args());
        assert_eq!(s.server_port, 5200);
        assert_eq!((s.camera.width, s.camera.height, s.camera.fps), (1280, 720, 30));
        assert_eq!(s.camera.buffer_size, 1);
        assert_eq!(s.detection.input_size, Some((640, 480)));
        assert_eq!(s.detection.conf_threshold, 0.35);
        assert_eq!(s.detection.iou_threshold, 0.5);
        assert_eq!(s.detection.jpeg_quality, 100);
        assert_eq!(s.detection.input_name, "in0");
        assert_eq!(s.detection.output_name, "out0");
        assert_eq!(s.detection.labels_path, "backend/model/labels.txt");
        assert_eq!(s.logging.metrics_interval, Duration::from_millis(500));
        assert!(!s.use_accelerator);
        assert!(s.ml_enabled);
    }

    #[test]
    fn defaults_for_empty_document() {
        let s = Settings::from_document(&ConfigDocument::parse("{}").unwrap(), &args());
        assert_eq!(s.server_port, 5100);
        assert_eq!((s.camera.width, s.camera.height), (640, 480));
        assert_eq!(s.camera.read_timeout, Duration::from_millis(2000));
        assert_eq!(s.detection.jpeg_quality, 80);
        assert_eq!(s.logging.path, "logs/");
        assert!(s.detector().is_err());
        assert!(s.ort().is_err());
    }

    #[test]
    fn cli_flags_override() {
        let args = Args::try_parse_from(["edge-server", "-v", "--no-ml", "-f", "clip.mp4", "--verbose"]).unwrap();
        assert_eq!(args.config, DEFAULT_CONFIG_PATH);
        let s = Settings::from_document(&ConfigDocument::parse("{}").unwrap(), &args);
        assert!(s.use_accelerator);
        assert!(!s.ml_enabled);
        assert!(s.verbose);
        assert_eq!(s.video_file.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn accelerator_selects_cuda() {
        let doc = ConfigDocument::parse(
            r#"{"performance":{"useVulkan":true},"detection":{"modelPath":["a.onnx","a.bin"]}}"#,
        )
        .unwrap();
        let ort = Settings::from_document(&doc, &args()).ort().unwrap();
        assert_eq!(ort.ep, OrtEP::CUDA(0));
        assert_eq!(ort.model_paths.len(), 2);
    }

    #[test]
    fn load_errors() {
        assert!(ConfigDocument::load("/nonexistent/config.json").is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(ConfigDocument::load(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2]").unwrap();
        assert!(ConfigDocument::load(file.path()).is_err());
    }
}
