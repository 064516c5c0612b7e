//! 检测分类接口
//!
//! 相机采集与目标检测模型属于外部协作方，这里只定义接口，
//! 以及在原始检测结果上做置信度过滤和类别归并的 `ThresholdClassifier`。

use sortbot_protocol::Detection;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::info;

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.45;

/// 可分拣的类别，其它类别归为 `default`
pub const KNOWN_CLASSES: [&str; 3] = ["apple", "orange", "bottle"];

/// 未知类别的归并标签
pub const DEFAULT_CLASS: &str = "default";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera capture failed: {0}")]
    Capture(String),

    #[error("Detection model error: {0}")]
    Model(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// 已采集图像的句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub path: PathBuf,
}

impl ImageHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class: String,
    pub confidence: f64,
}

impl Classification {
    pub fn new(class: impl Into<String>, confidence: f64) -> Self {
        Self {
            class: class.into(),
            confidence,
        }
    }
}

/// 相机
pub trait Camera: Send + Sync {
    fn capture(&self) -> Result<ImageHandle, VisionError>;
}

/// 分类器：一张图给出至多一个结论
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &ImageHandle) -> Result<Option<Classification>, VisionError>;
}

/// 原始检测模型：一张图给出所有候选
pub trait DetectionModel: Send + Sync {
    fn detect(&self, image: &ImageHandle) -> Result<Vec<Classification>, VisionError>;
}

/// 置信度过滤 + 类别归并
///
/// 丢弃低于阈值的候选，取置信度最高者；不在已知类别中的标签归为 `default`。
pub struct ThresholdClassifier<M> {
    model: M,
    threshold: f64,
}

impl<M: DetectionModel> ThresholdClassifier<M> {
    pub fn new(model: M) -> Self {
        Self::with_threshold(model, DEFAULT_CONFIDENCE_THRESHOLD)
    }

    pub fn with_threshold(model: M, threshold: f64) -> Self {
        Self { model, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl<M: DetectionModel> Classifier for ThresholdClassifier<M> {
    fn classify(&self, image: &ImageHandle) -> Result<Option<Classification>, VisionError> {
        let best = self
            .model
            .detect(image)?
            .into_iter()
            .filter(|c| c.confidence >= self.threshold)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        Ok(best.map(|c| {
            let class = if KNOWN_CLASSES.contains(&c.class.as_str()) {
                c.class
            } else {
                DEFAULT_CLASS.to_string()
            };
            Classification::new(class, c.confidence)
        }))
    }
}

/// 采集 + 分类管线
#[derive(Clone)]
pub struct VisionPipeline {
    camera: Arc<dyn Camera>,
    classifier: Arc<dyn Classifier>,
}

impl VisionPipeline {
    pub fn new(camera: Arc<dyn Camera>, classifier: Arc<dyn Classifier>) -> Self {
        Self { camera, classifier }
    }

    /// 为一次检测补充分类信息
    ///
    /// # 返回
    /// - `Ok(Some(detection))`: 已合并 `class`/`confidence`/`timestamp`/`image_path`
    /// - `Ok(None)`: 图像中没有达到阈值的目标
    pub fn enrich(&self, mut detection: Detection) -> Result<Option<Detection>, VisionError> {
        let image = self.camera.capture()?;
        let Some(result) = self.classifier.classify(&image)? else {
            info!("No detections in {}", image.path.display());
            return Ok(None);
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        detection.class = Some(result.class);
        detection.confidence = Some(result.confidence);
        detection.timestamp = Some(timestamp);
        detection.image_path = Some(image.path.display().to_string());
        Ok(Some(detection))
    }
}
