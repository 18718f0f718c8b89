use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detect::Detection;
use crate::extract::DescriptorBundle;
use crate::shape3d::MeshFeatures;

/// 数据库的持久化后端
///
/// 存储层只依赖这个接口，文件、KV 存储或嵌入式数据库都可以作为后端注入；
/// 每次变更后整体写回（write-through）。
pub trait StoreBackend {
    /// 读出完整数据，后端尚无数据时返回 `None`
    fn load(&self) -> anyhow::Result<Option<Vec<u8>>>;
    /// 原子地写回完整数据
    fn persist(&self, bytes: &[u8]) -> anyhow::Result<()>;
}

/// JSON 文件后端，先写临时文件再原子重命名，避免中途崩溃留下残缺文件
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> anyhow::Result<Option<Vec<u8>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes =
            fs::read(&self.path).with_context(|| format!("无法读取数据库 {:?}", self.path))?;
        Ok(Some(bytes))
    }

    fn persist(&self, bytes: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).with_context(|| format!("无法写入数据库 {:?}", tmp))?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// 一个目标的特征记录，带目标标识与检测记录互相印证
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectFeatures {
    #[serde(default)]
    pub object_uid: Option<Uuid>,
    pub bundle: DescriptorBundle,
}

/// 一张图片的检测与特征记录
///
/// `features[i]` 与 `detections[i]` 对应，同时双方都携带 `uid` 以便校验；
/// 特征槽位为 `None` 表示该目标尚未提取。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub detections: Vec<Detection>,
    pub features: Vec<Option<ObjectFeatures>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self { created: now, updated: now }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GalleryData {
    images: BTreeMap<String, ImageEntry>,
    #[serde(default)]
    metadata: StoreMetadata,
}

/// 2D 特征数据库
///
/// 启动时从后端整体加载，每次变更后同步写回。无内部加锁，
/// 并发写入需由调用方串行化。
pub struct GalleryStore {
    backend: Box<dyn StoreBackend>,
    data: GalleryData,
}

impl GalleryStore {
    pub fn open(backend: Box<dyn StoreBackend>) -> anyhow::Result<Self> {
        let data = match backend.load()? {
            Some(bytes) => serde_json::from_slice(&bytes).context("2D 数据库内容损坏")?,
            None => GalleryData::default(),
        };
        Ok(Self { backend, data })
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.data.metadata.updated = Utc::now();
        let bytes = serde_json::to_vec_pretty(&self.data)?;
        self.backend.persist(&bytes)
    }

    /// 整体替换一张图片的检测结果，条目不存在时创建
    ///
    /// 检测结果替换后旧特征不再对应，一并清空。
    pub fn save_detections(
        &mut self,
        image_id: &str,
        mut detections: Vec<Detection>,
    ) -> anyhow::Result<()> {
        for det in detections.iter_mut() {
            det.ensure_uid();
        }
        let slots = detections.len();
        let entry = self.data.images.entry(image_id.to_string()).or_default();
        entry.detections = detections;
        entry.features = vec![None; slots];
        self.flush()
    }

    /// 写入一个目标的特征，槽位不足时以空槽补齐
    pub fn save_features(
        &mut self,
        image_id: &str,
        object_id: usize,
        bundle: DescriptorBundle,
    ) -> anyhow::Result<()> {
        let entry = self.data.images.entry(image_id.to_string()).or_default();
        if entry.features.len() <= object_id {
            entry.features.resize(object_id + 1, None);
        }
        let object_uid = entry.detections.get(object_id).and_then(|d| d.uid);
        entry.features[object_id] = Some(ObjectFeatures { object_uid, bundle });
        self.flush()
    }

    pub fn get_detections(&self, image_id: &str) -> Option<&[Detection]> {
        self.data.images.get(image_id).map(|e| e.detections.as_slice())
    }

    /// 取一个目标的特征；图片不存在、槽位越界或尚未提取时均为 `None`
    pub fn get_features(&self, image_id: &str, object_id: usize) -> Option<&ObjectFeatures> {
        self.data.images.get(image_id)?.features.get(object_id)?.as_ref()
    }

    pub fn get_entry(&self, image_id: &str) -> Option<&ImageEntry> {
        self.data.images.get(image_id)
    }

    /// 删除一张图片的全部数据，返回是否确有其事
    pub fn delete_image_data(&mut self, image_id: &str) -> anyhow::Result<bool> {
        let existed = self.data.images.remove(image_id).is_some();
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    pub fn images(&self) -> impl Iterator<Item = (&String, &ImageEntry)> {
        self.data.images.iter()
    }

    pub fn image_count(&self) -> usize {
        self.data.images.len()
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.data.metadata
    }
}

/// 3D 模型的存储条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub features: MeshFeatures,
    pub obj_path: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// 3D 特征数据库，键为模型 id 的平铺映射
pub struct ModelStore {
    backend: Box<dyn StoreBackend>,
    models: BTreeMap<String, ModelEntry>,
}

impl ModelStore {
    pub fn open(backend: Box<dyn StoreBackend>) -> anyhow::Result<Self> {
        let models = match backend.load()? {
            Some(bytes) => serde_json::from_slice(&bytes).context("3D 数据库内容损坏")?,
            None => BTreeMap::new(),
        };
        Ok(Self { backend, models })
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.models)?;
        self.backend.persist(&bytes)
    }

    /// 写入或整体替换一个模型的特征
    pub fn save_model(&mut self, model_id: &str, entry: ModelEntry) -> anyhow::Result<()> {
        self.models.insert(model_id.to_string(), entry);
        self.flush()
    }

    pub fn get_model(&self, model_id: &str) -> Option<&ModelEntry> {
        self.models.get(model_id)
    }

    pub fn delete_model(&mut self, model_id: &str) -> anyhow::Result<bool> {
        let existed = self.models.remove(model_id).is_some();
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    pub fn models(&self) -> impl Iterator<Item = (&String, &ModelEntry)> {
        self.models.iter()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// 驻留内存的后端，测试用
    #[derive(Clone, Default)]
    pub(crate) struct MemoryBackend {
        bytes: Arc<Mutex<Option<Vec<u8>>>>,
    }

    impl StoreBackend for MemoryBackend {
        fn load(&self) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(self.bytes.lock().unwrap().clone())
        }

        fn persist(&self, bytes: &[u8]) -> anyhow::Result<()> {
            *self.bytes.lock().unwrap() = Some(bytes.to_vec());
            Ok(())
        }
    }

    fn detection(class: &str) -> Detection {
        Detection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            class_name: class.into(),
            confidence: 0.8,
            class_id: 1,
            uid: None,
        }
    }

    #[test]
    fn test_save_detections_assigns_uids() {
        let mut store = GalleryStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.save_detections("a.jpg", vec![detection("cat"), detection("dog")]).unwrap();

        let detections = store.get_detections("a.jpg").unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections.iter().all(|d| d.uid.is_some()));
        // 特征槽位与检测等长，初始为空
        let entry = store.get_entry("a.jpg").unwrap();
        assert_eq!(entry.features, vec![None, None]);
    }

    #[test]
    fn test_save_features_echoes_uid() {
        let mut store = GalleryStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.save_detections("a.jpg", vec![detection("cat")]).unwrap();
        let uid = store.get_detections("a.jpg").unwrap()[0].uid;

        store.save_features("a.jpg", 0, DescriptorBundle::zeros()).unwrap();
        let features = store.get_features("a.jpg", 0).unwrap();
        assert_eq!(features.object_uid, uid);
    }

    #[test]
    fn test_save_features_grows_slots() {
        let mut store = GalleryStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.save_features("a.jpg", 2, DescriptorBundle::zeros()).unwrap();

        assert!(store.get_features("a.jpg", 0).is_none());
        assert!(store.get_features("a.jpg", 1).is_none());
        assert!(store.get_features("a.jpg", 2).is_some());
        assert!(store.get_features("a.jpg", 3).is_none());
    }

    #[test]
    fn test_redetect_clears_stale_features() {
        let mut store = GalleryStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.save_detections("a.jpg", vec![detection("cat")]).unwrap();
        store.save_features("a.jpg", 0, DescriptorBundle::zeros()).unwrap();

        store.save_detections("a.jpg", vec![detection("dog"), detection("cat")]).unwrap();
        assert!(store.get_features("a.jpg", 0).is_none());
        assert_eq!(store.get_entry("a.jpg").unwrap().features.len(), 2);
    }

    #[test]
    fn test_roundtrip_through_backend() {
        let backend = MemoryBackend::default();
        let mut store = GalleryStore::open(Box::new(backend.clone())).unwrap();
        store.save_detections("a.jpg", vec![detection("cat")]).unwrap();
        store.save_features("a.jpg", 0, DescriptorBundle::zeros()).unwrap();
        let saved = store.get_features("a.jpg", 0).unwrap().clone();

        // 重新打开后读到相同的数据
        let reopened = GalleryStore::open(Box::new(backend)).unwrap();
        assert_eq!(reopened.get_features("a.jpg", 0), Some(&saved));
        assert_eq!(reopened.get_detections("a.jpg"), store.get_detections("a.jpg"));
    }

    #[test]
    fn test_delete_image_data() {
        let mut store = GalleryStore::open(Box::new(MemoryBackend::default())).unwrap();
        store.save_detections("a.jpg", vec![detection("cat")]).unwrap();

        assert!(store.delete_image_data("a.jpg").unwrap());
        assert!(store.get_detections("a.jpg").is_none());
        assert!(!store.delete_image_data("a.jpg").unwrap());
    }

    #[test]
    fn test_json_file_backend_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("gallery.json");
        let backend = JsonFileBackend::new(&path);

        assert!(backend.load().unwrap().is_none());
        backend.persist(b"{}").unwrap();
        assert_eq!(backend.load().unwrap(), Some(b"{}".to_vec()));
        // 临时文件已被重命名
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_model_store_roundtrip() {
        use crate::shape3d::{BoundingBox, GlobalMeshVector, MeshInfo};

        let entry = ModelEntry {
            features: MeshFeatures {
                global: GlobalMeshVector {
                    volume: 1.0,
                    surface_area: 6.0,
                    compactness: 1.9,
                    aspect_ratio_xy: 1.0,
                    aspect_ratio_xz: 1.0,
                    moment_inertia_x: 0.6,
                    moment_inertia_y: 0.6,
                },
                mesh_info: MeshInfo {
                    num_vertices: 8,
                    num_faces: 12,
                    bounding_box: BoundingBox { width: 1.0, height: 1.0, depth: 1.0 },
                },
            },
            obj_path: "cube.obj".into(),
            metadata: BTreeMap::from([("name".to_string(), "cube".to_string())]),
        };

        let backend = MemoryBackend::default();
        let mut store = ModelStore::open(Box::new(backend.clone())).unwrap();
        store.save_model("cube", entry.clone()).unwrap();

        let reopened = ModelStore::open(Box::new(backend)).unwrap();
        assert_eq!(reopened.get_model("cube"), Some(&entry));
        assert_eq!(reopened.model_count(), 1);
    }

    #[test]
    fn test_corrupt_database_is_fatal() {
        let backend = MemoryBackend::default();
        backend.persist(b"not json").unwrap();
        assert!(GalleryStore::open(Box::new(backend.clone())).is_err());
        assert!(ModelStore::open(Box::new(backend)).is_err());
    }
}
