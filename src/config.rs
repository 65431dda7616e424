use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(width: u32, height: u32) -> Self { Self { width, height } }

    pub fn contains(&self, width: u32, height: u32) -> bool {
        width <= self.width && height <= self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Every image goes through the fit-to-box pass.
    Always,
    /// Only images exceeding the box are resized.
    WhenLarger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Thumbnails,
    Optimize,
}

impl BatchKind {
    pub fn dest_suffix(&self) -> &'static str {
        match self {
            Self::Thumbnails => "_thumbnails",
            Self::Optimize => "_optimized",
        }
    }

    pub fn resize_policy(&self) -> ResizePolicy {
        match self {
            Self::Thumbnails => ResizePolicy::Always,
            Self::Optimize => ResizePolicy::WhenLarger,
        }
    }

    /// Word used in the "Total ... size" summary line.
    pub fn output_label(&self) -> &'static str {
        match self {
            Self::Thumbnails => "thumbnail",
            Self::Optimize => "optimized",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Thumbnails => "Thumbnail Generator for Scrolling Galleries",
            Self::Optimize => "Otterful Website Image Optimizer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderJob {
    pub source: PathBuf,
    #[serde(default)]
    pub dest: Option<PathBuf>,
    pub max_size: BoundingBox,
    pub quality: u8,
}

impl FolderJob {
    pub fn new(source: impl Into<PathBuf>, max_size: BoundingBox, quality: u8) -> Self {
        Self { source: source.into(), dest: None, max_size, quality }
    }

    pub fn with_dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// Explicit destination, or the sibling `<source><suffix>` directory.
    pub fn dest_dir(&self, kind: BatchKind) -> PathBuf {
        match &self.dest {
            Some(d) => d.clone(),
            None => {
                let mut name = self.source.clone().into_os_string();
                name.push(kind.dest_suffix());
                PathBuf::from(name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCfg {
    pub kind: BatchKind,
    pub folders: Vec<FolderJob>,
}

impl BatchCfg {
    pub fn thumbnails() -> Self {
        let max = BoundingBox::new(500, 375);
        Self {
            kind: BatchKind::Thumbnails,
            folders: vec![
                FolderJob::new("Otherside Otter Photos", max, 75),
                FolderJob::new("Nifty Photos", max, 75),
            ],
        }
    }

    pub fn optimizer() -> Self {
        let max = BoundingBox::new(1920, 1920);
        Self {
            kind: BatchKind::Optimize,
            folders: vec![
                FolderJob::new("images_compressed", max, 75).with_dest("images_compressed_optimized"),
                FolderJob::new("Otherside Otter Photos", max, 70).with_dest("Otherside Otter Photos_optimized"),
                FolderJob::new("Nifty Photos", max, 70).with_dest("Nifty Photos_optimized"),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for job in &self.folders {
            if job.source.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("folder source must not be empty".into()));
            }
            if job.quality > 100 {
                return Err(ConfigError::Invalid(format!(
                    "quality for {} must be between 0 and 100, got {}",
                    job.source.display(), job.quality
                )));
            }
            if job.max_size.width == 0 || job.max_size.height == 0 {
                return Err(ConfigError::Invalid(format!(
                    "bounding box for {} must be non-zero", job.source.display()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsProxyCfg {
    pub upstream: String,
    pub collection: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for StatsProxyCfg {
    fn default() -> Self {
        Self {
            upstream: "https://api.opensea.io".into(),
            collection: "otterful-otters".into(),
            user_agent: "Mozilla/5.0".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCfg {
    pub bind: String,
    pub port: u16,
    pub root: PathBuf,
    pub stats_route: String,
    pub stats: StatsProxyCfg,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
            root: PathBuf::from("."),
            stats_route: "/api/opensea-stats".into(),
            stats: StatsProxyCfg::default(),
        }
    }
}

impl ServerCfg {
    pub fn addr(&self) -> String { format!("{}:{}", self.bind, self.port) }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("server port must be non-zero".into()));
        }
        if !self.stats_route.starts_with('/') {
            return Err(ConfigError::Invalid(format!("stats route must start with '/': {}", self.stats_route)));
        }
        if self.stats.timeout_secs == 0 {
            return Err(ConfigError::Invalid("stats timeout must be at least one second".into()));
        }
        if self.stats.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("stats collection slug must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryCfg {
    #[serde(default = "BatchCfg::thumbnails")]
    pub thumbnails: BatchCfg,
    #[serde(default = "BatchCfg::optimizer")]
    pub optimizer: BatchCfg,
    #[serde(default)]
    pub server: ServerCfg,
}

impl Default for GalleryCfg {
    fn default() -> Self {
        Self {
            thumbnails: BatchCfg::thumbnails(),
            optimizer: BatchCfg::optimizer(),
            server: ServerCfg::default(),
        }
    }
}

impl GalleryCfg {
    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        let cfg: GalleryCfg = serde_yaml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let txt = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_yaml(&txt)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thumbnails.validate()?;
        self.optimizer.validate()?;
        self.server.validate()
    }
}
