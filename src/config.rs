use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::evidence::{EvidenceSettings, DEFAULT_EVIDENCE_DIR, DEFAULT_LOG_PATH};
use crate::fusion::TaxonomyPolicy;
use crate::ingest::SourceSettings;
use crate::policy::{PolicyMode, DEFAULT_CRITICAL_THRESHOLD};

const DEFAULT_SOURCE_URI: &str = "/dev/video0";
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.25;
const DEFAULT_MODEL_IOU: f32 = 0.45;

#[derive(Debug, Deserialize, Default)]
struct FirewatchConfigFile {
    source: Option<SourceConfigFile>,
    models: Option<ModelsConfigFile>,
    taxonomy: Option<TaxonomyConfigFile>,
    policy: Option<PolicyConfigFile>,
    evidence: Option<EvidenceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelsConfigFile {
    primary: Option<ModelConfigFile>,
    thermal: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    classes: Option<Vec<String>>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TaxonomyConfigFile {
    primary: Option<TaxonomyPolicy>,
    thermal: Option<TaxonomyPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct PolicyConfigFile {
    mode: Option<String>,
    critical_threshold: Option<u8>,
    cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct EvidenceConfigFile {
    dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
}

/// One model file and how to run it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub path: PathBuf,
    /// Class names by index; required for ONNX models.
    pub classes: Vec<String>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            classes: Vec::new(),
            input_size: DEFAULT_MODEL_INPUT_SIZE,
            confidence_threshold: DEFAULT_MODEL_CONFIDENCE,
            iou_threshold: DEFAULT_MODEL_IOU,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyModeKind {
    SingleShot,
    Continuous,
}

impl FromStr for PolicyModeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_shot" | "single" => Ok(PolicyModeKind::SingleShot),
            "continuous" => Ok(PolicyModeKind::Continuous),
            other => Err(format!(
                "unknown policy mode {:?} (expected single_shot or continuous)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicySettings {
    pub mode: PolicyModeKind,
    pub critical_threshold: u8,
    pub cooldown: Option<Duration>,
}

impl PolicySettings {
    pub fn policy_mode(&self) -> PolicyMode {
        match self.mode {
            PolicyModeKind::SingleShot => PolicyMode::SingleShot,
            PolicyModeKind::Continuous => PolicyMode::Continuous {
                critical_threshold: self.critical_threshold,
                cooldown: self.cooldown,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FirewatchConfig {
    pub source: SourceSettings,
    pub primary_model: Option<ModelSettings>,
    pub thermal_model: Option<ModelSettings>,
    pub primary_taxonomy: TaxonomyPolicy,
    pub thermal_taxonomy: TaxonomyPolicy,
    pub policy: PolicySettings,
    pub evidence: EvidenceSettings,
}

impl Default for FirewatchConfig {
    fn default() -> Self {
        // An empty file struct yields the built-in defaults.
        Self::from_file(FirewatchConfigFile::default())
    }
}

impl FirewatchConfig {
    /// Load from `FIREWATCH_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FIREWATCH_CONFIG").ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref())
    }

    /// Load from an explicit file (if any), apply env overrides, validate.
    pub fn load_with(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => read_config_file(path)?,
            None => FirewatchConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FirewatchConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let source = SourceSettings {
            uri: source
                .uri
                .unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
            width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            max_frames: source.max_frames,
        };

        let models = file.models.unwrap_or_default();
        let taxonomy = file.taxonomy.unwrap_or_default();

        let policy = file.policy.unwrap_or_default();
        let policy = PolicySettings {
            mode: PolicyModeKind::Continuous,
            critical_threshold: policy
                .critical_threshold
                .unwrap_or(DEFAULT_CRITICAL_THRESHOLD),
            cooldown: policy.cooldown_secs.map(Duration::from_secs),
        }
        .with_mode(policy.mode);

        let evidence = file.evidence.unwrap_or_default();
        let evidence = EvidenceSettings {
            dir: evidence
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EVIDENCE_DIR)),
            log_path: evidence
                .log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
        };

        Self {
            source,
            primary_model: models.primary.and_then(model_settings),
            thermal_model: models.thermal.and_then(model_settings),
            primary_taxonomy: taxonomy
                .primary
                .unwrap_or_else(TaxonomyPolicy::default_primary),
            thermal_taxonomy: taxonomy
                .thermal
                .unwrap_or_else(TaxonomyPolicy::default_thermal),
            policy,
            evidence,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(uri) = non_empty_env("FIREWATCH_SOURCE") {
            self.source.uri = uri;
        }
        if let Some(path) = non_empty_env("FIREWATCH_PRIMARY_MODEL") {
            self.primary_model
                .get_or_insert_with(ModelSettings::default)
                .path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("FIREWATCH_THERMAL_MODEL") {
            self.thermal_model
                .get_or_insert_with(ModelSettings::default)
                .path = PathBuf::from(path);
        }
        if let Some(mode) = non_empty_env("FIREWATCH_POLICY_MODE") {
            self.policy.mode = mode
                .parse()
                .map_err(|e| anyhow!("FIREWATCH_POLICY_MODE: {}", e))?;
        }
        if let Some(threshold) = non_empty_env("FIREWATCH_CRITICAL_THRESHOLD") {
            self.policy.critical_threshold = threshold.parse().map_err(|_| {
                anyhow!("FIREWATCH_CRITICAL_THRESHOLD must be an integer percentage (0-100)")
            })?;
        }
        if let Some(cooldown) = non_empty_env("FIREWATCH_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("FIREWATCH_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.policy.cooldown = (seconds > 0).then(|| Duration::from_secs(seconds));
        }
        if let Some(dir) = non_empty_env("FIREWATCH_EVIDENCE_DIR") {
            self.evidence.dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty_env("FIREWATCH_LOG_PATH") {
            self.evidence.log_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Check ranges and that both taxonomies compile.
    pub fn validate(&self) -> Result<()> {
        if self.source.uri.trim().is_empty() {
            return Err(anyhow!("source uri must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.policy.critical_threshold > 100 {
            return Err(anyhow!(
                "critical_threshold must be within 0-100, got {}",
                self.policy.critical_threshold
            ));
        }
        if self.policy.mode == PolicyModeKind::SingleShot && self.policy.cooldown.is_some() {
            log::warn!("cooldown has no effect in single_shot mode");
        }
        for (role, model) in [
            ("primary", self.primary_model.as_ref()),
            ("thermal", self.thermal_model.as_ref()),
        ] {
            let Some(model) = model else { continue };
            if model.input_size == 0 {
                return Err(anyhow!("{} model input_size must be greater than zero", role));
            }
            for (name, value) in [
                ("confidence_threshold", model.confidence_threshold),
                ("iou_threshold", model.iou_threshold),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(anyhow!("{} model {} must be within [0, 1]", role, name));
                }
            }
        }
        self.primary_taxonomy
            .compile()
            .map_err(|e| anyhow!("primary taxonomy: {}", e))?;
        self.thermal_taxonomy
            .compile()
            .map_err(|e| anyhow!("thermal taxonomy: {}", e))?;
        Ok(())
    }
}

impl PolicySettings {
    fn with_mode(mut self, mode: Option<String>) -> Self {
        // Unparseable modes from the file are reported by `validate_mode`.
        self.mode = mode
            .as_deref()
            .and_then(|m| m.parse().ok())
            .unwrap_or(self.mode);
        self
    }
}

fn model_settings(file: ModelConfigFile) -> Option<ModelSettings> {
    let path = file.path.filter(|p| !p.as_os_str().is_empty())?;
    Some(ModelSettings {
        path,
        classes: file.classes.unwrap_or_default(),
        input_size: file.input_size.unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
        confidence_threshold: file
            .confidence_threshold
            .unwrap_or(DEFAULT_MODEL_CONFIDENCE),
        iou_threshold: file.iou_threshold.unwrap_or(DEFAULT_MODEL_IOU),
    })
}

fn read_config_file(path: &Path) -> Result<FirewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: FirewatchConfigFile = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    validate_mode(&cfg)?;
    Ok(cfg)
}

fn validate_mode(cfg: &FirewatchConfigFile) -> Result<()> {
    if let Some(mode) = cfg.policy.as_ref().and_then(|p| p.mode.as_deref()) {
        mode.parse::<PolicyModeKind>()
            .map_err(|e| anyhow!("policy.mode: {}", e))?;
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_continuous_at_eighty() {
        let cfg = FirewatchConfig::default();
        assert_eq!(cfg.policy.mode, PolicyModeKind::Continuous);
        assert_eq!(cfg.policy.critical_threshold, 80);
        assert_eq!(cfg.policy.cooldown, None);
        assert!(cfg.primary_model.is_none());
        assert!(cfg.thermal_model.is_none());
        assert_eq!(cfg.evidence.dir, PathBuf::from("captures"));
        assert_eq!(cfg.evidence.log_path, PathBuf::from("cap.txt"));
        assert_eq!(cfg.primary_taxonomy, TaxonomyPolicy::default_primary());
    }

    #[test]
    fn policy_mode_parsing() {
        assert_eq!("single-shot".parse::<PolicyModeKind>(), Ok(PolicyModeKind::SingleShot));
        assert_eq!("Continuous".parse::<PolicyModeKind>(), Ok(PolicyModeKind::Continuous));
        assert!("forever".parse::<PolicyModeKind>().is_err());
    }

    #[test]
    fn policy_settings_map_to_mode() {
        let settings = PolicySettings {
            mode: PolicyModeKind::Continuous,
            critical_threshold: 70,
            cooldown: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            settings.policy_mode(),
            PolicyMode::Continuous {
                critical_threshold: 70,
                cooldown: Some(Duration::from_secs(3)),
            }
        );
        let single = PolicySettings {
            mode: PolicyModeKind::SingleShot,
            ..settings
        };
        assert_eq!(single.policy_mode(), PolicyMode::SingleShot);
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = FirewatchConfig::default();
        cfg.policy.critical_threshold = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_model_path_means_unconfigured() {
        let file = ModelConfigFile {
            path: Some(PathBuf::new()),
            ..ModelConfigFile::default()
        };
        assert!(model_settings(file).is_none());
    }
}
