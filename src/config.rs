use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use serde::Serialize;
use tch::Device;

pub const DEFAULT_MODEL_PATH: &str = "model/vgg16_fruit_model_2cls.safetensors";
pub const DEFAULT_BACKBONE_PATH: &str = "model/vgg16.safetensors";
pub const DEFAULT_CLASSES_PATH: &str = "model/classes.json";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_path: PathBuf,
    pub backbone_path: PathBuf,
    pub classes_path: PathBuf,
    pub model_version: String,
    pub threshold_pct: f64,
    pub top_k: usize,
    pub max_upload_bytes: usize,
    pub device: Device,
}

/// Architecture and version reported alongside every prediction.
#[derive(Debug, Clone, Serialize)]
pub struct ModelMeta {
    pub arch: String,
    pub version: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path_or = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        let listen_addr = lookup("SERVER_ADDR")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.listen_addr);
        let threshold_pct = lookup("DEFAULT_THRESHOLD")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(defaults.threshold_pct);
        let top_k = lookup("TOPK")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.top_k);
        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.max_upload_bytes);
        let device = lookup("DEVICE")
            .map(|raw| parse_device(&raw))
            .unwrap_or(defaults.device);

        Self {
            listen_addr,
            model_path: path_or("MODEL_PATH", defaults.model_path),
            backbone_path: path_or("BACKBONE_WEIGHTS", defaults.backbone_path),
            classes_path: path_or("CLASSES_JSON", defaults.classes_path),
            model_version: lookup("MODEL_VERSION").unwrap_or(defaults.model_version),
            threshold_pct,
            top_k,
            max_upload_bytes,
            device,
        }
    }

    pub fn model_meta(&self) -> ModelMeta {
        ModelMeta {
            arch: "vgg16".to_string(),
            version: self.model_version.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            backbone_path: PathBuf::from(DEFAULT_BACKBONE_PATH),
            classes_path: PathBuf::from(DEFAULT_CLASSES_PATH),
            model_version: "v1.0.0".to_string(),
            threshold_pct: 70.0,
            top_k: 3,
            max_upload_bytes: 10 * 1024 * 1024,
            device: Device::Cpu,
        }
    }
}

pub fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        Device::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            tracing::warn!(requested = raw, "CUDA not available, falling back to CPU");
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_parse_device_cpu_and_unknown() {
        assert_eq!(parse_device("CPU"), Device::Cpu);
        assert_eq!(parse_device("tpu"), Device::Cpu);
    }

    #[test]
    fn test_parse_device_cuda_without_gpu_falls_back() {
        if !tch::Cuda::is_available() {
            assert_eq!(parse_device("cuda:1"), Device::Cpu);
        }
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("MODEL_PATH", "/srv/model.safetensors"),
            ("CLASSES_JSON", "/srv/classes.json"),
            ("MODEL_VERSION", "v2.1.0"),
            ("DEFAULT_THRESHOLD", "55.5"),
            ("TOPK", "5"),
            ("MAX_UPLOAD_BYTES", "2048"),
            ("DEVICE", "cpu"),
        ]));
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.model_path, PathBuf::from("/srv/model.safetensors"));
        assert_eq!(config.classes_path, PathBuf::from("/srv/classes.json"));
        assert_eq!(config.backbone_path, PathBuf::from(DEFAULT_BACKBONE_PATH));
        assert_eq!(config.model_version, "v2.1.0");
        assert_eq!(config.threshold_pct, 55.5);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.device, Device::Cpu);
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("SERVER_ADDR", "not-an-address"),
            ("DEFAULT_THRESHOLD", "high"),
            ("TOPK", "-1"),
            ("MAX_UPLOAD_BYTES", "10MB"),
        ]));
        let defaults = AppConfig::default();
        assert_eq!(config.listen_addr, defaults.listen_addr);
        assert_eq!(config.threshold_pct, 70.0);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_empty_lookup_matches_default() {
        let config = AppConfig::from_lookup(|_| None);
        let defaults = AppConfig::default();
        assert_eq!(config.model_path, defaults.model_path);
        assert_eq!(config.top_k, defaults.top_k);
        assert_eq!(config.model_version, "v1.0.0");
    }

    #[test]
    fn test_model_meta() {
        let config = AppConfig::default();
        let meta = config.model_meta();
        assert_eq!(meta.arch, "vgg16");
        assert_eq!(meta.version, "v1.0.0");
    }
}
