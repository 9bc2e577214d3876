use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_LIBVIRT_URI: &str = "qemu:///system";
pub const DEFAULT_IMAGE_DIR: &str = "/var/lib/libvirt/images";
pub const DEFAULT_QEMU_IMG: &str = "qemu-img";
pub const DEFAULT_NETWORK: &str = "default";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const CONFIG_ENV_PREFIX: &str = "PADMINI_VM_SERVICE";

/// Incoming JSON describing the VM to create.
///
/// Required fields default to empty/zero so that a missing field surfaces as
/// a validation message rather than a bare deserialization error.
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct ProvisioningRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub memory_mb: i64,
    #[serde(default)]
    pub cpus: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prebuilt_disk_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_image: Option<String>,
    /// Size of the root disk. Only used when no prebuilt disk is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i64>,
    /// Size of an extra data disk attached as the secondary device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_disk_size_gb: Option<i64>,
}

/// A disk in the final domain XML: target slot (`vda`, `vdb`) and host path.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DiskDevice {
    pub dev: String,
    pub path: String,
}

impl DiskDevice {
    pub fn new(dev: &str, path: impl Into<String>) -> Self {
        DiskDevice {
            dev: dev.to_string(),
            path: path.into(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResponseData {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseData {
    pub fn success(msg: impl Into<String>) -> Self {
        ResponseData {
            status: String::from("success"),
            message: Some(msg.into()),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        ResponseData {
            status: String::from("error"),
            message: Some(msg.into()),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub listen_addr: String,
    pub libvirt_uri: String,
    pub image_dir: PathBuf,
    pub qemu_img: String,
    pub network: String,
    pub template_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            libvirt_uri: DEFAULT_LIBVIRT_URI.to_string(),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            qemu_img: DEFAULT_QEMU_IMG.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            template_path: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Reads `CONFIG_FILE_PATH` (default `./config.toml`, optional) and then
    /// `PADMINI_VM_SERVICE_*` environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let cfg_file = match std::env::var("CONFIG_FILE_PATH") {
            Ok(s) => s,
            Err(_e) => "./config.toml".to_string(),
        };
        config::Config::builder()
            .add_source(config::File::with_name(&cfg_file).required(false))
            .add_source(config::Environment::with_prefix(CONFIG_ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<AppConfig>()?
            .validated()
    }

    /// Settings every request depends on must not be blank.
    pub fn validated(self) -> Result<Self, config::ConfigError> {
        let required = [
            ("listen_addr", self.listen_addr.as_str()),
            ("libvirt_uri", self.libvirt_uri.as_str()),
            ("qemu_img", self.qemu_img.as_str()),
            ("network", self.network.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(config::ConfigError::Message(format!("{key} must not be empty")));
            }
        }
        if self.image_dir.as_os_str().is_empty() {
            return Err(config::ConfigError::Message(String::from(
                "image_dir must not be empty",
            )));
        }
        Ok(self)
    }
}
