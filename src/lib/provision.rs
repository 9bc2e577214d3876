//! The per-request sequence: disks, connect, generate, define, start.

use crate::disk::{data_disk_path, root_disk_path, DiskImager, DATA_DEV, ROOT_DEV};
use crate::domain_xml::{DescriptorContext, DescriptorError, DomainTemplate};
use crate::libvirt::{DefinedDomain, Hypervisor, HypervisorConnection};
use crate::structs::{DiskDevice, ProvisioningRequest};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

lazy_static! {
    pub static ref VM_NAME_REGEX: Regex = Regex::new("^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").unwrap();
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to create root disk: {0:#}")]
    RootDisk(anyhow::Error),

    #[error("Failed to create additional data disk: {0:#}")]
    DataDisk(anyhow::Error),

    #[error("Failed to connect libvirt: {0:#}")]
    Connect(anyhow::Error),

    #[error("Failed to generate domain XML: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("DomainDefineXML failed: {0:#}")]
    Define(anyhow::Error),

    #[error("Failed to start domain: {0:#}")]
    Start(anyhow::Error),

    #[error("Provisioning task aborted: {0}")]
    Task(String),
}

impl ProvisionError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProvisionError::Validation(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootDisk {
    Prebuilt(PathBuf),
    Create { size_gb: u64 },
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    pub name: String,
    pub memory_mb: u64,
    pub cpus: u32,
    pub root: RootDisk,
    pub data_disk_gb: Option<u64>,
    pub iso_image: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.is_empty()).map(String::from)
}

fn positive(field: &str, value: i64) -> Result<u64, ProvisionError> {
    if value <= 0 {
        return Err(ProvisionError::Validation(format!(
            "{field} must be > 0, got {value}"
        )));
    }
    Ok(value as u64)
}

impl TryFrom<&ProvisioningRequest> for VmSpec {
    type Error = ProvisionError;

    fn try_from(req: &ProvisioningRequest) -> Result<Self, Self::Error> {
        if req.name.is_empty() {
            return Err(ProvisionError::Validation(String::from("name is required")));
        }
        if !VM_NAME_REGEX.is_match(&req.name) {
            return Err(ProvisionError::Validation(format!(
                "name {:?} must match {}",
                req.name,
                VM_NAME_REGEX.as_str()
            )));
        }
        let memory_mb = positive("memory_mb", req.memory_mb)?;
        let cpus = positive("cpus", req.cpus)?;
        let cpus = u32::try_from(cpus)
            .map_err(|_| ProvisionError::Validation(format!("cpus {cpus} is out of range")))?;

        let root = match non_empty(&req.prebuilt_disk_path) {
            Some(path) => {
                match req.disk_size_gb {
                    Some(size) if size > 0 => {
                        return Err(ProvisionError::Validation(format!(
                            "disk_size_gb={size} only sizes a new root disk; \
                             use data_disk_size_gb for an extra disk next to prebuilt_disk_path"
                        )))
                    }
                    Some(size) => debug!("Ignoring disk_size_gb={size}: root disk is prebuilt"),
                    None => {}
                }
                RootDisk::Prebuilt(PathBuf::from(path))
            }
            None => match req.disk_size_gb {
                Some(size) => RootDisk::Create {
                    size_gb: positive("disk_size_gb", size)?,
                },
                None => {
                    return Err(ProvisionError::Validation(String::from(
                        "disk_size_gb is required when prebuilt_disk_path is not given",
                    )))
                }
            },
        };
        let data_disk_gb = req
            .data_disk_size_gb
            .map(|size| positive("data_disk_size_gb", size))
            .transpose()?;

        Ok(VmSpec {
            name: req.name.clone(),
            memory_mb,
            cpus,
            root,
            data_disk_gb,
            iso_image: non_empty(&req.iso_image),
        })
    }
}

pub struct Provisioner<H, D> {
    hypervisor: H,
    imager: D,
    template: DomainTemplate,
    image_dir: PathBuf,
    network: String,
}

impl<H: Hypervisor, D: DiskImager> Provisioner<H, D> {
    pub fn new(
        hypervisor: H,
        imager: D,
        template: DomainTemplate,
        image_dir: PathBuf,
        network: &str,
    ) -> Self {
        Provisioner {
            hypervisor,
            imager,
            template,
            image_dir,
            network: network.to_string(),
        }
    }

    /// Validates, creates the disks and defines and starts the domain.
    /// Returns the name of the started domain.
    pub fn provision(&self, req: &ProvisioningRequest) -> Result<String, ProvisionError> {
        let spec = VmSpec::try_from(req)?;

        let disks = self.resolve_disks(&spec)?;

        let conn = self
            .hypervisor
            .connect()
            .map_err(ProvisionError::Connect)?;

        let ctx = DescriptorContext::new(
            &spec.name,
            spec.memory_mb,
            spec.cpus,
            disks,
            spec.iso_image.clone(),
            &self.network,
        );
        let xml = self.template.render(&ctx)?;
        debug!("Domain XML:\n{xml}");

        let dom = conn.define_domain(&xml).map_err(ProvisionError::Define)?;

        if let Err(e) = dom.start() {
            if let Err(undefine_err) = dom.undefine() {
                warn!("Cleanup of {} after failed start also failed: {undefine_err}", dom.name());
            }
            return Err(ProvisionError::Start(e));
        }
        info!("Domain {} ({}) created and started", spec.name, ctx.uuid);
        Ok(dom.name())
    }

    /// Builds the ordered device list, creating image files as needed. The
    /// root device always comes first.
    pub fn resolve_disks(&self, spec: &VmSpec) -> Result<Vec<DiskDevice>, ProvisionError> {
        let mut disks = Vec::with_capacity(2);

        let root_path = match &spec.root {
            RootDisk::Prebuilt(path) => {
                info!("User provided an existing disk for root: {}", path.display());
                path.clone()
            }
            RootDisk::Create { size_gb } => {
                let path = root_disk_path(&self.image_dir, &spec.name);
                self.imager
                    .create_disk(&path, *size_gb)
                    .map_err(ProvisionError::RootDisk)?;
                path
            }
        };
        disks.push(DiskDevice::new(ROOT_DEV, root_path.display().to_string()));

        if let Some(size_gb) = spec.data_disk_gb {
            let path = data_disk_path(&self.image_dir, &spec.name);
            self.imager
                .create_disk(&path, size_gb)
                .map_err(ProvisionError::DataDisk)?;
            disks.push(DiskDevice::new(DATA_DEV, path.display().to_string()));
        }

        Ok(disks)
    }
}
