use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const ROOT_DEV: &str = "vda";
pub const DATA_DEV: &str = "vdb";

/// Materializes a disk image file of a given size.
pub trait DiskImager: Send + Sync {
    fn create_disk(&self, path: &Path, size_gb: u64) -> Result<()>;
}

pub fn root_disk_path(image_dir: &Path, name: &str) -> PathBuf {
    image_dir.join(format!("{name}.qcow2"))
}

pub fn data_disk_path(image_dir: &Path, name: &str) -> PathBuf {
    image_dir.join(format!("{name}-data.qcow2"))
}

/// Shells out to `qemu-img create -f qcow2`.
pub struct QemuImg {
    binary: String,
}

impl QemuImg {
    pub fn new(binary: &str) -> Self {
        QemuImg {
            binary: binary.to_string(),
        }
    }
}

impl DiskImager for QemuImg {
    fn create_disk(&self, path: &Path, size_gb: u64) -> Result<()> {
        if size_gb == 0 {
            bail!("disk_size_gb must be > 0 to create a new disk");
        }
        let size_arg = format!("{size_gb}G");
        debug!("Running {} create -f qcow2 {} {size_arg}", self.binary, path.display());
        let output = Command::new(&self.binary)
            .args(["create", "-f", "qcow2"])
            .arg(path)
            .arg(&size_arg)
            .output()
            .with_context(|| format!("unable to run {}", self.binary))?;
        if !output.status.success() {
            bail!(
                "qemu-img create failed: {}, output: {}{}",
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        info!("Created disk {} ({size_arg})", path.display());
        Ok(())
    }
}
