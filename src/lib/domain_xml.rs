//! Libvirt domain XML generation.
//!
//! The template is parsed once when the service starts. Rendering is a pure
//! function of [`DescriptorContext`]; everything random (UUID, MAC) is
//! decided when the context is built, never while rendering.

use crate::structs::DiskDevice;
use crate::vm_xml::VM_XML;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const TEMPLATE_NAME: &str = "domain.xml";
/// QEMU's locally administered OUI.
pub const MAC_PREFIX: &str = "52:54:00";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("unable to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template failed to parse: {0}")]
    Parse(#[source] minijinja::Error),

    #[error("descriptor field `{0}` is missing")]
    MissingField(&'static str),

    #[error("template render failed: {0}")]
    Render(#[source] minijinja::Error),
}

/// Every value the domain template can reference.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DescriptorContext {
    pub name: String,
    pub uuid: String,
    pub memory_kib: u64,
    pub vcpus: u32,
    pub mac_address: String,
    pub network: String,
    pub disks: Vec<DiskDevice>,
    pub iso_image: Option<String>,
}

impl DescriptorContext {
    /// Builds a context with a fresh UUID and MAC address.
    pub fn new(
        name: &str,
        memory_mb: u64,
        vcpus: u32,
        disks: Vec<DiskDevice>,
        iso_image: Option<String>,
        network: &str,
    ) -> Self {
        DescriptorContext {
            name: name.to_string(),
            uuid: Uuid::new_v4().to_string(),
            memory_kib: memory_mb.saturating_mul(1024),
            vcpus,
            mac_address: generate_mac_address(),
            network: network.to_string(),
            disks,
            iso_image,
        }
    }

    fn check(&self) -> Result<(), DescriptorError> {
        if self.name.is_empty() {
            return Err(DescriptorError::MissingField("name"));
        }
        if self.uuid.is_empty() {
            return Err(DescriptorError::MissingField("uuid"));
        }
        if self.mac_address.is_empty() {
            return Err(DescriptorError::MissingField("mac_address"));
        }
        if self.network.is_empty() {
            return Err(DescriptorError::MissingField("network"));
        }
        if self.disks.is_empty() {
            return Err(DescriptorError::MissingField("disks"));
        }
        Ok(())
    }
}

pub struct DomainTemplate {
    env: Environment<'static>,
}

impl DomainTemplate {
    /// The template compiled into the binary.
    pub fn builtin() -> Result<Self, DescriptorError> {
        Self::parse(VM_XML)
    }

    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let source = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded domain template from {}", path.display());
        Self::parse(source)
    }

    pub fn parse(source: impl Into<String>) -> Result<Self, DescriptorError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("xml_escape", xml_escape);
        env.add_template_owned(TEMPLATE_NAME, source.into())
            .map_err(DescriptorError::Parse)?;
        Ok(DomainTemplate { env })
    }

    pub fn render(&self, ctx: &DescriptorContext) -> Result<String, DescriptorError> {
        ctx.check()?;
        let tmpl = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(DescriptorError::Render)?;
        tmpl.render(ctx).map_err(DescriptorError::Render)
    }
}

pub fn generate_mac_address() -> String {
    format!(
        "{MAC_PREFIX}:{:02x}:{:02x}:{:02x}",
        rand::random::<u8>(),
        rand::random::<u8>(),
        rand::random::<u8>()
    )
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
