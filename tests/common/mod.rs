#![allow(dead_code)]

use anyhow::{bail, Result};
use padmini_vm_service::disk::DiskImager;
use padmini_vm_service::domain_xml::DomainTemplate;
use padmini_vm_service::libvirt::{DefinedDomain, Hypervisor, HypervisorConnection};
use padmini_vm_service::provision::Provisioner;
use padmini_vm_service::structs::ProvisioningRequest;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const IMAGE_DIR: &str = "/images";

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Ordered log shared by every fake so tests can assert the step sequence.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[derive(Clone, Default)]
pub struct FakeImager {
    pub calls: Calls,
    pub fail: bool,
}

impl DiskImager for FakeImager {
    fn create_disk(&self, path: &Path, size_gb: u64) -> Result<()> {
        self.calls.push(format!("create {} {size_gb}", path.display()));
        if self.fail {
            bail!("No space left on device");
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeHypervisor {
    pub calls: Calls,
    pub defined_xml: Arc<Mutex<Option<String>>>,
    pub fail_connect: bool,
    pub fail_define: bool,
    pub fail_start: bool,
    pub fail_undefine: bool,
}

impl FakeHypervisor {
    pub fn xml(&self) -> String {
        self.defined_xml
            .lock()
            .unwrap()
            .clone()
            .expect("no domain was defined")
    }
}

impl Hypervisor for FakeHypervisor {
    type Connection = FakeConnection;

    fn connect(&self) -> Result<FakeConnection> {
        self.calls.push("connect");
        if self.fail_connect {
            bail!("Failed to connect socket to '/var/run/libvirt/libvirt-sock'");
        }
        Ok(FakeConnection { hv: self.clone() })
    }
}

pub struct FakeConnection {
    hv: FakeHypervisor,
}

impl HypervisorConnection for FakeConnection {
    type Domain = FakeDomain;

    fn define_domain(&self, xml: &str) -> Result<FakeDomain> {
        self.hv.calls.push("define");
        *self.hv.defined_xml.lock().unwrap() = Some(xml.to_string());
        if self.hv.fail_define {
            bail!("XML error: invalid domain");
        }
        let name = xml
            .split("<name>")
            .nth(1)
            .and_then(|s| s.split("</name>").next())
            .unwrap_or_default()
            .to_string();
        Ok(FakeDomain {
            hv: self.hv.clone(),
            name,
        })
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.hv.calls.push("close");
    }
}

pub struct FakeDomain {
    hv: FakeHypervisor,
    name: String,
}

impl DefinedDomain for FakeDomain {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> Result<()> {
        self.hv.calls.push("start");
        if self.hv.fail_start {
            bail!("Cannot access storage file");
        }
        Ok(())
    }

    fn undefine(&self) -> Result<()> {
        self.hv.calls.push("undefine");
        if self.hv.fail_undefine {
            bail!("domain is locked");
        }
        Ok(())
    }
}

impl Drop for FakeDomain {
    fn drop(&mut self) {
        self.hv.calls.push("free");
    }
}

/// Hypervisor and imager sharing one call log.
pub fn fakes() -> (FakeHypervisor, FakeImager, Calls) {
    let calls = Calls::default();
    let hv = FakeHypervisor {
        calls: calls.clone(),
        ..Default::default()
    };
    let imager = FakeImager {
        calls: calls.clone(),
        ..Default::default()
    };
    (hv, imager, calls)
}

pub fn provisioner(hv: FakeHypervisor, imager: FakeImager) -> Provisioner<FakeHypervisor, FakeImager> {
    provisioner_with(hv, imager, DomainTemplate::builtin().unwrap(), "default")
}

pub fn provisioner_with(
    hv: FakeHypervisor,
    imager: FakeImager,
    template: DomainTemplate,
    network: &str,
) -> Provisioner<FakeHypervisor, FakeImager> {
    Provisioner::new(hv, imager, template, PathBuf::from(IMAGE_DIR), network)
}

pub fn request() -> ProvisioningRequest {
    ProvisioningRequest {
        name: String::from("web01"),
        memory_mb: 2048,
        cpus: 2,
        disk_size_gb: Some(20),
        ..Default::default()
    }
}
