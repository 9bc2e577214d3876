use anyhow::{anyhow, Result};
use virt::connect::Connect;
use virt::domain::Domain;

/// Entry point to the hypervisor management layer.
pub trait Hypervisor: Send + Sync {
    type Connection: HypervisorConnection;

    fn connect(&self) -> Result<Self::Connection>;
}

/// An open hypervisor connection. Closed when dropped.
pub trait HypervisorConnection {
    type Domain: DefinedDomain;

    fn define_domain(&self, xml: &str) -> Result<Self::Domain>;
}

/// A persistent domain handle. The handle is released when dropped; the
/// domain definition itself stays with the hypervisor.
pub trait DefinedDomain {
    fn name(&self) -> String;
    fn start(&self) -> Result<()>;
    fn undefine(&self) -> Result<()>;
}

pub struct LibvirtHypervisor {
    uri: String,
}

impl LibvirtHypervisor {
    pub fn new(uri: &str) -> Self {
        LibvirtHypervisor {
            uri: uri.to_string(),
        }
    }
}

impl Hypervisor for LibvirtHypervisor {
    type Connection = LibvirtConnection;

    fn connect(&self) -> Result<LibvirtConnection> {
        debug!("About to connect to {}", self.uri);
        match Connect::open(Some(&self.uri)) {
            Ok(conn) => Ok(LibvirtConnection { conn }),
            Err(e) => {
                error!("Can't connect to libvirt: {e}");
                Err(anyhow!("{e}"))
            }
        }
    }
}

pub struct LibvirtConnection {
    conn: Connect,
}

impl HypervisorConnection for LibvirtConnection {
    type Domain = LibvirtDomain;

    fn define_domain(&self, xml: &str) -> Result<LibvirtDomain> {
        let dom = Domain::define_xml(&self.conn, xml).map_err(|e| anyhow!("{e}"))?;
        let name = dom.get_name().unwrap_or_else(|_| String::from("<unnamed>"));
        debug!("Defined domain {name}");
        Ok(LibvirtDomain { dom, name })
    }
}

impl Drop for LibvirtConnection {
    fn drop(&mut self) {
        if let Err(e) = self.conn.close() {
            error!("Failed to disconnect from libvirt: {e}");
        };
        debug!("Disconnected from libvirt");
    }
}

pub struct LibvirtDomain {
    dom: Domain,
    name: String,
}

impl DefinedDomain for LibvirtDomain {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> Result<()> {
        self.dom.create().map_err(|e| anyhow!("{e}"))?;
        info!("Started libvirt domain {}", self.name);
        Ok(())
    }

    fn undefine(&self) -> Result<()> {
        self.dom.undefine().map_err(|e| anyhow!("{e}"))?;
        info!("Undefined libvirt domain {}", self.name);
        Ok(())
    }
}

impl Drop for LibvirtDomain {
    fn drop(&mut self) {
        if let Err(e) = self.dom.free() {
            error!("Failed to release handle for domain {}: {e}", self.name);
        }
    }
}
