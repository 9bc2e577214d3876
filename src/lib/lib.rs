#[macro_use]
extern crate tracing;
pub mod disk;
pub mod domain_xml;
pub mod libvirt;
pub mod provision;
pub mod server;
pub mod structs;
mod vm_xml;
