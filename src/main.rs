#[macro_use]
extern crate tracing;

use padmini_vm_service::disk::QemuImg;
use padmini_vm_service::domain_xml::DomainTemplate;
use padmini_vm_service::libvirt::LibvirtHypervisor;
use padmini_vm_service::provision::Provisioner;
use padmini_vm_service::server::serve;
use padmini_vm_service::structs::AppConfig;
use std::env;

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    let settings = match AppConfig::load() {
        Ok(s) => s,
        Err(e) => {
            panic!("{e}");
        }
    };
    // setup logging
    env::set_var("RUST_LOG", &settings.log_level);
    tracing_subscriber::fmt::init();

    info!(
        "padmini_vm_service {} {}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let template = match &settings.template_path {
        Some(path) => DomainTemplate::from_file(path),
        None => DomainTemplate::builtin(),
    };
    let template = match template {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to load domain template: {e}");
            std::process::exit(1);
        }
    };

    let provisioner = Provisioner::new(
        LibvirtHypervisor::new(&settings.libvirt_uri),
        QemuImg::new(&settings.qemu_img),
        template,
        settings.image_dir.clone(),
        &settings.network,
    );
    if let Err(e) = serve(&settings.listen_addr, provisioner).await {
        error!("Error starting server: {e:#}");
        std::process::exit(1);
    }
}
