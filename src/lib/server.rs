use crate::disk::DiskImager;
use crate::libvirt::Hypervisor;
use crate::provision::{ProvisionError, Provisioner};
use crate::structs::{ProvisioningRequest, ResponseData};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

pub const VM_ROUTE: &str = "/api/v1/vm";

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ResponseData::error(self.to_string()))).into_response()
    }
}

pub fn router<H, D>(provisioner: Arc<Provisioner<H, D>>) -> Router
where
    H: Hypervisor + 'static,
    D: DiskImager + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route(
            VM_ROUTE,
            post(create_vm::<H, D>).fallback(method_not_allowed),
        )
        .with_state(provisioner)
}

pub async fn serve<H, D>(listen_addr: &str, provisioner: Provisioner<H, D>) -> Result<()>
where
    H: Hypervisor + 'static,
    D: DiskImager + 'static,
{
    let app = router(Arc::new(provisioner));
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("unable to bind {listen_addr}"))?;
    info!("padmini_vm_service listening on {listen_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> Json<ResponseData> {
    Json(ResponseData {
        status: String::from("ok"),
        message: None,
    })
}

async fn method_not_allowed() -> (StatusCode, Json<ResponseData>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ResponseData::error("Only POST is allowed")),
    )
}

async fn create_vm<H, D>(
    State(provisioner): State<Arc<Provisioner<H, D>>>,
    body: Bytes,
) -> Response
where
    H: Hypervisor + 'static,
    D: DiskImager + 'static,
{
    // decoded regardless of Content-Type, plain `curl -d` posts included
    let req: ProvisioningRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            error!("Error decoding JSON: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(ResponseData::error(format!("Invalid JSON input: {e}"))),
            )
                .into_response();
        }
    };
    info!("Provisioning request for {:?}", req.name);

    // libvirt and qemu-img block, so the whole sequence runs off the runtime
    let outcome = tokio::task::spawn_blocking(move || provisioner.provision(&req))
        .await
        .unwrap_or_else(|e| Err(ProvisionError::Task(e.to_string())));

    match outcome {
        Ok(name) => (
            StatusCode::OK,
            Json(ResponseData::success(format!(
                "VM {name} created and started successfully"
            ))),
        )
            .into_response(),
        Err(e) => {
            error!("{e}");
            e.into_response()
        }
    }
}
