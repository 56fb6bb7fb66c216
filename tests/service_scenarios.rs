//! Integration coverage for scenarios not already exercised by the unit
//! tests alongside `service/mod.rs`: `onClose` firing exactly once, and the
//! healthcheck route's OK vs CRIT reply shape.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orion_core::health::{CheckStatus, DependencyProbe, HEALTHCHECK_ROUTE};
use orion_core::transport::mock::MockTransport;
use orion_core::transport::Transport;
use orion_core::{JsonCodec, Request, Response, Service};
use serde::Deserialize;

#[tokio::test]
async fn on_close_handler_fires_exactly_once() {
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    let mut service = Service::new("closer");
    service.set_transport(Arc::clone(&transport));

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    service.on_close(Box::new(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    }));

    let service = Arc::new(service);
    let svc2 = Arc::clone(&service);
    let listen_task = tokio::spawn(async move { svc2.listen().await });
    tokio::task::yield_now().await;

    service.close().await.unwrap();
    listen_task.await.unwrap().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Closing again must not re-invoke the handler.
    service.close().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[derive(Deserialize)]
struct HealthPayload {
    summary: String,
}

#[tokio::test]
async fn healthcheck_route_reports_ok_when_every_probe_passes() {
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    let service = Service::new("healthy");
    let service = Arc::new(wire_transport(service, &transport));

    let svc2 = Arc::clone(&service);
    let listen_task = tokio::spawn(async move { svc2.listen().await });
    tokio::task::yield_now().await;

    let codec = JsonCodec;
    let mut request = Request::new();
    request.set_path(format!("{}/{}", service.instance_name(), HEALTHCHECK_ROUTE));
    let mut response = Response::new();
    service.call(&request, &mut response).await;

    assert!(response.error().is_none());
    let payload: HealthPayload = response.parse_payload(&codec).unwrap();
    assert_eq!(payload.summary, "OK");

    service.close().await.unwrap();
    listen_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn healthcheck_route_reports_crit_when_a_probe_fails() {
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    let mut service = Service::new("unhealthy");
    service.set_transport(Arc::clone(&transport));
    service.register_health_check(DependencyProbe::new(
        "database",
        Duration::from_millis(50),
        || async { (CheckStatus::Crit, Some("database unreachable".to_string())) },
    ));
    let service = Arc::new(service);

    let svc2 = Arc::clone(&service);
    let listen_task = tokio::spawn(async move { svc2.listen().await });
    // Let the first (immediate) health-loop iteration complete.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let codec = JsonCodec;
    let mut request = Request::new();
    request.set_path(format!("{}/{}", service.instance_name(), HEALTHCHECK_ROUTE));
    let mut response = Response::new();
    service.call(&request, &mut response).await;

    let err = response.error().expect("crit probe should surface a CRIT error");
    assert_eq!(err.code(), "CRIT");
    let payload: HealthPayload = response.parse_payload(&codec).unwrap();
    assert!(payload.summary.contains("database unreachable"));

    service.close().await.unwrap();
    listen_task.await.unwrap().unwrap();
}

fn wire_transport(mut service: Service<JsonCodec>, transport: &Arc<dyn Transport>) -> Service<JsonCodec> {
    service.set_transport(Arc::clone(transport));
    service
}
