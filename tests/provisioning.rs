//! End-to-end provisioning tests for cellbroker against fake cells over HTTP

use axum::extract::{Path, State as CellState};
use axum::http::StatusCode;
use axum::routing::put;
use axum::Json;
use cellbroker::cells::{Cell, CellRegistry, DeprovisionRequest, HttpCellClient, ProvisionRequest};
use cellbroker::cluster::{ClusterFeatures, PlanStatus};
use cellbroker::common::RouterConfig;
use cellbroker::store::{CoordinationStore, MemoryStore};
use cellbroker::{Broker, Error, ProvisionDetails, Router};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// A cell that records calls and answers every provision with `status`.
struct FakeCell {
    status: StatusCode,
    provisioned: Mutex<Vec<ProvisionRequest>>,
    deprovisioned: Mutex<Vec<String>>,
}

async fn provision_node(
    CellState(cell): CellState<Arc<FakeCell>>,
    Path(node_id): Path<String>,
    Json(req): Json<ProvisionRequest>,
) -> StatusCode {
    assert_eq!(req.parameters.node_id, node_id);
    cell.provisioned.lock().unwrap().push(req);
    cell.status
}

async fn deprovision_node(
    CellState(cell): CellState<Arc<FakeCell>>,
    Path(node_id): Path<String>,
    Json(_req): Json<DeprovisionRequest>,
) -> StatusCode {
    cell.deprovisioned.lock().unwrap().push(node_id);
    StatusCode::OK
}

async fn spawn_cell(guid: &str, az: &str, status: StatusCode) -> (Cell, Arc<FakeCell>) {
    let fake = Arc::new(FakeCell {
        status,
        provisioned: Mutex::new(Vec::new()),
        deprovisioned: Mutex::new(Vec::new()),
    });
    let app = axum::Router::new()
        .route(
            "/v2/service_instances/:id",
            put(provision_node).delete(deprovision_node),
        )
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let cell = Cell {
        guid: guid.to_string(),
        uri: format!("http://{}", addr),
        availability_zone: az.to_string(),
        username: "broker".into(),
        password: "secret".into(),
    };
    (cell, fake)
}

async fn broker(cells: Vec<Cell>) -> Broker {
    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
    let router = Router::new(store.clone(), &RouterConfig::default())
        .await
        .unwrap();
    let client = HttpCellClient::new(Duration::from_secs(5)).unwrap();
    Broker::new(
        store,
        Arc::new(CellRegistry::new(cells)),
        Arc::new(client),
        router,
    )
}

fn details() -> ProvisionDetails {
    ProvisionDetails {
        organization_guid: "org-1".into(),
        plan_id: "plan-small".into(),
        service_id: "svc-pg".into(),
        space_guid: "space-1".into(),
    }
}

#[tokio::test]
async fn test_provision_spreads_nodes_across_zones() {
    let (c1, f1) = spawn_cell("z1-c1", "z1", StatusCode::CREATED).await;
    let (c2, f2) = spawn_cell("z1-c2", "z1", StatusCode::CREATED).await;
    let (c3, f3) = spawn_cell("z2-c1", "z2", StatusCode::CREATED).await;
    let broker = broker(vec![c1, c2, c3]).await;

    let features = ClusterFeatures::from_parameters(&json!({}), 2).unwrap();
    broker
        .provision("inst-1", details(), features)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(f1.provisioned.lock().unwrap().len(), 1);
    assert_eq!(f2.provisioned.lock().unwrap().len(), 0);
    assert_eq!(f3.provisioned.lock().unwrap().len(), 1);

    // Every node shares the instance scope and credentials
    let first = f1.provisioned.lock().unwrap()[0].clone();
    let second = f3.provisioned.lock().unwrap()[0].clone();
    assert_eq!(first.parameters.scope, "inst-1");
    assert_eq!(first.parameters.scope, second.parameters.scope);
    assert_eq!(first.parameters.admin_password, second.parameters.admin_password);
    assert_ne!(first.parameters.node_id, second.parameters.node_id);
    assert_eq!(first.organization_guid, "org-1");

    let (status, message) = broker.last_operation("inst-1").await.unwrap();
    assert_eq!(status, PlanStatus::Success);
    assert_eq!(message, "Completed 2/2 steps");
}

#[tokio::test]
async fn test_rejected_cell_falls_through() {
    let (c1, f1) = spawn_cell("z1-c1", "z1", StatusCode::INTERNAL_SERVER_ERROR).await;
    let (c2, f2) = spawn_cell("z2-c1", "z2", StatusCode::CREATED).await;
    let broker = broker(vec![c1, c2]).await;

    broker
        .provision("inst-1", details(), ClusterFeatures::new(1))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(f1.provisioned.lock().unwrap().len(), 1);
    assert_eq!(f2.provisioned.lock().unwrap().len(), 1);
    let cluster = broker.state().load_cluster("inst-1").await.unwrap();
    assert_eq!(cluster.nodes[0].cell_guid, "z2-c1");
}

#[tokio::test]
async fn test_all_cells_rejecting_fails_the_plan() {
    let (c1, _) = spawn_cell("z1-c1", "z1", StatusCode::SERVICE_UNAVAILABLE).await;
    let (c2, _) = spawn_cell("z2-c1", "z2", StatusCode::BAD_REQUEST).await;
    let broker = broker(vec![c1, c2]).await;

    let err = broker
        .provision("inst-1", details(), ClusterFeatures::new(1))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PlacementExhausted { attempted: 2 }));

    let (status, message) = broker.last_operation("inst-1").await.unwrap();
    assert_eq!(status, PlanStatus::Failed);
    assert!(message.ends_with("(0/1 steps)"));
}

#[tokio::test]
async fn test_scale_out_then_deprovision() {
    let (c1, f1) = spawn_cell("z1-c1", "z1", StatusCode::CREATED).await;
    let (c2, f2) = spawn_cell("z2-c1", "z2", StatusCode::CREATED).await;
    let broker = broker(vec![c1, c2]).await;

    broker
        .provision("inst-1", details(), ClusterFeatures::new(1))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let features = ClusterFeatures::from_parameters(&json!({ "node-count": 3 }), 2).unwrap();
    broker
        .update("inst-1", features)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let cluster = broker.state().load_cluster("inst-1").await.unwrap();
    assert_eq!(cluster.node_count(), 3);

    broker
        .deprovision("inst-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let removed = f1.deprovisioned.lock().unwrap().len() + f2.deprovisioned.lock().unwrap().len();
    assert_eq!(removed, 3);
    assert!(!broker.state().cluster_exists("inst-1").await.unwrap());
    assert!(matches!(
        broker.last_operation("inst-1").await,
        Err(Error::InstanceNotFound(_))
    ));
}

#[tokio::test]
async fn test_unreachable_cell_is_skipped() {
    // Bind then drop a listener so nothing answers on the port
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let dead = Cell {
        guid: "z1-dead".into(),
        uri: format!("http://{}", addr),
        availability_zone: "z1".into(),
        username: "broker".into(),
        password: "secret".into(),
    };
    let (live, fake) = spawn_cell("z2-c1", "z2", StatusCode::CREATED).await;
    let broker = broker(vec![dead, live]).await;

    broker
        .provision("inst-1", details(), ClusterFeatures::new(1))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(fake.provisioned.lock().unwrap().len(), 1);
}
