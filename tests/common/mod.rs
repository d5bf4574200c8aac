#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use feedlot_api::{
    config::{AppConfig, NegativeCostPolicy},
    db,
    entities::{cattle_lot, pen, PenType},
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        lots::{CreateLotInput, ReceiveLotInput},
        pens::CreatePenInput,
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const OPERATOR: &str = "operator-1";

/// Application state over a private in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_policy(NegativeCostPolicy::Allow).await
    }

    pub async fn with_policy(policy: NegativeCostPolicy) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cost_policy.negative_amounts = policy;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = feedlot_api::app_router(state.clone());

        Self {
            state,
            router,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub async fn create_pen(&self, number: &str, capacity: i32) -> pen::Model {
        self.services()
            .pens
            .create_pen(CreatePenInput {
                pen_number: number.to_string(),
                capacity,
                pen_type: PenType::Fattening,
                location: None,
            })
            .await
            .expect("create pen")
    }

    /// A PENDING lot bought for a fixed acquisition cost.
    pub async fn create_lot(&self, head: i32, acquisition_cost: Decimal) -> cattle_lot::Model {
        self.services()
            .lots
            .create_lot(lot_input(head, acquisition_cost))
            .await
            .expect("create lot")
    }

    /// A lot received in full and not yet placed in any pen.
    pub async fn active_lot(&self, head: i32) -> cattle_lot::Model {
        let lot = self.create_lot(head, dec!(100000.00)).await;
        self.services()
            .lots
            .receive_lot(
                lot.id,
                ReceiveLotInput {
                    received_quantity: head,
                    received_weight: Decimal::from(head) * dec!(300),
                    received_at: None,
                    allocations: None,
                },
                OPERATOR,
            )
            .await
            .expect("receive lot")
            .lot
    }

    pub async fn pen(&self, id: uuid::Uuid) -> pen::Model {
        self.services().pens.get_pen(id).await.expect("load pen")
    }

    pub async fn lot(&self, id: uuid::Uuid) -> cattle_lot::Model {
        self.services().lots.get_lot(id).await.expect("load lot")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Sends a request through the full router and decodes the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", OPERATOR);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).expect("request")).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn lot_input(head: i32, acquisition_cost: Decimal) -> CreateLotInput {
    CreateLotInput {
        entry_quantity: head,
        entry_weight: Decimal::from(head) * dec!(300),
        acquisition_cost: Some(acquisition_cost),
        price_per_arroba: None,
        carcass_yield: None,
        freight_cost: Decimal::ZERO,
        commission: Decimal::ZERO,
        entry_date: None,
        vendor_name: Some("Fazenda Boa Vista".to_string()),
        notes: None,
    }
}
