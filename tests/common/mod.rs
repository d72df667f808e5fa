//! Shared test harness: in-memory SQLite schema, seed data, and services
//! wired to a capturing event channel.
#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use transferdesk_api::config::VarianceThresholds;
use transferdesk_api::db::DbPool;
use transferdesk_api::entities::{outlet, outlet_access, packaging_material, product};
use transferdesk_api::events::{Event, EventSender};
use transferdesk_api::schema;
use transferdesk_api::services::access_policy::{Actor, Role};
use transferdesk_api::services::investigations::VarianceService;
use transferdesk_api::services::ledger::StockLedgerService;
use transferdesk_api::services::receiving::ReceiptService;
use transferdesk_api::services::reconciliation::ReconciliationService;
use transferdesk_api::services::transfers::TransferService;

pub struct TestHarness {
    pub db: Arc<DbPool>,
    pub transfers: TransferService,
    pub receipts: ReceiptService,
    pub variances: VarianceService,
    pub ledger: StockLedgerService,
    pub reconciliation: ReconciliationService,
    events: mpsc::Receiver<Event>,
}

impl TestHarness {
    pub async fn new() -> Self {
        // A single pooled connection keeps every query on the same
        // in-memory SQLite database.
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options)
            .await
            .expect("connect to in-memory sqlite");
        schema::create_all_tables(&db)
            .await
            .expect("create schema");
        let db = Arc::new(db);

        let (tx, rx) = mpsc::channel(64);
        let sender = EventSender::new(tx);

        Self {
            transfers: TransferService::new(db.clone(), sender.clone()),
            receipts: ReceiptService::new(db.clone(), sender, VarianceThresholds::default()),
            variances: VarianceService::new(db.clone()),
            ledger: StockLedgerService::new(),
            reconciliation: ReconciliationService::new(),
            db,
            events: rx,
        }
    }

    pub async fn seed_outlet(&self, code: &str, kind: &str) -> Uuid {
        let id = Uuid::new_v4();
        outlet::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            name: Set(format!("{} outlet", code)),
            kind: Set(kind.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed outlet");
        id
    }

    pub async fn seed_product(&self, sku: &str, unit_cost: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {}", sku)),
            unit_cost: Set(unit_cost),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed product");
        id
    }

    pub async fn seed_packaging(&self, sku: &str, unit_cost: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        packaging_material::ActiveModel {
            id: Set(id),
            sku: Set(sku.to_string()),
            name: Set(format!("Packaging {}", sku)),
            unit_cost: Set(unit_cost),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed packaging material");
        id
    }

    pub async fn grant_access(&self, user_id: Uuid, outlet_id: Uuid) {
        outlet_access::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            outlet_id: Set(outlet_id),
            granted_by: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .expect("grant outlet access");
    }

    /// A staff actor holding access to the given outlet.
    pub async fn staff_with_access(&self, outlet_id: Uuid) -> Actor {
        let actor = Actor::new(Uuid::new_v4(), Role::Staff);
        self.grant_access(actor.user_id, outlet_id).await;
        actor
    }

    /// A manager actor holding access to the given outlet.
    pub async fn manager_with_access(&self, outlet_id: Uuid) -> Actor {
        let actor = Actor::new(Uuid::new_v4(), Role::OutletManager);
        self.grant_access(actor.user_id, outlet_id).await;
        actor
    }

    pub fn manager(&self) -> Actor {
        Actor::new(Uuid::new_v4(), Role::OutletManager)
    }

    pub fn admin(&self) -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    pub fn staff(&self) -> Actor {
        Actor::new(Uuid::new_v4(), Role::Staff)
    }

    /// Drains every event currently queued.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Forces a transfer into a status directly, bypassing the workflow.
    /// For state-machine coverage only.
    pub async fn force_status(&self, transfer_id: Uuid, status: &str) {
        use sea_orm::EntityTrait;
        use transferdesk_api::entities::transfer_request;

        let transfer = transfer_request::Entity::find_by_id(transfer_id)
            .one(self.db.as_ref())
            .await
            .expect("load transfer")
            .expect("transfer exists");
        let mut active: transfer_request::ActiveModel = transfer.into();
        active.status = Set(status.to_string());
        active
            .update(self.db.as_ref())
            .await
            .expect("force status");
    }

    pub async fn transfer_status(&self, transfer_id: Uuid) -> String {
        use sea_orm::EntityTrait;
        use transferdesk_api::entities::transfer_request;

        transfer_request::Entity::find_by_id(transfer_id)
            .one(self.db.as_ref())
            .await
            .expect("load transfer")
            .expect("transfer exists")
            .status
    }
}

/// Standard two-outlet, one-product setup used by most suites.
pub struct TransferFixture {
    pub source: Uuid,
    pub dest: Uuid,
    pub product: Uuid,
    pub requester: Actor,
}

pub async fn basic_fixture(harness: &TestHarness, unit_cost: Decimal) -> TransferFixture {
    let source = harness.seed_outlet("WH-1", "warehouse").await;
    let dest = harness.seed_outlet("ST-1", "store").await;
    let product = harness.seed_product("SKU-1", unit_cost).await;
    let requester = harness.staff_with_access(dest).await;
    TransferFixture {
        source,
        dest,
        product,
        requester,
    }
}
