//! Receipt processing: the destination outlet counts incoming goods, the
//! ledger records what physically arrived, and any gap between expected
//! and counted quantities becomes a variance record.
//!
//! The whole receipt (movement pairs, line updates, variance inserts and
//! the final status flip) commits in one transaction, keyed by the
//! transfer id for idempotent retries.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::VarianceThresholds;
use crate::db::DbPool;
use crate::entities::{
    transfer_line_item, transfer_packaging_line_item, transfer_request,
    transfer_request::TransferStatus, transfer_variance,
    transfer_variance::{ItemKind, VarianceSeverity, VarianceStatus},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, VarianceAlert};
use crate::services::access_policy::{AccessPolicyService, Actor};
use crate::services::catalog::CatalogService;
use crate::services::ledger::{StockLedgerService, TransferMovement};
use crate::services::transfers::unwrap_transaction_error;

/// One counted line from the receiving user. Lines omitted from the
/// payload default to received = expected.
#[derive(Debug, Clone)]
pub struct ReceiptLine {
    pub line_item_id: Uuid,
    pub quantity_received: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiveTransferCommand {
    pub lines: Vec<ReceiptLine>,
    pub packaging_lines: Vec<ReceiptLine>,
}

/// Result of a receipt; `newly_received` is false on an idempotent retry.
#[derive(Debug, Clone)]
pub struct ReceiptOutcome {
    pub transfer: transfer_request::Model,
    pub variances: Vec<transfer_variance::Model>,
    pub newly_received: bool,
}

/// Severity classification by monetary magnitude against configured
/// cutoffs. Strictly-greater comparisons: a value exactly at a cutoff
/// stays in the lower bucket.
pub fn classify_severity(value: Decimal, thresholds: &VarianceThresholds) -> VarianceSeverity {
    let magnitude = value.abs();
    if magnitude > thresholds.critical {
        VarianceSeverity::Critical
    } else if magnitude > thresholds.high {
        VarianceSeverity::High
    } else if magnitude > thresholds.medium {
        VarianceSeverity::Medium
    } else {
        VarianceSeverity::Low
    }
}

#[derive(Clone)]
pub struct ReceiptService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    access_policy: AccessPolicyService,
    catalog: CatalogService,
    ledger: StockLedgerService,
    thresholds: VarianceThresholds,
}

impl ReceiptService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        thresholds: VarianceThresholds,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            access_policy: AccessPolicyService::new(),
            catalog: CatalogService::new(),
            ledger: StockLedgerService::new(),
            thresholds,
        }
    }

    /// Processes the physical count for an approved transfer.
    ///
    /// For every line the ledger pair is written at the *received*
    /// quantity: the ledger reflects what actually arrived, and each
    /// line's movements still sum to zero. The shortfall (or overage)
    /// lives in the variance record until investigation closes it.
    #[instrument(skip(self, command))]
    pub async fn receive_transfer(
        &self,
        transfer_id: Uuid,
        command: ReceiveTransferCommand,
        actor: Actor,
    ) -> Result<ReceiptOutcome, ServiceError> {
        for line in command.lines.iter().chain(command.packaging_lines.iter()) {
            if line.quantity_received < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "received quantity for line {} cannot be negative",
                    line.line_item_id
                )));
            }
        }

        let db = self.db_pool.as_ref();

        let transfer = transfer_request::Entity::find_by_id(transfer_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", transfer_id)))?;

        // The receiver must be entitled to count stock into the destination.
        self.access_policy
            .ensure_outlet_access(db, &actor, transfer.destination_outlet_id)
            .await?;

        let counted_lines: HashMap<Uuid, ReceiptLine> = command
            .lines
            .into_iter()
            .map(|l| (l.line_item_id, l))
            .collect();
        let counted_packaging: HashMap<Uuid, ReceiptLine> = command
            .packaging_lines
            .into_iter()
            .map(|l| (l.line_item_id, l))
            .collect();

        let ledger = self.ledger.clone();
        let catalog = self.catalog.clone();
        let thresholds = self.thresholds.clone();

        let outcome = db
            .transaction::<_, ReceiptOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let transfer = transfer_request::Entity::find_by_id(transfer_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Transfer {} not found", transfer_id))
                        })?;
                    let status = transfer.status();

                    if status.has_ledger_entries() {
                        // Idempotent retry: return the prior result.
                        let variances = transfer_variance::Entity::find()
                            .filter(transfer_variance::Column::TransferId.eq(transfer_id))
                            .all(txn)
                            .await
                            .map_err(ServiceError::DatabaseError)?;
                        return Ok(ReceiptOutcome {
                            transfer,
                            variances,
                            newly_received: false,
                        });
                    }
                    if status != TransferStatus::Approved {
                        return Err(ServiceError::invalid_state(
                            "only approved transfers can be received",
                            status.to_string(),
                        ));
                    }

                    let lines = transfer_line_item::Entity::find()
                        .filter(transfer_line_item::Column::TransferId.eq(transfer_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;
                    let packaging_lines = transfer_packaging_line_item::Entity::find()
                        .filter(transfer_packaging_line_item::Column::TransferId.eq(transfer_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    let known: Vec<Uuid> = lines
                        .iter()
                        .map(|l| l.id)
                        .chain(packaging_lines.iter().map(|l| l.id))
                        .collect();
                    for counted_id in counted_lines.keys().chain(counted_packaging.keys()) {
                        if !known.contains(counted_id) {
                            return Err(ServiceError::ValidationError(format!(
                                "line item {} does not belong to transfer {}",
                                counted_id, transfer_id
                            )));
                        }
                    }

                    let now = Utc::now();
                    let mut variances = Vec::new();

                    for line in lines {
                        let expected = line.approved_quantity.unwrap_or(0);
                        let counted = counted_lines.get(&line.id);
                        let received =
                            counted.map(|c| c.quantity_received).unwrap_or(expected);
                        let reason = counted.and_then(|c| c.reason.clone());

                        if received > 0 {
                            ledger
                                .record_product_transfer_pair(
                                    txn,
                                    &TransferMovement {
                                        item_id: line.product_id,
                                        source_outlet_id: transfer.source_outlet_id,
                                        destination_outlet_id: transfer.destination_outlet_id,
                                        quantity: received,
                                        transfer_id,
                                        line_item_id: line.id,
                                        actor_id: actor.user_id,
                                        note: Some(format!(
                                            "receipt of transfer {}",
                                            transfer.transfer_number
                                        )),
                                    },
                                )
                                .await?;
                        }

                        let variance = expected - received;
                        let line_id = line.id;
                        let product_id = line.product_id;

                        let mut active: transfer_line_item::ActiveModel = line.into();
                        active.received_quantity = Set(Some(received));
                        active.updated_at = Set(now);
                        active
                            .update(txn)
                            .await
                            .map_err(ServiceError::DatabaseError)?;

                        if variance != 0 {
                            let item = catalog.get_product(txn, product_id).await?;
                            let model = insert_variance(
                                txn,
                                &transfer,
                                line_id,
                                ItemKind::Product,
                                product_id,
                                expected,
                                received,
                                variance,
                                item.unit_cost,
                                reason,
                                &thresholds,
                                actor,
                                now,
                            )
                            .await?;
                            variances.push(model);
                        }
                    }

                    for line in packaging_lines {
                        let expected = line.approved_quantity.unwrap_or(0);
                        let counted = counted_packaging.get(&line.id);
                        let received =
                            counted.map(|c| c.quantity_received).unwrap_or(expected);
                        let reason = counted.and_then(|c| c.reason.clone());

                        if received > 0 {
                            ledger
                                .record_packaging_transfer_pair(
                                    txn,
                                    &TransferMovement {
                                        item_id: line.packaging_material_id,
                                        source_outlet_id: transfer.source_outlet_id,
                                        destination_outlet_id: transfer.destination_outlet_id,
                                        quantity: received,
                                        transfer_id,
                                        line_item_id: line.id,
                                        actor_id: actor.user_id,
                                        note: Some(format!(
                                            "receipt of transfer {}",
                                            transfer.transfer_number
                                        )),
                                    },
                                )
                                .await?;
                        }

                        let variance = expected - received;
                        let line_id = line.id;
                        let material_id = line.packaging_material_id;

                        let mut active: transfer_packaging_line_item::ActiveModel = line.into();
                        active.received_quantity = Set(Some(received));
                        active.updated_at = Set(now);
                        active
                            .update(txn)
                            .await
                            .map_err(ServiceError::DatabaseError)?;

                        if variance != 0 {
                            let item = catalog.get_packaging_material(txn, material_id).await?;
                            let model = insert_variance(
                                txn,
                                &transfer,
                                line_id,
                                ItemKind::Packaging,
                                material_id,
                                expected,
                                received,
                                variance,
                                item.unit_cost,
                                reason,
                                &thresholds,
                                actor,
                                now,
                            )
                            .await?;
                            variances.push(model);
                        }
                    }

                    let final_status = if variances.is_empty() {
                        TransferStatus::Completed
                    } else {
                        TransferStatus::Received
                    };

                    let mut active: transfer_request::ActiveModel = transfer.into();
                    active.status = Set(final_status.to_string());
                    active.received_by = Set(Some(actor.user_id));
                    active.received_at = Set(Some(now));
                    if final_status == TransferStatus::Completed {
                        active.completed_at = Set(Some(now));
                    }
                    active.updated_at = Set(now);
                    let transfer = active
                        .update(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    Ok(ReceiptOutcome {
                        transfer,
                        variances,
                        newly_received: true,
                    })
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        if outcome.newly_received {
            info!(
                transfer_id = %transfer_id,
                variances = outcome.variances.len(),
                status = %outcome.transfer.status,
                "transfer received"
            );

            self.event_sender
                .emit(Event::TransferReceived {
                    transfer_id,
                    received_by: actor.user_id,
                    variance_count: outcome.variances.len(),
                })
                .await;

            if !outcome.variances.is_empty() {
                let alerts = outcome
                    .variances
                    .iter()
                    .map(|v| VarianceAlert {
                        variance_id: v.id,
                        item_kind: v.item_kind.clone(),
                        item_id: v.item_id,
                        variance: v.variance,
                        variance_value: v.variance_value,
                        severity: v.severity.clone(),
                    })
                    .collect();
                self.event_sender
                    .emit(Event::VarianceDetected {
                        transfer_id,
                        alerts,
                    })
                    .await;
            }
        }

        Ok(outcome)
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_variance<C: sea_orm::ConnectionTrait>(
    txn: &C,
    transfer: &transfer_request::Model,
    line_item_id: Uuid,
    item_kind: ItemKind,
    item_id: Uuid,
    expected: i32,
    received: i32,
    variance: i32,
    unit_cost: Decimal,
    reason: Option<String>,
    thresholds: &VarianceThresholds,
    actor: Actor,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<transfer_variance::Model, ServiceError> {
    let variance_value = Decimal::from(variance) * unit_cost;
    let severity = classify_severity(variance_value, thresholds);

    transfer_variance::ActiveModel {
        id: Set(Uuid::new_v4()),
        transfer_id: Set(transfer.id),
        line_item_id: Set(line_item_id),
        item_kind: Set(item_kind.to_string()),
        item_id: Set(item_id),
        outlet_id: Set(transfer.destination_outlet_id),
        expected_quantity: Set(expected),
        received_quantity: Set(received),
        variance: Set(variance),
        unit_cost: Set(unit_cost),
        variance_value: Set(variance_value),
        severity: Set(severity.to_string()),
        status: Set(VarianceStatus::Open.to_string()),
        reason: Set(reason),
        root_cause: Set(None),
        corrective_action: Set(None),
        reported_by: Set(actor.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        resolved_at: Set(None),
    }
    .insert(txn)
    .await
    .map_err(ServiceError::DatabaseError)
}
