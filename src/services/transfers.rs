//! Transfer request lifecycle: creation, approval, rejection, dispatch
//! completion, and cancellation.
//!
//! Status is always re-read inside the same transaction that writes it,
//! so concurrent approvals or completions cannot both succeed. Dispatch
//! writes the balanced ledger pair for every approved line in that same
//! transaction: the pair commits with the status flip or not at all.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    outlet, transfer_line_item, transfer_packaging_line_item, transfer_request,
    transfer_request::TransferStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::access_policy::{AccessPolicyService, Actor};
use crate::services::ledger::{StockLedgerService, TransferMovement};

/// A requested product line.
#[derive(Debug, Clone)]
pub struct NewTransferLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A requested packaging line.
#[derive(Debug, Clone)]
pub struct NewPackagingLine {
    pub packaging_material_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CreateTransferCommand {
    pub source_outlet_id: Uuid,
    pub destination_outlet_id: Uuid,
    pub notes: Option<String>,
    pub lines: Vec<NewTransferLine>,
    pub packaging_lines: Vec<NewPackagingLine>,
}

/// Per-line approved quantity override.
#[derive(Debug, Clone)]
pub struct ApprovalLine {
    pub line_item_id: Uuid,
    pub approved_quantity: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ApproveTransferCommand {
    pub lines: Vec<ApprovalLine>,
    pub packaging_lines: Vec<ApprovalLine>,
}

/// Full read model of one transfer.
#[derive(Debug, Clone)]
pub struct TransferDetail {
    pub transfer: transfer_request::Model,
    pub lines: Vec<transfer_line_item::Model>,
    pub packaging_lines: Vec<transfer_packaging_line_item::Model>,
}

/// Result of a dispatch completion; `newly_completed` is false on an
/// idempotent retry.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub transfer: transfer_request::Model,
    pub newly_completed: bool,
    pub movements_written: usize,
}

#[derive(Clone)]
pub struct TransferService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    access_policy: AccessPolicyService,
    ledger: StockLedgerService,
}

impl TransferService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
            access_policy: AccessPolicyService::new(),
            ledger: StockLedgerService::new(),
        }
    }

    /// Creates a transfer request in `pending` with all requested
    /// quantities; approved/received quantities stay null until the
    /// corresponding lifecycle step.
    #[instrument(skip(self, command))]
    pub async fn create_transfer(
        &self,
        command: CreateTransferCommand,
        actor: Actor,
    ) -> Result<TransferDetail, ServiceError> {
        if command.source_outlet_id == command.destination_outlet_id {
            return Err(ServiceError::ValidationError(
                "source and destination outlet must differ".to_string(),
            ));
        }
        if command.lines.is_empty() && command.packaging_lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "a transfer requires at least one line item".to_string(),
            ));
        }
        for line in &command.lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "requested quantity for product {} must be positive",
                    line.product_id
                )));
            }
        }
        for line in &command.packaging_lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "requested quantity for packaging material {} must be positive",
                    line.packaging_material_id
                )));
            }
        }

        let db = self.db_pool.as_ref();

        for outlet_id in [command.source_outlet_id, command.destination_outlet_id] {
            outlet::Entity::find_by_id(outlet_id)
                .one(db)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| ServiceError::NotFound(format!("Outlet {} not found", outlet_id)))?;
        }

        // The requester must be entitled to pull stock into the destination.
        self.access_policy
            .ensure_outlet_access(db, &actor, command.destination_outlet_id)
            .await?;

        let transfer_id = Uuid::new_v4();
        let transfer_number = generate_transfer_number();
        let now = Utc::now();

        let detail = db
            .transaction::<_, TransferDetail, ServiceError>(move |txn| {
                Box::pin(async move {
                    let transfer = transfer_request::ActiveModel {
                        id: Set(transfer_id),
                        transfer_number: Set(transfer_number),
                        source_outlet_id: Set(command.source_outlet_id),
                        destination_outlet_id: Set(command.destination_outlet_id),
                        status: Set(TransferStatus::Pending.to_string()),
                        notes: Set(command.notes.clone()),
                        requested_by: Set(actor.user_id),
                        approved_by: Set(None),
                        received_by: Set(None),
                        cancelled_by: Set(None),
                        rejection_reason: Set(None),
                        requested_at: Set(now),
                        approved_at: Set(None),
                        dispatched_at: Set(None),
                        received_at: Set(None),
                        completed_at: Set(None),
                        cancelled_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?;

                    let mut lines = Vec::with_capacity(command.lines.len());
                    for line in &command.lines {
                        let model = transfer_line_item::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            transfer_id: Set(transfer_id),
                            product_id: Set(line.product_id),
                            requested_quantity: Set(line.quantity),
                            approved_quantity: Set(None),
                            received_quantity: Set(None),
                            created_at: Set(now),
                            updated_at: Set(now),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;
                        lines.push(model);
                    }

                    let mut packaging_lines = Vec::with_capacity(command.packaging_lines.len());
                    for line in &command.packaging_lines {
                        let model = transfer_packaging_line_item::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            transfer_id: Set(transfer_id),
                            packaging_material_id: Set(line.packaging_material_id),
                            requested_quantity: Set(line.quantity),
                            approved_quantity: Set(None),
                            received_quantity: Set(None),
                            created_at: Set(now),
                            updated_at: Set(now),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;
                        packaging_lines.push(model);
                    }

                    Ok(TransferDetail {
                        transfer,
                        lines,
                        packaging_lines,
                    })
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(
            transfer_id = %detail.transfer.id,
            transfer_number = %detail.transfer.transfer_number,
            "transfer request created"
        );

        self.event_sender
            .emit(Event::TransferCreated {
                transfer_id: detail.transfer.id,
                transfer_number: detail.transfer.transfer_number.clone(),
                source_outlet_id: detail.transfer.source_outlet_id,
                destination_outlet_id: detail.transfer.destination_outlet_id,
                requested_by: actor.user_id,
            })
            .await;

        Ok(detail)
    }

    /// Approves a pending transfer, fixing per-line approved quantities.
    /// Lines without an explicit override default to the requested
    /// quantity; overrides above the requested quantity are rejected.
    #[instrument(skip(self, command))]
    pub async fn approve_transfer(
        &self,
        transfer_id: Uuid,
        command: ApproveTransferCommand,
        actor: Actor,
    ) -> Result<TransferDetail, ServiceError> {
        self.access_policy.ensure_manager(&actor)?;

        let db = self.db_pool.as_ref();
        let line_overrides: HashMap<Uuid, i32> = command
            .lines
            .iter()
            .map(|l| (l.line_item_id, l.approved_quantity))
            .collect();
        let packaging_overrides: HashMap<Uuid, i32> = command
            .packaging_lines
            .iter()
            .map(|l| (l.line_item_id, l.approved_quantity))
            .collect();

        let detail = db
            .transaction::<_, TransferDetail, ServiceError>(move |txn| {
                Box::pin(async move {
                    let transfer = find_transfer(txn, transfer_id).await?;
                    let status = transfer.status();
                    if status != TransferStatus::Pending {
                        return Err(ServiceError::invalid_state(
                            "only pending transfers can be approved",
                            status.to_string(),
                        ));
                    }

                    let now = Utc::now();
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
                    for override_id in line_overrides.keys().chain(packaging_overrides.keys()) {
                        if !known.contains(override_id) {
                            return Err(ServiceError::ValidationError(format!(
                                "line item {} does not belong to transfer {}",
                                override_id, transfer_id
                            )));
                        }
                    }

                    let mut approved_lines = Vec::with_capacity(lines.len());
                    for line in lines {
                        let approved = approved_quantity_for(
                            line_overrides.get(&line.id).copied(),
                            line.requested_quantity,
                            line.id,
                        )?;
                        let mut active: transfer_line_item::ActiveModel = line.into();
                        active.approved_quantity = Set(Some(approved));
                        active.updated_at = Set(now);
                        approved_lines.push(
                            active
                                .update(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?,
                        );
                    }

                    let mut approved_packaging = Vec::with_capacity(packaging_lines.len());
                    for line in packaging_lines {
                        let approved = approved_quantity_for(
                            packaging_overrides.get(&line.id).copied(),
                            line.requested_quantity,
                            line.id,
                        )?;
                        let mut active: transfer_packaging_line_item::ActiveModel = line.into();
                        active.approved_quantity = Set(Some(approved));
                        active.updated_at = Set(now);
                        approved_packaging.push(
                            active
                                .update(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?,
                        );
                    }

                    let mut active: transfer_request::ActiveModel = transfer.into();
                    active.status = Set(TransferStatus::Approved.to_string());
                    active.approved_by = Set(Some(actor.user_id));
                    active.approved_at = Set(Some(now));
                    active.updated_at = Set(now);
                    let transfer = active
                        .update(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    Ok(TransferDetail {
                        transfer,
                        lines: approved_lines,
                        packaging_lines: approved_packaging,
                    })
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(transfer_id = %transfer_id, approver = %actor.user_id, "transfer approved");

        self.event_sender
            .emit(Event::TransferApproved {
                transfer_id,
                approved_by: actor.user_id,
            })
            .await;

        Ok(detail)
    }

    /// Rejects a transfer before any stock has moved. The reason is
    /// mandatory and travels with the rejection event.
    #[instrument(skip(self))]
    pub async fn reject_transfer(
        &self,
        transfer_id: Uuid,
        reason: String,
        actor: Actor,
    ) -> Result<transfer_request::Model, ServiceError> {
        self.access_policy.ensure_manager(&actor)?;

        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "a rejection reason is required".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let reason_for_txn = reason.clone();

        let transfer = db
            .transaction::<_, transfer_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let transfer = find_transfer(txn, transfer_id).await?;
                    let status = transfer.status();
                    // Rejection is only meaningful while no stock has moved.
                    if !matches!(status, TransferStatus::Pending | TransferStatus::Approved) {
                        return Err(ServiceError::invalid_state(
                            "only pending or approved transfers can be rejected",
                            status.to_string(),
                        ));
                    }

                    let now = Utc::now();
                    let mut active: transfer_request::ActiveModel = transfer.into();
                    active.status = Set(TransferStatus::Rejected.to_string());
                    active.rejection_reason = Set(Some(reason_for_txn));
                    active.updated_at = Set(now);
                    active
                        .update(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(transfer_id = %transfer_id, "transfer rejected");

        self.event_sender
            .emit(Event::TransferRejected {
                transfer_id,
                reason,
                rejected_by: actor.user_id,
            })
            .await;

        Ok(transfer)
    }

    /// Dispatches and directly completes an approved transfer: writes the
    /// balanced movement pair for every approved line, all inside one
    /// transaction with the status flip.
    ///
    /// Idempotent: a retry on an already completed or received transfer
    /// returns the existing record without touching the ledger.
    #[instrument(skip(self))]
    pub async fn complete_transfer(
        &self,
        transfer_id: Uuid,
        actor: Actor,
    ) -> Result<CompletionOutcome, ServiceError> {
        let db = self.db_pool.as_ref();
        let ledger = self.ledger.clone();

        let outcome = db
            .transaction::<_, CompletionOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let transfer = find_transfer(txn, transfer_id).await?;
                    let status = transfer.status();

                    if status.has_ledger_entries() {
                        return Ok(CompletionOutcome {
                            transfer,
                            newly_completed: false,
                            movements_written: 0,
                        });
                    }
                    if status != TransferStatus::Approved {
                        return Err(ServiceError::invalid_state(
                            "only approved transfers can be completed",
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

                    let mut movements_written = 0;
                    for line in &lines {
                        let quantity = line.approved_quantity.unwrap_or(0);
                        if quantity == 0 {
                            continue;
                        }
                        ledger
                            .record_product_transfer_pair(
                                txn,
                                &TransferMovement {
                                    item_id: line.product_id,
                                    source_outlet_id: transfer.source_outlet_id,
                                    destination_outlet_id: transfer.destination_outlet_id,
                                    quantity,
                                    transfer_id,
                                    line_item_id: line.id,
                                    actor_id: actor.user_id,
                                    note: Some(format!(
                                        "transfer {}",
                                        transfer.transfer_number
                                    )),
                                },
                            )
                            .await?;
                        movements_written += 2;
                    }
                    for line in &packaging_lines {
                        let quantity = line.approved_quantity.unwrap_or(0);
                        if quantity == 0 {
                            continue;
                        }
                        ledger
                            .record_packaging_transfer_pair(
                                txn,
                                &TransferMovement {
                                    item_id: line.packaging_material_id,
                                    source_outlet_id: transfer.source_outlet_id,
                                    destination_outlet_id: transfer.destination_outlet_id,
                                    quantity,
                                    transfer_id,
                                    line_item_id: line.id,
                                    actor_id: actor.user_id,
                                    note: Some(format!(
                                        "transfer {}",
                                        transfer.transfer_number
                                    )),
                                },
                            )
                            .await?;
                        movements_written += 2;
                    }

                    let now = Utc::now();
                    let mut active: transfer_request::ActiveModel = transfer.into();
                    active.status = Set(TransferStatus::Completed.to_string());
                    active.dispatched_at = Set(Some(now));
                    active.completed_at = Set(Some(now));
                    active.updated_at = Set(now);
                    let transfer = active
                        .update(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    Ok(CompletionOutcome {
                        transfer,
                        newly_completed: true,
                        movements_written,
                    })
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        if outcome.newly_completed {
            info!(
                transfer_id = %transfer_id,
                movements = outcome.movements_written,
                "transfer dispatched and completed"
            );
            self.event_sender
                .emit(Event::TransferDispatched {
                    transfer_id,
                    line_count: outcome.movements_written / 2,
                })
                .await;
        }

        Ok(outcome)
    }

    /// Cancels a transfer that has not yet moved stock. Only the original
    /// requester or an administrator may cancel.
    #[instrument(skip(self))]
    pub async fn cancel_transfer(
        &self,
        transfer_id: Uuid,
        actor: Actor,
    ) -> Result<transfer_request::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let transfer = db
            .transaction::<_, transfer_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let transfer = find_transfer(txn, transfer_id).await?;

                    if transfer.requested_by != actor.user_id && !actor.role.is_admin() {
                        return Err(ServiceError::Forbidden(
                            "only the requester or an administrator may cancel a transfer"
                                .to_string(),
                        ));
                    }

                    let status = transfer.status();
                    if !status.is_cancellable() {
                        return Err(ServiceError::invalid_state(
                            "only pending or approved transfers can be cancelled",
                            status.to_string(),
                        ));
                    }

                    let now = Utc::now();
                    let mut active: transfer_request::ActiveModel = transfer.into();
                    active.status = Set(TransferStatus::Cancelled.to_string());
                    active.cancelled_by = Set(Some(actor.user_id));
                    active.cancelled_at = Set(Some(now));
                    active.updated_at = Set(now);
                    active
                        .update(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(transfer_id = %transfer_id, "transfer cancelled");

        Ok(transfer)
    }

    /// Full read model: transfer plus both line sets.
    #[instrument(skip(self))]
    pub async fn get_transfer(
        &self,
        transfer_id: Uuid,
    ) -> Result<Option<TransferDetail>, ServiceError> {
        let db = self.db_pool.as_ref();

        let Some(transfer) = transfer_request::Entity::find_by_id(transfer_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
        else {
            return Ok(None);
        };

        let lines = transfer_line_item::Entity::find()
            .filter(transfer_line_item::Column::TransferId.eq(transfer_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let packaging_lines = transfer_packaging_line_item::Entity::find()
            .filter(transfer_packaging_line_item::Column::TransferId.eq(transfer_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(Some(TransferDetail {
            transfer,
            lines,
            packaging_lines,
        }))
    }

    /// Lists transfers with pagination and an optional status filter.
    #[instrument(skip(self))]
    pub async fn list_transfers(
        &self,
        page: u64,
        limit: u64,
        status: Option<TransferStatus>,
    ) -> Result<(Vec<transfer_request::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = transfer_request::Entity::find()
            .order_by_desc(transfer_request::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(transfer_request::Column::Status.eq(status.to_string()));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let transfers = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((transfers, total))
    }
}

async fn find_transfer<C: sea_orm::ConnectionTrait>(
    db: &C,
    transfer_id: Uuid,
) -> Result<transfer_request::Model, ServiceError> {
    transfer_request::Entity::find_by_id(transfer_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", transfer_id)))
}

fn approved_quantity_for(
    override_quantity: Option<i32>,
    requested: i32,
    line_id: Uuid,
) -> Result<i32, ServiceError> {
    match override_quantity {
        None => Ok(requested),
        Some(approved) if approved < 0 => Err(ServiceError::ValidationError(format!(
            "approved quantity for line {} cannot be negative",
            line_id
        ))),
        Some(approved) if approved > requested => Err(ServiceError::ValidationError(format!(
            "approved quantity {} for line {} exceeds requested quantity {}",
            approved, line_id, requested
        ))),
        Some(approved) => Ok(approved),
    }
}

fn generate_transfer_number() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("TRF-{}-{}", Utc::now().format("%Y%m%d"), &id[..6])
}

pub(crate) fn unwrap_transaction_error(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}
