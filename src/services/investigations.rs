//! Variance investigation workflow.
//!
//! Tracks manual follow-up on flagged variances: root cause, corrective
//! action, and a closing status. Investigation never touches the ledger;
//! a stock correction, if warranted, is a separate adjustment movement
//! issued outside this workflow.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{transfer_variance, transfer_variance::VarianceStatus};
use crate::errors::ServiceError;
use crate::services::access_policy::{AccessPolicyService, Actor};
use crate::services::risk::{score_variance, RiskAssessment};
use crate::services::transfers::unwrap_transaction_error;

#[derive(Debug, Clone)]
pub struct InvestigateCommand {
    pub root_cause: String,
    pub corrective_action: String,
    pub new_status: VarianceStatus,
}

/// A variance paired with its freshly computed risk assessment.
#[derive(Debug, Clone)]
pub struct VarianceWithRisk {
    pub variance: transfer_variance::Model,
    pub risk: RiskAssessment,
}

#[derive(Clone)]
pub struct VarianceService {
    db_pool: Arc<DbPool>,
    access_policy: AccessPolicyService,
}

impl VarianceService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self {
            db_pool,
            access_policy: AccessPolicyService::new(),
        }
    }

    /// Records the outcome of a manual investigation.
    ///
    /// Both root cause and corrective action are mandatory; `resolved_at`
    /// is stamped only when the new status is `resolved`.
    #[instrument(skip(self, command))]
    pub async fn investigate(
        &self,
        variance_id: Uuid,
        command: InvestigateCommand,
        actor: Actor,
    ) -> Result<transfer_variance::Model, ServiceError> {
        self.access_policy.ensure_manager(&actor)?;

        if command.root_cause.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "a root cause is required".to_string(),
            ));
        }
        if command.corrective_action.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "a corrective action is required".to_string(),
            ));
        }
        if command.new_status == VarianceStatus::Open {
            return Err(ServiceError::ValidationError(
                "an investigation cannot move a variance back to open".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();

        let variance = db
            .transaction::<_, transfer_variance::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let variance = transfer_variance::Entity::find_by_id(variance_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Variance {} not found", variance_id))
                        })?;

                    let current = variance.status();
                    if current == VarianceStatus::Resolved {
                        return Err(ServiceError::invalid_state(
                            "a resolved variance cannot be investigated",
                            current.to_string(),
                        ));
                    }

                    let now = Utc::now();
                    let mut active: transfer_variance::ActiveModel = variance.into();
                    active.status = Set(command.new_status.to_string());
                    active.root_cause = Set(Some(command.root_cause.trim().to_string()));
                    active.corrective_action =
                        Set(Some(command.corrective_action.trim().to_string()));
                    active.resolved_at = Set(if command.new_status == VarianceStatus::Resolved {
                        Some(now)
                    } else {
                        None
                    });
                    active.updated_at = Set(now);
                    active
                        .update(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(
            variance_id = %variance_id,
            new_status = %variance.status,
            "variance investigation recorded"
        );

        Ok(variance)
    }

    pub async fn get_variance(
        &self,
        variance_id: Uuid,
    ) -> Result<Option<transfer_variance::Model>, ServiceError> {
        transfer_variance::Entity::find_by_id(variance_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Fetches a variance with its risk assessment, computed on the spot
    /// against the current open-variance population. Never cached: the
    /// cross-variance signals change independently of this record.
    #[instrument(skip(self))]
    pub async fn get_variance_with_risk(
        &self,
        variance_id: Uuid,
    ) -> Result<Option<VarianceWithRisk>, ServiceError> {
        let Some(variance) = self.get_variance(variance_id).await? else {
            return Ok(None);
        };

        let open = self.open_variances().await?;
        let risk = score_variance(&variance, &open, Utc::now());

        Ok(Some(VarianceWithRisk { variance, risk }))
    }

    /// All variances still open or under investigation.
    pub async fn open_variances(
        &self,
    ) -> Result<Vec<transfer_variance::Model>, ServiceError> {
        transfer_variance::Entity::find()
            .filter(
                transfer_variance::Column::Status.is_in([
                    VarianceStatus::Open.to_string(),
                    VarianceStatus::Investigating.to_string(),
                ]),
            )
            .order_by_asc(transfer_variance::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Lists variances with pagination and optional status/outlet filters.
    #[instrument(skip(self))]
    pub async fn list_variances(
        &self,
        page: u64,
        limit: u64,
        status: Option<VarianceStatus>,
        outlet_id: Option<Uuid>,
    ) -> Result<(Vec<transfer_variance::Model>, u64), ServiceError> {
        let mut query = transfer_variance::Entity::find()
            .order_by_desc(transfer_variance::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(transfer_variance::Column::Status.eq(status.to_string()));
        }
        if let Some(outlet_id) = outlet_id {
            query = query.filter(transfer_variance::Column::OutletId.eq(outlet_id));
        }

        let paginator = query.paginate(self.db_pool.as_ref(), limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let variances = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((variances, total))
    }
}
