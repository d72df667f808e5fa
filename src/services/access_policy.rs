//! Outlet access policy: who may act on which outlet's inventory.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::entities::outlet_access;
use crate::errors::ServiceError;

/// Role of the acting user, resolved upstream by the identity provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    OutletManager,
    AreaManager,
    Admin,
}

impl Role {
    /// Manager roles may approve, reject, and close investigations.
    pub fn is_manager(&self) -> bool {
        matches!(self, Role::OutletManager | Role::AreaManager | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The acting user on a workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Pure lookup over the outlet access grant table. No state of its own.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicyService;

impl AccessPolicyService {
    pub fn new() -> Self {
        Self
    }

    /// Whether the actor may act on the given outlet's inventory.
    /// Administrators implicitly hold access to every outlet.
    pub async fn has_outlet_access<C: ConnectionTrait>(
        &self,
        db: &C,
        actor: &Actor,
        outlet_id: Uuid,
    ) -> Result<bool, ServiceError> {
        if actor.role.is_admin() {
            return Ok(true);
        }

        let grants = outlet_access::Entity::find()
            .filter(outlet_access::Column::UserId.eq(actor.user_id))
            .filter(outlet_access::Column::OutletId.eq(outlet_id))
            .count(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(grants > 0)
    }

    /// Same check, but failing with `Forbidden` carrying the precise
    /// reason instead of returning a boolean.
    pub async fn ensure_outlet_access<C: ConnectionTrait>(
        &self,
        db: &C,
        actor: &Actor,
        outlet_id: Uuid,
    ) -> Result<(), ServiceError> {
        if self.has_outlet_access(db, actor, outlet_id).await? {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "user {} has no access to outlet {}",
                actor.user_id, outlet_id
            )))
        }
    }

    /// Managers only; used by approve/reject/investigate.
    pub fn ensure_manager(&self, actor: &Actor) -> Result<(), ServiceError> {
        if actor.role.is_manager() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} may not perform this operation; a manager role is required",
                actor.role
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_roles() {
        assert!(Role::OutletManager.is_manager());
        assert!(Role::AreaManager.is_manager());
        assert!(Role::Admin.is_manager());
        assert!(!Role::Staff.is_manager());
    }

    #[test]
    fn role_slug_round_trip() {
        assert_eq!(Role::OutletManager.to_string(), "outlet_manager");
        assert_eq!("area_manager".parse::<Role>().unwrap(), Role::AreaManager);
    }

    #[test]
    fn ensure_manager_rejects_staff() {
        let policy = AccessPolicyService::new();
        let staff = Actor::new(Uuid::new_v4(), Role::Staff);
        assert!(policy.ensure_manager(&staff).is_err());
        let manager = Actor::new(Uuid::new_v4(), Role::OutletManager);
        assert!(policy.ensure_manager(&manager).is_ok());
    }
}
