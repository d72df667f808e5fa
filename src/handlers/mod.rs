pub mod stock;
pub mod transfers;
pub mod variances;

use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::access_policy::{Actor, Role};

/// The acting user, supplied by the authenticating gateway with every
/// mutating request.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct ActorDto {
    pub user_id: Uuid,
    /// `staff`, `outlet_manager`, `area_manager`, or `admin`
    #[schema(value_type = String)]
    pub role: Role,
}

impl From<ActorDto> for Actor {
    fn from(dto: ActorDto) -> Self {
        Actor::new(dto.user_id, dto.role)
    }
}
