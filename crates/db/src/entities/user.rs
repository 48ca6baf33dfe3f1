//! User entity.
//!
//! Minimal principal record. Credential issuance lives outside this core;
//! the stored token is only resolved back to a user id and role.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub username: String,

    /// Access token; NULL until issued by the external auth collaborator
    #[sea_orm(unique, nullable)]
    pub token: Option<String>,

    /// Admins may observe any conversation room but never mutate order state
    #[sea_orm(default_value = false)]
    pub is_admin: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
