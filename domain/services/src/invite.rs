use crate::macros::define_service;
use sea_orm::{
	ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
	QueryFilter, QueryOrder,
};
use showtrack_entities::invite;
use showtrack_utils::utc_now;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

define_service! {
	#[derive(Clone)]
	pub struct InviteService {
		pub db: Arc<DatabaseConnection>,
	}
}

#[derive(Debug, Error)]
pub enum InviteServiceError {
	#[error(transparent)]
	DbErr(#[from] DbErr),
}

impl InviteService {
	#[instrument(skip(self))]
	pub async fn create(&self, created_by: Uuid) -> Result<invite::Model, InviteServiceError> {
		let invite = invite::ActiveModel {
			id: ActiveValue::Set(Uuid::new_v4()),
			created_by: ActiveValue::Set(Some(created_by)),
			used_by: ActiveValue::Set(None),
			created_at: ActiveValue::Set(utc_now()),
			used_at: ActiveValue::Set(None),
		}
		.insert(&*self.db)
		.await?;

		info!(invite = %invite.id, "invite created");
		Ok(invite)
	}

	/// Newest first.
	pub async fn created_by(&self, user_id: Uuid) -> Result<Vec<invite::Model>, DbErr> {
		invite::Entity::find()
			.filter(invite::Column::CreatedBy.eq(user_id))
			.order_by_desc(invite::Column::CreatedAt)
			.all(&*self.db)
			.await
	}

	/// The invite, if it exists and has not been used yet.
	pub async fn find_open(&self, code: Uuid) -> Result<Option<invite::Model>, DbErr> {
		invite::Entity::find_by_id(code)
			.filter(invite::Column::UsedBy.is_null())
			.one(&*self.db)
			.await
	}
}
