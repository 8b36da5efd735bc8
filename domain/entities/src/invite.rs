use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "invite")]
pub struct Model {
	/// The invite code handed out to the invitee.
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: Uuid,
	pub created_by: Option<Uuid>,
	pub used_by: Option<Uuid>,
	pub created_at: TimeDateTime,
	pub used_at: Option<TimeDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::CreatedBy",
		to = "super::user::Column::Id",
		on_update = "Cascade",
		on_delete = "SetNull"
	)]
	Creator,
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::UsedBy",
		to = "super::user::Column::Id",
		on_update = "Cascade",
		on_delete = "SetNull"
	)]
	User,
}

impl ActiveModelBehavior for ActiveModel {}
