use sea_orm::entity::prelude::*;

/// WebAuthn credential registered by a user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "passkey")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: Uuid,
	pub user_id: Uuid,
	/// Base64url encoded credential id, as reported by the authenticator.
	#[sea_orm(unique)]
	pub credential_id: String,
	pub name: String,
	/// JSON serialized `webauthn_rs::prelude::Passkey`.
	#[sea_orm(column_type = "Text")]
	pub credential: String,
	pub counter: i64,
	pub created_at: TimeDateTime,
	pub last_used_at: Option<TimeDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::UserId",
		to = "super::user::Column::Id",
		on_update = "Cascade",
		on_delete = "Cascade"
	)]
	User,
}

impl Related<super::user::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::User.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
