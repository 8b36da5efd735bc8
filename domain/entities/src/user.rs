use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: Uuid,
	#[sea_orm(unique)]
	pub email: String,
	pub display_name: String,
	/// Hash carried over from before passwords got their own table.
	pub legacy_password: Option<String>,
	#[sea_orm(unique)]
	pub plex_token: Option<String>,
	pub created_at: TimeDateTime,
	pub updated_at: TimeDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_one = "super::password::Entity")]
	Password,
	#[sea_orm(has_many = "super::passkey::Entity")]
	Passkey,
	#[sea_orm(has_many = "super::show_on_user::Entity")]
	ShowOnUser,
	#[sea_orm(has_many = "super::episode_on_user::Entity")]
	EpisodeOnUser,
	#[sea_orm(has_many = "super::session::Entity")]
	Session,
}

impl Related<super::password::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Password.def()
	}
}

impl Related<super::passkey::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Passkey.def()
	}
}

impl Related<super::show_on_user::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::ShowOnUser.def()
	}
}

impl Related<super::episode_on_user::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::EpisodeOnUser.def()
	}
}

impl Related<super::session::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Session.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
