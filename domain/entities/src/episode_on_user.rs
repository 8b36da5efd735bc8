use sea_orm::entity::prelude::*;

/// A watch record. The row existing means "watched", unless `ignored` is set.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "episode_on_user")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: Uuid,
	pub episode_id: Uuid,
	pub show_id: Uuid,
	pub user_id: Uuid,
	pub ignored: bool,
	/// Doubles as the "watched at" timestamp.
	pub created_at: TimeDateTime,
	pub updated_at: TimeDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::episode::Entity",
		from = "Column::EpisodeId",
		to = "super::episode::Column::Id",
		on_update = "Cascade",
		on_delete = "Cascade"
	)]
	Episode,
	#[sea_orm(
		belongs_to = "super::show::Entity",
		from = "Column::ShowId",
		to = "super::show::Column::Id",
		on_update = "Cascade",
		on_delete = "Cascade"
	)]
	Show,
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::UserId",
		to = "super::user::Column::Id",
		on_update = "Cascade",
		on_delete = "Cascade"
	)]
	User,
}

impl Related<super::episode::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Episode.def()
	}
}

impl Related<super::show::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Show.def()
	}
}

impl Related<super::user::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::User.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
