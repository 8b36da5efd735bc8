use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "show")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: Uuid,
	#[sea_orm(unique)]
	pub catalog_id: i32,
	pub name: String,
	pub premiered: Option<TimeDate>,
	pub ended: Option<TimeDate>,
	pub rating: Option<f64>,
	pub image_url: Option<String>,
	#[sea_orm(column_type = "Text", nullable)]
	pub summary: Option<String>,
	pub imdb_id: Option<String>,
	pub created_at: TimeDateTime,
	pub updated_at: TimeDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::episode::Entity")]
	Episode,
	#[sea_orm(has_many = "super::show_on_user::Entity")]
	ShowOnUser,
	#[sea_orm(has_many = "super::episode_on_user::Entity")]
	EpisodeOnUser,
}

impl Related<super::episode::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Episode.def()
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

impl ActiveModelBehavior for ActiveModel {}
