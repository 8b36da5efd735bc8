use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "episode")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: Uuid,
	pub show_id: Uuid,
	#[sea_orm(unique)]
	pub catalog_id: i32,
	pub name: String,
	pub season: i32,
	pub number: i32,
	pub air_date: Option<TimeDateTime>,
	/// Minutes.
	pub runtime: Option<i32>,
	#[sea_orm(column_type = "Text", nullable)]
	pub summary: Option<String>,
	pub image_url: Option<String>,
	pub created_at: TimeDateTime,
	pub updated_at: TimeDateTime,
}

impl Model {
	pub fn has_aired(&self, now: TimeDateTime) -> bool {
		matches!(self.air_date, Some(aired) if aired <= now)
	}
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::show::Entity",
		from = "Column::ShowId",
		to = "super::show::Column::Id",
		on_update = "Cascade",
		on_delete = "Cascade"
	)]
	Show,
	#[sea_orm(has_many = "super::episode_on_user::Entity")]
	EpisodeOnUser,
}

impl Related<super::show::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Show.def()
	}
}

impl Related<super::episode_on_user::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::EpisodeOnUser.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}
