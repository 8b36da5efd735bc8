use crate::{prelude::*, utils::log_and_exec};

#[derive(DeriveMigrationName)]
pub struct Migration;

const SHOW_NAME_LOWER_INDEX: &str = "ix-show-name-lower";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		// plex webhooks only carry the show title, matched case-insensitively
		log_and_exec(
			manager,
			format!(
				r#"CREATE INDEX "{SHOW_NAME_LOWER_INDEX}" ON "{table}" (lower("{name}"))"#,
				table = Show::Table.to_string(),
				name = Show::Name.to_string(),
			),
		)
		.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_index(Index::drop().name(SHOW_NAME_LOWER_INDEX).to_owned())
			.await?;

		Ok(())
	}
}
