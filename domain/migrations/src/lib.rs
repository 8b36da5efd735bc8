pub use sea_orm_migration::prelude::*;
pub mod prelude;

mod funcs;
mod tables;
mod utils;

mod m20240105_000001_accounts;
mod m20240105_000002_shows;
mod m20240212_000003_show_name_lookup;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
	fn migrations() -> Vec<Box<dyn MigrationTrait>> {
		vec![
			Box::new(m20240105_000001_accounts::Migration),
			Box::new(m20240105_000002_shows::Migration),
			Box::new(m20240212_000003_show_name_lookup::Migration),
		]
	}
}
