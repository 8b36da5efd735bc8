pub use crate::funcs::PgTimeFunc;
pub(crate) use crate::tables::*;
pub use sea_orm_migration::prelude::*;
