use sea_orm_migration::prelude::*;

#[derive(Iden, Clone, Copy)]
pub enum User {
	Table,
	Id,
	Email,
	DisplayName,
	LegacyPassword,
	PlexToken,
	CreatedAt,
	UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Password {
	Table,
	UserId,
	Hash,
	UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Passkey {
	Table,
	Id,
	UserId,
	CredentialId,
	Name,
	Credential,
	Counter,
	CreatedAt,
	LastUsedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Session {
	Table,
	Id,
	#[iden = "ctime"]
	CreateTime,
	#[iden = "atime"]
	AccessTime,
	#[iden = "etime"]
	ExpiryTime,
	UserId,
}

#[derive(Iden, Clone, Copy)]
pub enum Invite {
	Table,
	Id,
	CreatedBy,
	UsedBy,
	CreatedAt,
	UsedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum PasswordReset {
	Table,
	Id,
	UserId,
	TokenHash,
	ExpiresAt,
	CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Show {
	Table,
	Id,
	CatalogId,
	Name,
	Premiered,
	Ended,
	Rating,
	ImageUrl,
	Summary,
	ImdbId,
	CreatedAt,
	UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Episode {
	Table,
	Id,
	ShowId,
	CatalogId,
	Name,
	Season,
	Number,
	AirDate,
	Runtime,
	Summary,
	ImageUrl,
	CreatedAt,
	UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum ShowOnUser {
	Table,
	Id,
	ShowId,
	UserId,
	Archived,
	CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum EpisodeOnUser {
	Table,
	Id,
	EpisodeId,
	ShowId,
	UserId,
	Ignored,
	CreatedAt,
	UpdatedAt,
}
