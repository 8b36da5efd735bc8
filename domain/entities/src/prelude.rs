pub use super::episode::Entity as Episode;
pub use super::episode_on_user::Entity as EpisodeOnUser;
pub use super::invite::Entity as Invite;
pub use super::passkey::Entity as Passkey;
pub use super::password::Entity as Password;
pub use super::password_reset::Entity as PasswordReset;
pub use super::session::Entity as Session;
pub use super::show::Entity as Show;
pub use super::show_on_user::Entity as ShowOnUser;
pub use super::user::Entity as User;
