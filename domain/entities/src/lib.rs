pub mod prelude;

pub mod episode;
pub mod episode_on_user;
pub mod invite;
pub mod passkey;
pub mod password;
pub mod password_reset;
pub mod session;
pub mod show;
pub mod show_on_user;
pub mod user;
