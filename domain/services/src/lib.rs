mod macros;

pub mod auth;
pub mod episode;
pub mod invite;
pub mod metrics;
pub mod password;
pub mod password_reset;
pub mod plex;
pub mod show;
pub mod token;
pub mod stats;
pub mod user;
pub mod validation;

pub use auth::{AuthConfig, AuthError, AuthService};
pub use episode::{EpisodeService, EpisodeServiceError};
pub use invite::{InviteService, InviteServiceError};
pub use metrics::{Counts, MetricsService};
pub use password_reset::{LogMailer, Mailer, PasswordResetError, PasswordResetService, SharedMailer};
pub use show::{ShowService, ShowServiceError};
pub use stats::{StatsService, UserStats};
pub use user::{UserService, UserServiceError};
pub use validation::ValidationErrors;
