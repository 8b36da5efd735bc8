mod account;
mod auth;
mod components;
mod shows;
mod stats;
mod template;

pub use account::AccountPage;
pub use auth::{ForgotPasswordPage, JoinPage, LoginPage, ResetPasswordPage};
pub use shows::{RecentPage, SearchPage, ShowListPage, ShowPage, UpcomingPage};
pub use stats::StatsPage;
pub use template::Template;

use time::{macros::format_description, PrimitiveDateTime};

pub(crate) fn format_date(value: PrimitiveDateTime) -> String {
	value
		.format(format_description!("[year]-[month]-[day]"))
		.unwrap_or_default()
}

pub(crate) fn format_minutes(minutes: u64) -> String {
	let (hours, minutes) = (minutes / 60, minutes % 60);
	match (hours / 24, hours % 24) {
		(0, 0) => format!("{minutes}m"),
		(0, hours) => format!("{hours}h {minutes}m"),
		(days, hours) => format!("{days}d {hours}h {minutes}m"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::macros::datetime;

	#[test]
	fn minutes_are_split_into_days_and_hours() {
		assert_eq!(format_minutes(45), "45m");
		assert_eq!(format_minutes(125), "2h 5m");
		assert_eq!(format_minutes(60 * 24 + 61), "1d 1h 1m");
	}

	#[test]
	fn dates_drop_the_time() {
		assert_eq!(format_date(datetime!(2023-04-09 21:30)), "2023-04-09");
	}
}
