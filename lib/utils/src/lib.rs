use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

pub trait OffsetDateTimeExt {
	fn into_primitive_utc(self) -> PrimitiveDateTime;
}

impl OffsetDateTimeExt for OffsetDateTime {
	fn into_primitive_utc(self) -> PrimitiveDateTime {
		let value = self.to_offset(UtcOffset::UTC);
		let date = value.date();
		let time = value.time();
		PrimitiveDateTime::new(date, time)
	}
}

/// Current time as a naive UTC timestamp, the way every timestamp column is stored.
pub fn utc_now() -> PrimitiveDateTime {
	OffsetDateTime::now_utc().into_primitive_utc()
}

pub trait DateExt: Sized {
	/// Shifts the date back by whole calendar months, landing on the first of the month.
	fn months_back(self, months: u32) -> Self;
}

impl DateExt for Date {
	fn months_back(self, months: u32) -> Self {
		let index = self.year() * 12 + (u8::from(self.month()) as i32 - 1) - months as i32;
		let year = index.div_euclid(12);
		let month = Month::try_from((index.rem_euclid(12) + 1) as u8).unwrap_or(Month::January);
		Date::from_calendar_date(year, month, 1).unwrap_or(self)
	}
}

pub trait PrimitiveDateTimeExt {
	fn start_of_day(date: Date) -> Self;
}

impl PrimitiveDateTimeExt for PrimitiveDateTime {
	fn start_of_day(date: Date) -> Self {
		PrimitiveDateTime::new(date, Time::MIDNIGHT)
	}
}

pub trait ActiveValueExt<T> {
	fn update(&mut self, value: T);
}

impl<T> ActiveValueExt<T> for sea_orm::ActiveValue<T>
where
	T: Into<sea_orm::Value>,
	for<'a> &'a T: Eq,
{
	fn update(&mut self, value: T) {
		match self {
			Self::Set(v) => *v = value,
			Self::NotSet => *self = Self::Set(value),
			Self::Unchanged(v) => {
				if &*v != &value {
					*self = Self::Set(value);
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::ActiveValue;
	use time::macros::date;

	#[test]
	fn months_back_crosses_year_boundary() {
		assert_eq!(date!(2024 - 03 - 17).months_back(11), date!(2023 - 04 - 01));
		assert_eq!(date!(2024 - 01 - 31).months_back(1), date!(2023 - 12 - 01));
		assert_eq!(date!(2024 - 12 - 05).months_back(0), date!(2024 - 12 - 01));
	}

	#[test]
	fn update_only_marks_changed_values() {
		let mut value = ActiveValue::Unchanged(5i32);
		value.update(5);
		assert!(matches!(value, ActiveValue::Unchanged(5)));

		value.update(6);
		assert!(matches!(value, ActiveValue::Set(6)));
	}
}
