
use std::ops::Deref;

use anyhow::{Context, Result};
use display_error_chain::ErrorChainExt;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::UtcOffset;
use tracing::{debug, error, warn};
use tracing::dispatcher::DefaultGuard;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tracing_subscriber::fmt::format::{Format, Full};
use tracing_subscriber::fmt::time::OffsetTime;

use crate::error::Warning;


pub fn init(filter: impl AsRef<str>) -> Result<()> {

	// the CLI writes its reports to stdout, so keep the log on stderr
	let log_subscriber = FmtSubscriber::builder()
		.with_env_filter(log_filter(filter)?)
		.event_format(log_format())
		.with_writer(std::io::stderr)
		.finish();

	tracing::subscriber::set_global_default(log_subscriber)
		.context("Failed to set logging subscriber")?;

	Ok(())
}


pub fn init_test() -> DefaultGuard {

	let subscriber = FmtSubscriber::builder()
		.with_env_filter(EnvFilter::new("relion_tomo=trace"))
		.event_format(log_format())
		.with_test_writer()
		.finish();

	tracing::subscriber::set_default(subscriber)
}


fn log_filter(filter: impl AsRef<str>) -> Result<EnvFilter> {
	let filter = filter.as_ref();
	EnvFilter::builder()
		.parse(filter)
		.context(format!("Failed to parse log filter: {}", filter))
}


fn log_format() -> Format<Full,OffsetTime<&'static [FormatItem<'static>]>> {

	let time_format = format_description!(
		version = 2,
		"[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:4] [offset_hour sign:mandatory]:[offset_minute]"
	);

	let time_offset = UtcOffset::current_local_offset()
		.unwrap_or(UtcOffset::UTC);

	Format::default()
		.with_timer(OffsetTime::new(time_offset, time_format))
		.with_target(false)
}


/// sends every collected row warning to the log
pub fn log_warnings(warnings: &[Warning]) {
	if warnings.is_empty() {
		return;
	}
	for w in warnings {
		warn!("{}", w);
	}
	debug!("{} warning(s)", warnings.len());
}


pub trait ResultExt<T> {
	fn log_err(self) -> Result<T,()>;
	fn warn_err(self) -> Result<T,()>;
}

impl<T,E> ResultExt<T> for Result<T,E>
	where
		E: Into<anyhow::Error>
{

	fn log_err(self) -> Result<T,()> {
		self.map_err(|e| {
			let e = e.into();
			error!("{}", e.deref().chain());
		})
	}

	fn warn_err(self) -> Result<T,()> {
		self.map_err(|e| {
			let e = e.into();
			warn!("{}", e.deref().chain());
		})
	}
}


#[cfg(test)]
mod test {

	use anyhow::{anyhow, Context};
	use galvanic_assert::{assert_that, matchers::*};

	use super::*;


	#[test]
	fn errors_become_unit() {
		let _logging = init_test();

		let ok: Result<u32> = Ok(5);
		assert_that!(&ok.warn_err(), eq(Ok(5)));

		let failed: Result<u32> = Err(anyhow!("disk on fire"));
		assert_that!(&failed.context("Failed to write").warn_err(), eq(Err(())));

		let io: std::result::Result<u32,std::io::Error> = Err(std::io::Error::other("nope"));
		assert_that!(&io.log_err(), eq(Err(())));
	}
}
