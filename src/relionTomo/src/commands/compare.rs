
use std::process::ExitCode;

use anyhow::Context;
use gumdrop::Options;

use crate::compare::{compare, CompareReport};
use crate::logging::ResultExt;


pub const EXIT_EQUAL: u8 = 0;
pub const EXIT_DIFFERENT: u8 = 1;
/// a file or table that couldn't be read
pub const EXIT_STRUCTURAL: u8 = 2;


#[derive(Options)]
pub struct Args {

	/// the table to compare
	#[options(default = "particles")]
	table: String,

	/// a label to ignore, can be given more than once
	#[options(multi = "push")]
	exclude: Vec<String>,

	/// the first STAR file
	#[options(free, required)]
	a: String,

	/// the second STAR file
	#[options(free, required)]
	b: String
}


pub fn run(args: Args) -> ExitCode {

	let Ok(report) = compare_files(&args)
		.log_err()
		else { return ExitCode::from(EXIT_STRUCTURAL); };

	print!("{}", report);

	if report.is_equal() {
		ExitCode::from(EXIT_EQUAL)
	} else {
		ExitCode::from(EXIT_DIFFERENT)
	}
}


fn compare_files(args: &Args) -> Result<CompareReport,anyhow::Error> {
	compare(&args.a, &args.b, &args.table, &args.exclude)
		.with_context(|| format!("Failed to compare table data_{} of {} and {}", args.table, args.a, args.b))
}
