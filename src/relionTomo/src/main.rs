
use std::process::ExitCode;

use anyhow::{bail, Result};
use gumdrop::{Options, ParsingStyle};

use relion_tomo::commands;
use relion_tomo::logging::{self, ResultExt};


#[derive(Options)]
struct Args {

	#[options(help_flag)]
	help: bool,

	/// settings for log output
	#[options(default = "relion_tomo=info")]
	log: String,

	#[options(command)]
	cmd: Option<Command>
}

#[derive(Options)]
enum Command {

	/// Compare one table of two STAR files
	Compare(commands::compare::Args),

	/// Project particles onto the tilts of their tomograms
	Project(commands::project::Args),

	/// Show the columns each table needs for a RELION version
	Schema(commands::schema::Args),

	/// Mark MRC files of single volumes as volumes
	FixHeader(commands::fix_header::Args)
}


fn main() -> ExitCode {

	// parse arguments
	let args = Args::parse_args_or_exit(ParsingStyle::AllOptions);

	// init logging
	let Ok(_) = logging::init(&args.log)
		.log_err()
		else { return ExitCode::FAILURE; };

	// the comparator has its own exit codes
	let cmd = match args.cmd {
		Some(Command::Compare(compare_args)) => return commands::compare::run(compare_args),
		cmd => cmd
	};

	let Ok(_) = run(cmd)
		.log_err()
		else { return ExitCode::FAILURE; };

	ExitCode::SUCCESS
}


#[tracing::instrument(skip_all, level = 5, name = "RelionTomo")]
fn run(cmd: Option<Command>) -> Result<()> {
	match cmd {
		Some(Command::Project(project_args)) => commands::project::run(project_args),
		Some(Command::Schema(schema_args)) => commands::schema::run(schema_args),
		Some(Command::FixHeader(fix_args)) => commands::fix_header::run(fix_args),
		_ => bail!("No command, try one of:\n{}", Args::command_list().unwrap_or(""))
	}
}
