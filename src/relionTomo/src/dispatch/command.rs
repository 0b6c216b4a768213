
use std::fs::{self, File};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::config::RelionConfig;
use crate::error::{Error, Result};
use crate::logging::ResultExt;


pub const STDOUT_FILENAME: &str = "run.out";
pub const STDERR_FILENAME: &str = "run.err";

/// how much of run.err goes into the error
const STDERR_TAIL_LINES: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(100);


/// One invocation of a RELION program. Parallelism is only passed through as flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCommand {
	program: String,
	args: Vec<String>,
	mpi: u32,
	threads: Option<u32>,
	gpus: Option<String>
}

impl ExternalCommand {

	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
			mpi: 1,
			threads: None,
			gpus: None
		}
	}

	pub fn arg(mut self, arg: impl ToString) -> Self {
		self.args.push(arg.to_string());
		self
	}

	pub fn args<I,S>(mut self, args: I) -> Self
		where
			I: IntoIterator<Item=S>,
			S: ToString
	{
		self.args.extend(args.into_iter().map(|a| a.to_string()));
		self
	}

	/// a flag followed by its path
	pub fn path_arg(self, flag: &str, path: &Path) -> Self {
		self.arg(flag)
			.arg(path.to_string_lossy())
	}

	/// MPI workers, more than one runs the `_mpi` build under mpirun
	pub fn mpi(mut self, mpi: u32) -> Self {
		self.mpi = mpi.max(1);
		self
	}

	pub fn threads(mut self, threads: u32) -> Self {
		self.threads = Some(threads.max(1));
		self
	}

	/// GPU ids in RELION's syntax, an empty string lets RELION pick
	pub fn gpus(mut self, gpus: impl Into<String>) -> Self {
		self.gpus = Some(gpus.into());
		self
	}

	/// the parallelism of the config: MPI workers, threads and GPUs if it names any
	pub fn parallel(self, config: &RelionConfig) -> Self {
		let cmd = self.mpi(config.mpi)
			.threads(config.threads);
		match &config.gpus {
			Some(gpus) => cmd.gpus(gpus.clone()),
			None => cmd
		}
	}

	pub fn program(&self) -> &str {
		&self.program
	}

	/// the full argument vector, executable first
	pub fn argv(&self, config: &RelionConfig) -> Vec<String> {

		let mut argv = Vec::new();
		if self.mpi > 1 {
			argv.push(config.mpirun.clone());
			argv.push("-np".to_string());
			argv.push(self.mpi.to_string());
			argv.push(config.program(&format!("{}_mpi", self.program)).to_string_lossy().to_string());
		} else {
			argv.push(config.program(&self.program).to_string_lossy().to_string());
		}

		argv.extend(self.args.iter().cloned());

		if let Some(threads) = self.threads {
			argv.push("--j".to_string());
			argv.push(threads.to_string());
		}
		if let Some(gpus) = &self.gpus {
			argv.push("--gpu".to_string());
			argv.push(gpus.clone());
		}

		argv
	}

	/// the command as an operator would type it
	pub fn command_line(&self, config: &RelionConfig) -> String {
		self.argv(config)
			.iter()
			.map(|arg| {
				if arg.is_empty() || arg.contains(char::is_whitespace) {
					format!("\"{}\"", arg)
				} else {
					arg.clone()
				}
			})
			.collect::<Vec<_>>()
			.join(" ")
	}

	/// Runs the command in `dir` and waits for it.
	/// The output goes to run.out and run.err in `dir`.
	/// A SIGTERM while waiting is passed on to the program's whole process group.
	#[tracing::instrument(skip_all, level = 5, name = "External", fields(program = %self.program))]
	pub fn run(&self, dir: &Path, config: &RelionConfig) -> Result<()> {

		let argv = self.argv(config);
		let command_line = self.command_line(config);
		info!("Running command:\n\tin: {}\n\t{}", dir.to_string_lossy(), command_line);

		let failed = |code: Option<i32>, stderr: String| Error::ExternalProgramFailed {
			command: command_line.clone(),
			code,
			stderr,
			dir: dir.to_path_buf()
		};

		let out_path = dir.join(STDOUT_FILENAME);
		let stdout = File::create(&out_path)
			.map_err(|e| Error::io(&out_path, e))?;
		let err_path = dir.join(STDERR_FILENAME);
		let stderr = File::create(&err_path)
			.map_err(|e| Error::io(&err_path, e))?;

		// install SIGTERM hook
		let sigterm = Arc::new(AtomicBool::new(false));
		let sig_id = signal_hook::flag::register(signal_hook::consts::SIGTERM, sigterm.clone())
			.map_err(|e| Error::io(dir, e))?;

		let mut cmd = Command::new(&argv[0]);
		cmd.args(&argv[1..])
			.current_dir(dir)
			.stdin(Stdio::null())
			.stdout(stdout)
			.stderr(stderr);
		// own group, so signals reach mpirun's workers too
		cmd.process_group(0);

		let result = match cmd.spawn() {
			Ok(mut process) => wait(&mut process, &sigterm),
			Err(e) => Err(failed(None, format!("Failed to start {}: {}", argv[0], e)))
		};
		signal_hook::low_level::unregister(sig_id);

		match result? {
			Exit::Success => {
				debug!("{} finished", self.program);
				Ok(())
			}
			Exit::Code(code) => Err(failed(Some(code), stderr_tail(&err_path))),
			Exit::Killed => Err(failed(None, stderr_tail(&err_path))),
			Exit::Terminated => {
				let mut msg = "terminated by SIGTERM".to_string();
				let tail = stderr_tail(&err_path);
				if !tail.is_empty() {
					msg.push('\n');
					msg.push_str(&tail);
				}
				Err(failed(None, msg))
			}
		}
	}
}


enum Exit {
	Success,
	Code(i32),
	Killed,
	/// we passed on a SIGTERM
	Terminated
}


fn wait(process: &mut std::process::Child, sigterm: &AtomicBool) -> Result<Exit> {

	let mut terminated = false;

	loop {

		let exit = process.try_wait()
			.map_err(|e| Error::io(format!("pid {}", process.id()), e))?;
		if let Some(exit) = exit {
			return Ok(if terminated {
				Exit::Terminated
			} else if exit.success() {
				Exit::Success
			} else if let Some(code) = exit.code() {
				Exit::Code(code)
			} else {
				Exit::Killed
			});
		}

		// command is still running: wait a bit and then check again
		// unless sigterm was requested, then forward it to the command and keep waiting
		if sigterm.swap(false, Ordering::Relaxed) {
			terminated = true;
			info!("SIGTERM: forwarding to process group {}", process.id());
			let pgid = Pid::from_raw(process.id() as i32);
			if let Err(e) = signal::killpg(pgid, Signal::SIGTERM) {
				warn!("Failed to forward SIGTERM, killing the command instead: {}", e);
				let _ = process.kill()
					.context("Failed to kill the command")
					.warn_err();
			}
		} else {
			thread::sleep(POLL_INTERVAL);
		}
	}
}


/// the last lines the program wrote to stderr
fn stderr_tail(path: &Path) -> String {
	let Ok(text) = fs::read_to_string(path)
		else { return String::new(); };
	let lines = text.lines().collect::<Vec<_>>();
	let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
	lines[start..].join("\n")
}
