
// Runs one step: write its inputs, run its external program, read back what the program wrote.

pub mod command;
pub mod context;

use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;

use anyhow::bail;
use display_error_chain::ErrorChainExt;
use serde_json::json;
use tracing::{error, info};

use crate::error::Warning;

pub use command::ExternalCommand;
pub use context::{RegisteredOutput, StepContext};


/// One kind of work done by an external program
pub trait Step {

	/// the id of the step kind, eg `refine`
	fn name(&self) -> &str;

	/// writes the input files into the step directory
	fn prepare_inputs(&self, ctx: &mut StepContext) -> anyhow::Result<()>;

	fn build_command(&self, ctx: &StepContext) -> anyhow::Result<ExternalCommand>;

	/// reads the program's outputs and registers them
	fn parse_outputs(&self, ctx: &mut StepContext) -> anyhow::Result<()>;
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
	Pending,
	Preparing,
	Running,
	Parsing,
	Done,
	Failed
}

impl StepState {

	pub fn id(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Preparing => "preparing",
			Self::Running => "running",
			Self::Parsing => "parsing",
			Self::Done => "done",
			Self::Failed => "failed"
		}
	}

	/// the state after this one, when the current phase succeeds
	pub fn next(&self) -> Option<Self> {
		match self {
			Self::Pending => Some(Self::Preparing),
			Self::Preparing => Some(Self::Running),
			Self::Running => Some(Self::Parsing),
			Self::Parsing => Some(Self::Done),
			Self::Done | Self::Failed => None
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Done | Self::Failed)
	}

	pub fn can_become(&self, to: Self) -> bool {
		match to {
			Self::Failed => !self.is_terminal(),
			_ => self.next() == Some(to)
		}
	}
}

impl fmt::Display for StepState {

	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.id())
	}
}


/// What the host sees of a finished step
#[derive(Debug, Clone)]
pub struct StepResult {
	pub status: StepState,
	pub errors: Vec<String>,
	pub warnings: Vec<Warning>,
	pub outputs: Vec<RegisteredOutput>,
	pub directory: PathBuf
}

impl StepResult {

	pub fn is_done(&self) -> bool {
		self.status == StepState::Done
	}

	pub fn output(&self, name: &str) -> Option<&PathBuf> {
		self.outputs.iter()
			.find(|o| o.name == name)
			.map(|o| &o.path)
	}

	pub fn to_json(&self) -> serde_json::Value {
		json!({
			"status": self.status.id(),
			"errors": self.errors,
			"warnings": self.warnings.iter()
				.map(|w| w.to_string())
				.collect::<Vec<_>>(),
			"outputsRegistered": self.outputs.iter()
				.map(|o| json!({
					"name": o.name,
					"path": o.path.to_string_lossy()
				}))
				.collect::<Vec<_>>(),
			"directory": self.directory.to_string_lossy()
		})
	}
}


/// Tracks a step through its phases, refusing transitions the state machine doesn't have
#[derive(Debug)]
pub struct StepRun {
	state: StepState
}

impl StepRun {

	pub fn new() -> Self {
		Self {
			state: StepState::Pending
		}
	}

	pub fn state(&self) -> StepState {
		self.state
	}

	pub fn advance(&mut self, to: StepState) -> anyhow::Result<()> {
		if !self.state.can_become(to) {
			bail!("step can't go from {} to {}", self.state, to);
		}
		self.state = to;
		Ok(())
	}
}

impl Default for StepRun {

	fn default() -> Self {
		Self::new()
	}
}


/// Runs the step to completion. Errors never escape: they end the step FAILED, in the result.
pub fn run_step(step: &dyn Step, mut ctx: StepContext) -> StepResult {

	let mut run = StepRun::new();

	let errors = match run_phases(step, &mut ctx, &mut run) {
		Ok(()) => {
			info!("Step {} done in {}", step.name(), ctx.dir().to_string_lossy());
			Vec::new()
		}
		Err(e) => {
			let msg = e.deref().chain().to_string();
			error!("Step {} failed in {}: {}", step.name(), ctx.dir().to_string_lossy(), msg);
			// failing is always allowed from a non-terminal state
			let _ = run.advance(StepState::Failed);
			vec![msg]
		}
	};

	let (dir, warnings, outputs) = ctx.into_parts();
	StepResult {
		status: run.state(),
		errors,
		warnings,
		outputs,
		directory: dir
	}
}


#[tracing::instrument(skip_all, level = 5, name = "Step", fields(step = step.name()))]
fn run_phases(step: &dyn Step, ctx: &mut StepContext, run: &mut StepRun) -> anyhow::Result<()> {

	run.advance(StepState::Preparing)?;
	step.prepare_inputs(ctx)?;

	run.advance(StepState::Running)?;
	let command = step.build_command(ctx)?;
	command.run(ctx.dir(), ctx.config())?;

	run.advance(StepState::Parsing)?;
	step.parse_outputs(ctx)?;

	run.advance(StepState::Done)?;
	Ok(())
}
