
use std::path::Path;

use crate::error::{Error, Result};
use crate::metadata::OptimisationSet;
use crate::readers::{find_table, resolve_optional_path, resolve_path};
use crate::schema::labels::*;
use crate::star::StarDocument;


pub fn read_optimisation_set(path: impl AsRef<Path>) -> Result<OptimisationSet> {

	let path = path.as_ref();
	let doc = StarDocument::read(path)?;
	let table = find_table(&doc, "optimisation_set", OPT_PARTICLES_FILE)?;
	let row = table.row(0)
		.ok_or_else(|| Error::SchemaMismatch(format!("optimisation set {} is empty", path.to_string_lossy())))?;

	let optional = |label: &str| resolve_optional_path(path, row.str_opt(label));

	Ok(OptimisationSet {
		tomograms: resolve_path(path, row.str(OPT_TOMOGRAMS_FILE)?),
		particles: resolve_path(path, row.str(OPT_PARTICLES_FILE)?),
		trajectories: optional(OPT_TRAJECTORIES_FILE),
		manifolds: optional(OPT_MANIFOLDS_FILE),
		reference_map1: optional(OPT_REFERENCE_MAP1_FILE),
		reference_map2: optional(OPT_REFERENCE_MAP2_FILE),
		reference_mask: optional(OPT_REFERENCE_MASK_FILE),
		reference_fsc: optional(OPT_REFERENCE_FSC_FILE)
	})
}
