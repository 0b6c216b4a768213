
use std::path::Path;

use crate::error::Result;
use crate::metadata::OptimisationSet;
use crate::star::{StarDocument, StarTable, Value};


/// A single-row block naming the files of the set; optional files that don't exist are left out
pub fn optimisation_set_document(set: &OptimisationSet) -> Result<StarDocument> {
	let pairs = set.entries()
		.into_iter()
		.map(|(label, path)| (label, Value::from(path)));
	let mut doc = StarDocument::new();
	doc.push(StarTable::block("optimisation_set", pairs)?);
	Ok(doc)
}


pub fn write_optimisation_set(path: impl AsRef<Path>, set: &OptimisationSet) -> Result<()> {
	optimisation_set_document(set)?
		.write(path)
}
