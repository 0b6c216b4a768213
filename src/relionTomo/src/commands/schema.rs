
use anyhow::Context;
use gumdrop::Options;

use crate::config::parse_version;
use crate::schema::{kind_of, origin_of, LabelOrigin, SchemaVersion, TableKind, ValueKind};


#[derive(Options)]
pub struct Args {

	/// a RELION version, eg 4.0.1, or a schema name, eg v5
	#[options(free, required)]
	version: String
}


/// Prints the columns the schema of a RELION version requires, table by table
pub fn run(args: Args) -> Result<(),anyhow::Error> {

	let schema = match parse_version(&args.version) {
		Some(version) => SchemaVersion::for_binary(&version)?,
		None => args.version.parse::<SchemaVersion>()
			.with_context(|| format!("Not a RELION version: {}", args.version))?
	};

	println!("schema {}", schema);
	let registry = schema.registry();
	for kind in TableKind::ALL {
		let Ok(columns) = registry.columns(kind)
			else { continue; };
		println!();
		println!("{:?}", kind);
		for label in columns {
			let value = match kind_of(label) {
				ValueKind::Int => "int",
				ValueKind::Float => "float",
				ValueKind::Str => "string"
			};
			let origin = match origin_of(label) {
				LabelOrigin::Relion => "",
				LabelOrigin::Scipion => " (extension)"
			};
			println!("\t_{} {}{}", label, value, origin);
		}
	}

	Ok(())
}
