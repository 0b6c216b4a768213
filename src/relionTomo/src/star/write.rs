
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::ValueKind;
use crate::star::StarDocument;
use crate::star::table::{Layout, StarTable};
use crate::star::value::Value;


pub fn render(doc: &StarDocument) -> String {

	let mut out = String::new();
	out.push_str("\n# written by relion-tomo ");
	out.push_str(env!("CARGO_PKG_VERSION"));
	out.push('\n');

	for table in doc.tables() {
		out.push('\n');
		render_table(table, &mut out);
	}

	out
}


fn render_table(table: &StarTable, out: &mut String) {

	out.push_str("data_");
	out.push_str(table.name());
	out.push_str("\n\n");

	match table.layout() {

		Layout::Block => {
			let width = table.columns().iter()
				.map(|label| label.len() + 1)
				.max()
				.unwrap_or(0);
			if let Some(row) = table.row(0) {
				for (label, value) in table.columns().iter().zip(row.values()) {
					out.push_str(&format!("{:<width$}  {}\n", format!("_{}", label), render_value(value), width = width));
				}
			}
		}

		Layout::Loop => {
			out.push_str("loop_\n");
			for (i, label) in table.columns().iter().enumerate() {
				out.push_str(&format!("_{} #{}\n", label, i + 1));
			}

			// render every cell first, so the columns can line up
			let cells = table.rows()
				.map(|row| row.values().iter()
					.map(render_value)
					.collect::<Vec<_>>()
				)
				.collect::<Vec<_>>();
			let widths = (0 .. table.columns().len())
				.map(|col| cells.iter()
					.map(|row| row[col].len())
					.max()
					.unwrap_or(0)
				)
				.collect::<Vec<_>>();

			for (row, row_cells) in table.rows().zip(cells.iter()) {
				let line = row_cells.iter()
					.zip(row.values())
					.zip(widths.iter())
					.map(|((cell, value), &width)| match value.kind() {
						ValueKind::Str => format!("{:<width$}", cell, width = width),
						_ => format!("{:>width$}", cell, width = width)
					})
					.collect::<Vec<_>>()
					.join("  ");
				out.push_str(line.trim_end());
				out.push('\n');
			}
		}
	}

	out.push('\n');
}


fn render_value(value: &Value) -> String {
	match value {
		Value::Str(s) if needs_quotes(s) => {
			// a quote followed by whitespace would end the token early
			if s.contains("\" ") || s.contains("\"\t") {
				format!("'{}'", s)
			} else {
				format!("\"{}\"", s)
			}
		}
		_ => value.to_string()
	}
}


/// strings the parser would otherwise split, skip, or read as a keyword
fn needs_quotes(s: &str) -> bool {
	s.is_empty()
		|| s.chars().any(char::is_whitespace)
		|| s.starts_with(['#', '_', '"', '\''])
		|| s.starts_with("data_")
		|| s.starts_with("loop_")
}


/// Writes the text next to the destination, syncs it, then renames it into place,
/// so readers never see a partial file
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {

	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			fs::create_dir_all(parent)
				.map_err(|e| Error::io(parent, e))?;
		}
	}

	let tmp_path = tmp_path(path);
	{
		let mut file = File::create(&tmp_path)
			.map_err(|e| Error::io(&tmp_path, e))?;
		file.write_all(contents.as_bytes())
			.map_err(|e| Error::io(&tmp_path, e))?;
		file.sync_all()
			.map_err(|e| Error::io(&tmp_path, e))?;
	}
	fs::rename(&tmp_path, path)
		.map_err(|e| Error::io(path, e))?;

	debug!("Wrote {}", path.to_string_lossy());
	Ok(())
}


fn tmp_path(path: &Path) -> PathBuf {
	let name = path.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.unwrap_or_default();
	path.with_file_name(format!(".{}.tmp", name))
}
