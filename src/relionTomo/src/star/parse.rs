
// Line-oriented STAR reader.
// RELION writes one row per line, so unlike full CIF we never need multi-line values.

use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::kind_of;
use crate::star::StarDocument;
use crate::star::table::{Layout, StarTable};
use crate::star::value::Value;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	/// before the first data block
	Start,
	/// after `data_`, waiting for `loop_` or block pairs
	Data,
	Labels,
	Rows,
	Block
}


pub fn parse(text: &str, path: &Path) -> Result<StarDocument> {

	let mut doc = StarDocument::new();
	let mut current = None::<StarTable>;
	let mut state = State::Start;

	for (line_i, line) in text.lines().enumerate() {
		let line_num = line_i + 1;

		let tokens = tokenize(line)
			.map_err(|reason| Error::malformed(path, line_num, reason))?;
		let Some(first) = tokens.first()
			else { continue; };
		// quoted tokens are always values
		let keyword = first.keyword();

		if let Some(name) = keyword.and_then(|k| k.strip_prefix("data_")) {

			if tokens.len() > 1 {
				return Err(Error::malformed(path, line_num, "unexpected tokens after data block name"));
			}
			if let Some(table) = current.take() {
				push_table(&mut doc, table, path, line_num)?;
			}
			current = Some(StarTable::empty(name, Layout::Loop));
			state = State::Data;

		} else if keyword == Some("loop_") {

			let Some(table) = &current
				else { return Err(Error::malformed(path, line_num, "loop_ outside of a data block")); };
			if state != State::Data {
				return Err(Error::malformed(path, line_num, format!("second loop_ in table data_{}", table.name())));
			}
			state = State::Labels;

		} else if let Some(label) = keyword.and_then(|k| k.strip_prefix('_')) {

			let Some(table) = &mut current
				else { return Err(Error::malformed(path, line_num, "label outside of a data block")); };
			match state {

				State::Labels => {
					if tokens.len() > 1 {
						return Err(Error::malformed(path, line_num, format!("unexpected tokens after label {}", label)));
					}
					table.add_column(label)
						.map_err(|_| Error::malformed(path, line_num, format!("duplicate label {} in table data_{}", label, table.name())))?;
				}

				State::Data | State::Block => {
					// single-row block: the value follows the label on the same line
					let [_, token] = tokens.as_slice()
						else { return Err(Error::malformed(path, line_num, format!("block label {} needs exactly one value", label))); };
					table.add_column(label)
						.map_err(|_| Error::malformed(path, line_num, format!("duplicate label {} in table data_{}", label, table.name())))?;
					let value = parse_value(label, &token.text)
						.map_err(|reason| Error::malformed(path, line_num, reason))?;
					table.set_layout(Layout::Block);
					if state == State::Data {
						table.push_row(vec![value])
							.map_err(|e| Error::malformed(path, line_num, e.to_string()))?;
					} else {
						append_block_value(table, value);
					}
					state = State::Block;
				}

				State::Rows | State::Start =>
					return Err(Error::malformed(path, line_num, format!("label {} after the rows of table data_{}", label, table.name())))
			}

		} else {

			let Some(table) = &mut current
				else { return Err(Error::malformed(path, line_num, "value outside of a data block")); };
			if state != State::Labels && state != State::Rows {
				return Err(Error::malformed(path, line_num, format!("value outside of a loop in table data_{}", table.name())));
			}
			if tokens.len() != table.columns().len() {
				return Err(Error::malformed(path, line_num, format!(
					"row has {} values, but table data_{} has {} labels",
					tokens.len(), table.name(), table.columns().len()
				)));
			}
			let values = tokens.iter()
				.zip(table.columns().iter())
				.map(|(token, label)| parse_value(label, &token.text))
				.collect::<std::result::Result<Vec<_>,_>>()
				.map_err(|reason| Error::malformed(path, line_num, reason))?;
			table.push_row(values)
				.map_err(|e| Error::malformed(path, line_num, e.to_string()))?;
			state = State::Rows;
		}
	}

	if let Some(table) = current.take() {
		let num_lines = text.lines().count();
		push_table(&mut doc, table, path, num_lines)?;
	}

	Ok(doc)
}


fn push_table(doc: &mut StarDocument, table: StarTable, path: &Path, line_num: usize) -> Result<()> {
	if doc.has_table(table.name()) {
		return Err(Error::malformed(path, line_num, format!("duplicate table data_{}", table.name())));
	}
	doc.push(table);
	Ok(())
}


fn append_block_value(table: &mut StarTable, value: Value) {
	// blocks have exactly one row, so rebuild it with the new value on the end
	let mut values = table.row(0)
		.map(|row| row.values().to_vec())
		.unwrap_or_default();
	values.push(value);
	table.truncate(0);
	// the column was just added, so the arity always matches
	let _ = table.push_row(values);
}


fn parse_value(label: &str, token: &str) -> std::result::Result<Value,String> {
	let kind = kind_of(label);
	Value::parse(kind, token)
		.ok_or_else(|| format!("value {} is not a valid {:?} for label {}", token, kind, label))
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
	pub text: String,
	pub quoted: bool
}

impl Token {

	fn bare(text: String) -> Self {
		Self { text, quoted: false }
	}

	fn quoted(text: String) -> Self {
		Self { text, quoted: true }
	}

	/// the token's text, if it could be `data_`, `loop_` or a label
	fn keyword(&self) -> Option<&str> {
		match self.quoted {
			true => None,
			false => Some(&self.text)
		}
	}
}


/// Splits a line into tokens, dropping `#` comments and honoring quotes
pub(crate) fn tokenize(line: &str) -> std::result::Result<Vec<Token>,String> {

	let mut tokens = Vec::new();
	let mut chars = line.chars().peekable();

	loop {

		// skip whitespace
		while chars.peek().is_some_and(|c| c.is_whitespace()) {
			chars.next();
		}

		let Some(&c) = chars.peek()
			else { break; };

		match c {

			// comments run to the end of the line
			'#' => break,

			'"' | '\'' => {
				let quote = c;
				chars.next();
				let mut token = String::new();
				loop {
					match chars.next() {
						Some(c) if c == quote => {
							// a quote only closes the token if whitespace (or nothing) follows
							if chars.peek().map_or(true, |c| c.is_whitespace()) {
								break;
							}
							token.push(c);
						}
						Some(c) => token.push(c),
						None => return Err(format!("unterminated quote in: {}", line))
					}
				}
				tokens.push(Token::quoted(token));
			}

			_ => {
				let mut token = String::new();
				while let Some(&c) = chars.peek() {
					if c.is_whitespace() {
						break;
					}
					token.push(c);
					chars.next();
				}
				tokens.push(Token::bare(token));
			}
		}
	}

	Ok(tokens)
}
