//! pgvector text codec.
//!
//! Rust prints each `f32` in its shortest round-trip form, and pgvector stores single precision,
//! so a vector written with [`format_vector_text`] reads back bit-identical through `vec::text`.

use crate::{Error, Result};

pub fn format_vector_text(vec: &[f32]) -> String {
	let mut out = String::from("[");

	for (idx, value) in vec.iter().enumerate() {
		if idx > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub fn parse_vector_text(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets = trimmed
		.strip_prefix('[')
		.and_then(|inner| inner.strip_suffix(']'))
		.ok_or_else(|| Error::MalformedVector("Vector text is not bracketed.".to_string()))?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	without_brackets
		.split(',')
		.map(|part| {
			part.trim().parse::<f32>().map_err(|_| {
				Error::MalformedVector(format!("Vector text contains a non-numeric value {part:?}."))
			})
		})
		.collect()
}
