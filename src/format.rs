//! Expands an attach-format template over the field table in spec §4.2.
//! Grounded on `recvattach.c`'s `mutt_attach_fmt`.

use std::path::Path;

use crate::body::{BodyTree, Disposition};
use crate::entry::Entry;

/// Only one flag exists in the original (`MUTT_FORMAT_STAT_FILE`); kept as a
/// tiny flag set rather than a bare bool so new rendering modes can be added
/// without changing every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatFlags(u8);

impl FormatFlags {
	pub const STAT_FILE: FormatFlags = FormatFlags(0b0000_0001);

	pub fn empty() -> Self {
		FormatFlags(0)
	}

	pub fn contains(&self, other: FormatFlags) -> bool {
		self.0 & other.0 == other.0
	}
}

impl std::ops::BitOr for FormatFlags {
	type Output = FormatFlags;
	fn bitor(self, rhs: FormatFlags) -> FormatFlags {
		FormatFlags(self.0 | rhs.0)
	}
}

/// Formats one entry's display line from `template`.
pub struct EntryFormatter<'a> {
	pub tree: &'a BodyTree,
	pub home_dir: Option<&'a Path>,
	pub flags: FormatFlags,
}

impl<'a> EntryFormatter<'a> {
	pub fn new(tree: &'a BodyTree) -> Self {
		EntryFormatter { tree, home_dir: None, flags: FormatFlags::empty() }
	}

	pub fn format(&self, template: &str, entry: &Entry) -> String {
		let mut out = String::new();
		self.expand(template, entry, &mut out);
		out
	}

	fn expand(&self, template: &str, entry: &Entry, out: &mut String) {
		let mut chars = template.chars().peekable();
		while let Some(c) = chars.next() {
			if c != '%' {
				out.push(c);
				continue;
			}
			match chars.next() {
				Some('%') => out.push('%'),
				Some('?') => {
					// %?X?then&else?
					let code = chars.next();
					if chars.peek() != Some(&'?') {
						continue;
					}
					chars.next();
					let then_branch = Self::take_until(&mut chars, '&');
					let else_branch = Self::take_until(&mut chars, '?');
					if let Some(code) = code {
						if self.is_optional_true(code, entry) {
							self.expand(&then_branch, entry, out);
						} else {
							self.expand(&else_branch, entry, out);
						}
					}
				}
				Some(code) => out.push_str(&self.render(code, entry)),
				None => out.push('%'),
			}
		}
	}

	fn take_until(chars: &mut std::iter::Peekable<std::str::Chars>, stop: char) -> String {
		let mut s = String::new();
		while let Some(&c) = chars.peek() {
			if c == stop {
				chars.next();
				break;
			}
			s.push(c);
			chars.next();
		}
		s
	}

	/// The "optional" predicate for `%?X?then&else?`: whether the THEN
	/// branch would be taken, mirroring each `case` arm's `if (optional)`
	/// half in the original.
	fn is_optional_true(&self, code: char, entry: &Entry) -> bool {
		let body = self.tree.get(entry.body);
		match code {
			'C' => self.charset(entry).is_some(),
			'c' => body.ctype == crate::body::ContentType::Text && !body.noconv,
			'd' => body.description.is_some() || self.message_subject(entry).is_some(),
			'D' => body.deleted,
			'F' => body.d_filename.is_some() || body.filename.is_some(),
			'f' => body.filename.is_some(),
			'M' => true,
			'Q' => body.attach_qualifies,
			's' => self.size(entry) != 0,
			't' => body.tagged,
			'T' => !entry.tree_glyphs.is_empty(),
			'u' => body.unlink,
			'X' => (body.attach_count + body.attach_qualifies as u32) != 0,
			_ => true,
		}
	}

	fn charset(&self, entry: &Entry) -> Option<&str> {
		let body = self.tree.get(entry.body);
		if body.ctype == crate::body::ContentType::Text {
			body.charset.as_deref()
		} else {
			None
		}
	}

	fn message_subject(&self, entry: &Entry) -> Option<&str> {
		let body = self.tree.get(entry.body);
		if body.is_message_type() {
			body.hdr.as_ref().and_then(|h| h.subject.as_deref()).filter(|s| !s.is_empty())
		} else {
			None
		}
	}

	fn relativize(&self, path: &str) -> String {
		if let (true, Some(home)) = (path.starts_with('/'), self.home_dir) {
			if let Ok(rel) = Path::new(path).strip_prefix(home) {
				return format!("~/{}", rel.display());
			}
		}
		path.to_owned()
	}

	fn size(&self, entry: &Entry) -> u64 {
		let body = self.tree.get(entry.body);
		if self.flags.contains(FormatFlags::STAT_FILE) {
			body
				.file_path
				.as_ref()
				.and_then(|p| std::fs::metadata(p).ok())
				.map(|m| m.len())
				.unwrap_or(0)
		} else {
			body.length
		}
	}

	fn render(&self, code: char, entry: &Entry) -> String {
		let body = self.tree.get(entry.body);
		match code {
			'C' => self.charset(entry).unwrap_or("").to_owned(),
			'c' => if body.ctype == crate::body::ContentType::Text && !body.noconv { "c" } else { "n" }.to_owned(),
			'D' => if body.deleted { "D" } else { " " }.to_owned(),
			// d -> F -> f fallthrough, tabulated explicitly as an ordered
			// list of candidates rather than C-style `break` fallthrough.
			'd' | 'F' | 'f' => self.filename_chain(code, entry),
			'e' => body.encoding.name().to_owned(),
			'I' => body.disposition.display_char().to_string(),
			'm' => body.ctype.name().to_owned(),
			'M' => body.subtype.clone(),
			'n' => (entry.index + 1).to_string(),
			'Q' => if body.attach_qualifies { "Q" } else { "" }.to_owned(),
			's' => pretty_size(self.size(entry)),
			't' => if body.tagged { "*" } else { " " }.to_owned(),
			'T' => entry.tree_glyphs.clone(),
			'u' => if body.unlink { "-" } else { " " }.to_owned(),
			'X' => (body.attach_count + body.attach_qualifies as u32).to_string(),
			_ => String::new(),
		}
	}

	/// Implements the `d -> F -> f` chain explicitly: try `description`
	/// (or, for `message/*`, the embedded subject) for `%d`; otherwise
	/// (and always for `%F`) try `d_filename`; otherwise (and always for
	/// `%f`) try `filename`, home-relativized if absolute.
	fn filename_chain(&self, code: char, entry: &Entry) -> String {
		let body = self.tree.get(entry.body);

		if code == 'd' {
			if let Some(desc) = body.description.as_deref() {
				return desc.to_owned();
			}
			if let Some(subject) = self.message_subject(entry) {
				return subject.to_owned();
			}
			if body.d_filename.is_none() && body.filename.is_none() {
				return "<no description>".to_owned();
			}
		}

		if code == 'd' || code == 'F' {
			if let Some(d_filename) = body.d_filename.as_deref() {
				return d_filename.to_owned();
			}
		}

		match body.filename.as_deref() {
			Some(f) => self.relativize(f),
			None => String::new(),
		}
	}
}

fn pretty_size(bytes: u64) -> String {
	const UNITS: &[&str] = &["", "K", "M", "G"];
	let mut size = bytes as f64;
	let mut unit = 0;
	while size >= 1024.0 && unit < UNITS.len() - 1 {
		size /= 1024.0;
		unit += 1;
	}
	if unit == 0 {
		format!("{}", bytes)
	} else {
		format!("{:.1}{}", size, UNITS[unit])
	}
}
