//! Saves one or more body parts to disk. Grounded on `recvattach.c`'s
//! `mutt_save_attachment_list` / `query_save_attachment` / `prepend_curdir`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::body::{BodyId, BodyTree};
use crate::collab::{ConflictResolver, MailboxStore, Resolution};

/// Leading characters that neomutt treats as shell-special when a user
/// types a save path, so it prepends `./` to keep them literal.
const SIGIL_CHARS: &[char] = &['~', '=', '+', '@', '<', '>', '!', '-', '^'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
	/// Each tagged part saved to its own derived filename.
	Split,
	/// All tagged parts appended, in order, into one destination file.
	Concatenated,
}

pub struct SaveEngine;

#[derive(Debug, Default)]
pub struct SaveReport {
	pub saved: Vec<PathBuf>,
	pub skipped: Vec<BodyId>,
}

impl SaveEngine {
	/// Prepends `./` to a user-entered path whose first character would
	/// otherwise be taken as a shell sigil.
	pub fn prepend_curdir(path: &str) -> String {
		match path.chars().next() {
			Some(c) if SIGIL_CHARS.contains(&c) => format!("./{}", path),
			_ => path.to_owned(),
		}
	}

	/// Default filename for a part: its own `filename` first; failing
	/// that, for an embedded `message/*` part whose encoding isn't base64
	/// or quoted-printable, its header-derived default; otherwise empty.
	/// Mirrors `query_save_attachment`'s `buf[0] = 0` fallback exactly —
	/// not a fabricated placeholder name.
	pub fn default_filename(tree: &BodyTree, body: BodyId) -> String {
		let b = tree.get(body);
		if let Some(filename) = &b.filename {
			return filename.clone();
		}
		if !b.encoding.is_base64_or_qp() && b.is_message_type() {
			if let Some(subject) = b.hdr.as_ref().and_then(|h| h.subject.as_deref()).filter(|s| !s.is_empty()) {
				return subject.to_owned();
			}
		}
		String::new()
	}

	/// Saves `bodies` (already tag-ordered) to `dest`, either splitting
	/// one file per part (each part gets its own name under `dest` when
	/// `dest` is a directory, or `dest` itself if saving a single part)
	/// or concatenating all parts into `dest`, writing `separator`
	/// between parts (when non-empty) as each one is appended.
	///
	/// Preserves the original's quirk: in concatenated mode, only the
	/// *first* part's existence at `dest` triggers the conflict prompt;
	/// subsequent parts are appended unconditionally even if `dest` did
	/// not exist before this call started. This matches
	/// `mutt_save_attachment_list`'s single `tfile` buffer, which is
	/// resolved (and conflict-checked) once before the loop and then
	/// reused verbatim for every tagged part.
	pub fn save(
		mailbox: &dyn MailboxStore,
		tree: &BodyTree,
		bodies: &[BodyId],
		dest: &Path,
		mode: SaveMode,
		resolver: &mut dyn ConflictResolver,
		separator: &str,
	) -> Result<SaveReport> {
		let mut report = SaveReport::default();

		match mode {
			SaveMode::Split => {
				for &body in bodies {
					let path = if bodies.len() == 1 && !dest.is_dir() {
						dest.to_path_buf()
					} else {
						dest.join(Self::default_filename(tree, body))
					};
					match Self::resolve_conflict(&path, resolver)? {
						Some((final_path, append)) => {
							Self::write_one(mailbox, tree, body, &final_path, append, "")?;
							report.saved.push(final_path);
						}
						None => report.skipped.push(body),
					}
				}
			}
			SaveMode::Concatenated => {
				let tfile = dest.to_path_buf();
				let (final_path, append_first) = match Self::resolve_conflict(&tfile, resolver)? {
					Some(resolved) => resolved,
					None => {
						report.skipped.extend(bodies.iter().copied());
						return Ok(report);
					}
				};
				for (i, &body) in bodies.iter().enumerate() {
					let sep = if i > 0 { separator } else { "" };
					Self::write_one(mailbox, tree, body, &final_path, append_first || i > 0, sep)?;
				}
				report.saved.push(final_path);
			}
		}

		Ok(report)
	}

	/// Resolves a potential conflict at `path`, returning the path to
	/// write to and whether to append rather than truncate. `Append`
	/// (§4.4's conflict-resolver contract: `{OK, reprompt, cancel,
	/// append-selected}`) lets the user add to a pre-existing file instead
	/// of being limited to overwrite-or-rename.
	fn resolve_conflict(path: &Path, resolver: &mut dyn ConflictResolver) -> Result<Option<(PathBuf, bool)>> {
		if !path.exists() {
			return Ok(Some((path.to_path_buf(), false)));
		}
		match resolver.resolve(path) {
			Resolution::Overwrite => Ok(Some((path.to_path_buf(), false))),
			Resolution::Append => Ok(Some((path.to_path_buf(), true))),
			Resolution::Skip => Ok(None),
			Resolution::RenameTo(new_path) => Ok(Some((new_path, false))),
		}
	}

	fn write_one(mailbox: &dyn MailboxStore, tree: &BodyTree, body: BodyId, path: &Path, append: bool, separator: &str) -> Result<()> {
		let bytes = mailbox.read_body(tree, body, false).with_context(|| format!("reading body for {:?}", body))?;
		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.append(append)
			.truncate(!append)
			.open(path)
			.with_context(|| format!("opening {}", path.display()))?;
		if !separator.is_empty() {
			file.write_all(separator.as_bytes())?;
		}
		file.write_all(&bytes)?;
		Ok(())
	}
}
