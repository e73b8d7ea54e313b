//! Batched printing of tagged parts. Grounded on `recvattach.c`'s
//! `can_print` / `print_attachment_list` / `mutt_print_attachment_list`.

use std::io::Write;

use anyhow::{Context, Result};

use crate::body::{BodyId, BodyTree};
use crate::collab::{MailboxStore, MailcapLookup, ProcessRunner};

pub struct PrintEngine;

/// A part that failed [`PrintEngine::can_print`], for reporting which
/// attachment blocked a batch.
#[derive(Debug, Clone, Copy)]
pub struct NotPrintable(pub BodyId);

impl PrintEngine {
	/// Whether `body` can be handled by the batched print path: a mailcap
	/// print entry exists, or it's `text/plain`/`application/postscript`,
	/// or it's otherwise decodable (text or one of the two binary-safe
	/// transfer encodings).
	///
	/// Unlike the original `can_print`, this never returns early once a
	/// multipart's first untagged child fails the check — callers run it
	/// over every tagged leaf independently, so one unprintable sibling
	/// can never hide a later, printable one.
	fn leaf_can_print(tree: &BodyTree, body: BodyId, mailcap: &dyn MailcapLookup) -> bool {
		let b = tree.get(body);
		let mimetype = b.mimetype();
		if mailcap.print_command(&mimetype).is_some() {
			return true;
		}
		if mimetype.eq_ignore_ascii_case("text/plain") || mimetype.eq_ignore_ascii_case("application/postscript") {
			return true;
		}
		b.ctype == crate::body::ContentType::Text || b.encoding.is_base64_or_qp()
	}

	/// Checks every part in `bodies` (already flattened to individual,
	/// non-multipart leaves by the caller) and returns the first that
	/// fails, if any. Checking continues across the whole set rather than
	/// stopping at the first multipart's first child.
	pub fn can_print(tree: &BodyTree, bodies: &[BodyId], mailcap: &dyn MailcapLookup) -> Option<NotPrintable> {
		bodies.iter().find(|&&b| !Self::leaf_can_print(tree, b, mailcap)).map(|&b| NotPrintable(b))
	}

	/// Streams every part in `bodies` into one invocation of the
	/// configured print command, decoding non-raw-safe parts to a temp
	/// file first and emitting `separator` between parts.
	pub fn print_batch(
		mailbox: &dyn MailboxStore,
		tree: &BodyTree,
		bodies: &[BodyId],
		print_command: &str,
		separator: &str,
		runner: &dyn ProcessRunner,
	) -> Result<()> {
		let mut payload = Vec::new();
		for (i, &body) in bodies.iter().enumerate() {
			if i > 0 {
				payload.extend_from_slice(separator.as_bytes());
			}
			let bytes = mailbox.read_body(tree, body, false).with_context(|| format!("reading body for {:?}", body))?;
			let mimetype = tree.get(body).mimetype();
			payload.extend(Self::prepare_for_pipe(&bytes, &mimetype)?);
		}
		runner.run_sink(print_command, &payload)
	}

	/// `text/plain` and `application/postscript` are fed to the print
	/// pipe as-is. Everything else goes through a scratch file first —
	/// the original routes these through `mutt_decode_save_attachment`,
	/// which always materializes a file; this reproduces that by
	/// round-tripping through a `tempfile` named with the extension
	/// `mime2ext` derives from the part's MIME type, same as the
	/// teacher's own `AwaitingSave` "open" handler in `src/bin/list.rs`.
	fn prepare_for_pipe(bytes: &[u8], mimetype: &str) -> Result<Vec<u8>> {
		if mimetype.eq_ignore_ascii_case("text/plain") || mimetype.eq_ignore_ascii_case("application/postscript") {
			return Ok(bytes.to_vec());
		}
		let suffix = mime2ext::mime2ext(mimetype).map(|ext| format!(".{}", ext)).unwrap_or_default();
		let mut tmp = tempfile::Builder::new().suffix(&suffix).tempfile().context("creating print scratch file")?;
		tmp.write_all(bytes)?;
		tmp.flush()?;
		std::fs::read(tmp.path()).context("reading back print scratch file")
	}

	/// Delegates one part to the mailcap print entry for its MIME type,
	/// decoding to a temp file first since most print commands expect a
	/// file path or take input on stdin, not an argv-embedded blob.
	pub fn print_one(
		mailbox: &dyn MailboxStore,
		tree: &BodyTree,
		body: BodyId,
		mailcap: &dyn MailcapLookup,
		runner: &dyn ProcessRunner,
	) -> Result<()> {
		let mimetype = tree.get(body).mimetype();
		let command = mailcap
			.print_command(&mimetype)
			.ok_or_else(|| anyhow::anyhow!("no mailcap print entry for {}", mimetype))?;
		let bytes = mailbox.read_body(tree, body, false)?;
		runner.run_sink(&command, &bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::body::{Body, ContentType};
	use crate::collab::fakes::{FakeMailbox, FakeMailcap, ShellRunner};

	#[test]
	fn can_print_checks_every_sibling_not_just_the_first() {
		let mut tree = BodyTree::new();
		let plain = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let binary = tree.add_root(Body::leaf(ContentType::Application, "octet-stream"));
		let mailcap = FakeMailcap::default();

		let failure = PrintEngine::can_print(&tree, &[plain, binary], &mailcap);
		assert!(matches!(failure, Some(NotPrintable(id)) if id == binary));

		// Reordering doesn't change which one is reported unprintable.
		let failure = PrintEngine::can_print(&tree, &[binary, plain], &mailcap);
		assert!(matches!(failure, Some(NotPrintable(id)) if id == binary));
	}

	#[test]
	fn mailcap_entry_makes_an_otherwise_unprintable_type_printable() {
		let mut tree = BodyTree::new();
		let pdf = tree.add_root(Body::leaf(ContentType::Application, "pdf"));
		let mut mailcap = FakeMailcap::default();
		mailcap.print.insert("application/pdf".to_owned(), "lp".to_owned());

		assert!(PrintEngine::can_print(&tree, &[pdf], &mailcap).is_none());
	}

	#[test]
	fn print_batch_joins_parts_with_separator() {
		let mut tree = BodyTree::new();
		let a = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let b = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let mut mailbox = FakeMailbox::default();
		mailbox.bytes.insert(a, b"foo".to_vec());
		mailbox.bytes.insert(b, b"bar".to_vec());

		let runner = ShellRunner;
		PrintEngine::print_batch(&mailbox, &tree, &[a, b], "cat > /dev/null", "---\n", &runner).unwrap();
	}

	#[test]
	fn prepare_for_pipe_passes_text_plain_through_untouched() {
		let out = PrintEngine::prepare_for_pipe(b"hello", "text/plain").unwrap();
		assert_eq!(out, b"hello");
	}

	#[test]
	fn prepare_for_pipe_round_trips_other_types_through_a_scratch_file() {
		let out = PrintEngine::prepare_for_pipe(b"%PDF-1.4 ...", "application/pdf").unwrap();
		assert_eq!(out, b"%PDF-1.4 ...");
	}
}
