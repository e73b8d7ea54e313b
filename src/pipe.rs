//! Pipes one or more body parts to an external command. Grounded on
//! `recvattach.c`'s `mutt_pipe_attachment_list` / `pipe_attachment_list` /
//! `query_pipe_attachment`.

use anyhow::{Context, Result};
use itertools::Itertools;

use crate::body::{BodyId, BodyTree, Encoding};
use crate::collab::{MailboxStore, Prompter, ProcessRunner, QuadAnswer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMode {
	/// Each tagged part piped through its own invocation of `command`.
	Split,
	/// All tagged parts concatenated and piped through one invocation.
	Concatenated,
}

pub struct PipeEngine;

#[derive(Debug, Default)]
pub struct PipeReport {
	/// Captured stdout per invocation, in the same order the parts were
	/// piped. One entry per part when filtering (each part is its own
	/// invocation); empty otherwise.
	pub outputs: Vec<Vec<u8>>,
}

impl PipeEngine {
	/// Pipes `bodies` through `command` via `runner`. When `filter` is
	/// true, `command`'s stdout replaces each part's own backing bytes in
	/// place (mirrors `mutt_pipe_attachment_list`'s `filter` parameter):
	/// since a filter operates on one part's content at a time, `mode` is
	/// forced to `Split` regardless of what the caller (or the `split`
	/// config option) requested, and the user is asked to confirm the
	/// overwrite before each part is replaced. In plain pipe-to-program
	/// mode (`filter` false), `Concatenated` joins all tagged parts with
	/// `separator` (when non-empty) and spawns `command` once, same as the
	/// save and print batching paths.
	pub fn pipe(
		mailbox: &mut dyn MailboxStore,
		tree: &mut BodyTree,
		bodies: &[BodyId],
		command: &str,
		mode: PipeMode,
		filter: bool,
		separator: &str,
		prompter: &mut dyn Prompter,
		runner: &dyn ProcessRunner,
	) -> Result<PipeReport> {
		let mode = if filter { PipeMode::Split } else { mode };
		let mut report = PipeReport::default();

		match mode {
			PipeMode::Split => {
				for &body in bodies {
					if filter {
						if let Some(filtered) = Self::filter_one(mailbox, tree, body, command, prompter, runner)? {
							report.outputs.push(filtered);
						}
					} else {
						let bytes = Self::read(mailbox, tree, body)?;
						runner.run_sink(command, &bytes)?;
					}
				}
			}
			PipeMode::Concatenated => {
				let combined = Self::join(mailbox, tree, bodies, separator)?;
				runner.run_sink(command, &combined)?;
			}
		}

		Ok(report)
	}

	/// Runs `command` over one part's bytes and, if the user confirms,
	/// writes the filtered output back over the part's backing file,
	/// refreshing `encoding`/`file_path`/`length` and marking the mailbox
	/// changed. Returns `None` if the user declined the overwrite.
	fn filter_one(
		mailbox: &mut dyn MailboxStore,
		tree: &mut BodyTree,
		body: BodyId,
		command: &str,
		prompter: &mut dyn Prompter,
		runner: &dyn ProcessRunner,
	) -> Result<Option<Vec<u8>>> {
		let name = Self::display_name(tree, body);
		if prompter.ask_yes_no(&format!("Overwrite {}?", name), true) != QuadAnswer::Yes {
			return Ok(None);
		}

		let bytes = Self::read(&*mailbox, &*tree, body)?;
		let filtered = runner.run_filter(command, &bytes)?;
		let path = mailbox.write_body(tree, body, &filtered)?;

		let b = tree.get_mut(body);
		b.encoding = Self::infer_encoding(&filtered);
		b.file_path = Some(path);
		b.length = filtered.len() as u64;

		mailbox.mark_changed()?;
		Ok(Some(filtered))
	}

	fn display_name(tree: &BodyTree, body: BodyId) -> String {
		let b = tree.get(body);
		b.filename.clone().or_else(|| b.d_filename.clone()).unwrap_or_else(|| b.mimetype())
	}

	/// Refreshes the encoding after a filter rewrites a part's content:
	/// all-ASCII output stays `7bit`, anything else becomes `8bit` (the
	/// filter is assumed to produce text or binary, never quoted-printable
	/// or base64 framing of its own).
	fn infer_encoding(bytes: &[u8]) -> Encoding {
		if bytes.iter().all(|&b| b.is_ascii()) {
			Encoding::SevenBit
		} else {
			Encoding::EightBit
		}
	}

	fn join(mailbox: &dyn MailboxStore, tree: &BodyTree, bodies: &[BodyId], separator: &str) -> Result<Vec<u8>> {
		let parts = bodies.iter().map(|&body| Self::read(mailbox, tree, body)).collect::<Result<Vec<_>>>()?;
		Ok(if separator.is_empty() {
			parts.into_iter().flatten().collect()
		} else {
			parts.into_iter().intersperse(separator.as_bytes().to_vec()).flatten().collect()
		})
	}

	fn read(mailbox: &dyn MailboxStore, tree: &BodyTree, body: BodyId) -> Result<Vec<u8>> {
		mailbox.read_body(tree, body, false).with_context(|| format!("reading body for {:?}", body))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::body::{Body, ContentType};
	use crate::collab::fakes::{FakeMailbox, RecordingRunner, ScriptedPrompter};

	#[test]
	fn split_plain_pipe_runs_command_once_per_part() {
		let mut tree = BodyTree::new();
		let a = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let b = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let mut mailbox = FakeMailbox::default();
		mailbox.bytes.insert(a, b"foo\n".to_vec());
		mailbox.bytes.insert(b, b"bar\n".to_vec());

		let runner = RecordingRunner::default();
		let mut prompter = ScriptedPrompter::new(vec![]);
		let report = PipeEngine::pipe(
			&mut mailbox,
			&mut tree,
			&[a, b],
			"cat",
			PipeMode::Split,
			false,
			"",
			&mut prompter,
			&runner,
		)
		.unwrap();

		assert!(report.outputs.is_empty());
		let calls = runner.sink_calls.borrow();
		assert_eq!(*calls, vec![("cat".to_owned(), b"foo\n".to_vec()), ("cat".to_owned(), b"bar\n".to_vec())]);
	}

	#[test]
	fn concatenated_pipe_joins_parts_before_invocation() {
		let mut tree = BodyTree::new();
		let a = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let b = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let mut mailbox = FakeMailbox::default();
		mailbox.bytes.insert(a, b"foo".to_vec());
		mailbox.bytes.insert(b, b"bar".to_vec());

		let runner = RecordingRunner::default();
		let mut prompter = ScriptedPrompter::new(vec![]);
		PipeEngine::pipe(
			&mut mailbox,
			&mut tree,
			&[a, b],
			"cat",
			PipeMode::Concatenated,
			false,
			"",
			&mut prompter,
			&runner,
		)
		.unwrap();

		assert_eq!(*runner.sink_calls.borrow(), vec![("cat".to_owned(), b"foobar".to_vec())]);
	}

	#[test]
	fn concatenated_pipe_inserts_separator_between_parts() {
		let mut tree = BodyTree::new();
		let a = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let b = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let mut mailbox = FakeMailbox::default();
		mailbox.bytes.insert(a, b"foo".to_vec());
		mailbox.bytes.insert(b, b"bar".to_vec());

		let runner = RecordingRunner::default();
		let mut prompter = ScriptedPrompter::new(vec![]);
		PipeEngine::pipe(
			&mut mailbox,
			&mut tree,
			&[a, b],
			"cat",
			PipeMode::Concatenated,
			false,
			"|",
			&mut prompter,
			&runner,
		)
		.unwrap();

		assert_eq!(*runner.sink_calls.borrow(), vec![("cat".to_owned(), b"foo|bar".to_vec())]);
	}

	#[test]
	fn filter_writes_filtered_bytes_back_to_the_body_and_refreshes_encoding() {
		let mut tree = BodyTree::new();
		let a = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		tree.get_mut(a).encoding = Encoding::Base64;
		let mut mailbox = FakeMailbox::default();
		mailbox.bytes.insert(a, b"Zm9v\n".to_vec());

		let runner = RecordingRunner { filter_response: b"FOO\n".to_vec(), ..Default::default() };
		let mut prompter = ScriptedPrompter::new(vec![]);
		let report =
			PipeEngine::pipe(&mut mailbox, &mut tree, &[a], "tr a-z A-Z", PipeMode::Split, true, "", &mut prompter, &runner)
				.unwrap();

		assert_eq!(report.outputs, vec![b"FOO\n".to_vec()]);
		assert_eq!(mailbox.bytes.get(&a).unwrap(), b"FOO\n");
		assert_eq!(tree.get(a).encoding, Encoding::SevenBit);
		assert_eq!(tree.get(a).length, 4);
		assert!(tree.get(a).file_path.is_some());
		assert!(mailbox.changed);
	}

	#[test]
	fn filter_is_forced_to_split_even_when_mode_is_concatenated() {
		let mut tree = BodyTree::new();
		let a = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let b = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let mut mailbox = FakeMailbox::default();
		mailbox.bytes.insert(a, b"foo".to_vec());
		mailbox.bytes.insert(b, b"bar".to_vec());

		let runner = RecordingRunner { filter_response: b"X".to_vec(), ..Default::default() };
		let mut prompter = ScriptedPrompter::new(vec![]);
		PipeEngine::pipe(
			&mut mailbox,
			&mut tree,
			&[a, b],
			"cat",
			PipeMode::Concatenated,
			true,
			"",
			&mut prompter,
			&runner,
		)
		.unwrap();

		// One invocation per part, not one combined invocation.
		assert_eq!(runner.filter_calls.borrow().len(), 2);
		assert_eq!(mailbox.bytes.get(&a).unwrap(), b"X");
		assert_eq!(mailbox.bytes.get(&b).unwrap(), b"X");
	}

	#[test]
	fn declining_the_overwrite_prompt_leaves_the_part_untouched() {
		let mut tree = BodyTree::new();
		let a = tree.add_root(Body::leaf(ContentType::Text, "plain"));
		let mut mailbox = FakeMailbox::default();
		mailbox.bytes.insert(a, b"foo".to_vec());

		let runner = RecordingRunner { filter_response: b"FOO".to_vec(), ..Default::default() };
		let mut prompter = ScriptedPrompter::new(vec![QuadAnswer::No]);
		let report =
			PipeEngine::pipe(&mut mailbox, &mut tree, &[a], "tr a-z A-Z", PipeMode::Split, true, "", &mut prompter, &runner)
				.unwrap();

		assert!(report.outputs.is_empty());
		assert_eq!(mailbox.bytes.get(&a).unwrap(), b"foo");
		assert!(runner.filter_calls.borrow().is_empty());
		assert!(!mailbox.changed);
	}
}
