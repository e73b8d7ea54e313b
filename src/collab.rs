//! External-collaborator seams: everything this crate needs from the
//! surrounding mail client but does not implement itself (mailbox storage,
//! mailcap lookup, decoding, viewing, prompting, process spawning). Mirrors
//! the teacher's pattern of thin traits over externally-owned data
//! (`MailExtension`, `MaildirExtension` in its `lib.rs`).

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::body::{Body, BodyId, BodyTree};

/// Read/write access to the backing mailbox, standing in for the parser and
/// on-disk message store.
pub trait MailboxStore {
	/// Raw bytes for one body part, decoded per its `Encoding` unless
	/// `raw` is set (mirrors `mutt_decode_save_attachment`'s `flags`).
	fn read_body(&self, tree: &BodyTree, body: BodyId, raw: bool) -> Result<Vec<u8>>;

	/// Overwrites the on-disk bytes backing `body` with `bytes`, used by
	/// the pipe engine's in-place filter operation, and returns the path
	/// they now live at.
	fn write_body(&mut self, tree: &BodyTree, body: BodyId, bytes: &[u8]) -> Result<PathBuf>;

	/// Marks the owning message dirty/changed so the caller persists it
	/// (`CHECK_READONLY` sites flip flags the mailbox later writes out).
	fn mark_changed(&mut self) -> Result<()>;
}

/// Looks up how to handle a MIME type, standing in for a mailcap file.
pub trait MailcapLookup {
	fn view_command(&self, mimetype: &str) -> Option<String>;
	fn print_command(&self, mimetype: &str) -> Option<String>;
	/// Whether the mailcap entry requests "copiousoutput" (paginate through
	/// the pager rather than exec'ing an interactive viewer).
	fn copiousoutput(&self, mimetype: &str) -> bool;
}

/// Displays content to the user, standing in for the pager/terminal.
pub trait Viewer {
	fn display_text(&mut self, text: &str) -> Result<()>;
	fn run_interactive(&mut self, command: &str, file: &Path) -> Result<()>;
}

/// The answer to "this would overwrite an existing file": overwrite,
/// append to it, skip it, or rename to a different path. Mirrors
/// `mutt_save_attachment`'s interactive overwrite/append/rename prompt.
pub enum Resolution {
	Overwrite,
	Append,
	Skip,
	RenameTo(PathBuf),
}

pub trait ConflictResolver {
	fn resolve(&mut self, existing: &Path) -> Resolution;
}

/// Yes/no/cancel prompts and the quad-option "yes/no/always" family used
/// throughout the original (`query_quadoption`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadAnswer {
	Yes,
	No,
	Cancel,
}

pub trait Prompter {
	fn ask_yes_no(&mut self, prompt: &str, default_yes: bool) -> QuadAnswer;
	fn ask_text(&mut self, prompt: &str, default: &str) -> Option<String>;
}

/// Spawns an external command, standing in for `subprocess::Popen`
/// directly so the core logic stays host-agnostic for tests.
pub trait ProcessRunner {
	/// Runs `command` through the shell with `stdin` piped to it and
	/// captures stdout; used for pipe-to-filter.
	fn run_filter(&self, command: &str, stdin: &[u8]) -> Result<Vec<u8>>;

	/// Runs `command` through the shell with `stdin` piped to it and no
	/// captured output; used for pipe-to-program and print.
	fn run_sink(&self, command: &str, stdin: &[u8]) -> Result<()>;
}

/// Supplies the next operation while a single entry is being displayed,
/// standing in for the menu layer's `mutt_menu_loop`/`km_dokey` pump that
/// `mutt_attach_display_loop` calls back into.
pub trait OpSource {
	fn next_view_op(&mut self) -> crate::view_loop::Op;
}

/// Real process spawner, grounded in the teacher's own
/// `subprocess::Popen::create` usage in `src/bin/list.rs` for spawning
/// `xdg-open`: here the same crate spawns the user's pipe/print command
/// through a shell, with stdio piped instead of inherited.
pub struct SubprocessRunner;

impl ProcessRunner for SubprocessRunner {
	fn run_filter(&self, command: &str, stdin: &[u8]) -> Result<Vec<u8>> {
		use subprocess::{Popen, PopenConfig, Redirection};
		let mut p = Popen::create(
			&["sh", "-c", command],
			PopenConfig { stdin: Redirection::Pipe, stdout: Redirection::Pipe, ..Default::default() },
		)?;
		let (out, _err) = p.communicate_bytes(Some(stdin))?;
		p.wait()?;
		Ok(out.unwrap_or_default())
	}

	fn run_sink(&self, command: &str, stdin: &[u8]) -> Result<()> {
		use subprocess::{Popen, PopenConfig, Redirection};
		let mut p = Popen::create(&["sh", "-c", command], PopenConfig { stdin: Redirection::Pipe, ..Default::default() })?;
		p.communicate_bytes(Some(stdin))?;
		p.wait()?;
		Ok(())
	}
}
