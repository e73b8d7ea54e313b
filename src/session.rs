//! Top-level session state and operation dispatch, grounded on
//! `recvattach.c`'s `mutt_view_attachments` / `update_attach_index` /
//! `mutt_attach_init`.

use std::path::PathBuf;

use log::{info, warn};

use crate::body::{BodyId, BodyTree};
use crate::collab::{ConflictResolver, MailboxStore, MailcapLookup, OpSource, Prompter, ProcessRunner, QuadAnswer, Viewer};
use crate::collapse::CollapseEngine;
use crate::config::{AttachConfig, QuadOption};
use crate::crypto::{CryptoEngine, CryptoUnwrap, SecurityFlags, Source, UnwrapOutcome};
use crate::entry::EntryList;
use crate::flatten::TreeFlattener;
use crate::pipe::{PipeEngine, PipeMode};
use crate::print::{NotPrintable, PrintEngine};
use crate::save::{SaveEngine, SaveMode};
use crate::view_loop::{self, ViewLoop, ViewLoopExit};

/// Which backend the open mailbox uses; gates the `DELETE` op's
/// protocol-specific refusals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxKind {
	Maildir,
	Imap,
	Pop,
	Nntp,
}

/// Minimal message header, carrying only what the attachment browser
/// itself needs to read or mutate.
#[derive(Debug, Clone, Default)]
pub struct Header {
	pub security: SecurityFlags,
	pub changed: bool,
	pub attach_del: bool,
	pub subject: Option<String>,
}

/// The full operation set the outer dispatch loop accepts. Distinct from
/// [`crate::view_loop::Op`]: this is the session-level table in §4.8,
/// some of whose members (`ViewAttach`, `DisplayHeaders`) simply enter
/// the inner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
	AttachViewMailcap,
	AttachViewText,
	DisplayHeaders,
	ViewAttach,
	AttachCollapse,
	ForgetPassphrase,
	ExtractKeys,
	CheckTraditional,
	Print,
	/// Pipe to a command; `true` selects the in-place filter variant
	/// (`mutt_pipe_attachment_list`'s `filter` flag), `false` the plain
	/// pipe-to-program variant.
	Pipe(bool),
	Save,
	Delete,
	Undelete,
	Send(SendKind),
	EditType,
	Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
	Resend,
	Bounce,
	Forward,
	ForwardToGroup,
	Followup,
	Reply,
	GroupReply,
	ListReply,
}

/// A non-fatal, user-visible result of one operation (§7 kinds 1/2/4/5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
	Ok,
	Message(&'static str),
	Formatted(String),
}

/// Fatal session-level failure (§7 kind 3): crypto failure on entry.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
	#[error("Can't decrypt encrypted message!")]
	DecryptFailed,
}

pub struct Session {
	pub header: Header,
	pub tree: BodyTree,
	pub view_root: BodyId,
	/// Present iff decryption produced an owned, separate tree; released
	/// on exit alongside `tree`/`view_root` being dropped.
	pub decrypted_source: Option<Source>,
	pub entries: EntryList,
	pub cursor: usize,
	pub tag_prefix: bool,
	pub attach_message_mode: bool,
	pub weed: bool,
}

/// Bundles every external collaborator §1/§6 names, plus the injected
/// config record, so [`SessionController::dispatch`] doesn't need a
/// dozen separate parameters. Borrowed fresh for each call; nothing here
/// outlives one dispatch.
pub struct Collaborators<'a> {
	pub mailbox: &'a mut dyn MailboxStore,
	pub mailcap: &'a dyn MailcapLookup,
	pub viewer: &'a mut dyn Viewer,
	pub resolver: &'a mut dyn ConflictResolver,
	pub prompter: &'a mut dyn Prompter,
	pub runner: &'a dyn ProcessRunner,
	pub ops: &'a mut dyn OpSource,
	pub crypto: &'a mut dyn CryptoEngine,
	pub config: &'a AttachConfig,
}

pub struct SessionController;

impl SessionController {
	/// Runs the decryption chain (§4.8 step 2) and builds the initial
	/// session. `raw_source`/`raw_tree`/`raw_root` is what the mailbox
	/// parsed; on success the session owns either that tree or a freshly
	/// decrypted one.
	pub fn open(
		header: Header,
		raw_source: Source,
		raw_tree: BodyTree,
		raw_root: BodyId,
		crypto: &dyn CryptoEngine,
		config: &AttachConfig,
	) -> Result<Session, OpError> {
		let outcome = CryptoUnwrap::run(header.security, &raw_source, &raw_tree, raw_root, crypto);

		let (tree, view_root, decrypted_source) = match outcome {
			UnwrapOutcome::Raw => (raw_tree, raw_root, None),
			UnwrapOutcome::Decrypted(part) => {
				info!("message decrypted successfully");
				(part.tree, part.root, Some(part.source))
			}
			UnwrapOutcome::Failed => {
				warn!("decryption chain failed, aborting session");
				return Err(OpError::DecryptFailed);
			}
		};

		let mut tree = tree;
		Self::attach_init(&mut tree, view_root, config.digest_collapse);

		let entries = TreeFlattener::flatten(&tree, view_root, false);

		Ok(Session {
			header,
			tree,
			view_root,
			decrypted_source,
			entries,
			cursor: 0,
			tag_prefix: false,
			attach_message_mode: false,
			weed: config.weed,
		})
	}

	/// `mutt_attach_init` + the initial `attach_collapse(cur, 0, 1, 0)` call:
	/// clears every `tagged`/`collapsed` flag reachable from `root`, then
	/// force-expands the whole tree (collapse=false, inherit=true) so a
	/// message opened fresh never starts with stale collapse state from a
	/// previous view of the same Body tree.
	fn attach_init(tree: &mut BodyTree, root: BodyId, digest_collapse: bool) {
		for id in tree.walk(root) {
			let body = tree.get_mut(id);
			body.tagged = false;
			body.collapsed = false;
		}
		CollapseEngine::collapse_subtree(tree, root, false, true, false, digest_collapse);
	}

	/// Rebuilds the flattened index after any tree mutation (collapse,
	/// edit-type). Cursor is clamped to the new length.
	pub fn rebuild(session: &mut Session) {
		session.entries = TreeFlattener::flatten(&session.tree, session.view_root, false);
		if session.cursor >= session.entries.len() && session.entries.len() > 0 {
			session.cursor = session.entries.len() - 1;
		}
	}

	/// Bodies an operation should act on: just the cursor's body, or
	/// every tagged body reachable from it, depending on `tag_prefix`.
	fn targets(session: &Session) -> Vec<BodyId> {
		let Some(entry) = session.entries.get(session.cursor) else { return Vec::new() };
		if !session.tag_prefix {
			return vec![entry.body];
		}
		session.tree.walk(session.view_root).into_iter().filter(|&id| session.tree.get(id).tagged).collect()
	}

	pub fn dispatch(
		session: &mut Session,
		op: SessionOp,
		mailbox_kind: MailboxKind,
		readonly: bool,
		env: &mut Collaborators,
	) -> OpOutcome {
		match op {
			SessionOp::AttachViewMailcap | SessionOp::AttachViewText | SessionOp::ViewAttach => {
				Self::enter_view_loop(session, mailbox_kind, readonly, env, None)
			}
			SessionOp::DisplayHeaders => {
				Self::enter_view_loop(session, mailbox_kind, readonly, env, Some(view_loop::Op::DisplayHeaders))
			}
			SessionOp::AttachCollapse => Self::collapse(session, env.config.digest_collapse),
			SessionOp::ForgetPassphrase => {
				info!("forgetting cached passphrase");
				env.crypto.forget_passphrase();
				OpOutcome::Ok
			}
			SessionOp::ExtractKeys => Self::extract_keys(session, env),
			SessionOp::CheckTraditional => Self::check_traditional(session, env),
			SessionOp::Print => Self::print(session, env),
			SessionOp::Pipe(filter) => Self::pipe(session, env, filter),
			SessionOp::Save => Self::save(session, env),
			SessionOp::Delete => Self::delete(session, mailbox_kind, readonly),
			SessionOp::Undelete => Self::undelete(session, readonly),
			SessionOp::Send(_) => {
				if session.attach_message_mode {
					OpOutcome::Message("Function not permitted in attach-message mode.")
				} else {
					OpOutcome::Ok
				}
			}
			SessionOp::EditType => {
				Self::rebuild(session);
				OpOutcome::Ok
			}
			SessionOp::Exit => Self::exit(session),
		}
	}

	/// A bounced [`view_loop::Op`] that the outer loop owns maps onto the
	/// matching [`SessionOp`]; anything else (the view loop's own
	/// catch-all `Other`) is simply dropped, matching "any other op —
	/// exit the loop and return the op" with no further outer handling
	/// modeled here (the real menu loop would pick it up on its own next
	/// iteration).
	fn bounced_to_session_op(op: view_loop::Op) -> Option<SessionOp> {
		match op {
			view_loop::Op::CheckTraditional => Some(SessionOp::CheckTraditional),
			view_loop::Op::AttachCollapse => Some(SessionOp::AttachCollapse),
			view_loop::Op::EditType => Some(SessionOp::EditType),
			_ => None,
		}
	}

	/// Enters [`ViewLoop`] at the current cursor. `initial`, when present,
	/// is fed as the first requested operation ahead of `env.ops` (used by
	/// `DisplayHeaders` to toggle weed on entry); a plain view just relies
	/// on the loop's own entry display and waits for the first real op.
	/// On return, re-dispatches a bounced op exactly once, per §4.8's
	/// "re-dispatch returned op if non-null".
	fn enter_view_loop(
		session: &mut Session,
		mailbox_kind: MailboxKind,
		readonly: bool,
		env: &mut Collaborators,
		initial: Option<view_loop::Op>,
	) -> OpOutcome {
		if session.entries.is_empty() {
			return OpOutcome::Message("There are no subparts to show!");
		}

		let tree = &session.tree;
		let entries = &session.entries;
		let mailbox_ref: &dyn MailboxStore = &*env.mailbox;
		let mailcap_ref: &dyn MailcapLookup = env.mailcap;
		let viewer_ref: &mut dyn Viewer = &mut *env.viewer;
		let ops_ref: &mut dyn OpSource = &mut *env.ops;
		let mut first = initial;

		let (new_cursor, new_weed, exit) = ViewLoop::run(
			tree,
			entries,
			mailbox_ref,
			mailcap_ref,
			viewer_ref,
			session.cursor,
			session.weed,
			move || first.take().unwrap_or_else(|| ops_ref.next_view_op()),
		);
		session.cursor = new_cursor;
		session.weed = new_weed;

		match exit {
			ViewLoopExit::NoMoreEntries => OpOutcome::Ok,
			ViewLoopExit::Bounced(op) => match Self::bounced_to_session_op(op) {
				Some(session_op) => Self::dispatch(session, session_op, mailbox_kind, readonly, env),
				None => OpOutcome::Ok,
			},
		}
	}

	/// `%?X?then&else?`-style quad-option resolution: `Yes`/`No` decide
	/// without a prompt, `AskYes`/`AskNo` ask with that default.
	fn resolve_quad(quad: QuadOption, prompter: &mut dyn Prompter, prompt: &str) -> bool {
		match quad {
			QuadOption::Yes => true,
			QuadOption::No => false,
			QuadOption::AskYes => prompter.ask_yes_no(prompt, true) == QuadAnswer::Yes,
			QuadOption::AskNo => prompter.ask_yes_no(prompt, false) == QuadAnswer::Yes,
		}
	}

	/// Advances the cursor by one, the same move `NEXT_ENTRY` makes,
	/// without entering the view loop; used by `SAVE`'s `resolve` option.
	fn advance_cursor(session: &mut Session) {
		if session.cursor + 1 < session.entries.len() {
			session.cursor += 1;
		}
	}

	fn extract_keys(session: &Session, env: &mut Collaborators) -> OpOutcome {
		if !session.header.security.application_pgp {
			return OpOutcome::Ok;
		}
		let targets = Self::targets(session);
		match env.crypto.extract_keys(&session.tree, &targets) {
			Ok(()) => OpOutcome::Ok,
			Err(e) => {
				warn!("key extraction failed: {}", e);
				OpOutcome::Formatted(e.to_string())
			}
		}
	}

	fn check_traditional(session: &mut Session, env: &mut Collaborators) -> OpOutcome {
		if !session.header.security.application_pgp {
			return OpOutcome::Ok;
		}
		let targets = Self::targets(session);
		match env.crypto.check_traditional(&session.tree, &targets) {
			Ok(found) => {
				if found {
					// "refresh header security": the traditional-PGP
					// probe found armor the parser missed, so the
					// header is now known to carry PGP content.
					session.header.security.application_pgp = true;
				}
				OpOutcome::Ok
			}
			Err(e) => {
				warn!("check_traditional failed: {}", e);
				OpOutcome::Formatted(e.to_string())
			}
		}
	}

	fn save(session: &mut Session, env: &mut Collaborators) -> OpOutcome {
		let targets = Self::targets(session);
		if targets.is_empty() {
			return OpOutcome::Ok;
		}
		let default_name = SaveEngine::default_filename(&session.tree, targets[0]);
		let Some(raw_path) = env.prompter.ask_text("Save to file:", &default_name) else {
			return OpOutcome::Ok;
		};
		if raw_path.is_empty() {
			return OpOutcome::Ok;
		}
		let path = PathBuf::from(SaveEngine::prepend_curdir(&raw_path));
		let mode = if env.config.split { SaveMode::Split } else { SaveMode::Concatenated };

		match SaveEngine::save(&*env.mailbox, &session.tree, &targets, &path, mode, env.resolver, &env.config.separator) {
			Ok(report) => {
				if report.saved.is_empty() {
					return OpOutcome::Ok;
				}
				if env.config.resolve {
					Self::advance_cursor(session);
				}
				OpOutcome::Message("Attachment saved.")
			}
			Err(e) => {
				warn!("save failed: {}", e);
				OpOutcome::Formatted(e.to_string())
			}
		}
	}

	fn pipe(session: &mut Session, env: &mut Collaborators, filter: bool) -> OpOutcome {
		// The original forbids in-place filtering when the viewed body
		// isn't the original attachment file (`fp != null`). This crate
		// models that case as "currently inside a nested attach-message
		// view", reusing the literal already defined for `Send`.
		if filter && session.attach_message_mode {
			return OpOutcome::Message("Function not permitted in attach-message mode.");
		}

		let targets = Self::targets(session);
		if targets.is_empty() {
			return OpOutcome::Ok;
		}
		let Some(command) = env.prompter.ask_text("Pipe to command:", "") else {
			return OpOutcome::Ok;
		};
		if command.is_empty() {
			return OpOutcome::Ok;
		}
		// A filter always operates per-part and writes its output back in
		// place (§4.5), so `mode` only matters for the plain pipe-to-program
		// case; `PipeEngine::pipe` forces `Split` itself whenever `filter`
		// is set, regardless of the `split` config option below.
		let mode = if env.config.split { PipeMode::Split } else { PipeMode::Concatenated };

		match PipeEngine::pipe(
			&mut *env.mailbox,
			&mut session.tree,
			&targets,
			&command,
			mode,
			filter,
			&env.config.separator,
			&mut *env.prompter,
			env.runner,
		) {
			Ok(_report) => {
				if env.config.wait_key {
					env.prompter.ask_yes_no("Press any key to continue", true);
				}
				if filter {
					OpOutcome::Message("Attachment filtered.")
				} else {
					OpOutcome::Ok
				}
			}
			Err(e) => {
				warn!("pipe failed: {}", e);
				OpOutcome::Formatted(e.to_string())
			}
		}
	}

	fn print(session: &mut Session, env: &mut Collaborators) -> OpOutcome {
		let targets = Self::targets(session);
		if targets.is_empty() {
			return OpOutcome::Ok;
		}
		if !Self::resolve_quad(env.config.print_quad, env.prompter, "Print attachment(s)?") {
			return OpOutcome::Ok;
		}

		if env.config.split {
			for &body in &targets {
				if let Err(e) = PrintEngine::print_one(&*env.mailbox, &session.tree, body, env.mailcap, env.runner) {
					let mimetype = session.tree.get(body).mimetype();
					warn!("print failed for {}: {}", mimetype, e);
					return OpOutcome::Formatted(format!("I don't know how to print {} attachments!", mimetype));
				}
			}
			return OpOutcome::Ok;
		}

		if let Some(NotPrintable(body)) = PrintEngine::can_print(&session.tree, &targets, env.mailcap) {
			let mimetype = session.tree.get(body).mimetype();
			return OpOutcome::Formatted(format!("I don't know how to print {} attachments!", mimetype));
		}
		match PrintEngine::print_batch(&*env.mailbox, &session.tree, &targets, &env.config.print_command, &env.config.separator, env.runner)
		{
			Ok(()) => OpOutcome::Ok,
			Err(e) => {
				warn!("print failed: {}", e);
				OpOutcome::Formatted(e.to_string())
			}
		}
	}

	fn collapse(session: &mut Session, digest_collapse: bool) -> OpOutcome {
		let Some(entry) = session.entries.get(session.cursor) else { return OpOutcome::Ok };
		let body = entry.body;
		if !session.tree.get(body).has_children() {
			return OpOutcome::Message("There are no subparts to show!");
		}
		// `attach_collapse(content, 1, 0, 1)` to collapse (init=0), but
		// `attach_collapse(content, 0, 1, 1)` to expand (init=1): expanding
		// passes inherit=true so a digest nested underneath still force-
		// recollapses via `digest_collapse` instead of silently expanding
		// along with its now-expanded parent.
		let (collapse, inherit) = if !session.tree.get(body).collapsed { (true, false) } else { (false, true) };
		CollapseEngine::collapse_subtree(&mut session.tree, body, collapse, inherit, true, digest_collapse);
		Self::rebuild(session);
		OpOutcome::Ok
	}

	fn delete(session: &mut Session, mailbox_kind: MailboxKind, readonly: bool) -> OpOutcome {
		if readonly {
			return OpOutcome::Message("Mailbox is read-only.");
		}
		if mailbox_kind == MailboxKind::Pop {
			return OpOutcome::Message("Can't delete attachment from POP server.");
		}
		if mailbox_kind == MailboxKind::Nntp {
			return OpOutcome::Message("Can't delete attachment from news server.");
		}
		if session.header.security.encrypt {
			return OpOutcome::Message("Deletion of attachments from encrypted messages is unsupported.");
		}

		let targets = Self::targets(session);
		let mut any_deleted = false;
		let mut warned_signed = false;
		for body in targets {
			let Some(entry) = session.entries.entry_for(body) else { continue };
			if entry.parent_type != crate::entry::ParentType::Type(crate::body::ContentType::Multipart) {
				continue;
			}
			session.tree.get_mut(body).deleted = true;
			any_deleted = true;
			if session.header.security.signed() {
				warned_signed = true;
			}
		}

		if !any_deleted {
			return OpOutcome::Message("Only deletion of multipart attachments is supported.");
		}
		if warned_signed {
			return OpOutcome::Message("Deletion of attachments from signed messages may invalidate the signature.");
		}
		OpOutcome::Ok
	}

	fn undelete(session: &mut Session, readonly: bool) -> OpOutcome {
		if readonly {
			return OpOutcome::Message("Mailbox is read-only.");
		}
		for body in Self::targets(session) {
			session.tree.get_mut(body).deleted = false;
		}
		OpOutcome::Ok
	}

	/// §4.8 step 6: computes `attach_del`, marks `changed`, and releases
	/// decrypted resources by dropping them. Never touches the raw tree
	/// if no decryption occurred (it was never separately owned).
	fn exit(session: &mut Session) -> OpOutcome {
		let attach_del = session.tree.walk(session.view_root).into_iter().any(|id| session.tree.get(id).deleted);
		session.header.attach_del = attach_del;
		if attach_del {
			session.header.changed = true;
		}
		info!("session exit: attach_del={}", attach_del);
		OpOutcome::Ok
	}
}
