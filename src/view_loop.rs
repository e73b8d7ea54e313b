//! The sub-loop entered when a single entry is displayed, grounded on
//! `recvattach.c`'s `mutt_attach_display_loop`.

use crate::body::BodyTree;
use crate::collab::{MailboxStore, MailcapLookup, Viewer};
use crate::entry::EntryList;

/// Operations the view loop either handles itself or bounces back to the
/// caller for the outer session loop to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
	DisplayHeaders,
	ViewAttach,
	NextEntry,
	MainNextUndeleted,
	PrevEntry,
	MainPrevUndeleted,
	EditType,
	CheckTraditional,
	AttachCollapse,
	Other,
}

/// Why the loop returned to its caller.
pub enum ViewLoopExit {
	/// Cursor moved off the end/start of the list; nothing left to view.
	NoMoreEntries,
	/// An op the loop doesn't own; the caller (session controller) should
	/// handle it against the outer index.
	Bounced(Op),
}

pub struct ViewLoop;

impl ViewLoop {
	/// Runs the inner loop starting at `cursor` (an index into `entries`),
	/// driving `viewer` to actually render each entry and calling
	/// `next_op` to obtain the next requested operation. `weed` toggles on
	/// `DisplayHeaders` and is threaded back out so the caller can persist
	/// it.
	pub fn run(
		tree: &BodyTree,
		entries: &EntryList,
		mailbox: &dyn MailboxStore,
		mailcap: &dyn MailcapLookup,
		viewer: &mut dyn Viewer,
		mut cursor: usize,
		mut weed: bool,
		mut next_op: impl FnMut() -> Op,
	) -> (usize, bool, ViewLoopExit) {
		Self::display(tree, entries, mailbox, mailcap, viewer, cursor, weed);

		loop {
			match next_op() {
				Op::DisplayHeaders => {
					weed = !weed;
					Self::display(tree, entries, mailbox, mailcap, viewer, cursor, weed);
				}
				Op::ViewAttach => {
					Self::display(tree, entries, mailbox, mailcap, viewer, cursor, weed);
				}
				Op::NextEntry | Op::MainNextUndeleted => {
					if cursor + 1 < entries.len() {
						cursor += 1;
						Self::display(tree, entries, mailbox, mailcap, viewer, cursor, weed);
					} else {
						return (cursor, weed, ViewLoopExit::NoMoreEntries);
					}
				}
				Op::PrevEntry | Op::MainPrevUndeleted => {
					if cursor > 0 {
						cursor -= 1;
						Self::display(tree, entries, mailbox, mailcap, viewer, cursor, weed);
					} else {
						return (cursor, weed, ViewLoopExit::NoMoreEntries);
					}
				}
				Op::EditType => {
					// Content-type edits mutate the Body in place; the
					// caller rebuilds the EntryList and re-enters.
					return (cursor, weed, ViewLoopExit::Bounced(Op::EditType));
				}
				op @ (Op::CheckTraditional | Op::AttachCollapse) => {
					return (cursor, weed, ViewLoopExit::Bounced(op));
				}
				other => return (cursor, weed, ViewLoopExit::Bounced(other)),
			}
		}
	}

	fn display(
		tree: &BodyTree,
		entries: &EntryList,
		mailbox: &dyn MailboxStore,
		mailcap: &dyn MailcapLookup,
		viewer: &mut dyn Viewer,
		cursor: usize,
		_weed: bool,
	) {
		let Some(entry) = entries.get(cursor) else { return };
		let body = tree.get(entry.body);
		let mimetype = body.mimetype();

		if let Some(command) = mailcap.view_command(&mimetype) {
			if mailcap.copiousoutput(&mimetype) {
				if let Ok(bytes) = mailbox.read_body(tree, entry.body, false) {
					let _ = viewer.display_text(&String::from_utf8_lossy(&bytes));
				}
			} else if let Some(path) = body.file_path.as_deref() {
				let _ = viewer.run_interactive(&command, path);
			}
		} else if let Ok(bytes) = mailbox.read_body(tree, entry.body, false) {
			let _ = viewer.display_text(&String::from_utf8_lossy(&bytes));
		}
	}
}
