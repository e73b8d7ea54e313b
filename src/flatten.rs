//! Flattens a [`BodyTree`] into an [`EntryList`], and computes the
//! tree-drawing glyph prefix for each entry.

use crate::body::{BodyId, BodyTree};
use crate::entry::{Entry, EntryList, ParentType};

const TREE_LTEE: char = '\u{251c}'; // ├
const TREE_LLCORNER: char = '\u{2514}'; // └
const TREE_HLINE: char = '\u{2500}'; // ─
const TREE_RARROW: char = '\u{25b6}'; // ▶

pub struct TreeFlattener;

impl TreeFlattener {
	/// `flatten(tree, root, compose_mode) -> EntryList`, per spec §3/§4.1.
	pub fn flatten(tree: &BodyTree, root: BodyId, compose_mode: bool) -> EntryList {
		let mut list = EntryList::new();
		Self::walk(tree, root, ParentType::Top, 0, compose_mode, &mut list);
		Self::assign_glyphs(tree, &mut list);
		list
	}

	fn walk(
		tree: &BodyTree,
		id: BodyId,
		parent_type: ParentType,
		level: usize,
		compose_mode: bool,
		out: &mut EntryList,
	) {
		let body = tree.get(id);

		// The original source only descends through a top-level multipart
		// when its subtype isn't "alternative" (recvattach.c's
		// `mutt_gen_attach_list`). That formula, applied literally, would
		// keep a bare top-level `multipart/alternative` as its own visible
		// entry — which contradicts this crate's own flattening contract
		// (a top-level alternative is always transparent, nested ones are
		// not). So the subtype half of the original condition is dropped
		// here: any multipart reached with `parent_type == Top` descends,
		// regardless of subtype; only non-top multiparts keep the
		// alternative-stays-whole exception (implied by `parent_type != Top`
		// never satisfying this branch at all).
		let descend_through =
			body.is_multipart() && body.has_children() && (compose_mode || parent_type == ParentType::Top) && !body.encrypted_multipart;

		if descend_through {
			for &child in body.children() {
				Self::walk(tree, child, ParentType::Type(body.ctype), level, compose_mode, out);
			}
			return;
		}

		let index = out.len();
		out.push(Entry {
			body: id,
			parent_type,
			level,
			index,
			tree_glyphs: String::new(),
			tree_glyphs_encoded: String::new(),
		});

		let expand_children = !compose_mode
			&& !body.collapsed
			&& ((body.is_multipart() && !body.encrypted_multipart) || body.is_message_type());

		if expand_children {
			for &child in body.children() {
				Self::walk(tree, child, ParentType::Type(body.ctype), level + 1, compose_mode, out);
			}
		}
	}

	fn assign_glyphs(tree: &BodyTree, list: &mut EntryList) {
		let mut display = Vec::with_capacity(list.len());
		let mut encoded = Vec::with_capacity(list.len());
		for i in 0..list.len() {
			let entry = list.get(i).unwrap();
			if entry.level == 0 {
				display.push(String::new());
				encoded.push(String::new());
				continue;
			}
			let corner = if tree.has_next_sibling(entry.body) { TREE_LTEE } else { TREE_LLCORNER };
			let mut d = String::with_capacity(2 * (entry.level - 1) + 3);
			d.push(corner);
			d.push(TREE_HLINE);
			d.push(TREE_RARROW);
			display.push(d);

			let encoded_corner = if tree.has_next_sibling(entry.body) { '\u{5}' } else { '\u{6}' };
			let mut e = String::with_capacity(2);
			e.push(encoded_corner);
			e.push('\u{6}');
			encoded.push(e);
		}
		for (i, (d, e)) in display.into_iter().zip(encoded).enumerate() {
			list.set_glyphs(i, d, e);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::body::{Body, ContentType};

	#[test]
	fn alternative_at_root_is_descended() {
		let mut tree = BodyTree::new();
		let root = tree.add_root(Body::multipart("alternative"));
		tree.add_child(root, Body::leaf(ContentType::Text, "plain"));
		tree.add_child(root, Body::leaf(ContentType::Text, "html"));

		let list = TreeFlattener::flatten(&tree, root, false);
		assert_eq!(list.len(), 2);
		assert_eq!(list.get(0).unwrap().level, 0);
		assert_eq!(list.get(1).unwrap().level, 0);
		assert_eq!(tree.get(list.get(0).unwrap().body).subtype, "plain");
		assert_eq!(tree.get(list.get(1).unwrap().body).subtype, "html");
	}

	#[test]
	fn nested_alternative_is_presented_whole() {
		let mut tree = BodyTree::new();
		let root = tree.add_root(Body::multipart("mixed"));
		let alt = tree.add_child(root, Body::multipart("alternative"));
		tree.add_child(alt, Body::leaf(ContentType::Text, "plain"));
		tree.add_child(alt, Body::leaf(ContentType::Text, "html"));
		tree.add_child(root, Body::leaf(ContentType::Application, "pdf"));

		// `root` ("mixed") is itself at the top level, so it is descended
		// through transparently (like a bare top-level alternative would
		// be); `alt`, reached with a non-Top parent_type, is not, and
		// becomes its own entry with its two children one level deeper.
		let list = TreeFlattener::flatten(&tree, root, false);
		assert_eq!(list.len(), 4);
		assert_eq!(list.get(0).unwrap().level, 0);
		assert_eq!(tree.get(list.get(0).unwrap().body).subtype, "alternative");
		assert_eq!(list.get(1).unwrap().level, 1);
		assert_eq!(list.get(2).unwrap().level, 1);
		assert_eq!(list.get(3).unwrap().level, 0);
		assert_eq!(tree.get(list.get(3).unwrap().body).subtype, "pdf");
	}

	#[test]
	fn encrypted_multipart_is_opaque() {
		let mut tree = BodyTree::new();
		let root = tree.add_root(Body::multipart("mixed"));
		let mut enc = Body::multipart("encrypted");
		enc.encrypted_multipart = true;
		let enc = tree.add_child(root, enc);
		tree.add_child(enc, Body::leaf(ContentType::Application, "octet-stream"));

		let list = TreeFlattener::flatten(&tree, root, false);
		assert_eq!(list.len(), 1);
		assert_eq!(list.get(0).unwrap().level, 0);
	}

	#[test]
	fn collapsed_node_hides_children() {
		let mut tree = BodyTree::new();
		let root = tree.add_root(Body::multipart("mixed"));
		let mut msg = Body::leaf(ContentType::Message, "rfc822");
		msg.collapsed = true;
		let msg = tree.add_child(root, msg);
		tree.add_child(msg, Body::leaf(ContentType::Text, "plain"));

		let list = TreeFlattener::flatten(&tree, root, false);
		assert_eq!(list.len(), 1);
	}

	#[test]
	fn glyph_marks_last_child_with_corner() {
		// Top-level entries (level 0) never carry a glyph prefix, matching
		// `mutt_update_tree`'s `if (idx[x]->level)` guard — a flat
		// top-level multipart/mixed with two attachments shows no tree
		// decoration at all. To exercise the corner-glyph logic the
		// siblings must sit one level deep, under a message/rfc822 that is
		// itself the (only) top-level entry.
		let mut tree = BodyTree::new();
		let root = tree.add_root(Body::multipart("mixed"));
		let msg = tree.add_child(root, Body::leaf(ContentType::Message, "rfc822"));
		tree.add_child(msg, Body::leaf(ContentType::Text, "plain"));
		tree.add_child(msg, Body::leaf(ContentType::Application, "pdf"));

		let list = TreeFlattener::flatten(&tree, root, false);
		assert_eq!(list.len(), 3);
		assert_eq!(list.get(0).unwrap().tree_glyphs, "");
		assert!(list.get(1).unwrap().tree_glyphs.starts_with(TREE_LTEE));
		assert!(list.get(2).unwrap().tree_glyphs.starts_with(TREE_LLCORNER));
	}
}
