//! Owned arena representation of a MIME body tree.
//!
//! The real MIME parser is an external collaborator (see crate docs); this
//! module only defines the node shape the rest of the crate operates on,
//! plus the arena that owns it.

use std::path::PathBuf;

/// Stable, copyable handle into a [`BodyTree`]. Replaces the C `aptr`/`next`
/// raw pointers with an index-based reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
	Text,
	Message,
	Multipart,
	Application,
	Image,
	Audio,
	Video,
	Model,
	Other,
}

impl ContentType {
	/// Major type name, as used by the `%m` format code.
	pub fn name(&self) -> &'static str {
		match self {
			ContentType::Text => "text",
			ContentType::Message => "message",
			ContentType::Multipart => "multipart",
			ContentType::Application => "application",
			ContentType::Image => "image",
			ContentType::Audio => "audio",
			ContentType::Video => "video",
			ContentType::Model => "model",
			ContentType::Other => "x-unknown",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
	Inline,
	Attachment,
	FormData,
	None,
}

impl Disposition {
	/// `%I` display char, or `None` if the discriminant is out of the
	/// original four-entry table (mirrors `recvattach.c`'s `dispchar` bounds
	/// check, which falls back to `'!'`).
	pub fn display_char(&self) -> char {
		match self {
			Disposition::Inline => 'I',
			Disposition::Attachment => 'A',
			Disposition::FormData => 'F',
			Disposition::None => '-',
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Encoding {
	SevenBit,
	EightBit,
	QuotedPrintable,
	Base64,
	Binary,
	Other(String),
}

impl Encoding {
	pub fn name(&self) -> &str {
		match self {
			Encoding::SevenBit => "7bit",
			Encoding::EightBit => "8bit",
			Encoding::QuotedPrintable => "quoted-printable",
			Encoding::Base64 => "base64",
			Encoding::Binary => "binary",
			Encoding::Other(s) => s,
		}
	}

	/// Whether this encoding is one of the two the original treats
	/// specially when deriving a save filename for an embedded message
	/// (`body->encoding != ENCBASE64 && body->encoding != ENCQUOTEDPRINTABLE`).
	pub fn is_base64_or_qp(&self) -> bool {
		matches!(self, Encoding::Base64 | Encoding::QuotedPrintable)
	}
}

/// Minimal embedded message header, used by `message/rfc822` parts for the
/// formatter's `%d` fallback and the save-filename default.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedHeader {
	pub subject: Option<String>,
}

#[derive(Debug)]
pub struct Body {
	pub ctype: ContentType,
	pub subtype: String,
	pub encoding: Encoding,
	pub disposition: Disposition,
	pub filename: Option<String>,
	pub d_filename: Option<String>,
	pub description: Option<String>,
	pub length: u64,
	pub hdr: Option<EmbeddedHeader>,
	pub charset: Option<String>,
	pub noconv: bool,
	pub tagged: bool,
	pub deleted: bool,
	pub collapsed: bool,
	pub unlink: bool,
	pub attach_count: u32,
	pub attach_qualifies: bool,
	/// Set by whoever constructed the tree; replaces the external
	/// `mutt_is_multipart_encrypted` predicate.
	pub encrypted_multipart: bool,
	/// Backing file for this part's raw bytes, when the part was saved out
	/// of band (e.g. after a filter-in-place). `None` means "read via the
	/// session's decode interface instead".
	pub file_path: Option<PathBuf>,

	parent: Option<BodyId>,
	children: Vec<BodyId>,
}

impl Body {
	pub fn leaf(ctype: ContentType, subtype: impl Into<String>) -> Self {
		Body {
			ctype,
			subtype: subtype.into(),
			encoding: Encoding::SevenBit,
			disposition: Disposition::Attachment,
			filename: None,
			d_filename: None,
			description: None,
			length: 0,
			hdr: None,
			charset: None,
			noconv: false,
			tagged: false,
			deleted: false,
			collapsed: false,
			unlink: false,
			attach_count: 0,
			attach_qualifies: false,
			encrypted_multipart: false,
			file_path: None,
			parent: None,
			children: Vec::new(),
		}
	}

	pub fn multipart(subtype: impl Into<String>) -> Self {
		let mut b = Self::leaf(ContentType::Multipart, subtype);
		b.disposition = Disposition::None;
		b
	}

	pub fn is_multipart(&self) -> bool {
		self.ctype == ContentType::Multipart
	}

	/// `mutt_is_message_type`: only `message/rfc822` and `message/news`.
	pub fn is_message_type(&self) -> bool {
		self.ctype == ContentType::Message
			&& (self.subtype.eq_ignore_ascii_case("rfc822") || self.subtype.eq_ignore_ascii_case("news"))
	}

	pub fn is_digest(&self) -> bool {
		self.is_multipart() && self.subtype.eq_ignore_ascii_case("digest")
	}

	pub fn mimetype(&self) -> String {
		format!("{}/{}", self.ctype.name(), self.subtype)
	}

	pub fn children(&self) -> &[BodyId] {
		&self.children
	}

	pub fn parent(&self) -> Option<BodyId> {
		self.parent
	}

	pub fn has_children(&self) -> bool {
		!self.children.is_empty()
	}
}

/// Owning arena for a single message's body tree.
#[derive(Debug, Default)]
pub struct BodyTree {
	nodes: Vec<Body>,
	roots: Vec<BodyId>,
}

impl BodyTree {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts `body` as a new root (top-level sibling of any existing
	/// roots) and returns its id.
	pub fn add_root(&mut self, body: Body) -> BodyId {
		let id = self.push(body);
		self.roots.push(id);
		id
	}

	/// Inserts `body` as the last child of `parent` and returns its id.
	pub fn add_child(&mut self, parent: BodyId, mut body: Body) -> BodyId {
		body.parent = Some(parent);
		let id = self.push(body);
		self.get_mut(parent).children.push(id);
		id
	}

	fn push(&mut self, body: Body) -> BodyId {
		let id = BodyId(self.nodes.len());
		self.nodes.push(body);
		id
	}

	pub fn roots(&self) -> &[BodyId] {
		&self.roots
	}

	pub fn get(&self, id: BodyId) -> &Body {
		&self.nodes[id.0]
	}

	pub fn get_mut(&mut self, id: BodyId) -> &mut Body {
		&mut self.nodes[id.0]
	}

	/// Whether `id` has a following sibling in its parent's (or the tree's
	/// root) children vector — used by the glyph pass.
	pub fn has_next_sibling(&self, id: BodyId) -> bool {
		let siblings = match self.get(id).parent() {
			Some(parent) => self.get(parent).children(),
			None => self.roots(),
		};
		match siblings.iter().position(|&s| s == id) {
			Some(pos) => pos + 1 < siblings.len(),
			None => false,
		}
	}

	/// Depth-first preorder over every node reachable from `root`
	/// (inclusive), ignoring collapse/encryption flatten rules. Used by
	/// tag-prefix traversal and by `attach_init`.
	pub fn walk(&self, root: BodyId) -> Vec<BodyId> {
		let mut out = Vec::new();
		let mut stack = vec![root];
		while let Some(id) = stack.pop() {
			out.push(id);
			for &child in self.get(id).children().iter().rev() {
				stack.push(child);
			}
		}
		out
	}
}
