//! Crypto collaborator seam and the one-shot decryption chain
//! (`CryptoUnwrap`), grounded on the `WithCrypto`/`crypt_*` sections of
//! `mutt_view_attachments` in `recvattach.c`.

use anyhow::Result;

use crate::body::{BodyId, BodyTree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityFlags {
	pub encrypt: bool,
	pub sign: bool,
	pub partsign: bool,
	pub application_pgp: bool,
	pub application_smime: bool,
}

impl SecurityFlags {
	pub fn signed(&self) -> bool {
		self.sign || self.partsign
	}
}

/// Opaque handle to wherever the decrypted (or raw) message bytes live.
/// The real mailbox/crypto layer owns the concrete representation; this
/// crate only needs to know when to drop it.
#[derive(Debug)]
pub struct Source(pub String);

/// One result of a decryption attempt.
pub struct DecryptedPart {
	pub source: Source,
	pub tree: BodyTree,
	pub root: BodyId,
	/// True iff this part is itself S/MIME opaque (triggers nested decrypt).
	pub smime_opaque: bool,
}

/// Thin seam over the external PGP/SMIME engine (passphrase cache, actual
/// decrypt/extract-keys implementations).
pub trait CryptoEngine {
	fn valid_passphrase(&self) -> bool;
	fn forget_passphrase(&mut self);

	fn is_application_smime(&self, tree: &BodyTree, body: BodyId) -> bool;
	fn is_smime_opaque(&self, tree: &BodyTree, body: BodyId) -> bool;
	fn is_multipart_encrypted(&self, tree: &BodyTree, body: BodyId) -> bool;
	fn is_malformed_pgp_encrypted(&self, tree: &BodyTree, body: BodyId) -> bool;

	fn smime_decrypt(&self, source: &Source, tree: &BodyTree, body: BodyId) -> Result<Option<DecryptedPart>>;
	fn pgp_decrypt(&self, source: &Source, tree: &BodyTree, body: BodyId) -> Result<Option<DecryptedPart>>;

	fn extract_keys(&self, tree: &BodyTree, bodies: &[BodyId]) -> Result<()>;
	fn check_traditional(&self, tree: &BodyTree, bodies: &[BodyId]) -> Result<bool>;
}

/// Outcome of running the decryption chain.
pub enum UnwrapOutcome {
	/// No decryption was needed; view the raw body as-is.
	Raw,
	/// Decryption succeeded; the session now owns `DecryptedPart`.
	Decrypted(DecryptedPart),
	/// Decryption was required but failed (or the cached passphrase was
	/// invalid): the session must abort.
	Failed,
}

pub struct CryptoUnwrap;

impl CryptoUnwrap {
	/// Runs the decryption chain against `root` in `tree`, reachable via
	/// `source`. Mirrors `mutt_view_attachments`'s `WithCrypto` block,
	/// including the nested-SMIME case where the intermediate
	/// `(source, tree, root)` triple is dropped as soon as the next layer
	/// decrypts successfully.
	pub fn run(
		security: SecurityFlags,
		source: &Source,
		tree: &BodyTree,
		root: BodyId,
		engine: &dyn CryptoEngine,
	) -> UnwrapOutcome {
		let smime_opaque_at_root = engine.is_smime_opaque(tree, root);
		let needs_secured = security.encrypt || smime_opaque_at_root;
		if !needs_secured {
			return UnwrapOutcome::Raw;
		}

		if security.encrypt && !engine.valid_passphrase() {
			return UnwrapOutcome::Failed;
		}

		let mut need_secured = true;
		let mut secured = false;
		let mut current: Option<DecryptedPart> = None;

		if security.application_smime {
			if engine.is_application_smime(tree, root) {
				match engine.smime_decrypt(source, tree, root) {
					Ok(Some(mut part)) => {
						secured = true;
						// nested S/MIME: decrypt again, then drop the
						// intermediate part (matches freeing `_cur`/`_fp`).
						while part.smime_opaque {
							let inner = engine.smime_decrypt(&part.source, &part.tree, part.root);
							match inner {
								Ok(Some(next)) => {
									secured = true;
									part = next; // intermediate `part` dropped here
								}
								_ => {
									secured = false;
									break;
								}
							}
						}
						current = Some(part);
					}
					_ => secured = false,
				}
			} else {
				need_secured = false;
			}
		}

		if security.application_pgp && current.is_none() {
			if engine.is_multipart_encrypted(tree, root) || engine.is_malformed_pgp_encrypted(tree, root) {
				match engine.pgp_decrypt(source, tree, root) {
					Ok(Some(part)) => {
						secured = true;
						current = Some(part);
					}
					_ => secured = false,
				}
			} else {
				need_secured = false;
			}
		}

		if need_secured && !secured {
			return UnwrapOutcome::Failed;
		}

		match current {
			Some(part) => UnwrapOutcome::Decrypted(part),
			None => UnwrapOutcome::Raw,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::body::Body;

	struct NoCrypto;
	impl CryptoEngine for NoCrypto {
		fn valid_passphrase(&self) -> bool {
			false
		}
		fn forget_passphrase(&mut self) {}
		fn is_application_smime(&self, _: &BodyTree, _: BodyId) -> bool {
			false
		}
		fn is_smime_opaque(&self, _: &BodyTree, _: BodyId) -> bool {
			false
		}
		fn is_multipart_encrypted(&self, _: &BodyTree, _: BodyId) -> bool {
			false
		}
		fn is_malformed_pgp_encrypted(&self, _: &BodyTree, _: BodyId) -> bool {
			false
		}
		fn smime_decrypt(&self, _: &Source, _: &BodyTree, _: BodyId) -> Result<Option<DecryptedPart>> {
			Ok(None)
		}
		fn pgp_decrypt(&self, _: &Source, _: &BodyTree, _: BodyId) -> Result<Option<DecryptedPart>> {
			Ok(None)
		}
		fn extract_keys(&self, _: &BodyTree, _: &[BodyId]) -> Result<()> {
			Ok(())
		}
		fn check_traditional(&self, _: &BodyTree, _: &[BodyId]) -> Result<bool> {
			Ok(false)
		}
	}

	fn sample_tree() -> (BodyTree, BodyId) {
		let mut tree = BodyTree::new();
		let root = tree.add_root(Body::leaf(crate::body::ContentType::Text, "plain"));
		(tree, root)
	}

	#[test]
	fn unencrypted_message_passes_through_raw() {
		let (tree, root) = sample_tree();
		let source = Source("raw".to_owned());
		let engine = NoCrypto;
		let outcome = CryptoUnwrap::run(SecurityFlags::default(), &source, &tree, root, &engine);
		assert!(matches!(outcome, UnwrapOutcome::Raw));
	}

	#[test]
	fn encrypted_without_passphrase_fails() {
		let (tree, root) = sample_tree();
		let source = Source("raw".to_owned());
		let engine = NoCrypto;
		let security = SecurityFlags { encrypt: true, ..Default::default() };
		let outcome = CryptoUnwrap::run(security, &source, &tree, root, &engine);
		assert!(matches!(outcome, UnwrapOutcome::Failed));
	}

	struct NestedSmime {
		layers: std::cell::Cell<u32>,
	}
	impl CryptoEngine for NestedSmime {
		fn valid_passphrase(&self) -> bool {
			true
		}
		fn forget_passphrase(&mut self) {}
		fn is_application_smime(&self, _: &BodyTree, _: BodyId) -> bool {
			true
		}
		fn is_smime_opaque(&self, _: &BodyTree, _: BodyId) -> bool {
			true
		}
		fn is_multipart_encrypted(&self, _: &BodyTree, _: BodyId) -> bool {
			false
		}
		fn is_malformed_pgp_encrypted(&self, _: &BodyTree, _: BodyId) -> bool {
			false
		}
		fn smime_decrypt(&self, _: &Source, _: &BodyTree, _: BodyId) -> Result<Option<DecryptedPart>> {
			let n = self.layers.get();
			self.layers.set(n + 1);
			let mut inner = BodyTree::new();
			let root = inner.add_root(Body::leaf(crate::body::ContentType::Text, "plain"));
			Ok(Some(DecryptedPart {
				source: Source(format!("layer-{}", n)),
				tree: inner,
				root,
				smime_opaque: n == 0,
			}))
		}
		fn pgp_decrypt(&self, _: &Source, _: &BodyTree, _: BodyId) -> Result<Option<DecryptedPart>> {
			Ok(None)
		}
		fn extract_keys(&self, _: &BodyTree, _: &[BodyId]) -> Result<()> {
			Ok(())
		}
		fn check_traditional(&self, _: &BodyTree, _: &[BodyId]) -> Result<bool> {
			Ok(false)
		}
	}

	#[test]
	fn nested_smime_unwraps_to_innermost() {
		let (tree, root) = sample_tree();
		let source = Source("raw".to_owned());
		let engine = NestedSmime { layers: std::cell::Cell::new(0) };
		let security = SecurityFlags { application_smime: true, ..Default::default() };
		let outcome = CryptoUnwrap::run(security, &source, &tree, root, &engine);
		match outcome {
			UnwrapOutcome::Decrypted(part) => {
				assert_eq!(part.source.0, "layer-1");
				assert!(!part.smime_opaque);
			}
			_ => panic!("expected decrypted outcome"),
		}
	}
}
