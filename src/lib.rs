//! Attachment browser core: flattens a MIME body tree into a navigable
//! index and dispatches view/save/pipe/print/delete/collapse operations
//! against it, including the decryption chain needed to view a secured
//! message in the first place.

pub mod body;
pub mod collab;
pub mod collapse;
pub mod config;
pub mod crypto;
pub mod entry;
pub mod flatten;
pub mod format;
pub mod pipe;
pub mod print;
pub mod save;
pub mod session;
pub mod view_loop;

pub type Result<T> = anyhow::Result<T>;

pub use config::{load_config, Config, CONFIG};
