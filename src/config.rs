//! On-disk configuration, mirroring the teacher's `Config`/`Browse`/
//! `CONFIG`/`load_config` pattern in `lib.rs`, generalized from the one
//! `browse.show_email_addresses` flag to the attach-browser's option set
//! (§6).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};

/// Tri-state confirmation value: always yes, always no, or ask (optionally
/// defaulting to yes/no).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuadOption {
	Yes,
	No,
	AskYes,
	AskNo,
}

impl Default for QuadOption {
	fn default() -> Self {
		QuadOption::AskYes
	}
}

// Container-level `default`: any field absent from the TOML is filled in
// from `AttachConfig::default()` below, not from the field type's own
// `Default` impl (which would silently turn `digest_collapse`/`resolve`/
// `wait_key`/`weed` false instead of their intended `true` defaults).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AttachConfig {
	pub format: String,
	pub separator: String,
	pub digest_collapse: bool,
	pub split: bool,
	pub resolve: bool,
	pub wait_key: bool,
	pub print_command: String,
	pub print_quad: QuadOption,
	pub followup_to_poster_quad: QuadOption,
	pub weed: bool,
}

fn default_format() -> String {
	"%u%D%I %t%4n %T%-.20d %10s %.15C".to_owned()
}

fn default_print_command() -> String {
	"lpr".to_owned()
}

impl Default for AttachConfig {
	fn default() -> Self {
		AttachConfig {
			format: default_format(),
			separator: String::new(),
			digest_collapse: true,
			split: false,
			resolve: true,
			wait_key: true,
			print_command: default_print_command(),
			print_quad: QuadOption::default(),
			followup_to_poster_quad: QuadOption::default(),
			weed: true,
		}
	}
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
	#[serde(default)]
	pub attach: AttachConfig,
}

impl Default for Config {
	fn default() -> Self {
		Config { attach: AttachConfig::default() }
	}
}

fn get_paths() -> Result<directories_next::ProjectDirs> {
	directories_next::ProjectDirs::from("", "", "Attachbrowse").context("unable to determine configuration directory")
}

fn get_config_path() -> Result<PathBuf> {
	let paths = get_paths()?;
	Ok(paths.config_dir().join("config.toml"))
}

impl Config {
	fn load_from_fs() -> Result<Option<Self>> {
		let config = get_config_path()?;
		if config.exists() {
			let content = fs::read_to_string(&config)?;
			Ok(Some(toml::from_str(&content)?))
		} else {
			Ok(None)
		}
	}

	pub fn save(&self) -> Result<()> {
		let config = get_config_path()?;
		fs::create_dir_all(config.parent().unwrap())?;
		fs::write(config, toml::to_string(self)?)?;
		Ok(())
	}
}

pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

pub fn load_config() {
	CONFIG.get_or_init(|| {
		let loaded = match Config::load_from_fs() {
			Ok(Some(config)) => config,
			Ok(None) => Config::default(),
			Err(e) => panic!("failed to load configuration: {:?}", e),
		};
		info!("config {:?}", loaded);
		RwLock::new(loaded)
	});
}
