//! Locating and loading the native JavaScriptCore library
//!
//! The library is opened once per process and shared through [`api`]. Which
//! file gets opened is controlled by [`LibraryConfig`]: an explicit path
//! wins, otherwise the short name is expanded into platform file names and
//! searched for. The process-wide config is seeded from
//! `NITRO_JSC_LIBRARY_PATH` / `NITRO_JSC_LIBRARY_NAME` and can be changed with
//! [`set_library_name`] / [`set_library_path`] until the first load.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

use libloading::Library;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::JscApi;

/// Short name used when nothing else is configured
pub const DEFAULT_LIBRARY_NAME: &str = "JavaScriptCore";

/// Environment variable holding an explicit library path
pub const LIBRARY_PATH_ENV: &str = "NITRO_JSC_LIBRARY_PATH";

/// Environment variable overriding the short library name
pub const LIBRARY_NAME_ENV: &str = "NITRO_JSC_LIBRARY_NAME";

/// Errors raised while locating or loading the library
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("JavaScriptCore library `{name}` not found ({} locations searched)", .searched.len())]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to load JavaScriptCore library {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("JavaScriptCore library does not export `{symbol}`: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
}

/// Where to find the native library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Short name expanded into platform file names
    pub name: String,
    /// Full path; when set, no search happens
    pub path: Option<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_LIBRARY_NAME.to_string(),
            path: None,
        }
    }
}

impl LibraryConfig {
    /// Create a config that searches for `name`
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    /// Create a config that opens `path` directly
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Defaults overlaid with the `NITRO_JSC_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key))
    }

    /// Defaults overlaid with values from `lookup`; empty values are ignored
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut config = Self::default();
        if let Some(name) = lookup(LIBRARY_NAME_ENV).filter(|v| !v.is_empty()) {
            config.name = name.to_string_lossy().into_owned();
        }
        if let Some(path) = lookup(LIBRARY_PATH_ENV).filter(|v| !v.is_empty()) {
            config.path = Some(PathBuf::from(path));
        }
        config
    }

    /// File names tried for the short name, most specific first
    pub fn candidate_file_names(&self) -> Vec<String> {
        let name = self.name.as_str();
        let mut names = Vec::new();

        if has_library_suffix(name) {
            names.push(name.to_string());
            return names;
        }

        if cfg!(target_os = "macos") {
            names.push(format!("lib{name}.dylib"));
            names.push(format!("{name}.dylib"));
        } else if cfg!(target_os = "windows") {
            names.push(format!("{name}.dll"));
            names.push(format!("lib{name}.dll"));
        } else {
            if name == DEFAULT_LIBRARY_NAME {
                // WebKitGTK ships JSC under its own soname
                names.extend(
                    [
                        "libjavascriptcoregtk-6.0.so.1",
                        "libjavascriptcoregtk-4.1.so.0",
                        "libjavascriptcoregtk-4.0.so.18",
                        "libjavascriptcoregtk-6.0.so",
                        "libjavascriptcoregtk-4.1.so",
                        "libjavascriptcoregtk-4.0.so",
                    ]
                    .map(String::from),
                );
            }
            names.push(format!("lib{name}.so"));
        }
        names
    }

    /// Full paths to probe, in order
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if cfg!(target_os = "macos") && !has_library_suffix(&self.name) {
            for root in ["/System/Library/Frameworks", "/Library/Frameworks"] {
                paths.push(
                    Path::new(root)
                        .join(format!("{}.framework", self.name))
                        .join(&self.name),
                );
            }
        }
        let file_names = self.candidate_file_names();
        for dir in search_dirs() {
            for file in &file_names {
                paths.push(dir.join(file));
            }
        }
        paths
    }
}

fn has_library_suffix(name: &str) -> bool {
    name.ends_with(".dylib")
        || name.ends_with(".dll")
        || name.ends_with(".so")
        || name.contains(".so.")
}

fn search_dirs() -> Vec<PathBuf> {
    let vars: &[&str] = if cfg!(target_os = "macos") {
        &["DYLD_LIBRARY_PATH", "DYLD_FALLBACK_LIBRARY_PATH"]
    } else if cfg!(target_os = "windows") {
        &["PATH"]
    } else {
        &["LD_LIBRARY_PATH"]
    };

    let mut dirs: Vec<PathBuf> = vars
        .iter()
        .filter_map(|var| env::var_os(var))
        .flat_map(|value| env::split_paths(&value).collect::<Vec<_>>())
        .filter(|dir| !dir.as_os_str().is_empty())
        .collect();

    let standard: &[&str] = if cfg!(target_os = "macos") {
        &["/usr/local/lib", "/opt/homebrew/lib", "/usr/lib"]
    } else if cfg!(target_os = "windows") {
        &[]
    } else {
        &[
            "/usr/local/lib",
            "/usr/lib",
            "/usr/lib64",
            "/usr/lib/x86_64-linux-gnu",
            "/usr/lib/aarch64-linux-gnu",
            "/lib",
        ]
    };
    for dir in standard {
        let dir = PathBuf::from(dir);
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

static CONFIG: LazyLock<Mutex<LibraryConfig>> =
    LazyLock::new(|| Mutex::new(LibraryConfig::from_env()));

static API: OnceLock<JscApi> = OnceLock::new();

/// Serializes loads so the library is opened at most once
static LOAD_LOCK: Mutex<()> = Mutex::new(());

/// Snapshot of the process-wide config
pub fn library_config() -> LibraryConfig {
    CONFIG.lock().clone()
}

/// Replace the process-wide config
pub fn set_library_config(config: LibraryConfig) {
    if is_loaded() {
        warn!(?config, "JavaScriptCore already loaded, new library config is ignored");
    }
    *CONFIG.lock() = config;
}

/// Set the short library name searched for on first use
pub fn set_library_name(name: impl Into<String>) {
    let name = name.into();
    if is_loaded() {
        warn!(%name, "JavaScriptCore already loaded, library name change is ignored");
    }
    CONFIG.lock().name = name;
}

/// Set (or clear) the explicit library path used on first use
pub fn set_library_path(path: Option<PathBuf>) {
    if is_loaded() {
        warn!(?path, "JavaScriptCore already loaded, library path change is ignored");
    }
    CONFIG.lock().path = path;
}

/// Whether the process-wide library has been loaded
pub fn is_loaded() -> bool {
    API.get().is_some()
}

/// The process-wide function table, loading the library on first use
///
/// A failed load is not remembered: fix the config and call again.
pub fn api() -> Result<&'static JscApi, LoadError> {
    if let Some(api) = API.get() {
        return Ok(api);
    }

    let _guard = LOAD_LOCK.lock();
    if let Some(api) = API.get() {
        return Ok(api);
    }

    let config = library_config();
    let api = load_with(&config)?;
    Ok(API.get_or_init(|| api))
}

/// Open the library described by `config` and resolve the function table
///
/// Independent of the process-wide state.
pub fn load_with(config: &LibraryConfig) -> Result<JscApi, LoadError> {
    let library = match &config.path {
        Some(path) => open_path(path)?,
        None => search(config)?,
    };
    // SAFETY: the library was located as a JavaScriptCore build
    unsafe { JscApi::resolve(library) }
}

fn open_path(path: &Path) -> Result<Library, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound {
            name: path.display().to_string(),
            searched: vec![path.to_path_buf()],
        });
    }
    debug!(path = %path.display(), "opening JavaScriptCore library");
    // SAFETY: loading runs the library's initializers; JSC has no
    // initializer side effects beyond its own globals
    let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded JavaScriptCore");
    Ok(library)
}

fn search(config: &LibraryConfig) -> Result<Library, LoadError> {
    let candidates = config.candidate_paths();
    if let Some(path) = candidates.iter().find(|path| path.is_file()) {
        return open_path(path);
    }

    // Let the system loader try its own search (ld.so cache, dyld shared cache)
    for file in config.candidate_file_names() {
        debug!(%file, "asking the system loader for JavaScriptCore");
        // SAFETY: see open_path
        match unsafe { Library::new(&file) } {
            Ok(library) => {
                info!(%file, "loaded JavaScriptCore");
                return Ok(library);
            }
            Err(err) => debug!(%file, error = %err, "system loader lookup failed"),
        }
    }

    Err(LoadError::NotFound {
        name: config.name.clone(),
        searched: candidates,
    })
}
