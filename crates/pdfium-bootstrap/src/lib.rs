//! # pdfium-bootstrap
//!
//! Find a usable [PDFium](https://pdfium.googlesource.com/pdfium/) shared
//! library and bind `pdfium-render` to it, downloading a pinned build when
//! nothing suitable is installed.
//!
//! ## Resolution order
//!
//! 1. `PDFIUM_LIB_PATH`: an explicit library file.
//! 2. The per-version cache directory (see [`default_cache_dir`]).
//! 3. The system library search path (`libpdfium.so` / `.dylib` / `pdfium.dll`).
//! 4. A download of the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    extracted into the cache directory. Skipped when downloads are disabled.
//!
//! The first source that binds successfully is remembered for the rest of
//! the process, so later calls skip straight to it.
//!
//! ```rust,no_run
//! use pdfium_bootstrap::Bootstrap;
//!
//! let pdfium = Bootstrap::from_env().bind().expect("PDFium unavailable");
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

const RELEASE_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Errors returned while locating or binding PDFium.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("No PDFium build is published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cache directory '{path}' is unusable: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Downloading PDFium failed: {0}")]
    Download(String),

    #[error("Extracting PDFium from the archive failed: {0}")]
    Extract(String),

    #[error("Failed to bind PDFium from {source_desc}: {reason}")]
    Bind { source_desc: String, reason: String },

    /// Nothing bound and downloads are disabled.
    #[error(
        "PDFium library not found (checked PDFIUM_LIB_PATH, '{cache}', and the system path); \
         downloads are disabled"
    )]
    NotFound { cache: PathBuf },
}

/// Where the bound library came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    EnvOverride(PathBuf),
    Cached(PathBuf),
    System,
    Downloaded(PathBuf),
}

impl LibrarySource {
    fn describe(&self) -> String {
        match self {
            LibrarySource::EnvOverride(p) => format!("PDFIUM_LIB_PATH '{}'", p.display()),
            LibrarySource::Cached(p) => format!("cache '{}'", p.display()),
            LibrarySource::System => "system library path".to_string(),
            LibrarySource::Downloaded(p) => format!("download '{}'", p.display()),
        }
    }

    fn bind(&self) -> Result<Pdfium, BootstrapError> {
        let bindings = match self {
            LibrarySource::EnvOverride(p)
            | LibrarySource::Cached(p)
            | LibrarySource::Downloaded(p) => Pdfium::bind_to_library(p),
            LibrarySource::System => Pdfium::bind_to_system_library(),
        };
        bindings.map(Pdfium::new).map_err(|e| BootstrapError::Bind {
            source_desc: self.describe(),
            reason: e.to_string(),
        })
    }
}

static RESOLVED: OnceLock<LibrarySource> = OnceLock::new();

/// Archive asset name and the library's path inside it.
fn platform_archive() -> Result<(&'static str, &'static str), BootstrapError> {
    let archive = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib"),
        ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib"),
        ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so"),
        ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so"),
        ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll"),
        ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll"),
        ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll"),
        (os, arch) => {
            return Err(BootstrapError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };
    Ok(archive)
}

/// File name of the library on this platform, e.g. `libpdfium.so`.
fn library_file_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "libpdfium.dylib",
        "windows" => "pdfium.dll",
        _ => "libpdfium.so",
    }
}

/// Per-version cache directory.
///
/// `$PDFIUM_CACHE_DIR/pdfium-{VERSION}` when the variable is set, otherwise
/// `{platform cache dir}/submission-harvest/pdfium-{VERSION}`.
pub fn default_cache_dir() -> PathBuf {
    let versioned = format!("pdfium-{PDFIUM_VERSION}");
    if let Ok(dir) = std::env::var("PDFIUM_CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join(versioned);
        }
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("submission-harvest")
        .join(versioned)
}

/// PDFium locator. Cheap to construct; all work happens in [`Bootstrap::bind`].
#[derive(Debug, Clone)]
pub struct Bootstrap {
    cache_dir: PathBuf,
    lib_override: Option<PathBuf>,
    allow_download: bool,
}

impl Bootstrap {
    /// Locator configured from `PDFIUM_LIB_PATH` / `PDFIUM_CACHE_DIR`, downloads allowed.
    pub fn from_env() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            lib_override: std::env::var_os("PDFIUM_LIB_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            allow_download: true,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn allow_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path the cached library would have.
    pub fn cached_library_path(&self) -> PathBuf {
        self.cache_dir.join(library_file_name())
    }

    /// Bind to PDFium using the first source that works.
    pub fn bind(&self) -> Result<Pdfium, BootstrapError> {
        if let Some(source) = RESOLVED.get() {
            return source.bind();
        }

        for source in self.local_candidates() {
            match source.bind() {
                Ok(pdfium) => {
                    debug!("Bound PDFium from {}", source.describe());
                    let _ = RESOLVED.set(source);
                    return Ok(pdfium);
                }
                Err(e) => debug!("{e}"),
            }
        }

        if !self.allow_download {
            return Err(BootstrapError::NotFound {
                cache: self.cache_dir.clone(),
            });
        }

        let path = self.download()?;
        let source = LibrarySource::Downloaded(path);
        let pdfium = source.bind()?;
        let _ = RESOLVED.set(source);
        Ok(pdfium)
    }

    /// Sources that need no network access, in priority order.
    fn local_candidates(&self) -> Vec<LibrarySource> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(ref p) = self.lib_override {
            if p.exists() {
                candidates.push(LibrarySource::EnvOverride(p.clone()));
            } else {
                warn!("PDFIUM_LIB_PATH '{}' does not exist; ignoring", p.display());
            }
        }
        let cached = self.cached_library_path();
        if cached.exists() {
            candidates.push(LibrarySource::Cached(cached));
        }
        candidates.push(LibrarySource::System);
        candidates
    }

    /// Download the platform archive and extract the library into the cache.
    fn download(&self) -> Result<PathBuf, BootstrapError> {
        let (archive, inner_path) = platform_archive()?;
        let url = format!("{RELEASE_BASE_URL}/chromium%2F{PDFIUM_VERSION}/{archive}");

        std::fs::create_dir_all(&self.cache_dir).map_err(|source| BootstrapError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;

        info!("Downloading PDFium {} from {}", PDFIUM_VERSION, url);
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("pdfium-bootstrap/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| BootstrapError::Download(e.to_string()))?;

        let response = client
            .get(&url)
            .send()
            .map_err(|e| BootstrapError::Download(format!("GET {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(BootstrapError::Download(format!(
                "HTTP {} for {url}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| BootstrapError::Download(format!("reading body: {e}")))?;

        let dest = self.cached_library_path();
        // Unpack next to the destination, then rename, so an interrupted
        // extraction never leaves a truncated library behind.
        let partial = dest.with_extension("partial");
        unpack_member(&bytes, inner_path, &partial)?;
        std::fs::rename(&partial, &dest).map_err(|source| BootstrapError::CacheDir {
            path: dest.clone(),
            source,
        })?;

        info!("PDFium cached at {}", dest.display());
        Ok(dest)
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Copy one member of a `.tgz` archive to `dest`.
fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), BootstrapError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut tar = Archive::new(GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| BootstrapError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| BootstrapError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p.to_string_lossy() == member)
            .map_err(|e| BootstrapError::Extract(e.to_string()))?;
        if matches {
            entry
                .unpack(dest)
                .map_err(|e| BootstrapError::Extract(format!("unpack {member}: {e}")))?;
            return Ok(());
        }
    }

    Err(BootstrapError::Extract(format!(
        "'{member}' is not in the archive"
    )))
}
