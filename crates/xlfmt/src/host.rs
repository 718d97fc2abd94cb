//! The host capability and its WINE bridge implementation.
//!
//! A [`Host`] stands in for "a live Excel reachable over some transport".
//! [`WineHost`] is the real one: it spawns the `xlfmt-bridge.exe` Windows
//! executable under WINE and exchanges one JSON object per line over
//! stdin/stdout. Tests substitute a scripted implementation via
//! [`Session::open_with`].
//!
//! [`Session::open_with`]: crate::Session::open_with

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};

use xlfmt_protocol::{Command, ErrorKind, Request, Response, ResponseData, ResponseResult};

use crate::error::{Error, Result};

/// A connection to the spreadsheet host application.
///
/// Implementations may rewrite environment-specific fields of a command
/// (workbook and cache paths) before it reaches the host; callers always
/// pass paths as they see them.
pub trait Host {
    /// Send one command and block until its response arrives.
    fn call(&mut self, command: Command) -> Result<Option<ResponseData>>;

    /// Discard the host's persisted dispatch bindings and restart it.
    /// The recovery path for [`Error::StaleBindings`].
    fn clear_bindings(&mut self) -> Result<()>;
}

/// Configuration for the WINE bridge host.
#[derive(Debug, Clone)]
pub struct WineHostConfig {
    /// Path to the `xlfmt-bridge.exe` Windows executable.
    /// If None, searches next to the current binary and in the target dirs.
    pub bridge_exe_path: Option<PathBuf>,

    /// Path to the WINE executable. Defaults to "wine".
    pub wine_path: PathBuf,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,

    /// Directory holding the persisted dispatch bindings.
    /// Defaults to `<user cache dir>/xlfmt/bindings`.
    pub bindings_dir: Option<PathBuf>,
}

impl Default for WineHostConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            wine_path: PathBuf::from("wine"),
            wine_prefix: None,
            bindings_dir: None,
        }
    }
}

/// The real [`Host`]: a `wine xlfmt-bridge.exe` subprocess driven over
/// line-oriented JSON.
///
/// Single-threaded by contract: one host, one owner, blocking calls.
pub struct WineHost {
    config: WineHostConfig,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    bindings_dir: PathBuf,
}

impl WineHost {
    /// Spawn the bridge process. Excel itself is not started until the
    /// session sends `Init`.
    pub fn spawn(config: WineHostConfig) -> Result<Self> {
        let exe_path = config
            .bridge_exe_path
            .clone()
            .unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(Error::BridgeExeNotFound(exe_path.display().to_string()));
        }

        let bindings_dir = config
            .bindings_dir
            .clone()
            .unwrap_or_else(default_bindings_dir);

        let mut cmd = std::process::Command::new(&config.wine_path);

        if let Some(prefix) = &config.wine_prefix {
            cmd.env("WINEPREFIX", prefix);
        }

        cmd.arg(&exe_path);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge diagnostics go to our stderr

        tracing::info!(exe = %exe_path.display(), "spawning WINE bridge");
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::WineNotFound
            } else {
                Error::SpawnFailed(e)
            }
        })?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        Ok(Self {
            config,
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
            bindings_dir,
        })
    }

    /// The Linux-side directory holding the dispatch binding cache.
    pub fn bindings_dir(&self) -> &Path {
        &self.bindings_dir
    }

    /// Send one request line and read one response line.
    fn round_trip(&mut self, command: Command) -> Result<Option<ResponseData>> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;

        writeln!(self.stdin, "{json}").map_err(|e| Error::SendFailed(e.to_string()))?;
        self.stdin
            .flush()
            .map_err(|e| Error::SendFailed(e.to_string()))?;

        let mut line = String::new();
        self.stdout
            .read_line(&mut line)
            .map_err(|e| Error::ReadFailed(e.to_string()))?;

        if line.is_empty() {
            return Err(Error::NotRunning);
        }

        let response: Response = serde_json::from_str(&line)?;
        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error {
                kind: ErrorKind::StaleBindings,
                message,
            } => Err(Error::StaleBindings(message)),
            ResponseResult::Error { message, .. } => Err(Error::Host(message)),
        }
    }

    /// Rewrite Linux paths in a command into WINE (`Z:\`) paths.
    fn localize(&self, command: Command) -> Command {
        match command {
            Command::Init {
                visible,
                display_alerts,
                screen_updating,
                enable_events,
                bindings_dir: None,
            } => Command::Init {
                visible,
                display_alerts,
                screen_updating,
                enable_events,
                bindings_dir: Some(to_wine_path(&self.bindings_dir)),
            },
            Command::OpenWorkbook { path } => Command::OpenWorkbook {
                path: to_wine_path(Path::new(&path)),
            },
            other => other,
        }
    }
}

impl Host for WineHost {
    fn call(&mut self, command: Command) -> Result<Option<ResponseData>> {
        let command = self.localize(command);
        self.round_trip(command)
    }

    fn clear_bindings(&mut self) -> Result<()> {
        // Quit the current instance; its in-memory bindings die with it.
        let _ = self.round_trip(Command::Shutdown);
        let _ = self.child.wait();

        if self.bindings_dir.exists() {
            tracing::info!(dir = %self.bindings_dir.display(), "clearing dispatch binding cache");
            fs::remove_dir_all(&self.bindings_dir).map_err(|source| Error::CacheClear {
                path: self.bindings_dir.clone(),
                source,
            })?;
        }

        *self = Self::spawn(self.config.clone())?;
        Ok(())
    }
}

/// Convert a Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes
/// `Z:\home\user\file.xlsx`.
pub fn to_wine_path(linux_path: &Path) -> String {
    let abs = if linux_path.is_absolute() {
        linux_path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(linux_path)
    };

    format!("Z:{}", abs.display()).replace('/', "\\")
}

/// Default location of the dispatch binding cache.
fn default_bindings_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("xlfmt")
        .join("bindings")
}

/// Attempt to locate the bridge exe relative to the current executable or in
/// common target paths.
fn find_bridge_exe() -> PathBuf {
    // Check next to the current executable
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join("xlfmt-bridge.exe");
        if candidate.exists() {
            return candidate;
        }
    }

    // Check in the target directory (for development)
    for profile in ["release", "debug"] {
        let candidate = PathBuf::from(format!(
            "target/x86_64-pc-windows-gnu/{profile}/xlfmt-bridge.exe"
        ));
        if candidate.exists() {
            return candidate;
        }
    }

    // Default: assume it's in the current directory
    PathBuf::from("xlfmt-bridge.exe")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wine_path_maps_root_to_z() {
        assert_eq!(
            to_wine_path(Path::new("/home/user/report.xlsx")),
            "Z:\\home\\user\\report.xlsx"
        );
    }

    #[test]
    fn wine_path_absolutizes_relative_paths() {
        let mapped = to_wine_path(Path::new("report.xlsx"));
        assert!(mapped.starts_with("Z:\\"));
        assert!(mapped.ends_with("report.xlsx"));
    }
}
