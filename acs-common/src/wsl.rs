//! Local WSL backend: the same file/command contract as the SSH backend,
//! carried by short-lived `wsl.exe` invocations instead of a pooled
//! session.
//!
//! Security boundary: distribution names and file paths arrive from
//! user-editable configuration and MUST pass the allow-list validators in
//! this module before they are interpolated anywhere. All invocations use
//! argument vectors (no shell parsing on the Windows side); the one
//! unavoidable `sh -c` wrapper is the delimiter-bounded content transfer
//! in [`write_script`], which quotes the path and picks a delimiter that
//! cannot occur in the content.

use crate::config::WslSettings;
use crate::error::{RemoteError, RemoteResult};
use crate::homedir::HomeDirCache;
use crate::types::{CommandResult, DistroInfo, DistroState};
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How long a cached home path is trusted. WSL distributions are
/// reconfigured often enough that indefinite caching goes stale.
const HOME_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Budget for the availability check (`wsl --version`).
const AVAILABLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Budget for starting a stopped distribution.
const START_TIMEOUT: Duration = Duration::from_secs(10);

/// True if `name` is a plausible distribution name: alphanumerics plus
/// dash, underscore, and dot. Everything else is rejected before any
/// subprocess sees it.
pub fn is_valid_distro_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// True if `path` is an absolute Linux path with no parent-directory
/// traversal sequence.
pub fn is_valid_linux_path(path: &str) -> bool {
    path.starts_with('/') && !path.contains("..")
}

fn ensure_distro_name(name: &str) -> RemoteResult<()> {
    if is_valid_distro_name(name) {
        Ok(())
    } else {
        Err(RemoteError::InvalidTarget(format!(
            "distribution name {name:?} contains characters outside [A-Za-z0-9._-]"
        )))
    }
}

fn ensure_linux_path(path: &str) -> RemoteResult<()> {
    if is_valid_linux_path(path) {
        Ok(())
    } else {
        Err(RemoteError::InvalidTarget(format!(
            "path {path:?} must be absolute and free of traversal sequences"
        )))
    }
}

/// Single-quote `value` for POSIX sh, escaping embedded quotes.
fn shell_single_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Pick a heredoc delimiter that does not occur anywhere in `content`, so
/// the content can never terminate the transfer early or smuggle commands
/// after it.
fn pick_delimiter(content: &str) -> String {
    let mut n = 0u32;
    loop {
        let candidate = if n == 0 {
            "ACS_EOF".to_string()
        } else {
            format!("ACS_EOF_{n}")
        };
        if !content.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Build the `sh -c` script for a byte-exact file write.
///
/// The heredoc always appends one newline to the stream; `head -c <len>`
/// trims it back off, so content without a trailing newline round-trips
/// byte-identical.
fn write_script(path: &str, content: &str) -> String {
    let delimiter = pick_delimiter(content);
    let dir = match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    };
    format!(
        "mkdir -p {dir} && head -c {len} > {path} <<'{delimiter}'\n{content}\n{delimiter}\n",
        dir = shell_single_quote(dir),
        len = content.len(),
        path = shell_single_quote(path),
    )
}

/// Decode `wsl.exe` console output, which arrives as UTF-16LE on most
/// hosts and plain UTF-8 under some shims.
fn decode_console_text(bytes: &[u8]) -> String {
    let (body, bom) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, true),
        _ => (bytes, false),
    };
    if bom || body.contains(&0) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

/// Parse `wsl -l -v` output. Malformed lines are skipped, not fatal.
fn parse_distro_listing(output: &str) -> Vec<DistroInfo> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let line_re = LINE.get_or_init(|| {
        Regex::new(r"^\s*(\*)?\s*(\S+)\s+(Running|Stopped)\s+(\d+)").unwrap()
    });

    let mut distros = Vec::new();
    for line in output.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = line_re.captures(line) else {
            debug!(line, "skipping malformed listing line");
            continue;
        };
        distros.push(DistroInfo {
            name: caps[2].to_string(),
            state: if &caps[3] == "Running" {
                DistroState::Running
            } else {
                DistroState::Stopped
            },
            version: caps[4].parse().unwrap_or(2),
            is_default: caps.get(1).is_some(),
            home_path: None,
        });
    }
    distros
}

#[derive(Debug)]
struct RawOutput {
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    duration_ms: u64,
}

impl RawOutput {
    fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn stderr_text(&self) -> String {
        decode_console_text(&self.stderr).trim().to_string()
    }
}

/// File and command operations against local WSL distributions.
pub struct WslBackend {
    settings: WslSettings,
    homes: HomeDirCache,
}

impl WslBackend {
    pub fn new(settings: WslSettings) -> Self {
        Self {
            settings,
            homes: HomeDirCache::with_ttl(HOME_CACHE_TTL),
        }
    }

    fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.exec_timeout_ms)
    }

    fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.transfer_timeout_ms)
    }

    /// Spawn one bounded, output-capped launcher invocation.
    async fn run(&self, args: &[&str], timeout: Duration) -> RemoteResult<RawOutput> {
        let started = Instant::now();
        let mut child = Command::new(&self.settings.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                RemoteError::io(format!("spawn {:?}", self.settings.command), err)
            })?;

        let cap = self.settings.max_output_bytes;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let execution = async {
            let (stdout, stderr) =
                tokio::try_join!(read_capped(stdout, cap), read_capped(stderr, cap))?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let context = format!("{} {}", self.settings.command, args.join(" "));
        match tokio::time::timeout(timeout, execution).await {
            Ok(Ok((status, stdout, stderr))) => {
                if stdout.len() as u64 > cap || stderr.len() as u64 > cap {
                    return Err(RemoteError::io(
                        context,
                        format!("output exceeded {cap} byte cap"),
                    ));
                }
                Ok(RawOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(err)) => Err(RemoteError::io(context, err)),
            // kill_on_drop reaps the abandoned child.
            Err(_) => Err(RemoteError::timeout(context, timeout)),
        }
    }

    /// True if a usable launcher is on this host.
    pub async fn check_available(&self) -> bool {
        matches!(
            self.run(&["--version"], AVAILABLE_TIMEOUT).await,
            Ok(output) if output.success()
        )
    }

    /// Enumerate distributions with best-effort home paths; a distribution
    /// whose home cannot be resolved is still listed.
    pub async fn discover_distros(&self) -> RemoteResult<Vec<DistroInfo>> {
        let output = self.run(&["-l", "-v"], self.exec_timeout()).await?;
        if !output.success() {
            return Err(RemoteError::io(
                "list distributions",
                output.stderr_text(),
            ));
        }

        let mut distros = parse_distro_listing(&decode_console_text(&output.stdout));
        for distro in &mut distros {
            match self.resolve_home(&distro.name).await {
                Ok(home) => distro.home_path = Some(home),
                Err(err) => {
                    warn!(distro = %distro.name, error = %err, "could not resolve home path");
                }
            }
        }
        info!(count = distros.len(), "discovered wsl distributions");
        Ok(distros)
    }

    /// Start `name` if it is stopped; running distributions are untouched.
    pub async fn ensure_running(&self, name: &str) -> RemoteResult<()> {
        ensure_distro_name(name)?;
        let distros = self.discover_distros().await?;
        let distro = distros
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| RemoteError::InvalidTarget(format!("unknown distribution {name:?}")))?;
        if distro.state == DistroState::Stopped {
            self.start_distro(name).await?;
        }
        Ok(())
    }

    /// Start a distribution via a trivial no-op command. Idempotent.
    pub async fn start_distro(&self, name: &str) -> RemoteResult<()> {
        ensure_distro_name(name)?;
        info!(distro = name, "starting distribution");
        let output = self.run(&["-d", name, "-e", "true"], START_TIMEOUT).await?;
        if output.success() {
            Ok(())
        } else {
            Err(RemoteError::io(
                format!("start {name}"),
                output.stderr_text(),
            ))
        }
    }

    pub async fn stop_distro(&self, name: &str) -> RemoteResult<()> {
        ensure_distro_name(name)?;
        info!(distro = name, "terminating distribution");
        let output = self
            .run(&["--terminate", name], self.exec_timeout())
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(RemoteError::io(format!("stop {name}"), output.stderr_text()))
        }
    }

    pub async fn set_default_distro(&self, name: &str) -> RemoteResult<()> {
        ensure_distro_name(name)?;
        let output = self
            .run(&["--set-default", name], self.exec_timeout())
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(RemoteError::io(
                format!("set default {name}"),
                output.stderr_text(),
            ))
        }
    }

    /// Run one command inside the distribution's default shell.
    pub async fn exec(&self, name: &str, command: &str) -> RemoteResult<CommandResult> {
        ensure_distro_name(name)?;
        let output = self
            .run(
                &["-d", name, "-e", "sh", "-c", command],
                self.transfer_timeout(),
            )
            .await?;
        Ok(CommandResult {
            exit_code: output.exit_code,
            stdout: decode_console_text(&output.stdout),
            stderr: output.stderr_text(),
            duration_ms: output.duration_ms,
        })
    }

    /// No-op reachability probe against one distribution.
    pub async fn probe(&self, name: &str) -> RemoteResult<()> {
        ensure_distro_name(name)?;
        let output = self
            .run(&["-d", name, "-e", "true"], self.exec_timeout())
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(RemoteError::io(
                format!("probe {name}"),
                output.stderr_text(),
            ))
        }
    }

    /// Read a whole file from the distribution.
    pub async fn read_file(&self, name: &str, path: &str) -> RemoteResult<String> {
        ensure_distro_name(name)?;
        ensure_linux_path(path)?;

        let output = self
            .run(&["-d", name, "-e", "cat", path], self.transfer_timeout())
            .await?;
        if !output.success() {
            return Err(RemoteError::io(
                format!("read {path} in {name}"),
                output.stderr_text(),
            ));
        }
        debug!(distro = name, path, bytes = output.stdout.len(), "read file");
        String::from_utf8(output.stdout)
            .map_err(|err| RemoteError::io(format!("read {path} in {name}"), err))
    }

    /// Replace a file wholesale via the delimiter-bounded transfer,
    /// creating missing parent directories first.
    pub async fn write_file(&self, name: &str, path: &str, content: &str) -> RemoteResult<()> {
        ensure_distro_name(name)?;
        ensure_linux_path(path)?;
        if content.contains('\0') {
            return Err(RemoteError::io(
                format!("write {path} in {name}"),
                "content contains NUL bytes",
            ));
        }

        // The whole payload rides the launcher's command line; config-sized
        // files only.
        let script = write_script(path, content);
        let output = self
            .run(
                &["-d", name, "-e", "sh", "-c", script.as_str()],
                self.transfer_timeout(),
            )
            .await?;
        if !output.success() {
            return Err(RemoteError::io(
                format!("write {path} in {name}"),
                output.stderr_text(),
            ));
        }
        debug!(distro = name, path, bytes = content.len(), "wrote file");
        Ok(())
    }

    /// Delete a file; a missing file is success.
    pub async fn unlink(&self, name: &str, path: &str) -> RemoteResult<()> {
        ensure_distro_name(name)?;
        ensure_linux_path(path)?;

        let output = self
            .run(&["-d", name, "-e", "rm", "-f", path], self.exec_timeout())
            .await?;
        if output.success() {
            debug!(distro = name, path, "unlinked file");
            Ok(())
        } else {
            Err(RemoteError::io(
                format!("unlink {path} in {name}"),
                output.stderr_text(),
            ))
        }
    }

    /// Resolve the distribution's home directory, trusted for five
    /// minutes.
    pub async fn resolve_home(&self, name: &str) -> RemoteResult<String> {
        ensure_distro_name(name)?;
        if let Some(home) = self.homes.get(name) {
            return Ok(home);
        }

        let output = self
            .run(
                &["-d", name, "-e", "sh", "-c", "printf %s \"$HOME\""],
                self.exec_timeout(),
            )
            .await?;
        let home = decode_console_text(&output.stdout).trim().to_string();
        if !output.success() || home.is_empty() {
            return Err(RemoteError::io(
                format!("resolve home of {name}"),
                output.stderr_text(),
            ));
        }
        self.homes.insert(name, home.clone());
        Ok(home)
    }
}

async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    cap: u64,
) -> std::io::Result<Vec<u8>> {
    match reader {
        Some(reader) => {
            let mut buf = Vec::new();
            reader.take(cap + 1).read_to_end(&mut buf).await?;
            Ok(buf)
        }
        None => Ok(Vec::new()),
    }
}
