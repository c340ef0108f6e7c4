//! OS-level process plumbing: liveness, lookup by port, termination, and
//! the Windows quirks (encoded PowerShell command lines, clipboard).
//!
//! Everything here works on raw pids; pid-file bookkeeping lives in
//! [`crate::process`].

use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{Instant, sleep};
use tracing::debug;

use spindb_model::Platform;

/// Check whether a process with `pid` is currently alive.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // Signal 0 probes for existence. EPERM still means "alive, not ours".
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .output()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout).contains(&format!("\"{pid}\""))
        })
        .unwrap_or(false)
}

/// Best-effort name of the command running as `pid`, used to tell a stale
/// pid that got recycled by an unrelated process from a live server.
#[cfg(unix)]
pub async fn process_command(pid: u32) -> Option<String> {
    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "comm="])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let comm = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!comm.is_empty()).then_some(comm)
}

#[cfg(windows)]
pub async fn process_command(pid: u32) -> Option<String> {
    let output = Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .output()
        .await
        .ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    // CSV row: "image","pid",...
    let row = stdout.lines().find(|l| l.contains(&format!("\"{pid}\"")))?;
    row.split(',').next().map(|s| s.trim_matches('"').to_string())
}

/// Find the pid listening on `127.0.0.1:port`, if any.
///
/// Some engines fork away from their launcher and never hand us a usable
/// child pid; after the readiness probe succeeds, `start` recovers the
/// real pid through this lookup.
pub async fn find_process_by_port(port: u16) -> Result<Option<u32>> {
    if cfg!(windows) {
        return find_process_by_port_windows(port).await;
    }
    let output = Command::new("lsof")
        .args([
            "-t",
            &format!("-iTCP:{port}"),
            "-sTCP:LISTEN",
        ])
        .output()
        .await;
    match output {
        Ok(out) => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            Ok(stdout
                .lines()
                .find_map(|line| line.trim().parse::<u32>().ok()))
        }
        // lsof missing (minimal Linux); fall back to ss.
        Err(_) => find_process_by_port_ss(port).await,
    }
}

async fn find_process_by_port_ss(port: u16) -> Result<Option<u32>> {
    let output = Command::new("ss")
        .args(["-ltnp", &format!("sport = :{port}")])
        .output()
        .await
        .context("neither lsof nor ss is available for port lookup")?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Rows look like: LISTEN 0 128 127.0.0.1:5432 ... users:(("postgres",pid=1234,fd=5))
    for line in stdout.lines() {
        if let Some(idx) = line.find("pid=") {
            let rest = &line[idx + 4..];
            let digits: String =
                rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(pid) = digits.parse::<u32>() {
                return Ok(Some(pid));
            }
        }
    }
    Ok(None)
}

async fn find_process_by_port_windows(port: u16) -> Result<Option<u32>> {
    let script = format!(
        "(Get-NetTCPConnection -LocalPort {port} -State Listen -ErrorAction SilentlyContinue | Select-Object -First 1).OwningProcess"
    );
    let output = powershell(&script)
        .output()
        .await
        .context("failed to run PowerShell for port lookup")?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.trim().parse::<u32>().ok())
}

/// Send a graceful termination signal (SIGTERM / `taskkill`).
pub async fn terminate_process(pid: u32) -> Result<()> {
    debug!(pid, "sending graceful termination");
    #[cfg(unix)]
    {
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 && is_process_alive(pid) {
            bail!("failed to signal pid {pid}");
        }
        Ok(())
    }
    #[cfg(windows)]
    {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T"])
            .status()
            .await
            .context("failed to run taskkill")?;
        debug!(pid, ?status, "taskkill finished");
        Ok(())
    }
}

/// Forcibly kill a process (SIGKILL / `taskkill /F`). Best effort.
pub async fn kill_process(pid: u32) {
    debug!(pid, "forcing kill");
    #[cfg(unix)]
    {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status()
            .await;
    }
}

/// Wait until `pid` is gone, up to `timeout`. Returns whether it exited.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_process_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(100)).await;
    }
}

/// Wait until nothing is listening on `port` anymore.
///
/// On Windows a killed listener can hold the port through TIME_WAIT for a
/// few seconds; restarting before it clears fails with a bind error.
pub async fn wait_for_port_release(port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match find_process_by_port(port).await {
            Ok(None) => return true,
            Ok(Some(_)) | Err(_) => {}
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(250)).await;
    }
}

/// Build a PowerShell invocation with the script passed as a
/// base64-encoded UTF-16LE `-EncodedCommand`, so quoting and non-ASCII
/// survive the Windows command line.
pub fn powershell(script: &str) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.args([
        "-NoProfile",
        "-NonInteractive",
        "-EncodedCommand",
        &encode_powershell(script),
    ]);
    cmd
}

/// Encode a script the way `-EncodedCommand` expects.
pub fn encode_powershell(script: &str) -> String {
    let utf16le: Vec<u8> = script
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    BASE64.encode(utf16le)
}

/// Copy `text` to the system clipboard using the platform's native tool.
pub async fn copy_to_clipboard(text: &str) -> Result<()> {
    let candidates: &[(&str, &[&str])] = match Platform::current() {
        Platform::Darwin => &[("pbcopy", &[])],
        Platform::Win32 => &[("clip", &[])],
        Platform::Linux => &[
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
        ],
    };

    let mut last_err = None;
    for (program, args) in candidates {
        match pipe_to(program, args, text).await {
            Ok(()) => return Ok(()),
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(err),
        None => bail!("no clipboard tool available"),
    }
}

async fn pipe_to(program: &str, args: &[&str], input: &str) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
        drop(stdin);
    }
    let status = child.wait().await?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn absurd_pid_is_dead() {
        // Pid numbers cap well below this on every supported platform.
        assert!(!is_process_alive(u32::MAX - 1));
    }

    #[test]
    fn powershell_encoding_is_utf16le_base64() {
        // "dir" -> 64 00 69 00 72 00
        assert_eq!(encode_powershell("dir"), "ZABpAHIA");
    }

    #[tokio::test]
    async fn port_lookup_on_free_port_is_none() {
        // Bind-then-drop to find a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let found = find_process_by_port(port).await.unwrap_or(None);
        assert_eq!(found, None);
    }
}
