//! Browser process launching and CDP endpoint discovery.
//!
//! One isolated Chrome/Chromium process per session, each with its own user
//! data directory and remote-debugging port.

use autoapply_core::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

/// A launched browser process with its CDP debug port.
pub struct LaunchedBrowser {
    pub process: Child,
    pub debug_port: u16,
    pub user_data_dir: PathBuf,
}

/// Launch a browser with an isolated user data dir under `base_dir` and wait
/// for its CDP endpoint to come up.
pub async fn launch_browser(
    base_dir: &Path,
    session_id: &str,
    headless: bool,
) -> Result<LaunchedBrowser> {
    let browser_path = find_browser_binary()
        .ok_or_else(|| Error::Infrastructure("No Chrome/Chromium binary found".to_string()))?;

    let user_data_dir = base_dir.join("sessions").join(session_id);
    std::fs::create_dir_all(&user_data_dir)
        .map_err(|e| Error::Infrastructure(format!("Failed to create user data dir: {}", e)))?;

    let debug_port = find_free_port().await?;
    let args = build_browser_args(debug_port, &user_data_dir, headless);

    info!(
        session = session_id,
        port = debug_port,
        headless = headless,
        "Launching browser for session"
    );

    let child = Command::new(&browser_path)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Infrastructure(format!("Failed to launch browser: {}", e)))?;

    // Wait for CDP to be ready (browser-level)
    wait_for_cdp_ready(debug_port, 15).await?;

    Ok(LaunchedBrowser {
        process: child,
        debug_port,
        user_data_dir,
    })
}

/// Build Chrome command line arguments.
fn build_browser_args(debug_port: u16, user_data_dir: &Path, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--safebrowsing-disable-auto-update".to_string(),
        "--password-store=basic".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push("--window-size=1280,720".to_string());
    args.push("about:blank".to_string());
    args
}

/// Find a Chrome/Chromium binary on the system.
pub fn find_browser_binary() -> Option<String> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Find a free TCP port.
async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Infrastructure(format!("Failed to bind to find free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Infrastructure(format!("Failed to get local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Wait for Chrome's CDP endpoint to become available.
/// Polls /json/version until it responds, up to `timeout_secs`.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<String> {
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Infrastructure(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout_secs, port
            )));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}

/// Connect to the initial page target's WebSocket URL.
/// Chrome exposes /json/list which lists all targets (pages).
/// Retries a few times since the page target may not appear immediately.
pub async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        // Find the first "page" type target
        for target in &targets {
            if target.get("type").and_then(|v| v.as_str()) == Some("page") {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }

    Err(Error::Infrastructure(
        "No page target found after retries".to_string(),
    ))
}

/// Resolve a targetId to its WebSocket debugger URL via /json/list.
pub async fn get_target_ws_url(port: u16, target_id: &str) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        for target in &targets {
            if target.get("targetId").and_then(|v| v.as_str()) == Some(target_id) {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }

    Err(Error::Infrastructure(format!(
        "No WebSocket URL found for targetId '{}' after retries",
        target_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_args() {
        let args = build_browser_args(9222, Path::new("/tmp/profile"), true);
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--remote-debugging-port=9222"));
    }

    #[test]
    fn test_headed_args_omit_headless() {
        let args = build_browser_args(9222, Path::new("/tmp/profile"), false);
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }
}
