//! Browser session registry.
//!
//! Owns the mapping from session id to a live browser process and, within
//! it, to one or more page handles. One isolated browser process per
//! session; pages are CDP page targets inside that process. All map access
//! goes through this registry so create/destroy stay atomic: no caller can
//! observe a half-destroyed session.

use crate::cdp::CdpClient;
use crate::launch;
use autoapply_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Page id used when the caller does not supply one.
pub const DEFAULT_PAGE_ID: &str = "main";

struct PageEntry {
    target_id: String,
    cdp: Arc<CdpClient>,
    current_url: Option<String>,
}

struct SessionEntry {
    created_at: DateTime<Utc>,
    process: Child,
    debug_port: u16,
    pages: HashMap<String, PageEntry>,
}

/// A cheap handle to a live page. Holding one does not pin the session:
/// operations racing a destroy must tolerate the registry entry being gone
/// when they come back to it.
#[derive(Clone, Debug)]
pub struct PageRef {
    pub session_id: String,
    pub page_id: String,
    pub target_id: String,
    pub cdp: Arc<CdpClient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageBrief {
    pub page_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionBrief {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub pages: Vec<PageBrief>,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    base_dir: PathBuf,
    max_sessions: usize,
    headless: bool,
}

impl SessionRegistry {
    pub fn new(base_dir: PathBuf, max_sessions: usize, headless: bool) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            base_dir,
            max_sessions,
            headless,
        }
    }

    /// Create a session: launch an isolated browser and register it.
    ///
    /// Rejects with `CapacityExceeded` once the admission ceiling is reached,
    /// without mutating the registry. A caller-supplied id that is already
    /// live is returned as-is. Because the launch spans a suspension point,
    /// capacity is re-validated at insert; a launch that loses that race is
    /// closed and rejected.
    pub async fn create(&self, requested_id: Option<String>) -> Result<String> {
        {
            let sessions = self.sessions.lock().await;
            if let Some(id) = &requested_id {
                if sessions.contains_key(id) {
                    return Ok(id.clone());
                }
            }
            if sessions.len() >= self.max_sessions {
                return Err(Error::CapacityExceeded(sessions.len()));
            }
        }

        let session_id = requested_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let launched = launch::launch_browser(&self.base_dir, &session_id, self.headless).await?;
        let ws_url = launch::get_page_ws_url(launched.debug_port).await?;
        let cdp = CdpClient::connect(&ws_url).await?;
        enable_page_domains(&cdp).await?;

        // The page WebSocket URL ends in /devtools/page/<targetId>.
        let target_id = ws_url.rsplit('/').next().unwrap_or_default().to_string();

        let mut pages = HashMap::new();
        pages.insert(
            DEFAULT_PAGE_ID.to_string(),
            PageEntry {
                target_id,
                cdp: Arc::new(cdp),
                current_url: None,
            },
        );

        let entry = SessionEntry {
            created_at: Utc::now(),
            process: launched.process,
            debug_port: launched.debug_port,
            pages,
        };

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session_id) {
            // A concurrent create with the same caller-supplied id won.
            drop(sessions);
            close_entry(&session_id, entry).await;
            return Ok(session_id);
        }
        if sessions.len() >= self.max_sessions {
            let live = sessions.len();
            drop(sessions);
            warn!(session = %session_id, live, "Capacity filled during launch, closing loser");
            close_entry(&session_id, entry).await;
            return Err(Error::CapacityExceeded(live));
        }
        sessions.insert(session_id.clone(), entry);
        info!(session = %session_id, live = sessions.len(), "Session registered");
        Ok(session_id)
    }

    /// Return the page for `(session_id, page_id)`, creating it lazily as a
    /// new browser tab when absent. `SessionNotFound` for unknown sessions.
    pub async fn get_or_create_page(
        &self,
        session_id: &str,
        page_id: Option<&str>,
    ) -> Result<PageRef> {
        let page_id = page_id.unwrap_or(DEFAULT_PAGE_ID);

        let (main_cdp, debug_port) = {
            let sessions = self.sessions.lock().await;
            let entry = sessions
                .get(session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
            if let Some(page) = entry.pages.get(page_id) {
                return Ok(PageRef {
                    session_id: session_id.to_string(),
                    page_id: page_id.to_string(),
                    target_id: page.target_id.clone(),
                    cdp: page.cdp.clone(),
                });
            }
            let main = entry.pages.get(DEFAULT_PAGE_ID).ok_or_else(|| {
                Error::Infrastructure(format!("Session {} has no main page", session_id))
            })?;
            (main.cdp.clone(), entry.debug_port)
        };

        // Target creation spans suspension points; re-validate afterwards.
        let target_id = main_cdp.create_target("about:blank").await?;
        let ws_url = launch::get_target_ws_url(debug_port, &target_id).await?;
        let page_cdp = CdpClient::connect(&ws_url).await?;
        enable_page_domains(&page_cdp).await?;
        let page_cdp = Arc::new(page_cdp);

        let mut sessions = self.sessions.lock().await;
        let entry = match sessions.get_mut(session_id) {
            Some(e) => e,
            None => {
                // Session destroyed while the tab was being created; the
                // browser is already gone, so just report not-found.
                return Err(Error::SessionNotFound(session_id.to_string()));
            }
        };
        if let Some(existing) = entry.pages.get(page_id) {
            // Another handler created this page meanwhile; keep theirs.
            let winner = PageRef {
                session_id: session_id.to_string(),
                page_id: page_id.to_string(),
                target_id: existing.target_id.clone(),
                cdp: existing.cdp.clone(),
            };
            drop(sessions);
            let _ = main_cdp.close_target(&target_id).await;
            return Ok(winner);
        }
        entry.pages.insert(
            page_id.to_string(),
            PageEntry {
                target_id: target_id.clone(),
                cdp: page_cdp.clone(),
                current_url: None,
            },
        );
        debug!(session = session_id, page = page_id, "Page created");
        Ok(PageRef {
            session_id: session_id.to_string(),
            page_id: page_id.to_string(),
            target_id,
            cdp: page_cdp,
        })
    }

    /// Current URL of a page, if the session and page are still live.
    pub async fn current_url(&self, session_id: &str, page_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id)
            .and_then(|e| e.pages.get(page_id))
            .and_then(|p| p.current_url.clone())
    }

    /// Record a page's URL after navigation. Returns false when the entry is
    /// gone (a navigation that lost a race against destroy); the caller
    /// discards its result in that case.
    pub async fn set_current_url(&self, session_id: &str, page_id: &str, url: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions
            .get_mut(session_id)
            .and_then(|e| e.pages.get_mut(page_id))
        {
            Some(page) => {
                page.current_url = Some(url.to_string());
                true
            }
            None => {
                debug!(
                    session = session_id,
                    page = page_id,
                    "Discarding URL update for destroyed session"
                );
                false
            }
        }
    }

    /// Destroy a session: remove it from the registry in one critical
    /// section, then close pages and the browser. Idempotent — destroying an
    /// unknown or already-destroyed session is a no-op, because shutdown
    /// paths may race client-initiated cleanup.
    pub async fn destroy(&self, session_id: &str) {
        let entry = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session_id)
        };
        match entry {
            Some(e) => {
                info!(session = session_id, "Destroying session");
                close_entry(session_id, e).await;
            }
            None => {
                debug!(session = session_id, "destroy: session already gone (no-op)");
            }
        }
    }

    /// Close every live session. Failures on individual sessions are logged
    /// and do not block the rest of the drain.
    pub async fn drain(&self) {
        let ids: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions.keys().cloned().collect()
        };
        if !ids.is_empty() {
            info!(count = ids.len(), "Draining session registry");
        }
        for id in ids {
            self.destroy(&id).await;
        }
    }

    pub async fn list(&self) -> Vec<SessionBrief> {
        let sessions = self.sessions.lock().await;
        let mut briefs: Vec<SessionBrief> = sessions
            .iter()
            .map(|(id, entry)| SessionBrief {
                session_id: id.clone(),
                created_at: entry.created_at,
                pages: entry
                    .pages
                    .iter()
                    .map(|(pid, p)| PageBrief {
                        page_id: pid.clone(),
                        url: p.current_url.clone(),
                    })
                    .collect(),
            })
            .collect();
        briefs.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        briefs
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }
}

async fn enable_page_domains(cdp: &CdpClient) -> Result<()> {
    cdp.enable_domain("Page").await?;
    cdp.enable_domain("Runtime").await?;
    cdp.enable_domain("DOM").await?;
    cdp.enable_domain("Network").await?;
    cdp.set_lifecycle_events_enabled().await?;
    Ok(())
}

/// Close a session's pages and browser process. Only called on entries
/// already removed from the map, so failures here can never leave a
/// half-destroyed session visible.
async fn close_entry(session_id: &str, mut entry: SessionEntry) {
    if let Some(page) = entry.pages.get(DEFAULT_PAGE_ID) {
        if let Err(e) = page.cdp.close_browser().await {
            debug!(session = session_id, error = %e, "Graceful browser close failed (may already be gone)");
        }
    }
    // Dropping the CDP clients aborts their socket tasks.
    entry.pages.clear();
    if let Err(e) = entry.process.kill().await {
        debug!(session = session_id, error = %e, "Browser process kill failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry(max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(std::env::temp_dir().join("autoapply-test"), max_sessions, true)
    }

    /// Register a session entry backed by a dummy process instead of a real
    /// browser, so lifecycle invariants can be tested without Chrome.
    async fn register_stub(registry: &SessionRegistry, id: &str) {
        let process = tokio::process::Command::new("sleep")
            .arg("60")
            .kill_on_drop(true)
            .spawn()
            .expect("spawn stub process");
        let entry = SessionEntry {
            created_at: Utc::now(),
            process,
            debug_port: 0,
            pages: HashMap::new(),
        };
        registry.sessions.lock().await.insert(id.to_string(), entry);
    }

    #[tokio::test]
    async fn test_destroy_removes_session_and_pages() {
        let registry = test_registry(10);
        register_stub(&registry, "s1").await;
        assert!(registry.contains("s1").await);

        registry.destroy("s1").await;
        assert!(!registry.contains("s1").await);
        // Page lookup for the destroyed id reports SessionNotFound.
        let err = registry.get_or_create_page("s1", None).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let registry = test_registry(10);
        register_stub(&registry, "s1").await;

        registry.destroy("s1").await;
        registry.destroy("s1").await;
        registry.destroy("never-existed").await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_rejection_does_not_mutate() {
        let registry = test_registry(2);
        register_stub(&registry, "s1").await;
        register_stub(&registry, "s2").await;

        let err = registry.create(None).await.unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(2)));
        assert_eq!(registry.len().await, 2);
        assert!(registry.contains("s1").await);
        assert!(registry.contains("s2").await);
    }

    #[tokio::test]
    async fn test_create_existing_id_is_returned() {
        let registry = test_registry(2);
        register_stub(&registry, "s1").await;

        let id = registry
            .create(Some("s1".to_string()))
            .await
            .expect("existing id");
        assert_eq!(id, "s1");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_url_update_discarded_after_destroy() {
        let registry = test_registry(10);
        register_stub(&registry, "s1").await;
        registry.destroy("s1").await;

        // A navigation that lost a race against destroy must not write back.
        assert!(!registry.set_current_url("s1", DEFAULT_PAGE_ID, "https://example.com").await);
        assert!(registry.current_url("s1", DEFAULT_PAGE_ID).await.is_none());
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = test_registry(10);
        register_stub(&registry, "s1").await;
        register_stub(&registry, "s2").await;
        register_stub(&registry, "s3").await;

        registry.drain().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_reports_sessions() {
        let registry = test_registry(10);
        register_stub(&registry, "b").await;
        register_stub(&registry, "a").await;

        let briefs = registry.list().await;
        assert_eq!(briefs.len(), 2);
        assert_eq!(briefs[0].session_id, "a");
        assert_eq!(briefs[1].session_id, "b");
    }
}
