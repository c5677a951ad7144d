//! Session registry: the single owner of all browser windows and tabs.
//!
//! One actor task holds the two maps; request handlers never touch them
//! directly and interact only by message. Because the actor processes one
//! message at a time, window and tab mutations are linearizable without
//! locks, and the idle-window GC is a plain branch of the same loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::page::Page;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::{mpsc, oneshot};

use crate::browser::Driver;
use crate::error::Error;

/// Idle timeout assigned to freshly created windows.
pub const DEFAULT_WINDOW_TIMEOUT: Duration = Duration::from_secs(30);

/// How often idle windows are swept.
const GC_INTERVAL: Duration = Duration::from_secs(2);

static TAB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{8})_([0-9a-fA-F]{8})$").expect("tab id pattern"));

/// A long-lived browser context addressed by an 8-hex id. The keeper page
/// holds the context open while no client tab is running in it.
#[derive(Clone)]
pub struct WindowSession {
    pub id: String,
    pub context_id: BrowserContextId,
    pub keeper: Page,
    pub timeout: Duration,
    pub last_used: Instant,
}

/// A page inside a window, addressed by `<window-hex>_<tab-hex>`. The
/// deadline is absolute: it is set when the tab is created and survives a
/// save/load round trip.
#[derive(Clone)]
pub struct TabSession {
    pub id: String,
    pub page: Page,
    pub deadline: Instant,
}

enum RegistryMsg {
    WindowQuery {
        id: String,
        timeout: Duration,
        reply: oneshot::Sender<Result<WindowSession, Error>>,
    },
    WindowClose {
        id: String,
    },
    TabSave {
        tab: TabSession,
    },
    TabLoad {
        id: String,
        reply: oneshot::Sender<Option<TabSession>>,
    },
}

/// Cheap handle onto the registry actor.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::Sender<RegistryMsg>,
}

impl Registry {
    /// Start the actor. Called once at process boot.
    pub fn spawn(driver: Arc<Driver>) -> Registry {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run_actor(driver, rx));
        Registry { tx }
    }

    /// Fetch (or create) a window. An empty or unknown id yields a new
    /// window; an existing window gets its timeout raised to the requested
    /// value and its `last_used` refreshed.
    pub async fn window(&self, id: &str, timeout: Duration) -> Result<WindowSession, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryMsg::WindowQuery {
                id: id.to_string(),
                timeout,
                reply,
            })
            .await
            .map_err(|_| Error::RegistryClosed)?;
        rx.await.map_err(|_| Error::RegistryClosed)?
    }

    pub async fn close_window(&self, id: &str) -> Result<(), Error> {
        self.tx
            .send(RegistryMsg::WindowClose { id: id.to_string() })
            .await
            .map_err(|_| Error::RegistryClosed)
    }

    /// Park a tab for a later `load_tab`.
    pub async fn save_tab(&self, tab: TabSession) -> Result<(), Error> {
        self.tx
            .send(RegistryMsg::TabSave { tab })
            .await
            .map_err(|_| Error::RegistryClosed)
    }

    /// Take a parked tab out of the registry. `None` when the tab is gone
    /// (never saved, already loaded, or reaped with its window).
    pub async fn load_tab(&self, id: &str) -> Result<Option<TabSession>, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryMsg::TabLoad {
                id: id.to_string(),
                reply,
            })
            .await
            .map_err(|_| Error::RegistryClosed)?;
        rx.await.map_err(|_| Error::RegistryClosed)
    }
}

async fn run_actor(driver: Arc<Driver>, mut rx: mpsc::Receiver<RegistryMsg>) {
    let mut windows: HashMap<String, WindowSession> = HashMap::new();
    let mut tabs: HashMap<String, TabSession> = HashMap::new();
    let mut gc = tokio::time::interval(GC_INTERVAL);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                None => break,
                Some(msg) => handle_msg(&driver, &mut windows, &mut tabs, msg).await,
            },
            _ = gc.tick() => gc_sweep(&driver, &mut windows, &mut tabs).await,
        }
    }
}

async fn handle_msg(
    driver: &Driver,
    windows: &mut HashMap<String, WindowSession>,
    tabs: &mut HashMap<String, TabSession>,
    msg: RegistryMsg,
) {
    match msg {
        RegistryMsg::WindowQuery { id, timeout, reply } => {
            let key = if windows.contains_key(&id) {
                id
            } else {
                // Unknown (or empty) id: create a window. The driver keeps a
                // caller-supplied id of plausible length and generates one
                // otherwise.
                match driver.create_window(&id).await {
                    Ok(window) => {
                        let key = window.id.clone();
                        windows.insert(key.clone(), window);
                        key
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return;
                    }
                }
            };
            if let Some(window) = windows.get_mut(&key) {
                if timeout > window.timeout {
                    window.timeout = timeout;
                }
                window.last_used = Instant::now();
                let _ = reply.send(Ok(window.clone()));
            }
        }

        RegistryMsg::WindowClose { id } => {
            if let Some(window) = windows.remove(&id) {
                driver.close_window(&window).await;
            }
        }

        RegistryMsg::TabSave { tab } => {
            let window_alive = match parse_tab_id(&tab.id) {
                Ok((prefix, _)) => {
                    let alive = windows.contains_key(prefix);
                    if !alive {
                        tracing::warn!(
                            "Tab ID ({}) didn't match any window, dropping tab",
                            tab.id
                        );
                    }
                    alive
                }
                Err(e) => {
                    tracing::warn!("Tab ID parse error: {}", e);
                    false
                }
            };
            if window_alive {
                tabs.insert(tab.id.clone(), tab);
            } else {
                driver.close_tab(tab).await;
            }
        }

        RegistryMsg::TabLoad { id, reply } => {
            let _ = reply.send(tabs.remove(&id));
            match parse_tab_id(&id) {
                Ok((prefix, _)) => {
                    if let Some(window) = windows.get_mut(prefix) {
                        window.last_used = Instant::now();
                    } else {
                        tracing::warn!("Tab ID ({}) didn't match any window", id);
                    }
                }
                Err(e) => tracing::warn!("Tab ID parse error: {}", e),
            }
        }
    }
}

async fn gc_sweep(
    driver: &Driver,
    windows: &mut HashMap<String, WindowSession>,
    tabs: &mut HashMap<String, TabSession>,
) {
    let expired: Vec<String> = windows
        .values()
        .filter(|w| w.last_used.elapsed() > w.timeout)
        .map(|w| w.id.clone())
        .collect();

    for id in expired {
        if let Some(window) = windows.remove(&id) {
            tracing::warn!(
                "Window (session {}) was last requested {:.1} seconds ago, closing it",
                id,
                window.last_used.elapsed().as_secs_f64()
            );
            driver.close_window(&window).await;
            tracing::info!("{}", remove_window_tabs(&id, tabs));
        }
    }
}

/// Cascade-remove the tabs of a dead window; returns the diagnostic line.
fn remove_window_tabs(window_id: &str, tabs: &mut HashMap<String, TabSession>) -> String {
    let mut purged = Vec::new();
    tabs.retain(|tab_id, _| match parse_tab_id(tab_id) {
        Ok((prefix, suffix)) if prefix == window_id => {
            purged.push(format!("_{}", suffix));
            false
        }
        _ => true,
    });
    if purged.is_empty() {
        format!("Deleting window {}", window_id)
    } else {
        format!("Deleting window {} including tabs {:?}", window_id, purged)
    }
}

/// Decompose a tab id into its window prefix and tab suffix. Anything but
/// exactly two 8-hex groups joined by one underscore is rejected.
pub fn parse_tab_id(id: &str) -> Result<(&str, &str), String> {
    match TAB_ID_RE.captures(id) {
        Some(caps) => {
            let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            Ok((prefix, suffix))
        }
        None => Err(format!("illegal tab ID format \"{}\"", id)),
    }
}

/// Fresh 8-hex session id.
pub fn new_session_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_id_decomposes_into_two_hex_groups() {
        let (prefix, suffix) = parse_tab_id("0011aaff_deadbeef").unwrap();
        assert_eq!(prefix, "0011aaff");
        assert_eq!(suffix, "deadbeef");
    }

    #[test]
    fn tab_id_rejects_malformed_input() {
        for id in [
            "",
            "0011aaff",
            "0011aaff_",
            "_deadbeef",
            "0011aaff_deadbeef_cafebabe",
            "0011aaff-deadbeef",
            "0011aafff_deadbeef",
            "0011aaff_deadbee",
            "0011aaff_deadbeeg",
        ] {
            let err = parse_tab_id(id).unwrap_err();
            assert_eq!(err, format!("illegal tab ID format \"{}\"", id));
        }
    }

    #[test]
    fn session_ids_are_eight_hex_digits() {
        for _ in 0..32 {
            let id = new_session_id();
            assert_eq!(id.len(), 8);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn cascade_removal_without_tabs_names_only_the_window() {
        let mut tabs = HashMap::new();
        let msg = remove_window_tabs("00000001", &mut tabs);
        assert_eq!(msg, "Deleting window 00000001");
    }
}
