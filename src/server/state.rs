use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

pub type SessionId = u64;

/// Registry entry for one authenticated session: its id and the outbox
/// the broadcast fan-out writes pushed lines into.
struct SessionHandle {
    id: SessionId,
    outbox: mpsc::UnboundedSender<String>,
}

/// Shared chat-server state: the credential store, the connection
/// registry, the private-address directory, and the most-recent-message
/// cache. All mutable maps are mutex-guarded because session tasks,
/// broadcast fan-outs, and the discovery responder touch them
/// concurrently.
pub struct ServerState {
    credentials: HashMap<String, String>,
    online: Mutex<HashMap<String, SessionHandle>>,
    addresses: Mutex<HashMap<String, String>>,
    last_message: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl ServerState {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self {
            credentials,
            online: Mutex::new(HashMap::new()),
            addresses: Mutex::new(HashMap::new()),
            last_message: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Attempts a login. On success the session is installed in the
    /// connection registry and receives the outbox end broadcast lines
    /// arrive on; a prior binding for the same username is overwritten,
    /// which the evicted session observes as its outbox closing.
    pub async fn login(
        &self,
        username: &str,
        secret: &str,
    ) -> Option<(SessionId, mpsc::UnboundedReceiver<String>)> {
        if self.credentials.get(username).map(String::as_str) != Some(secret) {
            return None;
        }

        let id = self.next_id();
        let (outbox, inbox) = mpsc::unbounded_channel();
        let mut online = self.online.lock().await;
        if online
            .insert(username.to_string(), SessionHandle { id, outbox })
            .is_some()
        {
            debug!(%username, "previous session evicted by re-login");
        }
        Some((id, inbox))
    }

    /// Removes a session from the registry, but only while it still owns
    /// the binding. A session evicted by a later login must not clobber
    /// the newer binding on its own logout or disconnect.
    pub async fn logout(&self, username: &str, id: SessionId) -> bool {
        let mut online = self.online.lock().await;
        match online.get(username) {
            Some(handle) if handle.id == id => {
                online.remove(username);
                true
            }
            _ => false,
        }
    }

    /// Delivers `text` from `sender` to every other online user and
    /// updates the most-recent-message cache. The cache update completes
    /// before the fan-out task starts; delivery failures to individual
    /// recipients are dropped so they never reach the sender.
    pub async fn broadcast(&self, sender: &str, text: &str) {
        let line = format!("{sender}: {text}");
        *self.last_message.lock().await = Some(line.clone());

        let recipients: Vec<(String, mpsc::UnboundedSender<String>)> = self
            .online
            .lock()
            .await
            .iter()
            .filter(|(username, _)| username.as_str() != sender)
            .map(|(username, handle)| (username.clone(), handle.outbox.clone()))
            .collect();

        tokio::spawn(async move {
            for (username, outbox) in recipients {
                if outbox.send(line.clone()).is_err() {
                    debug!(%username, "dropped broadcast to closed session");
                }
            }
        });
    }

    pub async fn last_message(&self) -> Option<String> {
        self.last_message.lock().await.clone()
    }

    pub async fn register_address(&self, username: &str, address: &str) {
        let mut addresses = self.addresses.lock().await;
        addresses.insert(username.to_string(), address.to_string());
    }

    pub async fn lookup_address(&self, username: &str) -> Option<String> {
        self.addresses.lock().await.get(username).cloned()
    }

    /// Lexicographically sorted list of online usernames.
    pub async fn online_users(&self) -> Vec<String> {
        let online = self.online.lock().await;
        let mut users: Vec<String> = online.keys().cloned().collect();
        users.sort();
        users
    }

    /// Every known user, sorted, flagged online or offline. Backs the
    /// operator console's `!users` dump.
    pub async fn users_overview(&self) -> Vec<String> {
        let online = self.online.lock().await;
        let mut users: Vec<String> = self.credentials.keys().cloned().collect();
        users.sort();
        users
            .into_iter()
            .map(|username| {
                let status = if online.contains_key(&username) {
                    "online"
                } else {
                    "offline"
                };
                format!("{username} {status}")
            })
            .collect()
    }
}
