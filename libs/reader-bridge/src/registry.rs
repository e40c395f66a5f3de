use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::SessionBridge;

/// Реестр живых сессий для fleet-wide introspection и сбора статистики.
pub trait SessionRegistry: Send + Sync {
    /// `false`: сессия не зарегистрирована (не фатально).
    fn add(&self, session: Arc<SessionBridge>) -> bool;

    fn remove(&self, session: &SessionBridge) -> bool;
}

/// In-process реестр reader-сессий.
#[derive(Default)]
pub struct ReaderRegistry {
    sessions: RwLock<HashMap<u64, Arc<SessionBridge>>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Снимок списка сессий, упорядоченный по id.
    pub fn sessions(&self) -> Vec<Arc<SessionBridge>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = sessions.values().cloned().collect();
        list.sort_by_key(|s| s.id());
        list
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionRegistry for ReaderRegistry {
    fn add(&self, session: Arc<SessionBridge>) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.entry(session.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    fn remove(&self, session: &SessionBridge) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session.id())
            .is_some()
    }
}
