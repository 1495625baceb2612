//! Which CDP target and flattened session each attached tab maps to.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::ids::{PageId, SessionId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabEntry {
    pub session_id: SessionId,
    pub target_id: Option<String>,
    /// `None` once the browser reports the session detached.
    pub cdp_session: Option<String>,
    pub recent_url: Option<String>,
}

#[derive(Default)]
pub struct Registry {
    tabs: DashMap<PageId, TabEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_page(
        &self,
        page: PageId,
        session_id: SessionId,
        target_id: Option<String>,
        cdp_session: Option<String>,
    ) {
        let entry = TabEntry {
            session_id,
            target_id,
            cdp_session,
            recent_url: None,
        };
        self.tabs.insert(page, entry);
    }

    pub fn remove_page(&self, page: &PageId) -> Option<TabEntry> {
        self.tabs.remove(page).map(|(_, entry)| entry)
    }

    pub fn get(&self, page: &PageId) -> Option<TabEntry> {
        self.tabs.get(page).map(|entry| entry.clone())
    }

    pub fn set_recent_url(&self, page: &PageId, url: String) {
        if let Some(mut entry) = self.tabs.get_mut(page) {
            entry.recent_url = Some(url);
        }
    }

    pub fn recent_url(&self, page: &PageId) -> Option<String> {
        self.get(page)?.recent_url
    }

    pub fn get_cdp_session(&self, page: &PageId) -> Option<String> {
        self.get(page)?.cdp_session
    }

    pub fn page_for_session(&self, cdp_session: &str) -> Option<PageId> {
        self.tabs.iter().find_map(|entry| {
            (entry.cdp_session.as_deref() == Some(cdp_session)).then(|| *entry.key())
        })
    }

    /// Forget `cdp_session`, returning the tab that owned it.
    pub fn clear_cdp_session(&self, cdp_session: &str) -> Option<PageId> {
        let page = self.page_for_session(cdp_session)?;
        if let Some(mut entry) = self.tabs.get_mut(&page) {
            entry.cdp_session = None;
        }
        Some(page)
    }
}
