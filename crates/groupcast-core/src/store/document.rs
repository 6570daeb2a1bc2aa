use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, UserId},
    store::{BotStore, BroadcastState, BroadcastStore, GroupRecord, UserState},
    Result,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuFunction {
    pub response: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCategory {
    #[serde(default)]
    pub functions: BTreeMap<String, MenuFunction>,
}

/// Whole-store document, serialised as one JSON file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub groups: BTreeMap<i64, GroupRecord>,
    #[serde(default)]
    pub allowed_users: BTreeSet<i64>,
    #[serde(default)]
    pub user_states: BTreeMap<i64, UserState>,
    #[serde(default)]
    pub categories: BTreeMap<String, MenuCategory>,
    #[serde(default)]
    pub broadcast_state: BroadcastState,
}

/// JSON-file backed implementation of the store ports.
///
/// Every mutation rewrites the file (write to a sibling temp file, then
/// rename). Without a path the store lives purely in memory.
pub struct DocumentStore {
    path: Option<PathBuf>,
    doc: Mutex<StoreDocument>,
}

impl DocumentStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = load_document(&path)?.unwrap_or_default();
        tracing::info!(
            path = %path.display(),
            groups = doc.groups.len(),
            allowed_users = doc.allowed_users.len(),
            "document store loaded"
        );
        Ok(Self {
            path: Some(path),
            doc: Mutex::new(doc),
        })
    }

    pub fn in_memory() -> Self {
        Self::from_document(StoreDocument::default())
    }

    pub fn from_document(doc: StoreDocument) -> Self {
        Self {
            path: None,
            doc: Mutex::new(doc),
        }
    }

    /// Apply `f` to a copy and swap it in only once it is persisted, so a
    /// failed write leaves memory matching the file.
    async fn mutate<T>(&self, f: impl FnOnce(&mut StoreDocument) -> T) -> Result<T> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        let out = f(&mut next);
        if let Some(path) = &self.path {
            save_document(path, &next).await?;
        }
        *doc = next;
        Ok(out)
    }
}

fn load_document(path: &Path) -> Result<Option<StoreDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    let doc: StoreDocument = serde_json::from_str(&txt)?;
    Ok(Some(doc))
}

async fn save_document(path: &Path, doc: &StoreDocument) -> Result<()> {
    let txt = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, txt).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl BroadcastStore for DocumentStore {
    async fn eligible_destinations(&self) -> Result<Vec<ChatId>> {
        let doc = self.doc.lock().await;
        Ok(doc
            .groups
            .iter()
            .filter(|(_, g)| g.is_admin)
            .map(|(id, _)| ChatId(*id))
            .collect())
    }

    async fn broadcast_state(&self) -> Result<BroadcastState> {
        Ok(self.doc.lock().await.broadcast_state)
    }

    async fn save_broadcast_state(&self, state: &BroadcastState) -> Result<()> {
        let state = *state;
        self.mutate(|doc| doc.broadcast_state = state).await
    }
}

#[async_trait]
impl BotStore for DocumentStore {
    async fn upsert_group(&self, chat: ChatId, record: GroupRecord) -> Result<()> {
        self.mutate(|doc| {
            doc.groups.insert(chat.0, record);
        })
        .await
    }

    async fn remove_group(&self, chat: ChatId) -> Result<bool> {
        self.mutate(|doc| doc.groups.remove(&chat.0).is_some()).await
    }

    async fn is_allowed_user(&self, user: UserId) -> Result<bool> {
        Ok(self.doc.lock().await.allowed_users.contains(&user.0))
    }

    async fn user_state(&self, user: UserId) -> Result<UserState> {
        Ok(self
            .doc
            .lock()
            .await
            .user_states
            .get(&user.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_waiting_for_broadcast(&self, user: UserId, waiting: bool) -> Result<()> {
        self.mutate(|doc| {
            doc.user_states.entry(user.0).or_default().waiting_for_broadcast = waiting;
        })
        .await
    }

    async fn categories(&self) -> Result<Vec<String>> {
        Ok(self.doc.lock().await.categories.keys().cloned().collect())
    }

    async fn category_functions(&self, category: &str) -> Result<Vec<String>> {
        Ok(self
            .doc
            .lock()
            .await
            .categories
            .get(category)
            .map(|c| c.functions.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn function_response(&self, category: &str, function: &str) -> Result<Option<String>> {
        Ok(self
            .doc
            .lock()
            .await
            .categories
            .get(category)
            .and_then(|c| c.functions.get(function))
            .map(|f| f.response.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn temp_store_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!("/tmp/groupcast-store-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("store.json")
    }

    #[tokio::test]
    async fn only_admin_groups_are_eligible() {
        let store = DocumentStore::in_memory();
        store
            .upsert_group(
                ChatId(-300),
                GroupRecord {
                    name: "ops".into(),
                    is_admin: true,
                },
            )
            .await
            .unwrap();
        store
            .upsert_group(
                ChatId(-200),
                GroupRecord {
                    name: "lurking".into(),
                    is_admin: false,
                },
            )
            .await
            .unwrap();
        store
            .upsert_group(
                ChatId(-100),
                GroupRecord {
                    name: "news".into(),
                    is_admin: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            store.eligible_destinations().await.unwrap(),
            vec![ChatId(-300), ChatId(-100)]
        );

        assert!(store.remove_group(ChatId(-300)).await.unwrap());
        assert!(!store.remove_group(ChatId(-300)).await.unwrap());
        assert_eq!(
            store.eligible_destinations().await.unwrap(),
            vec![ChatId(-100)]
        );
    }

    #[tokio::test]
    async fn waiting_flag_round_trips_per_user() {
        let store = DocumentStore::in_memory();
        assert!(!store.user_state(UserId(7)).await.unwrap().waiting_for_broadcast);

        store.set_waiting_for_broadcast(UserId(7), true).await.unwrap();
        assert!(store.user_state(UserId(7)).await.unwrap().waiting_for_broadcast);
        assert!(!store.user_state(UserId(8)).await.unwrap().waiting_for_broadcast);
    }

    #[tokio::test]
    async fn menu_lookups() {
        let mut doc = StoreDocument::default();
        let mut faq = MenuCategory::default();
        faq.functions.insert(
            "Rules".into(),
            MenuFunction {
                response: "Be nice.".into(),
            },
        );
        doc.categories.insert("FAQ".into(), faq);
        let store = DocumentStore::from_document(doc);

        assert_eq!(store.categories().await.unwrap(), vec!["FAQ".to_string()]);
        assert_eq!(
            store.category_functions("FAQ").await.unwrap(),
            vec!["Rules".to_string()]
        );
        assert!(store.category_functions("Nope").await.unwrap().is_empty());
        assert_eq!(
            store.function_response("FAQ", "Rules").await.unwrap().as_deref(),
            Some("Be nice.")
        );
        assert_eq!(store.function_response("FAQ", "Other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let path = temp_store_path("persist");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        {
            let store = DocumentStore::open(&path).unwrap();
            store
                .upsert_group(
                    ChatId(-1001),
                    GroupRecord {
                        name: "announcements".into(),
                        is_admin: true,
                    },
                )
                .await
                .unwrap();
            store
                .save_broadcast_state(&BroadcastState {
                    last_broadcast_at: Some(at),
                    last_started_at: Some(at),
                })
                .await
                .unwrap();
        }

        let reopened = DocumentStore::open(&path).unwrap();
        assert_eq!(
            reopened.eligible_destinations().await.unwrap(),
            vec![ChatId(-1001)]
        );
        assert_eq!(
            reopened.broadcast_state().await.unwrap().last_broadcast_at,
            Some(at)
        );
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let path = temp_store_path("failed-write");
        let store = DocumentStore::open(&path).unwrap();
        store
            .upsert_group(
                ChatId(-1001),
                GroupRecord {
                    name: "announcements".into(),
                    is_admin: true,
                },
            )
            .await
            .unwrap();

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();

        let at = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let saved = store
            .save_broadcast_state(&BroadcastState {
                last_broadcast_at: None,
                last_started_at: Some(at),
            })
            .await;
        assert!(saved.is_err());
        assert_eq!(
            store.broadcast_state().await.unwrap(),
            BroadcastState::default()
        );

        assert!(store.remove_group(ChatId(-1001)).await.is_err());
        assert!(store.set_waiting_for_broadcast(UserId(7), true).await.is_err());
        assert_eq!(
            store.eligible_destinations().await.unwrap(),
            vec![ChatId(-1001)]
        );
        assert!(!store.user_state(UserId(7)).await.unwrap().waiting_for_broadcast);
    }

    #[tokio::test]
    async fn hand_written_document_loads_with_defaults() {
        let path = temp_store_path("handwritten");
        std::fs::write(
            &path,
            r#"{ "allowed_users": [42], "groups": { "-5": { "name": "g", "is_admin": true } } }"#,
        )
        .unwrap();

        let store = DocumentStore::open(&path).unwrap();
        assert!(store.is_allowed_user(UserId(42)).await.unwrap());
        assert!(!store.is_allowed_user(UserId(43)).await.unwrap());
        assert_eq!(store.eligible_destinations().await.unwrap(), vec![ChatId(-5)]);
        assert_eq!(store.broadcast_state().await.unwrap(), BroadcastState::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_store_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(DocumentStore::open(&path).is_err());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
