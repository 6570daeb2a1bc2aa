use crate::{domain::UserId, store::BotStore};

// ============== Authorization ==============

/// Operators come from `TELEGRAM_ALLOWED_USERS` or the store's allow list.
///
/// A store failure denies access; it never grants it.
pub async fn is_authorized(
    user_id: Option<UserId>,
    allowed_users: &[i64],
    store: &dyn BotStore,
) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.contains(&user_id.0) {
        return true;
    }
    match store.is_allowed_user(user_id).await {
        Ok(allowed) => allowed,
        Err(e) => {
            tracing::error!(user = %user_id, "authorization lookup failed: {e}");
            false
        }
    }
}
