//! SQLite-backed identity cache: users, platform bindings, grants, configures.

use std::sync::Arc;

use tracing::debug;

use relay_core::error::StoreError;
use relay_core::store::{IdentityCache, StoreResult};
use relay_core::types::{Configure, User, UserUid};

use crate::db::Database;
use crate::keys;
use crate::kv;

/// Identity cache over the shared [`Database`].
pub struct SqliteIdentityCache {
    db: Arc<Database>,
}

impl SqliteIdentityCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl IdentityCache for SqliteIdentityCache {
    fn resolve_uid(&self, platform: &str, external_id: &str) -> StoreResult<UserUid> {
        self.db.with_conn(|conn| {
            kv::get_json::<UserUid>(conn, &keys::user_uid(platform, external_id))?.ok_or_else(
                || StoreError::NotFound(format!("userID[{}:{}]", platform, external_id)),
            )
        })
    }

    fn get_user(&self, uid: &UserUid) -> StoreResult<Option<User>> {
        self.db
            .with_conn(|conn| kv::get_json(conn, &keys::user_info(uid)))
    }

    fn create_user(&self, user: &User) -> StoreResult<()> {
        self.db.with_conn(|conn| {
            if kv::put_json_if_absent(conn, &keys::user_info(&user.uid), user)? {
                debug!(uid = %user.uid, "User created");
                Ok(())
            } else {
                Err(StoreError::AlreadyExists(format!("user[{}]", user.uid)))
            }
        })
    }

    fn bind_identity(&self, platform: &str, external_id: &str, uid: &UserUid) -> StoreResult<()> {
        self.db.with_conn(|conn| {
            if kv::get_json::<User>(conn, &keys::user_info(uid))?.is_none() {
                return Err(StoreError::NotFound(format!("userUID[{}]", uid)));
            }
            kv::put_json(conn, &keys::user_uid(platform, external_id), uid)
        })
    }

    fn grant_entitlement(&self, uid: &UserUid, answer_ids: &[String]) -> StoreResult<()> {
        self.db.with_conn(|conn| {
            let key = keys::user_smart(uid);
            for id in answer_ids {
                kv::set_add(conn, &key, id)?;
            }
            Ok(())
        })
    }

    fn set_default_answers(&self, uid: &UserUid, answer_ids: &[String]) -> StoreResult<()> {
        self.db.with_conn(|conn| {
            let entitled = keys::user_smart(uid);
            for id in answer_ids {
                if !kv::set_contains(conn, &entitled, id)? {
                    return Err(StoreError::AccessDenied {
                        uid: uid.clone(),
                        answer_id: id.clone(),
                    });
                }
            }

            let tx = conn.unchecked_transaction().map_err(kv::unavailable)?;
            let key = keys::user_question(uid);
            for id in answer_ids {
                kv::set_add(&tx, &key, id)?;
            }
            tx.commit().map_err(kv::unavailable)
        })
    }

    fn get_entitlements(&self, uid: &UserUid) -> StoreResult<Vec<String>> {
        self.db
            .with_conn(|conn| kv::set_members(conn, &keys::user_smart(uid)))
    }

    fn get_default_answers(&self, uid: &UserUid) -> StoreResult<Vec<String>> {
        self.db
            .with_conn(|conn| kv::set_members(conn, &keys::user_question(uid)))
    }

    fn put_configure(&self, id: &str, configure: &Configure) -> StoreResult<()> {
        self.db
            .with_conn(|conn| kv::put_json(conn, &keys::configure(id), configure))
    }

    fn get_configure(&self, id: &str) -> StoreResult<Configure> {
        self.db.with_conn(|conn| {
            kv::get_json(conn, &keys::configure(id))?
                .ok_or_else(|| StoreError::NotFound(format!("configure[{}]", id)))
        })
    }
}
