//! Administrative operations: configures, roster import, bindings, grants.
//!
//! These run from the CLI, never concurrently with each other in practice,
//! so multi-key sequences here are not atomic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use relay_core::error::StoreError;
use relay_core::store::IdentityCache;
use relay_core::types::{configure_id, Configure, User, UserStatus, UserUid};

use crate::error::ChatError;

/// One person exported from a platform directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    /// Platform-native user id.
    pub external_id: String,
    pub name: String,
}

/// Outcome of a roster import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    /// Members whose user record already existed; left untouched.
    pub skipped: usize,
    pub failed: usize,
}

/// Entry point for provisioning users and configures.
pub struct RelayAdmin {
    identity: Arc<dyn IdentityCache>,
}

impl RelayAdmin {
    pub fn new(identity: Arc<dyn IdentityCache>) -> Self {
        Self { identity }
    }

    /// Store a configure under a deterministic id and return the id.
    ///
    /// The `kind` field is written into the blob so it can be materialized
    /// later. Identical kind and discriminators always map to the same id.
    pub fn add_configure(
        &self,
        kind: &str,
        discriminators: &[&str],
        mut configure: Configure,
    ) -> Result<String, ChatError> {
        let id = configure_id(kind, discriminators);
        configure.insert("kind".to_string(), serde_json::Value::from(kind));
        self.identity.put_configure(&id, &configure)?;
        info!(configure_id = %id, kind, "Configure stored");
        Ok(id)
    }

    /// Import every roster member as an active user bound to `platform`,
    /// entitled to and defaulting to `answer_ids`.
    ///
    /// Members whose derived uid already has a record are skipped so a
    /// re-import never duplicates or rebinds anything.
    pub fn import_roster(
        &self,
        platform: &str,
        members: &[RosterMember],
        answer_ids: &[String],
    ) -> Result<ImportReport, ChatError> {
        let mut report = ImportReport::default();

        for member in members {
            let user = User {
                uid: UserUid::derive(&member.external_id),
                name: member.name.clone(),
                status: UserStatus::Active,
            };

            match self.identity.create_user(&user) {
                Ok(()) => {}
                Err(StoreError::AlreadyExists(_)) => {
                    info!(uid = %user.uid, name = %member.name, "User exists, skipped");
                    report.skipped += 1;
                    continue;
                }
                Err(e @ StoreError::Unavailable(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(name = %member.name, error = %e, "Import user failed");
                    report.failed += 1;
                    continue;
                }
            }

            match self.provision(platform, &member.external_id, &user.uid, answer_ids) {
                Ok(()) => {
                    info!(uid = %user.uid, name = %member.name, "User imported");
                    report.imported += 1;
                }
                Err(e) => {
                    warn!(
                        uid = %user.uid,
                        name = %member.name,
                        error = %e,
                        "User provisioning failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            imported = report.imported,
            skipped = report.skipped,
            failed = report.failed,
            "Roster import finished"
        );
        Ok(report)
    }

    /// Bind a platform identity to an existing user.
    pub fn bind(&self, platform: &str, external_id: &str, uid: &UserUid) -> Result<(), ChatError> {
        self.identity.bind_identity(platform, external_id, uid)?;
        info!(uid = %uid, platform, external_id, "Identity bound");
        Ok(())
    }

    /// Entitle a user to `answer_ids`, and make them defaults when asked.
    pub fn grant(
        &self,
        uid: &UserUid,
        answer_ids: &[String],
        as_default: bool,
    ) -> Result<(), ChatError> {
        self.identity.grant_entitlement(uid, answer_ids)?;
        if as_default {
            self.identity.set_default_answers(uid, answer_ids)?;
        }
        info!(uid = %uid, answers = ?answer_ids, as_default, "Answers granted");
        Ok(())
    }

    fn provision(
        &self,
        platform: &str,
        external_id: &str,
        uid: &UserUid,
        answer_ids: &[String],
    ) -> Result<(), StoreError> {
        self.identity.bind_identity(platform, external_id, uid)?;
        self.identity.grant_entitlement(uid, answer_ids)?;
        self.identity.set_default_answers(uid, answer_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_storage::{Database, SqliteIdentityCache};

    fn make_admin() -> (RelayAdmin, Arc<SqliteIdentityCache>) {
        let cache = Arc::new(SqliteIdentityCache::new(Arc::new(
            Database::in_memory().unwrap(),
        )));
        (RelayAdmin::new(cache.clone()), cache)
    }

    fn roster() -> Vec<RosterMember> {
        vec![
            RosterMember {
                external_id: "13800000000".to_string(),
                name: "Ann".to_string(),
            },
            RosterMember {
                external_id: "13800000001".to_string(),
                name: "Bob".to_string(),
            },
        ]
    }

    #[test]
    fn test_add_configure_is_deterministic() {
        let (admin, cache) = make_admin();
        let mut cfg = Configure::new();
        cfg.insert("token".into(), serde_json::json!("sk-1"));

        let a = admin.add_configure("chatgpt", &["sk-1"], cfg.clone()).unwrap();
        let b = admin.add_configure("chatgpt", &["sk-1"], cfg).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("chatgpt:"));

        let stored = cache.get_configure(&a).unwrap();
        assert_eq!(stored["kind"], "chatgpt");
        assert_eq!(stored["token"], "sk-1");
    }

    #[test]
    fn test_import_roster_provisions_users() {
        let (admin, cache) = make_admin();
        let answers = vec!["gpt-a".to_string()];

        let report = admin.import_roster("wecom", &roster(), &answers).unwrap();
        assert_eq!(
            report,
            ImportReport {
                imported: 2,
                skipped: 0,
                failed: 0
            }
        );

        let uid = cache.resolve_uid("wecom", "13800000000").unwrap();
        assert_eq!(uid, UserUid::derive("13800000000"));
        assert_eq!(cache.get_user(&uid).unwrap().unwrap().name, "Ann");
        assert_eq!(cache.get_entitlements(&uid).unwrap(), answers);
        assert_eq!(cache.get_default_answers(&uid).unwrap(), answers);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let (admin, cache) = make_admin();
        let answers = vec!["gpt-a".to_string()];
        admin.import_roster("wecom", &roster(), &answers).unwrap();

        let report = admin.import_roster("wecom", &roster(), &answers).unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.skipped, 2);

        let uid = UserUid::derive("13800000001");
        assert_eq!(cache.resolve_uid("wecom", "13800000001").unwrap(), uid);
        assert!(matches!(
            cache.create_user(&User {
                uid,
                name: "Bob".to_string(),
                status: UserStatus::Active,
            }),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_bind_unknown_user_fails() {
        let (admin, _) = make_admin();
        let err = admin
            .bind("slack", "U-1", &UserUid::new("missing"))
            .unwrap_err();
        assert!(matches!(err, ChatError::Store(e) if e.is_not_found()));
    }

    #[test]
    fn test_grant_with_and_without_defaults() {
        let (admin, cache) = make_admin();
        let uid = UserUid::new("u-1");

        admin.grant(&uid, &["gpt-a".to_string()], false).unwrap();
        assert_eq!(cache.get_entitlements(&uid).unwrap(), vec!["gpt-a"]);
        assert!(cache.get_default_answers(&uid).unwrap().is_empty());

        admin.grant(&uid, &["gpt-b".to_string()], true).unwrap();
        assert_eq!(cache.get_default_answers(&uid).unwrap(), vec!["gpt-b"]);
    }
}
