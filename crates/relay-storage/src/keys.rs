//! Logical key namespace.
//!
//! Every persisted entity is addressed by a prefixed key so that entities of
//! different kinds can never collide, whatever the backend.

use chrono::NaiveDate;

use relay_core::types::{SessionId, UserUid};

pub fn user_info(uid: &UserUid) -> String {
    format!("user:info:{}", uid)
}

pub fn user_uid(platform: &str, external_id: &str) -> String {
    format!("user:uid:{}:{}", platform, external_id)
}

/// Entitlement set.
pub fn user_smart(uid: &UserUid) -> String {
    format!("user:smart:{}", uid)
}

/// Default-answer set.
pub fn user_question(uid: &UserUid) -> String {
    format!("user:question:{}", uid)
}

pub fn session_status(id: &SessionId) -> String {
    format!("session:status:{}", id)
}

pub fn session_record(day: NaiveDate, uid: &UserUid, id: &SessionId) -> String {
    format!("session:record:{}:{}:{}", day_stamp(day), uid, id)
}

pub fn configure(id: &str) -> String {
    format!("configure:{}", id)
}

pub fn used(day: NaiveDate, uid: &UserUid) -> String {
    format!("used:{}:{}", day_stamp(day), uid)
}

fn day_stamp(day: NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}
