use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rollcall::attendance::{
    AttendanceError, AttendanceStore, DistrictId, MemoryStore, Role, User, UserId, VoicePart,
};
use rollcall::error::AppError;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}

pub(crate) fn render_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(std::io::Error::from)
        .map_err(AppError::from)
}

pub(crate) fn load_roster(path: &Path) -> Result<Vec<User>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let users = serde_json::from_str(&raw).map_err(std::io::Error::from)?;
    Ok(users)
}

pub(crate) fn seed_store(users: Vec<User>) -> Result<Arc<MemoryStore>, AppError> {
    let store = MemoryStore::new();
    for user in users {
        store.insert_user(user).map_err(AttendanceError::from)?;
    }
    Ok(Arc::new(store))
}

fn roster_entry(id: &str, name: &str, role: Role, district: &str, part: Option<VoicePart>) -> User {
    User {
        id: UserId(id.to_string()),
        name: name.to_string(),
        role,
        district_id: DistrictId(district.to_string()),
        voice_part: part,
    }
}

/// Two districts with one leader each, a tenor part leader, and a handful of singers.
pub(crate) fn demo_roster() -> Vec<User> {
    vec![
        roster_entry("admin", "Choir Office", Role::Admin, "north", None),
        roster_entry("dl-north", "Nora Hale", Role::DistrictLeader, "north", None),
        roster_entry("dl-south", "Sam Ortiz", Role::DistrictLeader, "south", None),
        roster_entry(
            "pl-tenor-north",
            "Theo Park",
            Role::PartLeader,
            "north",
            Some(VoicePart::Tenor),
        ),
        roster_entry("tenor-a", "Ari Lund", Role::Member, "north", Some(VoicePart::Tenor)),
        roster_entry("bass-a", "Bo Reyes", Role::Member, "north", Some(VoicePart::Bass)),
        roster_entry("alto-a", "Ada Quinn", Role::Member, "north", Some(VoicePart::Alto)),
        roster_entry("tenor-b", "Tove Berg", Role::Member, "south", Some(VoicePart::Tenor)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offsets() {
        let parsed = parse_timestamp("2025-03-04T20:00:00+01:00").expect("valid timestamp");
        assert_eq!(parsed.to_rfc3339(), "2025-03-04T19:00:00+00:00");
        assert!(parse_timestamp("2025-03-04").is_err());
    }

    #[test]
    fn demo_roster_seeds_without_duplicates() {
        let store = seed_store(demo_roster()).expect("roster seeds");
        let admin = store
            .user(&UserId("admin".to_string()))
            .expect("store available");
        assert_eq!(admin.map(|user| user.role), Some(Role::Admin));

        let mut duplicated = demo_roster();
        duplicated.push(demo_roster().remove(0));
        assert!(seed_store(duplicated).is_err());
    }
}
