use super::*;
use crate::test_support::FailingStorage;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("skilltrack-storage-{}", uuid::Uuid::new_v4()))
}

// =============================================================================
// load_json / save_json
// =============================================================================

#[test]
fn load_json_missing_key_is_none() {
    let storage = MemoryStorage::new();
    assert_eq!(load_json::<Vec<u32>>(&storage, "absent"), None);
}

#[test]
fn save_then_load_returns_value() {
    let storage = MemoryStorage::new();
    save_json(&storage, "nums", &vec![1_u32, 2, 3]);
    assert_eq!(load_json::<Vec<u32>>(&storage, "nums"), Some(vec![1, 2, 3]));
}

#[test]
fn load_json_unparseable_record_is_none() {
    let storage = MemoryStorage::new();
    storage.write("nums", "{not json").unwrap();
    assert_eq!(load_json::<Vec<u32>>(&storage, "nums"), None);
}

#[test]
fn load_json_wrong_shape_is_none() {
    let storage = MemoryStorage::new();
    storage.write("nums", r#"{"a":1}"#).unwrap();
    assert_eq!(load_json::<Vec<u32>>(&storage, "nums"), None);
}

#[test]
fn save_json_swallows_write_failures() {
    let storage = FailingStorage::default();
    save_json(&storage, "nums", &vec![1_u32]);
    assert_eq!(storage.write_attempts(), 1);
}

// =============================================================================
// MemoryStorage
// =============================================================================

#[test]
fn memory_remove_absent_key_is_ok() {
    let storage = MemoryStorage::new();
    storage.remove("absent").unwrap();
}

#[test]
fn memory_write_replaces_record() {
    let storage = MemoryStorage::new();
    storage.write("k", "1").unwrap();
    storage.write("k", "2").unwrap();
    assert_eq!(storage.read("k").unwrap().as_deref(), Some("2"));
}

// =============================================================================
// FileStorage
// =============================================================================

#[test]
fn file_read_before_any_write_is_none() {
    let storage = FileStorage::new(scratch_dir());
    assert_eq!(storage.read(SESSION_STORAGE_KEY).unwrap(), None);
}

#[test]
fn file_write_creates_dir_and_record() {
    let dir = scratch_dir();
    let storage = FileStorage::new(&dir);
    storage.write("session", r#"{"accessToken":null}"#).unwrap();

    assert!(dir.join("session.json").exists());
    assert!(!dir.join(".session.json.tmp").exists());
    assert_eq!(storage.read("session").unwrap().as_deref(), Some(r#"{"accessToken":null}"#));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn file_remove_deletes_record() {
    let dir = scratch_dir();
    let storage = FileStorage::new(&dir);
    storage.write("session", "{}").unwrap();
    storage.remove("session").unwrap();
    assert_eq!(storage.read("session").unwrap(), None);
    storage.remove("session").unwrap();

    std::fs::remove_dir_all(&dir).unwrap();
}

#[cfg(unix)]
#[test]
fn file_records_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = scratch_dir();
    let storage = FileStorage::new(&dir);
    storage.write("session", "{}").unwrap();
    let mode = std::fs::metadata(dir.join("session.json")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn file_storage_reports_dir() {
    let storage = FileStorage::new("/tmp/skilltrack-state");
    assert_eq!(storage.dir(), Path::new("/tmp/skilltrack-state"));
}
