use std::path::PathBuf;

use crate::adapters::sqlite_store::SqliteStore;

pub const TEST_NAMESPACE: &str = "root\\cimv2\\BatteryHealth";
pub const TEST_CLASS: &str = "BatteryHealth";

pub fn temp_store_path(name: &str) -> PathBuf {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join(name);
    std::mem::forget(dir);
    path
}

pub fn open_test_store(test_name: &str) -> SqliteStore {
    let path = temp_store_path(&format!("{test_name}.sqlite"));
    SqliteStore::open(path.to_string_lossy().as_ref()).expect("test store should open")
}
