use layerdb::Database;

/// Creates a fresh database, with test logging wired up.
#[allow(unused)]
pub fn database() -> Database {
    let _ = env_logger::builder().is_test(true).try_init();
    Database::new()
}
