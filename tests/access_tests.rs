use link_hub::access::AccessGuard;
use link_hub::auth::Caller;
use link_hub::config::EmptyFilePolicy;
use link_hub::lifecycle::{LifecycleEngine, LifecycleError};
use link_hub::storage::models::{FileRecord, LinkResult};
use link_hub::storage::Database;

fn caller(user_id: &str) -> Caller {
    Caller {
        user_id: user_id.to_string(),
        email: format!("user{user_id}@example.com"),
    }
}

fn setup() -> (tempfile::TempDir, Database, AccessGuard, FileRecord) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let guard = AccessGuard::new(db.clone());

    let file = FileRecord::new_pending("A", "urls.txt", "A/urls.txt", "text/plain", 32);
    db.insert_file(&file).unwrap();

    let engine = LifecycleEngine::new(db.clone(), EmptyFilePolicy::Fail);
    engine
        .record_link_result(
            &file.id,
            LinkResult {
                url: "https://example.com".to_string(),
                title: Some("Example".to_string()),
                content: None,
                error_description: None,
                page_exists: true,
                success: true,
                post_date: None,
                processed_date: None,
            },
        )
        .unwrap();

    (dir, db, guard, file)
}

#[test]
fn test_owner_reads_own_file_and_links() {
    let (_dir, _db, guard, file) = setup();
    let owner = caller("A");

    assert_eq!(guard.authorize(&owner, &file.id).unwrap().id, file.id);
    assert_eq!(guard.list_files(&owner).unwrap().len(), 1);

    let links = guard.get_file_links(&owner, &file.id).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].title.as_deref(), Some("Example"));
}

#[test]
fn test_other_user_is_forbidden() {
    let (_dir, db, guard, file) = setup();
    let intruder = caller("B");

    assert!(matches!(
        guard.authorize(&intruder, &file.id),
        Err(LifecycleError::Forbidden)
    ));
    assert!(matches!(
        guard.get_file_links(&intruder, &file.id),
        Err(LifecycleError::Forbidden)
    ));
    assert!(matches!(
        guard.get_dispatch(&intruder, &file.id),
        Err(LifecycleError::Forbidden)
    ));
    assert!(matches!(
        guard.delete_file(&intruder, &file.id),
        Err(LifecycleError::Forbidden)
    ));
    assert!(guard.list_files(&intruder).unwrap().is_empty());

    // Nothing was removed by the rejected delete
    assert!(db.get_file(&file.id).unwrap().is_some());
    assert_eq!(db.list_links(&file.id).unwrap().len(), 1);
}

#[test]
fn test_missing_file_reads_as_forbidden() {
    let (_dir, _db, guard, _file) = setup();
    assert!(matches!(
        guard.authorize(&caller("A"), "no-such-file"),
        Err(LifecycleError::Forbidden)
    ));
}

#[test]
fn test_owner_delete_cascades_to_links() {
    let (_dir, db, guard, file) = setup();

    let deleted = guard.delete_file(&caller("A"), &file.id).unwrap();
    assert_eq!(deleted.storage_path, "A/urls.txt");

    assert!(db.get_file(&file.id).unwrap().is_none());
    assert!(db.list_links(&file.id).unwrap().is_empty());
    assert!(db
        .get_link_by_url(&file.id, "https://example.com")
        .unwrap()
        .is_none());
    assert!(guard.list_files(&caller("A")).unwrap().is_empty());
}
