use super::*;

fn member(store: &SharedStore, name: &str, balance: u64) -> Account {
    store
        .insert_account(NewAccount {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash: "$argon2id$placeholder".to_string(),
            balance,
            role: Role::Member,
        })
        .unwrap()
}

fn menu(store: &SharedStore, price: u64) -> Resource {
    store
        .insert_resource(NewResource {
            name: "Pho bo".into(),
            summary: "beef noodle soup".into(),
            body: "simmer bones 8h".into(),
            unlock_price: price,
            default_accessible: false,
        })
        .unwrap()
}

#[test]
fn test_lookup_by_normalized_login() {
    let store = SharedStore::in_memory();
    let a = member(&store, "Alice", 0);
    assert_eq!(a.username, "alice");
    assert_eq!(store.account_by_username("  ALICE ").unwrap().unwrap().id, a.id);
    assert_eq!(store.account_by_email("Alice@Example.com").unwrap().unwrap().id, a.id);
    assert!(store.account_by_username("bob").unwrap().is_none());
}

#[test]
fn test_duplicate_login_rejected() {
    let store = SharedStore::in_memory();
    member(&store, "alice", 0);
    let err = store
        .insert_account(NewAccount {
            username: "ALICE".into(),
            email: "other@example.com".into(),
            password_hash: String::new(),
            balance: 0,
            role: Role::Member,
        })
        .unwrap_err();
    assert_eq!(err, StoreError::LoginTaken);
}

#[test]
fn test_commit_purchase_debits_and_grants_once() {
    let store = SharedStore::in_memory();
    let a = member(&store, "alice", 150);
    let r = menu(&store, 100);

    assert_eq!(store.commit_purchase(a.id, r.id, 100).unwrap(), 50);
    assert_eq!(store.commit_purchase(a.id, r.id, 100).unwrap_err(), StoreError::DuplicateGrant);
    assert_eq!(store.account(a.id).unwrap().unwrap().balance, 50);
    let g = store.grant(a.id, r.id).unwrap().unwrap();
    assert_eq!(g.price_paid, 100);
}

#[test]
fn test_commit_purchase_insufficient_leaves_state() {
    let store = SharedStore::in_memory();
    let a = member(&store, "alice", 50);
    let r = menu(&store, 100);
    let err = store.commit_purchase(a.id, r.id, 100).unwrap_err();
    assert_eq!(err, StoreError::InsufficientBalance { balance: 50, price: 100 });
    assert_eq!(store.account(a.id).unwrap().unwrap().balance, 50);
    assert!(store.grant(a.id, r.id).unwrap().is_none());
}

#[test]
fn test_credit_overflow() {
    let store = SharedStore::in_memory();
    let a = member(&store, "alice", u64::MAX - 1);
    assert_eq!(store.credit(a.id, 1).unwrap(), u64::MAX);
    assert_eq!(store.credit(a.id, 1).unwrap_err(), StoreError::Overflow);
    assert_eq!(store.account(a.id).unwrap().unwrap().balance, u64::MAX);
}

#[test]
fn test_snapshot_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let (aid, rid) = {
        let store = SharedStore::open(tmp.path()).unwrap();
        assert!(store.is_persistent());
        let a = member(&store, "alice", 150);
        let r = menu(&store, 100);
        store.commit_purchase(a.id, r.id, 100).unwrap();
        (a.id, r.id)
    };
    let reopened = SharedStore::open(tmp.path()).unwrap();
    assert_eq!(reopened.account(aid).unwrap().unwrap().balance, 50);
    assert!(reopened.grant(aid, rid).unwrap().is_some());
    assert_eq!(reopened.account_by_username("alice").unwrap().unwrap().id, aid);
    assert_eq!(reopened.grants_for(aid).unwrap().len(), 1);
}

#[test]
fn test_failed_snapshot_write_discards_change() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SharedStore::open(tmp.path()).unwrap();
    let a = member(&store, "alice", 150);
    let r = menu(&store, 100);
    // A directory where the temp file should go makes the write fail.
    std::fs::create_dir_all(tmp.path().join("snapshot.bin.tmp")).unwrap();
    let err = store.commit_purchase(a.id, r.id, 100).unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert_eq!(store.account(a.id).unwrap().unwrap().balance, 150);
    assert!(store.grant(a.id, r.id).unwrap().is_none());
}

#[tokio::test]
async fn test_read_with_retry_recovers_then_gives_up() {
    use std::sync::atomic::{AtomicU32, Ordering};
    let calls = AtomicU32::new(0);
    let out = read_with_retry(2, "probe", || {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(StoreError::Unavailable("down".into()))
        } else {
            Ok(7)
        }
    })
    .await;
    assert_eq!(out, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let calls = AtomicU32::new(0);
    let out: StoreResult<u32> = read_with_retry(1, "probe", || {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("down".into()))
    })
    .await;
    assert!(matches!(out, Err(StoreError::Unavailable(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
