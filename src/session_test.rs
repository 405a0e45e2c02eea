use super::*;

fn agent() -> SessionUser {
    SessionUser {
        id: "A1".to_owned(),
        name: "Asha".to_owned(),
        email: "asha@courier.test".to_owned(),
        role: Role::Agent,
        phone: None,
    }
}

#[test]
fn role_landing_paths() {
    assert_eq!(Role::Customer.landing_path(), "/customer/dashboard");
    assert_eq!(Role::Agent.landing_path(), "/agent/dashboard");
    assert_eq!(Role::Admin.landing_path(), "/admin/dashboard");
}

#[test]
fn user_accepts_mongo_style_id() {
    let user: SessionUser =
        serde_json::from_value(serde_json::json!({ "_id": "U9", "name": "Ravi", "role": "admin" })).expect("user");
    assert_eq!(user.id, "U9");
    assert_eq!(user.role, Role::Admin);
    assert!(user.email.is_empty());
}

#[test]
fn empty_store_has_no_identity() {
    let store = SessionStore::new(Session::default(), None);
    assert!(store.token().is_none());
    assert!(store.user_id().is_none());
}

#[test]
fn empty_user_id_counts_as_signed_out() {
    let store = SessionStore::new(
        Session {
            token: Some("t".to_owned()),
            user: Some(SessionUser::default()),
        },
        None,
    );
    assert!(store.user_id().is_none());
}

#[test]
fn set_then_read_back() {
    let store = SessionStore::new(Session::default(), None);
    store
        .set(Session {
            token: Some("tok".to_owned()),
            user: Some(agent()),
        })
        .expect("set");
    assert_eq!(store.token().as_deref(), Some("tok"));
    assert_eq!(store.user_id().as_deref(), Some("A1"));
}

#[test]
fn session_persists_across_store_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");

    let first = SessionStore::open(Some(path.clone())).expect("open");
    first
        .set(Session {
            token: Some("tok".to_owned()),
            user: Some(agent()),
        })
        .expect("set");

    let second = SessionStore::open(Some(path)).expect("reopen");
    assert_eq!(second.snapshot(), first.snapshot());
}

#[test]
fn clear_removes_persisted_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");

    let store = SessionStore::open(Some(path.clone())).expect("open");
    store
        .set(Session {
            token: Some("tok".to_owned()),
            user: None,
        })
        .expect("set");
    assert!(path.exists());

    store.clear().expect("clear");
    assert!(!path.exists());
    assert_eq!(store.snapshot(), Session::default());
    store.clear().expect("clearing twice is fine");
}

#[test]
fn open_missing_file_is_signed_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::open(Some(dir.path().join("absent.json"))).expect("open");
    assert_eq!(store.snapshot(), Session::default());
}

#[test]
fn open_rejects_corrupt_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json").expect("write");

    let Err(err) = SessionStore::open(Some(path)) else {
        panic!("corrupt file should fail");
    };
    assert!(matches!(err, SessionError::Json { .. }));
}
