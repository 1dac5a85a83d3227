/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use exmdb::memory::MemoryDb;
use mailstore::{
    SessionInfo,
    message::{Message, Parent},
    store::Store,
};
use parking_lot::Mutex;
use std::sync::Arc;
use types::{
    PropValue, PropertyName, TaggedPropval, TpropvalArray,
    constants::*,
    entryid::make_eid_ex,
    idset::IcsState,
    proptag::*,
    xid::Pcl,
};

fn fixture() -> (Arc<Store>, Arc<MemoryDb>, SessionInfo, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let maildir = tmp.path().to_str().unwrap().to_string();
    let db = Arc::new(MemoryDb::new());
    let directory = Arc::new(directory::memory::InMemoryDirectory::new());
    directory.add_domain(directory::DomainInfo {
        id: 17,
        name: "example.org".into(),
        title: "Example".into(),
        address: String::new(),
        homedir: String::new(),
    });
    let mut alice = directory::DirectoryUser::new(42, "alice@example.org");
    alice.maildir = maildir.clone();
    alice.propvals.insert(PR_DISPLAY_NAME, "Alice".into());
    directory.add_user(17, directory::memory::Container::Domain, alice);
    let store = Store::open(db.clone(), directory, true, 42, "alice@example.org", maildir);
    (store, db, SessionInfo::new("alice@example.org", 42, 17), tmp)
}

#[test]
fn named_prop_resolution_is_stable_across_reopen() {
    let (store, db, _session, _tmp) = fixture();
    let guid = types::Guid::from_str("00062002-0000-0000-c000-000000000046").unwrap();
    let name = PropertyName::by_id(guid, 0x820d);
    let first = store.get_named_propids(true, std::slice::from_ref(&name)).unwrap();
    let second = store.get_named_propids(true, std::slice::from_ref(&name)).unwrap();
    assert_eq!(first, second);

    // a fresh facade over the same mailbox re-resolves to the same id
    let reopened = Store::open(
        db.clone(),
        Arc::new(directory::memory::InMemoryDirectory::new()),
        true,
        42,
        "alice@example.org",
        store.dir(),
    );
    let resolved = reopened.get_named_propids(false, std::slice::from_ref(&name)).unwrap();
    assert_eq!(resolved, first);
    let names = reopened.get_named_propnames(&resolved).unwrap();
    assert_eq!(names[0].as_ref(), Some(&name));
}

#[test]
fn save_new_message_allocates_cn_and_extends_state() {
    let (store, db, session, _tmp) = fixture();
    let inbox = make_eid_ex(1, PRIVATE_FID_INBOX);
    let mid = make_eid_ex(1, 0x1001);
    let state = Arc::new(Mutex::new(IcsState::new()));
    let message = Message::open(
        store.clone(),
        session,
        true,
        65001,
        mid,
        Parent::Folder(inbox),
        ACCESS_ALL,
        true,
        Some(state.clone()),
    )
    .unwrap();
    message.init_message(false, 65001).unwrap();
    let propvals: TpropvalArray =
        [TaggedPropval::new(PR_SUBJECT, PropValue::Unicode("Hi".into()))]
            .into_iter()
            .collect();
    let problems = message.set_properties(&propvals).unwrap();
    assert!(problems.is_empty());
    assert!(message.is_new());
    assert!(message.is_touched());

    message.save().unwrap();
    assert!(!message.is_new());
    assert!(!message.is_touched());
    let cn1 = message.change_num().expect("change number");

    // persisted content carries the subject, the change key and the PCL
    let content = db.message_content(store.dir(), mid).unwrap();
    assert_eq!(content.proplist.get_str(PR_SUBJECT), Some("Hi"));
    let change_key = content
        .proplist
        .get(PR_CHANGE_KEY)
        .and_then(PropValue::as_bytes)
        .expect("change key");
    let xid = types::Xid::deserialize(change_key).unwrap();
    assert_eq!(xid.guid, store.guid());
    assert_eq!(xid.change_number(), cn1);
    let pcl = content
        .proplist
        .get(PR_PREDECESSOR_CHANGE_LIST)
        .and_then(PropValue::as_bytes)
        .and_then(Pcl::deserialize)
        .expect("pcl");
    assert!(pcl.contains(&xid));

    // ICS state was extended
    {
        let state = state.lock();
        assert!(state.given.contains(mid));
        assert!(state.seen.contains(cn1));
        assert!(state.seen_fai.is_empty());
    }

    // an immediate second save is a no-op
    message.save().unwrap();
    assert_eq!(message.change_num(), Some(cn1));

    // a subsequent edit allocates a strictly larger change number
    let propvals: TpropvalArray =
        [TaggedPropval::new(PR_SUBJECT, PropValue::Unicode("Hi again".into()))]
            .into_iter()
            .collect();
    message.set_properties(&propvals).unwrap();
    message.save().unwrap();
    let cn2 = message.change_num().unwrap();
    assert!(cn2 > cn1);
    let records = db.change_records(store.dir(), mid);
    assert!(!records.is_empty());
}

#[test]
fn readonly_properties_produce_problems() {
    let (store, _db, session, _tmp) = fixture();
    let inbox = make_eid_ex(1, PRIVATE_FID_INBOX);
    let message = Message::open(
        store,
        session,
        true,
        65001,
        make_eid_ex(1, 0x1002),
        Parent::Folder(inbox),
        ACCESS_ALL,
        true,
        None,
    )
    .unwrap();
    message.init_message(false, 65001).unwrap();
    message.save().unwrap();

    let propvals: TpropvalArray = [
        TaggedPropval::new(PR_MID, PropValue::I8(5)),
        TaggedPropval::new(PR_CREATION_TIME, PropValue::NtTime(1)),
        TaggedPropval::new(PR_SUBJECT, PropValue::Unicode("still writable".into())),
    ]
    .into_iter()
    .collect();
    let problems = message.set_properties(&propvals).unwrap();
    assert_eq!(problems.len(), 2);
    assert!(problems.contains_tag(PR_MID));
    assert!(problems.contains_tag(PR_CREATION_TIME));
    let tags: types::ProptagArray = [PR_SUBJECT].into_iter().collect();
    assert_eq!(
        message.get_properties(&tags).unwrap().get_str(PR_SUBJECT),
        Some("still writable")
    );
}

#[test]
fn message_flags_write_keeps_the_flags_word() {
    let (store, db, session, _tmp) = fixture();
    let inbox = make_eid_ex(1, PRIVATE_FID_INBOX);
    let mid = make_eid_ex(1, 0x1006);
    let message = Message::open(
        store.clone(),
        session,
        true,
        65001,
        mid,
        Parent::Folder(inbox),
        ACCESS_ALL,
        true,
        None,
    )
    .unwrap();
    message.init_message(false, 65001).unwrap();

    let flags = MSGFLAG_READ | MSGFLAG_RN_PENDING;
    let propvals: TpropvalArray =
        [TaggedPropval::new(PR_MESSAGE_FLAGS, PropValue::Long(flags))]
            .into_iter()
            .collect();
    let problems = message.set_properties(&propvals).unwrap();
    assert!(problems.is_empty());

    // the flags word itself survives alongside the derived booleans
    let tags: types::ProptagArray = [
        PR_MESSAGE_FLAGS,
        PR_READ,
        PR_READ_RECEIPT_REQUESTED,
        PR_NON_RECEIPT_NOTIFICATION_REQUESTED,
    ]
    .into_iter()
    .collect();
    let props = message.get_properties(&tags).unwrap();
    assert_eq!(props.get_u32(PR_MESSAGE_FLAGS), Some(flags));
    assert_eq!(props.get_bool(PR_READ), Some(true));
    assert_eq!(props.get_bool(PR_READ_RECEIPT_REQUESTED), Some(true));
    assert_eq!(
        props.get_bool(PR_NON_RECEIPT_NOTIFICATION_REQUESTED),
        Some(false)
    );

    // and it is still there after the instance is flushed
    message.save().unwrap();
    let persisted = db.message_content(store.dir(), mid).unwrap();
    assert_eq!(persisted.proplist.get_u32(PR_MESSAGE_FLAGS), Some(flags));
}

#[test]
fn read_flag_default_with_receipt() {
    let (store, db, session, _tmp) = fixture();
    let inbox = make_eid_ex(1, PRIVATE_FID_INBOX);
    let mid = make_eid_ex(1, 0x1003);
    // an unread message with a pending read receipt
    let mut content = types::content::MessageContent::new();
    content.proplist.set(PR_READ, PropValue::Bool(false));
    content
        .proplist
        .set(PR_READ_RECEIPT_REQUESTED, PropValue::Bool(true));
    content
        .proplist
        .set(PR_MESSAGE_FLAGS, PropValue::Long(MSGFLAG_RN_PENDING));
    db.insert_message(store.dir(), inbox, mid, content);

    let message = Message::open(
        store.clone(),
        session,
        false,
        65001,
        mid,
        Parent::Folder(inbox),
        ACCESS_ALL,
        true,
        None,
    )
    .unwrap();
    let outcome = message.set_readflag(MSG_READ_FLAG_DEFAULT).unwrap();
    assert!(outcome.changed);
    assert!(outcome.generate_receipt);

    // read state reached the instance and the persisted message
    let tags: types::ProptagArray = [PR_READ, PR_READ_RECEIPT_REQUESTED].into_iter().collect();
    let props = message.get_properties(&tags).unwrap();
    assert_eq!(props.get_bool(PR_READ), Some(true));
    assert_eq!(props.get_bool(PR_READ_RECEIPT_REQUESTED), Some(false));
    let persisted = db.message_content(store.dir(), mid).unwrap();
    assert_eq!(persisted.proplist.get_bool(PR_READ), Some(true));

    // a second default read is a no-op
    let outcome = message.set_readflag(MSG_READ_FLAG_DEFAULT).unwrap();
    assert!(!outcome.changed);
    assert!(!outcome.generate_receipt);
}

#[test]
fn clear_notify_clears_request_flags() {
    let (store, db, session, _tmp) = fixture();
    let inbox = make_eid_ex(1, PRIVATE_FID_INBOX);
    let mid = make_eid_ex(1, 0x1004);
    let mut content = types::content::MessageContent::new();
    content.proplist.set(PR_READ, PropValue::Bool(false));
    content
        .proplist
        .set(PR_READ_RECEIPT_REQUESTED, PropValue::Bool(true));
    content.proplist.set(
        PR_MESSAGE_FLAGS,
        PropValue::Long(MSGFLAG_UNMODIFIED | MSGFLAG_RN_PENDING),
    );
    db.insert_message(store.dir(), inbox, mid, content);

    let message = Message::open(
        store.clone(),
        session,
        false,
        65001,
        mid,
        Parent::Folder(inbox),
        ACCESS_ALL,
        true,
        None,
    )
    .unwrap();
    let outcome = message
        .set_readflag(MSG_READ_FLAG_CLEAR_NOTIFY_READ)
        .unwrap();
    assert!(!outcome.changed);
    let persisted = db.message_content(store.dir(), mid).unwrap();
    assert_eq!(
        persisted.proplist.get_bool(PR_READ_RECEIPT_REQUESTED),
        Some(false)
    );
    // read flag untouched, unmodified bit dropped
    assert_eq!(persisted.proplist.get_bool(PR_READ), Some(false));
    let flags = db
        .message_content(store.dir(), mid)
        .unwrap()
        .proplist
        .get_u32(PR_MESSAGE_FLAGS)
        .unwrap();
    assert_eq!(flags & MSGFLAG_UNMODIFIED, 0);
}

#[test]
fn embedded_save_marks_parent_touched() {
    let (store, _db, session, _tmp) = fixture();
    let inbox = make_eid_ex(1, PRIVATE_FID_INBOX);
    let parent = Message::open(
        store.clone(),
        session.clone(),
        true,
        65001,
        make_eid_ex(1, 0x1005),
        Parent::Folder(inbox),
        ACCESS_ALL,
        true,
        None,
    )
    .unwrap();
    parent.init_message(false, 65001).unwrap();
    parent.save().unwrap();
    assert!(!parent.is_touched());

    let embedded = Message::open(
        store,
        session,
        true,
        65001,
        0,
        Parent::Attachment(parent.clone()),
        ACCESS_ALL,
        true,
        None,
    )
    .unwrap();
    embedded.init_message(false, 65001).unwrap();
    embedded.save().unwrap();
    assert!(parent.is_touched());
}
