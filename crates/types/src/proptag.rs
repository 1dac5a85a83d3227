/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Property tags. A tag is `(propid << 16) | proptype`; ids at or above
//! 0x8000 belong to the named-property range allocated per store.

pub const PT_UNSPECIFIED: u16 = 0x0000;
pub const PT_SHORT: u16 = 0x0002;
pub const PT_LONG: u16 = 0x0003;
pub const PT_FLOAT: u16 = 0x0004;
pub const PT_DOUBLE: u16 = 0x0005;
pub const PT_CURRENCY: u16 = 0x0006;
pub const PT_APPTIME: u16 = 0x0007;
pub const PT_ERROR: u16 = 0x000a;
pub const PT_BOOLEAN: u16 = 0x000b;
pub const PT_OBJECT: u16 = 0x000d;
pub const PT_I8: u16 = 0x0014;
pub const PT_STRING8: u16 = 0x001e;
pub const PT_UNICODE: u16 = 0x001f;
pub const PT_SYSTIME: u16 = 0x0040;
pub const PT_CLSID: u16 = 0x0048;
pub const PT_SVREID: u16 = 0x00fb;
pub const PT_BINARY: u16 = 0x0102;
pub const PT_MV_FLAG: u16 = 0x1000;
pub const PT_MV_LONG: u16 = PT_MV_FLAG | PT_LONG;
pub const PT_MV_UNICODE: u16 = PT_MV_FLAG | PT_UNICODE;
pub const PT_MV_BINARY: u16 = PT_MV_FLAG | PT_BINARY;
pub const PT_MV_SYSTIME: u16 = PT_MV_FLAG | PT_SYSTIME;

pub const fn prop_tag(propid: u16, proptype: u16) -> u32 {
    ((propid as u32) << 16) | proptype as u32
}

pub const fn prop_id(tag: u32) -> u16 {
    (tag >> 16) as u16
}

pub const fn prop_type(tag: u32) -> u16 {
    (tag & 0xffff) as u16
}

pub const fn is_named_propid(propid: u16) -> bool {
    propid >= 0x8000
}

pub const fn change_tag_type(tag: u32, proptype: u16) -> u32 {
    prop_tag(prop_id(tag), proptype)
}

// Message envelope and identity.
pub const PR_MESSAGE_CLASS: u32 = 0x001a_001f;
pub const PR_IMPORTANCE: u32 = 0x0017_0003;
pub const PR_SENSITIVITY: u32 = 0x0036_0003;
pub const PR_SUBJECT: u32 = 0x0037_001f;
pub const PR_SUBJECT_PREFIX: u32 = 0x003d_001f;
pub const PR_NORMALIZED_SUBJECT: u32 = 0x0e1d_001f;
pub const PR_CLIENT_SUBMIT_TIME: u32 = 0x0039_0040;
pub const PR_MESSAGE_DELIVERY_TIME: u32 = 0x0e06_0040;
pub const PR_MESSAGE_FLAGS: u32 = 0x0e07_0003;
pub const PR_MESSAGE_SIZE: u32 = 0x0e08_0003;
pub const PR_HAS_ATTACHMENTS: u32 = 0x0e1b_000b;
pub const PR_HASATTACH: u32 = PR_HAS_ATTACHMENTS;
pub const PR_DISPLAY_BCC: u32 = 0x0e02_001f;
pub const PR_DISPLAY_CC: u32 = 0x0e03_001f;
pub const PR_DISPLAY_TO: u32 = 0x0e04_001f;
pub const PR_READ: u32 = 0x0e69_000b;
pub const PR_READ_RECEIPT_REQUESTED: u32 = 0x0029_000b;
pub const PR_NON_RECEIPT_NOTIFICATION_REQUESTED: u32 = 0x0c06_000b;
pub const PR_ORIGINATOR_DELIVERY_REPORT_REQUESTED: u32 = 0x0023_000b;
pub const PR_ASSOCIATED: u32 = 0x67aa_000b;
pub const PR_HAS_NAMED_PROPERTIES: u32 = 0x664a_000b;
pub const PR_EXTENDED_RULE_MSG_CONDITION: u32 = 0x0e9a_0102;
pub const PR_BODY: u32 = 0x1000_001f;
pub const PR_HTML: u32 = 0x1013_0102;
pub const PR_INTERNET_CPID: u32 = 0x3fde_0003;
pub const PR_INTERNET_MESSAGE_ID: u32 = 0x1035_001f;
pub const PR_INET_MAIL_OVERRIDE_FORMAT: u32 = 0x5902_0003;
pub const PR_DELETE_AFTER_SUBMIT: u32 = 0x0e01_000b;
pub const PR_TARGET_ENTRYID: u32 = 0x3010_0102;
pub const PR_SENTMAIL_ENTRYID: u32 = 0x0e0a_0102;
pub const PR_SEARCH_KEY: u32 = 0x300b_0102;
pub const PR_MESSAGE_LOCALE_ID: u32 = 0x3ff1_0003;
pub const PR_CREATOR_NAME: u32 = 0x3ff8_001f;
pub const PR_CREATOR_ENTRYID: u32 = 0x3ff9_0102;
pub const PR_LAST_MODIFIER_NAME: u32 = 0x3ffa_001f;
pub const PR_LAST_MODIFIER_ENTRYID: u32 = 0x3ffb_0102;
pub const PR_LOCAL_COMMIT_TIME: u32 = 0x6709_0040;
pub const PR_CREATION_TIME: u32 = 0x3007_0040;
pub const PR_LAST_MODIFICATION_TIME: u32 = 0x3008_0040;

// Object identity.
pub const PR_ENTRYID: u32 = 0x0fff_0102;
pub const PR_RECORD_KEY: u32 = 0x0ff9_0102;
pub const PR_STORE_RECORD_KEY: u32 = 0x0ffa_0102;
pub const PR_STORE_ENTRYID: u32 = 0x0ffb_0102;
pub const PR_OBJECT_TYPE: u32 = 0x0ffe_0003;
pub const PR_ACCESS: u32 = 0x0ff4_0003;
pub const PR_ACCESS_LEVEL: u32 = 0x0ff7_0003;
pub const PR_RIGHTS: u32 = 0x6639_0003;
pub const PR_MID: u32 = 0x674a_0014;
pub const PR_FOLDER_ID: u32 = 0x6748_0014;
pub const PR_PARENT_ENTRYID: u32 = 0x0e09_0102;
pub const PR_PARENT_SOURCE_KEY: u32 = 0x65e1_0102;
pub const PR_SOURCE_KEY: u32 = 0x65e0_0102;
pub const PR_CHANGE_KEY: u32 = 0x65e2_0102;
pub const PR_PREDECESSOR_CHANGE_LIST: u32 = 0x65e3_0102;
pub const PR_CHANGE_NUMBER: u32 = 0x67a4_0014;
pub const PR_MESSAGE_GROUP_ID: u32 = 0x67aa_0003;

// Store facade.
pub const PR_DISPLAY_NAME: u32 = 0x3001_001f;
pub const PR_ADDRTYPE: u32 = 0x3002_001f;
pub const PR_EMAIL_ADDRESS: u32 = 0x3003_001f;
pub const PR_COMMENT: u32 = 0x3004_001f;
pub const PR_SMTP_ADDRESS: u32 = 0x39fe_001f;
pub const PR_EMS_AB_DISPLAY_NAME_PRINTABLE: u32 = 0x39ff_001f;
pub const PR_STORE_STATE: u32 = 0x340e_0003;
pub const PR_STORE_SUPPORT_MASK: u32 = 0x340d_0003;
pub const PR_MDB_PROVIDER: u32 = 0x3414_0102;
pub const PR_USER_ENTRYID: u32 = 0x6619_0102;
pub const PR_MAILBOX_OWNER_ENTRYID: u32 = 0x661b_0102;
pub const PR_MAILBOX_OWNER_NAME: u32 = 0x661c_001f;
pub const PR_MAX_SUBMIT_MESSAGE_SIZE: u32 = 0x666d_0003;
pub const PR_EXTENDED_RULE_SIZE_LIMIT: u32 = 0x0e9b_0003;
pub const PR_ASSOC_CONTENT_COUNT: u32 = 0x6617_0003;
pub const PR_CONTENT_COUNT: u32 = 0x3602_0003;
pub const PR_MESSAGE_SIZE_EXTENDED: u32 = 0x0e08_0014;
pub const PR_IPM_SUBTREE_ENTRYID: u32 = 0x35e0_0102;
pub const PR_IPM_OUTBOX_ENTRYID: u32 = 0x35e2_0102;
pub const PR_IPM_WASTEBASKET_ENTRYID: u32 = 0x35e3_0102;
pub const PR_IPM_SENTMAIL_ENTRYID: u32 = 0x35e4_0102;
pub const PR_IPM_FAVORITES_ENTRYID: u32 = 0x6630_0102;
pub const PR_IPM_PUBLIC_FOLDERS_ENTRYID: u32 = 0x6631_0102;
pub const PR_FINDER_ENTRYID: u32 = 0x35e7_0102;
pub const PR_SCHEDULE_FOLDER_ENTRYID: u32 = 0x661e_0102;
pub const PR_COMMON_VIEWS_ENTRYID: u32 = 0x35e6_0102;
pub const PR_VIEWS_ENTRYID: u32 = 0x35e5_0102;
pub const PR_OOF_STATE: u32 = 0x661d_000b;
pub const PR_EC_USER_LANGUAGE: u32 = 0x6770_001f;
pub const PR_EC_USER_TIMEZONE: u32 = 0x6771_001f;
pub const PR_EC_OUTOFOFFICE: u32 = 0x6760_0003;
pub const PR_EC_OUTOFOFFICE_MSG: u32 = 0x6761_001f;
pub const PR_EC_OUTOFOFFICE_SUBJECT: u32 = 0x6762_001f;
pub const PR_EC_OUTOFOFFICE_FROM: u32 = 0x6763_0040;
pub const PR_EC_OUTOFOFFICE_UNTIL: u32 = 0x6764_0040;
pub const PR_EC_ALLOW_EXTERNAL: u32 = 0x6765_000b;
pub const PR_EC_EXTERNAL_AUDIENCE: u32 = 0x6766_000b;
pub const PR_EC_EXTERNAL_REPLY: u32 = 0x6767_001f;
pub const PR_EC_EXTERNAL_SUBJECT: u32 = 0x6768_001f;
pub const PR_THUMBNAIL_PHOTO: u32 = 0x8c9e_0102;
pub const PR_EMS_AB_THUMBNAIL_PHOTO: u32 = PR_THUMBNAIL_PHOTO;
pub const PR_TEST_LINE_SPEED: u32 = 0x662b_0102;

// Folders and permission tables.
pub const PR_FOLDER_TYPE: u32 = 0x3601_0003;
pub const PR_PARENT_FOLDER_ID: u32 = 0x6749_0014;
pub const PR_MEMBER_ID: u32 = 0x6671_0014;
pub const PR_MEMBER_NAME: u32 = 0x6672_001f;
pub const PR_MEMBER_RIGHTS: u32 = 0x6673_0003;

// Recipients.
pub const PR_RECIPIENT_TYPE: u32 = 0x0c15_0003;
pub const PR_RESPONSIBILITY: u32 = 0x0e0f_000b;
pub const PR_RECIPIENT_FLAGS: u32 = 0x5ffd_0003;
pub const PR_SENT_REPRESENTING_NAME: u32 = 0x0042_001f;
pub const PR_SENT_REPRESENTING_ADDRTYPE: u32 = 0x0064_001f;
pub const PR_SENT_REPRESENTING_EMAIL_ADDRESS: u32 = 0x0065_001f;
pub const PR_SENT_REPRESENTING_SMTP_ADDRESS: u32 = 0x5d02_001f;
pub const PR_SENT_REPRESENTING_ENTRYID: u32 = 0x0041_0102;
pub const PR_SENDER_NAME: u32 = 0x0c1a_001f;
pub const PR_SENDER_ADDRTYPE: u32 = 0x0c1e_001f;
pub const PR_SENDER_EMAIL_ADDRESS: u32 = 0x0c1f_001f;
pub const PR_SENDER_SMTP_ADDRESS: u32 = 0x5d01_001f;
pub const PR_SENDER_ENTRYID: u32 = 0x0c19_0102;
pub const PR_ROWID: u32 = 0x3000_0003;

// Attachments.
pub const PR_ATTACH_NUM: u32 = 0x0e21_0003;
pub const PR_ATTACH_METHOD: u32 = 0x3705_0003;
pub const PR_ATTACH_DATA_BIN: u32 = 0x3701_0102;
pub const PR_ATTACH_DATA_OBJ: u32 = 0x3701_000d;
pub const PR_ATTACH_LONG_FILENAME: u32 = 0x3707_001f;
pub const PR_ATTACH_EXTENSION: u32 = 0x3703_001f;
pub const PR_ATTACH_MIME_TAG: u32 = 0x370e_001f;
pub const PR_ATTACHMENT_HIDDEN: u32 = 0x7ffe_000b;
pub const PR_ATTACHMENT_FLAGS: u32 = 0x7ffd_0003;
pub const PR_ATTACHMENT_LINKID: u32 = 0x7ffa_0003;
pub const PR_EXCEPTION_STARTTIME: u32 = 0x7ffb_0040;
pub const PR_EXCEPTION_ENDTIME: u32 = 0x7ffc_0040;
pub const PR_RENDERING_POSITION: u32 = 0x370b_0003;

// Attach methods.
pub const ATTACH_METHOD_NONE: u32 = 0;
pub const ATTACH_METHOD_BY_VALUE: u32 = 1;
pub const ATTACH_METHOD_EMBEDDED: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_composition() {
        assert_eq!(prop_tag(0x3001, PT_UNICODE), PR_DISPLAY_NAME);
        assert_eq!(prop_id(PR_CHANGE_KEY), 0x65e2);
        assert_eq!(prop_type(PR_CHANGE_KEY), PT_BINARY);
        assert_eq!(
            change_tag_type(PR_SUBJECT, PT_STRING8),
            prop_tag(0x0037, PT_STRING8)
        );
        assert!(is_named_propid(0x8216));
        assert!(!is_named_propid(0x3001));
    }
}
