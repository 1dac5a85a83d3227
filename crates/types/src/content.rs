/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::value::{PropvalRowSet, TpropvalArray};

/// A fully materialized message: the unit moved by `read_message` /
/// `write_message` and produced by the calendar importer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MessageContent {
    pub proplist: TpropvalArray,
    pub recipients: PropvalRowSet,
    pub attachments: Vec<AttachmentContent>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AttachmentContent {
    pub proplist: TpropvalArray,
    pub embedded: Option<Box<MessageContent>>,
}

impl MessageContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_recipient(&mut self, row: TpropvalArray) {
        self.recipients.push(row);
    }

    pub fn add_attachment(&mut self, attachment: AttachmentContent) {
        self.attachments.push(attachment);
    }
}

impl AttachmentContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedded(embedded: MessageContent) -> Self {
        AttachmentContent {
            proplist: TpropvalArray::new(),
            embedded: Some(Box::new(embedded)),
        }
    }
}
