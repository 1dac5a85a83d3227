/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::{error::EcError, guid::Guid, proptag};
use ahash::AHashMap;

/// A typed MAPI property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Short(i16),
    Long(u32),
    Float(f32),
    Double(f64),
    Bool(bool),
    I8(u64),
    Unicode(String),
    Binary(Vec<u8>),
    Clsid(Guid),
    NtTime(u64),
    Error(u32),
    ShortArray(Vec<i16>),
    LongArray(Vec<u32>),
    UnicodeArray(Vec<String>),
    BinaryArray(Vec<Vec<u8>>),
    NtTimeArray(Vec<u64>),
}

impl PropValue {
    pub fn proptype(&self) -> u16 {
        match self {
            PropValue::Short(_) => proptag::PT_SHORT,
            PropValue::Long(_) => proptag::PT_LONG,
            PropValue::Float(_) => proptag::PT_FLOAT,
            PropValue::Double(_) => proptag::PT_DOUBLE,
            PropValue::Bool(_) => proptag::PT_BOOLEAN,
            PropValue::I8(_) => proptag::PT_I8,
            PropValue::Unicode(_) => proptag::PT_UNICODE,
            PropValue::Binary(_) => proptag::PT_BINARY,
            PropValue::Clsid(_) => proptag::PT_CLSID,
            PropValue::NtTime(_) => proptag::PT_SYSTIME,
            PropValue::Error(_) => proptag::PT_ERROR,
            PropValue::ShortArray(_) => proptag::PT_MV_FLAG | proptag::PT_SHORT,
            PropValue::LongArray(_) => proptag::PT_MV_LONG,
            PropValue::UnicodeArray(_) => proptag::PT_MV_UNICODE,
            PropValue::BinaryArray(_) => proptag::PT_MV_BINARY,
            PropValue::NtTimeArray(_) => proptag::PT_MV_SYSTIME,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Unicode(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropValue::Long(v) => Some(*v),
            PropValue::Short(v) => Some(*v as u32),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PropValue::I8(v) | PropValue::NtTime(v) => Some(*v),
            PropValue::Long(v) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(v) => Some(*v),
            PropValue::Short(v) => Some(*v != 0),
            PropValue::Long(v) => Some(*v != 0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPropval {
    pub proptag: u32,
    pub value: PropValue,
}

impl TaggedPropval {
    pub fn new(proptag: u32, value: PropValue) -> Self {
        TaggedPropval { proptag, value }
    }
}

/// An ordered property list with last-write-wins tag semantics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TpropvalArray {
    propvals: Vec<TaggedPropval>,
}

impl TpropvalArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, proptag: u32, value: PropValue) {
        if let Some(existing) = self.propvals.iter_mut().find(|pv| pv.proptag == proptag) {
            existing.value = value;
        } else {
            self.propvals.push(TaggedPropval { proptag, value });
        }
    }

    pub fn get(&self, proptag: u32) -> Option<&PropValue> {
        self.propvals
            .iter()
            .find(|pv| pv.proptag == proptag)
            .map(|pv| &pv.value)
    }

    pub fn remove(&mut self, proptag: u32) -> bool {
        let before = self.propvals.len();
        self.propvals.retain(|pv| pv.proptag != proptag);
        before != self.propvals.len()
    }

    pub fn has(&self, proptag: u32) -> bool {
        self.get(proptag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaggedPropval> {
        self.propvals.iter()
    }

    pub fn len(&self) -> usize {
        self.propvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.propvals.is_empty()
    }

    pub fn proptags(&self) -> ProptagArray {
        let mut tags = ProptagArray::new();
        for pv in &self.propvals {
            tags.append(pv.proptag);
        }
        tags
    }

    pub fn get_str(&self, proptag: u32) -> Option<&str> {
        self.get(proptag).and_then(PropValue::as_str)
    }

    pub fn get_u32(&self, proptag: u32) -> Option<u32> {
        self.get(proptag).and_then(PropValue::as_u32)
    }

    pub fn get_u64(&self, proptag: u32) -> Option<u64> {
        self.get(proptag).and_then(PropValue::as_u64)
    }

    pub fn get_bool(&self, proptag: u32) -> Option<bool> {
        self.get(proptag).and_then(PropValue::as_bool)
    }
}

impl FromIterator<TaggedPropval> for TpropvalArray {
    fn from_iter<T: IntoIterator<Item = TaggedPropval>>(iter: T) -> Self {
        let mut array = TpropvalArray::new();
        for pv in iter {
            array.set(pv.proptag, pv.value);
        }
        array
    }
}

/// A set of proptags preserving append order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProptagArray {
    proptags: Vec<u32>,
}

impl ProptagArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append if absent; returns whether the tag was added.
    pub fn append(&mut self, proptag: u32) -> bool {
        if self.proptags.contains(&proptag) {
            false
        } else {
            self.proptags.push(proptag);
            true
        }
    }

    pub fn remove(&mut self, proptag: u32) -> bool {
        let before = self.proptags.len();
        self.proptags.retain(|&t| t != proptag);
        before != self.proptags.len()
    }

    pub fn contains(&self, proptag: u32) -> bool {
        self.proptags.contains(&proptag)
    }

    pub fn clear(&mut self) {
        self.proptags.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.proptags.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.proptags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proptags.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.proptags
    }
}

impl FromIterator<u32> for ProptagArray {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut array = ProptagArray::new();
        for tag in iter {
            array.append(tag);
        }
        array
    }
}

/// A per-property failure inside a batch operation; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyProblem {
    pub index: usize,
    pub proptag: u32,
    pub err: EcError,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProblemArray {
    pub problems: Vec<PropertyProblem>,
}

impl ProblemArray {
    pub fn push(&mut self, index: usize, proptag: u32, err: EcError) {
        self.problems.push(PropertyProblem {
            index,
            proptag,
            err,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn contains_tag(&self, proptag: u32) -> bool {
        self.problems.iter().any(|p| p.proptag == proptag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyNameKind {
    Id(u32),
    Name(String),
}

/// A named property: a GUID-scoped numeric or string identifier whose
/// propid is allocated per store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyName {
    pub guid: Guid,
    pub kind: PropertyNameKind,
}

impl PropertyName {
    pub fn by_id(guid: Guid, lid: u32) -> Self {
        PropertyName {
            guid,
            kind: PropertyNameKind::Id(lid),
        }
    }

    pub fn by_name(guid: Guid, name: impl Into<String>) -> Self {
        PropertyName {
            guid,
            kind: PropertyNameKind::Name(name.into()),
        }
    }

    /// The text key used by the store's dual hash.
    pub fn to_key(&self) -> String {
        match &self.kind {
            PropertyNameKind::Id(lid) => format!("{}:lid:{}", self.guid, lid),
            PropertyNameKind::Name(name) => {
                format!("{}:name:{}", self.guid, name.to_lowercase())
            }
        }
    }
}

/// Partition of a message's proptags into change groups, used to encode
/// partial changes on save.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyGroupInfo {
    pub group_id: u32,
    pub groups: Vec<ProptagArray>,
}

impl PropertyGroupInfo {
    pub fn new(group_id: u32) -> Self {
        PropertyGroupInfo {
            group_id,
            groups: Vec::new(),
        }
    }

    pub fn append_group(&mut self, group: ProptagArray) {
        self.groups.push(group);
    }

    pub fn get_partial_index(&self, proptag: u32) -> Option<u32> {
        self.groups
            .iter()
            .position(|group| group.contains(proptag))
            .map(|pos| pos as u32)
    }
}

/// A recipient/attachment row set.
pub type PropvalRowSet = Vec<TpropvalArray>;

/// Map of propid to property name kept by groupinfo builders.
pub type NameMap = AHashMap<u16, PropertyName>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proptag::{PR_DISPLAY_NAME, PR_SUBJECT};

    #[test]
    fn propval_last_write_wins() {
        let mut props = TpropvalArray::new();
        props.set(PR_SUBJECT, PropValue::Unicode("a".into()));
        props.set(PR_SUBJECT, PropValue::Unicode("b".into()));
        assert_eq!(props.len(), 1);
        assert_eq!(props.get_str(PR_SUBJECT), Some("b"));
    }

    #[test]
    fn proptag_array_is_a_set() {
        let mut tags = ProptagArray::new();
        assert!(tags.append(PR_SUBJECT));
        assert!(!tags.append(PR_SUBJECT));
        assert!(tags.append(PR_DISPLAY_NAME));
        assert_eq!(tags.as_slice(), &[PR_SUBJECT, PR_DISPLAY_NAME]);
        assert!(tags.remove(PR_SUBJECT));
        assert!(!tags.contains(PR_SUBJECT));
    }

    #[test]
    fn name_keys_fold_case() {
        let guid = Guid::from_str("00062002-0000-0000-c000-000000000046").unwrap();
        let a = PropertyName::by_name(guid, "Keywords").to_key();
        let b = PropertyName::by_name(guid, "keywords").to_key();
        assert_eq!(a, b);
        let c = PropertyName::by_id(guid, 0x8216).to_key();
        assert_ne!(a, c);
    }

    #[test]
    fn groupinfo_partial_index() {
        let mut info = PropertyGroupInfo::new(1);
        info.append_group([PR_SUBJECT].into_iter().collect());
        info.append_group([PR_DISPLAY_NAME].into_iter().collect());
        assert_eq!(info.get_partial_index(PR_DISPLAY_NAME), Some(1));
        assert_eq!(info.get_partial_index(0x1234_001f), None);
    }
}
