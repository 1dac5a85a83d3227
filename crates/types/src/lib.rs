/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod codepage;
pub mod constants;
pub mod content;
pub mod entryid;
pub mod error;
pub mod guid;
pub mod idset;
pub mod minid;
pub mod proptag;
pub mod time;
pub mod value;
pub mod xid;

pub use error::EcError;
pub use guid::Guid;
pub use minid::Minid;
pub use value::{
    ProblemArray, PropValue, PropertyGroupInfo, PropertyName, PropertyNameKind, ProptagArray,
    TaggedPropval, TpropvalArray,
};
pub use xid::Xid;
