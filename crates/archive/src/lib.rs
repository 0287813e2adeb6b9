// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wd-archive: content hashing, diffing and in-place mutation of deployable
//! web archives (zip WARs, or tar).

mod error;
mod format;
mod hash;
mod mutate;
mod path;

pub use error::ArchiveError;
pub use hash::{compute_hashes, diff, read_entries};
pub use mutate::apply_changes;
pub use path::validate_entry_path;

#[cfg(test)]
mod test_helpers;
