// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declaring, flattening and filtering tests.

mod test_list;
mod test_tree;

pub use test_list::*;
pub use test_tree::*;
