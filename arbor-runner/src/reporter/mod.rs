// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observing test runs.
//!
//! The runner reports progress as a stream of [`events::TestEvent`] values
//! passed to the callback given to
//! [`TestRunner::execute`](crate::runner::TestRunner::execute). Rendering
//! those events is the consumer's business; nothing in here feeds back into
//! scheduling.

pub mod events;

pub use events::TestEvent;
