// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux common types and utilities

pub mod errors;
pub mod types;

// Re-export common types
pub use errors::*;
pub use types::*;
