// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The do-nothing policy.

use crate::policy::DumpPolicy;

/// Never evicts automatically.
///
/// Buffers are dumped only by explicit `dump` calls. This is the default
/// policy: automatic eviction is opt-in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverDump;

impl DumpPolicy for NeverDump {
    fn name(&self) -> &'static str {
        "never"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::create_policy;

    #[test]
    fn test_no_params() {
        let policy = create_policy("never").unwrap();
        assert!(policy.param_names().is_empty());
        assert!(policy.get_param("barrier").is_none());
    }

    #[test]
    fn test_set_param_rejected() {
        let mut policy = NeverDump;
        assert!(!policy.set_param("barrier", "1G"));
    }
}
