//! Static catalog of tracked slither detectors and their severity tiers.
//!
//! Findings are recognized in analyzer output only through the detector's
//! documentation link, see [`marker_for`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix shared by every detector documentation link slither prints.
pub const DOC_URL_PREFIX: &str = "https://github.com/crytic/slither/wiki/Detector-Documentation#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
    Informational,
    Optimization,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Informational,
        Self::Optimization,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Informational => "Informational",
            Self::Optimization => "Optimization",
        }
    }

    /// Informational and optimization findings do not make a contract unsafe.
    #[must_use]
    pub fn is_benign(self) -> bool {
        matches!(self, Self::Informational | Self::Optimization)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use Severity::{High, Informational, Low, Medium, Optimization};

pub static CATALOG: &[(&str, Severity)] = &[
    ("storage-abiencoderv2-array", High),
    ("arbitrary-from-in-transferfrom", High),
    ("modifying-storage-array-by-value", High),
    ("abi-encodePacked-collision", High),
    ("incorrect-shift-in-assembly", High),
    ("multiple-constructor-schemes", High),
    ("name-reused", High),
    ("protected-variables", High),
    ("public-mappings-with-nested-variables", High),
    ("right-to-left-override-character", High),
    ("state-variable-shadowing", High),
    ("suicidal", High),
    ("uninitialized-state-variables", High),
    ("uninitialized-storage-variables", High),
    ("unprotected-upgradeable-contract", High),
    ("codex", High),
    ("arbitrary-from-in-transferfrom-used-with-permit", High),
    ("functions-that-send-ether-to-arbitrary-destinations", High),
    ("array-length-assignment", High),
    ("controlled-delegatecall", High),
    ("payable-functions-using-delegatecall-inside-a-loop", High),
    ("incorrect-exponentiation", High),
    ("incorrect-return-in-assembly", High),
    ("msgvalue-inside-a-loop", High),
    ("reentrancy-vulnerabilities", High),
    ("return-instead-of-leave-in-assembly", High),
    ("storage-signed-integer-array", High),
    ("unchecked-transfer", High),
    ("weak-PRNG", High),
    ("domain-separator-collision", Medium),
    ("dangerous-enum-conversion", Medium),
    ("incorrect-erc20-interface", Medium),
    ("incorrect-erc721-interface", Medium),
    ("dangerous-strict-equalities", Medium),
    ("contracts-that-lock-ether", Medium),
    ("deletion-on-mapping-containing-a-structure", Medium),
    ("state-variable-shadowing-from-abstract-contracts", Medium),
    ("tautological-compare", Medium),
    ("tautology-or-contradiction", Medium),
    ("write-after-write", Medium),
    ("misuse-of-a-boolean-constant", Medium),
    ("constant-functions-using-assembly-code", Medium),
    ("constant-functions-changing-the-state", Medium),
    ("divide-before-multiply", Medium),
    ("out-of-order-retryable-transactions", Medium),
    ("reentrancy-vulnerabilities-1", Medium),
    ("reused-base-constructors", Medium),
    ("dangerous-usage-of-txorigin", Medium),
    ("unchecked-low-level-calls", Medium),
    ("unchecked-send", Medium),
    ("uninitialized-local-variables", Medium),
    ("unused-return", Medium),
    ("incorrect-modifier", Low),
    ("builtin-symbol-shadowing", Low),
    ("local-variable-shadowing", Low),
    ("uninitialized-function-pointers-in-constructors", Low),
    ("pre-declaration-usage-of-local-variables", Low),
    ("void-constructor", Low),
    ("calls-inside-a-loop", Low),
    ("missing-events-access-control", Low),
    ("missing-events-arithmetic", Low),
    ("dangerous-unary-expressions", Low),
    ("missing-zero-address-validation", Low),
    ("reentrancy-vulnerabilities-2", Low),
    ("reentrancy-vulnerabilities-3", Low),
    ("return-bomb", Low),
    ("block-timestamp", Low),
    ("assembly-usage", Informational),
    ("assert-state-change", Informational),
    ("boolean-equality", Informational),
    ("cyclomatic-complexity", Informational),
    ("deprecated-standards", Informational),
    ("unindexed-erc20-event-parameters", Informational),
    ("function-initializing-state", Informational),
    ("incorrect-using-for-usage", Informational),
    ("low-level-calls", Informational),
    ("missing-inheritance", Informational),
    ("conformance-to-solidity-naming-conventions", Informational),
    ("different-pragma-directives-are-used", Informational),
    ("redundant-statements", Informational),
    ("incorrect-versions-of-solidity", Informational),
    ("unimplemented-functions", Informational),
    ("unused-imports", Informational),
    ("unused-state-variable", Informational),
    ("costly-operations-inside-a-loop", Informational),
    ("dead-code", Informational),
    ("reentrancy-vulnerabilities-4", Informational),
    ("too-many-digits", Informational),
    ("cache-array-length", Optimization),
    ("state-variables-that-could-be-declared-constant", Optimization),
    ("public-function-that-could-be-declared-external", Optimization),
    ("state-variables-that-could-be-declared-immutable", Optimization),
    ("public-variable-read-in-external-context", Optimization),
];

#[must_use]
pub fn severity_of(check_id: &str) -> Option<Severity> {
    CATALOG
        .iter()
        .find(|(id, _)| *id == check_id)
        .map(|(_, severity)| *severity)
}

/// Documentation link slither prints next to a finding of `check_id`.
#[must_use]
pub fn marker_for(check_id: &str) -> String {
    format!("{DOC_URL_PREFIX}{check_id}")
}

/// Non-overlapping, case-insensitive occurrences of the marker of `check_id`
/// in `lowered_output`, which the caller must already have lowercased.
#[must_use]
pub fn count_marker(lowered_output: &str, check_id: &str) -> usize {
    let marker = marker_for(check_id).to_lowercase();
    lowered_output.matches(marker.as_str()).count()
}
