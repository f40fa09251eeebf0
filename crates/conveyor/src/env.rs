// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Environment-variable lookups for the executor presets. Unset or unparsable
//! values fall back to the provided default, never to an error.

pub(crate) fn usize_or(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn bool_or(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
