// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// We have no meaningful way to handle poisoned locks, so we just panic with this message.
pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - terminating execution";
