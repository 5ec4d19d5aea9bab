// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types shared by every part of the event bus.
//!
//! Errors are grouped into three coarse status classes (see [`Status`]) so that
//! collaborators which only care about "generic failure", "allocation failure"
//! or "declined" can branch on [`NerveError::status`] without matching on every
//! variant.

use crate::event::EventId;
use thiserror::Error;

/// Coarse classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Invalid argument, capacity exceeded, registry conflict or unknown id.
    GenErr,
    /// An allocation could not be satisfied.
    MemErr,
    /// The operation was declined without anything being wrong with the caller.
    False,
}

/// The error type returned by registry, pool, dispatch, timer and codec operations.
#[derive(Debug, Error)]
pub enum NerveError {
    /// An argument was outside the range the operation accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A fixed-capacity structure has no room left.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The event id already carries a name.
    #[error("event id {id} is already registered as '{name}'")]
    AlreadyRegistered {
        /// The id that was being registered.
        id: EventId,
        /// The name currently bound to that id.
        name: String,
    },

    /// The event id has no registered name.
    #[error("unknown event id {0}")]
    UnknownEvent(EventId),

    /// No fast pool exists for the given type tag.
    #[error("no fast pool registered for tag {0}")]
    UnknownPool(u32),

    /// The operation was refused (duplicate, full queue, unregistered id).
    #[error("declined: {0}")]
    Declined(String),

    /// Memory for the request could not be obtained.
    #[error("allocation failed: {0}")]
    Memory(String),

    /// A JSON payload could not be parsed or produced.
    #[error("malformed event payload: {0}")]
    Codec(#[from] serde_json::Error),

    /// The channel behind a shard or pool has been torn down.
    #[error("channel disconnected: {0}")]
    Disconnected(String),
}

impl NerveError {
    /// Maps the error onto its [`Status`] class.
    pub fn status(&self) -> Status {
        match self {
            NerveError::InvalidArgument(_)
            | NerveError::CapacityExceeded(_)
            | NerveError::AlreadyRegistered { .. }
            | NerveError::UnknownEvent(_)
            | NerveError::UnknownPool(_)
            | NerveError::Disconnected(_) => Status::GenErr,
            NerveError::Memory(_) => Status::MemErr,
            NerveError::Declined(_) | NerveError::Codec(_) => Status::False,
        }
    }
}

/// Result alias used throughout the crate.
pub type NerveResult<T> = Result<T, NerveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(
            NerveError::CapacityExceeded("pool".into()).status(),
            Status::GenErr
        );
        assert_eq!(
            NerveError::AlreadyRegistered {
                id: 21,
                name: "A".into()
            }
            .status(),
            Status::GenErr
        );
        assert_eq!(NerveError::Memory("oom".into()).status(), Status::MemErr);
        assert_eq!(NerveError::Declined("full".into()).status(), Status::False);
    }

    #[test]
    fn codec_errors_convert_and_decline() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: NerveError = parse.into();
        assert_eq!(err.status(), Status::False);
        assert!(err.to_string().starts_with("malformed event payload"));
    }
}
