// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Failures raised by a chat provider.
///
/// The turn handler matches on [`ProviderError::Status`] to persist the
/// status and body into the session, so the `Display` text of that variant
/// is part of the stored-history contract.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-2xx HTTP response from the provider, raised before any stream
    /// event is emitted.
    #[error("Provider error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The SSE stream carried a `data:` payload that is not valid JSON, or
    /// the transport failed mid-stream.
    #[error("malformed provider stream: {0}")]
    Stream(String),

    /// The request's cancellation token fired.
    #[error("request canceled")]
    Canceled,
}
