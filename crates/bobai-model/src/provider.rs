// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{CompletionRequest, StreamEvent};

/// A lazy, finite, non-restartable sequence of stream events.  Terminates
/// with a `Finish` event or a failure; nothing follows either.
pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamEvent>> + Send>>;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable provider id for status display and credential lookup.
    fn name(&self) -> &str;

    /// Send one streaming chat-completion request.
    ///
    /// A non-2xx response surfaces as [`crate::ProviderError::Status`]
    /// before any event is emitted; mid-stream failures propagate after
    /// already-yielded events.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
