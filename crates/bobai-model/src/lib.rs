// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod sse;
mod error;
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use error::ProviderError;
pub use mock::{Script, ScriptedProvider};
pub use openai_compat::OpenAICompatProvider;
pub use provider::{ChatProvider, ResponseStream};
pub use types::*;

use anyhow::bail;

/// Default endpoint of the Copilot-compatible gateway.
const COPILOT_BASE_URL: &str = "https://api.githubcopilot.com";
/// Default OpenAI endpoint.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Construct a boxed [`ChatProvider`] for a configured provider id.
///
/// `token` is the pre-resolved credential from the auth store; local
/// endpoints may pass `None`.  `base_url` overrides the provider's default
/// endpoint (useful for proxies and local servers speaking the same wire
/// format).
pub fn from_config(
    provider_id: &str,
    token: Option<String>,
    base_url: Option<&str>,
) -> anyhow::Result<Box<dyn ChatProvider>> {
    match provider_id {
        "copilot" => Ok(Box::new(OpenAICompatProvider::new(
            "copilot",
            base_url.unwrap_or(COPILOT_BASE_URL),
            token,
        ))),
        "openai" => Ok(Box::new(OpenAICompatProvider::new(
            "openai",
            base_url.unwrap_or(OPENAI_BASE_URL),
            token,
        ))),
        // Any other id is treated as an OpenAI-compatible endpoint when a
        // base_url is supplied; otherwise we cannot know where to connect.
        other => match base_url {
            Some(url) => Ok(Box::new(OpenAICompatProvider::new(
                other.to_string(),
                url,
                token,
            ))),
            None => bail!("unknown provider {other:?} (known: copilot, openai; or set a base_url)"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copilot_provider_resolves() {
        let p = from_config("copilot", Some("t".into()), None).unwrap();
        assert_eq!(p.name(), "copilot");
    }

    #[test]
    fn openai_provider_resolves() {
        let p = from_config("openai", Some("t".into()), None).unwrap();
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn custom_provider_requires_base_url() {
        assert!(from_config("llamacpp", None, None).is_err());
        let p = from_config("llamacpp", None, Some("http://localhost:8080/v1")).unwrap();
        assert_eq!(p.name(), "llamacpp");
    }
}
