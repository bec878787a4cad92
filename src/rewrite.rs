//! Hooks for rewriting asset URLs before they leave the service.

use std::sync::Arc;

use crate::signer::UrlSigner;

pub trait UrlRewriter: Send + Sync {
    fn rewrite(&self, url: &str) -> String;
}

/// Leaves URLs untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRewriter;

impl UrlRewriter for IdentityRewriter {
    fn rewrite(&self, url: &str) -> String {
        url.to_string()
    }
}

/// Points asset URLs at this service's `/proxy` endpoint with a signed token.
#[derive(Debug, Clone)]
pub struct ProxyRewriter {
    public_base: String,
    signer: Arc<UrlSigner>,
}

impl ProxyRewriter {
    pub fn new(public_base: &str, signer: Arc<UrlSigner>) -> Self {
        Self {
            public_base: public_base.trim_end_matches('/').to_string(),
            signer,
        }
    }
}

impl UrlRewriter for ProxyRewriter {
    fn rewrite(&self, url: &str) -> String {
        format!("{}/proxy?t={}", self.public_base, self.signer.sign(url))
    }
}
