//! Shared-secret check for inbound webhook calls.
//!
//! The platform echoes the `secret_token` given to `setWebhook` in the
//! `X-Telegram-Bot-Api-Secret-Token` header of every delivery.

use subtle::ConstantTimeEq;

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

#[derive(Clone, Default)]
pub struct RequestAuthenticator {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl RequestAuthenticator {
    /// `None` disables the check; every request is accepted. The missing
    /// secret is reported once, as a configuration warning.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(String::into_bytes),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// `provided` is the raw header value, `None` when the header is absent.
    pub fn authenticate(&self, provided: Option<&[u8]>) -> bool {
        let Some(expected) = &self.secret else {
            return true;
        };
        let Some(provided) = provided else {
            return false;
        };
        if std::str::from_utf8(provided).is_err() {
            return false;
        }
        provided.len() == expected.len() && bool::from(provided.ct_eq(expected))
    }
}
