// src/auth/credential.rs

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{NiftiBatchError, Result};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const EXPECTED_FORM: &str = "account id should be of form 'ClientId=...;TenantId=...'";

/// Identity used to obtain access tokens for the batch service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub client_id: String,
    /// Tenant, already escaped for use in an authority URL.
    pub tenant: String,
    pub secret: String,
    /// `false` only for [`Credential::empty`].
    pub supports_real_authentication: bool,
}

impl Credential {
    /// Parse `ClientId=<id>;TenantId=<tenant>` plus a separately supplied
    /// secret.
    ///
    /// Whitespace anywhere in `raw` is ignored. Items are split on the first
    /// `=` only and keys match case-insensitively; unknown keys are skipped.
    pub fn parse(raw: &str, secret: impl Into<String>) -> Result<Self> {
        let cleaned = WHITESPACE.replace_all(raw, "");

        let mut client_id = None;
        let mut tenant = None;
        for item in cleaned.split(';') {
            let Some((key, value)) = item.split_once('=') else {
                continue;
            };
            if key.eq_ignore_ascii_case("TenantId") {
                tenant = Some(escape_data(value));
            } else if key.eq_ignore_ascii_case("ClientId") {
                client_id = Some(value.to_string());
            }
        }

        match (client_id, tenant) {
            (Some(client_id), Some(tenant)) if !client_id.is_empty() && !tenant.is_empty() => {
                Ok(Self {
                    client_id,
                    tenant,
                    secret: secret.into(),
                    supports_real_authentication: true,
                })
            }
            _ => Err(NiftiBatchError::CredentialFormat(EXPECTED_FORM.to_string())),
        }
    }

    /// Placeholder credential for services that need no authentication.
    pub fn empty() -> Self {
        Self {
            client_id: String::new(),
            tenant: String::new(),
            secret: String::new(),
            supports_real_authentication: false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("tenant", &self.tenant)
            .field("secret", &"<redacted>")
            .field(
                "supports_real_authentication",
                &self.supports_real_authentication,
            )
            .finish()
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn escape_data(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_and_tenant() {
        let cred = Credential::parse("ClientId=abc;TenantId=xyz", "s3cret").unwrap();
        assert_eq!(cred.client_id, "abc");
        assert_eq!(cred.tenant, "xyz");
        assert_eq!(cred.secret, "s3cret");
        assert!(cred.supports_real_authentication);
    }

    #[test]
    fn ignores_whitespace_case_and_order() {
        let cred = Credential::parse(" tenantid = contoso.onmicrosoft.com ;\n CLIENTID=a=b ", "").unwrap();
        assert_eq!(cred.tenant, "contoso.onmicrosoft.com");
        // Only the first '=' separates key and value.
        assert_eq!(cred.client_id, "a=b");
    }

    #[test]
    fn missing_or_empty_keys_are_format_errors() {
        for raw in ["ClientId=abc", "TenantId=xyz", "ClientId=;TenantId=xyz", "", "garbage"] {
            let err = Credential::parse(raw, "s").unwrap_err();
            match err {
                NiftiBatchError::CredentialFormat(msg) => {
                    assert!(msg.contains("ClientId=...;TenantId=..."), "{msg}")
                }
                other => panic!("unexpected error for {raw:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn tenant_is_escaped_for_urls() {
        let cred = Credential::parse("ClientId=abc;TenantId=a/b?c", "s").unwrap();
        assert_eq!(cred.tenant, "a%2Fb%3Fc");
    }

    #[test]
    fn debug_output_hides_secret() {
        let cred = Credential::parse("ClientId=abc;TenantId=xyz", "hunter2").unwrap();
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn empty_credential_does_not_support_real_authentication() {
        assert!(!Credential::empty().supports_real_authentication);
    }
}
