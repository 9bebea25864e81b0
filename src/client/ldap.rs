//! Directory (LDAP / Active Directory) provider
//!
//! Binds as `DOMAIN\account` with the supplied password, then looks the
//! account up by `sAMAccountName` below `baseDN` to fill in the principal's
//! name, email and group-derived roles.

use async_trait::async_trait;
use ldap3::{ldap_escape, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::Client;
use crate::config::{duration_serde, ProviderConfig};
use crate::error::{AuthError, Result};
use crate::user::User;

pub const DEFAULT_PORT: u16 = 389;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// LDAP result code for a rejected bind
const INVALID_CREDENTIALS_RC: u32 = 49;

const SEARCH_ATTRIBUTES: [&str; 5] = ["sAMAccountName", "displayName", "cn", "mail", "memberOf"];

/// Configuration for the `ldap` provider as written in the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default, rename = "baseDN")]
    pub base_dn: Option<String>,

    #[serde(default)]
    pub short_domain: Option<String>,

    /// Default: 389
    #[serde(default)]
    pub port: Option<u16>,

    /// Upgrade the connection with StartTLS (default: false)
    #[serde(default, rename = "useTLS")]
    pub use_tls: Option<bool>,

    /// Name checked against the server certificate (default: endpoint)
    #[serde(default)]
    pub tls_server_name: Option<String>,

    #[serde(default)]
    pub insecure_skip_verify: Option<bool>,

    /// Connect and per-operation timeout (default: 10s)
    #[serde(default, with = "duration_serde::option")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LdapClient {
    endpoint: String,
    base_dn: String,
    short_domain: String,
    port: u16,
    use_tls: bool,
    tls_server_name: String,
    insecure_skip_verify: bool,
    timeout: Duration,
}

impl LdapClient {
    pub fn new(config: LdapConfig) -> Result<Self> {
        let endpoint = required(config.endpoint, "endpoint")?;
        let base_dn = required(config.base_dn, "baseDN")?;
        let short_domain = required(config.short_domain, "shortDomain")?;
        let tls_server_name = config
            .tls_server_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| endpoint.clone());
        let use_tls = config.use_tls.unwrap_or(false);

        // ldap3 verifies the certificate against the host it dials
        if use_tls && !tls_server_name.eq_ignore_ascii_case(&endpoint) {
            return Err(AuthError::Config(format!(
                "tlsServerName '{}' must match endpoint '{}' when useTLS is enabled",
                tls_server_name, endpoint
            )));
        }

        Ok(Self {
            endpoint,
            base_dn,
            short_domain,
            port: config.port.unwrap_or(DEFAULT_PORT),
            use_tls,
            tls_server_name,
            insecure_skip_verify: config.insecure_skip_verify.unwrap_or(false),
            timeout: config.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    pub fn from_provider_config(config: &ProviderConfig) -> Result<Arc<dyn Client>> {
        let ldap: LdapConfig = config.settings_as()?;
        Ok(Arc::new(Self::new(ldap)?))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn tls_server_name(&self) -> &str {
        &self.tls_server_name
    }

    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }

    pub fn url(&self) -> String {
        format!("ldap://{}:{}", self.endpoint, self.port)
    }

    /// Split a login name into (account, domain).
    ///
    /// Accepts `account`, `DOMAIN\account` and `account@domain.tld`; the UPN
    /// suffix is ignored in favor of the configured short domain.
    pub fn parse_username(&self, username: &str) -> Result<(String, String)> {
        let (account, domain) = if let Some((domain, account)) = username.split_once('\\') {
            (account, domain)
        } else if let Some((account, _)) = username.split_once('@') {
            (account, self.short_domain.as_str())
        } else {
            (username, self.short_domain.as_str())
        };

        let account = account.trim();
        let domain = domain.trim();
        if account.is_empty() || domain.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        Ok((account.to_string(), domain.to_string()))
    }

    fn connection_settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.use_tls)
            .set_no_tls_verify(self.insecure_skip_verify)
    }
}

#[async_trait]
impl Client for LdapClient {
    fn origin(&self) -> &str {
        &self.short_domain
    }

    async fn validate_credentials(&self, username: &str, password: &str) -> Result<User> {
        // An empty password would be an unauthenticated bind, which servers accept
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let (account, domain) = self.parse_username(username)?;

        let url = self.url();
        tracing::debug!("Binding {}\\{} against {}", domain, account, url);
        let (conn, mut ldap) = LdapConnAsync::with_settings(self.connection_settings(), &url)
            .await
            .map_err(AuthError::provider)?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!("LDAP connection error: {}", e);
            }
        });

        let bind = ldap
            .with_timeout(self.timeout)
            .simple_bind(&format!("{}\\{}", domain, account), password)
            .await
            .map_err(AuthError::provider)?;
        if bind.rc == INVALID_CREDENTIALS_RC {
            let _ = ldap.unbind().await;
            return Err(AuthError::InvalidCredentials);
        }
        bind.success().map_err(AuthError::provider)?;

        let filter = format!("(&(objectClass=user)(sAMAccountName={}))", ldap_escape(&account));
        let (entries, _) = ldap
            .with_timeout(self.timeout)
            .search(&self.base_dn, Scope::Subtree, &filter, SEARCH_ATTRIBUTES.to_vec())
            .await
            .map_err(AuthError::provider)?
            .success()
            .map_err(AuthError::provider)?;

        if let Err(e) = ldap.unbind().await {
            tracing::debug!("LDAP unbind failed: {}", e);
        }

        let entry = entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .ok_or_else(|| {
                AuthError::provider(anyhow::anyhow!(
                    "no directory entry for {} below {}",
                    account,
                    self.base_dn
                ))
            })?;

        Ok(self.user_from_entry(&account, &entry))
    }
}

impl LdapClient {
    fn user_from_entry(&self, account: &str, entry: &SearchEntry) -> User {
        let first = |attr: &str| entry.attrs.get(attr).and_then(|values| values.first()).cloned();

        let username = first("sAMAccountName").unwrap_or_else(|| account.to_string());
        let name = first("displayName")
            .or_else(|| first("cn"))
            .unwrap_or_else(|| username.clone());
        let email = first("mail").unwrap_or_default();
        let roles = entry
            .attrs
            .get("memberOf")
            .map(|groups| groups.iter().filter_map(|dn| group_name(dn)).collect::<Vec<_>>())
            .unwrap_or_default();

        User::new(self.short_domain.clone(), username, name, email).with_roles(roles)
    }
}

/// Common name of a group DN: "CN=Domain Admins,CN=Users,DC=corp" -> "Domain Admins"
fn group_name(dn: &str) -> Option<String> {
    let first = dn.split(',').next()?.trim();
    let (attr, value) = first.split_once('=')?;
    if attr.trim().eq_ignore_ascii_case("cn") && !value.is_empty() {
        Some(value.trim().to_string())
    } else {
        None
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AuthError::Config(format!("{} must be specified in configuration", field)))
}
