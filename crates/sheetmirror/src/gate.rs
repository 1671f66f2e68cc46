//! Lazy, single-flight authorization.

use chrono::{TimeDelta, Utc};
use sheetmirror_error::Result;
use sheetmirror_http::google::credentials::ServiceAccount;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::remote::{Credential, SheetsRemote};

/// Tokens this close to expiry are refreshed before use.
fn expiry_skew() -> TimeDelta {
    TimeDelta::seconds(60)
}

/// Lifecycle of the credential handle. An authorized handle only moves back
/// to `Established` once its token expires.
#[derive(Debug, Clone)]
pub enum CredentialState {
    /// No handle built yet.
    Unestablished,
    /// Handle built from identity material, no access token.
    Established(Credential),
    /// Handle carries an access token.
    Authorized(Credential),
}

/// State without the handle, for callers that only care where we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Unestablished,
    Established,
    Authorized,
}

impl CredentialState {
    pub fn status(&self) -> CredentialStatus {
        match self {
            Self::Unestablished => CredentialStatus::Unestablished,
            Self::Established(_) => CredentialStatus::Established,
            Self::Authorized(_) => CredentialStatus::Authorized,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Unestablished => None,
            Self::Established(cred) | Self::Authorized(cred) => Some(cred),
        }
    }
}

/// Owns the credential of one client.
///
/// The state lock is held across the authorization round-trip, so callers
/// arriving while an attempt is in flight wait for it and reuse its token
/// instead of issuing their own. A failed attempt leaves the gate in
/// `Established`, the next caller tries again.
#[derive(Debug)]
pub struct CredentialGate {
    account: ServiceAccount,
    scopes: Vec<String>,
    state: Mutex<CredentialState>,
}

impl CredentialGate {
    pub fn new(account: ServiceAccount, scopes: Vec<String>) -> Self {
        CredentialGate {
            account,
            scopes,
            state: Mutex::new(CredentialState::Unestablished),
        }
    }

    pub async fn state(&self) -> CredentialState {
        self.state.lock().await.clone()
    }

    pub async fn status(&self) -> CredentialStatus {
        self.state.lock().await.status()
    }

    /// Current handle, if one was established.
    pub async fn credential(&self) -> Option<Credential> {
        self.state.lock().await.credential().cloned()
    }

    /// Build the handle from identity material without authorizing.
    ///
    /// Errors if the identity material is missing.
    pub async fn establish(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, CredentialState::Unestablished) {
            *state = CredentialState::Established(self.build_credential()?);
        }
        Ok(())
    }

    fn build_credential(&self) -> Result<Credential> {
        self.account.validate()?;
        debug!(client_email = %self.account.client_email, "establishing credential");
        Ok(Credential::new(self.account.clone(), self.scopes.clone()))
    }

    /// Ensure we hold an access token, authorizing through `remote` if needed.
    ///
    /// Returns the authorized handle. A no-op while the token is valid, an
    /// expired token is replaced under the same lock.
    pub async fn ensure_authenticated<R>(&self, remote: &R) -> Result<Credential>
    where
        R: SheetsRemote + ?Sized,
    {
        let mut state = self.state.lock().await;

        let established = match &*state {
            CredentialState::Authorized(cred) if !cred.is_expired(Utc::now(), expiry_skew()) => {
                return Ok(cred.clone());
            }
            CredentialState::Authorized(cred) => {
                debug!(client_email = %cred.client_email(), expires_at = ?cred.expires_at, "access token expired");
                let cred = cred.without_token();
                *state = CredentialState::Established(cred.clone());
                cred
            }
            CredentialState::Established(cred) => cred.clone(),
            CredentialState::Unestablished => {
                let cred = self.build_credential()?;
                *state = CredentialState::Established(cred.clone());
                cred
            }
        };

        match remote.authorize(&established).await {
            Ok(authorized) => {
                info!(client_email = %authorized.client_email(), expires_at = ?authorized.expires_at, "authorized");
                *state = CredentialState::Authorized(authorized.clone());
                Ok(authorized)
            }
            Err(e) => {
                warn!(%e, client_email = %established.client_email(), "authorization failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use sheetmirror_error::SheetMirrorError;

    use super::*;
    use crate::address::A1Range;
    use crate::options::{MajorDimension, ValueInputOption, ValueRenderOption};
    use crate::rest::{
        BatchUpdateSpreadsheetResponse,
        BatchUpdateValuesResponse,
        Spreadsheet,
        UpdateValuesResponse,
        ValueRange,
    };

    /// Remote that only knows how to authorize.
    #[derive(Debug, Default)]
    struct AuthOnly {
        attempts: AtomicUsize,
        reject_first: bool,
        /// Lifetime of issued tokens, unknown if unset.
        token_lifetime: Option<TimeDelta>,
    }

    impl SheetsRemote for AuthOnly {
        fn authorize<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, Result<Credential>> {
            async move {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                // Give concurrent callers a chance to pile up.
                tokio::task::yield_now().await;
                if self.reject_first && attempt == 0 {
                    return Err(SheetMirrorError::auth("invalid_grant"));
                }
                let expires_at = self.token_lifetime.map(|lifetime| Utc::now() + lifetime);
                Ok(credential.with_token(format!("token-{attempt}"), None, expires_at))
            }
            .boxed()
        }

        fn get_spreadsheet_metadata<'a>(
            &'a self,
            _: &'a str,
            _: &'a Credential,
        ) -> BoxFuture<'a, Result<Spreadsheet>> {
            unimplemented!()
        }

        fn get_spreadsheet_full<'a>(
            &'a self,
            _: &'a str,
            _: &'a Credential,
            _: bool,
        ) -> BoxFuture<'a, Result<Spreadsheet>> {
            unimplemented!()
        }

        fn get_values<'a>(
            &'a self,
            _: &'a str,
            _: &'a A1Range,
            _: &'a Credential,
            _: MajorDimension,
            _: ValueRenderOption,
        ) -> BoxFuture<'a, Result<ValueRange>> {
            unimplemented!()
        }

        fn update_values<'a>(
            &'a self,
            _: &'a str,
            _: &'a A1Range,
            _: &'a Credential,
            _: ValueInputOption,
            _: &'a ValueRange,
        ) -> BoxFuture<'a, Result<UpdateValuesResponse>> {
            unimplemented!()
        }

        fn batch_update_values<'a>(
            &'a self,
            _: &'a str,
            _: &'a Credential,
            _: ValueInputOption,
            _: &'a [ValueRange],
        ) -> BoxFuture<'a, Result<BatchUpdateValuesResponse>> {
            unimplemented!()
        }

        fn batch_update_spreadsheet<'a>(
            &'a self,
            _: &'a str,
            _: &'a Credential,
            _: &'a [serde_json::Value],
        ) -> BoxFuture<'a, Result<BatchUpdateSpreadsheetResponse>> {
            unimplemented!()
        }
    }

    fn gate() -> CredentialGate {
        CredentialGate::new(
            ServiceAccount::new("mirror@example.iam.gserviceaccount.com", "key"),
            vec!["scope".to_string()],
        )
    }

    #[tokio::test]
    async fn second_call_is_noop() {
        let remote = AuthOnly::default();
        let gate = gate();
        assert_eq!(CredentialStatus::Unestablished, gate.status().await);

        let first = gate.ensure_authenticated(&remote).await.unwrap();
        let second = gate.ensure_authenticated(&remote).await.unwrap();

        assert_eq!(1, remote.attempts.load(Ordering::SeqCst));
        assert_eq!(Some("token-0"), first.access_token.as_deref());
        assert_eq!(first.access_token, second.access_token);
        assert_eq!(CredentialStatus::Authorized, gate.status().await);
    }

    #[tokio::test]
    async fn concurrent_callers_share_attempt() {
        let remote = AuthOnly::default();
        let gate = gate();

        let (a, b, c) = tokio::join!(
            gate.ensure_authenticated(&remote),
            gate.ensure_authenticated(&remote),
            gate.ensure_authenticated(&remote),
        );

        assert_eq!(1, remote.attempts.load(Ordering::SeqCst));
        for cred in [a, b, c] {
            assert_eq!(Some("token-0"), cred.unwrap().access_token.as_deref());
        }
    }

    #[tokio::test]
    async fn establish_without_authorizing() {
        let gate = gate();
        gate.establish().await.unwrap();
        gate.establish().await.unwrap();

        assert_eq!(CredentialStatus::Established, gate.status().await);
        assert!(matches!(gate.state().await, CredentialState::Established(_)));
        let cred = gate.credential().await.unwrap();
        assert!(!cred.is_authorized());
        assert_eq!(vec!["scope".to_string()], cred.scopes);
    }

    #[tokio::test]
    async fn missing_identity_material() {
        let remote = AuthOnly::default();
        let gate = CredentialGate::new(ServiceAccount::new("", ""), Vec::new());

        let err = gate.ensure_authenticated(&remote).await.unwrap_err();
        assert!(matches!(err, SheetMirrorError::Auth(_)));
        assert_eq!(0, remote.attempts.load(Ordering::SeqCst));
        assert_eq!(CredentialStatus::Unestablished, gate.status().await);
    }

    #[tokio::test]
    async fn failed_attempt_can_be_retried() {
        let remote = AuthOnly {
            reject_first: true,
            ..Default::default()
        };
        let gate = gate();

        let err = gate.ensure_authenticated(&remote).await.unwrap_err();
        assert!(matches!(err, SheetMirrorError::Auth(_)));
        assert_eq!(CredentialStatus::Established, gate.status().await);

        let cred = gate.ensure_authenticated(&remote).await.unwrap();
        assert_eq!(Some("token-1"), cred.access_token.as_deref());
        assert_eq!(2, remote.attempts.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let remote = AuthOnly {
            token_lifetime: Some(TimeDelta::seconds(-10)),
            ..Default::default()
        };
        let gate = gate();

        let first = gate.ensure_authenticated(&remote).await.unwrap();
        let second = gate.ensure_authenticated(&remote).await.unwrap();

        assert_eq!(2, remote.attempts.load(Ordering::SeqCst));
        assert_eq!(Some("token-0"), first.access_token.as_deref());
        assert_eq!(Some("token-1"), second.access_token.as_deref());
        assert_eq!(CredentialStatus::Authorized, gate.status().await);
    }

    #[tokio::test]
    async fn token_within_skew_is_refreshed() {
        let remote = AuthOnly {
            token_lifetime: Some(TimeDelta::seconds(30)),
            ..Default::default()
        };
        let gate = gate();

        gate.ensure_authenticated(&remote).await.unwrap();
        gate.ensure_authenticated(&remote).await.unwrap();
        assert_eq!(2, remote.attempts.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn valid_token_is_reused() {
        let remote = AuthOnly {
            token_lifetime: Some(TimeDelta::hours(1)),
            ..Default::default()
        };
        let gate = gate();

        gate.ensure_authenticated(&remote).await.unwrap();
        gate.ensure_authenticated(&remote).await.unwrap();
        assert_eq!(1, remote.attempts.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_refresh_leaves_established() {
        let remote = AuthOnly {
            token_lifetime: Some(TimeDelta::seconds(-10)),
            ..Default::default()
        };
        let gate = gate();
        gate.ensure_authenticated(&remote).await.unwrap();

        let rejecting = AuthOnly {
            reject_first: true,
            ..Default::default()
        };
        let err = gate.ensure_authenticated(&rejecting).await.unwrap_err();
        assert!(matches!(err, SheetMirrorError::Auth(_)));
        assert_eq!(CredentialStatus::Established, gate.status().await);
        assert!(!gate.credential().await.unwrap().is_authorized());
    }

    #[test]
    fn state_accessors() {
        let cred = Credential::new(ServiceAccount::new("a@b.c", "k"), Vec::new());
        assert!(CredentialState::Unestablished.credential().is_none());

        let established = CredentialState::Established(cred.clone());
        assert_eq!(CredentialStatus::Established, established.status());
        assert!(established.credential().is_some());

        let authorized = CredentialState::Authorized(cred.with_token("t", None, None));
        assert_eq!(CredentialStatus::Authorized, authorized.status());
        assert!(authorized.credential().unwrap().is_authorized());
    }
}
