use std::fmt;

use base64::Engine;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Method, Request};
use ring::signature::RsaKeyPair;
use serde::{Deserialize, Serialize};
use sheetmirror_error::{Result, SheetMirrorError};
use tracing::debug;
use url::Url;

use super::DEFAULT_TOKEN_URI;
use crate::client::{HttpClient, HttpResponse, read_error_text, read_json, set_form_body};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Service account identity, usually read from a json key file.
///
/// Only the fields needed for the jwt bearer flow are required, everything
/// else in the key file is ignored.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("token_uri", &self.token_uri)
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ServiceAccount {
    pub fn new(client_email: impl Into<String>, private_key: impl Into<String>) -> Self {
        ServiceAccount {
            client_email: client_email.into(),
            private_key: private_key.into(),
            token_uri: default_token_uri(),
            private_key_id: None,
            project_id: None,
        }
    }

    pub fn try_from_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| {
            SheetMirrorError::auth(format!("Failed to deserialize json service account key: {e}"))
        })
    }

    /// Check that the identity material is present.
    pub fn validate(&self) -> Result<()> {
        if self.client_email.trim().is_empty() {
            return Err(SheetMirrorError::auth("Missing service account client email"));
        }
        if self.private_key.trim().is_empty() {
            return Err(SheetMirrorError::auth("Missing service account private key"));
        }
        Ok(())
    }

    /// Claims for an assertion issued at `now`, valid for one hour.
    pub fn claims(&self, scopes: &[String], now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            iss: self.client_email.clone(),
            scope: scopes.join(" "),
            aud: self.token_uri.clone(),
            iat: now.timestamp() as u64,
            exp: (now + Duration::hours(1)).timestamp() as u64,
        }
    }

    /// Build a signed (RS256) jwt assertion for the given scopes.
    pub fn signed_assertion(&self, scopes: &[String], now: DateTime<Utc>) -> Result<String> {
        self.validate()?;

        let header = JwtHeader {
            alg: "RS256",
            typ: "JWT",
            kid: self.private_key_id.as_deref(),
        };
        let claims = self.claims(scopes, now);

        let header_b64 = BASE64_URL_SAFE_NO_PAD.encode(
            serde_json::to_string(&header)
                .map_err(|e| SheetMirrorError::auth(format!("Failed to encode jwt header: {e}")))?,
        );
        let claims_b64 = BASE64_URL_SAFE_NO_PAD.encode(
            serde_json::to_string(&claims)
                .map_err(|e| SheetMirrorError::auth(format!("Failed to encode jwt claims: {e}")))?,
        );
        let signing_input = format!("{}.{}", header_b64, claims_b64);

        let key_pair = self.key_pair()?;

        // Sign with PKCS#1 v1.5 SHA-256 (RS256)
        let mut signature = vec![0; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &ring::signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| SheetMirrorError::auth("Failed to sign jwt assertion"))?;

        let sig_b64 = BASE64_URL_SAFE_NO_PAD.encode(&signature);
        Ok(format!("{}.{}", signing_input, sig_b64))
    }

    fn key_pair(&self) -> Result<RsaKeyPair> {
        // Keys pasted through env vars often carry escaped newlines.
        let pem = self.private_key.replace("\\n", "\n");
        let mut reader = std::io::Cursor::new(pem.as_bytes());
        let key = rustls_pemfile::read_one(&mut reader)
            .map_err(|_| SheetMirrorError::auth("Invalid PEM private key"))?;
        match key {
            Some(rustls_pemfile::Item::Pkcs8Key(der)) => {
                RsaKeyPair::from_pkcs8(der.secret_pkcs8_der()).map_err(|_| {
                    SheetMirrorError::auth("Failed to create rsa key pair from pkcs8 key")
                })
            }
            Some(rustls_pemfile::Item::Pkcs1Key(der)) => {
                RsaKeyPair::from_der(der.secret_pkcs1_der()).map_err(|_| {
                    SheetMirrorError::auth("Failed to create rsa key pair from pkcs1 key")
                })
            }
            _ => Err(SheetMirrorError::auth("Missing private key in PEM input")),
        }
    }

    /// Fetch an access token using this service account.
    ///
    /// Any failure, including a rejection by the token endpoint, is reported
    /// as an auth error.
    pub async fn fetch_access_token<C>(&self, client: &C, scopes: &[String]) -> Result<AccessToken>
    where
        C: HttpClient,
    {
        let jwt = self.signed_assertion(scopes, Utc::now())?;

        // Exchange the JWT for an access token
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", jwt.as_str())];
        let url = Url::parse(&self.token_uri)
            .map_err(|e| SheetMirrorError::auth(format!("Failed to parse token uri as url: {e}")))?;
        let mut request = Request::new(Method::POST, url);
        set_form_body(&mut request, &params)?;

        debug!(client_email = %self.client_email, token_uri = %self.token_uri, "requesting access token");

        let resp = client
            .do_request(request)
            .await
            .map_err(|e| SheetMirrorError::auth(format!("Token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = read_error_text(resp).await;
            let msg = match serde_json::from_str::<TokenErrorBody>(&text) {
                Ok(body) => match body.error_description {
                    Some(desc) => format!("{}: {}", body.error, desc),
                    None => body.error,
                },
                Err(_) => text,
            };
            return Err(SheetMirrorError::auth(format!(
                "Token endpoint rejected assertion ({status}): {msg}"
            )));
        }

        read_json::<AccessToken>(resp)
            .await
            .map_err(|e| SheetMirrorError::auth(format!("Invalid token response: {e}")))
    }
}
