//! The reference/reporting store.
//!
//! The production store is a spreadsheet behind a small web script that
//! dispatches on an `action` field. Every call is best effort: callers turn
//! a [`StoreError`] into a notification and carry on.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use ureq::Agent;

use super::verify::VerificationOutcome;
use super::ReferenceEntry;
use crate::error::StoreError;

/// Literal body the store answers a successful submission with.
const SUBMIT_SUCCESS: &str = "Success";

/// Access to the external reference/reporting store.
pub trait ReferenceStore: Send + Sync {
    /// Fetches the full reference table.
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<ReferenceEntry>, StoreError>>;

    /// Records the identifiers scanned for a session key.
    fn submit_identifiers<'a>(
        &'a self,
        session_key: &'a str,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Asks the store which identifiers of a session are not reported.
    fn verify<'a>(
        &'a self,
        session_key: &'a str,
    ) -> BoxFuture<'a, Result<VerificationOutcome, StoreError>>;
}

#[derive(Serialize)]
#[serde(tag = "action")]
enum StoreRequest<'a> {
    #[serde(rename = "saveBarcodes")]
    SaveBarcodes {
        barcodes: &'a [String],
        #[serde(rename = "invoiceID")]
        invoice_id: &'a str,
    },
    #[serde(rename = "verifyItems")]
    VerifyItems {
        #[serde(rename = "invoiceID")]
        invoice_id: &'a str,
    },
}

/// Store client speaking the web script's HTTP protocol.
#[derive(Clone)]
pub struct HttpReferenceStore {
    agent: Agent,
    url: String,
}

impl HttpReferenceStore {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: Agent::new_with_config(config),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fetch_blocking(&self) -> Result<Vec<ReferenceEntry>, StoreError> {
        let mut response = self
            .agent
            .get(&self.url)
            .query("action", "getInventoryData")
            .call()
            .map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .body_mut()
            .read_json::<Vec<ReferenceEntry>>()
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn submit_blocking(&self, session_key: &str, identifiers: &[String]) -> Result<(), StoreError> {
        let request = StoreRequest::SaveBarcodes {
            barcodes: identifiers,
            invoice_id: session_key,
        };
        let mut response = self
            .agent
            .post(&self.url)
            .send_json(&request)
            .map_err(unavailable)?;
        let status = response.status();
        let body = response.body_mut().read_to_string().map_err(unavailable)?;
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim() == SUBMIT_SUCCESS {
            Ok(())
        } else {
            Err(StoreError::Rejected(body))
        }
    }

    fn verify_blocking(&self, session_key: &str) -> Result<VerificationOutcome, StoreError> {
        let request = StoreRequest::VerifyItems {
            invoice_id: session_key,
        };
        let mut response = self
            .agent
            .post(&self.url)
            .send_json(&request)
            .map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .body_mut()
            .read_json::<VerificationOutcome>()
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl ReferenceStore for HttpReferenceStore {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<ReferenceEntry>, StoreError>> {
        let store = self.clone();
        run_blocking(move || store.fetch_blocking()).boxed()
    }

    fn submit_identifiers<'a>(
        &'a self,
        session_key: &'a str,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let store = self.clone();
        let key = session_key.to_string();
        let ids = identifiers.to_vec();
        run_blocking(move || store.submit_blocking(&key, &ids)).boxed()
    }

    fn verify<'a>(
        &'a self,
        session_key: &'a str,
    ) -> BoxFuture<'a, Result<VerificationOutcome, StoreError>> {
        let store = self.clone();
        let key = session_key.to_string();
        run_blocking(move || store.verify_blocking(&key)).boxed()
    }
}

/// Runs a blocking HTTP exchange off the async thread.
async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
}

fn unavailable(err: ureq::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}
