//! Credential × model fallback traversal.
//!
//! The orchestrator walks credentials in pool order and, for each credential,
//! models in preference order. The first call that opens a stream wins.
//!
//! ```text
//!            model 0      model 1      model 2
//! cred 0   ──► try ──err──► try ──err──► try ──err─┐
//!              │quota                               │
//!              ▼                                    ▼
//! cred 1   ──► try ──err──► try ──err──► try ──err─► Exhausted
//! ```
//!
//! A quota failure skips the remaining models of the current credential.
//! Any other failure moves to the next model. Attempts are strictly
//! sequential, so at most one stream can ever be open.

use std::fmt;

use crate::backend::{SharedBackend, TokenStream};
use crate::credentials::{CredentialPool, ModelList};
use crate::error::{FailureClass, GenerationError, OrchestrationError, classify};

// ─────────────────────────────────────────────────────────────────────────────
// Traversal
// ─────────────────────────────────────────────────────────────────────────────

/// A `(credential, model)` position in the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Index into the credential pool.
    pub credential: usize,
    /// Index into the model list.
    pub model: usize,
}

/// Where the cursor went after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same credential, next model.
    NextModel(Slot),
    /// Next credential, first model.
    NextCredential(Slot),
    /// No combinations left.
    Exhausted,
}

/// Pure traversal state machine.
///
/// Holds no I/O. Callers report each failure's class and receive the next
/// slot to try.
#[derive(Debug, Clone)]
pub struct Traversal {
    credentials: usize,
    models: usize,
    current: Option<Slot>,
}

impl Traversal {
    /// Start at `(0, 0)` over a `credentials × models` grid.
    pub fn new(credentials: usize, models: usize) -> Self {
        let current = (credentials > 0 && models > 0).then_some(Slot {
            credential: 0,
            model: 0,
        });
        Self {
            credentials,
            models,
            current,
        }
    }

    /// The slot to try next, or `None` once exhausted.
    pub fn current(&self) -> Option<Slot> {
        self.current
    }

    /// Record a failure at the current slot and advance.
    pub fn fail(&mut self, class: FailureClass) -> Transition {
        let Some(slot) = self.current else {
            return Transition::Exhausted;
        };

        if class == FailureClass::Other && slot.model + 1 < self.models {
            let next = Slot {
                credential: slot.credential,
                model: slot.model + 1,
            };
            self.current = Some(next);
            return Transition::NextModel(next);
        }

        if slot.credential + 1 < self.credentials {
            let next = Slot {
                credential: slot.credential + 1,
                model: 0,
            };
            self.current = Some(next);
            return Transition::NextCredential(next);
        }

        self.current = None;
        Transition::Exhausted
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempts
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A stream was opened.
    Success,
    /// Failed with a quota error.
    QuotaError(String),
    /// Failed with any other error.
    OtherError(String),
}

impl AttemptOutcome {
    fn from_error(error: &GenerationError, class: FailureClass) -> Self {
        match class {
            FailureClass::Quota => Self::QuotaError(error.to_string()),
            FailureClass::Other => Self::OtherError(error.to_string()),
        }
    }

    /// Returns true for [`AttemptOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Record of one `(credential, model)` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    /// Position of the credential in the pool.
    pub credential_index: usize,
    /// Masked credential, safe for logs and reports.
    pub credential: String,
    /// Position of the model in the preference list.
    pub model_index: usize,
    /// Model identifier.
    pub model: String,
    /// What happened.
    pub outcome: AttemptOutcome,
}

impl fmt::Display for GenerationAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.outcome {
            AttemptOutcome::Success => "ok".to_string(),
            AttemptOutcome::QuotaError(msg) => format!("quota: {}", msg),
            AttemptOutcome::OtherError(msg) => format!("error: {}", msg),
        };
        write!(
            f,
            "key #{} ({}) / {}: {}",
            self.credential_index + 1,
            self.credential,
            self.model,
            status
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// The single open stream chosen by the orchestrator.
pub struct Selection {
    /// The open stream. Dropping it cancels the provider call.
    pub stream: TokenStream,
    /// Position of the credential that succeeded.
    pub credential_index: usize,
    /// Masked form of that credential.
    pub credential: String,
    /// Model that succeeded.
    pub model: String,
    /// All attempts made, including the successful one.
    pub attempts: Vec<GenerationAttempt>,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("credential_index", &self.credential_index)
            .field("credential", &self.credential)
            .field("model", &self.model)
            .field("attempts", &self.attempts.len())
            .finish_non_exhaustive()
    }
}

/// Opens one generation stream by traversing credentials and models.
#[derive(Clone)]
pub struct Orchestrator {
    backend: SharedBackend,
    credentials: CredentialPool,
    models: ModelList,
}

impl Orchestrator {
    /// Create an orchestrator over a backend, pool, and model list.
    pub fn new(backend: SharedBackend, credentials: CredentialPool, models: ModelList) -> Self {
        Self {
            backend,
            credentials,
            models,
        }
    }

    /// The credential pool.
    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    /// The model preference list.
    pub fn models(&self) -> &ModelList {
        &self.models
    }

    /// Open exactly one stream for `prompt`, or fail after every combination.
    ///
    /// Once a stream is returned, the orchestrator is done. Failures inside
    /// the stream are the caller's to report.
    pub async fn open_stream(&self, prompt: &str) -> Result<Selection, OrchestrationError> {
        if self.credentials.is_empty() {
            return Err(OrchestrationError::NoCredentials);
        }
        if self.models.is_empty() {
            return Err(OrchestrationError::NoModels);
        }

        let mut traversal = Traversal::new(self.credentials.len(), self.models.len());
        let mut attempts = Vec::new();
        let mut last: Option<(GenerationError, FailureClass)> = None;

        while let Some(slot) = traversal.current() {
            let (Some(credential), Some(model)) = (
                self.credentials.get(slot.credential),
                self.models.get(slot.model),
            ) else {
                break;
            };

            tracing::debug!(
                credential_index = slot.credential,
                credential = %credential,
                model = %model,
                "Attempting generation"
            );

            match self.backend.open_stream(credential, model, prompt).await {
                Ok(stream) => {
                    attempts.push(GenerationAttempt {
                        credential_index: slot.credential,
                        credential: credential.masked(),
                        model_index: slot.model,
                        model: model.to_string(),
                        outcome: AttemptOutcome::Success,
                    });

                    tracing::info!(
                        credential_index = slot.credential,
                        credential = %credential,
                        model = %model,
                        attempts = attempts.len(),
                        "Generation stream opened"
                    );

                    return Ok(Selection {
                        stream,
                        credential_index: slot.credential,
                        credential: credential.masked(),
                        model: model.to_string(),
                        attempts,
                    });
                }
                Err(error) => {
                    let class = classify(&error);
                    attempts.push(GenerationAttempt {
                        credential_index: slot.credential,
                        credential: credential.masked(),
                        model_index: slot.model,
                        model: model.to_string(),
                        outcome: AttemptOutcome::from_error(&error, class),
                    });

                    match class {
                        FailureClass::Quota => tracing::warn!(
                            credential_index = slot.credential,
                            credential = %credential,
                            model = %model,
                            error = %error,
                            "Credential hit quota, switching key"
                        ),
                        FailureClass::Other => tracing::warn!(
                            credential_index = slot.credential,
                            credential = %credential,
                            model = %model,
                            error = %error,
                            "Model failed, trying next"
                        ),
                    }

                    traversal.fail(class);
                    last = Some((error, class));
                }
            }
        }

        let Some((last_error, last_class)) = last else {
            return Err(OrchestrationError::NoCredentials);
        };

        tracing::error!(
            attempts = attempts.len(),
            quota = last_class == FailureClass::Quota,
            error = %last_error,
            "All key/model combinations failed"
        );

        Err(OrchestrationError::Exhausted {
            attempts,
            last_error,
            last_class,
        })
    }

    /// Try every `(credential, model)` pair once, without short-circuiting.
    ///
    /// Each successful stream is dropped immediately. Used by diagnostics to
    /// report which combinations are usable.
    pub async fn probe_all(&self, prompt: &str) -> Vec<GenerationAttempt> {
        let mut attempts = Vec::with_capacity(self.credentials.len() * self.models.len());

        for (credential_index, credential) in self.credentials.iter().enumerate() {
            for (model_index, model) in self.models.iter().enumerate() {
                let outcome = match self.backend.open_stream(credential, model, prompt).await {
                    Ok(stream) => {
                        drop(stream);
                        AttemptOutcome::Success
                    }
                    Err(error) => AttemptOutcome::from_error(&error, classify(&error)),
                };

                attempts.push(GenerationAttempt {
                    credential_index,
                    credential: credential.masked(),
                    model_index,
                    model: model.to_string(),
                    outcome,
                });
            }
        }

        attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockOutcome, StreamEvent};
    use futures::StreamExt;
    use std::sync::Arc;

    fn models() -> ModelList {
        ModelList::new(["m1", "m2", "m3"])
    }

    fn orchestrator(backend: Arc<MockBackend>, keys: &[&str]) -> Orchestrator {
        Orchestrator::new(backend, CredentialPool::new(keys.iter().copied()), models())
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(c, m)| (c.to_string(), m.to_string()))
            .collect()
    }

    #[test]
    fn test_traversal_other_advances_model_then_credential() {
        let mut t = Traversal::new(2, 2);
        assert_eq!(t.current(), Some(Slot { credential: 0, model: 0 }));
        assert_eq!(
            t.fail(FailureClass::Other),
            Transition::NextModel(Slot { credential: 0, model: 1 })
        );
        assert_eq!(
            t.fail(FailureClass::Other),
            Transition::NextCredential(Slot { credential: 1, model: 0 })
        );
        assert_eq!(
            t.fail(FailureClass::Other),
            Transition::NextModel(Slot { credential: 1, model: 1 })
        );
        assert_eq!(t.fail(FailureClass::Other), Transition::Exhausted);
        assert_eq!(t.current(), None);
        assert_eq!(t.fail(FailureClass::Other), Transition::Exhausted);
    }

    #[test]
    fn test_traversal_quota_skips_remaining_models() {
        let mut t = Traversal::new(3, 3);
        assert_eq!(
            t.fail(FailureClass::Quota),
            Transition::NextCredential(Slot { credential: 1, model: 0 })
        );
        t.fail(FailureClass::Other);
        assert_eq!(
            t.fail(FailureClass::Quota),
            Transition::NextCredential(Slot { credential: 2, model: 0 })
        );
        assert_eq!(t.fail(FailureClass::Quota), Transition::Exhausted);
    }

    #[test]
    fn test_traversal_empty_grid() {
        assert_eq!(Traversal::new(0, 3).current(), None);
        assert_eq!(Traversal::new(2, 0).current(), None);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let backend = Arc::new(MockBackend::with_text("answer"));
        let orch = orchestrator(Arc::clone(&backend), &["k1", "k2"]);

        let selection = orch.open_stream("prompt").await.unwrap();
        assert_eq!(selection.credential_index, 0);
        assert_eq!(selection.model, "m1");
        assert_eq!(selection.attempts.len(), 1);
        assert!(selection.attempts[0].outcome.is_success());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_other_errors_walk_models_then_next_credential() {
        let backend = Arc::new(
            MockBackend::with_text("ok")
                .with_outcome("k1", "m1", MockOutcome::model_not_found())
                .with_outcome("k1", "m2", MockOutcome::model_not_found())
                .with_outcome("k1", "m3", MockOutcome::model_not_found()),
        );
        let orch = orchestrator(Arc::clone(&backend), &["k1", "k2"]);

        let selection = orch.open_stream("p").await.unwrap();
        assert_eq!(selection.credential_index, 1);
        assert_eq!(selection.model, "m1");
        assert_eq!(
            backend.calls(),
            pairs(&[("k1", "m1"), ("k1", "m2"), ("k1", "m3"), ("k2", "m1")])
        );
    }

    #[tokio::test]
    async fn test_quota_short_circuits_credential() {
        let backend = Arc::new(
            MockBackend::with_text("ok")
                .with_outcome("k1", "m1", MockOutcome::model_not_found())
                .with_outcome("k1", "m2", MockOutcome::quota()),
        );
        let orch = orchestrator(Arc::clone(&backend), &["k1", "k2"]);

        let selection = orch.open_stream("p").await.unwrap();
        assert_eq!(selection.credential_index, 1);
        assert_eq!(selection.model, "m1");
        // k1/m3 is never tried
        assert_eq!(
            backend.calls(),
            pairs(&[("k1", "m1"), ("k1", "m2"), ("k2", "m1")])
        );
        assert!(matches!(
            selection.attempts[1].outcome,
            AttemptOutcome::QuotaError(_)
        ));
    }

    #[tokio::test]
    async fn test_all_quota_exhausts_with_one_call_per_credential() {
        let backend = Arc::new(MockBackend::new(MockOutcome::quota()));
        let orch = orchestrator(Arc::clone(&backend), &["k1", "k2", "k3"]);

        let err = orch.open_stream("p").await.unwrap_err();
        assert!(err.is_quota_exhausted());
        assert_eq!(
            backend.calls(),
            pairs(&[("k1", "m1"), ("k2", "m1"), ("k3", "m1")])
        );
        match err {
            OrchestrationError::Exhausted { attempts, .. } => assert_eq!(attempts.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_all_other_errors_tries_full_grid() {
        let backend = Arc::new(MockBackend::new(MockOutcome::model_not_found()));
        let orch = orchestrator(Arc::clone(&backend), &["k1", "k2"]);

        let err = orch.open_stream("p").await.unwrap_err();
        assert!(!err.is_quota_exhausted());
        assert_eq!(backend.call_count(), 6);
    }

    #[tokio::test]
    async fn test_last_failure_decides_quota_flag() {
        let backend = Arc::new(
            MockBackend::new(MockOutcome::model_not_found())
                .with_outcome("k2", "m1", MockOutcome::quota()),
        );
        let orch = orchestrator(Arc::clone(&backend), &["k1", "k2"]);

        let err = orch.open_stream("p").await.unwrap_err();
        assert!(err.is_quota_exhausted());
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_no_credentials_makes_no_calls() {
        let backend = Arc::new(MockBackend::with_text("ok"));
        let orch = orchestrator(Arc::clone(&backend), &[]);

        let err = orch.open_stream("p").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::NoCredentials));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_models_makes_no_calls() {
        let backend = Arc::new(MockBackend::with_text("ok"));
        let orch = Orchestrator::new(
            backend.clone(),
            CredentialPool::new(["k1"]),
            ModelList::new(Vec::<String>::new()),
        );

        let err = orch.open_stream("p").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::NoModels));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_at_most_one_stream_open() {
        let backend = Arc::new(
            MockBackend::new(MockOutcome::Pending)
                .with_outcome("k1", "m1", MockOutcome::quota())
                .with_outcome("k2", "m1", MockOutcome::model_not_found()),
        );
        let orch = orchestrator(Arc::clone(&backend), &["k1", "k2"]);

        let selection = orch.open_stream("p").await.unwrap();
        assert_eq!(selection.model, "m2");
        assert_eq!(backend.open_streams(), 1);
        assert_eq!(backend.peak_open_streams(), 1);

        drop(selection);
        assert_eq!(backend.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_selected_stream_yields_tokens() {
        let backend = Arc::new(MockBackend::new(MockOutcome::tokens(["a", "b"])));
        let orch = orchestrator(backend, &["k1"]);

        let mut selection = orch.open_stream("p").await.unwrap();
        let mut text = String::new();
        while let Some(event) = selection.stream.next().await {
            if let StreamEvent::Delta(t) = event.unwrap() {
                text.push_str(&t);
            }
        }
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_probe_all_visits_every_pair() {
        let backend = Arc::new(
            MockBackend::with_text("ok").with_outcome("k1-long-key", "m2", MockOutcome::quota()),
        );
        let orch = orchestrator(Arc::clone(&backend), &["k1-long-key", "k2"]);

        let report = orch.probe_all("ping").await;
        assert_eq!(report.len(), 6);
        assert_eq!(backend.call_count(), 6);
        assert_eq!(backend.open_streams(), 0);
        assert!(matches!(report[1].outcome, AttemptOutcome::QuotaError(_)));
        assert_eq!(report[1].credential, "k1-lo...key");
        assert!(report[2].outcome.is_success());
        assert!(report[1].to_string().starts_with("key #1 (k1-lo...key) / m2: quota"));
    }
}
