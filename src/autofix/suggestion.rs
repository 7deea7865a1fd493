use super::{Attempt, FixMode, FixStrategy};
use crate::defect::{Defect, Fix, IssueReport};
use crate::error::{FixError, SuggestionError};
use crate::model::ProgramUnit;
use std::sync::Arc;
use std::time::Duration;

/// Everything a suggestion backend gets to see for one issue.
#[derive(Debug, Clone)]
pub struct SuggestionInput {
    pub unit_name: String,
    pub source: String,
    pub defect: Defect,
    pub hint: String,
}

/// Generates the corrected text of a whole unit.
#[async_trait::async_trait]
pub trait SuggestionBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn suggest(&self, input: SuggestionInput) -> Result<String, SuggestionError>;
}

/// Backend used when none is configured.
pub struct UnavailableBackend;

#[async_trait::async_trait]
impl SuggestionBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn suggest(&self, _input: SuggestionInput) -> Result<String, SuggestionError> {
        Err(SuggestionError::Unavailable)
    }
}

pub struct ExternalSuggestionStrategy {
    backend: Arc<dyn SuggestionBackend>,
    timeout: Duration,
}

impl ExternalSuggestionStrategy {
    pub fn new(backend: Arc<dyn SuggestionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Runs one backend call to completion on a private runtime. A call that
    /// outlives the timeout is dropped, and a backend panic is reported as a
    /// backend failure.
    fn request(&self, input: SuggestionInput) -> Result<String, SuggestionError> {
        let text = if tokio::runtime::Handle::try_current().is_ok() {
            // a runtime cannot be started from inside another one
            std::thread::scope(|scope| {
                scope
                    .spawn(|| self.run(input))
                    .join()
                    .unwrap_or_else(|_| Err(SuggestionError::Backend("suggestion thread panicked".to_string())))
            })
        } else {
            self.run(input)
        }?;

        if text.trim().is_empty() {
            return Err(SuggestionError::Empty);
        }
        Ok(text)
    }

    fn run(&self, input: SuggestionInput) -> Result<String, SuggestionError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SuggestionError::Backend(e.to_string()))?;

        let backend = Arc::clone(&self.backend);
        let limit = self.timeout;
        let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        runtime.block_on(async move {
            let name = backend.name().to_string();
            let call = tokio::spawn(async move { tokio::time::timeout(limit, backend.suggest(input)).await });
            match call.await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(SuggestionError::Timeout(millis)),
                Err(e) if e.is_panic() => Err(SuggestionError::Backend(format!("backend {} panicked", name))),
                Err(e) => Err(SuggestionError::Backend(e.to_string())),
            }
        })
    }
}

impl FixStrategy for ExternalSuggestionStrategy {
    fn mode(&self) -> FixMode {
        FixMode::ExternalSuggestion
    }

    fn attempt(&self, unit: &ProgramUnit, issue: &IssueReport) -> Result<Attempt, FixError> {
        let Some(Fix::ExternalSuggestion(request)) = &issue.fix else {
            return Err(FixError::NotApplicable(issue.rule_id().to_string()));
        };
        let input = SuggestionInput {
            unit_name: unit.name.clone(),
            source: unit.source.clone(),
            defect: issue.defect.clone(),
            hint: request.hint.clone(),
        };
        tracing::debug!("requesting suggestion from {} for {}", self.backend.name(), unit.name);
        Ok(Attempt::text(self.request(input)?))
    }
}
