//! Shared fixture for adapter tests.

use serde_json::Value;

use super::{create_adapter, Diagnostic, Invocation, Step, StepContext};
use crate::config::StepConfig;
use crate::connectors::json_file::JsonFileSource;
use crate::connectors::memory_target::MemoryTarget;
use crate::mapping::{EntityType, MappingStore, MemoryMappingStore};
use crate::progress::{Budget, Progress};
use crate::retry::RetryConfig;

pub(crate) struct Harness {
    pub source: JsonFileSource,
    pub target: MemoryTarget,
    pub mappings: MemoryMappingStore,
    pub config: StepConfig,
    pub budget: Budget,
}

impl Harness {
    pub fn new(document: Value) -> Self {
        Self {
            source: JsonFileSource::from_document("test", document).unwrap(),
            target: MemoryTarget::seeded(),
            mappings: MemoryMappingStore::new(),
            config: StepConfig::default(),
            budget: Budget::unlimited(),
        }
    }

    pub fn ctx(&self) -> StepContext<'_> {
        StepContext {
            source: &self.source,
            target: &self.target,
            mappings: &self.mappings,
            config: &self.config,
            budget: self.budget,
            retry: RetryConfig::no_retry(),
        }
    }

    pub async fn invoke(&self, step: Step, progress: Progress) -> Invocation {
        create_adapter(step).run(&self.ctx(), progress).await
    }

    /// Re-invokes until the step is terminal.
    pub async fn run_to_end(&self, step: Step) -> (Progress, Vec<Diagnostic>) {
        let mut progress = Progress::new();
        let mut diagnostics = Vec::new();
        for _ in 0..10_000 {
            let invocation = self.invoke(step, progress).await;
            diagnostics.extend(invocation.diagnostics);
            progress = invocation.progress;
            if progress.is_terminal() {
                return (progress, diagnostics);
            }
        }
        panic!("{step} did not finish");
    }

    pub async fn mapping(&self, entity: EntityType, source_id: &str) -> Option<String> {
        self.mappings.get(entity, source_id).await.unwrap()
    }
}
