//! Analysis pipeline contract and the invoker that normalizes its outcome.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use crate::error::AnalysisError;
use crate::types::{ImgCache, ImgKwargs, PipelineOutput};

/// An image-analysis routine computing the next stage position.
///
/// Receives the target file, the session's keyword arguments and the cache
/// returned by the previous call. Stateful pipelines keep their history in
/// the returned cache, which the scheduler merges and hands back next time.
pub trait AnalysisPipeline: Send + Sync {
    fn analyze(
        &self,
        path: &Path,
        kwargs: &ImgKwargs,
        cache: &ImgCache,
    ) -> Result<PipelineOutput, AnalysisError>;

    /// Keyword arguments this pipeline understands. `None` accepts anything.
    fn accepted_kwargs(&self) -> Option<&[&str]> {
        None
    }

    fn name(&self) -> &str {
        "pipeline"
    }
}

impl<F> AnalysisPipeline for F
where
    F: Fn(&Path, &ImgKwargs, &ImgCache) -> Result<PipelineOutput, AnalysisError> + Send + Sync,
{
    fn analyze(
        &self,
        path: &Path,
        kwargs: &ImgKwargs,
        cache: &ImgCache,
    ) -> Result<PipelineOutput, AnalysisError> {
        self(path, kwargs, cache)
    }
}

/// Result of one pipeline invocation. `output` is always usable: on failure
/// it is the all-sentinel result carrying the input cache unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub output: PipelineOutput,
    pub error: Option<AnalysisError>,
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(cache: &ImgCache, error: AnalysisError) -> Self {
        Self {
            output: PipelineOutput::failed(cache.clone()),
            error: Some(error),
        }
    }
}

/// Call `pipeline` on `path`, converting every failure (error return,
/// rejected keyword argument, panic) into the failure outcome.
pub fn invoke_pipeline(
    pipeline: &dyn AnalysisPipeline,
    path: &Path,
    kwargs: &ImgKwargs,
    cache: &ImgCache,
) -> AnalysisOutcome {
    if let Some(accepted) = pipeline.accepted_kwargs()
        && let Some(unknown) = kwargs.keys().find(|k| !accepted.contains(&k.as_str()))
    {
        return AnalysisOutcome::failed(cache, AnalysisError::UnexpectedKwarg(unknown.clone()));
    }

    match catch_unwind(AssertUnwindSafe(|| pipeline.analyze(path, kwargs, cache))) {
        Ok(Ok(mut output)) => {
            output.position = output.position.normalized();
            AnalysisOutcome {
                output,
                error: None,
            }
        }
        Ok(Err(e)) => AnalysisOutcome::failed(cache, e),
        Err(payload) => AnalysisOutcome::failed(cache, AnalysisError::Panicked(panic_message(&*payload))),
    }
}

/// Merge a pipeline's returned cache into the session cache. Returned keys win.
pub fn merge_cache(into: &mut ImgCache, update: ImgCache) {
    for (key, value) in update {
        into.insert(key, value);
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
