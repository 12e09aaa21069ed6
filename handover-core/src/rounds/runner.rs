//! The generic round lifecycle engine.
//!
//! `Call → Validate → Quality → {Accept | Retry | Fallback}`, with exactly
//! one retry per round and a guaranteed structured result: this function
//! never returns an error. The observable provider-call sequence per round
//! has length 1 or 2.

use tracing::{info, instrument, warn};

use crate::llm::usage::pricing_for;
use crate::llm::{CompletionRequest, TokenUsage};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::types::{QualityMetrics, RoundSource, RoundStatus, ValidationResult};

use super::compress::{DEFAULT_COMPRESSOR_BUDGET, compress};
use super::validate::validate_claims;
use super::{RoundExecutionResult, RoundInput, RoundSpec};

/// Drop-rate above which a round's output is rejected.
pub const DROP_RATE_THRESHOLD: f64 = 0.3;
/// Sampling temperature for the stricter retry call.
const RETRY_TEMPERATURE: f64 = 0.1;

const STRICT_SYSTEM_PROMPT: &str = "Your previous answer referenced files or \
relationships that do not exist in this repository. Answer again using ONLY \
file paths and imports that literally appear in the provided repository \
context. If you are not certain a fact is grounded in the context, leave it \
out. Respond with the JSON object only.";

/// Execute one round. Infallible by design: every failure path degrades to
/// the static fallback.
#[instrument(skip_all, fields(round = %spec.round()))]
pub async fn run_round(
    spec: &dyn RoundSpec,
    input: &RoundInput<'_>,
    events: &ProgressSender,
) -> RoundExecutionResult {
    let round = spec.round();
    let schema = spec.schema();
    let prompt = spec.build_prompt(input);

    let mut usage = TokenUsage::default();
    let mut has_retried = false;
    let mut last_validation = ValidationResult::default();
    let mut last_quality = QualityMetrics::acceptable();
    let mut degraded_reasons: Vec<String> = Vec::new();

    loop {
        let request = if has_retried {
            CompletionRequest {
                system: Some(STRICT_SYSTEM_PROMPT.to_string()),
                temperature: RETRY_TEMPERATURE,
                ..CompletionRequest::new(prompt.clone())
            }
        } else {
            CompletionRequest::new(prompt.clone())
        };

        match input.facade.complete(&request, &schema).await {
            Ok(completion) => {
                usage.add(&completion.usage);
                let validation = validate_claims(&spec.claims(&completion.data), input.statics);
                let quality = spec.quality(&completion.data);

                if validation.drop_rate <= DROP_RATE_THRESHOLD && quality.is_acceptable {
                    info!(
                        drop_rate = validation.drop_rate,
                        retried = has_retried,
                        "Round accepted"
                    );
                    return finish(
                        spec,
                        completion.data,
                        RoundStatus::Ok,
                        RoundSource::Llm,
                        validation,
                        quality,
                        usage,
                        input,
                        Vec::new(),
                    );
                }

                let mut reasons = quality.reasons.clone();
                if validation.drop_rate > DROP_RATE_THRESHOLD {
                    reasons.push(format!(
                        "drop rate {:.2} exceeds {DROP_RATE_THRESHOLD}",
                        validation.drop_rate
                    ));
                }
                last_validation = validation;
                last_quality = quality;

                if !has_retried {
                    has_retried = true;
                    warn!(reasons = ?reasons, "Round rejected, retrying once with strict prompt");
                    events.emit(ProgressEvent::StepRetry {
                        id: round.step_id(),
                        reason: reasons.join("; "),
                    });
                    continue;
                }
                degraded_reasons = reasons;
            }
            Err(e) => {
                let reason = e.to_string();
                if !has_retried {
                    has_retried = true;
                    warn!(error = %reason, "Round call failed, retrying once");
                    events.emit(ProgressEvent::StepRetry {
                        id: round.step_id(),
                        reason,
                    });
                    continue;
                }
                degraded_reasons = vec![reason];
            }
        }

        // Fallback: static-only output, degraded status.
        warn!(reasons = ?degraded_reasons, "Round degraded to static fallback");
        events.emit(ProgressEvent::RoundDegraded {
            round,
            reasons: degraded_reasons.clone(),
        });
        let fallback = spec.fallback(input.statics);
        return finish(
            spec,
            fallback,
            RoundStatus::Degraded,
            RoundSource::Fallback,
            last_validation,
            last_quality,
            usage,
            input,
            degraded_reasons,
        );
    }
}

#[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
fn finish(
    spec: &dyn RoundSpec,
    data: serde_json::Value,
    status: RoundStatus,
    source: RoundSource,
    validation: ValidationResult,
    quality: QualityMetrics,
    usage: TokenUsage,
    input: &RoundInput<'_>,
    degraded_reasons: Vec<String>,
) -> RoundExecutionResult {
    let context = compress(&data, DEFAULT_COMPRESSOR_BUDGET);
    let pricing = pricing_for(input.facade.model_id());
    let fresh_input = usage.input_tokens.saturating_sub(usage.cache_read_tokens);
    let cost_usd = (fresh_input as f64 / 1000.0) * pricing.input_per_1k
        + (usage.cache_read_tokens as f64 / 1000.0) * pricing.cache_read_per_1k
        + (usage.output_tokens as f64 / 1000.0) * pricing.output_per_1k;

    RoundExecutionResult {
        round: spec.round(),
        data,
        status,
        source,
        validation,
        quality,
        usage,
        cost_usd,
        context,
        degraded_reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::StaticAnalysisResult;
    use crate::config::{AuthMethod, ProjectSection};
    use crate::llm::{LlmProvider, ProviderFacade};
    use crate::types::{PackedContext, Round, RoundStatus};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug)]
    struct StubProvider {
        responses: Mutex<Vec<crate::error::Result<String>>>,
        calls: Mutex<u32>,
    }

    impl StubProvider {
        fn new(mut responses: Vec<crate::error::Result<String>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            })
        }
        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn model_id(&self) -> &str {
            "stub-model"
        }
        fn max_context_tokens(&self) -> u32 {
            100_000
        }
        async fn call(
            &self,
            _request: &CompletionRequest,
        ) -> crate::error::Result<(String, TokenUsage)> {
            *self.calls.lock().unwrap() += 1;
            let next = self.responses.lock().unwrap().pop().unwrap_or_else(|| {
                Err(crate::error::HandoverError::Llm(
                    crate::error::LlmError::Auth("exhausted".into()),
                ))
            });
            next.map(|text| {
                (
                    text,
                    TokenUsage {
                        input_tokens: 100,
                        output_tokens: 50,
                        cache_read_tokens: 0,
                    },
                )
            })
        }
    }

    fn statics_with_paths(paths: &[&str]) -> StaticAnalysisResult {
        let mut statics = StaticAnalysisResult::default();
        statics.known_paths = paths.iter().map(|p| (*p).to_string()).collect();
        statics
    }

    fn overview_json(entry_points: &[&str]) -> String {
        serde_json::json!({
            "project_name": "demo",
            "purpose": "a demo project",
            "tech_stack": [{"name": "rust", "role": "language"}],
            "entry_points": entry_points,
            "summary": "small"
        })
        .to_string()
    }

    async fn run(
        provider: Arc<StubProvider>,
        statics: &StaticAnalysisResult,
    ) -> RoundExecutionResult {
        let facade = ProviderFacade::new(
            provider,
            Duration::from_secs(5),
            AuthMethod::ApiKey,
        );
        let packed = PackedContext::default();
        let prior = BTreeMap::new();
        let project = ProjectSection::default();
        let input = RoundInput {
            facade: &facade,
            statics,
            packed: &packed,
            prior: &prior,
            project: &project,
            user_context: None,
        };
        let spec = super::super::spec_for(Round::Overview);
        run_round(spec.as_ref(), &input, &ProgressSender::noop()).await
    }

    #[tokio::test]
    async fn accepts_valid_first_response() {
        let statics = statics_with_paths(&["src/main.rs"]);
        let provider = StubProvider::new(vec![Ok(overview_json(&["src/main.rs"]))]);
        let result = run(Arc::clone(&provider), &statics).await;

        assert_eq!(result.status, RoundStatus::Ok);
        assert_eq!(result.source, crate::types::RoundSource::Llm);
        assert_eq!(provider.calls(), 1);
        assert!(result.cost_usd.abs() < f64::EPSILON); // unknown model: free
    }

    #[tokio::test]
    async fn invalid_claims_trigger_single_retry_then_accept() {
        let statics = statics_with_paths(&["src/main.rs"]);
        // First response: 3/3 invented paths → drop rate 1.0 → retry.
        let provider = StubProvider::new(vec![
            Ok(overview_json(&["a.rs", "b.rs", "c.rs"])),
            Ok(overview_json(&["src/main.rs"])),
        ]);
        let result = run(Arc::clone(&provider), &statics).await;

        assert_eq!(provider.calls(), 2);
        assert_eq!(result.status, RoundStatus::Ok);
        assert!((result.validation.drop_rate - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn two_failures_degrade_to_fallback() {
        let statics = statics_with_paths(&["src/main.rs"]);
        let provider = StubProvider::new(vec![
            Err(crate::error::HandoverError::Llm(
                crate::error::LlmError::Parse("garbage".into()),
            )),
            Err(crate::error::HandoverError::Llm(
                crate::error::LlmError::Parse("garbage again".into()),
            )),
        ]);
        let result = run(Arc::clone(&provider), &statics).await;

        assert_eq!(provider.calls(), 2);
        assert_eq!(result.status, RoundStatus::Degraded);
        assert_eq!(result.source, crate::types::RoundSource::Fallback);
        assert!(!result.degraded_reasons.is_empty());
        // Fallback output still satisfies the round schema.
        let spec = super::super::spec_for(Round::Overview);
        assert!(spec.schema().validate(&result.data).is_ok());
    }

    #[tokio::test]
    async fn persistent_bad_claims_degrade() {
        let statics = statics_with_paths(&["src/main.rs"]);
        let provider = StubProvider::new(vec![
            Ok(overview_json(&["x.rs", "y.rs", "z.rs"])),
            Ok(overview_json(&["x.rs", "y.rs", "z.rs"])),
        ]);
        let result = run(Arc::clone(&provider), &statics).await;

        assert_eq!(provider.calls(), 2);
        assert_eq!(result.status, RoundStatus::Degraded);
        assert!(
            result
                .degraded_reasons
                .iter()
                .any(|r| r.contains("drop rate"))
        );
    }
}
