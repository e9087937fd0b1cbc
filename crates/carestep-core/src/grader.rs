//! Grading orchestrator.
//!
//! Prefers the remote judge and falls back to the local [`RubricScorer`] on
//! any transport failure. A reply that arrives but cannot be read as a
//! verdict becomes a placeholder pass rather than a local score.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::error::TransportError;
use crate::model::{JudgeSource, JudgementResult, Mark, Stage, Submission};
use crate::prompt::build_prompt;
use crate::rubric::{rubric_for, RubricScorer};
use crate::traits::{strip_code_fences, JudgeProvider, JudgeRequest, JUDGE_SYSTEM_PROMPT};

/// Score given to a reply that could not be parsed.
pub const PLACEHOLDER_SCORE: u32 = 60;

/// Characters of raw reply kept as the placeholder comment.
const PLACEHOLDER_COMMENT_CHARS: usize = 200;

/// Configuration for the grader.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Model identifier sent to the judge.
    pub model: String,
    /// Output size budget for the judge.
    pub max_output_tokens: u32,
    pub temperature: f64,
    /// Hard bound on one remote call.
    pub timeout: Duration,
    /// Maximum concurrent gradings in a batch.
    pub parallelism: usize,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_output_tokens: 1024,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
            parallelism: 4,
        }
    }
}

/// A result together with the judge that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    pub result: JudgementResult,
    pub source: JudgeSource,
}

/// Two-step grading pipeline: remote judge, then local rules.
pub struct Grader {
    judge: Option<Arc<dyn JudgeProvider>>,
    scorer: RubricScorer,
    config: GraderConfig,
}

impl Grader {
    pub fn new(judge: Arc<dyn JudgeProvider>, scorer: RubricScorer, config: GraderConfig) -> Self {
        Self {
            judge: Some(judge),
            scorer,
            config,
        }
    }

    /// A grader that never calls out.
    pub fn local_only(scorer: RubricScorer, config: GraderConfig) -> Self {
        Self {
            judge: None,
            scorer,
            config,
        }
    }

    /// Name of the remote judge, if one is configured.
    pub fn judge_name(&self) -> Option<&str> {
        self.judge.as_deref().map(|j| j.name())
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    pub fn scorer(&self) -> &RubricScorer {
        &self.scorer
    }

    /// Grade one submission. Never fails.
    pub async fn grade(&self, stage: Stage, submission: &Submission) -> JudgementResult {
        self.grade_detailed(stage, submission).await.result
    }

    /// Grade one submission and report which judge answered.
    pub async fn grade_detailed(&self, stage: Stage, submission: &Submission) -> GradeOutcome {
        if self.judge.is_none() {
            tracing::debug!(%stage, "no remote judge configured, grading locally");
            return self.grade_locally(stage, submission);
        }

        match self.request_remote(stage, submission).await {
            Ok(raw) => {
                let (result, source) = interpret_reply(stage, &raw);
                tracing::info!(%stage, %source, score = result.score, "graded");
                GradeOutcome { result, source }
            }
            Err(e) => {
                tracing::warn!(%stage, error = %e, "remote judge failed, falling back to local rules");
                self.grade_locally(stage, submission)
            }
        }
    }

    fn grade_locally(&self, stage: Stage, submission: &Submission) -> GradeOutcome {
        let result = self.scorer.score_stage(stage, submission);
        tracing::info!(%stage, score = result.score, "graded locally");
        GradeOutcome {
            result,
            source: JudgeSource::Local,
        }
    }

    /// Ask the remote judge for a verdict and return its raw text.
    pub async fn request_remote(
        &self,
        stage: Stage,
        submission: &Submission,
    ) -> Result<String, TransportError> {
        let judge = self
            .judge
            .as_ref()
            .ok_or_else(|| TransportError::MissingCredential("remote judge".to_string()))?;

        let request = JudgeRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(rubric_for(stage), submission),
            system_prompt: Some(JUDGE_SYSTEM_PROMPT.to_string()),
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
            json_response: true,
        };

        let reply = tokio::time::timeout(self.config.timeout, judge.complete(&request))
            .await
            .map_err(|_| TransportError::Timeout(self.config.timeout.as_millis() as u64))??;

        if reply.content.trim().is_empty() {
            return Err(TransportError::EmptyResponse(judge.name().to_string()));
        }

        tracing::debug!(
            judge = judge.name(),
            model = %reply.model,
            latency_ms = reply.latency_ms,
            tokens = reply.token_usage.total_tokens,
            "judge replied"
        );
        Ok(reply.content)
    }

    /// Grade many submissions with bounded parallelism.
    ///
    /// Outcomes come back in input order.
    pub async fn grade_all(&self, items: &[(Stage, Submission)]) -> Vec<GradeOutcome> {
        let semaphore = Semaphore::new(self.config.parallelism.max(1));
        let semaphore = &semaphore;

        let mut futures = FuturesUnordered::new();
        for (index, (stage, submission)) in items.iter().enumerate() {
            futures.push(async move {
                let _permit = semaphore.acquire().await.ok();
                (index, self.grade_detailed(*stage, submission).await)
            });
        }

        let mut outcomes = Vec::with_capacity(items.len());
        while let Some(done) = futures.next().await {
            outcomes.push(done);
        }
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// Verdict as the judge writes it, before normalization.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    judgement: Mark,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    breakdown: Option<BTreeMap<String, f64>>,
    #[serde(default, alias = "shortComment")]
    short_comment: String,
    #[serde(default, alias = "goodPoints")]
    good_points: Vec<String>,
    #[serde(default, alias = "missingPoints")]
    missing_points: Vec<String>,
    #[serde(default, alias = "improvementExample")]
    improvement_example: String,
}

fn clamp_points(value: f64, max: u32) -> u32 {
    value.round().clamp(0.0, f64::from(max)) as u32
}

/// Turn raw judge text into a result that satisfies the result invariants.
pub fn interpret_reply(stage: Stage, raw: &str) -> (JudgementResult, JudgeSource) {
    let cleaned = strip_code_fences(raw);
    let verdict: RawVerdict = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%stage, error = %e, "unreadable judge reply, using placeholder");
            return (placeholder(raw), JudgeSource::Placeholder);
        }
    };

    let rubric = rubric_for(stage);
    let reported = verdict.breakdown.unwrap_or_default();
    let unknown: Vec<&str> = reported
        .keys()
        .map(String::as_str)
        .filter(|id| !rubric.criteria.iter().any(|c| c.id == *id))
        .collect();
    if !unknown.is_empty() {
        tracing::warn!(%stage, ?unknown, "dropping unknown breakdown criteria");
    }

    // Every criterion of the stage, capped at its weight.
    let breakdown: BTreeMap<String, u32> = rubric
        .criteria
        .iter()
        .map(|c| {
            let points = reported
                .get(c.id)
                .map_or(0, |&p| clamp_points(p, c.weight));
            (c.id.to_string(), points)
        })
        .collect();

    let score = match verdict.score {
        Some(score) => clamp_points(score, 100),
        None if unknown.len() < reported.len() => breakdown.values().sum::<u32>().min(100),
        None => {
            tracing::warn!(%stage, "judge reply has no score, using placeholder");
            return (placeholder(raw), JudgeSource::Placeholder);
        }
    };

    let judgement = Mark::from_score(score, rubric.pass_threshold);
    if judgement != verdict.judgement {
        tracing::warn!(
            %stage,
            score,
            claimed = %verdict.judgement,
            "judge mark disagrees with its score, re-deriving from score"
        );
    }

    let improvement_example = match judgement {
        Mark::Pass => String::new(),
        Mark::Fail if verdict.improvement_example.trim().is_empty() => {
            rubric.improvement_example.to_string()
        }
        Mark::Fail => verdict.improvement_example,
    };

    let result = JudgementResult {
        judgement,
        score,
        breakdown,
        short_comment: verdict.short_comment,
        good_points: verdict.good_points,
        missing_points: verdict.missing_points,
        improvement_example,
    };
    (result, JudgeSource::Remote)
}

fn placeholder(raw: &str) -> JudgementResult {
    JudgementResult {
        judgement: Mark::Pass,
        score: PLACEHOLDER_SCORE,
        breakdown: BTreeMap::new(),
        short_comment: raw.chars().take(PLACEHOLDER_COMMENT_CHARS).collect(),
        good_points: Vec::new(),
        missing_points: Vec::new(),
        improvement_example: String::new(),
    }
}
