//! Per-stage rubric tables and the deterministic local scorer.
//!
//! A rubric is plain data: an ordered list of weighted criteria, each with a
//! declarative [`Rule`]. Adding a stage means adding a table, not new
//! branching. Every criterion is all-or-nothing.

use std::collections::BTreeMap;

use crate::error::RubricError;
use crate::model::{Hypothesis, JudgementResult, Mark, Stage, Submission, TextField};
use crate::vocabulary::{CompiledVocabulary, Topic, Vocabulary};

/// Score at or above which a submission passes.
pub const PASS_THRESHOLD: u32 = 60;

/// How a criterion decides whether it is met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// The field has at least `min` characters (optionally after trimming).
    MinChars {
        field: TextField,
        min: usize,
        trim: bool,
    },
    /// The (trimmed) field mentions a vocabulary topic.
    Mentions { field: TextField, topic: Topic },
    /// At least `min` hypotheses were given.
    HypothesisCount { min: usize },
    /// At least `min` hypotheses carry a non-blank second "why".
    DeepenedHypotheses { min: usize },
    /// At least `min` hypotheses carry a support plan longer than `chars`.
    SupportedHypotheses { min: usize, chars: usize },
    /// Some hypothesis has a priority above zero.
    AnyPriority,
    /// A decision was made and its reason has at least `min_reason` chars.
    JustifiedDecision { min_reason: usize },
    /// The case report covers all of STEP1 to STEP3.
    CoversPriorStages,
}

/// One weighted rubric criterion.
#[derive(Debug, Clone, Copy)]
pub struct Criterion {
    /// Stable id, used as the breakdown key.
    pub id: &'static str,
    pub name: &'static str,
    pub weight: u32,
    pub rule: Rule,
    /// Feedback when met. `{count}` expands to the hypothesis count.
    pub good_point: &'static str,
    /// Feedback when not met.
    pub missing_point: &'static str,
}

/// The complete rubric for one stage.
#[derive(Debug)]
pub struct StageRubric {
    pub stage: Stage,
    pub title: &'static str,
    /// What the submission is, for the remote judge prompt.
    pub task: &'static str,
    pub criteria: &'static [Criterion],
    pub pass_threshold: u32,
    pub pass_comment: &'static str,
    pub fail_comment: &'static str,
    pub improvement_example: &'static str,
}

impl StageRubric {
    /// Sum of all criterion weights.
    pub fn total_weight(&self) -> u32 {
        self.criteria.iter().map(|c| c.weight).sum()
    }
}

/// Rubric table entry for a stage.
pub fn rubric_for(stage: Stage) -> &'static StageRubric {
    match stage {
        Stage::Awareness => &AWARENESS,
        Stage::Hypothesis => &HYPOTHESIS,
        Stage::Reflection => &REFLECTION,
        Stage::CaseReport => &CASE_REPORT,
    }
}

static AWARENESS: StageRubric = StageRubric {
    stage: Stage::Awareness,
    title: "STEP1 アセスメント・気付き",
    task: "新人職員が利用者様について記録した「気付き」",
    criteria: &[
        Criterion {
            id: "length",
            name: "記述量",
            weight: 20,
            rule: Rule::MinChars {
                field: TextField::NoticeText,
                min: 30,
                trim: true,
            },
            good_point: "十分な記述量があります",
            missing_point: "記述が短すぎます。具体的な状況を詳しく記載しましょう",
        },
        Criterion {
            id: "time",
            name: "時間の記載",
            weight: 20,
            rule: Rule::Mentions {
                field: TextField::NoticeText,
                topic: Topic::Time,
            },
            good_point: "日時・時間帯が具体的に記録されています",
            missing_point: "いつ（時間帯）の出来事かを記載しましょう",
        },
        Criterion {
            id: "place",
            name: "場所の記載",
            weight: 20,
            rule: Rule::Mentions {
                field: TextField::NoticeText,
                topic: Topic::Place,
            },
            good_point: "場所・場面が記録されています",
            missing_point: "どこで起きたことかを記載しましょう",
        },
        Criterion {
            id: "change",
            name: "変化の比較",
            weight: 20,
            rule: Rule::Mentions {
                field: TextField::NoticeText,
                topic: Topic::Change,
            },
            good_point: "変化・比較が記録されています",
            missing_point: "「普段は〜だが、今日は〜」のように変化を比較して記載しましょう",
        },
        Criterion {
            id: "reaction",
            name: "本人の反応",
            weight: 20,
            rule: Rule::Mentions {
                field: TextField::NoticeText,
                topic: Topic::Reaction,
            },
            good_point: "本人の反応・言動が記録されています",
            missing_point: "本人の表情・言動・反応を具体的に記載しましょう",
        },
    ],
    pass_threshold: PASS_THRESHOLD,
    pass_comment: "具体的で観察力のある記録です！",
    fail_comment: "記録に不足している要素があります。改善点を確認しましょう。",
    improvement_example: "例: 「朝9時、フロアであいさつを呼びかけたが、Aさんは視線を合わせず返答もなかった。普段は笑顔で返している。眉間にしわが寄り、やや険しい表情だった。」",
};

static HYPOTHESIS: StageRubric = StageRubric {
    stage: Stage::Hypothesis,
    title: "STEP2 仮説思考",
    task: "新人職員が利用者様の変化に対して立てた「仮説思考」",
    criteria: &[
        Criterion {
            id: "change_detail",
            name: "変化の具体性",
            weight: 20,
            rule: Rule::MinChars {
                field: TextField::ChangeNoticed,
                min: 30,
                trim: false,
            },
            good_point: "変化が具体的に記載されています",
            missing_point: "気付いた変化をより具体的に記載しましょう",
        },
        Criterion {
            id: "hypothesis_count",
            name: "仮説の数",
            weight: 20,
            rule: Rule::HypothesisCount { min: 3 },
            good_point: "{count}つの仮説を立てています",
            missing_point: "仮説は最低3つ必要です",
        },
        Criterion {
            id: "depth",
            name: "掘り下げ",
            weight: 20,
            rule: Rule::DeepenedHypotheses { min: 2 },
            good_point: "「なぜ？」を深く掘り下げています",
            missing_point: "各仮説の「なぜ？」を2段階以上掘り下げましょう",
        },
        Criterion {
            id: "support_plan",
            name: "支援計画",
            weight: 20,
            rule: Rule::SupportedHypotheses { min: 2, chars: 10 },
            good_point: "支援計画が具体的に記載されています",
            missing_point: "各仮説に対する支援計画を具体的に記載しましょう",
        },
        Criterion {
            id: "priority",
            name: "優先順位",
            weight: 20,
            rule: Rule::AnyPriority,
            good_point: "優先順位が設定されています",
            missing_point: "仮説に優先順位をつけましょう",
        },
    ],
    pass_threshold: PASS_THRESHOLD,
    pass_comment: "仮説思考が十分に展開されています！",
    fail_comment: "仮説の深さや支援計画に改善の余地があります。",
    improvement_example: "例: 変化→「なぜ？（1段目）」→「なぜ？（2段目）」→「なぜ？（3段目＝根本原因）」→「根本原因に対する具体的支援」と掘り下げましょう",
};

static REFLECTION: StageRubric = StageRubric {
    stage: Stage::Reflection,
    title: "STEP3 振り返り",
    task: "新人職員が行った支援の「振り返り」",
    criteria: &[
        Criterion {
            id: "notice",
            name: "気付きの具体性",
            weight: 15,
            rule: Rule::MinChars {
                field: TextField::Notice,
                min: 20,
                trim: false,
            },
            good_point: "気付きが具体的に記載されています",
            missing_point: "気付きをより具体的に記載しましょう",
        },
        Criterion {
            id: "support",
            name: "支援内容",
            weight: 20,
            rule: Rule::MinChars {
                field: TextField::Support,
                min: 20,
                trim: false,
            },
            good_point: "支援内容が具体的です",
            missing_point: "支援内容を詳しく記載しましょう",
        },
        Criterion {
            id: "reason",
            name: "理由の論理性",
            weight: 15,
            rule: Rule::MinChars {
                field: TextField::Reason,
                min: 15,
                trim: false,
            },
            good_point: "支援の理由が明確です",
            missing_point: "なぜその支援を行ったのか、理由を明確にしましょう",
        },
        Criterion {
            id: "prediction",
            name: "変化の予測",
            weight: 15,
            rule: Rule::MinChars {
                field: TextField::Prediction,
                min: 15,
                trim: false,
            },
            good_point: "変化の予測が記載されています",
            missing_point: "支援後にどのような変化を予測するか記載しましょう",
        },
        Criterion {
            id: "reaction",
            name: "反応の記録",
            weight: 20,
            rule: Rule::MinChars {
                field: TextField::Reaction,
                min: 15,
                trim: false,
            },
            good_point: "本人の反応が記録されています",
            missing_point: "支援後の本人の反応を具体的に記録しましょう",
        },
        Criterion {
            id: "decision",
            name: "判断と理由",
            weight: 15,
            rule: Rule::JustifiedDecision { min_reason: 10 },
            good_point: "継続/変更/終了の判断と理由が明確です",
            missing_point: "判断の理由を具体的に記載しましょう",
        },
    ],
    pass_threshold: PASS_THRESHOLD,
    pass_comment: "振り返りが適切にできています。支援の質が向上していきますね！",
    fail_comment: "振り返りに不足している要素があります。各項目をより詳細に記載しましょう。",
    improvement_example: "具体的なエピソード→行った支援→その理由→予測→実際の反応→次のアクション、という流れで振り返りましょう",
};

static CASE_REPORT: StageRubric = StageRubric {
    stage: Stage::CaseReport,
    title: "STEP4 症例報告",
    task: "新人職員がSTEP1〜3をまとめた「症例報告」",
    criteria: &[
        Criterion {
            id: "summary",
            name: "症例の記載量",
            weight: 40,
            rule: Rule::MinChars {
                field: TextField::Summary,
                min: 100,
                trim: false,
            },
            good_point: "症例の記載が十分な分量です",
            missing_point: "症例報告をより詳細に記載しましょう",
        },
        Criterion {
            id: "consistency",
            name: "STEP1〜3の一貫性",
            weight: 30,
            rule: Rule::CoversPriorStages,
            good_point: "STEP1〜3が一貫して記載されています",
            missing_point: "全てのSTEPの内容を統合して記載しましょう",
        },
        Criterion {
            id: "other_services",
            name: "他事業からの情報収集",
            weight: 30,
            rule: Rule::MinChars {
                field: TextField::OtherServices,
                min: 20,
                trim: false,
            },
            good_point: "他事業からの情報収集が行えています",
            missing_point: "他事業からの情報収集も記載しましょう",
        },
    ],
    pass_threshold: PASS_THRESHOLD,
    pass_comment: "症例報告が適切にまとめられています",
    fail_comment: "記載に不足があります。各STEPの内容を統合し、一貫性を確認しましょう",
    improvement_example: "例: STEP1の気付き→STEP2の仮説→STEP3の支援と振り返りを一つの流れとしてまとめ、他事業から得た情報も加えましょう",
};

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn is_blank(text: Option<&str>) -> bool {
    text.map_or(true, |t| t.trim().is_empty())
}

impl Rule {
    /// Whether the submission meets this rule. Missing fields never do.
    pub fn is_met(&self, submission: &Submission, vocabulary: &CompiledVocabulary) -> bool {
        match *self {
            Rule::MinChars { field, min, trim } => submission.text(field).is_some_and(|text| {
                let text = if trim { text.trim() } else { text };
                char_count(text) >= min
            }),
            Rule::Mentions { field, topic } => submission
                .text(field)
                .is_some_and(|text| vocabulary.mentions(topic, text.trim())),
            Rule::HypothesisCount { min } => hypotheses(submission).len() >= min,
            Rule::DeepenedHypotheses { min } => {
                hypotheses(submission)
                    .iter()
                    .filter(|h| !is_blank(h.why2.as_deref()))
                    .count()
                    >= min
            }
            Rule::SupportedHypotheses { min, chars } => {
                hypotheses(submission)
                    .iter()
                    .filter(|h| {
                        h.support
                            .as_deref()
                            .is_some_and(|s| char_count(s.trim()) > chars)
                    })
                    .count()
                    >= min
            }
            Rule::AnyPriority => hypotheses(submission)
                .iter()
                .any(|h| h.priority.is_some_and(|p| p > 0)),
            Rule::JustifiedDecision { min_reason } => match submission {
                Submission::Reflection(r) => {
                    r.decision.is_some() && char_count(&r.decision_reason) >= min_reason
                }
                _ => false,
            },
            Rule::CoversPriorStages => match submission {
                Submission::CaseReport(c) => c.has_step1 && c.has_step2 && c.has_step3,
                _ => false,
            },
        }
    }
}

fn hypotheses(submission: &Submission) -> &[Hypothesis] {
    submission.hypotheses().unwrap_or(&[])
}

impl Criterion {
    fn good_point_for(&self, submission: &Submission) -> String {
        self.good_point
            .replace("{count}", &hypotheses(submission).len().to_string())
    }
}

/// Deterministic rule-based grader.
///
/// Pure: the same stage and submission always produce the same result.
#[derive(Debug, Clone)]
pub struct RubricScorer {
    vocabulary: CompiledVocabulary,
}

impl RubricScorer {
    /// Build a scorer from a (possibly user-supplied) vocabulary.
    pub fn new(vocabulary: &Vocabulary) -> Result<Self, RubricError> {
        Ok(Self {
            vocabulary: vocabulary.compile()?,
        })
    }

    /// Scorer with the built-in vocabulary.
    pub fn standard() -> Self {
        Self::new(&Vocabulary::default()).expect("built-in vocabulary must compile")
    }

    /// Score a submission against the rubric of `stage`.
    ///
    /// Fields the payload does not carry score zero; this never fails.
    pub fn score_stage(&self, stage: Stage, submission: &Submission) -> JudgementResult {
        let rubric = rubric_for(stage);
        let mut score = 0;
        let mut breakdown = BTreeMap::new();
        let mut good_points = Vec::new();
        let mut missing_points = Vec::new();

        for criterion in rubric.criteria {
            let earned = if criterion.rule.is_met(submission, &self.vocabulary) {
                good_points.push(criterion.good_point_for(submission));
                criterion.weight
            } else {
                missing_points.push(criterion.missing_point.to_string());
                0
            };
            score += earned;
            breakdown.insert(criterion.id.to_string(), earned);
        }

        let judgement = Mark::from_score(score, rubric.pass_threshold);
        let (short_comment, improvement_example) = match judgement {
            Mark::Pass => (rubric.pass_comment.to_string(), String::new()),
            Mark::Fail => (
                rubric.fail_comment.to_string(),
                rubric.improvement_example.to_string(),
            ),
        };

        JudgementResult {
            judgement,
            score,
            breakdown,
            short_comment,
            good_points,
            missing_points,
            improvement_example,
        }
    }

    /// Score a submission against its own stage's rubric.
    pub fn score(&self, submission: &Submission) -> JudgementResult {
        self.score_stage(submission.stage(), submission)
    }
}

impl Default for RubricScorer {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AwarenessSubmission, CaseReportSubmission, Decision, HypothesisSubmission,
        ReflectionSubmission,
    };

    fn awareness(text: &str) -> Submission {
        Submission::Awareness(AwarenessSubmission {
            notice_text: text.into(),
            target_id: "T001".into(),
            date: None,
        })
    }

    fn hypothesis(why2: Option<&str>, support: Option<&str>, priority: Option<u32>) -> Hypothesis {
        Hypothesis {
            why1: "眠れていない".into(),
            why2: why2.map(Into::into),
            why3: None,
            support: support.map(Into::into),
            priority,
        }
    }

    fn hypotheses_submission(change: &str, hypotheses: Vec<Hypothesis>) -> Submission {
        Submission::Hypothesis(HypothesisSubmission {
            change_noticed: change.into(),
            hypotheses,
            priority_reason: String::new(),
            expected_change: String::new(),
        })
    }

    #[test]
    fn every_rubric_weighs_exactly_100() {
        for stage in Stage::ALL {
            let rubric = rubric_for(stage);
            assert_eq!(rubric.total_weight(), 100, "{stage}");
            assert_eq!(rubric.stage, stage);
        }
        assert_eq!(rubric_for(Stage::Awareness).criteria.len(), 5);
        assert_eq!(rubric_for(Stage::Hypothesis).criteria.len(), 5);
        assert_eq!(rubric_for(Stage::Reflection).criteria.len(), 6);
        assert_eq!(rubric_for(Stage::CaseReport).criteria.len(), 3);
    }

    #[test]
    fn complete_awareness_note_scores_100() {
        let scorer = RubricScorer::standard();
        let note = awareness(
            "朝9時、フロアであいさつを呼びかけたが、Aさんは視線を合わせず返答もなかった。普段は笑顔で返している。",
        );
        let result = scorer.score_stage(Stage::Awareness, &note);
        assert_eq!(result.score, 100);
        assert_eq!(result.judgement, Mark::Pass);
        assert!(result.improvement_example.is_empty());
        assert_eq!(result.good_points.len(), 5);
        assert!(result.missing_points.is_empty());
    }

    #[test]
    fn short_awareness_note_fails_with_example() {
        let scorer = RubricScorer::standard();
        let result = scorer.score_stage(Stage::Awareness, &awareness("今日は元気だった"));
        // "今日は" is a comparison marker; nothing else matches.
        assert_eq!(result.breakdown["length"], 0);
        assert_eq!(result.breakdown["change"], 20);
        assert_eq!(result.score, 20);
        assert_eq!(result.judgement, Mark::Fail);
        assert!(!result.improvement_example.is_empty());
    }

    #[test]
    fn length_criterion_boundary() {
        let scorer = RubricScorer::standard();
        let short = "あ".repeat(29);
        let long = "あ".repeat(30);
        assert_eq!(scorer.score(&awareness(&short)).breakdown["length"], 0);
        assert_eq!(scorer.score(&awareness(&long)).breakdown["length"], 20);
        // Surrounding whitespace does not count.
        let padded = format!("   {short}   ");
        assert_eq!(scorer.score(&awareness(&padded)).breakdown["length"], 0);
    }

    #[test]
    fn hypothesis_count_criterion() {
        let scorer = RubricScorer::standard();
        for n in 0..=5 {
            let submission = hypotheses_submission("", vec![hypothesis(None, None, None); n]);
            let points = scorer.score(&submission).breakdown["hypothesis_count"];
            assert_eq!(points, if n >= 3 { 20 } else { 0 }, "n = {n}");
        }
    }

    #[test]
    fn hypothesis_count_good_point_names_the_count() {
        let scorer = RubricScorer::standard();
        let submission = hypotheses_submission("", vec![hypothesis(None, None, None); 4]);
        let result = scorer.score(&submission);
        assert!(result.good_points.contains(&"4つの仮説を立てています".to_string()));
    }

    #[test]
    fn full_hypothesis_submission_passes() {
        let scorer = RubricScorer::standard();
        let submission = hypotheses_submission(
            "普段は毎食ほぼ完食しているが、この3日間は朝食を半分以上残すようになった。",
            vec![
                hypothesis(Some("夜間の覚醒が多い"), Some("夜間の巡視で睡眠状況を記録する"), Some(1)),
                hypothesis(Some("義歯が合っていない"), Some("歯科受診を家族と相談して調整する"), Some(2)),
                hypothesis(Some("  "), Some("短い"), None),
            ],
        );
        let result = scorer.score(&submission);
        assert_eq!(result.breakdown["change_detail"], 20);
        assert_eq!(result.breakdown["hypothesis_count"], 20);
        assert_eq!(result.breakdown["depth"], 20);
        assert_eq!(result.breakdown["support_plan"], 20);
        assert_eq!(result.breakdown["priority"], 20);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn zero_priority_counts_as_unranked() {
        let scorer = RubricScorer::standard();
        let submission = hypotheses_submission("", vec![hypothesis(None, None, Some(0)); 3]);
        assert_eq!(scorer.score(&submission).breakdown["priority"], 0);
    }

    #[test]
    fn reflection_weights() {
        let scorer = RubricScorer::standard();
        let submission = Submission::Reflection(ReflectionSubmission {
            notice: "昼食の食事量が減り、表情が硬くなっている様子だった".into(),
            support: "昼食時に隣に座り、好きな話題で声をかけながら食事を勧めた".into(),
            reason: "会話があると食事が進むことが以前からあったため".into(),
            prediction: "".into(),
            reaction: "".into(),
            decision: Some(Decision::Continue),
            decision_reason: "短い".into(),
        });
        let result = scorer.score(&submission);
        assert_eq!(result.breakdown["notice"], 15);
        assert_eq!(result.breakdown["support"], 20);
        assert_eq!(result.breakdown["reason"], 15);
        assert_eq!(result.breakdown["decision"], 0);
        assert_eq!(result.score, 50);
        assert_eq!(result.judgement, Mark::Fail);
    }

    #[test]
    fn decision_requires_a_choice() {
        let scorer = RubricScorer::standard();
        let submission = Submission::Reflection(ReflectionSubmission {
            decision: None,
            decision_reason: "十分に長い判断の理由を書いた".into(),
            ..Default::default()
        });
        assert_eq!(scorer.score(&submission).breakdown["decision"], 0);
    }

    #[test]
    fn case_report_rubric() {
        let scorer = RubricScorer::standard();
        let submission = Submission::CaseReport(CaseReportSubmission {
            summary: "あ".repeat(100),
            has_step1: true,
            has_step2: true,
            has_step3: false,
            other_services: "デイサービスの職員から入浴時の様子を聞き取った".into(),
            presentation_date: None,
        });
        let result = scorer.score(&submission);
        assert_eq!(result.breakdown["summary"], 40);
        assert_eq!(result.breakdown["consistency"], 0);
        assert_eq!(result.breakdown["other_services"], 30);
        assert_eq!(result.score, 70);
        assert!(result.passed());
    }

    #[test]
    fn mismatched_payload_scores_zero() {
        let scorer = RubricScorer::standard();
        let note = awareness(
            "朝9時、フロアであいさつを呼びかけたが、Aさんは視線を合わせず返答もなかった。普段は笑顔で返している。",
        );
        let result = scorer.score_stage(Stage::Reflection, &note);
        assert_eq!(result.score, 0);
        assert_eq!(result.breakdown.len(), 6);
        assert_eq!(result.missing_points.len(), 6);
        assert_eq!(result.judgement, Mark::Fail);
    }

    #[test]
    fn judgement_matches_score_for_degenerate_input() {
        let scorer = RubricScorer::standard();
        let empties = [
            Submission::Awareness(AwarenessSubmission::default()),
            Submission::Hypothesis(HypothesisSubmission::default()),
            Submission::Reflection(ReflectionSubmission::default()),
            Submission::CaseReport(CaseReportSubmission::default()),
        ];
        for stage in Stage::ALL {
            for submission in &empties {
                let result = scorer.score_stage(stage, submission);
                assert_eq!(result.judgement.is_pass(), result.score >= 60);
                assert_eq!(
                    result.breakdown.values().sum::<u32>(),
                    result.score,
                    "{stage}"
                );
            }
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = RubricScorer::standard();
        let note = awareness("夕方、居室で「家に帰りたい」と訴えた。最近よく見られる。");
        assert_eq!(scorer.score(&note), scorer.score(&note));
    }

    #[test]
    fn custom_vocabulary_changes_matching() {
        let vocab = Vocabulary {
            place: vec!["ホール".into()],
            ..Vocabulary::default()
        };
        let scorer = RubricScorer::new(&vocab).unwrap();
        let result = scorer.score(&awareness("ホールで過ごしていた"));
        assert_eq!(result.breakdown["place"], 20);
        let result = scorer.score(&awareness("食堂で過ごしていた"));
        assert_eq!(result.breakdown["place"], 0);
    }
}
