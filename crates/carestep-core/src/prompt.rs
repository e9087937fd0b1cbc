//! Prompt construction for the remote judge.
//!
//! The prompt is rendered from the stage's rubric table, so the remote judge
//! and the local scorer always grade against the same criteria and ids.

use std::fmt::Write;

use crate::model::Submission;
use crate::rubric::StageRubric;

const UNFILLED: &str = "未記入";

fn or_unfilled(text: &str) -> &str {
    if text.trim().is_empty() {
        UNFILLED
    } else {
        text
    }
}

fn opt_or_unfilled(text: Option<&str>) -> &str {
    text.map_or(UNFILLED, or_unfilled)
}

/// Build the full grading prompt for one submission.
pub fn build_prompt(rubric: &StageRubric, submission: &Submission) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "あなたは介護施設の新人研修プログラムの採点AIです。");
    let _ = writeln!(prompt, "{}を採点してください。", rubric.task);
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "## {}", rubric.title);
    let _ = writeln!(prompt, "## 採点基準（合計100点）");
    for (i, criterion) in rubric.criteria.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. **{}** (id: {}, {}点): {}",
            i + 1,
            criterion.name,
            criterion.id,
            criterion.weight,
            criterion.missing_point
        );
    }
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "## 判定ルール");
    let _ = writeln!(prompt, "- {}点以上: ○（合格）", rubric.pass_threshold);
    let _ = writeln!(prompt, "- {}点未満: ×（不合格）", rubric.pass_threshold);
    let _ = writeln!(prompt);

    render_submission(&mut prompt, submission);
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "## 回答形式（必ずJSONのみ）:");
    let _ = writeln!(prompt, "{{");
    let _ = writeln!(prompt, "  \"judgement\": \"○ or ×\",");
    let _ = writeln!(prompt, "  \"score\": 0〜100の整数,");
    let ids: Vec<String> = rubric
        .criteria
        .iter()
        .map(|c| format!("\"{}\": 点数", c.id))
        .collect();
    let _ = writeln!(prompt, "  \"breakdown\": {{ {} }},", ids.join(", "));
    let _ = writeln!(prompt, "  \"short_comment\": \"総評コメント（1〜2文）\",");
    let _ = writeln!(prompt, "  \"good_points\": [\"良い点1\", \"良い点2\"],");
    let _ = writeln!(prompt, "  \"missing_points\": [\"不足点1\", \"不足点2\"],");
    let _ = writeln!(
        prompt,
        "  \"improvement_example\": \"改善例文（不合格の場合のみ）\""
    );
    let _ = write!(prompt, "}}");

    prompt
}

fn render_submission(prompt: &mut String, submission: &Submission) {
    match submission {
        Submission::Awareness(s) => {
            let _ = writeln!(prompt, "## 対象者: {}", or_unfilled(&s.target_id));
            let date = s.date.map(|d| d.to_string());
            let _ = writeln!(prompt, "## 記録日: {}", opt_or_unfilled(date.as_deref()));
            let _ = writeln!(prompt);
            let _ = writeln!(prompt, "## 新人が書いた気付き:");
            let _ = writeln!(prompt, "「{}」", s.notice_text);
        }
        Submission::Hypothesis(s) => {
            let _ = writeln!(prompt, "## 気付いた変化:");
            let _ = writeln!(prompt, "「{}」", s.change_noticed);
            let _ = writeln!(prompt);
            let _ = writeln!(prompt, "## 仮説:");
            for (i, h) in s.hypotheses.iter().enumerate() {
                let priority = h
                    .priority
                    .filter(|p| *p > 0)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| UNFILLED.to_string());
                let _ = writeln!(
                    prompt,
                    "仮説{}: なぜ①「{}」→ なぜ②「{}」→ なぜ③「{}」→ 支援「{}」（優先順位: {}）",
                    i + 1,
                    or_unfilled(&h.why1),
                    opt_or_unfilled(h.why2.as_deref()),
                    opt_or_unfilled(h.why3.as_deref()),
                    opt_or_unfilled(h.support.as_deref()),
                    priority
                );
            }
            let _ = writeln!(prompt);
            let _ = writeln!(
                prompt,
                "## 優先順位の理由: {}",
                or_unfilled(&s.priority_reason)
            );
            let _ = writeln!(prompt, "## 期待する変化: {}", or_unfilled(&s.expected_change));
        }
        Submission::Reflection(s) => {
            let decision = s.decision.map(|d| d.to_string());
            let _ = writeln!(prompt, "## 振り返り内容:");
            let _ = writeln!(prompt, "- 気付き: {}", or_unfilled(&s.notice));
            let _ = writeln!(prompt, "- 支援内容: {}", or_unfilled(&s.support));
            let _ = writeln!(prompt, "- 理由: {}", or_unfilled(&s.reason));
            let _ = writeln!(prompt, "- 変化の予測: {}", or_unfilled(&s.prediction));
            let _ = writeln!(prompt, "- 本人の反応: {}", or_unfilled(&s.reaction));
            let _ = writeln!(prompt, "- 判断: {}", opt_or_unfilled(decision.as_deref()));
            let _ = writeln!(prompt, "- 判断の理由: {}", or_unfilled(&s.decision_reason));
        }
        Submission::CaseReport(s) => {
            let yes_no = |b: bool| if b { "あり" } else { "なし" };
            let _ = writeln!(prompt, "## 症例報告:");
            let _ = writeln!(prompt, "「{}」", s.summary);
            let _ = writeln!(
                prompt,
                "## STEP1〜3の記載: STEP1 {} / STEP2 {} / STEP3 {}",
                yes_no(s.has_step1),
                yes_no(s.has_step2),
                yes_no(s.has_step3)
            );
            let _ = writeln!(
                prompt,
                "## 他事業からの情報収集: {}",
                or_unfilled(&s.other_services)
            );
        }
    }
}
