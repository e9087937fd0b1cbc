//! The `carestep init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create carestep.toml
    if std::path::Path::new("carestep.toml").exists() {
        println!("carestep.toml already exists, skipping.");
    } else {
        std::fs::write("carestep.toml", SAMPLE_CONFIG)?;
        println!("Created carestep.toml");
    }

    // Create example submissions
    std::fs::create_dir_all("submissions")?;
    for (name, content) in [
        ("submissions/example-step1.toml", EXAMPLE_STEP1),
        ("submissions/example-step2.toml", EXAMPLE_STEP2),
    ] {
        let path = std::path::Path::new(name);
        if path.exists() {
            println!("{name} already exists, skipping.");
        } else {
            std::fs::write(path, content)?;
            println!("Created {name}");
        }
    }

    println!("\nNext steps:");
    println!("  1. Set GEMINI_API_KEY or edit carestep.toml");
    println!("  2. Run: carestep validate --submission submissions");
    println!("  3. Run: carestep grade --submission submissions");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# carestep configuration

default_provider = "gemini"
default_model = "gemini-2.0-flash"
temperature = 0.3
max_output_tokens = 1024
timeout_secs = 30
parallelism = 4
work_type = "day"

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"
model = "claude-haiku-4-5-20251001"

# Words the local scorer looks for. Entries are regular expressions.
# [vocabulary]
# place = ["フロア", "居室", "食堂", "浴室", "トイレ"]

[pass_rules]
first_attempt_score = 80
perfect_score = 100
perfect_streak = 2
stagnation_months = 8
stagnation_penalty = 2

[calendar]
input_start = 26
input_end = 10
evaluation_start = 11
evaluation_end = 17
"#;

const EXAMPLE_STEP1: &str = r#"stage = "step1"
staff_id = "S001"
target_id = "T001"
notice_text = """
朝9時、フロアであいさつを呼びかけたが、Aさんは視線を合わせず返答もなかった。\
普段は笑顔で返してくれるが、今日は眉間にしわが寄り、険しい表情だった。"""
"#;

const EXAMPLE_STEP2: &str = r#"stage = "step2"
staff_id = "S001"
change_noticed = "普段は朝食を完食しているが、この一週間は半分ほど残すようになった。"
priority_reason = "睡眠不足は他の変化にもつながるため最優先とした"
expected_change = "夜間よく眠れるようになり、朝食を完食できるようになる"

[[hypotheses]]
why1 = "夜眠れていない"
why2 = "夜間に何度もトイレに起きている"
why3 = "夕方以降の水分摂取が多い"
support = "夕方以降の水分量を記録し、看護師と摂取時間を相談する"
priority = 1

[[hypotheses]]
why1 = "義歯が合っていない"
why2 = "体重が減って歯茎がやせた"
support = "歯科受診を家族に提案し、食事形態を一時的に変更する"
priority = 2

[[hypotheses]]
why1 = "食事の好みが変わった"
support = "本人に好きな献立を聞き取る"
priority = 3
"#;
