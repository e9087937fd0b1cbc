//! The `carestep list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use carestep_providers::create_judge;

pub fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = carestep_providers::config::load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;
    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| name != filter) {
            continue;
        }

        let provider_config = &config.providers[name];
        let judge = create_judge(provider_config);
        let models = judge.available_models();
        if models.is_empty() {
            continue;
        }

        found_any = true;
        let default = if *name == config.default_provider {
            " (default)"
        } else {
            ""
        };
        let key = if provider_config.has_credential() {
            ""
        } else {
            ", no API key"
        };
        println!("Provider: {name}{default}{key}");
        for model in &models {
            println!(
                "  {} — {} ({}K context)",
                model.id,
                model.name,
                model.max_context / 1000,
            );
        }
        println!();
    }

    if !found_any {
        println!("No providers configured. Run `carestep init` to create a config file.");
    }

    Ok(())
}
