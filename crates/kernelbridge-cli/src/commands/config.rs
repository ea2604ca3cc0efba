//! Configuration commands.

use anyhow::Result;
use kernelbridge_config::{ConfigLayer, Paths};

use crate::Format;
use crate::style::{print_header, print_labeled};

/// Show the effective configuration.
pub fn show(project: &str, format: Format) -> Result<()> {
    let config = super::load_config(project)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        Format::Toml => println!("{}", toml::to_string_pretty(&config)?),
        Format::Text => {
            print_header("Sources");
            for source in Paths::new().sources(project) {
                let label = match source.layer {
                    ConfigLayer::User => "User",
                    ConfigLayer::Project => "Project",
                    ConfigLayer::Local => "Local",
                };
                let state = if source.exists() { "loaded" } else { "not found" };
                print_labeled(label, &format!("{} ({state})", source.path.display()));
            }
            print_labeled("Environment", "KERNELBRIDGE_*");
            println!();

            print_header("Kernel");
            print_labeled("Name", &config.kernel.name);
            print_labeled(
                "Command",
                &config
                    .kernel
                    .command
                    .as_ref()
                    .map_or("(kernelspec)".to_string(), |argv| argv.join(" ")),
            );
            print_labeled("IP", &config.kernel.ip);
            print_labeled("Startup timeout", &format!("{} ms", config.kernel.startup_timeout_ms));
            print_labeled("Shutdown grace", &format!("{} ms", config.kernel.shutdown_grace_ms));
            println!();

            print_header("Execution");
            print_labeled("Timeout", &format!("{} ms", config.execution.timeout_ms));
            print_labeled("Flags", &config.execution.flags.join(" "));
            print_labeled(
                "Include paths",
                &config
                    .execution
                    .include_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            print_labeled("Headers", &config.execution.headers.join(" "));
            println!();

            print_header("Classification");
            print_labeled("Compile error", &config.classification.compile_error);
            print_labeled("Runtime fault", &config.classification.runtime_fault);
            print_labeled("Assertion signature", &config.classification.assertion_signature);
        }
    }
    Ok(())
}
