//! Kernelspec listing.

use anyhow::Result;
use kernelbridge::find_kernelspecs;
use kernelbridge_supervisor::jupyter_data_roots;

use crate::style::colors::SemanticStyle;
use crate::style::{print_hint, print_labeled};

pub fn run(project: &str) -> Result<()> {
    let config = super::load_config(project)?;
    let specs = find_kernelspecs(&config.kernel.search_paths);

    if specs.is_empty() {
        println!("No kernelspecs found. Searched:");
        for root in jupyter_data_roots(&config.kernel.search_paths) {
            println!("  {}", root.join("kernels").display().to_string().muted());
        }
        print_hint("install xeus-cpp, e.g. `mamba install -c conda-forge xeus-cpp`");
        return Ok(());
    }

    for (name, spec) in &specs {
        let marker = if *name == config.kernel.name { " (default)" } else { "" };
        println!("{}{}", name.code(), marker.muted());
        print_labeled("Display name", &spec.display_name);
        print_labeled("Language", &spec.language);
        print_labeled("Location", &spec.resource_dir.display().to_string());
    }
    Ok(())
}
