//! One-shot fragment execution.

use std::io::Read;

use anyhow::{Context, Result};
use kernelbridge::KernelLibrary;

pub fn run(project: &str, code: &[String], kernel: Option<&str>, timeout_ms: Option<u64>) -> Result<()> {
    let mut config = super::load_config(project)?;
    if let Some(timeout_ms) = timeout_ms {
        anyhow::ensure!(timeout_ms > 0, "--timeout-ms must be greater than zero");
        config.execution.timeout_ms = timeout_ms;
    }

    let parts = if code.is_empty() || code == ["-"] {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read code from stdin")?;
        vec![source]
    } else {
        code.to_vec()
    };

    let mut library = KernelLibrary::new(config)?;
    library.start_kernel(kernel)?;

    let result = library.source_exec(&parts);
    library.shutdown_kernel()?;

    let output = result?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
