//! Interactive fragment REPL.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use kernelbridge::KernelLibrary;

use crate::style::{print_error, print_success};

const PROMPT: &str = "c++> ";
const CONTINUATION: &str = " ...> ";

const HELP_TEXT: &str = r"
Commands:
  .help          Show this help message
  .exit          Shut the kernel down and exit
  .quit          Same as .exit

Enter C++ lines; a blank line submits them as one fragment.
Declarations stay visible to later fragments.

  int x = 42;
  std::cout << x * 2 << std::endl;
";

pub fn run(project: &str, kernel: Option<&str>) -> Result<()> {
    let config = super::load_config(project)?;
    let kernel_name = kernel.unwrap_or(&config.kernel.name).to_string();

    let mut library = KernelLibrary::new(config)?;
    library.start_kernel(kernel)?;
    print_success(&format!("kernel '{kernel_name}' ready"));
    println!("Type .help for help, .exit to quit.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer: Vec<String> = Vec::new();

    loop {
        print!("{}", if buffer.is_empty() { PROMPT } else { CONTINUATION });
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF submits whatever is pending.
            println!();
            submit(&mut library, &mut buffer);
            break;
        }
        let line = line.trim_end_matches(['\n', '\r']);

        if buffer.is_empty() && line.trim_start().starts_with('.') {
            match line.trim() {
                ".help" | ".h" => println!("{HELP_TEXT}"),
                ".exit" | ".quit" | ".q" => break,
                other => print_error(&format!("unknown command '{other}'")),
            }
            continue;
        }

        if line.trim().is_empty() {
            submit(&mut library, &mut buffer);
        } else {
            buffer.push(line.to_string());
        }
    }

    library.shutdown_kernel()?;
    Ok(())
}

fn submit(library: &mut KernelLibrary, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    match library.source_exec(buffer) {
        Ok(output) if output.is_empty() => {}
        Ok(output) => println!("{output}"),
        Err(e) => print_error(&e.to_string()),
    }
    buffer.clear();
}
