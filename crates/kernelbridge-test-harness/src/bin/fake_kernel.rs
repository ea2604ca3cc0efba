//! Standalone fake kernel, launched the way Jupyter launches real kernels:
//!
//! ```text
//! kernelbridge-fake-kernel -f /tmp/kernel-1234.json
//! ```
//!
//! Serves the toy interpreter on the ports in the connection file and exits
//! after a `shutdown_request`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use kernelbridge_supervisor::ConnectionInfo;
use kernelbridge_test_harness::{FakeKernel, ToyCpp};

#[derive(Parser)]
#[command(name = "kernelbridge-fake-kernel")]
struct Args {
    /// Connection file written by the launcher.
    #[arg(short = 'f', long = "connection-file")]
    connection_file: PathBuf,

    /// How long `while (true)` fragments keep the kernel busy, in ms.
    #[arg(long, default_value_t = 2_000)]
    hang_ms: u64,

    /// Ignore shutdown requests, to exercise forced termination.
    #[arg(long)]
    stubborn: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let info = match ConnectionInfo::read(&args.connection_file) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("kernelbridge-fake-kernel: {e}");
            return ExitCode::FAILURE;
        }
    };

    let toy = ToyCpp::new().with_hang(Duration::from_millis(args.hang_ms));
    let mut kernel = match FakeKernel::serve(info, toy.into_handler()).await {
        Ok(kernel) => kernel,
        Err(e) => {
            eprintln!("kernelbridge-fake-kernel: {e}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("kernelbridge-fake-kernel: serving");

    kernel.finished().await;
    if args.stubborn {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    ExitCode::SUCCESS
}
