/*!

Runs the pod security policy checks against the cluster in the ambient kube config, or the one
given with `--kubeconfig`, and exits non-zero if any check fails.

!*/

use argh::FromArgs;
use env_logger::Builder;
use log::LevelFilter;
use psp_harness::{HarnessConfig, KubeGateway, ScenarioDriver, SuiteReport};
use std::path::PathBuf;

#[derive(FromArgs)]
/// Check that pod security policies are enforced by a Kubernetes cluster.
struct Args {
    /// set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[argh(option, default = "LevelFilter::Info")]
    log_level: LevelFilter,

    /// path to the kubeconfig of the cluster under test
    #[argh(option)]
    kubeconfig: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args: Args = argh::from_env();
    init_logger(args.log_level);
    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let config = HarnessConfig::from_env()?;
    let gateway = match &args.kubeconfig {
        Some(path) => KubeGateway::new_from_kubeconfig_path(path).await?,
        None => KubeGateway::new().await?,
    };
    let report = ScenarioDriver::new(gateway, config).run_suite().await;
    print_report(&report);
    Ok(report.passed())
}

fn print_report(report: &SuiteReport) {
    match &report.policies {
        Ok(()) => println!("PASS  has the expected policies"),
        Err(e) => println!("FAIL  has the expected policies: {}", e),
    }
    for scenario in &report.scenarios {
        let namespace = scenario.namespace.as_deref().unwrap_or("-");
        match &scenario.result {
            Ok(()) => println!("PASS  {} ({})", scenario.scenario, namespace),
            Err(e) => println!("FAIL  {} ({}): {}", scenario.scenario, namespace, e),
        }
        for failure in &scenario.teardown.failures {
            println!("      cleanup: {}", failure);
        }
    }
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level for the harness crates only.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("psp_harness"), level)
                .init();
        }
    }
}
