//! CLI command handling
//!
//! Loads suites, wires the JSON-RPC chain and formats output.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::chain::artifacts::{ArtifactStore, FsArtifactStore};
use crate::chain::rpc::RpcChain;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::scenario::loader;
use crate::scenario::{
    run_suite, FailurePolicy, ReportWriter, RunOptions, ScenarioSuite, SuiteDefinition,
};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config, verbose: bool) -> Result<()> {
    match command {
        Commands::Run {
            paths,
            network,
            rpc_url,
            artifacts,
            deployments,
            scenario,
            tag,
            bail,
            continue_on_failure,
            report_dir,
            json,
        } => {
            let suites = load_tagged(&paths, &tag)?;
            if suites.is_empty() {
                println!("No suites found");
                return Ok(());
            }

            let network = network.unwrap_or_else(|| config.defaults.network.clone());
            let url = rpc_url.or_else(|| config.rpc_url(&network)).ok_or_else(|| {
                Error::Configuration(format!(
                    "no RPC URL configured for network '{network}'; pass --rpc-url or add [networks.{network}]"
                ))
            })?;

            let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(
                artifacts.unwrap_or_else(|| config.artifacts.artifacts_dir.clone()),
                deployments.unwrap_or_else(|| config.artifacts.deployments_dir.clone()),
            ));
            let chain = RpcChain::new(url, store.clone(), config.timeouts.request())?
                .with_receipt_timeout(config.timeouts.receipt())
                .with_poll_interval(config.timeouts.poll_interval());
            tracing::info!(network = %network, url = chain.url(), "Connected");

            let options = RunOptions {
                policy: if continue_on_failure {
                    FailurePolicy::Continue
                } else {
                    config.run.failure_policy
                },
                bail: bail || config.run.bail,
                filter: scenario,
            };

            let mut writer = report_dir.map(ReportWriter::new);
            let mut reports = Vec::with_capacity(suites.len());
            for (path, definition) in suites {
                let suite =
                    ScenarioSuite::from_definition(definition, Some(store.clone()), &network);
                let report = run_suite(&suite, &chain, &options).await;

                if !json {
                    report.print_summary(verbose);
                }
                if let Some(writer) = writer.as_mut() {
                    let written = writer.write(&report, &path)?;
                    if !json {
                        println!("  {} {}", "Report:".dimmed(), written.display());
                    }
                }
                reports.push(report);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }

            let failed = reports.iter().filter(|r| !r.is_success()).count();
            if failed > 0 {
                return Err(Error::SuitesFailed(failed));
            }
            Ok(())
        }

        Commands::List { paths, tag } => {
            for (path, suite) in load_tagged(&paths, &tag)? {
                let meta = &suite.metadata;
                let version = meta.version.as_deref().map(|v| format!(" v{v}")).unwrap_or_default();
                println!(
                    "{}{} {}",
                    meta.name.white().bold(),
                    version.dimmed(),
                    format!("({})", path.display()).dimmed()
                );
                if let Some(description) = &meta.description {
                    println!("  {}", description.dimmed());
                }
                if !meta.tags.is_empty() {
                    let tags: Vec<&str> = meta.tags.iter().map(String::as_str).collect();
                    println!("  tags: {}", tags.join(", ").cyan());
                }
                for scenario in &suite.scenarios {
                    println!("  - {} ({} steps)", scenario.name, scenario.steps.len());
                }
            }
            Ok(())
        }

        Commands::Check { paths } => {
            let mut problems = 0;
            for path in loader::discover(&paths)? {
                let suite = match loader::load_suite(&path) {
                    Ok(suite) => suite,
                    Err(e) => {
                        println!("{} {}", "✗".red(), e);
                        problems += 1;
                        continue;
                    }
                };

                let issues = loader::check(&suite);
                if issues.is_empty() {
                    println!("{} {} ({})", "✓".green(), suite.metadata.name, path.display());
                } else {
                    println!("{} {} ({})", "✗".red(), suite.metadata.name, path.display());
                    for issue in &issues {
                        println!("    {issue}");
                    }
                    problems += issues.len();
                }
            }

            if problems > 0 {
                return Err(Error::CheckFailed(problems));
            }
            Ok(())
        }
    }
}

/// Load suites, keeping those carrying any of `tags` (all when empty)
fn load_tagged(paths: &[PathBuf], tags: &[String]) -> Result<Vec<(PathBuf, SuiteDefinition)>> {
    let suites = loader::load_all(paths)?;
    Ok(suites
        .into_iter()
        .filter(|(_, suite)| tags.is_empty() || tags.iter().any(|t| suite.metadata.has_tag(t)))
        .collect())
}
