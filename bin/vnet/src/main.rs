//! vnet provisions Tenderly Virtual TestNets for the jobs of a CI/CD pipeline.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;

use cli::{CleanupArgs, Cli, Command, ParseArgs, ProvisionArgs};
use vnet_deploy::{
    BoolInput, Cleanup, CleanupConfig, EnvExporter, FsHandler, GitRemote, GitWorkspace, Mode,
    ParsedDeployments, ProvisionInputs, ProvisionReport, Provisioner, StateStore, TenderlyClient,
    VnetError, parse_deployment_logs, parse_log_dir,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let store = StateStore::new(cli.run.to_context());

    match cli.command {
        Command::Provision(args) => provision(args, &store).await,
        Command::Cleanup(args) => {
            cleanup(args, &store).await;
            Ok(())
        }
        Command::Parse(args) => parse(args, &store).await,
    }
}

async fn provision(args: ProvisionArgs, store: &StateStore) -> Result<()> {
    let inputs = ProvisionInputs::load(args.config.as_deref(), args.to_inputs())?;
    let config = inputs.validate()?;

    let home = dirs::home_dir().context("Failed to locate the home directory")?;
    FsHandler::write_cli_config(&home, &config.access_key)?;

    let provider = TenderlyClient::with_base_url(
        &args.api_url,
        &config.account_name,
        &config.project_name,
        &config.access_key,
    )?;

    let env = match &args.github_env {
        Some(path) => EnvExporter::new(path),
        None => EnvExporter::in_memory(),
    };

    let report = Provisioner::new(&provider, &config, store, &env)
        .provision()
        .await?;

    println!("{}", summary_table(&report));
    if report.networks.is_empty() {
        tracing::warn!("No Virtual TestNet could be provisioned");
    }

    Ok(())
}

fn summary_table(report: &ProvisionReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Network", "Chain ID", "TestNet", "Public RPC", "Explorer"]);

    for (network_id, network) in report.networks.iter() {
        table.add_row(vec![
            network_id.clone(),
            network.chain_id.to_string(),
            network.id.clone(),
            network.public_rpc_url.clone(),
            network.explorer_url.clone().unwrap_or_default(),
        ]);
    }
    for (network_id, message) in &report.failures {
        table.add_row(vec![
            network_id.clone(),
            String::new(),
            "failed".to_string(),
            message.clone(),
            String::new(),
        ]);
    }

    table
}

/// Never fails: cleanup problems must not fail the job.
async fn cleanup(args: CleanupArgs, store: &StateStore) {
    let config = match cleanup_config(&args) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Cleanup skipped: {err}");
            return;
        }
    };

    let provider = match TenderlyClient::with_base_url(
        &args.api_url,
        args.account_name.clone().unwrap_or_default(),
        args.project_name.clone().unwrap_or_default(),
        args.access_key.clone().unwrap_or_default(),
    ) {
        Ok(provider) => provider,
        Err(err) => {
            tracing::warn!("Cleanup skipped: {err:#}");
            return;
        }
    };

    let ctx = store.context();
    let mut workspace = GitWorkspace::new(&ctx.workspace, &ctx.workflow);
    if let (Some(token), Some(repository)) = (&args.github_token, &args.repository) {
        workspace = workspace.with_remote(GitRemote {
            server_url: args.server_url.clone(),
            repository: repository.clone(),
            token: token.clone(),
        });
    }

    let report = Cleanup::new(&provider, &workspace, store, config).run().await;
    tracing::info!(
        networks = report.networks,
        paused = report.paused.len(),
        failed = report.failed.len(),
        published = report.published,
        "Cleanup finished"
    );
}

fn cleanup_config(args: &CleanupArgs) -> Result<CleanupConfig, VnetError> {
    let push_on_complete = match &args.push_on_complete {
        Some(value) => BoolInput::from(value.clone())
            .parse("push_on_complete")?
            .unwrap_or(false),
        None => false,
    };

    Ok(CleanupConfig {
        mode: Mode::parse_input(args.mode.as_deref())?,
        push_on_complete,
    })
}

async fn parse(args: ParseArgs, store: &StateStore) -> Result<()> {
    let parsed = match &args.dir {
        None => parse_deployment_logs(store).await?,
        Some(dir) => {
            let infra = store
                .read_infra_for_current_job()
                .await?
                .ok_or_else(|| VnetError::Correlation {
                    job: store.context().job_basename(),
                })?;
            let groups = parse_log_dir(dir, &infra.networks).await?;
            ParsedDeployments::new(store.context(), groups)
        }
    };

    if args.write {
        store.store_parsed_deployments(&parsed).await?;
    }

    let json = serde_json::to_string_pretty(&parsed).context("Failed to serialize deployments")?;
    println!("{json}");

    Ok(())
}
