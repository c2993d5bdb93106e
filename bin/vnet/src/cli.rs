use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use vnet_deploy::{API_BASE_URL, BoolInput, ProvisionInputs, RunContext};

#[derive(Parser)]
#[command(name = "vnet")]
#[command(
    author,
    version,
    about = "Provision Tenderly Virtual TestNets for the jobs of a CI/CD pipeline"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "VNET_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    #[clap(flatten)]
    pub run: RunArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// The workflow run the process belongs to, as published by the runner.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Unique id of the workflow run.
    #[arg(long, global = true, env = "GITHUB_RUN_ID", default_value_t = 0)]
    pub run_id: u64,

    /// Sequential number of the run within the workflow.
    #[arg(long, global = true, env = "GITHUB_RUN_NUMBER", default_value_t = 0)]
    pub run_number: u64,

    /// Name of the workflow.
    #[arg(long, global = true, env = "GITHUB_WORKFLOW", default_value = "")]
    pub workflow: String,

    /// Id of the job within the workflow.
    #[arg(long, global = true, env = "GITHUB_JOB", default_value = "")]
    pub job: String,

    /// Root of the checked-out repository.
    #[arg(long, global = true, env = "GITHUB_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,
}

impl RunArgs {
    pub fn to_context(&self) -> RunContext {
        RunContext {
            run_id: self.run_id,
            run_number: self.run_number,
            workflow: self.workflow.clone(),
            job: self.job.clone(),
            workspace: self.workspace.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Create one Virtual TestNet per network and export its connection details.
    Provision(ProvisionArgs),
    /// Pause the job's testnets (CI) or record its deployments (CD).
    Cleanup(CleanupArgs),
    /// Print the deployments found in the job's build logs.
    Parse(ParseArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ProvisionArgs {
    /// Tenderly access key.
    #[arg(long, env = "INPUT_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Tenderly account name.
    #[arg(long, env = "INPUT_ACCOUNT_NAME")]
    pub account_name: Option<String>,

    /// Tenderly project name.
    #[arg(long, env = "INPUT_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Display name of the testnets.
    #[arg(long, env = "INPUT_TESTNET_NAME")]
    pub testnet_name: Option<String>,

    /// Networks to fork, one testnet each. Repeat the flag or separate with newlines.
    #[arg(long = "network-id", env = "INPUT_NETWORK_ID", value_delimiter = '\n')]
    pub network_ids: Vec<String>,

    /// Block to fork from.
    #[arg(long, env = "INPUT_BLOCK_NUMBER")]
    pub block_number: Option<String>,

    /// Digits prepended to each network id to form the testnet chain id.
    #[arg(long, env = "INPUT_CHAIN_ID_PREFIX")]
    pub chain_id_prefix: Option<String>,

    /// Keep the testnet state in sync with its source network.
    #[arg(long, env = "INPUT_STATE_SYNC")]
    pub state_sync: Option<String>,

    /// Expose the testnet in the public explorer.
    #[arg(long, env = "INPUT_PUBLIC_EXPLORER")]
    pub public_explorer: Option<String>,

    /// Explorer visibility of verified contracts: bytecode, abi or src.
    #[arg(long, env = "INPUT_VERIFICATION_VISIBILITY")]
    pub verification_visibility: Option<String>,

    /// Pipeline mode: CI or CD.
    #[arg(long, env = "INPUT_MODE")]
    pub mode: Option<String>,

    /// Optional TOML file with default inputs. Flags and env values take precedence.
    #[arg(long, alias = "conf", env = "VNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the Tenderly API.
    #[arg(long, env = "VNET_API_URL", default_value = API_BASE_URL)]
    pub api_url: String,

    /// File the exported variables are appended to.
    #[arg(long, env = "GITHUB_ENV")]
    pub github_env: Option<PathBuf>,
}

impl ProvisionArgs {
    /// The inputs given on the command line, blank values left out.
    pub fn to_inputs(&self) -> ProvisionInputs {
        let text = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());

        ProvisionInputs {
            access_key: text(&self.access_key),
            account_name: text(&self.account_name),
            project_name: text(&self.project_name),
            testnet_name: text(&self.testnet_name),
            network_ids: self
                .network_ids
                .iter()
                .filter(|id| !id.trim().is_empty())
                .cloned()
                .collect(),
            block_number: text(&self.block_number),
            chain_id_prefix: text(&self.chain_id_prefix),
            state_sync: text(&self.state_sync).map(BoolInput::from),
            public_explorer: text(&self.public_explorer).map(BoolInput::from),
            verification_visibility: text(&self.verification_visibility),
            mode: text(&self.mode),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CleanupArgs {
    /// Pipeline mode: CI or CD.
    #[arg(long, env = "INPUT_MODE")]
    pub mode: Option<String>,

    /// Tenderly access key.
    #[arg(long, env = "INPUT_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Tenderly account name, as exported by `provision`.
    #[arg(long, env = "TENDERLY_ACCOUNT_NAME")]
    pub account_name: Option<String>,

    /// Tenderly project name, as exported by `provision`.
    #[arg(long, env = "TENDERLY_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Commit and push the deployment records in CD mode.
    #[arg(long, env = "INPUT_PUSH_ON_COMPLETE")]
    pub push_on_complete: Option<String>,

    /// Token used to push.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
    pub server_url: String,

    /// `owner/name` of the repository.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// Base URL of the Tenderly API.
    #[arg(long, env = "VNET_API_URL", default_value = API_BASE_URL)]
    pub api_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct ParseArgs {
    /// Directory of build logs. Defaults to the job's build output directory.
    pub dir: Option<PathBuf>,

    /// Also persist the result as the job's deployment record.
    #[arg(long)]
    pub write: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provision_flags() {
        let cli = Cli::try_parse_from([
            "vnet",
            "--run-number",
            "42",
            "--job",
            "test",
            "provision",
            "--access-key",
            "key",
            "--network-id",
            "1\n137",
            "--network-id",
            "10",
            "--public-explorer",
            "true",
            "--state-sync",
            "",
        ])
        .unwrap();

        assert_eq!(cli.run.run_number, 42);
        let Command::Provision(args) = cli.command else {
            panic!("expected the provision command");
        };

        let inputs = args.to_inputs();
        assert_eq!(inputs.access_key.as_deref(), Some("key"));
        assert_eq!(inputs.network_ids, vec!["1", "137", "10"]);
        assert_eq!(inputs.public_explorer, Some(BoolInput::Text("true".to_string())));
        assert_eq!(inputs.state_sync, None);
        assert_eq!(inputs.account_name, None);
    }

    #[test]
    fn test_run_args_after_subcommand() {
        let cli = Cli::try_parse_from(["vnet", "cleanup", "--run-id", "7", "--workflow", "CI"])
            .unwrap();
        let ctx = cli.run.to_context();
        assert_eq!(ctx.run_id, 7);
        assert_eq!(ctx.workflow, "CI");
    }
}
