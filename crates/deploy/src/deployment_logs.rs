//! Parser for the deployment and verification narration printed by build tools.
//!
//! A log is scanned line by line. Everything before the `##` section marker is
//! ignored. Inside the section, each line is matched against [`TRIGGERS`]; the
//! first trigger whose phrase appears in the line extracts its fields into the
//! contract being built. A `start verifying contract` line closes the current
//! contract and opens the next one.

use std::{
    io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::Context;
use regex::Regex;

use crate::{
    Contract, DeploymentGroup, Networks, ParsedDeployments, StateStore,
    error::{self, Result, VnetError},
};

/// Line that opens the deployment section of a log.
const SECTION_MARKER: &str = "##";

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`(0x[a-fA-F0-9]+)`").expect("valid address pattern"));
static CHAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)deployed on (\d+)").expect("valid chain pattern"));
static TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]").expect("valid target pattern"));
static RESPONSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Response: `(.+)`").expect("valid response pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Inside,
}

/// A matched log line.
struct Line<'a> {
    text: &'a str,
    /// Text following the trigger phrase.
    rest: &'a str,
    next: Option<&'a str>,
}

type Extract = fn(&mut Contract, &Line<'_>);

enum Action {
    /// Close the current contract, then extract into a fresh one.
    Open(Extract),
    /// Extract into the current contract.
    Update(Extract),
}

struct Trigger {
    /// Lower-case phrase, matched case-insensitively.
    phrase: &'static str,
    action: Action,
}

const TRIGGERS: &[Trigger] = &[
    Trigger {
        phrase: "start verifying contract",
        action: Action::Open(extract_deployment),
    },
    Trigger {
        phrase: "compiler version:",
        action: Action::Update(extract_compiler),
    },
    Trigger {
        phrase: "optimizations:",
        action: Action::Update(extract_optimizations),
    },
    Trigger {
        phrase: "submitting verification for",
        action: Action::Update(extract_target),
    },
    Trigger {
        phrase: "contract verification status:",
        action: Action::Update(extract_verification_status),
    },
];

impl Trigger {
    /// The first trigger found in `line`, with the text following its phrase.
    fn matching(line: &str) -> Option<(&'static Trigger, &str)> {
        // ASCII lower-casing keeps byte offsets, so indices carry over to `line`.
        let lower = line.to_ascii_lowercase();
        TRIGGERS.iter().find_map(|trigger| {
            lower
                .find(trigger.phrase)
                .map(|at| (trigger, &line[at + trigger.phrase.len()..]))
        })
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_deployment(contract: &mut Contract, line: &Line<'_>) {
    contract.address = capture(&ADDRESS, line.text);
    contract.chain = capture(&CHAIN, line.text);
}

fn extract_compiler(contract: &mut Contract, line: &Line<'_>) {
    let compiler = line.rest.trim();
    contract.compiler = (!compiler.is_empty()).then(|| compiler.to_string());
}

fn extract_optimizations(contract: &mut Contract, line: &Line<'_>) {
    let rest = line.rest.trim_start();
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .map_or(rest, |end| &rest[..end]);
    contract.optimizations = digits.parse().ok();
}

fn extract_target(contract: &mut Contract, line: &Line<'_>) {
    let Some(target) = capture(&TARGET, line.text) else {
        return;
    };
    // `path:name`; segments after the name are ignored.
    let mut parts = target.split(':');
    contract.contract_path = parts.next().map(str::to_string);
    contract.contract_name = parts.next().map(str::to_string);
}

fn extract_verification_status(contract: &mut Contract, line: &Line<'_>) {
    contract.verification_status = line.next.and_then(|next| capture(&RESPONSE, next));
}

/// Move `current` into `contracts` unless nothing was recorded for it.
fn close(current: &mut Contract, contracts: &mut Vec<Contract>) {
    let contract = std::mem::take(current);
    if !contract.is_empty() {
        contracts.push(contract);
    }
}

/// Extract every contract narrated in `log`, in order of appearance.
pub fn parse_contracts(log: &str) -> Vec<Contract> {
    let lines: Vec<&str> = log.lines().collect();
    let mut section = Section::Outside;
    let mut current = Contract::default();
    let mut contracts = Vec::new();

    for (index, &text) in lines.iter().enumerate() {
        if section == Section::Outside {
            if text.trim() == SECTION_MARKER {
                section = Section::Inside;
            }
            continue;
        }

        let Some((trigger, rest)) = Trigger::matching(text) else {
            continue;
        };
        let line = Line {
            text,
            rest,
            next: lines.get(index + 1).copied(),
        };

        match trigger.action {
            Action::Open(extract) => {
                close(&mut current, &mut contracts);
                extract(&mut current, &line);
            }
            Action::Update(extract) => extract(&mut current, &line),
        }
    }

    close(&mut current, &mut contracts);
    contracts
}

/// Attribute contracts to the network whose chain id they were deployed on.
///
/// Groups follow the order in which their first contract appears. Contracts on
/// unknown chains are dropped.
pub fn group_by_network(contracts: Vec<Contract>, networks: &Networks) -> Vec<DeploymentGroup> {
    let mut groups: Vec<(&str, DeploymentGroup)> = Vec::new();

    for contract in contracts {
        let matched = networks.iter().find(|(_, network)| {
            contract.chain.as_deref() == Some(network.chain_id.to_string().as_str())
        });
        let Some((key, network)) = matched else {
            tracing::debug!(
                address = ?contract.address,
                chain = ?contract.chain,
                "Contract was not deployed on a provisioned network, skipping"
            );
            continue;
        };

        match groups.iter_mut().find(|(group_key, _)| *group_key == key.as_str()) {
            Some((_, group)) => group.contracts.push(contract),
            None => groups.push((
                key.as_str(),
                DeploymentGroup {
                    virtual_test_net: network.clone(),
                    contracts: vec![contract],
                },
            )),
        }
    }

    for (key, network) in networks.iter() {
        let count = groups
            .iter()
            .find(|(group_key, _)| *group_key == key.as_str())
            .map_or(0, |(_, group)| group.contracts.len());
        tracing::info!(
            network_id = %key,
            chain_id = network.chain_id,
            deployments = count,
            "Matched deployments"
        );
    }

    groups.into_iter().map(|(_, group)| group).collect()
}

/// Parse every `*.json` log in `dir`, in file name order.
///
/// A missing directory holds no deployments. Files that cannot be read are
/// reported and skipped.
pub async fn parse_log_dir(dir: &Path, networks: &Networks) -> Result<Vec<DeploymentGroup>> {
    let mut groups = Vec::new();

    for path in log_files(dir).await? {
        let read = tokio::fs::read_to_string(&path)
            .await
            .context("Failed to read build log")
            .map_err(|err| VnetError::persistence(&path, err));
        let Some(content) = error::recover(read)? else {
            continue;
        };

        let contracts = parse_contracts(&content);
        tracing::debug!(path = %path.display(), contracts = contracts.len(), "Parsed build log");
        groups.extend(group_by_network(contracts, networks));
    }

    Ok(groups)
}

async fn log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let listing_failed = |err: io::Error| {
        VnetError::persistence(
            dir,
            anyhow::Error::new(err).context("Failed to list build logs"),
        )
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %dir.display(), "No build output directory");
            return Ok(Vec::new());
        }
        Err(err) => return Err(listing_failed(err)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_failed)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Parse the build logs of the current job and attribute them to its networks.
///
/// Fails with [`VnetError::Correlation`] when the job has no infrastructure record.
pub async fn parse_deployment_logs(store: &StateStore) -> Result<ParsedDeployments> {
    let infra = store
        .read_infra_for_current_job()
        .await?
        .ok_or_else(|| VnetError::Correlation {
            job: store.context().job_basename(),
        })?;

    let deployments = parse_log_dir(&store.build_output_dir(), &infra.networks).await?;

    Ok(ParsedDeployments::new(store.context(), deployments))
}
