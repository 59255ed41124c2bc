use std::{env, path::PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::types::{OrganizationId, PackageId, PeriodYear, TierId};

const USAGE: &str = "usage: entitlements [--config <path>] --organization <id> --tier <id> [--package <id>] [--year <yyyy>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub organization_id: OrganizationId,
    pub tier_id: TierId,
    pub package_id: Option<PackageId>,
    /// Overrides `evaluation.target_year` from the config.
    pub target_year: Option<PeriodYear>,
}

pub fn args_from_env() -> Result<CliArgs> {
    parse_args(env::args().skip(1))
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut organization_id = None;
    let mut tier_id = None;
    let mut package_id = None;
    let mut target_year = None;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| anyhow!("missing value for {flag}"))
        };
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(value("--config")?)),
            "--organization" => organization_id = Some(value("--organization")?),
            "--tier" => tier_id = Some(value("--tier")?),
            "--package" => package_id = Some(value("--package")?),
            "--year" => {
                let raw = value("--year")?;
                let year = raw
                    .parse::<PeriodYear>()
                    .with_context(|| format!("invalid --year '{raw}'"))?;
                target_year = Some(year);
            }
            other => return Err(anyhow!("unknown argument: {other}. {USAGE}")),
        }
    }

    Ok(CliArgs {
        config_path: config_path.unwrap_or_else(|| PathBuf::from("./entitlements.jsonc")),
        organization_id: organization_id
            .ok_or_else(|| anyhow!("missing --organization. {USAGE}"))?,
        tier_id: tier_id.ok_or_else(|| anyhow!("missing --tier. {USAGE}"))?,
        package_id,
        target_year,
    })
}
