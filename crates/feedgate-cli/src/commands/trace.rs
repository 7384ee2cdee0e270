use std::process::ExitCode;

use crate::error::CliError;
use crate::output;

pub async fn run(pretty: bool) -> Result<ExitCode, CliError> {
    let gateway = super::build_gateway()?;
    gateway.prewarm_all().await;
    output::render(&gateway.trace(), pretty)?;
    Ok(ExitCode::SUCCESS)
}
