use arnet_peer::{Command, Connector, HandshakeConfig};
use serde_json::Value;
use tracing::debug;

use crate::cmd::{connector, parse_duration, runtime, Context, SendArgs};
use crate::exit::{connection_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::print_batch;

pub fn run(args: SendArgs, context: &Context) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let params = resolve_params(&args)?;
    let catalog = context.load_catalog()?;

    // Reject unknown paths and bad arguments before touching the network.
    Command::prepare(&catalog, &args.path, &params)
        .map_err(|err| connection_error("invalid command", err))?;

    let connector = connector(&args.device, catalog, |connector| {
        connector.with_handshake_config(HandshakeConfig {
            timeout: connect_timeout,
            ..HandshakeConfig::default()
        })
    })?;

    runtime()?.block_on(async move {
        let (handle, _events) = connector
            .connect()
            .await
            .map_err(|err| connection_error("connect failed", err))?;

        let response = handle
            .submit(&args.path, &params)
            .map_err(|err| connection_error("send failed", err))?;
        let outcome = tokio::time::timeout(wait_timeout, response).await;
        handle.close();
        let reason = handle.closed().await;
        debug!(%reason, "connection closed");

        let batch = outcome
            .map_err(|_| {
                CliError::new(
                    TIMEOUT,
                    format!("no response to {} within {wait_timeout:?}", args.path),
                )
            })?
            .map_err(|err| connection_error("command failed", err))?;
        print_batch(&args.path, &batch, context.format);
        Ok(SUCCESS)
    })
}

fn resolve_params(args: &SendArgs) -> CliResult<Value> {
    match &args.json {
        Some(json) => serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}"))),
        None => Ok(Value::Null),
    }
}
