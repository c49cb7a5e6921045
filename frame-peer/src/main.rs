use std::process::ExitCode;

use frame_peer::{logging, ChannelOptions, Config, FramedChannel};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("frame-peer: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "./config.toml".into());
    let (config, found) = Config::load(&path)?;

    let _log_guard = logging::init_log(config.log_dir.as_deref(), &config.log_level)?;
    if !found {
        tracing::info!("{path} not found, using default settings");
    }

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    ctrlc2::set_async_handler(async move {
        cancel_on_signal.cancel();
    })
    .await;

    let options = ChannelOptions {
        max_frame_length: config.max_frame_length.map(|max| max as usize),
        reply_timeout: config.reply_timeout(),
        on_invalid_utf8: config.on_invalid_utf8,
    };

    let channel = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Stopped by user.");
            return Ok(ExitCode::SUCCESS);
        }
        r = FramedChannel::connect(&config.host, config.port, options) => match r {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!("Connection failed or was reset by server: {e}");
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    let report = channel
        .run_loop(&config.message, config.interval(), &cancel)
        .await;
    if report.termination.is_graceful() {
        tracing::info!("{} ({} exchanges)", report.termination, report.exchanges);
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("{} ({} exchanges)", report.termination, report.exchanges);
        Ok(ExitCode::FAILURE)
    }
}
