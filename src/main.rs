mod config;
mod db;
mod grid;
mod ipc;
mod logging;
mod persist;

use grid::SaveTrigger;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d)).await,
        None => std::future::pending::<()>().await,
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, value: &serde_json::Value) -> std::io::Result<()> {
    let mut line = serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env();
    logging::init(&config);
    info!(
        debounce_ms = config.autosave.debounce_ms(),
        saved_display_ms = config.autosave.saved_display_ms(),
        "attendanced starting"
    );

    let mut state = ipc::AppState::new(config);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<ipc::autosave::SaveDone>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let deadline = ipc::autosave::next_deadline(&state);
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(v)) => v,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let resp = match serde_json::from_str::<ipc::Request>(&line) {
                    Ok(req) => ipc::handle_request(&mut state, req),
                    // Can't reply without id.
                    Err(e) => serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                };
                if let Err(e) = write_line(&mut stdout, &resp).await {
                    error!(error = %e, "stdout write failed");
                    break;
                }
            }
            Some(done) = done_rx.recv() => {
                ipc::autosave::apply(&mut state, done, Instant::now());
            }
            _ = sleep_until(deadline) => {
                if let Some(job) = ipc::autosave::poll_due(&mut state, Instant::now()) {
                    let tx = done_tx.clone();
                    let ticket = job.ticket();
                    let handle = tokio::task::spawn_blocking(move || job.run());
                    tokio::spawn(async move {
                        match handle.await {
                            Ok(done) => {
                                let _ = tx.send(done);
                            }
                            Err(e) => {
                                warn!(batch = ticket.batch_id, error = %e, "autosave task aborted");
                                let _ = tx.send(ipc::autosave::SaveDone {
                                    ticket,
                                    trigger: SaveTrigger::Auto,
                                    result: Err(format!("save task aborted: {e}")),
                                });
                            }
                        }
                    });
                }
            }
        }
    }

    state.editor.close();
    info!("attendanced stopped");
    Ok(())
}
