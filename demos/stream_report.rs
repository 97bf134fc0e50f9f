use report_stream::{ClientConfig, ReportClient, StreamController, StreamNotice};
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_TASK: &str = "Compare the latest quarterly results of the top three EV makers";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = report_stream::logger::init_logging()?;

    let task = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_TASK.to_string());

    let config = ClientConfig::load()?;
    let client = Arc::new(ReportClient::new(&config)?);
    let controller = Arc::new(StreamController::new());
    let mut notices = controller.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            let notice = match notices.recv().await {
                Ok(notice) => notice,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match notice {
                StreamNotice::OutputsChanged { outputs, .. } => {
                    if let Some(last) = outputs.last() {
                        println!("[outputs] {} stage(s), last: {}", outputs.len(), last.stage);
                    }
                }
                StreamNotice::Alert { message, .. } => println!("[alert] {message}"),
                StreamNotice::StateChanged { state, .. } => {
                    println!("[state] {state:?}");
                    if state.is_terminal() {
                        break;
                    }
                }
            }
        }
    });

    // Ctrl-C aborts the transport; the loop then ends as Failed.
    let (handle, join) = controller.spawn_submit(client, &task)?;
    let abort_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_handle.abort();
        }
    });

    let summary = join.await?;
    let _ = printer.await;

    println!(
        "\n=== {:?} ({} frames, {} dropped) ===",
        summary.state, summary.frames, summary.dropped
    );
    for output in controller.snapshot() {
        println!("\n## {}\n\n{}", output.stage, output.content);
    }

    Ok(())
}
