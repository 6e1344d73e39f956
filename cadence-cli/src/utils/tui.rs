use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

/// Await `task` behind a spinner on stderr. With `quiet` no spinner is drawn.
pub async fn spin_while<T>(message: String, quiet: bool, task: impl Future<Output = T>) -> T {
    if quiet {
        return task.await;
    }

    let spinner = ProgressBar::new_spinner().with_message(message);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
    }
    spinner.enable_steady_tick(TICK);

    let output = task.await;
    spinner.finish_and_clear();
    output
}
