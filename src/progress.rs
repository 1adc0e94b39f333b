//! Progress bar helpers shared by the long-running passes.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Standard progress bar for a pass over `len` items.
///
/// Observability only; pipeline correctness never depends on it.
pub fn bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg}\n[{elapsed_precise}] |{bar:40.cyan/blue}| {human_pos}/{human_len} \
                 [{per_sec}, ETA: {eta}]",
            )?
            .progress_chars("##-"),
    );
    Ok(pb)
}
