//! CSV lines for plotting a run.

use std::fmt::Write;

use tokio::time::Instant;

use crate::stats::Stats;

/// Column names, in the order every data row uses.
pub const HEADER: &str = "\"time\",\"last_packet\",\"rtt\",\"rttvar\",\"pps\",\"pps_accepted\",\"sent\",\"received\",\"ema_backlog\",\"max_backlog\",\"usec\",\"10us\",\"100us\",\"ms\",\"10ms\",\"100ms\",\"s\",\"10s\"\n";

/// One data row for `stats` as of `now`.
///
/// `time` and `last_packet` are seconds since the run started.
pub fn data_row(stats: &Stats, now: Instant) -> String {
    let time = stats.elapsed(now).as_secs_f64();
    let last_packet = stats
        .last_send
        .map(|last_send| stats.elapsed(last_send).as_secs_f64())
        .unwrap_or_default();

    let mut row = format!(
        "{:.6},{:.6},{},{},{},{},{},{},{},{}",
        time,
        last_packet,
        stats.rtt,
        stats.rttvar,
        stats.pps,
        stats.pps_accepted,
        stats.sent,
        stats.received,
        stats.backlog_ema,
        stats.max_backlog,
    );
    for count in stats.histogram.counts() {
        // Writing to a String can't fail.
        let _ = write!(row, ",{count}");
    }
    row.push('\n');

    row
}
