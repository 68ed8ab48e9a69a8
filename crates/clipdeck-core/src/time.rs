//! Time display helpers

/// Format seconds as `MM:SS:cc` (minutes, seconds, hundredths) for playhead display
pub fn format_time(secs: f64) -> String {
    let total = (secs.max(0.0) * 100.0).round() as u64;
    let mins = total / 6000;
    let whole = (total / 100) % 60;
    let hundredths = total % 100;
    format!("{:02}:{:02}:{:02}", mins, whole, hundredths)
}
