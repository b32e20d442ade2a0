//! Canonical sample rate strings (`"200 kHz"`, `"1.5 MHz"`).

const PREFIXES: [&str; 7] = ["", "k", "M", "G", "T", "P", "E"];

/// Format a value with the largest SI prefix that keeps the integer part
/// below 1000, trimming trailing zeros from the fraction.
pub fn si_string(value: u64, unit: &str) -> String {
    let mut exponent = 0usize;
    let mut divisor = 1u64;
    while exponent + 1 < PREFIXES.len() && value / divisor >= 1000 {
        divisor *= 1000;
        exponent += 1;
    }

    let quotient = value / divisor;
    let mut fraction = String::new();
    if exponent > 0 {
        let digits = format!("{:0width$}", value % divisor, width = exponent * 3);
        let trimmed = digits.trim_end_matches('0');
        if !trimmed.is_empty() {
            fraction = format!(".{trimmed}");
        }
    }

    format!("{quotient}{fraction} {}{unit}", PREFIXES[exponent])
}

/// Format a sample rate in Hz
pub fn samplerate_string(rate: u64) -> String {
    si_string(rate, "Hz")
}
