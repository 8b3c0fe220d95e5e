use anyhow::{Result, bail};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<start>\d+)\s*(?:\.\.=?|-)\s*(?P<end>\d+)$").expect("valid seed range regex")
});

/// Ranges wider than this are almost certainly a typo.
const MAX_RANGE_SPAN: u64 = 10_000;

/// Resolve CLI seed tokens into a deduplicated list, preserving first-seen order.
///
/// Accepts literal integers (negative values use their magnitude), hexadecimal
/// `0x…` literals and inclusive ranges written `a..b`, `a..=b` or `a-b`.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seen = BTreeSet::new();
    let mut seeds = Vec::new();
    let mut push = |seed: u64| {
        if seen.insert(seed) {
            seeds.push(seed);
        }
    };

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(caps) = RANGE.captures(token) {
            let start: u64 = caps["start"].parse()?;
            let end: u64 = caps["end"].parse()?;
            if end < start {
                bail!("Seed range {token} runs backwards");
            }
            if end - start > MAX_RANGE_SPAN {
                bail!("Seed range {token} spans more than {MAX_RANGE_SPAN} seeds");
            }
            for seed in start..=end {
                push(seed);
            }
            continue;
        }
        if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            push(u64::from_str_radix(hex, 16)?);
            continue;
        }
        if let Ok(value) = token.parse::<i64>() {
            push(value.unsigned_abs());
            continue;
        }
        if let Ok(value) = token.parse::<u64>() {
            push(value);
            continue;
        }
        bail!("Unrecognized seed token: {token}");
    }

    if seeds.is_empty() {
        seeds.push(1337);
    }
    Ok(seeds)
}
