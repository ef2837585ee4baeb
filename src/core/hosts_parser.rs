use crate::domain::model::HostsLine;
use regex::Regex;
use std::sync::LazyLock;

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").unwrap());

// 簡化版：剛好 8 組，不支援 `::` 縮寫
static IPV6: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}$").unwrap());

pub fn is_valid_address(token: &str) -> bool {
    if let Some(caps) = IPV4.captures(token) {
        return caps
            .iter()
            .skip(1)
            .flatten()
            .all(|octet| octet.as_str().parse::<u16>().is_ok_and(|n| n <= 255));
    }
    IPV6.is_match(token)
}

/// Parses hosts-file text into validated lines.
///
/// Blank lines, `#` comments, lines without a hostname and lines whose
/// first token is not an address are dropped. Order is preserved and
/// nothing is deduplicated.
pub fn parse(text: &str) -> Vec<HostsLine> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| {
            let mut tokens = line.split_whitespace();
            let address_ok = tokens.next().is_some_and(is_valid_address);
            address_ok && tokens.next().is_some()
        })
        .map(|line| HostsLine::new_unchecked(line.to_string()))
        .collect()
}
