//! Response scraping helpers
//!
//! Everything here is a pure function over page text so it can be tested
//! against saved fixture pages.

use super::types::{Keyword, KeywordStats, KEYWORD_FIELD_SEPARATOR};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Decode `\xNN` escapes from a JavaScript string literal
pub fn unescape_js(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;

    while let Some(pos) = rest.find("\\x") {
        out.push_str(&rest[..pos]);
        let hex = rest.get(pos + 2..pos + 4);
        match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(code) => {
                out.push(code as char);
                rest = &rest[pos + 4..];
            }
            None => {
                out.push_str("\\x");
                rest = &rest[pos + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the handful of entities the remote emits inside element text
pub fn decode_html_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Split a destination URL into the creative form's protocol and remainder
pub fn split_destination(url: &str) -> (&'static str, &str) {
    let protocol = if url.starts_with("https://") {
        "https://"
    } else {
        "http://"
    };
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    (protocol, rest)
}

/// Parse the keyword editor textarea
///
/// Lines are `text[ ** bid][ ** url]`; a second segment that is not a number
/// is taken as the URL. Blank lines are skipped.
pub fn parse_keyword_lines(text: &str) -> Vec<Keyword> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.split(KEYWORD_FIELD_SEPARATOR);
            let mut keyword = Keyword::new(parts.next().unwrap_or_default());
            if let Some(second) = parts.next() {
                match Decimal::from_str(second.trim()) {
                    Ok(bid) => keyword.bid = Some(bid),
                    Err(_) => keyword.url = Some(second.to_string()),
                }
            }
            if let Some(third) = parts.next() {
                keyword.url = Some(third.to_string());
            }
            keyword
        })
        .collect()
}

/// Join keywords in the editor's line format
pub fn join_keyword_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// `-` or empty means "not available"
fn parse_amount(cell: &str) -> Option<Decimal> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%'))
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

fn parse_count(cell: &str) -> Result<u64, String> {
    let cleaned: String = cell.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || cleaned == "-" {
        return Ok(0);
    }
    cleaned
        .parse()
        .map_err(|_| format!("bad count cell '{}'", cell.trim()))
}

/// Parse every keyword row of one report page
pub fn parse_report_page(page: &str) -> Result<Vec<(String, KeywordStats)>, String> {
    let row_re = Regex::new(r#"(?s)<tr[^>]*?id="tr_\d+"[^>]*?>(?P<row>.*?)</tr>"#)
        .map_err(|e| e.to_string())?;
    let keyword_re = Regex::new(r"(?s)</div>\s*</span>\s*(?P<keyword>[^<]+?)\s*</td>")
        .map_err(|e| e.to_string())?;
    let bid_re = Regex::new(r#"(?s)<td nowrap align="center" colspan="2">\s*(?P<bid>[^<]*?)\s*</td>"#)
        .map_err(|e| e.to_string())?;
    let metric_re = Regex::new(r#"(?s)<td class="(?:|rightcolumn)" align="right">\s*(?P<value>[^\s<]*)"#)
        .map_err(|e| e.to_string())?;

    let mut rows = Vec::new();
    for row in row_re.captures_iter(page) {
        let row = &row["row"];

        let keyword = keyword_re
            .captures(row)
            .map(|c| decode_html_entities(c["keyword"].trim()))
            .ok_or_else(|| "report row without keyword cell".to_string())?;

        let bid = bid_re.captures(row).and_then(|c| parse_amount(&c["bid"]));

        let metrics: Vec<&str> = metric_re
            .captures_iter(row)
            .filter_map(|c| c.name("value").map(|m| m.as_str()))
            .collect();
        if metrics.len() < 6 {
            return Err(format!(
                "report row for '{}' has {} metric cells, expected 6",
                keyword,
                metrics.len()
            ));
        }

        rows.push((
            keyword,
            KeywordStats {
                bid,
                clicks: parse_count(metrics[0])?,
                impressions: parse_count(metrics[1])?,
                ctr: parse_amount(metrics[2]),
                cpc: parse_amount(metrics[3]),
                cost: parse_amount(metrics[4]),
                avg_position: parse_amount(metrics[5]),
            },
        ));
    }

    Ok(rows)
}

/// Relative href of the "Next" pager link, entity-decoded
pub fn next_page_link(page: &str) -> Option<String> {
    let re = Regex::new(r#"<a href="(?P<url>[^"]+?)"><b>Next"#).ok()?;
    re.captures(page)
        .map(|c| c["url"].replace("&amp;", "&"))
}
