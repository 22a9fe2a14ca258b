//! Cycle walk-back URL expansion.
//!
//! Run files live under TDS paths whose words encode the cycle, the
//! instance and the ensemble:
//!
//! `https://.../dodsC/2021/nam/{cycle}/{grid}/{machine}/{instance}/{ensemble}/fort.63.nc`
//!
//! Given one such template URL, this module derives sibling URLs for
//! the 6-hourly cycles reaching back `ndays` days, substituting the
//! requested ensemble (a forecast URL can thus be expanded into its
//! preceding nowcast cycles). Hurricane runs put an advisory number
//! where the cycle stamp goes and step by advisory instead.
//!
//! URLs that do not exist remotely are cheap to tolerate; the fetch
//! layer skips them per source.

use chrono::{DateTime, Duration, Timelike, Utc};

use surge_common::time::{format_cycle, parse_cycle};

/// Hours of the day at which model cycles are produced.
const CYCLE_HOURS: [u32; 4] = [0, 6, 12, 18];

/// Path-word offsets from the end of a TDS run URL.
const WORD_CYCLE: usize = 6;
const WORD_ENSEMBLE: usize = 2;

/// The cycle (or advisory) word embedded in a template URL.
pub fn cycle_word(url: &str) -> Option<&str> {
    let words: Vec<&str> = url.split('/').collect();
    if words.len() < WORD_CYCLE {
        return None;
    }
    Some(words[words.len() - WORD_CYCLE])
}

/// Expand a template URL into the list of sibling-cycle URLs covering
/// an `ndays` look-back (negative = back in time), with the given
/// ensemble substituted. The input cycle itself is always included and
/// the result is ordered oldest first with duplicates removed.
pub fn expand_lookback(url: &str, ensemble: &str, ndays: i64) -> Vec<String> {
    let Some(stamp) = cycle_word(url) else {
        return vec![url.to_string()];
    };

    let stamps = match parse_cycle(stamp) {
        Some(stop) => cycle_steps(stop, ndays),
        // Not a cycle stamp, so a hurricane advisory number
        None => match stamp.parse::<i64>() {
            Ok(advisory) => advisory_steps(advisory, ndays),
            Err(_) => return vec![url.to_string()],
        },
    };

    let mut urls: Vec<String> = Vec::with_capacity(stamps.len());
    for stamp in &stamps {
        let rewritten = substitute_words(url, stamp, ensemble);
        if !urls.contains(&rewritten) {
            urls.push(rewritten);
        }
    }
    urls
}

/// 6-hourly cycle stamps from `stop + ndays` through `stop`, inclusive.
///
/// Only the 00/06/12/18Z marks qualify, but the stop cycle is kept even
/// when it falls off the marks.
fn cycle_steps(stop: DateTime<Utc>, ndays: i64) -> Vec<String> {
    let mut start = stop + Duration::days(ndays);
    let mut stop = stop;
    if start > stop {
        std::mem::swap(&mut start, &mut stop);
    }

    let mut stamps: Vec<String> = Vec::new();
    let mut t = start;
    while t <= stop {
        if CYCLE_HOURS.contains(&t.hour()) {
            stamps.push(format_cycle(&t));
        }
        t += Duration::hours(1);
    }
    stamps.push(format_cycle(&stop));

    stamps.sort();
    stamps.dedup();
    stamps
}

/// Advisory steps assuming one advisory per 6 hours; negative advisories
/// are dropped and the stop advisory is always kept.
fn advisory_steps(stop: i64, ndays: i64) -> Vec<String> {
    let look_asides = 24 * ndays / 6;
    let (lo, hi) = if look_asides < 0 {
        (stop + look_asides, stop)
    } else {
        (stop, stop + look_asides)
    };

    let mut stamps: Vec<String> = (lo..hi)
        .filter(|adv| *adv >= 0)
        .map(|adv| format!("{:02}", adv))
        .collect();
    stamps.push(format!("{:02}", stop));

    stamps.sort();
    stamps.dedup();
    stamps
}

fn substitute_words(url: &str, stamp: &str, ensemble: &str) -> String {
    let mut words: Vec<&str> = url.split('/').collect();
    let n = words.len();
    words[n - WORD_CYCLE] = stamp;
    words[n - WORD_ENSEMBLE] = ensemble;
    words.join("/")
}
