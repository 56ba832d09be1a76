use crate::utils::strip_formatting;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

lazy_static! {
    // "There are 2 of a max of 20 players online: Alice, Bob"
    // "There are 0 out of maximum 20 players online."
    static ref LIST_PATTERN: Regex =
        Regex::new(r"(\d+)\D+?(\d+)[^:]*(?::\s*(.*))?").unwrap();
    static ref DECIMAL_PATTERN: Regex = Regex::new(r"\d+(?:\.\d+)?").unwrap();
}

/// 在线玩家信息 (`list` 命令)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerList {
    pub current: u32,
    pub max: u32,
    pub online: BTreeSet<String>,
}

impl PlayerList {
    /// Best-effort parse of a `list` reply; `None` when the shape is unknown.
    pub fn parse(response: &str) -> Option<Self> {
        let text = strip_formatting(response);
        let caps = LIST_PATTERN.captures(text.trim())?;
        let current = caps[1].parse().ok()?;
        let max = caps[2].parse().ok()?;
        let online = caps
            .get(3)
            .map(|names| {
                names
                    .as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            current,
            max,
            online,
        })
    }
}

/// Ticks per second averaged over the last 1, 5 and 15 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tps {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

impl Tps {
    /// Reads the first three numbers after the `:` of the `TPS` line of a
    /// `tps` reply.
    ///
    /// Paper prefixes values above 20 with `*`, which is skipped like any
    /// other non-numeric text. Other lines (memory usage and the like) are
    /// ignored.
    pub fn parse(response: &str) -> Option<Self> {
        let text = strip_formatting(response);
        let line = text
            .lines()
            .find(|line| line.to_ascii_uppercase().contains("TPS"))
            .unwrap_or(text.as_str());
        let (_, samples) = line.rsplit_once(':')?;
        let mut values = DECIMAL_PATTERN
            .find_iter(samples)
            .filter_map(|m| m.as_str().parse::<f64>().ok());

        Some(Self {
            one_min: values.next()?,
            five_min: values.next()?,
            fifteen_min: values.next()?,
        })
    }

    pub fn samples(&self) -> [f64; 3] {
        [self.one_min, self.five_min, self.fifteen_min]
    }
}
