use anyhow::{Context, Result, bail};
use common::Tick;
use regex::Regex;

// A throttle profile holds the stick at `value` from `tick` on, until the next point.
// File format is one `tick, value` pair per line; blank lines and `#` comments are skipped.
#[derive(Debug)]
pub struct Profile {
    points: Vec<(Tick, i8)>,
}

impl Profile {
    pub fn constant(value: i8) -> Self {
        Self {
            points: vec![(0, value)],
        }
    }

    /// Stick position at `now`. Neutral before the first point.
    pub fn value_at(&self, now: Tick) -> i8 {
        let upto = self.points.partition_point(|&(tick, _)| tick <= now);
        match upto {
            0 => 0,
            n => self.points[n - 1].1,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

pub fn parse_profile(file: &str) -> Result<Profile> {
    let r = Regex::new(r"^\s*(\d+)\s*,\s*(-?\d+)\s*$")?;
    let mut points: Vec<(Tick, i8)> = Vec::new();

    for (lineno, line) in file.lines().enumerate().map(|(i, l)| (i + 1, l)) {
        let line = line.split('#').next().unwrap_or_default();
        if line.trim().is_empty() {
            continue;
        }
        let Some(captures) = r.captures(line) else {
            bail!("line {lineno}: expected `tick, value`, got `{line}`");
        };
        let tick: Tick = captures[1]
            .parse()
            .with_context(|| format!("line {lineno}: tick"))?;
        let value: i8 = captures[2]
            .parse()
            .with_context(|| format!("line {lineno}: throttle must be in -128..=127"))?;

        if let Some(&(last, _)) = points.last() {
            if tick < last {
                bail!("line {lineno}: tick {tick} goes back from {last}");
            }
        }
        points.push((tick, value));
    }

    if points.is_empty() {
        bail!("profile has no points");
    }
    Ok(Profile { points })
}
