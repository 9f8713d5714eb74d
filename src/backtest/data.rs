//! Historical price loading for backtesting.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One observed price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// Time-ordered price series from a single venue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, sorting points by timestamp (stable for equal times).
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self { points }
    }

    /// Load from a `timestamp,price` CSV file.
    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        Self::from_csv_content(&content)
            .with_context(|| format!("Failed to load price series from {}", path.display()))
    }

    /// Load from CSV content.
    ///
    /// Expected format:
    /// ```csv
    /// timestamp,price
    /// 2024-01-01T00:00:00Z,42000.50
    /// ```
    pub fn from_csv_content(content: &str) -> Result<Self> {
        let mut points = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            // Skip header
            if line_num == 0 && line.trim_start().starts_with("timestamp") {
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            let point = parse_row(line)
                .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))?;
            points.push(point);
        }

        if points.is_empty() {
            anyhow::bail!("CSV file contains no data rows");
        }

        Ok(Self::new(points))
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First and last timestamps.
    pub fn range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

fn parse_row(line: &str) -> Result<PricePoint> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 2 {
        anyhow::bail!("Expected 2 columns (timestamp,price), got {}", parts.len());
    }

    let timestamp = parse_timestamp(parts[0].trim())?;
    let price: Decimal = parts[1]
        .trim()
        .parse()
        .with_context(|| format!("Invalid price: {}", parts[1]))?;

    Ok(PricePoint { timestamp, price })
}

/// Parse RFC 3339, naive date-times (taken as UTC), plain dates or Unix seconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    if let Ok(secs) = raw.parse::<i64>() {
        if let Some(ts) = DateTime::from_timestamp(secs, 0) {
            return Ok(ts);
        }
    }

    anyhow::bail!("Invalid timestamp: {}", raw)
}
