/// Export price table and cost helpers.
///
/// Bundle prices (full jersey, full jersey with collar) are published
/// constants and are cheaper than the sum of their parts; they are never
/// derived from the per-part prices.
use jersey_studio_config::JerseyView;
use serde::Serialize;

use crate::error::LedgerError;

/// Point cost of each export.
pub struct PointCosts;

impl PointCosts {
    pub const FRONT_IMAGE: u64 = 1;
    pub const BACK_IMAGE: u64 = 2;
    /// Per sleeve.
    pub const SLEEVE: u64 = 1;
    pub const COLLAR: u64 = 1;
    /// Front + back + 2 sleeves.
    pub const FULL_JERSEY: u64 = 4;
    /// Front + back + 2 sleeves + collar.
    pub const FULL_JERSEY_WITH_COLLAR: u64 = 5;
}

/// A priced export unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportKind {
    Front,
    Back,
    Sleeve,
    Collar,
    FullJersey,
    FullJerseyWithCollar,
}

impl ExportKind {
    pub fn cost(self) -> u64 {
        match self {
            ExportKind::Front => PointCosts::FRONT_IMAGE,
            ExportKind::Back => PointCosts::BACK_IMAGE,
            ExportKind::Sleeve => PointCosts::SLEEVE,
            ExportKind::Collar => PointCosts::COLLAR,
            ExportKind::FullJersey => PointCosts::FULL_JERSEY,
            ExportKind::FullJerseyWithCollar => PointCosts::FULL_JERSEY_WITH_COLLAR,
        }
    }

    /// The single-part export for a jersey view.
    pub fn for_view(view: JerseyView) -> Self {
        match view {
            JerseyView::Front => ExportKind::Front,
            JerseyView::Back => ExportKind::Back,
            JerseyView::LeftSleeve | JerseyView::RightSleeve => ExportKind::Sleeve,
            JerseyView::Collar => ExportKind::Collar,
        }
    }

    /// Transaction description for exporting `count` units,
    /// e.g. `"Exported 3 full jerseys with collar"`.
    pub fn describe(self, count: u64) -> String {
        let s = if count > 1 { "s" } else { "" };
        match self {
            ExportKind::Front => format!("Exported {count} front image{s}"),
            ExportKind::Back => format!("Exported {count} back image{s}"),
            ExportKind::Sleeve => format!("Exported {count} sleeve{s}"),
            ExportKind::Collar => format!("Exported {count} collar{s}"),
            ExportKind::FullJersey => format!("Exported {count} full jersey{s}"),
            ExportKind::FullJerseyWithCollar => {
                format!("Exported {count} full jersey{s} with collar")
            }
        }
    }

    /// Recovers the export kind from a usage description.
    pub fn from_description(description: &str) -> Option<Self> {
        let lower = description.to_lowercase();
        if lower.contains("full jersey") {
            if lower.contains("with collar") {
                return Some(ExportKind::FullJerseyWithCollar);
            }
            return Some(ExportKind::FullJersey);
        }
        [
            ("front", ExportKind::Front),
            ("back", ExportKind::Back),
            ("sleeve", ExportKind::Sleeve),
            ("collar", ExportKind::Collar),
        ]
        .into_iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| kind)
    }
}

/// Shape of a bulk export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportRequest {
    pub front: u64,
    pub back: u64,
    pub sleeves: u64,
    pub collars: u64,
    pub full_jerseys: u64,
    pub full_jerseys_with_collar: u64,
}

impl ExportRequest {
    /// Prices the export of one player's selected views.
    ///
    /// Front, back and both sleeves together are billed as a full jersey
    /// (plus the collar, billed as the collar bundle).
    pub fn for_views(views: &[JerseyView]) -> Self {
        let has = |v: JerseyView| views.contains(&v);
        let full = has(JerseyView::Front)
            && has(JerseyView::Back)
            && has(JerseyView::LeftSleeve)
            && has(JerseyView::RightSleeve);

        if full {
            return if has(JerseyView::Collar) {
                Self {
                    full_jerseys_with_collar: 1,
                    ..Self::default()
                }
            } else {
                Self {
                    full_jerseys: 1,
                    ..Self::default()
                }
            };
        }

        let mut request = Self::default();
        let mut seen = Vec::with_capacity(views.len());
        for &view in views {
            if seen.contains(&view) {
                continue;
            }
            seen.push(view);
            match ExportKind::for_view(view) {
                ExportKind::Front => request.front += 1,
                ExportKind::Back => request.back += 1,
                ExportKind::Sleeve => request.sleeves += 1,
                _ => request.collars += 1,
            }
        }
        request
    }

    /// Multiplies every count by `players`.
    pub fn times(self, players: u64) -> Self {
        Self {
            front: self.front.saturating_mul(players),
            back: self.back.saturating_mul(players),
            sleeves: self.sleeves.saturating_mul(players),
            collars: self.collars.saturating_mul(players),
            full_jerseys: self.full_jerseys.saturating_mul(players),
            full_jerseys_with_collar: self.full_jerseys_with_collar.saturating_mul(players),
        }
    }

    pub fn cost(&self) -> u64 {
        [
            (self.front, ExportKind::Front),
            (self.back, ExportKind::Back),
            (self.sleeves, ExportKind::Sleeve),
            (self.collars, ExportKind::Collar),
            (self.full_jerseys, ExportKind::FullJersey),
            (self.full_jerseys_with_collar, ExportKind::FullJerseyWithCollar),
        ]
        .into_iter()
        .fold(0u64, |total, (count, kind)| {
            total.saturating_add(count.saturating_mul(kind.cost()))
        })
    }

    /// Description for the usage transaction recorded for this export.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = [
            (self.full_jerseys_with_collar, ExportKind::FullJerseyWithCollar),
            (self.full_jerseys, ExportKind::FullJersey),
            (self.front, ExportKind::Front),
            (self.back, ExportKind::Back),
            (self.sleeves, ExportKind::Sleeve),
            (self.collars, ExportKind::Collar),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, kind)| kind.describe(count))
        .collect();

        if parts.is_empty() {
            "Exported nothing".to_string()
        } else {
            parts.join("; ")
        }
    }
}

pub fn export_cost(kind: ExportKind) -> u64 {
    kind.cost()
}

pub fn generate_transaction_description(kind: ExportKind, count: u64) -> String {
    kind.describe(count)
}

pub fn export_kind_from_description(description: &str) -> Option<ExportKind> {
    ExportKind::from_description(description)
}

/// Points needed for a bulk export of individual parts.
pub fn calculate_bulk_export_cost(front: u64, back: u64, sleeves: u64, collars: u64) -> u64 {
    ExportRequest {
        front,
        back,
        sleeves,
        collars,
        ..ExportRequest::default()
    }
    .cost()
}

/// Points needed for one full jersey set.
pub fn calculate_full_jersey_cost(include_collar: bool) -> u64 {
    if include_collar {
        ExportKind::FullJerseyWithCollar.cost()
    } else {
        ExportKind::FullJersey.cost()
    }
}

/// How many exports of each kind a balance covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportEstimate {
    pub front_only: u64,
    pub back_only: u64,
    pub full_jersey: u64,
    pub full_jersey_with_collar: u64,
    pub sleeves: u64,
    pub collars: u64,
}

pub fn estimate_exports(balance: u64) -> ExportEstimate {
    ExportEstimate {
        front_only: balance / PointCosts::FRONT_IMAGE,
        back_only: balance / PointCosts::BACK_IMAGE,
        full_jersey: balance / PointCosts::FULL_JERSEY,
        full_jersey_with_collar: balance / PointCosts::FULL_JERSEY_WITH_COLLAR,
        sleeves: balance / PointCosts::SLEEVE,
        collars: balance / PointCosts::COLLAR,
    }
}

/// Checks a balance against a cost before starting an export.
pub fn validate_points_balance(current: u64, needed: u64) -> Result<(), LedgerError> {
    if current < needed {
        return Err(LedgerError::InsufficientPoints {
            needed,
            available: current,
        });
    }
    Ok(())
}

/// Points returned for a failed or cancelled export, rounded down.
pub fn calculate_refund(points_used: u64, percentage: u32) -> u64 {
    let refund = u128::from(points_used) * u128::from(percentage) / 100;
    u64::try_from(refund).unwrap_or(u64::MAX)
}

/// Groups digits the Indian way: `1234567` → `12,34,567`.
pub fn format_points(points: u64) -> String {
    group_indian(&points.to_string())
}

/// Formats rupees with two decimals: `1000.0` → `₹1,000.00`.
pub fn format_currency(amount: f64) -> String {
    let paise = (amount.abs() * 100.0).round() as u64;
    let sign = if amount < 0.0 && paise > 0 { "-" } else { "" };
    format!(
        "{sign}₹{}.{:02}",
        group_indian(&(paise / 100).to_string()),
        paise % 100
    )
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);

    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{tail}", groups.join(","))
}
