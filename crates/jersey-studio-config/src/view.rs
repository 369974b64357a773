/// The printable parts of a jersey, each edited on its own canvas.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One jersey part (canvas view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JerseyView {
    Front,
    Back,
    LeftSleeve,
    RightSleeve,
    Collar,
}

impl JerseyView {
    /// All views in upload order.
    pub const ALL: [JerseyView; 5] = [
        JerseyView::Front,
        JerseyView::Back,
        JerseyView::LeftSleeve,
        JerseyView::RightSleeve,
        JerseyView::Collar,
    ];

    /// Stable identifier used in document ids and storage keys.
    pub fn as_str(self) -> &'static str {
        match self {
            JerseyView::Front => "front",
            JerseyView::Back => "back",
            JerseyView::LeftSleeve => "left-sleeve",
            JerseyView::RightSleeve => "right-sleeve",
            JerseyView::Collar => "collar",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            JerseyView::Front => "Front",
            JerseyView::Back => "Back",
            JerseyView::LeftSleeve => "Left Sleeve",
            JerseyView::RightSleeve => "Right Sleeve",
            JerseyView::Collar => "Collar",
        }
    }

    pub fn is_sleeve(self) -> bool {
        matches!(self, JerseyView::LeftSleeve | JerseyView::RightSleeve)
    }
}

impl fmt::Display for JerseyView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JerseyView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JerseyView::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown jersey view: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_parses_back() {
        for view in JerseyView::ALL {
            assert_eq!(view.as_str().parse::<JerseyView>(), Ok(view));
        }
    }

    #[test]
    fn test_unknown_view_rejected() {
        assert!("hood".parse::<JerseyView>().is_err());
        assert!("Front".parse::<JerseyView>().is_err());
    }

    #[test]
    fn test_sleeves() {
        let sleeves: Vec<_> = JerseyView::ALL.into_iter().filter(|v| v.is_sleeve()).collect();
        assert_eq!(sleeves, vec![JerseyView::LeftSleeve, JerseyView::RightSleeve]);
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&JerseyView::LeftSleeve).unwrap();
        assert_eq!(json, "\"left-sleeve\"");
        assert_eq!(JerseyView::RightSleeve.label(), "Right Sleeve");
    }
}
