/// Purchasable points packages.
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointsPlan {
    pub id: &'static str,
    pub name: &'static str,
    /// Price in whole rupees. Zero for plans priced on request.
    pub price: u64,
    pub points: u64,
    pub bonus_points: u64,
    pub popular: bool,
    pub description: &'static str,
    /// Price-per-point tag shown next to the plan.
    pub value: &'static str,
    pub stripe_price_id: Option<&'static str>,
}

pub const POINTS_PLANS: [PointsPlan; 3] = [
    PointsPlan {
        id: "basic",
        name: "Basic Package",
        price: 1000,
        points: 700,
        bonus_points: 0,
        popular: false,
        description: "Perfect for small projects",
        value: "₹1.43 per point",
        stripe_price_id: Some("price_basic_points"),
    },
    PointsPlan {
        id: "professional",
        name: "Professional Package",
        price: 2500,
        points: 1800,
        bonus_points: 200,
        popular: true,
        description: "Best value for designers",
        value: "Best Value - ₹1.25 per point",
        stripe_price_id: Some("price_professional_points"),
    },
    PointsPlan {
        id: "enterprise",
        name: "Enterprise Package",
        price: 0,
        points: 0,
        bonus_points: 0,
        popular: false,
        description: "Custom pricing for large teams",
        value: "Contact for pricing",
        stripe_price_id: None,
    },
];

pub fn plan_by_id(id: &str) -> Option<&'static PointsPlan> {
    POINTS_PLANS.iter().find(|plan| plan.id == id)
}

impl PointsPlan {
    /// Points credited on purchase, bonus included.
    pub fn total_points(&self) -> u64 {
        self.points + self.bonus_points
    }

    /// Whether the plan is sold through checkout rather than by contact.
    pub fn is_self_serve(&self) -> bool {
        self.stripe_price_id.is_some() && self.price > 0
    }

    pub fn points_per_rupee(&self) -> Option<f64> {
        (self.price > 0).then(|| self.total_points() as f64 / self.price as f64)
    }

    pub fn rupees_per_point(&self) -> Option<f64> {
        let total = self.total_points();
        (total > 0).then(|| self.price as f64 / total as f64)
    }

    /// How much cheaper a point gets once the bonus is counted, compared
    /// with the base points alone, in whole percent. `None` for plans
    /// without base points.
    pub fn savings_percent(&self) -> Option<u32> {
        if self.points == 0 {
            return None;
        }
        if self.price == 0 {
            return Some(0);
        }
        let base_price = self.price as f64 / self.points as f64;
        let with_bonus = self.price as f64 / self.total_points() as f64;
        Some(((base_price - with_bonus) / base_price * 100.0).round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_lookup() {
        let basic = plan_by_id("basic").unwrap();
        assert_eq!(basic.total_points(), 700);
        assert!(basic.is_self_serve());

        let pro = plan_by_id("professional").unwrap();
        assert_eq!(pro.total_points(), 2000);
        assert!(pro.popular);

        let enterprise = plan_by_id("enterprise").unwrap();
        assert!(!enterprise.is_self_serve());
        assert!(enterprise.points_per_rupee().is_none());

        assert!(plan_by_id("gold").is_none());
    }

    #[test]
    fn test_unit_prices() {
        let basic = plan_by_id("basic").unwrap();
        let pro = plan_by_id("professional").unwrap();
        assert!((basic.rupees_per_point().unwrap() - 1.4286).abs() < 0.001);
        assert!((pro.rupees_per_point().unwrap() - 1.25).abs() < f64::EPSILON);
        assert!((pro.points_per_rupee().unwrap() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_savings_percent() {
        assert_eq!(plan_by_id("professional").unwrap().savings_percent(), Some(10));
        assert_eq!(plan_by_id("basic").unwrap().savings_percent(), Some(0));
        assert_eq!(plan_by_id("enterprise").unwrap().savings_percent(), None);

        let free_bonus = PointsPlan {
            price: 0,
            points: 10,
            bonus_points: 5,
            ..POINTS_PLANS[0]
        };
        assert_eq!(free_bonus.savings_percent(), Some(0));
    }

    #[test]
    fn test_plan_texts() {
        let basic = plan_by_id("basic").unwrap();
        assert_eq!(basic.description, "Perfect for small projects");
        assert_eq!(basic.value, "₹1.43 per point");

        let enterprise = plan_by_id("enterprise").unwrap();
        assert_eq!(enterprise.name, "Enterprise Package");
        assert_eq!(enterprise.description, "Custom pricing for large teams");
        assert_eq!(enterprise.value, "Contact for pricing");
    }
}
