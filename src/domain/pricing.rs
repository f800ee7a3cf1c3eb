use super::Units;

/// Solid cost of a number of stock units.
pub trait PricePolicy: Send + Sync {
    /// `None` when the cost cannot be represented.
    fn cost_of(&self, count: Units) -> Option<Units>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedUnitPrice {
    pub unit_price: Units,
}

impl FixedUnitPrice {
    pub fn new(unit_price: Units) -> Self {
        Self { unit_price }
    }
}

impl PricePolicy for FixedUnitPrice {
    fn cost_of(&self, count: Units) -> Option<Units> {
        count.checked_mul(self.unit_price)
    }
}
