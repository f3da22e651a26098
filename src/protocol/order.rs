use thiserror::Error;

use super::ResourceType;

/// Smallest quantity, in grams, that may be ordered.
pub const MIN_QUANTITY: u8 = 1;
/// Largest quantity, in grams, that may be ordered.
pub const MAX_QUANTITY: u8 = 150;

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum ValidationError {
    #[error("Please enter a weight between 1 and 150 grams (got {0}).")]
    QuantityOutOfRange(i64),
}

/// A validated order. The fields are private so that a quantity outside of
/// [`MIN_QUANTITY`]..=[`MAX_QUANTITY`] can never be constructed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OrderRequest {
    resource: ResourceType,
    quantity: u8,
}

impl OrderRequest {
    pub fn new(resource: ResourceType, quantity: i64) -> Result<Self, ValidationError> {
        if quantity < MIN_QUANTITY as i64 || quantity > MAX_QUANTITY as i64 {
            return Err(ValidationError::QuantityOutOfRange(quantity));
        }
        Ok(OrderRequest {
            resource,
            quantity: quantity as u8,
        })
    }

    /// Builds an order from raw operator input. Unparseable quantities degrade to `0` and unknown
    /// selections to the default resource, so only the range check can reject the input.
    pub fn parse(raw_quantity: &str, selection: i64) -> Result<Self, ValidationError> {
        Self::new(
            ResourceType::from_selection(selection),
            parse_quantity(raw_quantity),
        )
    }

    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    /// Quantity in grams.
    pub fn quantity(&self) -> u8 {
        self.quantity
    }
}

/// Parses an operator-entered quantity, treating anything that isn't an integer as `0`.
pub fn parse_quantity(raw: &str) -> i64 {
    raw.parse().unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("75", 75)]
    #[case("+12", 12)]
    #[case("", 0)]
    #[case("abc", 0)]
    #[case("7.5", 0)]
    #[case(" 75", 0)]
    #[case("99999999999999999999999", 0)]
    #[case("-3", -3)]
    fn quantity_parsing(#[case] raw: &str, #[case] expected: i64) {
        assert_eq!(expected, parse_quantity(raw));
    }

    #[rstest]
    fn bounds(#[values(1, 2, 75, 149, 150)] quantity: i64) {
        let order = OrderRequest::new(ResourceType::Wheat, quantity).expect("valid order");
        assert_eq!(quantity, order.quantity() as i64);
        assert_eq!(ResourceType::Wheat, order.resource());
    }

    #[rstest]
    fn out_of_bounds(#[values(-1, 0, 151, 200, 256)] quantity: i64) {
        assert_eq!(
            Err(ValidationError::QuantityOutOfRange(quantity)),
            OrderRequest::new(ResourceType::Corn, quantity)
        );
    }

    #[test]
    fn parse_degrades_selection() {
        let order = OrderRequest::parse("20", 42).expect("valid order");
        assert_eq!(ResourceType::default(), order.resource());
        assert_eq!(
            Err(ValidationError::QuantityOutOfRange(0)),
            OrderRequest::parse("twenty", 1)
        );
    }
}
