//! Default target agent per intent, used when an action carries no
//! explicit target.

use oc_domain::action::AgentName;
use oc_domain::intent::SupportedIntent;

pub fn route_intent(intent: SupportedIntent) -> AgentName {
    use SupportedIntent::*;
    match intent {
        ProductSearch | SearchAndAddToCart => AgentName::Product,
        AddToCart | AddMultipleToCart | ApplyDiscount | UpdateCart | AdjustCartQuantity
        | RemoveFromCart | ClearCart | ViewCart => AgentName::Cart,
        Checkout | OrderStatus | CancelOrder | RequestRefund | ChangeOrderAddress => {
            AgentName::Order
        }
        ShowMemory | SavePreference | ForgetPreference | ClearMemory => AgentName::Memory,
        SupportEscalation | SupportStatus | SupportClose | GeneralQuestion | MultiStatus => {
            AgentName::Support
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_intents_route_to_cart() {
        assert_eq!(route_intent(SupportedIntent::ViewCart), AgentName::Cart);
        assert_eq!(route_intent(SupportedIntent::ClearCart), AgentName::Cart);
    }

    #[test]
    fn fallback_intents_route_to_support() {
        assert_eq!(
            route_intent(SupportedIntent::GeneralQuestion),
            AgentName::Support
        );
        assert_eq!(route_intent(SupportedIntent::MultiStatus), AgentName::Support);
    }

    #[test]
    fn checkout_routes_to_order() {
        assert_eq!(route_intent(SupportedIntent::Checkout), AgentName::Order);
    }
}
