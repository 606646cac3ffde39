//! `created` side of the payment intent lifecycle: price, reserve, mint, persist.

use std::{collections::BTreeMap, time::SystemTime};

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::{models::PaymentIntentEntity, raffle_store::RaffleStore},
    error::ServiceError,
    gateway::CreateIntentRequest,
    services::allocator,
    state::{
        AppState,
        sale::{EntryType, Money, PurchaserInfo, SaleTerms},
    },
};

/// Purchase request after transport decoding.
#[derive(Debug, Clone)]
pub struct PurchaseOrder {
    /// Sale category.
    pub entry_type: EntryType,
    /// Tickets requested; ignored for donations.
    pub quantity: u32,
    /// Donated amount; ignored for ticket sales.
    pub amount: Option<Decimal>,
    /// Reserve one numbered Rolex ticket instead of buying by quantity.
    pub single_slot: bool,
    /// Referral code to credit, if any.
    pub referral_code: Option<String>,
    /// Buyer contact details.
    pub purchaser: PurchaserInfo,
}

/// What the buyer needs to confirm the payment client-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    /// Secret the client confirms the payment with.
    pub client_secret: String,
    /// Gateway intent id.
    pub intent_id: String,
    /// Reserved number for single-slot purchases.
    pub ticket_number: Option<u32>,
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidInput(message.into())
}

/// Validate an order and freeze its terms. No side effects.
pub fn price_sale(config: &AppConfig, order: &PurchaseOrder) -> Result<SaleTerms, ServiceError> {
    let purchaser = PurchaserInfo {
        name: order.purchaser.name.trim().to_owned(),
        email: order.purchaser.email.trim().to_owned(),
        phone: order
            .purchaser
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .map(str::to_owned),
    };
    if purchaser.name.is_empty() {
        return Err(invalid("purchaser name is required"));
    }
    if purchaser.email.is_empty() {
        return Err(invalid("purchaser email is required"));
    }
    if order.single_slot && order.entry_type != EntryType::RolexRaffle {
        return Err(invalid("only rolex raffle tickets can be reserved by number"));
    }

    let ticket_sale = |unit_price: Money, quantity: u32| {
        if quantity == 0 || quantity > config.max_quantity_per_purchase {
            return Err(invalid(format!(
                "quantity must be between 1 and {}",
                config.max_quantity_per_purchase
            )));
        }
        unit_price
            .checked_mul(quantity)
            .map(|base| (quantity, base))
            .ok_or_else(|| invalid("amount overflow"))
    };

    let (quantity, base_amount) = match order.entry_type {
        EntryType::Raffle => ticket_sale(config.raffle_ticket_price, order.quantity)?,
        EntryType::RolexRaffle if order.single_slot => ticket_sale(config.rolex_ticket_price, 1)?,
        EntryType::RolexRaffle => ticket_sale(config.rolex_ticket_price, order.quantity)?,
        EntryType::Donation => {
            let amount = order
                .amount
                .ok_or_else(|| invalid("donation amount is required"))?;
            let base = Money::from_decimal(amount).map_err(|err| invalid(err.to_string()))?;
            if !base.is_positive() {
                return Err(invalid("donation amount must be positive"));
            }
            (1, base)
        }
        EntryType::Manual => return Err(invalid("manual entries are recorded by administrators")),
    };

    let charged_amount = config
        .charged_amount(base_amount)
        .ok_or_else(|| invalid("amount overflow"))?;

    Ok(SaleTerms {
        entry_type: order.entry_type,
        quantity,
        base_amount,
        charged_amount,
        referral_code: order
            .referral_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_owned),
        purchaser,
        ticket_number: None,
        source_app: config.source_app.clone(),
    })
}

/// Opaque metadata attached to the gateway intent.
fn intent_metadata(terms: &SaleTerms) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::from([
        ("entry_type".to_owned(), terms.entry_type.to_string()),
        ("quantity".to_owned(), terms.quantity.to_string()),
        ("base_amount".to_owned(), terms.base_amount.to_string()),
        ("name".to_owned(), terms.purchaser.name.clone()),
        ("email".to_owned(), terms.purchaser.email.clone()),
        ("source_app".to_owned(), terms.source_app.clone()),
    ]);
    if let Some(code) = &terms.referral_code {
        metadata.insert("referral_code".into(), code.clone());
    }
    if let Some(number) = terms.ticket_number {
        metadata.insert("ticket_number".into(), number.to_string());
    }
    metadata
}

/// Price the order, reserve a number when asked, mint the gateway intent and persist its terms.
///
/// A reservation is rolled back when the intent cannot be minted or recorded.
pub async fn reserve_and_pay(
    state: &AppState,
    order: PurchaseOrder,
) -> Result<PurchaseReceipt, ServiceError> {
    let config = state.config();
    let mut terms = price_sale(config, &order)?;
    let store = state.require_store().await?;

    let reserved = if order.single_slot {
        let number =
            allocator::reserve(store.as_ref(), config.rolex_keyspace_size, &terms.purchaser)
                .await?;
        terms.ticket_number = Some(number);
        Some(number)
    } else {
        None
    };

    let request = CreateIntentRequest {
        amount: terms.charged_amount,
        currency: config.currency.clone(),
        metadata: intent_metadata(&terms),
        receipt_email: Some(terms.purchaser.email.clone()),
    };
    let created = match state.gateway().create_intent(request).await {
        Ok(created) => created,
        Err(err) => {
            warn!(error = %err, ticket = ?reserved, "payment intent creation failed");
            rollback(store.as_ref(), reserved).await;
            return Err(ServiceError::Upstream(err));
        }
    };

    let intent = PaymentIntentEntity::created(created.id.clone(), terms, SystemTime::now());
    if let Err(err) = store.insert_intent(intent).await {
        warn!(intent_id = %created.id, error = %err, "failed to record payment intent");
        rollback(store.as_ref(), reserved).await;
        return Err(err.into());
    }

    info!(
        intent_id = %created.id,
        entry_type = %order.entry_type,
        ticket = ?reserved,
        "payment intent created"
    );
    Ok(PurchaseReceipt {
        client_secret: created.client_secret,
        intent_id: created.id,
        ticket_number: reserved,
    })
}

async fn rollback(store: &dyn RaffleStore, reserved: Option<u32>) {
    if let Some(number) = reserved {
        allocator::release(store, number).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::{dao::raffle_store::memory::MemoryRaffleStore, gateway::fake::FakeGateway};

    fn order(entry_type: EntryType, quantity: u32) -> PurchaseOrder {
        PurchaseOrder {
            entry_type,
            quantity,
            amount: None,
            single_slot: false,
            referral_code: Some(" JaneD ".into()),
            purchaser: PurchaserInfo {
                name: "Sam Buyer".into(),
                email: "sam@example.org".into(),
                phone: Some(String::new()),
            },
        }
    }

    #[test]
    fn raffle_base_excludes_the_fee() {
        let terms = price_sale(&AppConfig::default(), &order(EntryType::Raffle, 5)).unwrap();
        assert_eq!(terms.base_amount, Money::from_cents(5000));
        assert_eq!(terms.charged_amount, Money::from_cents(5200));
        assert_eq!(terms.referral_code.as_deref(), Some("JaneD"));
        assert_eq!(terms.purchaser.phone, None);
    }

    #[test]
    fn invalid_orders_are_rejected() {
        let config = AppConfig::default();
        assert!(price_sale(&config, &order(EntryType::Raffle, 0)).is_err());
        assert!(price_sale(&config, &order(EntryType::Raffle, 101)).is_err());
        assert!(price_sale(&config, &order(EntryType::Manual, 1)).is_err());
        assert!(price_sale(&config, &order(EntryType::Donation, 1)).is_err());

        let mut slot = order(EntryType::Raffle, 1);
        slot.single_slot = true;
        assert!(price_sale(&config, &slot).is_err());

        let mut anonymous = order(EntryType::Raffle, 1);
        anonymous.purchaser.name = "  ".into();
        assert!(matches!(
            price_sale(&config, &anonymous),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn donation_amount_is_normalised_to_cents() {
        let mut donation = order(EntryType::Donation, 0);
        donation.amount = Some(dec!(12.345));
        let terms = price_sale(&AppConfig::default(), &donation).unwrap();
        assert_eq!(terms.quantity, 1);
        assert_eq!(terms.base_amount, Money::from_cents(1235));
    }

    #[test]
    fn oversized_donations_are_invalid_input() {
        let config = AppConfig::default();
        for amount in [Decimal::MAX, dec!(90000000000000000)] {
            let mut donation = order(EntryType::Donation, 0);
            donation.amount = Some(amount);
            assert!(matches!(
                price_sale(&config, &donation),
                Err(ServiceError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn gateway_failure_rolls_back_the_reservation() {
        let gateway = FakeGateway::new();
        let state = AppState::new(
            AppConfig {
                rolex_keyspace_size: 1,
                ..AppConfig::default()
            },
            Arc::new(gateway.clone()),
        );
        let store = Arc::new(MemoryRaffleStore::new());
        state.set_store(store.clone()).await;

        let mut slot = order(EntryType::RolexRaffle, 1);
        slot.single_slot = true;

        gateway.set_failing(true);
        let failed = reserve_and_pay(&state, slot.clone()).await;
        assert!(matches!(failed, Err(ServiceError::Upstream(_))));
        assert_eq!(store.ticket_count(), 0);

        gateway.set_failing(false);
        let receipt = reserve_and_pay(&state, slot).await.unwrap();
        assert_eq!(receipt.ticket_number, Some(1));
        let intent = store.find_intent(receipt.intent_id).await.unwrap().unwrap();
        assert_eq!(intent.terms.ticket_number, Some(1));

        let sent = &gateway.requests()[0];
        assert_eq!(sent.amount, Money::from_cents(10400));
        assert_eq!(sent.metadata["ticket_number"], "1");
        assert_eq!(sent.metadata["base_amount"], "100.00");
    }
}
