//! End-to-end flows against the in-memory store and the fake gateway.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{Duration, SystemTime},
};

use raffle_back::{
    config::AppConfig,
    dao::{
        models::{Tally, TicketEntity, TicketStatus},
        raffle_store::{RaffleStore, memory::MemoryRaffleStore},
    },
    error::ServiceError,
    gateway::{fake::FakeGateway, signature},
    services::{
        allocator, attribution,
        entry_service::{self, EntryCorrection, ManualEntry},
        payment_service::{PurchaseOrder, reserve_and_pay},
        recalculation::recalculate_all,
        sweeper,
        webhook_service::{WebhookOutcome, handle_payment_webhook},
    },
    state::{
        AppState, SharedState,
        sale::{EntryType, Money, PurchaserInfo},
    },
};
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_scenarios";

fn purchaser(name: &str) -> PurchaserInfo {
    PurchaserInfo {
        name: name.into(),
        email: format!("{}@example.org", name.replace(' ', ".").to_lowercase()),
        phone: None,
    }
}

async fn app(config: AppConfig) -> (SharedState, Arc<MemoryRaffleStore>, FakeGateway) {
    let gateway = FakeGateway::new();
    let config = AppConfig {
        webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..config
    };
    let state = AppState::new(config, Arc::new(gateway.clone()));
    let store = Arc::new(MemoryRaffleStore::new());
    state.set_store(store.clone()).await;
    (state, store, gateway)
}

async fn deliver_success(state: &SharedState, intent_id: &str, amount: Money) -> WebhookOutcome {
    let payload = FakeGateway::succeeded_event(intent_id, amount);
    let header = signature::sign(&payload, WEBHOOK_SECRET, SystemTime::now()).unwrap();
    handle_payment_webhook(state, &payload, Some(&header))
        .await
        .unwrap()
}

fn order(entry_type: EntryType, quantity: u32, code: Option<&str>) -> PurchaseOrder {
    PurchaseOrder {
        entry_type,
        quantity,
        amount: None,
        single_slot: false,
        referral_code: code.map(str::to_owned),
        purchaser: purchaser("Sam Buyer"),
    }
}

#[tokio::test]
async fn four_concurrent_callers_on_a_keyspace_of_three_leave_one_sold_out() {
    let store = Arc::new(MemoryRaffleStore::new());
    let handles: Vec<_> = ["Ann One", "Bob Two", "Cid Three", "Dee Four"]
        .into_iter()
        .map(|name| {
            let store = store.clone();
            tokio::spawn(async move { allocator::reserve(store.as_ref(), 3, &purchaser(name)).await })
        })
        .collect();

    let mut numbers = BTreeSet::new();
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(number) => assert!(numbers.insert(number), "number {number} handed out twice"),
            Err(ServiceError::SoldOut) => sold_out += 1,
            Err(other) => panic!("unexpected allocator error: {other}"),
        }
    }
    assert_eq!(numbers, BTreeSet::from([1, 2, 3]));
    assert_eq!(sold_out, 1);
    assert_eq!(store.ticket_count(), 3);
}

#[tokio::test]
async fn swept_ticket_seven_can_be_claimed_again() {
    let store = MemoryRaffleStore::new();
    let timeout = Duration::from_secs(600);
    let reserved_at = SystemTime::now();
    for number in 1..=6 {
        let mut paid = TicketEntity::reserved(number, &purchaser("Paid Buyer"), reserved_at);
        paid.status = TicketStatus::Paid;
        store.insert_ticket(paid).await.unwrap();
    }
    store
        .insert_ticket(TicketEntity::reserved(7, &purchaser("Slow Payer"), reserved_at))
        .await
        .unwrap();

    let later = reserved_at + timeout + Duration::from_secs(1);
    assert_eq!(sweeper::sweep_expired(&store, timeout, later).await.unwrap(), 1);
    assert_eq!(sweeper::sweep_expired(&store, timeout, later).await.unwrap(), 0);
    assert_eq!(sweeper::sweep_expired(&store, timeout, later).await.unwrap(), 0);

    let again = allocator::reserve(&store, 7, &purchaser("New Buyer")).await.unwrap();
    assert_eq!(again, 7);
}

#[tokio::test]
async fn raffle_sale_credits_base_amount_to_referrer_and_globals() {
    let (state, store, gateway) = app(AppConfig::default()).await;
    let jane = attribution::create_referrer(store.as_ref(), "Jane Doe", None)
        .await
        .unwrap();
    assert_eq!(jane.referral_code, "JaneD");

    let receipt = reserve_and_pay(&state, order(EntryType::Raffle, 5, Some("JaneD")))
        .await
        .unwrap();
    assert_eq!(gateway.requests()[0].amount, Money::from_cents(5200));

    let outcome = deliver_success(&state, &receipt.intent_id, Money::from_cents(5200)).await;
    assert!(matches!(outcome, WebhookOutcome::Processed { entries: 1, .. }));

    let entries = store.list_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ticket_count, 5);
    assert_eq!(entries[0].amount_paid, Money::from_cents(5000));
    assert_eq!(entries[0].referrer_id, Some(jane.id));

    let globals = store.global_totals().await.unwrap();
    assert_eq!(globals[&EntryType::Raffle], Tally::new(5, Money::from_cents(5000)));
    let jane = store.find_referrer(jane.id).await.unwrap().unwrap();
    assert_eq!(jane.tally(EntryType::Raffle), Tally::new(5, Money::from_cents(5000)));
    assert_eq!(jane.total_amount, Money::from_cents(5000));
}

#[tokio::test]
async fn transfer_moves_counters_between_referrers_only() {
    let (_state, store, _gateway) = app(AppConfig::default()).await;
    let store = store.as_ref();
    let alice = attribution::create_referrer(store, "Alice Able", None).await.unwrap();
    let bruno = attribution::create_referrer(store, "Bruno Baker", None).await.unwrap();

    let manual = |tickets: u32, cents: i64, code: Option<&str>| ManualEntry {
        ticket_count: tickets,
        amount_paid: Money::from_cents(cents),
        purchaser: purchaser("Walk In"),
        referral_code: code.map(str::to_owned),
        source_app: "admin".into(),
    };
    let first = entry_service::create_manual_entry(store, manual(3, 3000, Some("AliceA")))
        .await
        .unwrap();
    let second = entry_service::create_manual_entry(store, manual(1, 1000, Some("AliceA")))
        .await
        .unwrap();
    let third = entry_service::create_manual_entry(store, manual(2, 2000, None))
        .await
        .unwrap();
    let globals_before = store.global_totals().await.unwrap();

    let ids = vec![first.id, second.id, third.id];
    let report = attribution::transfer_attribution(store, &ids, "BrunoB")
        .await
        .unwrap();
    assert_eq!(report.entries_moved, 3);
    assert_eq!(report.tickets_moved, 6);
    assert_eq!(report.amount_moved, Money::from_cents(6000));

    let alice = store.find_referrer(alice.id).await.unwrap().unwrap();
    let bruno_after = store.find_referrer(bruno.id).await.unwrap().unwrap();
    assert_eq!(alice.tally(EntryType::Manual), Tally::ZERO);
    assert_eq!(alice.total_amount, Money::ZERO);
    assert_eq!(bruno_after.tally(EntryType::Manual), Tally::new(6, Money::from_cents(6000)));
    assert_eq!(store.global_totals().await.unwrap(), globals_before);

    // Repeating the transfer is a no-op.
    let again = attribution::transfer_attribution(store, &ids, "BrunoB")
        .await
        .unwrap();
    assert_eq!(again.entries_moved, 0);
    let bruno_again = store.find_referrer(bruno.id).await.unwrap().unwrap();
    assert_eq!(bruno_again.total_amount, Money::from_cents(6000));

    let missing = attribution::transfer_attribution(store, &["ghost".to_owned()], "AliceA").await;
    assert!(matches!(missing, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn duplicate_fan_out_delivery_writes_each_unit_once() {
    let (state, store, _gateway) = app(AppConfig::default()).await;
    let receipt = reserve_and_pay(&state, order(EntryType::RolexRaffle, 3, None))
        .await
        .unwrap();

    let first = deliver_success(&state, &receipt.intent_id, Money::from_cents(31200)).await;
    let second = deliver_success(&state, &receipt.intent_id, Money::from_cents(31200)).await;

    assert!(matches!(first, WebhookOutcome::Processed { entries: 3, .. }));
    assert!(matches!(second, WebhookOutcome::AlreadyProcessed { .. }));
    assert_eq!(store.entry_count(), 3);
    let globals = store.global_totals().await.unwrap();
    assert_eq!(globals[&EntryType::RolexRaffle], Tally::new(3, Money::from_cents(30000)));
}

#[tokio::test]
async fn payment_after_sweep_still_lands_on_the_ticket() {
    let (state, store, _gateway) = app(AppConfig {
        rolex_keyspace_size: 1,
        ..AppConfig::default()
    })
    .await;
    let mut slot = order(EntryType::RolexRaffle, 1, None);
    slot.single_slot = true;
    let receipt = reserve_and_pay(&state, slot).await.unwrap();
    assert_eq!(receipt.ticket_number, Some(1));

    let timeout = state.config().reservation_timeout;
    let later = SystemTime::now() + timeout + Duration::from_secs(1);
    assert_eq!(sweeper::sweep_expired(store.as_ref(), timeout, later).await.unwrap(), 1);
    assert!(store.find_ticket(1).await.unwrap().is_none());

    deliver_success(&state, &receipt.intent_id, Money::from_cents(10400)).await;

    let ticket = store.find_ticket(1).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Paid);
    assert_eq!(ticket.amount_paid, Money::from_cents(10000));
    assert_eq!(sweeper::sweep_expired(store.as_ref(), timeout, later).await.unwrap(), 0);
}

#[tokio::test]
async fn recalculation_matches_an_independent_summation() {
    let (state, store, _gateway) = app(AppConfig::default()).await;
    let jane = attribution::create_referrer(store.as_ref(), "Jane Doe", None)
        .await
        .unwrap();
    attribution::create_referrer(store.as_ref(), "Omar Ortiz", None)
        .await
        .unwrap();

    let raffle = reserve_and_pay(&state, order(EntryType::Raffle, 2, Some("JaneD")))
        .await
        .unwrap();
    deliver_success(&state, &raffle.intent_id, Money::from_cents(2080)).await;

    let mut donation = order(EntryType::Donation, 1, Some("JaneD"));
    donation.amount = Some(rust_decimal::Decimal::new(1234, 2));
    let donation = reserve_and_pay(&state, donation).await.unwrap();
    deliver_success(&state, &donation.intent_id, Money::from_cents(1283)).await;

    let manual = entry_service::create_manual_entry(
        store.as_ref(),
        ManualEntry {
            ticket_count: 4,
            amount_paid: Money::from_cents(4000),
            purchaser: purchaser("Walk In"),
            referral_code: None,
            source_app: "admin".into(),
        },
    )
    .await
    .unwrap();
    entry_service::update_entry(
        store.as_ref(),
        &manual.id,
        EntryCorrection {
            amount_paid: Some(Money::from_cents(3999)),
            ..EntryCorrection::default()
        },
    )
    .await
    .unwrap();
    attribution::transfer_attribution(store.as_ref(), &[manual.id.clone()], "OmarO")
        .await
        .unwrap();

    let globals_before = store.global_totals().await.unwrap();
    let referrers_before = store.list_referrers().await.unwrap();

    let report = recalculate_all(store.as_ref()).await.unwrap();
    assert_eq!(report.entries_scanned, 2);
    assert_eq!(report.donations_scanned, 1);

    // Re-derive every counter straight from the stored facts.
    let mut sums: BTreeMap<(Option<Uuid>, EntryType), Tally> = BTreeMap::new();
    for entry in store.list_entries().await.unwrap() {
        let slot = sums.entry((entry.referrer_id, entry.entry_type)).or_default();
        slot.tickets += i64::from(entry.ticket_count);
        slot.amount += entry.amount_paid;
    }
    for intent in store
        .list_succeeded_intents(EntryType::Donation)
        .await
        .unwrap()
    {
        let slot = sums.entry((intent.referrer_id, EntryType::Donation)).or_default();
        slot.tickets += 1;
        slot.amount += intent.terms.base_amount;
    }
    let summed = |matches: &dyn Fn(Option<Uuid>, EntryType) -> bool| {
        sums.iter()
            .filter(|((referrer, kind), _)| matches(*referrer, *kind))
            .fold(Tally::default(), |acc, (_, tally)| Tally {
                tickets: acc.tickets + tally.tickets,
                amount: acc.amount + tally.amount,
            })
    };

    let globals_after = store.global_totals().await.unwrap();
    for entry_type in EntryType::ALL {
        let expected = summed(&|_, kind| kind == entry_type);
        let incremental = globals_before.get(&entry_type).copied().unwrap_or_default();
        assert_eq!(globals_after[&entry_type], expected);
        assert_eq!(incremental, expected);
    }
    for before in referrers_before {
        let after = store.find_referrer(before.id).await.unwrap().unwrap();
        let mut total = Money::ZERO;
        for entry_type in EntryType::ALL {
            let expected = summed(&|referrer, kind| {
                kind == entry_type && referrer == Some(before.id)
            });
            assert_eq!(after.tally(entry_type), expected);
            assert_eq!(before.tally(entry_type), expected);
            total += expected.amount;
        }
        assert_eq!(after.total_amount, total);
        assert_eq!(before.total_amount, total);
    }
    let jane = store.find_referrer(jane.id).await.unwrap().unwrap();
    assert_eq!(jane.tally(EntryType::Donation), Tally::new(1, Money::from_cents(1234)));
    assert_eq!(jane.total_amount, Money::from_cents(3234));
}
