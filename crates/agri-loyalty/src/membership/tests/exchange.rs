use super::common::*;
use std::sync::Arc;

use crate::membership::domain::{Currency, ExchangeConfig, LedgerSource, TransactionKind};
use crate::membership::exchange::{ExchangeEngine, ExchangeError};
use crate::membership::failure::FailureKind;
use crate::membership::ledger::LedgerService;
use crate::membership::repository::RewardStore;

fn engine<S: RewardStore>(store: Arc<S>) -> ExchangeEngine<S> {
    ExchangeEngine::new(Arc::new(LedgerService::new(store, 3)))
}

fn config() -> ExchangeConfig {
    ExchangeConfig {
        version: 1,
        coins_per_point: 10,
        minimum_coins: 100,
        enabled: true,
    }
}

#[test]
fn exchange_debits_coins_and_credits_points_atomically() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Ice");
    seed(&store, &member.id, Currency::Coins, 500);

    let receipt = engine(store.clone())
        .exchange(&member.id, 200, &config(), now())
        .expect("exchange succeeds");

    assert_eq!(receipt.coins_spent, 200);
    assert_eq!(receipt.points_received, 20);
    assert_eq!(receipt.member.total_coins, 300);
    assert_eq!(receipt.member.total_points, 20);

    let coins = store
        .ledger_entries(&member.id, Currency::Coins)
        .expect("ledger");
    let spend = coins.last().expect("spend entry");
    assert_eq!(spend.amount, -200);
    assert_eq!(spend.kind, TransactionKind::Redeem);
    assert_eq!(spend.source, LedgerSource::Exchange);

    let points = store
        .ledger_entries(&member.id, Currency::Points)
        .expect("ledger");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].amount, 20);
    assert_eq!(points[0].source, LedgerSource::Exchange);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn amount_below_minimum_is_rejected() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Jan");
    seed(&store, &member.id, Currency::Coins, 500);

    let err = engine(store.clone())
        .exchange(&member.id, 50, &config(), now())
        .expect_err("below minimum");

    assert_eq!(
        err,
        ExchangeError::BelowMinimum {
            minimum: 100,
            requested: 50
        }
    );
    assert_eq!(err.kind(), FailureKind::BelowMinimum);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Coins), 500);
}

#[test]
fn disabled_exchange_is_rejected_first() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Kai");
    let disabled = ExchangeConfig {
        enabled: false,
        ..config()
    };

    let err = engine(store.clone())
        .exchange(&member.id, 10_000, &disabled, now())
        .expect_err("disabled");

    assert_eq!(err, ExchangeError::Disabled);
    assert_eq!(err.kind(), FailureKind::Disabled);
}

#[test]
fn exchange_beyond_balance_is_insufficient_coins() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Lin");
    seed(&store, &member.id, Currency::Coins, 150);

    let err = engine(store.clone())
        .exchange(&member.id, 200, &config(), now())
        .expect_err("not enough coins");

    assert_eq!(
        err,
        ExchangeError::InsufficientCoins {
            requested: 200,
            available: 150
        }
    );
    assert_eq!(err.kind(), FailureKind::InsufficientCoins);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Coins), 150);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Points), 0);
}

#[test]
fn whole_amount_is_spent_even_when_remainder_is_not_converted() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Mild");
    seed(&store, &member.id, Currency::Coins, 300);

    let receipt = engine(store.clone())
        .exchange(&member.id, 255, &config(), now())
        .expect("exchange");

    assert_eq!(receipt.points_received, 25);
    assert_eq!(receipt.coins_spent, 255);
    assert_eq!(receipt.member.total_coins, 45);
}

#[test]
fn outage_during_exchange_applies_neither_side() {
    let store = Arc::new(FlakyStore::default());
    let service = service_with_store(store.clone());
    let (_, member) = approved_farmer(&service, "Nan");
    seed(&store, &member.id, Currency::Coins, 400);
    store.set_outage(true);

    let err = engine(store.clone())
        .exchange(&member.id, 200, &config(), now())
        .expect_err("outage");

    assert_eq!(err.kind(), FailureKind::Transient);
    store.set_outage(false);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Coins), 400);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Points), 0);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}
