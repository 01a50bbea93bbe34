use super::common::*;
use std::sync::Arc;
use std::thread;

use crate::membership::domain::{Currency, LedgerSource, MemberId, Tier, TransactionKind};
use crate::membership::failure::FailureKind;
use crate::membership::ledger::{LedgerError, LedgerService};
use crate::membership::repository::{Posting, RewardStore, StoreError, UnitOfWork};
use crate::membership::store::InMemoryRewardStore;

#[test]
fn credit_writes_entry_and_running_balance_together() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Malee");
    let ledger = ledger_over(store.clone());

    let entry = ledger
        .credit(
            &member.id,
            Currency::Coins,
            40,
            LedgerSource::Receipt,
            Some("receipt #991".to_string()),
            now(),
        )
        .expect("credit succeeds");

    assert_eq!(entry.amount, 40);
    assert_eq!(entry.kind, TransactionKind::Earn);
    assert_eq!(entry.source, LedgerSource::Receipt);
    assert_eq!(entry.description.as_deref(), Some("receipt #991"));
    let stored = store
        .fetch_member(&member.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.total_coins, 40);
    assert_eq!(stored.version, member.version + 1);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn debit_beyond_balance_fails_without_side_effects() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Chai");
    seed(&store, &member.id, Currency::Points, 30);
    let ledger = ledger_over(store.clone());

    let err = ledger
        .debit(
            &member.id,
            Currency::Points,
            31,
            LedgerSource::AdminAdjustment,
            None,
            now(),
        )
        .expect_err("overdraw rejected");

    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            currency: Currency::Points,
            requested: 31,
            available: 30,
        }
    );
    assert_eq!(err.kind(), FailureKind::InsufficientBalance);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Points), 30);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn debit_of_exact_balance_leaves_zero() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Dao");
    seed(&store, &member.id, Currency::Coins, 25);

    let entry = ledger_over(store.clone())
        .debit(
            &member.id,
            Currency::Coins,
            25,
            LedgerSource::Exchange,
            None,
            now(),
        )
        .expect("exact debit allowed");

    assert_eq!(entry.amount, -25);
    assert_eq!(entry.kind, TransactionKind::Redeem);
    let stored = store
        .fetch_member(&member.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.total_coins, 0);
}

#[test]
fn non_positive_amounts_are_rejected() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Kan");
    let ledger = ledger_over(store.clone());

    for amount in [0, -5] {
        let err = ledger
            .credit(
                &member.id,
                Currency::Coins,
                amount,
                LedgerSource::Receipt,
                None,
                now(),
            )
            .expect_err("invalid amount");
        assert_eq!(err, LedgerError::InvalidAmount(amount));
        assert_eq!(err.kind(), FailureKind::Validation);
    }
    assert!(store
        .ledger_entries(&member.id, Currency::Coins)
        .expect("readable")
        .is_empty());
}

#[test]
fn unknown_member_is_not_found() {
    let (_, store) = build_service();
    let missing = MemberId("mem-missing".to_string());

    let err = ledger_over(store)
        .credit(
            &missing,
            Currency::Points,
            10,
            LedgerSource::Receipt,
            None,
            now(),
        )
        .expect_err("no member");

    assert_eq!(err, LedgerError::MemberNotFound(missing));
    assert_eq!(err.kind(), FailureKind::NotFound);
}

#[test]
fn version_conflicts_are_retried_and_applied_once() {
    let store = Arc::new(FlakyStore::default());
    let service = service_with_store(store.clone());
    let (_, member) = approved_farmer(&service, "Pim");
    store.inject_conflicts(2);

    let entry = LedgerService::new(store.clone(), 3)
        .credit(
            &member.id,
            Currency::Points,
            120,
            LedgerSource::Mission,
            None,
            now(),
        )
        .expect("third attempt commits");

    assert_eq!(entry.amount, 120);
    assert_eq!(store.commit_attempts(), 3);
    assert_eq!(
        store
            .ledger_entries(&member.id, Currency::Points)
            .expect("readable")
            .len(),
        1
    );
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn persistent_conflicts_become_transient_with_nothing_applied() {
    let store = Arc::new(FlakyStore::default());
    let service = service_with_store(store.clone());
    let (_, member) = approved_farmer(&service, "Noi");
    store.inject_conflicts(10);

    let err = LedgerService::new(store.clone(), 3)
        .credit(
            &member.id,
            Currency::Coins,
            50,
            LedgerSource::Receipt,
            None,
            now(),
        )
        .expect_err("gives up");

    assert!(matches!(err, LedgerError::Transient { attempts: 3, .. }));
    assert!(err.kind().is_retryable());
    assert_eq!(store.commit_attempts(), 3);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Coins), 0);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn store_outage_is_transient_and_leaves_balances_untouched() {
    let store = Arc::new(FlakyStore::default());
    let service = service_with_store(store.clone());
    let (_, member) = approved_farmer(&service, "Fon");
    seed(&store, &member.id, Currency::Coins, 70);
    store.set_outage(true);

    let err = ledger_over(store.clone())
        .debit(
            &member.id,
            Currency::Coins,
            20,
            LedgerSource::Exchange,
            None,
            now(),
        )
        .expect_err("outage");

    assert_eq!(err.kind(), FailureKind::Transient);
    store.set_outage(false);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Coins), 70);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn point_credits_rederive_the_member_tier() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Wan");
    assert_eq!(member.tier, Tier::Bronze);

    seed(&store, &member.id, Currency::Points, 1_000);
    let member = store
        .fetch_member(&member.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(member.tier, Tier::Silver);

    ledger_over(store.clone())
        .debit(
            &member.id,
            Currency::Points,
            1,
            LedgerSource::AdminAdjustment,
            None,
            now(),
        )
        .expect("debit");
    let member = store
        .fetch_member(&member.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(member.tier, Tier::Bronze);
}

#[test]
fn adjust_and_expire_record_their_kinds() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Ploy");
    seed(&store, &member.id, Currency::Coins, 100);
    let ledger = ledger_over(store.clone());

    let adjusted = ledger
        .adjust(
            &member.id,
            Currency::Coins,
            -30,
            Some("duplicate receipt".to_string()),
            now(),
        )
        .expect("deduction");
    assert_eq!(adjusted.kind, TransactionKind::Adjust);
    assert_eq!(adjusted.source, LedgerSource::AdminAdjustment);
    assert_eq!(adjusted.amount, -30);

    let expired = ledger
        .expire(&member.id, Currency::Coins, 20, None, now())
        .expect("expiry");
    assert_eq!(expired.kind, TransactionKind::Expire);
    assert_eq!(expired.source, LedgerSource::Expiration);
    assert_eq!(expired.amount, -20);

    let overdraw = ledger
        .adjust(&member.id, Currency::Coins, -51, None, now())
        .expect_err("cannot go negative");
    assert_eq!(overdraw.kind(), FailureKind::InsufficientBalance);
    assert_eq!(
        ledger.adjust(&member.id, Currency::Coins, 0, None, now()),
        Err(LedgerError::InvalidAmount(0))
    );
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Coins), 50);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn history_lists_newest_entries_first() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Beam");
    let ledger = ledger_over(store.clone());

    for (offset, amount) in [(0, 5), (1, 7), (2, 9)] {
        ledger
            .credit(
                &member.id,
                Currency::Coins,
                amount,
                LedgerSource::DailyCheckin,
                None,
                at_day(offset),
            )
            .expect("credit");
    }

    let amounts: Vec<i64> = ledger
        .history(&member.id, Currency::Coins)
        .expect("history")
        .iter()
        .map(|entry| entry.amount)
        .collect();
    assert_eq!(amounts, vec![9, 7, 5]);
    assert!(ledger
        .history(&member.id, Currency::Points)
        .expect("history")
        .is_empty());
}

#[test]
fn overflowing_adjustments_are_rejected_before_any_write() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Kwan");
    seed(&store, &member.id, Currency::Points, 10);
    let ledger = ledger_over(store.clone());

    let err = ledger
        .adjust(&member.id, Currency::Points, i64::MAX, None, now())
        .expect_err("points would overflow");
    assert_eq!(err, LedgerError::InvalidAmount(i64::MAX));
    assert_eq!(err.kind(), FailureKind::Validation);

    let err = ledger
        .adjust(&member.id, Currency::Coins, i64::MIN, None, now())
        .expect_err("cannot negate");
    assert_eq!(err, LedgerError::InvalidAmount(i64::MIN));

    let err = ledger
        .credit(
            &member.id,
            Currency::Points,
            i64::MAX - 5,
            LedgerSource::Mission,
            None,
            now(),
        )
        .expect_err("credit would overflow");
    assert_eq!(err.kind(), FailureKind::Validation);

    let stored = store
        .fetch_member(&member.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.total_points, 10);
    assert_eq!(stored.total_coins, 0);
    assert_balances_match_ledger(store.as_ref(), &member.id);
}

#[test]
fn store_refuses_units_that_overflow_a_balance() {
    let (service, store) = build_service();
    let (_, member) = approved_farmer(&service, "Nan");
    seed(&store, &member.id, Currency::Coins, 1);
    let member = store
        .fetch_member(&member.id)
        .expect("fetch")
        .expect("present");

    let unit = UnitOfWork::for_member(&member, now())
        .post(Posting::earn(Currency::Coins, i64::MAX, LedgerSource::Receipt));
    let err = store.commit(unit).expect_err("overflow refused");

    assert_eq!(
        err,
        StoreError::BalanceOverflow {
            currency: Currency::Coins,
            balance: 1,
        }
    );
    assert_eq!(err.kind(), FailureKind::Validation);
    assert_eq!(ledger_sum(store.as_ref(), &member.id, Currency::Coins), 1);
}

#[test]
fn concurrent_credits_are_all_applied() {
    const WRITERS: i64 = 8;
    const CREDITS_PER_WRITER: i64 = 25;
    const AMOUNT: i64 = 10;

    let store = Arc::new(InMemoryRewardStore::new());
    let service = service_with_store(store.clone());
    let (_, member) = approved_farmer(&service, "Joy");
    let ledger = Arc::new(LedgerService::new(store.clone(), 10_000));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let ledger = Arc::clone(&ledger);
            let member_id = member.id.clone();
            thread::spawn(move || {
                for _ in 0..CREDITS_PER_WRITER {
                    ledger
                        .credit(
                            &member_id,
                            Currency::Coins,
                            AMOUNT,
                            LedgerSource::Receipt,
                            Some(format!("writer {writer}")),
                            now(),
                        )
                        .expect("credit eventually commits");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread finished");
    }

    let stored = store
        .fetch_member(&member.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.total_coins, WRITERS * CREDITS_PER_WRITER * AMOUNT);
    assert_eq!(
        store
            .ledger_entries(&member.id, Currency::Coins)
            .expect("readable")
            .len() as i64,
        WRITERS * CREDITS_PER_WRITER
    );
    assert_balances_match_ledger(store.as_ref(), &member.id);
}
