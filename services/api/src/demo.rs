use crate::infra::{parse_date, parse_member_type, seeded_store};
use agri_loyalty::config::{AppConfig, RewardsConfig};
use agri_loyalty::error::AppError;
use agri_loyalty::membership::{
    Actor, ApprovalStatus, BulkRegistrationImporter, CompletionStatus, Currency, MemberId,
    MemberType, MembershipError, MembershipService, OccupationProfile, RegistrationRequest,
};
use agri_loyalty::telemetry;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Display name for the demo member
    #[arg(long, default_value = "Demo Dairy Farm")]
    pub(crate) name: String,
    /// Occupation of the demo member (farm, livestock_shop, ...)
    #[arg(long, default_value = "farm", value_parser = parse_member_type)]
    pub(crate) member_type: MemberType,
    /// First day of the simulated journey (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Number of consecutive days to check in
    #[arg(long, default_value_t = 8)]
    pub(crate) days: u32,
    /// Skip the check-in on this day index to show a streak reset
    #[arg(long)]
    pub(crate) miss_day: Option<u32>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV export with display_name, phone, member_type and occupation columns
    pub(crate) csv: PathBuf,
    /// Print every rejected row instead of only the totals
    #[arg(long)]
    pub(crate) list_failures: bool,
}

fn morning_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default())) + Duration::hours(9)
}

/// Prints a failed step and hands back `None` so the journey can stop early.
fn step<T>(label: &str, result: Result<T, MembershipError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            println!("  {label} failed ({:?}): {err}", err.kind());
            None
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        name,
        member_type,
        start,
        days,
        miss_day,
    } = args;

    let start = start.unwrap_or_else(|| Local::now().date_naive());
    let opened = morning_of(start);
    let rewards = RewardsConfig::default();
    let store = Arc::new(seeded_store(&rewards, opened));
    let service = MembershipService::new(store, rewards.program_settings());
    let admin = Actor::admin(MemberId("demo-admin".to_string()));

    println!("Member progression demo starting {start}");
    let Some(registration) = step(
        "Registration",
        service.register(
            RegistrationRequest {
                display_name: name,
                phone: None,
                member_type,
                occupation: OccupationProfile::default(),
            },
            opened,
        ),
    ) else {
        return Ok(());
    };
    println!(
        "- Registered {} as {} -> {} ({})",
        registration.member.display_name,
        member_type.as_str(),
        registration.decision.status.label(),
        registration.decision.message
    );
    let member = Actor::member(registration.member.id.clone());

    if registration.decision.status != ApprovalStatus::Approved {
        println!("- Overriding approval as program administrator");
        if step(
            "Approval override",
            service.admin_set_approval(
                &admin,
                &registration.member.id,
                ApprovalStatus::Approved,
                opened,
            ),
        )
        .is_none()
        {
            return Ok(());
        }
    }

    println!("\nDaily check-ins");
    let mut last_day = opened;
    for day in 0..days {
        let now = opened + Duration::days(i64::from(day));
        last_day = now;
        if miss_day == Some(day) {
            println!("  day {:>2}: missed", day + 1);
            continue;
        }
        if let Some(outcome) = step("Check-in", service.check_in(&member, now)) {
            println!(
                "  day {:>2}: streak {} (cycle day {}) +{} coins -> {} coins",
                day + 1,
                outcome.record.streak_count,
                outcome.day_number,
                outcome.record.coins_earned,
                outcome.member.total_coins
            );
        }
    }

    println!("\nMission board");
    let board = step("Mission board", service.missions(&member, last_day)).unwrap_or_default();
    if board.is_empty() {
        println!("  no missions available");
    }
    for entry in &board {
        println!(
            "  - {} [{}]: {} points / {} coins{}",
            entry.mission.title,
            entry.mission.id,
            entry.reward.points,
            entry.reward.coins,
            if entry.mission.requires_review {
                " (reviewed)"
            } else {
                ""
            }
        );
    }
    for entry in board.iter().filter(|entry| !entry.engaged) {
        let Some(claim) = step(
            "Mission claim",
            service.claim_mission(&member, &entry.mission.id, last_day),
        ) else {
            continue;
        };
        if claim.completion.status == CompletionStatus::Pending {
            println!("  claimed {} -> waiting for review", entry.mission.id);
            if let Some(reviewed) = step(
                "Mission review",
                service.admin_review_completion(
                    &admin,
                    &registration.member.id,
                    &entry.mission.id,
                    true,
                    last_day,
                ),
            ) {
                println!(
                    "  reviewed {} -> +{} points, +{} coins",
                    entry.mission.id,
                    reviewed.completion.points_awarded,
                    reviewed.completion.coins_awarded
                );
            }
        } else {
            println!(
                "  claimed {} -> +{} points, +{} coins",
                entry.mission.id, claim.completion.points_awarded, claim.completion.coins_awarded
            );
        }
    }

    println!("\nCoins to points");
    if let Some(config) = step("Exchange configuration", service.exchange_config()) {
        let balance = step("Dashboard", service.dashboard(&member, last_day))
            .map(|dashboard| dashboard.member.total_coins)
            .unwrap_or(0);
        let coins = balance - balance % config.coins_per_point.max(1);
        println!(
            "  rate {} coins per point, minimum {} coins, balance {} coins",
            config.coins_per_point, config.minimum_coins, balance
        );
        if config.enabled && coins >= config.minimum_coins && coins > 0 {
            if let Some(receipt) = step("Exchange", service.exchange(&member, coins, last_day)) {
                println!(
                    "  exchanged {} coins -> {} points",
                    receipt.coins_spent, receipt.points_received
                );
            }
        } else {
            println!("  not enough coins to exchange yet");
        }
    }

    if let Some(dashboard) = step("Dashboard", service.dashboard(&member, last_day)) {
        println!("\nDashboard");
        println!(
            "  {} points | {} coins | tier {}",
            dashboard.member.total_points,
            dashboard.member.total_coins,
            dashboard.tier.current.display_name
        );
        match &dashboard.tier.next {
            Some(next) => println!(
                "  {:.0}% toward {} ({} points to go)",
                dashboard.tier.progress_percent, next.display_name, dashboard.tier.points_to_next
            ),
            None => println!("  top tier reached"),
        }
        println!(
            "  streak {} | next check-in pays {} coins",
            dashboard.streak.displayed_streak, dashboard.streak.next_reward
        );
    }

    if let Some(history) = step("Ledger", service.ledger_history(&member, Currency::Points)) {
        println!("\nPoints ledger (newest first)");
        for entry in history {
            println!(
                "  {} {:>+6} {:?}/{:?} {}",
                entry.created_at.format("%Y-%m-%d"),
                entry.amount,
                entry.kind,
                entry.source,
                entry.description.unwrap_or_default()
            );
        }
    }

    Ok(())
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let now = Utc::now();
    let store = Arc::new(seeded_store(&config.rewards, now));
    let service = MembershipService::new(store, config.rewards.program_settings());

    let report = BulkRegistrationImporter::from_path(&args.csv, &service, now)?;

    println!("Bulk registration from {}", args.csv.display());
    println!(
        "- {} registered: {} approved | {} pending review | {} declined",
        report.registered.len(),
        report.count(ApprovalStatus::Approved),
        report.count(ApprovalStatus::Pending),
        report.count(ApprovalStatus::Rejected)
    );
    println!("- {} rows rejected", report.failures.len());
    if args.list_failures {
        for failure in &report.failures {
            println!(
                "  line {} ({:?}): {}",
                failure.line, failure.kind, failure.error
            );
        }
    }

    Ok(())
}
