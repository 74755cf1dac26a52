use chrono::{Duration, NaiveDate, Utc};
use clap::Args;
use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use vaani::error::AppError;
use vaani::pipeline::alerts::{
    explain, rank_matches, CallOutcome, CallRequest, DeliveryScheduler, DirectoryService,
    EducationLevel, GatewayError, InMemoryAlertRegistry, InMemoryNotificationLog,
    InMemoryOpportunityStore, InMemoryProfileStore, InMemoryTaskIntake, IngestService,
    NotificationDispatcher, NotificationLogStore, Opportunity, OpportunityDraft, OpportunityId,
    OpportunityStore, ProfileDraft, SchedulerConfig, TelephonyGateway, UserId, UserProfile,
    LOCATION_WILDCARD,
};
use vaani::pipeline::calls::{
    CallLogStore, ConversationStep, InMemoryCallLog, SessionDelta, SessionManager, SessionOutcome,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Evaluation date for matching (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Optional gazette CSV export to seed the opportunity catalog.
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
    /// Skip the inbound call-session portion of the demo.
    #[arg(long)]
    pub(crate) skip_calls: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// Gazette CSV export to ingest.
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Evaluation date for the deadline listing (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct MatchesArgs {
    /// Gazette CSV export holding the opportunity catalog.
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Caller age in years.
    #[arg(long)]
    pub(crate) age: u8,
    /// Highest education reached (high_school, undergraduate, graduate, postgraduate).
    #[arg(long)]
    pub(crate) education: String,
    /// Home district or state.
    #[arg(long)]
    pub(crate) location: String,
    /// Interest category; repeat the flag for more than one.
    #[arg(long = "category", required = true)]
    pub(crate) categories: Vec<String>,
    /// Evaluation date for matching (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Show the per-rule verdicts for opportunities that do not match.
    #[arg(long)]
    pub(crate) explain: bool,
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let ImportArgs { csv, today } = args;
    let today = today.unwrap_or_else(|| Utc::now().date_naive());

    let opportunities = Arc::new(InMemoryOpportunityStore::default());
    let ingest = IngestService::new(opportunities.clone());

    let raw = std::fs::read(&csv)?;
    let report = ingest.ingest_csv(raw.as_slice(), Utc::now())?;

    println!("Gazette import from {}", csv.display());
    println!(
        "- {} accepted | {} rejected",
        report.accepted.len(),
        report.rejected.len()
    );
    for rejected in &report.rejected {
        println!("  - row {}: {}", rejected.index, rejected.reason);
    }

    let listing = opportunities.query_by_deadline_range(today, today + Duration::days(365))?;
    if listing.is_empty() {
        println!("\nNo opportunities open in the year after {today}");
        return Ok(());
    }

    println!("\nOpen opportunities by deadline (next 365 days)");
    for opportunity in &listing {
        println!(
            "- {} {} | deadline {} | {}",
            opportunity.opportunity_id.0,
            opportunity.title,
            opportunity.deadline,
            render_criteria(opportunity)
        );
    }
    Ok(())
}

pub(crate) fn run_matches(args: MatchesArgs) -> Result<(), AppError> {
    let MatchesArgs {
        csv,
        age,
        education,
        location,
        categories,
        today,
        explain: explain_misses,
    } = args;
    let today = today.unwrap_or_else(|| Utc::now().date_naive());

    let opportunities = Arc::new(InMemoryOpportunityStore::default());
    let ingest = IngestService::new(opportunities.clone());
    let raw = std::fs::read(&csv)?;
    let report = ingest.ingest_csv(raw.as_slice(), Utc::now())?;
    if !report.rejected.is_empty() {
        println!(
            "Skipped {} malformed row(s) from {}",
            report.rejected.len(),
            csv.display()
        );
    }

    // Eligibility only reads age, education, location, and preferences; the
    // rest of the profile does not influence an ad-hoc lookup.
    let profile = UserProfile {
        user_id: UserId("cli".to_string()),
        phone: "+910000000000".to_string(),
        name: "cli".to_string(),
        age,
        education: EducationLevel::parse_or_default(&education),
        location,
        preferences: categories.into_iter().collect(),
        language: "hi".to_string(),
    };

    let catalog = opportunities.query_by_deadline_range(today, today + Duration::days(365))?;
    let matches = rank_matches(&profile, catalog.clone(), today);

    let interests = profile
        .preferences
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    println!(
        "Matches on {today}: age {age} | {} | {} | interested in {interests}",
        profile.education.label(),
        profile.location
    );
    if matches.is_empty() {
        println!("- none of the {} open opportunities match", catalog.len());
    }
    for opportunity in &matches {
        println!(
            "- {} {} | deadline {} | apply at {}",
            opportunity.opportunity_id.0,
            opportunity.title,
            opportunity.deadline,
            opportunity.application_url
        );
    }

    if explain_misses {
        let matched: BTreeSet<&OpportunityId> =
            matches.iter().map(|m| &m.opportunity_id).collect();
        let misses: Vec<&Opportunity> = catalog
            .iter()
            .filter(|candidate| !matched.contains(&candidate.opportunity_id))
            .collect();
        if !misses.is_empty() {
            println!("\nWhy the rest miss");
            for opportunity in misses {
                let breakdown = explain(&profile, opportunity, today);
                println!(
                    "- '{}': expired={} age={} education={} location={} categories={}",
                    opportunity.title,
                    breakdown.expired,
                    breakdown.age,
                    breakdown.education,
                    breakdown.location,
                    breakdown.categories
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        csv,
        skip_calls,
    } = args;

    // One timeline for the whole walkthrough, anchored to --today when given.
    let now = today
        .and_then(|date| date.and_hms_opt(9, 0, 0))
        .map(|start| start.and_utc())
        .unwrap_or_else(Utc::now);
    let today = now.date_naive();

    println!("Vaani opportunity alert demo");
    println!("Evaluation date: {today}");

    let profiles = Arc::new(InMemoryProfileStore::default());
    let opportunities = Arc::new(InMemoryOpportunityStore::default());
    let registry = Arc::new(InMemoryAlertRegistry::default());
    let intake = Arc::new(InMemoryTaskIntake::default());
    let log = Arc::new(InMemoryNotificationLog::default());
    let gateway = Arc::new(ScriptedDemoGateway::new(vec![
        CallOutcome::Answered,
        CallOutcome::NoAnswer,
        CallOutcome::Answered,
    ]));

    let directory = DirectoryService::new(profiles.clone(), registry.clone());
    let ingest = IngestService::new(opportunities.clone());
    let dispatcher =
        NotificationDispatcher::new(registry, profiles.clone(), intake.clone(), log.clone());
    let scheduler = DeliveryScheduler::new(
        intake,
        gateway.clone(),
        profiles,
        opportunities.clone(),
        log.clone(),
        SchedulerConfig::default(),
    );

    println!("\nRegistered callers");
    let asha = directory.create_profile(demo_profile(
        "Asha",
        "+917000000001",
        22,
        "undergraduate",
        "Delhi",
        &["jobs", "scholarships"],
        "hi",
    ))?;
    let vikram = directory.create_profile(demo_profile(
        "Vikram",
        "+917000000002",
        28,
        "graduate",
        "Mumbai",
        &["jobs"],
        "en",
    ))?;
    let meera = directory.create_profile(demo_profile(
        "Meera",
        "+917000000003",
        17,
        "high_school",
        "Delhi",
        &["scholarships"],
        "hi",
    ))?;
    for profile in [&asha, &vikram, &meera] {
        println!(
            "- {} {} | {} | age {} | {} | speaks {}",
            profile.user_id.0,
            profile.name,
            profile.location,
            profile.age,
            profile.education.label(),
            profile.language
        );
    }

    directory.register_alerts(&asha.user_id, now)?;
    directory.register_alerts(&vikram.user_id, now)?;
    println!(
        "Alert opt-ins: {} and {} ({} has not opted in)",
        asha.name, vikram.name, meera.name
    );

    if let Some(path) = csv {
        let raw = std::fs::read(&path)?;
        let report = ingest.ingest_csv(raw.as_slice(), now)?;
        println!(
            "\nGazette import from {}: {} accepted, {} rejected",
            path.display(),
            report.accepted.len(),
            report.rejected.len()
        );
        for rejected in &report.rejected {
            println!("- row {}: {}", rejected.index, rejected.reason);
        }
    } else {
        ingest.ingest_one(clerk_draft(today), now)?;
        ingest.ingest_one(scholarship_draft(today), now)?;
    }

    let catalog = opportunities.query_by_deadline_range(today, today + Duration::days(365))?;
    println!("\nOpportunity catalog ({} open)", catalog.len());
    for opportunity in &catalog {
        println!(
            "- {} {} | deadline {} | {}",
            opportunity.opportunity_id.0,
            opportunity.title,
            opportunity.deadline,
            render_criteria(opportunity)
        );
    }

    println!("\nEligibility");
    for profile in [&asha, &vikram, &meera] {
        let matches = rank_matches(profile, catalog.clone(), today);
        if matches.is_empty() {
            println!("- {}: no matches", profile.name);
        } else {
            let titles: Vec<&str> = matches.iter().map(|m| m.title.as_str()).collect();
            println!("- {}: {}", profile.name, titles.join(" | "));
        }
    }
    if let Some(first) = catalog.first() {
        let breakdown = explain(&meera, first, today);
        println!(
            "- why {} misses '{}': expired={} age={} education={} location={} categories={}",
            meera.name,
            first.title,
            breakdown.expired,
            breakdown.age,
            breakdown.education,
            breakdown.location,
            breakdown.categories
        );
    }

    let Some(target) = catalog.first().cloned() else {
        println!("\nNothing to publish, demo ends here");
        return Ok(());
    };

    println!("\nPublishing '{}'", target.title);
    let outcome = dispatcher.dispatch(&target, now)?;
    println!(
        "- matched {} | tasks created {} | skipped active {} | skipped completed {} | missing profiles {}",
        outcome.matched,
        outcome.tasks_created,
        outcome.skipped_active,
        outcome.skipped_completed,
        outcome.missing_profiles
    );
    let republish = dispatcher.dispatch(&target, now)?;
    println!(
        "- republish deduplicates: tasks created {} | skipped active {}",
        republish.tasks_created, republish.skipped_active
    );

    for pass_at in [now, now + Duration::hours(1)] {
        let tick = scheduler.run_due(pass_at)?;
        println!("\nDelivery pass at {}", pass_at.format("%Y-%m-%d %H:%M UTC"));
        println!(
            "- claimed {} | delivered {} | rescheduled {} | exhausted {}",
            tick.claimed, tick.delivered, tick.rescheduled, tick.exhausted
        );
        if tick.claimed == 0 {
            println!("- nothing due");
        }
        for (request, outcome) in gateway.drain_placed() {
            println!(
                "- attempt {} -> {} ('{}'): {}",
                request.attempt,
                request.phone,
                request.title,
                outcome_label(outcome)
            );
        }
    }

    println!("\nNotification history");
    for profile in [&asha, &vikram] {
        let records = log.query_by_user(&profile.user_id)?;
        if records.is_empty() {
            continue;
        }
        println!("- {}:", profile.name);
        for record in records {
            println!(
                "  - {} attempt {} at {}",
                record.status.label(),
                record.attempt,
                record.recorded_at.format("%H:%M:%S")
            );
        }
    }

    if skip_calls {
        return Ok(());
    }

    println!("\nInbound call walkthrough");
    let call_log = Arc::new(InMemoryCallLog::default());
    let manager = SessionManager::new(call_log.clone());
    let caller = "+917000000404";

    let started = manager.create_session(caller, now);
    println!(
        "- {} connects -> session {} at step {}",
        caller,
        started.session.session_id.0,
        started.session.step.label()
    );

    let collected = match manager.update(
        &started.session.session_id,
        started.session.revision,
        SessionDelta {
            step: Some(ConversationStep::CollectAge),
            language: Some("hi".to_string()),
            name: Some("Imran".to_string()),
            ..SessionDelta::default()
        },
        now + Duration::minutes(2),
    ) {
        Ok(view) => view,
        Err(err) => {
            println!("  session update unavailable: {err}");
            return Ok(());
        }
    };
    println!(
        "- caller picks hindi and gives a name -> step {} (revision {})",
        collected.session.step.label(),
        collected.session.revision
    );

    if let Err(conflict) = manager.update(
        &started.session.session_id,
        started.session.revision,
        SessionDelta::default(),
        now + Duration::minutes(3),
    ) {
        println!("- stale writer rejected: {conflict}");
    }

    println!("- line drops; caller dials back 10 minutes later");
    match manager.find_resumable(caller, now + Duration::minutes(12)) {
        Some(resumed) => println!(
            "- resumed session {} at step {} with name {}",
            resumed.session.session_id.0,
            resumed.session.step.label(),
            resumed.session.partial.name.as_deref().unwrap_or("-")
        ),
        None => println!("- no resumable session found"),
    }

    match manager.complete(
        &started.session.session_id,
        SessionOutcome::ProfileRegistered,
        now + Duration::minutes(14),
    ) {
        Ok(record) => println!(
            "- call completes -> outcome {} after {}s",
            record.outcome.label(),
            record.duration_secs
        ),
        Err(err) => println!("  session completion unavailable: {err}"),
    }

    let history = call_log.query_by_phone(caller)?;
    println!("- call history for {caller} now holds {} record(s)", history.len());

    Ok(())
}

fn demo_profile(
    name: &str,
    phone: &str,
    age: u8,
    education: &str,
    location: &str,
    preferences: &[&str],
    language: &str,
) -> ProfileDraft {
    ProfileDraft {
        phone: Some(phone.to_string()),
        name: Some(name.to_string()),
        age: Some(age),
        education: Some(education.to_string()),
        location: Some(location.to_string()),
        preferences: preferences.iter().map(|token| token.to_string()).collect(),
        language: Some(language.to_string()),
    }
}

fn clerk_draft(today: NaiveDate) -> OpportunityDraft {
    OpportunityDraft {
        title: Some("Junior bank clerk recruitment".to_string()),
        description: "State cooperative bank clerk intake".to_string(),
        deadline: Some(today + Duration::days(30)),
        application_url: Some("https://example.gov/bank-clerk".to_string()),
        min_age: Some(21),
        max_age: Some(30),
        min_education: Some("undergraduate".to_string()),
        eligible_locations: BTreeSet::from(["Delhi".to_string(), "Mumbai".to_string()]),
        categories: BTreeSet::from(["jobs".to_string()]),
        source: "gazette".to_string(),
    }
}

fn scholarship_draft(today: NaiveDate) -> OpportunityDraft {
    OpportunityDraft {
        title: Some("National merit scholarship".to_string()),
        description: "Merit scholarship for undergraduate study".to_string(),
        deadline: Some(today + Duration::days(60)),
        application_url: Some("https://example.gov/merit".to_string()),
        min_age: Some(17),
        max_age: Some(25),
        min_education: Some("high_school".to_string()),
        eligible_locations: BTreeSet::from([LOCATION_WILDCARD.to_string()]),
        categories: BTreeSet::from(["scholarships".to_string()]),
        source: "gazette".to_string(),
    }
}

fn render_criteria(opportunity: &Opportunity) -> String {
    let locations = if opportunity.eligible_locations.is_empty() {
        LOCATION_WILDCARD.to_string()
    } else {
        opportunity
            .eligible_locations
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    };
    let categories = opportunity
        .categories
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "ages {}-{} | {}+ | locations {} | categories {}",
        opportunity.min_age,
        opportunity.max_age,
        opportunity.min_education.label(),
        locations,
        categories
    )
}

fn outcome_label(outcome: CallOutcome) -> &'static str {
    match outcome {
        CallOutcome::Answered => "answered",
        CallOutcome::NoAnswer => "no answer",
        CallOutcome::Busy => "busy",
    }
}

/// Gateway with pre-scripted outcomes so the demo shows both a first-attempt
/// delivery and a retry. Falls back to answering once the script runs out.
struct ScriptedDemoGateway {
    script: Mutex<VecDeque<CallOutcome>>,
    placed: Mutex<Vec<(CallRequest, CallOutcome)>>,
}

impl ScriptedDemoGateway {
    fn new(script: Vec<CallOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            placed: Mutex::new(Vec::new()),
        }
    }

    fn drain_placed(&self) -> Vec<(CallRequest, CallOutcome)> {
        std::mem::take(&mut *self.placed.lock().expect("gateway mutex poisoned"))
    }
}

impl TelephonyGateway for ScriptedDemoGateway {
    fn place_call(&self, request: &CallRequest) -> Result<CallOutcome, GatewayError> {
        let outcome = self
            .script
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front()
            .unwrap_or(CallOutcome::Answered);
        self.placed
            .lock()
            .expect("gateway mutex poisoned")
            .push((request.clone(), outcome));
        Ok(outcome)
    }
}
